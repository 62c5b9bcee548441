// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Update and render scheduling for a compositing display server.
//!
//! `ratchet_core` takes batches of scene mutations from independent clients
//! ("sessions"), holds each batch until its acquire fences are signaled and
//! its requested presentation time is due, applies batches in order, and
//! decides when a frame must be rendered. Clients can share resources
//! through paired tokens without either side knowing who arrives first.
//!
//! # Architecture
//!
//! ```text
//!   client ── enqueue / present ──► Session ──► SyncFenceSet
//!                                                   │ FenceSignal (Port)
//!                                                   ▼
//!   Compositor::poll ──► Engine::dispatch_signals ──► FrameScheduler
//!                                                   │ wakeup (latch point)
//!                                                   ▼
//!              Engine::update_sessions ──► Session::apply_scheduled_updates
//!                                                   │        │
//!                                                   │        └─► ResourceLinker, SceneGraph
//!                                                   ▼
//!              Engine::render_frame ──► Renderer
//!                                                   │
//!   on_frame_rendered / on_frame_presented ◄────────┘
//!         └─► Present1 callbacks, FramePresentedInfo, release fences
//! ```
//!
//! **[`session`]**: per-client present queues with flow control.
//!
//! **[`fence`]**: [`SyncFenceSet`](fence::SyncFenceSet), the acquire gate.
//!
//! **[`linker`]**: cross-session export/import keyed by
//! [`EventPair`](platform::EventPair) koids.
//!
//! **[`scheduler`]**: the [`FrameScheduler`](scheduler::FrameScheduler)
//! and the traits it drives.
//!
//! **[`predictor`]**: latch-point and presentation-time prediction.
//!
//! **[`engine`]** and **[`compositor`]**: the concrete updater/renderer and
//! the run loop façade.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod backend;
pub mod clock;
pub mod command;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod fence;
pub mod id;
pub mod linker;
pub mod platform;
pub mod predictor;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod time;
pub mod timing;
pub mod trace;

pub use compositor::Compositor;
pub use config::RatchetConfig;
