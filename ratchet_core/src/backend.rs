// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renderer contract.
//!
//! Ratchet does not draw anything itself. Once the scheduler decides a frame
//! is needed and the scene has content, the engine hands the scene to a
//! [`Renderer`]. Returning `Ok` means rendering was *initiated*; the
//! embedder later reports completion through the compositor:
//!
//! ```rust,ignore
//! compositor.poll();                                  // may call Renderer::render
//! // ... GPU work finishes ...
//! compositor.on_frame_rendered(frame, now);
//! // ... display flips ...
//! compositor.on_frame_presented(frame, actual_time);  // or on_frame_dropped
//! ```

use crate::error::RenderError;
use crate::scene::SceneGraph;
use crate::timing::FrameTimings;

/// Produces frames from the current scene.
///
/// Implementations must not block on GPU completion.
pub trait Renderer {
    /// Starts rendering `scene` for the frame described by `timings`.
    fn render(&mut self, scene: &dyn SceneGraph, timings: &FrameTimings) -> Result<(), RenderError>;
}

/// A [`Renderer`] that accepts every frame and draws nothing.
///
/// Useful for headless operation, where completion is reported by the
/// embedder's own timing source.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _scene: &dyn SceneGraph, _timings: &FrameTimings) -> Result<(), RenderError> {
        Ok(())
    }
}
