// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end frame loop scenarios driven through [`Compositor`] on a
//! [`ManualClock`].

use std::cell::RefCell;
use std::rc::Rc;

use ratchet_core::backend::NullRenderer;
use ratchet_core::clock::ManualClock;
use ratchet_core::command::{Command, ResourceKind};
use ratchet_core::config::SchedulerConfig;
use ratchet_core::id::{ResourceId, SessionId};
use ratchet_core::linker::{ExpirationCause, ExportedResource, ResourceLinker};
use ratchet_core::platform::{Event, EventPair};
use ratchet_core::session::{ImportState, Present1Callback};
use ratchet_core::time::{Duration, HostTime};
use ratchet_core::timing::PresentationInfo;
use ratchet_core::{Compositor, RatchetConfig};

const MS: u64 = 1_000_000;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn compositor() -> Compositor<ManualClock> {
    init_logging();
    let config = RatchetConfig {
        scheduler: SchedulerConfig {
            vsync_interval: Duration(16 * MS),
            safety_multiplier: 1.0,
            ..SchedulerConfig::hz60()
        },
        ..RatchetConfig::default()
    };
    Compositor::new(config, ManualClock::new(HostTime::ZERO), Box::new(NullRenderer))
        .expect("valid config")
}

fn create_node(c: &mut Compositor<ManualClock>, session: SessionId, id: u64) {
    c.enqueue(
        session,
        Command::Create {
            id: ResourceId(id),
            kind: ResourceKind::Node,
        },
    )
    .expect("session exists");
}

fn recorded(log: &Rc<RefCell<Vec<PresentationInfo>>>) -> Present1Callback {
    let log = Rc::clone(log);
    Box::new(move |info| log.borrow_mut().push(info))
}

fn noop() -> Present1Callback {
    Box::new(|_| {})
}

#[test]
fn unsignaled_fence_holds_back_later_batches() {
    let mut c = compositor();
    let s = c.create_session();
    let fence = Event::new();

    create_node(&mut c, s, 1);
    c.present(s, HostTime(10 * MS), vec![], vec![], noop())
        .unwrap();
    create_node(&mut c, s, 2);
    c.present(s, HostTime(20 * MS), vec![fence.clone()], vec![], noop())
        .unwrap();

    assert!(c.run_until(HostTime(30 * MS)) >= 1, "the first batch gets a wakeup");
    let session = c.engine().session(s).unwrap();
    assert_eq!(session.num_queued_requests(), 1, "second batch is still gated");
    assert_eq!(session.resource_kind(ResourceId(1)), Some(ResourceKind::Node));
    assert_eq!(session.resource_kind(ResourceId(2)), None);

    fence.signal();
    assert!(c.on_frame_presented(0, HostTime(32 * MS)));
    c.run_until(HostTime(100 * MS));
    let session = c.engine().session(s).unwrap();
    assert_eq!(session.num_queued_requests(), 0, "signal releases the batch");
    assert_eq!(session.resource_kind(ResourceId(2)), Some(ResourceKind::Node));
}

#[test]
fn failing_session_is_torn_down_without_stalling_others() {
    let mut c = compositor();
    let bad = c.create_session();
    let good = c.create_session();
    let release = Event::new();

    c.enqueue(
        bad,
        Command::AddChild {
            parent: ResourceId(1),
            child: ResourceId(2),
        },
    )
    .unwrap();
    c.present(bad, HostTime::ZERO, vec![], vec![release.clone()], noop())
        .unwrap();
    create_node(&mut c, good, 1);
    c.present(good, HostTime::ZERO, vec![], vec![], noop())
        .unwrap();

    assert_eq!(c.run_until(HostTime(20 * MS)), 1);
    assert!(c.engine().session(bad).is_none(), "failed session is gone");
    assert!(release.is_signaled(), "its release fences are signaled");
    assert_eq!(c.engine().session(good).unwrap().num_resources(), 1);
    assert_eq!(c.scheduler().num_outstanding_frames(), 1, "a frame was rendered");
    assert_eq!(c.dump_scene(), format!("session {}\n  node 1\n", good.get()));
}

#[test]
fn closing_export_token_expires_export() {
    init_logging();
    let mut linker = ResourceLinker::new();
    let causes = Rc::new(RefCell::new(Vec::new()));
    let observed = Rc::clone(&causes);
    linker.set_on_expired_callback(Box::new(move |_, cause| {
        observed.borrow_mut().push(cause);
    }));

    let (export_token, import_token) = EventPair::create();
    linker
        .export_resource(
            ExportedResource {
                owner: SessionId(1),
                resource: ResourceId(7),
                kind: ResourceKind::Image,
            },
            &export_token,
        )
        .unwrap();
    assert_eq!(linker.num_exports(), 1);

    drop(export_token);
    assert_eq!(linker.process_signals(), 1);
    assert_eq!(*causes.borrow(), vec![ExpirationCause::ExportHandleClosed]);
    assert_eq!(linker.num_exports(), 0);
    drop(import_token);
}

#[test]
fn import_follows_export_lifetime_across_sessions() {
    let mut c = compositor();
    let exporter = c.create_session();
    let importer = c.create_session();
    let (export_token, import_token) = EventPair::create();

    c.enqueue(
        importer,
        Command::Import {
            id: ResourceId(5),
            kind: ResourceKind::Node,
            token: import_token,
        },
    )
    .unwrap();
    c.present(importer, HostTime::ZERO, vec![], vec![], noop())
        .unwrap();
    create_node(&mut c, exporter, 1);
    c.enqueue(
        exporter,
        Command::Export {
            id: ResourceId(1),
            token: export_token,
        },
    )
    .unwrap();
    c.present(exporter, HostTime::ZERO, vec![], vec![], noop())
        .unwrap();

    c.run_until(HostTime(20 * MS));
    assert_eq!(c.num_exports(), 1);
    assert_eq!(c.num_unresolved_imports(), 0, "export resolves the pending import");
    assert!(matches!(
        c.engine().session(importer).unwrap().import_state(ResourceId(5)),
        Some(ImportState::Bound(ExportedResource {
            resource: ResourceId(1),
            ..
        }))
    ));

    c.enqueue(exporter, Command::Release { id: ResourceId(1) })
        .unwrap();
    c.present(exporter, HostTime(20 * MS), vec![], vec![], noop())
        .unwrap();
    c.run_until(HostTime(60 * MS));

    assert_eq!(c.num_exports(), 0);
    assert_eq!(
        c.engine().session(importer).unwrap().import_state(ResourceId(5)),
        Some(ImportState::Expired(ExpirationCause::ResourceDestroyed))
    );
}

#[test]
fn presented_frame_returns_credit() {
    let mut c = compositor();
    let s = c.create_session();
    let log = Rc::new(RefCell::new(Vec::new()));

    create_node(&mut c, s, 1);
    for _ in 0..5 {
        c.present(s, HostTime::ZERO, vec![], vec![], recorded(&log))
            .unwrap();
    }
    assert_eq!(c.engine().session(s).unwrap().num_presents_allowed(), 0);

    assert_eq!(c.run_until(HostTime(20 * MS)), 1, "one wakeup applies all five");
    c.on_frame_rendered(0, HostTime(15 * MS));
    assert!(log.borrow().is_empty(), "callbacks wait for the display");

    assert!(c.on_frame_presented(0, HostTime(17 * MS)));
    let log = log.borrow();
    assert_eq!(log.len(), 5);
    assert!(log.iter().all(|info| info.presentation_time == HostTime(17 * MS)));
    assert_eq!(log.last().unwrap().num_presents_allowed, 5, "all credit is back");
    assert_eq!(c.engine().session(s).unwrap().num_presents_allowed(), 5);
}

#[test]
fn exhausted_budget_closes_session() {
    let mut c = compositor();
    let s = c.create_session();
    for _ in 0..5 {
        c.present(s, HostTime::ZERO, vec![], vec![], noop()).unwrap();
    }
    assert!(c.present(s, HostTime::ZERO, vec![], vec![], noop()).is_err());
    assert!(c.engine().session(s).is_none(), "over-budget present is fatal");
}

#[test]
fn dropped_frame_defers_callbacks_to_next_frame() {
    let mut c = compositor();
    let s = c.create_session();
    let log = Rc::new(RefCell::new(Vec::new()));

    create_node(&mut c, s, 1);
    c.present(s, HostTime::ZERO, vec![], vec![], recorded(&log))
        .unwrap();
    c.run_until(HostTime(20 * MS));
    assert!(c.on_frame_dropped(0));
    assert!(log.borrow().is_empty(), "dropped content was never shown");
    assert!(c.next_wakeup().is_some(), "a re-render is scheduled");

    c.run_until(HostTime(40 * MS));
    assert_eq!(c.scheduler().num_outstanding_frames(), 1);
    assert!(c.on_frame_presented(1, HostTime(48 * MS)));
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].presentation_time, HostTime(48 * MS));
}
