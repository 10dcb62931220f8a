//! Unit tests for listener registration and isolated fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trace_selector::models::event::{ChangeEvent, ChangeKind, RepositoryId};
use trace_selector::repository::{ListenerRegistry, RepositoryListener};

fn counter() -> (Arc<AtomicUsize>, Arc<dyn RepositoryListener>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let listener: Arc<dyn RepositoryListener> = Arc::new(move |_: &ChangeEvent| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (count, listener)
}

#[test]
fn dispatch_reaches_every_listener() {
    let registry = ListenerRegistry::new();
    let (first, a) = counter();
    let (second, b) = counter();
    registry.add(a);
    registry.add(b);

    registry.dispatch(&ChangeEvent::reloaded(RepositoryId::new()));

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn removed_listener_receives_nothing() {
    let registry = ListenerRegistry::new();
    let (count, listener) = counter();
    let id = registry.add(listener);

    assert!(registry.remove(id));
    assert!(!registry.remove(id));
    assert!(registry.is_empty());

    registry.dispatch(&ChangeEvent::cleared(RepositoryId::new()));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_listener_does_not_stop_delivery() {
    let registry = ListenerRegistry::new();
    registry.add(Arc::new(|_: &ChangeEvent| panic!("listener failure")));
    let (count, listener) = counter();
    registry.add(listener);

    registry.dispatch(&ChangeEvent::reloaded(RepositoryId::new()));
    registry.dispatch(&ChangeEvent::reloaded(RepositoryId::new()));

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn events_arrive_in_generation_order() {
    let registry = ListenerRegistry::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    registry.add(Arc::new(move |event: &ChangeEvent| {
        sink.lock().expect("lock").push(event.kind);
    }));

    let source = RepositoryId::new();
    registry.dispatch(&ChangeEvent::key_set(source, "a", "INFO", false));
    registry.dispatch(&ChangeEvent::key_set(source, "a", "ERROR", true));
    registry.dispatch(&ChangeEvent::key_cleared(source, "a"));
    registry.dispatch(&ChangeEvent::cleared(source));

    assert_eq!(
        *log.lock().expect("lock"),
        vec![
            ChangeKind::KeyAdded,
            ChangeKind::KeySet,
            ChangeKind::KeyCleared,
            ChangeKind::Cleared
        ]
    );
}

#[test]
fn error_event_carries_cause() {
    let event = ChangeEvent::error(
        RepositoryId::new(),
        trace_selector::AppError::Io("disk gone".into()),
    );
    assert_eq!(event.kind, ChangeKind::Error);
    assert_eq!(
        event.cause.as_ref().map(ToString::to_string).as_deref(),
        Some("io: disk gone")
    );

    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["kind"], "error");
    assert_eq!(json["cause"], "io: disk gone");
}
