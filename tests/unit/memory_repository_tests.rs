//! Unit tests for the in-process repository.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use trace_selector::repository::{MemoryRepository, Repository};
use trace_selector::{AppError, ChangeEvent, ChangeKind};

fn recorder(repo: &MemoryRepository) -> Arc<Mutex<Vec<ChangeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    repo.add_listener(Arc::new(move |event: &ChangeEvent| {
        sink.lock().expect("lock").push(event.clone());
    }));
    events
}

#[tokio::test]
async fn closed_repository_refuses_access() {
    let repo = MemoryRepository::with_entries([("a", "INFO")]);

    assert!(repo.is_defined());
    assert!(!repo.is_open());
    assert!(matches!(repo.get("a"), Err(AppError::NotOpen(_))));
    assert!(matches!(repo.set("a", "DEBUG"), Err(AppError::NotOpen(_))));
    assert!(matches!(repo.keys(), Err(AppError::NotOpen(_))));
}

#[tokio::test]
async fn set_emits_added_then_set() {
    let repo = MemoryRepository::new();
    repo.open().await.expect("open");
    let events = recorder(&repo);

    repo.set("a", "INFO").expect("set");
    repo.set("a", "ERROR").expect("set");

    let events = events.lock().expect("lock");
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::KeyAdded, ChangeKind::KeySet]);
    assert_eq!(events[1].key.as_deref(), Some("a"));
    assert_eq!(events[1].value.as_deref(), Some("ERROR"));
    assert_eq!(events[1].source, repo.id());
    assert_eq!(repo.get("a").expect("get").as_deref(), Some("ERROR"));
}

#[tokio::test]
async fn remove_of_missing_key_is_silent() {
    let repo = MemoryRepository::new();
    repo.open().await.expect("open");
    let events = recorder(&repo);

    repo.remove("missing").expect("remove");
    repo.clear().expect("clear");

    assert!(events.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn clear_emits_single_event() {
    let repo = MemoryRepository::with_entries([("a", "INFO"), ("b", "ERROR")]);
    repo.open().await.expect("open");
    let events = recorder(&repo);

    repo.clear().expect("clear");

    let kinds: Vec<_> = events.lock().expect("lock").iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Cleared]);
    assert!(repo.keys().expect("keys").is_empty());
}

#[tokio::test]
async fn replace_all_emits_reloaded() {
    let repo = MemoryRepository::with_entries([("a", "INFO")]);
    repo.open().await.expect("open");
    let events = recorder(&repo);

    let mut next = BTreeMap::new();
    next.insert("b".to_owned(), "WARNING".to_owned());
    repo.replace_all(next).expect("replace");

    let kinds: Vec<_> = events.lock().expect("lock").iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Reloaded]);
    assert_eq!(repo.keys().expect("keys"), vec!["b".to_owned()]);
}

#[tokio::test]
async fn contents_survive_reopen_with_listeners() {
    let repo = MemoryRepository::with_entries([("a", "INFO")]);
    repo.open().await.expect("open");
    let events = recorder(&repo);

    repo.reopen().await.expect("reopen");
    repo.set("b", "DEBUG").expect("set");

    assert_eq!(repo.listener_count(), 1);
    assert_eq!(repo.keys().expect("keys"), vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(events.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn snapshot_is_immutable_after_later_writes() {
    let repo = MemoryRepository::with_entries([("a", "INFO")]);
    repo.open().await.expect("open");

    let before = repo.snapshot().expect("snapshot");
    repo.set("a", "ERROR").expect("set");

    assert_eq!(before.get("a").map(String::as_str), Some("INFO"));
    assert_eq!(
        repo.snapshot().expect("snapshot").get("a").map(String::as_str),
        Some("ERROR")
    );
}

#[tokio::test]
async fn close_is_idempotent() {
    let repo = MemoryRepository::new();
    repo.open().await.expect("open");
    repo.close().await;
    repo.close().await;
    assert!(!repo.is_open());
}

#[tokio::test]
async fn rejects_entries_a_file_store_could_not_hold() {
    let repo = MemoryRepository::new();
    repo.open().await.expect("open");
    let events = recorder(&repo);

    assert!(matches!(repo.set("a=b", "INFO"), Err(AppError::Repository(_))));
    assert!(matches!(repo.set("#c", "INFO"), Err(AppError::Repository(_))));
    assert!(matches!(
        repo.set("k", "x\norders=HALT"),
        Err(AppError::Repository(_))
    ));

    assert!(repo.keys().expect("keys").is_empty());
    assert!(events.lock().expect("lock").is_empty());
}
