//! Selector open/close/rewire against configured file repositories.

use std::sync::Arc;
use std::time::Duration;

use trace_selector::repository::file::FileRepositorySettings;
use trace_selector::repository::location::ResourceBundle;
use trace_selector::repository::{FileRepository, Repository};
use trace_selector::{AppError, DefaultSelector, Selector, SelectorConfig, Severity};

fn store(dir: &tempfile::TempDir, name: &str, text: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, text).expect("write store");
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn config_built_selector_loads_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = store(&dir, "trace.properties", "orders=ERROR\nbroken=LOUD\n");
    let toml = format!("default_when_undefined = false\n[repository]\nurl = '{url}'\n");
    let config = SelectorConfig::from_toml_str(&toml).expect("config");

    let selector = config.build_selector(ResourceBundle::new());
    selector.open().await.expect("open");

    assert!(selector.is_defined());
    assert_eq!(selector.keys(), vec!["orders".to_owned()]);
    assert!(selector.is_set(Severity::Fatal, "orders"));
    assert!(!selector.is_set(Severity::Info, "orders"));
    assert!(!selector.is_set(Severity::Halt, "unknown"));

    selector.close().await;
}

#[tokio::test]
async fn undefined_store_opens_with_default_policy() {
    let selector = SelectorConfig::default().build_selector(ResourceBundle::new());

    selector.open().await.expect("undefined repository opens");

    assert!(selector.is_open());
    assert!(!selector.is_defined());
    assert!(selector.is_set(Severity::Trace, "orders"));
    assert!(selector.keys().is_empty());
}

#[tokio::test]
async fn failed_open_leaves_selector_closed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.properties");
    let repo = FileRepository::new(FileRepositorySettings::new(
        missing.to_string_lossy(),
        Duration::from_millis(50),
    ));
    let selector = DefaultSelector::with_repository(Arc::new(repo.clone()), true);

    let err = selector.open().await.expect_err("must fail");

    assert!(matches!(err, AppError::Config(_)));
    assert!(!selector.is_open());
    assert!(!repo.is_open());
    assert!(!repo.is_polling().await);
    assert!(selector.is_set(Severity::Trace, "orders"));
}

#[tokio::test]
async fn selector_writes_reach_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = store(&dir, "trace.properties", "# managed\n");
    let repo = FileRepository::new(FileRepositorySettings::new(url.clone(), Duration::ZERO));
    let selector = DefaultSelector::with_repository(Arc::new(repo), true);
    selector.open().await.expect("open");

    selector
        .set(Severity::Warning, "orders", Some(r"ORD-\d+"))
        .expect("set");

    assert_eq!(
        std::fs::read_to_string(&url).expect("read"),
        "# managed\norders=WARNING:ORD-\\d+\n"
    );
    assert!(selector.is_set_value(Severity::Error, "orders", "ORD-9"));
    assert!(!selector.is_set_value(Severity::Error, "orders", "ORD-X"));

    selector.remove("orders").expect("remove");
    assert_eq!(std::fs::read_to_string(&url).expect("read"), "# managed\n");
}

#[tokio::test]
async fn rewiring_switches_stores() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = store(&dir, "first.properties", "orders=FATAL\n");
    let second = store(&dir, "second.properties", "orders=TRACE\n");

    let first_repo = FileRepository::new(FileRepositorySettings::new(first, Duration::ZERO));
    let selector = DefaultSelector::with_repository(Arc::new(first_repo.clone()), true);
    selector.open().await.expect("open");
    assert!(!selector.is_set(Severity::Info, "orders"));

    let second_repo = FileRepository::new(FileRepositorySettings::new(second, Duration::ZERO));
    selector
        .set_repository(Some(Arc::new(second_repo.clone())))
        .await
        .expect("rewire");

    assert!(!first_repo.is_open());
    assert!(second_repo.is_open());
    assert!(selector.is_set(Severity::Info, "orders"));

    selector.set_repository(None).await.expect("detach");
    assert!(selector.is_open());
    assert!(!selector.is_defined());
    assert!(!second_repo.is_open());
    assert!(selector.is_set(Severity::Trace, "orders"));
}

#[tokio::test]
async fn reopen_picks_up_edits_without_polling() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = store(&dir, "trace.properties", "orders=FATAL\n");
    let repo = FileRepository::new(FileRepositorySettings::new(url.clone(), Duration::ZERO));
    let selector = DefaultSelector::with_repository(Arc::new(repo), true);
    selector.open().await.expect("open");

    std::fs::write(&url, "orders=DEBUG\n").expect("edit");
    assert!(!selector.is_set(Severity::Info, "orders"));

    selector.reopen().await.expect("reopen");
    assert!(selector.is_set(Severity::Info, "orders"));
}
