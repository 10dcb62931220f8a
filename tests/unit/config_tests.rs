//! Unit tests for selector configuration parsing and environment overrides.

use std::time::Duration;

use serial_test::serial;
use trace_selector::config::{RepositoryKind, REFRESH_TIME_ENV, URL_ENV};
use trace_selector::repository::location::ResourceBundle;
use trace_selector::{AppError, Selector, SelectorConfig};

const FULL: &str = r#"
default_when_undefined = false

[repository]
kind = "file"
url = "conf/trace.properties"
refresh_time = 5000
close_timeout_ms = 750
"#;

#[test]
fn parses_full_config() {
    let config = SelectorConfig::from_toml_str(FULL).expect("config parses");

    assert!(!config.default_when_undefined);
    assert_eq!(config.repository.kind, RepositoryKind::File);
    assert_eq!(
        config.repository.url.as_deref(),
        Some("conf/trace.properties")
    );
    assert_eq!(config.repository.refresh(), Duration::from_secs(5));
    assert_eq!(config.repository.close_timeout_ms, 750);
}

#[test]
fn empty_config_fails_open_without_polling() {
    let config = SelectorConfig::from_toml_str("").expect("config parses");

    assert!(config.default_when_undefined);
    assert_eq!(config.repository.kind, RepositoryKind::File);
    assert!(config.repository.url.is_none());
    assert_eq!(config.repository.refresh_time, 0);
    assert_eq!(config.repository.close_timeout_ms, 2000);
}

#[test]
fn rejects_zero_close_timeout() {
    let err = SelectorConfig::from_toml_str("[repository]\nclose_timeout_ms = 0\n")
        .expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_url_on_memory_repository() {
    let err = SelectorConfig::from_toml_str("[repository]\nkind = \"memory\"\nurl = \"x\"\n")
        .expect_err("must fail");
    assert!(err.to_string().contains("memory repository"));
}

#[test]
fn rejects_unknown_repository_kind() {
    let err = SelectorConfig::from_toml_str("[repository]\nkind = \"jdbc\"\n")
        .expect_err("must fail");
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = SelectorConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("must fail");
    assert!(err.to_string().starts_with("config: failed to read config"));
}

#[test]
fn blank_url_builds_undefined_selector() {
    let config =
        SelectorConfig::from_toml_str("[repository]\nurl = \"  \"\n").expect("config parses");
    let selector = config.build_selector(ResourceBundle::new());

    assert!(selector.repository().is_some());
    assert!(!selector.is_defined());
}

#[test]
fn memory_kind_builds_defined_selector() {
    let config = SelectorConfig::from_toml_str("[repository]\nkind = \"memory\"\n")
        .expect("config parses");
    let selector = config.build_selector(ResourceBundle::new());
    assert!(selector.is_defined());
}

#[test]
#[serial]
fn env_overrides_url_and_refresh() {
    std::env::set_var(URL_ENV, "/tmp/override.properties");
    std::env::set_var(REFRESH_TIME_ENV, "250");

    let mut config = SelectorConfig::from_toml_str(FULL).expect("config parses");
    let result = config.apply_env_overrides();

    std::env::remove_var(URL_ENV);
    std::env::remove_var(REFRESH_TIME_ENV);

    result.expect("overrides apply");
    assert_eq!(
        config.repository.url.as_deref(),
        Some("/tmp/override.properties")
    );
    assert_eq!(config.repository.refresh(), Duration::from_millis(250));
}

#[test]
#[serial]
fn malformed_refresh_override_is_config_error() {
    std::env::set_var(REFRESH_TIME_ENV, "soon");

    let mut config = SelectorConfig::default();
    let result = config.apply_env_overrides();

    std::env::remove_var(REFRESH_TIME_ENV);

    let err = result.expect_err("must fail");
    assert!(err.to_string().contains(REFRESH_TIME_ENV));
}

#[test]
#[serial]
fn no_env_leaves_config_untouched() {
    std::env::remove_var(URL_ENV);
    std::env::remove_var(REFRESH_TIME_ENV);

    let mut config = SelectorConfig::from_toml_str(FULL).expect("config parses");
    let before = config.clone();
    config.apply_env_overrides().expect("no overrides");
    assert_eq!(config, before);
}
