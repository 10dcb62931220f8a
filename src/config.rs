//! Selector configuration parsing, validation, and repository construction.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::repository::file::{FileRepositorySettings, DEFAULT_CLOSE_TIMEOUT};
use crate::repository::location::ResourceBundle;
use crate::repository::{FileRepository, MemoryRepository, Repository};
use crate::selector::default::DEFAULT_WHEN_UNDEFINED;
use crate::selector::DefaultSelector;
use crate::{AppError, Result};

/// Environment variable overriding [`RepositoryConfig::url`].
pub const URL_ENV: &str = "TRACE_SELECTOR_URL";

/// Environment variable overriding [`RepositoryConfig::refresh_time`].
pub const REFRESH_TIME_ENV: &str = "TRACE_SELECTOR_REFRESH_TIME";

/// Which repository implementation backs the selector.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    /// Filesystem path, `http(s)` URL, or embedded resource.
    #[default]
    File,
    /// In-process store.
    Memory,
}

/// Backing store settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryConfig {
    /// Repository implementation.
    #[serde(default)]
    pub kind: RepositoryKind,
    /// Store location; absent or blank leaves the selector undefined.
    #[serde(default)]
    pub url: Option<String>,
    /// Poll interval in milliseconds; 0 disables polling.
    #[serde(default)]
    pub refresh_time: u64,
    /// Bound on the wait for an in-flight poll cycle when closing.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_close_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_CLOSE_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

fn default_when_undefined() -> bool {
    DEFAULT_WHEN_UNDEFINED
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            kind: RepositoryKind::default(),
            url: None,
            refresh_time: 0,
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl RepositoryConfig {
    /// Poll interval.
    #[must_use]
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_time)
    }

    /// Construct the configured repository (closed).
    #[must_use]
    pub fn build(&self, resources: ResourceBundle) -> Arc<dyn Repository> {
        match self.kind {
            RepositoryKind::File => Arc::new(FileRepository::new(FileRepositorySettings {
                url: self.url.clone().filter(|url| !url.trim().is_empty()),
                refresh: self.refresh(),
                close_timeout: Duration::from_millis(self.close_timeout_ms),
                resources,
            })),
            RepositoryKind::Memory => Arc::new(MemoryRepository::new()),
        }
    }
}

/// Top-level configuration parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SelectorConfig {
    /// Verdict when no repository is defined or a key has no token.
    #[serde(default = "default_when_undefined")]
    pub default_when_undefined: bool,
    /// Backing store settings.
    #[serde(default)]
    pub repository: RepositoryConfig,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            default_when_undefined: DEFAULT_WHEN_UNDEFINED,
            repository: RepositoryConfig::default(),
        }
    }
}

impl SelectorConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRACE_SELECTOR_URL` / `TRACE_SELECTOR_REFRESH_TIME`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the refresh override is not a
    /// non-negative integer, or the result fails validation.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var(URL_ENV) {
            debug!(url = %url, "store url overridden from environment");
            self.repository.url = Some(url);
        }
        if let Ok(raw) = env::var(REFRESH_TIME_ENV) {
            self.repository.refresh_time = raw.trim().parse().map_err(|err| {
                AppError::Config(format!("{REFRESH_TIME_ENV} must be milliseconds: {err}"))
            })?;
        }
        self.validate()
    }

    /// Build a closed selector wired to the configured repository.
    #[must_use]
    pub fn build_selector(&self, resources: ResourceBundle) -> DefaultSelector {
        DefaultSelector::with_repository(
            self.repository.build(resources),
            self.default_when_undefined,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.repository.close_timeout_ms == 0 {
            return Err(AppError::Config(
                "close_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.repository.kind == RepositoryKind::Memory
            && self.repository.url.as_deref().is_some_and(|u| !u.trim().is_empty())
        {
            return Err(AppError::Config(
                "a memory repository does not take a url".into(),
            ));
        }

        Ok(())
    }
}
