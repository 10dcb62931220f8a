//! Runtime trace admission policy.
//!
//! A [`Selector`] answers "should this call site emit?" for a severity, a
//! classification key and an optional value. Queries are cheap and never
//! fail; administrative operations go through the backing
//! [`Repository`](crate::repository::Repository).

pub mod default;
pub mod table;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::models::severity::Severity;
use crate::repository::Repository;
use crate::Result;

pub use default::DefaultSelector;

/// Runtime policy evaluator backed by a hot-reloadable repository.
pub trait Selector: Send + Sync {
    /// Evaluate the policy for `key`.
    ///
    /// Never blocks on I/O and never fails; when no repository is defined
    /// or `key` has no accepted token, returns the configured
    /// default-when-undefined value.
    fn evaluate(&self, severity: Severity, key: &str, value: Option<&str>) -> bool;

    /// Whether an event at `severity` for `key` should be emitted.
    fn is_set(&self, severity: Severity, key: &str) -> bool {
        self.evaluate(severity, key, None)
    }

    /// Whether an event at `severity` for `key` carrying `value` should be
    /// emitted.
    fn is_set_value(&self, severity: Severity, key: &str, value: &str) -> bool {
        self.evaluate(severity, key, Some(value))
    }

    /// Record `SEVERITY[:value]` for `key` in the backing repository.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Repository` when no repository is defined, or the
    /// repository's own error when the write fails.
    fn set(&self, severity: Severity, key: &str, value: Option<&str>) -> Result<()>;

    /// Raw value of the accepted token for `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Remove `key` from the backing repository.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`set`](Self::set).
    fn remove(&self, key: &str) -> Result<()>;

    /// Keys with an accepted token, sorted.
    fn keys(&self) -> Vec<String>;

    /// Backing repository, if any.
    fn repository(&self) -> Option<Arc<dyn Repository>>;

    /// Replace the backing repository; an open selector is rewired and
    /// reopened on the new one.
    ///
    /// # Errors
    ///
    /// Returns the error from reopening on the new repository.
    fn set_repository(
        &self,
        repository: Option<Arc<dyn Repository>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Open the repository, subscribe to its changes and load every token.
    ///
    /// # Errors
    ///
    /// Returns the repository's configuration error; the selector stays
    /// closed.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Unsubscribe, close the repository and drop every token. Idempotent.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Close then open.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`open`](Self::open).
    fn reopen(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.close().await;
            self.open().await
        })
    }

    /// Whether the selector is open.
    fn is_open(&self) -> bool;

    /// Whether the selector is backed by a defined repository.
    fn is_defined(&self) -> bool;
}
