//! Repository change notifications.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::AppError;

/// Identity of one repository instance, carried as the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryId(Uuid);

impl RepositoryId {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RepositoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RepositoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change a repository observed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A key that did not exist was added.
    KeyAdded,
    /// An existing key received a new value.
    KeySet,
    /// A single key was removed.
    KeyCleared,
    /// Every key was removed.
    Cleared,
    /// The whole store was re-read; listeners must re-enumerate.
    Reloaded,
    /// The store could not be read; previous state is still in effect.
    Error,
}

/// Immutable notification delivered to repository listeners.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    /// Repository that generated the event.
    pub source: RepositoryId,
    /// What happened.
    pub kind: ChangeKind,
    /// Affected key for per-key events.
    pub key: Option<String>,
    /// New value for `KeyAdded` / `KeySet`.
    pub value: Option<String>,
    /// Failure behind an `Error` event.
    #[serde(serialize_with = "serialize_cause")]
    pub cause: Option<Arc<AppError>>,
    /// When the event was generated.
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    fn new(source: RepositoryId, kind: ChangeKind) -> Self {
        Self {
            source,
            kind,
            key: None,
            value: None,
            cause: None,
            at: Utc::now(),
        }
    }

    /// `KeyAdded` or `KeySet`, depending on whether the key existed before.
    #[must_use]
    pub fn key_set(source: RepositoryId, key: &str, value: &str, existed: bool) -> Self {
        let kind = if existed {
            ChangeKind::KeySet
        } else {
            ChangeKind::KeyAdded
        };
        Self {
            key: Some(key.to_owned()),
            value: Some(value.to_owned()),
            ..Self::new(source, kind)
        }
    }

    /// A single key was removed.
    #[must_use]
    pub fn key_cleared(source: RepositoryId, key: &str) -> Self {
        Self {
            key: Some(key.to_owned()),
            ..Self::new(source, ChangeKind::KeyCleared)
        }
    }

    /// Every key was removed.
    #[must_use]
    pub fn cleared(source: RepositoryId) -> Self {
        Self::new(source, ChangeKind::Cleared)
    }

    /// The store was fully re-read.
    #[must_use]
    pub fn reloaded(source: RepositoryId) -> Self {
        Self::new(source, ChangeKind::Reloaded)
    }

    /// The store could not be read.
    #[must_use]
    pub fn error(source: RepositoryId, cause: AppError) -> Self {
        Self {
            cause: Some(Arc::new(cause)),
            ..Self::new(source, ChangeKind::Error)
        }
    }
}

fn serialize_cause<S>(cause: &Option<Arc<AppError>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match cause {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}
