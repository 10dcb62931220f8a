//! Backing key/value stores for policy tokens.
//!
//! A [`Repository`] owns the external handle (file, URL, embedded resource
//! or in-process map), its optional background poller, and the listeners
//! interested in its [`ChangeEvent`]s. Listener registrations belong to the
//! repository instance; nothing is shared process-wide.

pub mod file;
pub mod location;
pub mod memory;
pub mod poller;
pub mod store;

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::error;

use crate::models::event::{ChangeEvent, RepositoryId};
use crate::Result;

pub use file::FileRepository;
pub use memory::MemoryRepository;

/// Immutable view of every key/value pair in a store at one instant.
pub type StoreSnapshot = Arc<BTreeMap<String, String>>;

/// Receiver of repository change notifications.
///
/// Callbacks run synchronously on the thread that generated the event
/// (the poller, or the caller of `set`/`remove`/`clear`). They must not
/// block on I/O and must not call back into the repository's mutating
/// operations. A panicking listener is logged and skipped; delivery to the
/// remaining listeners continues.
pub trait RepositoryListener: Send + Sync {
    /// Handle one change event.
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> RepositoryListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event);
    }
}

/// Handle returned by [`Repository::add_listener`], used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// External key/value store with an open/close lifecycle and change
/// notifications.
pub trait Repository: Send + Sync {
    /// Identity carried as the source of every emitted event.
    fn id(&self) -> RepositoryId;

    /// Whether a store location is configured.
    ///
    /// Distinguishes "policy disabled" from "policy says no".
    fn is_defined(&self) -> bool;

    /// Whether the store is currently open.
    fn is_open(&self) -> bool;

    /// Current value of `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotOpen` if the repository is closed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` and emit `KeyAdded` or `KeySet`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotOpen`, `AppError::ReadOnly`, or
    /// `AppError::Repository` if the write fails.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key` and emit `KeyCleared` if it existed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`set`](Self::set).
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key and emit `Cleared`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`set`](Self::set).
    fn clear(&self) -> Result<()>;

    /// Keys present at call time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotOpen` if the repository is closed.
    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.keys().cloned().collect())
    }

    /// Consistent copy of the whole store.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotOpen` if the repository is closed.
    fn snapshot(&self) -> Result<StoreSnapshot>;

    /// Register interest in change events.
    fn add_listener(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId;

    /// Deregister a listener. Returns whether it was registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Resolve the location, read the store and start polling if configured.
    ///
    /// Opening an already open repository is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the location is missing, cannot be
    /// resolved, or cannot be read. The repository stays closed.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stop the poller and release the store. Idempotent.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Close, re-resolve and open. Listener registrations are kept.
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
}

/// Per-repository listener list with isolated fan-out.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn RepositoryListener>)>>,
}

impl ListenerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Deregister a listener.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut guard = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|(registered, _)| *registered != id);
        guard.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener registered at call time.
    ///
    /// The list is copied before delivery so listeners may register or
    /// deregister concurrently.
    pub fn dispatch(&self, event: &ChangeEvent) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_change(event))).is_err() {
                error!(
                    listener = id.0,
                    source = %event.source,
                    kind = ?event.kind,
                    "repository listener panicked; continuing delivery"
                );
            }
        }
    }
}
