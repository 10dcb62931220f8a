//! In-process repository.
//!
//! Holds its entries in memory; contents survive `close`/`open`. There is
//! nothing to poll, so reloads happen only through [`MemoryRepository::replace_all`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use super::store::check_entry;
use super::{ListenerId, ListenerRegistry, Repository, RepositoryListener, StoreSnapshot};
use crate::models::event::{ChangeEvent, RepositoryId};
use crate::{AppError, Result};

#[derive(Default)]
struct Inner {
    id: RepositoryId,
    listeners: ListenerRegistry,
    entries: RwLock<StoreSnapshot>,
    open: AtomicBool,
    dispatch: Mutex<()>,
}

/// Repository whose store lives in process memory.
///
/// Cloning yields another handle to the same repository.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Inner>,
}

impl MemoryRepository {
    /// Empty, closed repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed repository pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let repo = Self::new();
        *repo.write_entries() = Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        repo
    }

    /// Replace the whole store and emit a single `Reloaded` event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotOpen` if the repository is closed.
    pub fn replace_all(&self, entries: BTreeMap<String, String>) -> Result<()> {
        let _order = self.lock_dispatch();
        self.ensure_open()?;
        *self.write_entries() = Arc::new(entries);
        self.inner
            .listeners
            .dispatch(&ChangeEvent::reloaded(self.inner.id));
        Ok(())
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    fn lock_dispatch(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, StoreSnapshot> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AppError::NotOpen("memory repository is closed".into()))
        }
    }

    fn mutate<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Option<ChangeEvent>,
    {
        let _order = self.lock_dispatch();
        self.ensure_open()?;
        let event = {
            let mut guard = self.write_entries();
            let mut entries = (**guard).clone();
            let Some(event) = op(&mut entries) else {
                return Ok(());
            };
            *guard = Arc::new(entries);
            event
        };
        debug!(kind = ?event.kind, key = ?event.key, "memory store updated");
        self.inner.listeners.dispatch(&event);
        Ok(())
    }
}

impl Repository for MemoryRepository {
    fn id(&self) -> RepositoryId {
        self.inner.id
    }

    fn is_defined(&self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_entry(key, value)?;
        let id = self.inner.id;
        self.mutate(|entries| {
            let previous = entries.insert(key.to_owned(), value.to_owned());
            Some(ChangeEvent::key_set(id, key, value, previous.is_some()))
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let id = self.inner.id;
        self.mutate(|entries| {
            entries
                .remove(key)
                .map(|_| ChangeEvent::key_cleared(id, key))
        })
    }

    fn clear(&self) -> Result<()> {
        let id = self.inner.id;
        self.mutate(|entries| {
            if entries.is_empty() {
                return None;
            }
            entries.clear();
            Some(ChangeEvent::cleared(id))
        })
    }

    fn snapshot(&self) -> Result<StoreSnapshot> {
        self.ensure_open()?;
        let guard = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&*guard))
    }

    fn add_listener(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.inner.open.swap(true, Ordering::AcqRel) {
                info!(source = %self.inner.id, "memory repository opened");
            }
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let _order = self.lock_dispatch();
            if self.inner.open.swap(false, Ordering::AcqRel) {
                info!(source = %self.inner.id, "memory repository closed");
            }
        })
    }
}
