//! Default selector: token table kept in sync with a repository.
//!
//! ## Lifecycle
//!
//! `Closed → Open(loading) → Live → Closed`. [`open`](Selector::open)
//! opens the repository, registers the table listener, then loads every
//! token before returning. While live, per-key events replace single
//! entries and `Reloaded` rebuilds the whole map as one new generation.
//! [`close`](Selector::close) deregisters the listener and stops the
//! repository before the map is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, info, info_span, warn, Instrument};

use super::table::{TokenMap, TokenTable};
use super::Selector;
use crate::models::event::{ChangeEvent, ChangeKind};
use crate::models::severity::Severity;
use crate::models::token::PolicyToken;
use crate::repository::{ListenerId, Repository, RepositoryListener};
use crate::{AppError, Result};

/// Fail open: emit when no policy is recorded.
pub const DEFAULT_WHEN_UNDEFINED: bool = true;

/// Applies repository change events to the token table.
struct TableListener {
    table: Arc<TokenTable>,
    repository: Weak<dyn Repository>,
}

impl RepositoryListener for TableListener {
    fn on_change(&self, event: &ChangeEvent) {
        match (event.kind, event.key.as_deref()) {
            (ChangeKind::KeyAdded | ChangeKind::KeySet, Some(key)) => {
                self.table.upsert(key, event.value.as_deref().unwrap_or_default());
            }
            (ChangeKind::KeyCleared, Some(key)) => self.table.remove(key),
            (ChangeKind::Cleared, _) => self.table.clear(),
            (ChangeKind::Reloaded, _) => {
                let Some(repository) = self.repository.upgrade() else {
                    return;
                };
                // A store that cannot be read never emits `Reloaded`; the
                // repository sends `Error` instead and keeps its last good
                // snapshot. The snapshot read here fails only when the
                // repository closed mid-dispatch, and listeners must not call
                // back into it to report that, so the previous map is kept.
                match self.table.rebuild_from(|| repository.snapshot()) {
                    Ok(generation) => info!(generation, "token map reloaded"),
                    Err(err) => warn!(%err, "reload enumeration failed; keeping previous tokens"),
                }
            }
            (ChangeKind::Error, _) => {
                let cause = event
                    .cause
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                warn!(source = %event.source, cause, "repository reported an error");
            }
            (kind, None) => debug!(?kind, "ignoring keyless per-key event"),
        }
    }
}

/// Lifecycle bookkeeping, guarded by an async mutex.
#[derive(Default)]
struct Wiring {
    listener: Option<ListenerId>,
}

/// Selector evaluating [`PolicyToken`]s held in an in-memory
/// [`TokenTable`].
pub struct DefaultSelector {
    default_when_undefined: bool,
    table: Arc<TokenTable>,
    repository: RwLock<Option<Arc<dyn Repository>>>,
    wiring: tokio::sync::Mutex<Wiring>,
    open: AtomicBool,
    defined: AtomicBool,
}

impl Default for DefaultSelector {
    fn default() -> Self {
        Self::new(DEFAULT_WHEN_UNDEFINED)
    }
}

impl DefaultSelector {
    /// Closed selector with no repository.
    #[must_use]
    pub fn new(default_when_undefined: bool) -> Self {
        Self {
            default_when_undefined,
            table: Arc::new(TokenTable::new()),
            repository: RwLock::new(None),
            wiring: tokio::sync::Mutex::new(Wiring::default()),
            open: AtomicBool::new(false),
            defined: AtomicBool::new(false),
        }
    }

    /// Closed selector backed by `repository`.
    #[must_use]
    pub fn with_repository(repository: Arc<dyn Repository>, default_when_undefined: bool) -> Self {
        let selector = Self::new(default_when_undefined);
        *selector.write_repository() = Some(repository);
        selector
    }

    /// Value returned when no policy applies.
    #[must_use]
    pub fn default_when_undefined(&self) -> bool {
        self.default_when_undefined
    }

    /// Current token map; every key in it belongs to one reload generation.
    #[must_use]
    pub fn tokens(&self) -> Arc<TokenMap> {
        self.table.snapshot()
    }

    /// Generation number of the current token map.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.table.load().generation()
    }

    fn write_repository(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<dyn Repository>>> {
        self.repository
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn defined_repository(&self) -> Result<Arc<dyn Repository>> {
        self.repository()
            .filter(|repository| repository.is_defined())
            .ok_or_else(|| AppError::Repository("selector has no defined repository".into()))
    }

    async fn open_wired(&self, wiring: &mut Wiring) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            return Ok(());
        }

        let Some(repository) = self.repository().filter(|r| r.is_defined()) else {
            self.open.store(true, Ordering::Release);
            info!("selector opened without a repository; default policy applies");
            return Ok(());
        };

        repository.open().await?;

        let listener = Arc::new(TableListener {
            table: Arc::clone(&self.table),
            repository: Arc::downgrade(&repository),
        });
        let id = repository.add_listener(listener);

        match self.table.rebuild_from(|| repository.snapshot()) {
            Ok(generation) => {
                wiring.listener = Some(id);
                self.defined.store(true, Ordering::Release);
                self.open.store(true, Ordering::Release);
                info!(
                    generation,
                    tokens = self.table.load().len(),
                    "selector opened"
                );
                Ok(())
            }
            Err(err) => {
                repository.remove_listener(id);
                repository.close().await;
                Err(err)
            }
        }
    }

    async fn close_wired(&self, wiring: &mut Wiring) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(repository) = self.repository() {
            if let Some(id) = wiring.listener.take() {
                repository.remove_listener(id);
            }
            repository.close().await;
        }

        self.defined.store(false, Ordering::Release);
        self.table.clear();
        info!("selector closed");
    }
}

impl Selector for DefaultSelector {
    fn evaluate(&self, severity: Severity, key: &str, value: Option<&str>) -> bool {
        if !self.defined.load(Ordering::Acquire) {
            return self.default_when_undefined;
        }
        self.table
            .load()
            .get(key)
            .map_or(self.default_when_undefined, |token| {
                token.matches(severity, value)
            })
    }

    fn set(&self, severity: Severity, key: &str, value: Option<&str>) -> Result<()> {
        self.defined_repository()?
            .set(key, &PolicyToken::render(severity, value))
    }

    fn get(&self, key: &str) -> Option<String> {
        self.table.load().get(key).map(|token| token.raw().to_owned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.defined_repository()?.remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.table.load().keys()
    }

    fn repository(&self) -> Option<Arc<dyn Repository>> {
        self.repository
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_repository(
        &self,
        repository: Option<Arc<dyn Repository>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut wiring = self.wiring.lock().await;
            let was_open = self.open.load(Ordering::Acquire);
            if was_open {
                self.close_wired(&mut wiring).await;
            }
            *self.write_repository() = repository;
            if was_open {
                self.open_wired(&mut wiring).await?;
            }
            Ok(())
        })
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(
            async move {
                let mut wiring = self.wiring.lock().await;
                self.open_wired(&mut wiring).await
            }
            .instrument(info_span!("selector_open")),
        )
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(
            async move {
                let mut wiring = self.wiring.lock().await;
                self.close_wired(&mut wiring).await;
            }
            .instrument(info_span!("selector_close")),
        )
    }

    fn reopen(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut wiring = self.wiring.lock().await;
            self.close_wired(&mut wiring).await;
            self.open_wired(&mut wiring).await
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn is_defined(&self) -> bool {
        self.repository().is_some_and(|r| r.is_defined())
    }
}
