//! File-, URL- and resource-backed repository with polling reload.
//!
//! The store is a line-oriented `key=value` document (see
//! [`StoreDocument`]). When a refresh interval is configured, a background
//! poller compares the store's modification signal every interval and, on
//! any external change, re-reads the whole store and emits a single
//! `Reloaded` event. Per-key events are produced only by this repository's
//! own `set`/`remove`/`clear`.
//!
//! ## Change detection
//!
//! Filesystem stores are checked by modification time and length first;
//! only when those differ is the file read and its SHA-256 digest compared.
//! Remote stores are fetched every cycle and compared by digest. Embedded
//! resources never change and are never polled.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn, Instrument};

use super::location::{Location, ResourceBundle};
use super::poller::{spawn_poller, PollControl, PollerHandle};
use super::store::{check_entry, StoreDocument};
use super::{ListenerId, ListenerRegistry, Repository, RepositoryListener, StoreSnapshot};
use crate::models::event::{ChangeEvent, RepositoryId};
use crate::{AppError, Result};

/// Default bound on how long `close` waits for an in-flight poll cycle.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Request timeout for remote stores.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction parameters for a [`FileRepository`].
#[derive(Debug, Clone)]
pub struct FileRepositorySettings {
    /// Store location; `None` or blank leaves the repository undefined.
    pub url: Option<String>,
    /// Poll interval; zero disables polling.
    pub refresh: Duration,
    /// Bound on the wait for an in-flight poll cycle during `close`.
    pub close_timeout: Duration,
    /// Embedded resources consulted during location resolution.
    pub resources: ResourceBundle,
}

impl Default for FileRepositorySettings {
    fn default() -> Self {
        Self {
            url: None,
            refresh: Duration::ZERO,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            resources: ResourceBundle::default(),
        }
    }
}

impl FileRepositorySettings {
    /// Settings for `url` polled every `refresh` (zero disables polling).
    #[must_use]
    pub fn new(url: impl Into<String>, refresh: Duration) -> Self {
        Self {
            url: Some(url.into()),
            refresh,
            ..Self::default()
        }
    }
}

/// Modification signal of the store as last read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: Option<u64>,
    digest: [u8; 32],
}

struct Loaded {
    text: String,
    modified: Option<SystemTime>,
    len: Option<u64>,
}

impl Loaded {
    fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            modified: self.modified,
            len: self.len,
            digest: digest(&self.text),
        }
    }
}

struct OpenStore {
    location: Location,
    document: StoreDocument,
    entries: StoreSnapshot,
    fingerprint: Fingerprint,
    client: Option<reqwest::Client>,
    failing: bool,
}

struct Inner {
    id: RepositoryId,
    settings: FileRepositorySettings,
    listeners: ListenerRegistry,
    state: RwLock<Option<OpenStore>>,
    /// Serializes store mutation with event delivery so every listener sees
    /// events in generation order.
    dispatch: Mutex<()>,
    /// Serializes open/close and owns the running poller.
    poller: tokio::sync::Mutex<Option<PollerHandle>>,
}

/// Repository backed by a filesystem path, an `http(s)` URL, or an
/// embedded resource.
///
/// Cloning yields another handle to the same repository.
#[derive(Clone)]
pub struct FileRepository {
    inner: Arc<Inner>,
}

impl FileRepository {
    /// Create a closed repository.
    #[must_use]
    pub fn new(settings: FileRepositorySettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: RepositoryId::new(),
                settings,
                listeners: ListenerRegistry::new(),
                state: RwLock::new(None),
                dispatch: Mutex::new(()),
                poller: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Create a repository with no location; it stays undefined.
    #[must_use]
    pub fn undefined() -> Self {
        Self::new(FileRepositorySettings::default())
    }

    /// Configured location string.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.inner.settings.url.as_deref()
    }

    /// Configured poll interval.
    #[must_use]
    pub fn refresh(&self) -> Duration {
        self.inner.settings.refresh
    }

    /// Whether a background poller is currently running.
    pub async fn is_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn mutate<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut StoreDocument) -> Option<ChangeEvent>,
    {
        let _order = self
            .inner
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // The dispatch lock excludes every other writer of `state`, so the
        // document read here is still current when the swap happens below.
        let (path, mut document) = self.read_state(|store| match &store.location {
            Location::Path(path) => Ok((path.clone(), store.document.clone())),
            other => Err(AppError::ReadOnly(format!(
                "store '{other}' cannot be modified"
            ))),
        })??;

        let Some(event) = op(&mut document) else {
            return Ok(());
        };
        let text = document.render();
        let staged = stage_write(&path, &text)?;

        {
            let mut guard = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let store = guard.as_mut().ok_or_else(|| self.not_open())?;
            persist_write(staged, &path)?;
            let metadata = std::fs::metadata(&path).ok();

            store.fingerprint = Fingerprint {
                modified: metadata.as_ref().and_then(|m| m.modified().ok()),
                len: metadata.as_ref().map(std::fs::Metadata::len),
                digest: digest(&text),
            };
            store.entries = Arc::new(document.entries());
            store.document = document;
        }

        debug!(kind = ?event.kind, key = ?event.key, "store updated");
        self.inner.listeners.dispatch(&event);
        Ok(())
    }

    fn not_open(&self) -> AppError {
        AppError::NotOpen(format!(
            "repository '{}' is closed",
            self.url().unwrap_or_default()
        ))
    }

    fn read_state<T>(&self, f: impl FnOnce(&OpenStore) -> T) -> Result<T> {
        let guard = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(f).ok_or_else(|| self.not_open())
    }

    async fn open_store(&self) -> Result<()> {
        let mut poller = self.inner.poller.lock().await;
        if self.is_open() {
            return Ok(());
        }

        let raw = self
            .url()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::Config("no store location configured".into()))?;
        let location = Location::resolve(raw, &self.inner.settings.resources)?;
        let client = match location {
            Location::Remote(_) => Some(build_client()?),
            _ => None,
        };
        let loaded = load(&location, client.as_ref())
            .await
            .map_err(|err| AppError::Config(format!("cannot read store '{location}': {err}")))?;

        let document = StoreDocument::parse(&loaded.text);
        let entries = Arc::new(document.entries());
        let key_count = entries.len();
        let pollable = location.is_pollable();
        let label = location.to_string();

        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(OpenStore {
            fingerprint: loaded.fingerprint(),
            location,
            document,
            entries,
            client,
            failing: false,
        });

        let refresh = self.inner.settings.refresh;
        if !refresh.is_zero() && pollable {
            let weak = Arc::downgrade(&self.inner);
            *poller = Some(spawn_poller(label.clone(), refresh, move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            inner.poll_cycle().await;
                            PollControl::Continue
                        }
                        None => PollControl::Stop,
                    }
                }
            }));
        }

        info!(
            store = %label,
            keys = key_count,
            refresh_ms = u64::try_from(refresh.as_millis()).unwrap_or(u64::MAX),
            polling = poller.is_some(),
            "repository opened"
        );
        Ok(())
    }

    async fn close_store(&self) {
        let mut poller = self.inner.poller.lock().await;
        if let Some(handle) = poller.take() {
            handle.stop(self.inner.settings.close_timeout).await;
        }

        let released = {
            let _order = self
                .inner
                .dispatch
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        };

        if let Some(store) = released {
            info!(store = %store.location, "repository closed");
        }
    }
}

impl Inner {
    /// One poll cycle: detect a change, reload, notify.
    async fn poll_cycle(&self) {
        let sampled = {
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            guard.as_ref().map(|store| {
                (
                    store.location.clone(),
                    store.client.clone(),
                    store.fingerprint.clone(),
                )
            })
        };
        let Some((location, client, fingerprint)) = sampled else {
            return;
        };

        if let Location::Path(path) = &location {
            if let Ok(metadata) = tokio::fs::metadata(path).await {
                let unchanged = metadata.modified().ok() == fingerprint.modified
                    && Some(metadata.len()) == fingerprint.len;
                if unchanged && fingerprint.modified.is_some() {
                    return;
                }
            }
        }

        match load(&location, client.as_ref()).await {
            Ok(loaded) => self.publish_reload(&loaded, &fingerprint),
            Err(err) => self.report_failure(&location, err),
        }
    }

    fn publish_reload(&self, loaded: &Loaded, sampled: &Fingerprint) {
        let _order = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let key_count = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let Some(store) = guard.as_mut() else {
                return;
            };
            if store.fingerprint != *sampled {
                debug!("store changed while polling; deferring to next cycle");
                return;
            }
            store.failing = false;

            let fingerprint = loaded.fingerprint();
            if fingerprint.digest == store.fingerprint.digest {
                store.fingerprint = fingerprint;
                return;
            }

            let document = StoreDocument::parse(&loaded.text);
            store.entries = Arc::new(document.entries());
            store.document = document;
            store.fingerprint = fingerprint;
            store.entries.len()
        };

        let _span = info_span!("repository_reload", source = %self.id).entered();
        info!(keys = key_count, "store changed externally; reloaded");
        self.listeners.dispatch(&ChangeEvent::reloaded(self.id));
    }

    fn report_failure(&self, location: &Location, err: AppError) {
        let _order = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let Some(store) = guard.as_mut() else {
                return;
            };
            if store.failing {
                debug!(store = %location, %err, "store still unreadable");
                return;
            }
            store.failing = true;
        }

        warn!(store = %location, %err, "failed to poll store; keeping previous state");
        self.listeners.dispatch(&ChangeEvent::error(self.id, err));
    }
}

impl Repository for FileRepository {
    fn id(&self) -> RepositoryId {
        self.inner.id
    }

    fn is_defined(&self) -> bool {
        self.url().is_some_and(|url| !url.trim().is_empty())
    }

    fn is_open(&self) -> bool {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read_state(|store| store.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_entry(key, value)?;
        let id = self.inner.id;
        self.mutate(|document| {
            let previous = document.set(key, value);
            Some(ChangeEvent::key_set(id, key, value, previous.is_some()))
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let id = self.inner.id;
        self.mutate(|document| {
            document
                .remove(key)
                .map(|_| ChangeEvent::key_cleared(id, key))
        })
    }

    fn clear(&self) -> Result<()> {
        let id = self.inner.id;
        self.mutate(|document| document.clear().then(|| ChangeEvent::cleared(id)))
    }

    fn snapshot(&self) -> Result<StoreSnapshot> {
        self.read_state(|store| Arc::clone(&store.entries))
    }

    fn add_listener(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let span = info_span!("repository_open", source = %self.inner.id);
        Box::pin(self.open_store().instrument(span))
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let span = info_span!("repository_close", source = %self.inner.id);
        Box::pin(self.close_store().instrument(span))
    }
}

fn digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))
}

async fn load(location: &Location, client: Option<&reqwest::Client>) -> Result<Loaded> {
    match location {
        Location::Path(path) => {
            let metadata = tokio::fs::metadata(path).await.map_err(|err| {
                AppError::Io(format!("failed to stat '{}': {err}", path.display()))
            })?;
            let text = tokio::fs::read_to_string(path).await.map_err(|err| {
                AppError::Io(format!("failed to read '{}': {err}", path.display()))
            })?;
            Ok(Loaded {
                text,
                modified: metadata.modified().ok(),
                len: Some(metadata.len()),
            })
        }
        Location::Remote(url) => {
            let client = client
                .ok_or_else(|| AppError::Http(format!("no http client for '{url}'")))?;
            let text = client
                .get(url.as_str())
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok(Loaded {
                text,
                modified: None,
                len: None,
            })
        }
        Location::Resource { text, .. } => Ok(Loaded {
            text: (*text).to_owned(),
            modified: None,
            len: None,
        }),
    }
}

/// Write `text` to a temp file next to `path` and flush it to disk.
fn stage_write(path: &Path, text: &str) -> Result<tempfile::NamedTempFile> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|err| {
        AppError::Repository(format!("failed to stage write for '{}': {err}", path.display()))
    })?;
    staged
        .write_all(text.as_bytes())
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|err| {
            AppError::Repository(format!("failed to write '{}': {err}", path.display()))
        })?;
    Ok(staged)
}

/// Rename a staged temp file over `path`.
fn persist_write(staged: tempfile::NamedTempFile, path: &Path) -> Result<()> {
    staged.persist(path).map_err(|err| {
        AppError::Repository(format!(
            "failed to replace '{}': {}",
            path.display(),
            err.error
        ))
    })?;
    Ok(())
}
