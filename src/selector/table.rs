//! Token map published as immutable snapshots.
//!
//! Readers load the current [`TokenMap`] through an `ArcSwap` without
//! taking a lock. Writers build a complete replacement map off to the side
//! and publish it with one pointer swap, so a reader sees either the whole
//! previous map or the whole new one. Writers are serialized among
//! themselves so incremental updates are never lost.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::{ArcSwap, Guard};
use tracing::{debug, warn};

use crate::models::token::PolicyToken;
use crate::repository::StoreSnapshot;
use crate::Result;

/// One published version of the token map.
#[derive(Debug, Default)]
pub struct TokenMap {
    generation: u64,
    tokens: HashMap<String, Arc<PolicyToken>>,
}

impl TokenMap {
    /// Monotonically increasing version number; the empty initial map is 0.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PolicyToken> {
        self.tokens.get(key).map(AsRef::as_ref)
    }

    /// Recorded keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tokens.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Iterate over key/token pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PolicyToken)> {
        self.tokens.iter().map(|(k, t)| (k.as_str(), t.as_ref()))
    }

    /// Number of recorded tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Concurrently readable, atomically replaced token map.
#[derive(Default)]
pub struct TokenTable {
    current: ArcSwap<TokenMap>,
    writer: Mutex<()>,
}

impl TokenTable {
    /// Empty table at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock-free view of the current map for a single lookup.
    #[must_use]
    pub fn load(&self) -> Guard<Arc<TokenMap>> {
        self.current.load()
    }

    /// Owned handle on the current map.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TokenMap> {
        self.current.load_full()
    }

    /// Replace the whole map with tokens parsed from `source()`.
    ///
    /// `source` runs while writers are excluded, so an incremental update
    /// racing the rebuild is applied either to the snapshot it reads or on
    /// top of the published result. If `source` fails the current map is
    /// kept.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `source`.
    pub fn rebuild_from<F>(&self, source: F) -> Result<u64>
    where
        F: FnOnce() -> Result<StoreSnapshot>,
    {
        let _writer = self.lock_writer();
        let entries = source()?;
        let tokens = entries
            .iter()
            .filter_map(|(key, raw)| compile(key, raw).map(|token| (key.clone(), token)))
            .collect::<HashMap<_, _>>();
        let rejected = entries.len() - tokens.len();
        let generation = self.publish(tokens);
        debug!(generation, rejected, "token map rebuilt");
        Ok(generation)
    }

    /// Insert or replace the token for `key`.
    ///
    /// A value that fails to parse removes any previous token so the key
    /// falls back to the default policy.
    pub fn upsert(&self, key: &str, raw: &str) {
        let _writer = self.lock_writer();
        let mut tokens = self.current.load().tokens.clone();
        match compile(key, raw) {
            Some(token) => {
                tokens.insert(key.to_owned(), token);
            }
            None => {
                tokens.remove(key);
            }
        }
        self.publish(tokens);
    }

    /// Remove the token for `key`.
    pub fn remove(&self, key: &str) {
        let _writer = self.lock_writer();
        let current = self.current.load();
        if !current.tokens.contains_key(key) {
            return;
        }
        let mut tokens = current.tokens.clone();
        tokens.remove(key);
        self.publish(tokens);
    }

    /// Remove every token.
    pub fn clear(&self) {
        let _writer = self.lock_writer();
        self.publish(HashMap::new());
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in a new map. Callers hold the writer lock.
    fn publish(&self, tokens: HashMap<String, Arc<PolicyToken>>) -> u64 {
        let generation = self.current.load().generation + 1;
        self.current.store(Arc::new(TokenMap { generation, tokens }));
        generation
    }
}

/// Parse one repository value, logging and skipping a malformed one.
fn compile(key: &str, raw: &str) -> Option<Arc<PolicyToken>> {
    match PolicyToken::parse(raw) {
        Ok(token) => Some(Arc::new(token)),
        Err(err) => {
            warn!(key, raw, %err, "rejected policy token; key falls back to default");
            None
        }
    }
}
