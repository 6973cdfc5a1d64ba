//! The provider pool: a shared rotation of interchangeable backends.
//!
//! One pool is built at startup and handed to every request handler as an
//! `Arc<ProviderPool>`. All reads and writes of the entries, the rotation
//! cursor and the counters go through a single mutex, so a selection never
//! observes a half-applied `toggle`/`add`/`remove`.
//!
//! Rotation happens over one canonical candidate list: enabled pool entries
//! in stored order, followed by the configured primary provider. The list is
//! rebuilt under the same lock as the cursor update.
//!
//! Mutations are held in memory and flagged dirty. Persisting is explicit
//! through [`ProviderPool::save`] / [`ProviderPool::save_if_dirty`].
//!
//! The stored document may also be edited by another process (the `parley
//! pool` commands). Request counters are therefore kept as deltas since the
//! last sync: [`ProviderPool::save_if_dirty`] re-reads the stored document,
//! adds the deltas and writes the result, and [`ProviderPool::refresh`]
//! adopts the stored document once the local copy is older than a given age.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use parley_core::store::DEFAULT_RETRY_COUNT;
use parley_core::{PoolDocument, PoolError, ProviderEntry, RecordStore, StoreError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MIN_RETRY_COUNT: u32 = 1;
const MAX_RETRY_COUNT: u32 = 10;

/// Partial update for a pool entry. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
}

struct PoolState {
    entries: Vec<ProviderEntry>,
    primary: Option<ProviderEntry>,
    cursor: usize,
    retry_count: u32,
    retry_on_error: bool,
    loaded: bool,
    /// Local administrative edits not yet saved
    dirty: bool,
    /// Requests counted since the last sync, keyed by (base_url, model)
    pending: HashMap<(String, String), u64>,
    synced_at: Option<Instant>,
}

impl PoolState {
    fn candidates(&self) -> Vec<ProviderEntry> {
        let mut list: Vec<ProviderEntry> =
            self.entries.iter().filter(|e| e.enabled).cloned().collect();
        if let Some(primary) = &self.primary {
            list.push(primary.clone());
        }
        list
    }

    /// Round-robin over `list`, sharing the one cursor.
    fn rotate(&mut self, list: &[ProviderEntry]) -> Result<ProviderEntry, PoolError> {
        if list.is_empty() {
            return Err(PoolError::NoAvailableProvider);
        }
        let index = self.cursor % list.len();
        self.cursor = (index + 1) % list.len();
        let chosen = list[index].clone();
        self.record_request(&chosen);
        Ok(chosen)
    }

    /// Bump the counter of the stored entry with the same endpoint and model.
    fn record_request(&mut self, chosen: &ProviderEntry) {
        if let Some(stored) = self.entries.iter_mut().find(|e| e.same_endpoint(chosen)) {
            stored.request_count += 1;
            *self
                .pending
                .entry((chosen.base_url.clone(), chosen.model.clone()))
                .or_default() += 1;
        } else if let Some(primary) = self.primary.as_mut().filter(|p| p.same_endpoint(chosen)) {
            // The primary lives in config, not in the stored document.
            primary.request_count += 1;
        }
    }

    fn check_index(&self, index: usize) -> Result<(), PoolError> {
        if index >= self.entries.len() {
            return Err(PoolError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(())
    }

    fn document(&self) -> PoolDocument {
        PoolDocument {
            models: self.entries.clone(),
            retry_count: self.retry_count,
            retry_on_error: self.retry_on_error,
        }
    }

    /// Take over entries and retry settings from `doc`. The cursor is kept;
    /// selection reduces it modulo the new candidate count.
    fn adopt(&mut self, doc: PoolDocument) {
        self.entries = doc
            .models
            .into_iter()
            .map(|mut e| {
                if e.name.is_empty() {
                    e.name = e.model.clone();
                }
                e
            })
            .collect();
        self.retry_count = doc.retry_count.clamp(MIN_RETRY_COUNT, MAX_RETRY_COUNT);
        self.retry_on_error = doc.retry_on_error;
        self.loaded = true;
    }

    /// Add pending deltas to the matching entries. Deltas for endpoints no
    /// longer in the pool are dropped.
    fn apply_pending(&mut self, pending: &HashMap<(String, String), u64>) {
        for ((base_url, model), delta) in pending {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| &e.base_url == base_url && &e.model == model)
            {
                entry.request_count += delta;
            }
        }
    }

    fn is_stale(&self, max_age: Duration) -> bool {
        !self.loaded || self.synced_at.is_none_or(|at| at.elapsed() >= max_age)
    }
}

/// Shared rotation of completion backends.
pub struct ProviderPool {
    state: Mutex<PoolState>,
    /// Serializes store round trips so two syncs never interleave.
    sync_gate: tokio::sync::Mutex<()>,
}

impl ProviderPool {
    /// Create an empty, unloaded pool with an optional primary provider.
    pub fn new(primary: Option<ProviderEntry>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                entries: Vec::new(),
                primary,
                cursor: 0,
                retry_count: DEFAULT_RETRY_COUNT,
                retry_on_error: true,
                loaded: false,
                dirty: false,
                pending: HashMap::new(),
                synced_at: None,
            }),
            sync_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a loaded pool from a document. Used by tests and tooling.
    pub fn from_document(doc: PoolDocument, primary: Option<ProviderEntry>) -> Self {
        let pool = Self::new(primary);
        pool.apply_document(doc);
        pool
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply_document(&self, doc: PoolDocument) {
        let mut state = self.lock();
        state.adopt(doc);
        state.cursor = 0;
        state.dirty = false;
        state.pending.clear();
        state.synced_at = Some(Instant::now());
    }

    // --- Lifecycle ---

    /// Replace the in-memory pool with the stored document, discarding any
    /// unsaved local state.
    ///
    /// A store with no saved pool yields an empty, loaded pool.
    pub async fn load(&self, store: &dyn RecordStore) -> Result<(), StoreError> {
        let _gate = self.sync_gate.lock().await;
        let doc = store.load_provider_pool_config().await?.unwrap_or_default();
        let count = doc.models.len();
        let retry_count = doc.retry_count;
        self.apply_document(doc);
        info!(entries = count, retry_count, "Provider pool loaded");
        Ok(())
    }

    /// Load once. A failing store leaves the pool unloaded (primary only)
    /// and the next call tries again.
    pub async fn ensure_loaded(&self, store: &dyn RecordStore) {
        self.refresh(store, Duration::MAX).await;
    }

    /// Sync with the store when the pool is unloaded or was last synced
    /// more than `max_age` ago. Failures are logged and leave the pool as is.
    ///
    /// Concurrent callers wait for one sync instead of each running their own.
    pub async fn refresh(&self, store: &dyn RecordStore, max_age: Duration) {
        if !self.lock().is_stale(max_age) {
            return;
        }
        let _gate = self.sync_gate.lock().await;
        if !self.lock().is_stale(max_age) {
            return;
        }
        if let Err(e) = self.sync_with(store).await {
            warn!(error = %e, "Failed to sync provider pool, keeping current state");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    /// Whether there are unsaved mutations or counter changes.
    pub fn is_dirty(&self) -> bool {
        let state = self.lock();
        state.dirty || !state.pending.is_empty()
    }

    /// Persist a snapshot of the pool, overwriting the stored document.
    ///
    /// Refuses with [`PoolError::NotLoaded`] while the stored document has
    /// never been read, so a failed load can't wipe the stored pool.
    pub async fn save(&self, store: &dyn RecordStore) -> Result<(), PoolError> {
        let _gate = self.sync_gate.lock().await;
        let (doc, pending) = {
            let mut state = self.lock();
            if !state.loaded {
                return Err(PoolError::NotLoaded);
            }
            state.dirty = false;
            (state.document(), std::mem::take(&mut state.pending))
        };
        if let Err(e) = store.save_provider_pool_config(&doc).await {
            let mut state = self.lock();
            state.dirty = true;
            merge_pending(&mut state.pending, pending);
            return Err(e.into());
        }
        debug!(entries = doc.models.len(), "Provider pool saved");
        Ok(())
    }

    /// Persist counter deltas and local edits, if any.
    ///
    /// Local edits overwrite the stored document. Counter deltas alone are
    /// added onto a fresh read of the stored document, so edits made by
    /// another process survive. Returns whether anything was written.
    pub async fn save_if_dirty(&self, store: &dyn RecordStore) -> Result<bool, PoolError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        let _gate = self.sync_gate.lock().await;
        self.sync_with(store).await
    }

    /// One store round trip. The caller holds `sync_gate`.
    async fn sync_with(&self, store: &dyn RecordStore) -> Result<bool, PoolError> {
        let stored = store.load_provider_pool_config().await?;

        let (doc, pending, local_edits) = {
            let mut state = self.lock();
            let pending = std::mem::take(&mut state.pending);
            if state.dirty && (state.loaded || stored.is_none()) {
                state.dirty = false;
                state.loaded = true;
                state.synced_at = Some(Instant::now());
                (Some(state.document()), pending, true)
            } else {
                if state.dirty {
                    warn!("Discarding provider pool edits made before the first load");
                    state.dirty = false;
                }
                match stored {
                    Some(doc) => {
                        state.adopt(doc);
                        state.apply_pending(&pending);
                    }
                    // Local counters already include the pending requests.
                    None => state.loaded = true,
                }
                state.synced_at = Some(Instant::now());
                let doc = (!pending.is_empty()).then(|| state.document());
                (doc, pending, false)
            }
        };

        let Some(doc) = doc else {
            debug!("Provider pool synced from store");
            return Ok(false);
        };
        if let Err(e) = store.save_provider_pool_config(&doc).await {
            let mut state = self.lock();
            state.dirty |= local_edits;
            merge_pending(&mut state.pending, pending);
            return Err(e.into());
        }
        debug!(entries = doc.models.len(), local_edits, "Provider pool synced to store");
        Ok(true)
    }

    /// Snapshot in the persisted shape.
    pub fn to_document(&self) -> PoolDocument {
        self.lock().document()
    }

    // --- Routing ---

    /// All stored entries, enabled or not.
    pub fn entries(&self) -> Vec<ProviderEntry> {
        self.lock().entries.clone()
    }

    /// Enabled stored entries in stored order.
    pub fn enabled_providers(&self) -> Vec<ProviderEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.enabled)
            .cloned()
            .collect()
    }

    /// The canonical candidate list: enabled entries, then the primary.
    pub fn candidates(&self) -> Vec<ProviderEntry> {
        self.lock().candidates()
    }

    pub fn primary(&self) -> Option<ProviderEntry> {
        self.lock().primary.clone()
    }

    /// Select the next candidate from the canonical list.
    ///
    /// Returns [`PoolError::NoAvailableProvider`] when nothing is enabled and
    /// no primary is configured.
    pub fn select_next(&self) -> Result<ProviderEntry, PoolError> {
        let mut state = self.lock();
        let list = state.candidates();
        let chosen = state.rotate(&list)?;
        debug!(provider = %chosen.label(), model = %chosen.model, "Selected provider");
        Ok(chosen)
    }

    /// Select the next entry of a caller-supplied list, sharing the cursor.
    pub fn select_next_from(&self, list: &[ProviderEntry]) -> Result<ProviderEntry, PoolError> {
        self.lock().rotate(list)
    }

    // --- Administration ---

    /// Append an entry. An empty name defaults to the model. Returns its index.
    pub fn add(&self, mut entry: ProviderEntry) -> usize {
        if entry.name.is_empty() {
            entry.name = entry.model.clone();
        }
        let mut state = self.lock();
        info!(provider = %entry.label(), model = %entry.model, "Provider added to pool");
        state.entries.push(entry);
        state.dirty = true;
        state.entries.len() - 1
    }

    pub fn remove(&self, index: usize) -> Result<ProviderEntry, PoolError> {
        let mut state = self.lock();
        state.check_index(index)?;
        let removed = state.entries.remove(index);
        if state.cursor >= state.entries.len() {
            state.cursor = 0;
        }
        state.dirty = true;
        info!(provider = %removed.label(), "Provider removed from pool");
        Ok(removed)
    }

    pub fn toggle(&self, index: usize, enabled: bool) -> Result<(), PoolError> {
        let mut state = self.lock();
        state.check_index(index)?;
        state.entries[index].enabled = enabled;
        state.dirty = true;
        Ok(())
    }

    pub fn update(&self, index: usize, patch: EntryPatch) -> Result<(), PoolError> {
        let mut state = self.lock();
        state.check_index(index)?;
        let entry = &mut state.entries[index];
        if let Some(base_url) = patch.base_url {
            entry.base_url = base_url;
        }
        if let Some(api_key) = patch.api_key {
            entry.api_key = api_key;
        }
        if let Some(model) = patch.model {
            entry.model = model;
        }
        if let Some(name) = patch.name {
            entry.name = name;
        }
        state.dirty = true;
        Ok(())
    }

    pub fn reset_request_counts(&self) {
        let mut state = self.lock();
        for entry in &mut state.entries {
            entry.request_count = 0;
        }
        if let Some(primary) = state.primary.as_mut() {
            primary.request_count = 0;
        }
        state.dirty = true;
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    /// Set the retry count, clamped to 1..=10. Returns the stored value.
    pub fn set_retry_count(&self, count: u32) -> u32 {
        let mut state = self.lock();
        state.retry_count = count.clamp(MIN_RETRY_COUNT, MAX_RETRY_COUNT);
        state.dirty = true;
        state.retry_count
    }

    pub fn retry_on_error(&self) -> bool {
        self.lock().retry_on_error
    }

    pub fn set_retry_on_error(&self, enabled: bool) {
        let mut state = self.lock();
        state.retry_on_error = enabled;
        state.dirty = true;
    }

    /// Attempts a single request may make.
    pub fn attempt_budget(&self) -> u32 {
        let state = self.lock();
        if state.retry_on_error { state.retry_count } else { 1 }
    }
}

fn merge_pending(
    into: &mut HashMap<(String, String), u64>,
    from: HashMap<(String, String), u64>,
) {
    for (key, delta) in from {
        *into.entry(key).or_default() += delta;
    }
}
