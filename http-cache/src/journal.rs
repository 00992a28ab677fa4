use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use crate::body_store::BodyStore;
use crate::entry::{CacheEntry, Timestamp};
use crate::key;

/// How long to wait after the last mutation before writing a snapshot to
/// disk.
const DEBOUNCE: Duration = Duration::from_secs(1);

/// The on-disk shape of the journal: a map from primary key to a map from
/// secondary key to cache entry, serialized whole on every debounced flush.
#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalSnapshot {
    entries: HashMap<Uuid, HashMap<Uuid, CacheEntry>>,
}

#[derive(Debug, Default)]
struct JournalState {
    entries: HashMap<Uuid, HashMap<Uuid, CacheEntry>>,
}

/// In-memory index of cache entries, durably snapshotted to disk (or kept
/// purely in-memory for an `init_in_memory` cache).
///
/// Owns every mutation to the entry map; removing an entry always removes
/// its body blob in the same call, so callers never observe a dangling
/// entry or an orphan blob except transiently mid-write.
#[derive(Clone)]
pub struct Journal {
    state: Arc<RwLock<JournalState>>,
    body_store: Arc<dyn BodyStore>,
    path: Option<PathBuf>,
    generation: Arc<AtomicU64>,
}

impl Journal {
    /// Load a journal from `path` (or start empty if `path` is `None`, for
    /// an in-memory cache), reconciling orphan and missing blobs against
    /// `body_store`.
    ///
    /// A missing or unparsable file is treated as an empty journal, which
    /// is then immediately persisted.
    pub async fn load(path: Option<PathBuf>, body_store: Arc<dyn BodyStore>) -> Self {
        let mut snapshot = match &path {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => bincode::deserialize::<JournalSnapshot>(&bytes).unwrap_or_else(|e| {
                    error!(error = %e, "journal snapshot failed to parse, starting empty");
                    JournalSnapshot::default()
                }),
                Err(_) => JournalSnapshot::default(),
            },
            None => JournalSnapshot::default(),
        };

        let stored_keys: std::collections::HashSet<Uuid> =
            body_store.list_keys().await.unwrap_or_default().into_iter().collect();
        let mut referenced_keys = std::collections::HashSet::new();
        for inner in snapshot.entries.values() {
            for entry in inner.values() {
                referenced_keys.insert(entry.secondary_key);
            }
        }

        // Missing blobs: drop entries whose blob never made it to disk.
        for inner in snapshot.entries.values_mut() {
            inner.retain(|_, entry| stored_keys.contains(&entry.secondary_key));
        }
        snapshot.entries.retain(|_, inner| !inner.is_empty());

        // Orphan blobs: delete blobs with no referring entry.
        for stray in stored_keys.difference(&referenced_keys) {
            if let Err(e) = body_store.delete(*stray).await {
                error!(error = %e, key = %stray, "failed to delete orphan blob");
            }
        }

        let journal = Self {
            state: Arc::new(RwLock::new(JournalState { entries: snapshot.entries })),
            body_store,
            path,
            generation: Arc::new(AtomicU64::new(0)),
        };
        journal.schedule_persist();
        journal
    }

    /// Look up the entry (if any) under `primary` whose recorded vary
    /// headers match `request_headers`.
    pub async fn get_matching(&self, primary: Uuid, request_headers: &HeaderMap) -> Option<CacheEntry> {
        let state = self.state.read().await;
        state
            .entries
            .get(&primary)
            .and_then(|inner| inner.values().find(|entry| key::matches_vary(&entry.vary, request_headers)))
            .cloned()
    }

    /// Look up an entry by its exact secondary key.
    pub async fn get(&self, primary: Uuid, secondary: Uuid) -> Option<CacheEntry> {
        let state = self.state.read().await;
        state.entries.get(&primary).and_then(|inner| inner.get(&secondary)).cloned()
    }

    /// Insert or replace the entry at `(primary, secondary)`, preserving
    /// the previous entry's `hit_count` if one existed.
    pub async fn upsert(&self, primary: Uuid, mut entry: CacheEntry) {
        let mut state = self.state.write().await;
        let inner = state.entries.entry(primary).or_default();
        if let Some(previous) = inner.get(&entry.secondary_key) {
            entry.hit_count = previous.hit_count;
        }
        inner.insert(entry.secondary_key, entry);
        drop(state);
        self.schedule_persist();
    }

    /// Record a cache hit: bump `hit_count` and refresh `last_access`.
    pub async fn record_hit(&self, primary: Uuid, secondary: Uuid, now: SystemTime) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.entries.get_mut(&primary).and_then(|inner| inner.get_mut(&secondary)) {
            entry.hit_count += 1;
            entry.last_access = Timestamp::from(now);
        }
        drop(state);
        self.schedule_persist();
    }

    /// Overlay `overlay` onto the stored entry's headers (used for 304
    /// metadata merges) and refresh `last_access`. Returns the updated
    /// entry, if one existed.
    pub async fn overlay_headers(
        &self,
        primary: Uuid,
        secondary: Uuid,
        overlay: &HashMap<String, String>,
        now: SystemTime,
    ) -> Option<CacheEntry> {
        let mut state = self.state.write().await;
        let entry = state.entries.get_mut(&primary).and_then(|inner| inner.get_mut(&secondary))?;
        for (name, value) in overlay {
            entry.headers.insert(name.clone(), value.clone());
        }
        entry.last_access = Timestamp::from(now);
        let updated = entry.clone();
        drop(state);
        self.schedule_persist();
        Some(updated)
    }

    /// Remove every entry under `primary`, deleting each one's body blob.
    /// Used for unsafe-method invalidation.
    pub async fn invalidate_primary(&self, primary: Uuid) {
        let removed = {
            let mut state = self.state.write().await;
            state.entries.remove(&primary)
        };
        if let Some(inner) = removed {
            for (_, entry) in inner {
                if let Err(e) = self.body_store.delete(entry.secondary_key).await {
                    error!(error = %e, key = %entry.secondary_key, "failed to delete blob during invalidation");
                }
            }
            self.schedule_persist();
        }
    }

    /// Remove a single entry and its blob. If the primary's inner map
    /// becomes empty, removes the outer entry too.
    pub async fn remove_entry(&self, primary: Uuid, secondary: Uuid) {
        let removed = {
            let mut state = self.state.write().await;
            let removed = match state.entries.get_mut(&primary) {
                Some(inner) => inner.remove(&secondary),
                None => None,
            };
            if state.entries.get(&primary).is_some_and(|inner| inner.is_empty()) {
                state.entries.remove(&primary);
            }
            removed
        };
        if let Some(entry) = removed {
            if let Err(e) = self.body_store.delete(entry.secondary_key).await {
                error!(error = %e, key = %entry.secondary_key, "failed to delete blob");
            }
            self.schedule_persist();
        }
    }

    /// Sum of `persisted_size` over every entry: the cache size reported to
    /// the eviction policy.
    pub async fn total_persisted_size(&self) -> u64 {
        let state = self.state.read().await;
        state.entries.values().flat_map(|inner| inner.values()).map(|e| e.persisted_size).sum()
    }

    /// Run the frecency eviction policy: repeatedly remove the
    /// lowest-scoring entry until total persisted size is at or below
    /// `max_size`.
    pub async fn evict_to_fit(&self, max_size: u64, now: SystemTime) {
        loop {
            let total = self.total_persisted_size().await;
            if total <= max_size {
                return;
            }
            let victim = {
                let state = self.state.read().await;
                state
                    .entries
                    .iter()
                    .flat_map(|(&primary, inner)| inner.values().map(move |entry| (primary, entry)))
                    .min_by(|(_, a), (_, b)| {
                        a.frecency_score(now)
                            .partial_cmp(&b.frecency_score(now))
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| a.last_access.secs.cmp(&b.last_access.secs))
                            .then_with(|| a.last_access.nanos.cmp(&b.last_access.nanos))
                    })
                    .map(|(primary, entry)| (primary, entry.secondary_key))
            };
            match victim {
                Some((primary, secondary)) => {
                    debug!(%primary, %secondary, "evicting entry over size budget");
                    self.remove_entry(primary, secondary).await;
                }
                None => return,
            }
        }
    }

    /// Remove every entry for which `predicate` returns `true`, deleting
    /// each one's blob. Used by `delete_private_content` to drop entries
    /// whose recorded `Cache-Control` was `private`.
    pub async fn remove_matching<F>(&self, mut predicate: F)
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let victims: Vec<(Uuid, Uuid)> = {
            let state = self.state.read().await;
            let mut victims = Vec::new();
            for (&primary, inner) in state.entries.iter() {
                for entry in inner.values() {
                    if predicate(entry) {
                        victims.push((primary, entry.secondary_key));
                    }
                }
            }
            victims
        };
        for (primary, secondary) in victims {
            self.remove_entry(primary, secondary).await;
        }
    }

    /// Remove every entry and every blob (`clearCache` / `deletePrivateContent`).
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        drop(state);
        if let Err(e) = self.body_store.clear().await {
            error!(error = %e, "failed to clear body store");
        }
        self.flush_now().await;
    }

    /// Schedule a debounced disk write, ~1 second after the last mutation.
    ///
    /// A burst of mutations only produces one actual write: each call bumps
    /// `generation` and spawns a timer that checks, after sleeping, whether
    /// it is still the most recent generation; if a later mutation arrived
    /// in the meantime this timer's flush is simply skipped in favor of the
    /// newer one.
    fn schedule_persist(&self) {
        if self.path.is_none() {
            return;
        }
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let state = self.state.clone();
        let path = self.path.clone();

        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }
            write_snapshot(&state, path.as_deref()).await;
        });
    }

    /// Write the current state to disk immediately via temp-file-plus-rename,
    /// ignoring the debounce window. Used by `dispose`/`close` to flush any
    /// pending write, and after `clear`.
    pub async fn flush_now(&self) {
        write_snapshot(&self.state, self.path.as_deref()).await;
    }
}

async fn write_snapshot(state: &RwLock<JournalState>, path: Option<&std::path::Path>) {
    let Some(path) = path else { return };
    let snapshot = {
        let state = state.read().await;
        JournalSnapshot { entries: state.entries.clone() }
    };
    let bytes = match bincode::serialize(&snapshot) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to serialize journal snapshot");
            return;
        }
    };
    let temp_path = path.with_extension("tmp");
    if let Err(e) = tokio::fs::write(&temp_path, &bytes).await {
        error!(error = %e, "failed to write journal temp file");
        return;
    }
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        error!(error = %e, "failed to rename journal temp file into place");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body_store::MemoryBodyStore;
    use crate::key::VaryPair;

    fn sample_entry(secondary_key: Uuid) -> CacheEntry {
        CacheEntry {
            secondary_key,
            created_at: Timestamp::now(),
            reason: None,
            content_length: None,
            headers: HashMap::new(),
            vary: Vec::<VaryPair>::new(),
            hit_count: 0,
            last_access: Timestamp::now(),
            persisted_size: 6,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_matching_round_trips() {
        let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
        let journal = Journal::load(None, store).await;
        let primary = Uuid::new_v4();
        let secondary = Uuid::new_v4();
        journal.upsert(primary, sample_entry(secondary)).await;

        let found = journal.get_matching(primary, &HeaderMap::new()).await;
        assert_eq!(found.unwrap().secondary_key, secondary);
    }

    #[tokio::test]
    async fn upsert_preserves_previous_hit_count() {
        let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
        let journal = Journal::load(None, store).await;
        let primary = Uuid::new_v4();
        let secondary = Uuid::new_v4();
        journal.upsert(primary, sample_entry(secondary)).await;
        journal.record_hit(primary, secondary, SystemTime::now()).await;
        journal.record_hit(primary, secondary, SystemTime::now()).await;

        journal.upsert(primary, sample_entry(secondary)).await;
        let entry = journal.get(primary, secondary).await.unwrap();
        assert_eq!(entry.hit_count, 2);
    }

    #[tokio::test]
    async fn invalidate_primary_removes_entries_and_blobs() {
        let body_store = Arc::new(MemoryBodyStore::new());
        let store: Arc<dyn BodyStore> = body_store.clone();
        let journal = Journal::load(None, store).await;
        let primary = Uuid::new_v4();
        let secondary = Uuid::new_v4();
        body_store.write(secondary, pipeline::Body::from(b"x".to_vec())).await.unwrap();
        journal.upsert(primary, sample_entry(secondary)).await;

        journal.invalidate_primary(primary).await;
        assert!(journal.get(primary, secondary).await.is_none());
        assert!(body_store.read(secondary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_entry_drops_empty_outer_map() {
        let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
        let journal = Journal::load(None, store).await;
        let primary = Uuid::new_v4();
        let secondary = Uuid::new_v4();
        journal.upsert(primary, sample_entry(secondary)).await;

        journal.remove_entry(primary, secondary).await;
        let state = journal.state.read().await;
        assert!(!state.entries.contains_key(&primary));
    }

    #[tokio::test]
    async fn remove_matching_drops_only_entries_the_predicate_selects() {
        let body_store = Arc::new(MemoryBodyStore::new());
        let store: Arc<dyn BodyStore> = body_store.clone();
        let journal = Journal::load(None, store).await;

        let keep_primary = Uuid::new_v4();
        let keep_secondary = Uuid::new_v4();
        body_store.write(keep_secondary, pipeline::Body::from(b"keep".to_vec())).await.unwrap();
        let mut keep_entry = sample_entry(keep_secondary);
        keep_entry.headers.insert("cache-control".to_string(), "public, max-age=60".to_string());
        journal.upsert(keep_primary, keep_entry).await;

        let drop_primary = Uuid::new_v4();
        let drop_secondary = Uuid::new_v4();
        body_store.write(drop_secondary, pipeline::Body::from(b"drop".to_vec())).await.unwrap();
        let mut drop_entry = sample_entry(drop_secondary);
        drop_entry.headers.insert("cache-control".to_string(), "private, max-age=60".to_string());
        journal.upsert(drop_primary, drop_entry).await;

        journal
            .remove_matching(|entry| {
                entry.headers.get("cache-control").is_some_and(|v| v.contains("private"))
            })
            .await;

        assert!(journal.get(keep_primary, keep_secondary).await.is_some());
        assert!(journal.get(drop_primary, drop_secondary).await.is_none());
        assert!(body_store.read(drop_secondary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eviction_removes_lowest_scoring_entries_until_within_budget() {
        let body_store = Arc::new(MemoryBodyStore::new());
        let store: Arc<dyn BodyStore> = body_store.clone();
        let journal = Journal::load(None, store).await;
        let now = SystemTime::now();

        for i in 0..3u8 {
            let primary = Uuid::new_v4();
            let secondary = Uuid::new_v4();
            body_store.write(secondary, pipeline::Body::from(vec![i; 6])).await.unwrap();
            let mut entry = sample_entry(secondary);
            // Entry 0 has no hits (evicted first); entries 1 and 2 have hits.
            entry.hit_count = i as u64;
            journal.upsert(primary, entry).await;
        }

        assert_eq!(journal.total_persisted_size().await, 18);
        journal.evict_to_fit(10, now).await;
        assert!(journal.total_persisted_size().await <= 10);
    }

    #[tokio::test]
    async fn reconciliation_deletes_orphan_blobs_and_drops_entries_missing_blobs() {
        let body_store = Arc::new(MemoryBodyStore::new());
        let orphan = Uuid::new_v4();
        body_store.write(orphan, pipeline::Body::from(b"orphan".to_vec())).await.unwrap();

        // Build a snapshot by hand referencing a secondary key with no blob.
        let missing_secondary = Uuid::new_v4();
        let primary = Uuid::new_v4();
        let mut entries = HashMap::new();
        let mut inner = HashMap::new();
        inner.insert(missing_secondary, sample_entry(missing_secondary));
        entries.insert(primary, inner);
        let snapshot = JournalSnapshot { entries };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal");
        tokio::fs::write(&path, bincode::serialize(&snapshot).unwrap()).await.unwrap();

        let store: Arc<dyn BodyStore> = body_store.clone();
        let journal = Journal::load(Some(path), store).await;

        assert!(journal.get(primary, missing_secondary).await.is_none());
        assert!(body_store.read(orphan).await.unwrap().is_none());
    }
}
