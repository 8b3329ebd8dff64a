//! Address-keyed signal store
//!
//! One store per process replaces the per-script "seen" sets and shared
//! JSON files. Collectors upsert concurrently; saves are serialized.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::signal::{dedup_first_wins, normalize_address, TokenSignal};

const STORE_VERSION: u32 = 1;

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Refreshed,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    updated_at: String,
    count: usize,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreEnvelope {
    meta: StoreMeta,
    items: Vec<TokenSignal>,
}

/// Concurrent signal store backed by one JSON file
pub struct SignalStore {
    records: DashMap<String, TokenSignal>,
    path: PathBuf,
    max_records: usize,
    save_lock: Mutex<()>,
}

impl SignalStore {
    pub fn new(path: impl Into<PathBuf>, max_records: usize) -> Self {
        Self {
            records: DashMap::new(),
            path: path.into(),
            max_records: max_records.max(1),
            save_lock: Mutex::new(()),
        }
    }

    pub fn shared(path: impl Into<PathBuf>, max_records: usize) -> Arc<Self> {
        Arc::new(Self::new(path, max_records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<TokenSignal> {
        let key = normalize_address(address).ok()?;
        self.records.get(&key).map(|r| r.value().clone())
    }

    /// Insert a new record or refresh an existing one
    ///
    /// The merged record is rescored at `now_ms`. Overflow evicts the
    /// records with the oldest `lastSeenAt`.
    pub fn upsert(&self, signal: TokenSignal, now_ms: i64) -> Result<UpsertOutcome> {
        let key = normalize_address(&signal.address)?;

        let outcome = match self.records.entry(key) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.refresh_from(&signal);
                existing.last_seen_at = now_ms;
                existing.rescore(now_ms);
                UpsertOutcome::Refreshed
            }
            Entry::Vacant(entry) => {
                let mut signal = signal;
                signal.address = entry.key().clone();
                if signal.first_seen_at <= 0 {
                    signal.first_seen_at = now_ms;
                }
                signal.last_seen_at = now_ms;
                signal.rescore(now_ms);
                entry.insert(signal);
                UpsertOutcome::Inserted
            }
        };

        if outcome == UpsertOutcome::Inserted && self.records.len() > self.max_records {
            self.evict_overflow();
        }
        Ok(outcome)
    }

    fn evict_overflow(&self) {
        let overflow = self.records.len().saturating_sub(self.max_records);
        if overflow == 0 {
            return;
        }
        let mut by_age: Vec<(i64, String)> = self
            .records
            .iter()
            .map(|r| (r.last_seen_at, r.key().clone()))
            .collect();
        by_age.sort();
        for (_, key) in by_age.into_iter().take(overflow) {
            self.records.remove(&key);
            debug!(address = %key, "Evicted stale record");
        }
    }

    /// Drop records not seen within `max_age_ms` of `now_ms`
    pub fn prune_older_than(&self, max_age_ms: i64, now_ms: i64) -> usize {
        let cutoff = now_ms - max_age_ms;
        let before = self.records.len();
        self.records.retain(|_, s| s.last_seen_at >= cutoff);
        let pruned = before - self.records.len();
        if pruned > 0 {
            info!("Pruned {} records older than {}h", pruned, max_age_ms / 3_600_000);
        }
        pruned
    }

    /// All records, newest first sighting first
    pub fn snapshot(&self) -> Vec<TokenSignal> {
        let mut items: Vec<TokenSignal> = self.records.iter().map(|r| r.value().clone()).collect();
        items.sort_by(|a, b| {
            b.first_seen_at
                .cmp(&a.first_seen_at)
                .then_with(|| a.address.cmp(&b.address))
        });
        items
    }

    /// Load records from disk, replacing the in-memory set
    ///
    /// A missing or corrupt file leaves the store empty.
    pub async fn load(&self) -> Result<usize> {
        let envelope: Option<StoreEnvelope> = read_json_lenient(&self.path).await;
        self.records.clear();
        let Some(envelope) = envelope else {
            return Ok(0);
        };
        for signal in dedup_first_wins(envelope.items) {
            self.records.insert(signal.address.clone(), signal);
        }
        self.evict_overflow();
        info!("Loaded {} signals from {}", self.records.len(), self.path.display());
        Ok(self.records.len())
    }

    /// Persist all records atomically
    pub async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let items = self.snapshot();
        let envelope = StoreEnvelope {
            meta: StoreMeta {
                updated_at: Utc::now().to_rfc3339(),
                count: items.len(),
                version: STORE_VERSION,
            },
            items,
        };
        write_json_atomic(&self.path, &envelope)
            .await
            .map_err(|e| Error::StorePersistence(e.to_string()))?;
        debug!("Saved {} signals to {}", envelope.meta.count, self.path.display());
        Ok(())
    }

    /// Merge records from a legacy feed file
    ///
    /// Accepts a bare array, `{items: [...]}` or `{candidates: [...]}`.
    /// Addresses already in the store win. Unreadable files import nothing.
    pub async fn import_file(&self, path: &Path, now_ms: i64) -> usize {
        let Some(value) = read_json_lenient::<serde_json::Value>(path).await else {
            return 0;
        };
        let entries = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map
                .remove("items")
                .or_else(|| map.remove("candidates"))
            {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    warn!("Legacy file {} has no items/candidates array", path.display());
                    return 0;
                }
            },
            _ => return 0,
        };

        let parsed = entries.into_iter().filter_map(|v| {
            // older scanners only kept a relative age
            let legacy_age = v.get("ageMinutes").and_then(|a| a.as_f64());
            let mut signal = serde_json::from_value::<TokenSignal>(v).ok()?;
            if signal.pair_created_at.is_none() {
                if let Some(age) = legacy_age.filter(|a| a.is_finite() && *a >= 0.0) {
                    signal.pair_created_at = Some(now_ms - (age * 60_000.0) as i64);
                }
            }
            Some(signal)
        });

        let mut imported = 0;
        for mut signal in dedup_first_wins(parsed) {
            if self.records.contains_key(&signal.address) {
                continue;
            }
            if signal.first_seen_at <= 0 {
                signal.first_seen_at = now_ms;
            }
            if signal.last_seen_at <= 0 {
                signal.last_seen_at = now_ms;
            }
            signal.rescore(now_ms);
            self.records.insert(signal.address.clone(), signal);
            imported += 1;
        }
        self.evict_overflow();

        info!("Imported {} legacy signals from {}", imported, path.display());
        imported
    }
}

/// Write JSON to a temp file next to `path`, then rename over it
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec_pretty(value)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Internal(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Read JSON, treating a missing or malformed file as absent
pub async fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring corrupt file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000_000;

    fn signal(address: &str, liquidity: f64) -> TokenSignal {
        let mut s = TokenSignal::new(address, NOW).unwrap();
        s.liquidity_usd = liquidity;
        s
    }

    #[test]
    fn test_upsert_inserts_then_refreshes() {
        let store = SignalStore::new("unused.json", 10);
        let mut first = signal("0xAA", 1_000.0);
        first.first_seen_at = NOW - 60_000;
        assert_eq!(store.upsert(first, NOW - 60_000).unwrap(), UpsertOutcome::Inserted);

        let second = signal("0xaa", 8_000.0);
        assert_eq!(store.upsert(second, NOW).unwrap(), UpsertOutcome::Refreshed);

        assert_eq!(store.len(), 1);
        let stored = store.get("0XAA").unwrap();
        assert_eq!(stored.liquidity_usd, 8_000.0);
        assert_eq!(stored.first_seen_at, NOW - 60_000);
        assert_eq!(stored.last_seen_at, NOW);
        assert!(stored.risk_tags.contains(&"low_activity".to_string()));
    }

    #[test]
    fn test_upsert_rejects_empty_address() {
        let store = SignalStore::new("unused.json", 10);
        let s = TokenSignal::default();
        assert!(store.upsert(s, NOW).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest_last_seen() {
        let store = SignalStore::new("unused.json", 2);
        store.upsert(signal("0x1", 1.0), NOW - 3_000).unwrap();
        store.upsert(signal("0x2", 1.0), NOW - 2_000).unwrap();
        // refresh 0x1 so 0x2 becomes the stalest
        store.upsert(signal("0x1", 2.0), NOW - 1_000).unwrap();
        store.upsert(signal("0x3", 1.0), NOW).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("0x2").is_none());
        assert!(store.get("0x1").is_some());
        assert!(store.get("0x3").is_some());
    }

    #[test]
    fn test_prune_older_than() {
        let store = SignalStore::new("unused.json", 10);
        store.upsert(signal("0xold", 1.0), NOW - 10 * 3_600_000).unwrap();
        store.upsert(signal("0xnew", 1.0), NOW).unwrap();
        assert_eq!(store.prune_older_than(3_600_000, NOW), 1);
        assert!(store.get("0xold").is_none());
    }

    #[test]
    fn test_snapshot_is_newest_first() {
        let store = SignalStore::new("unused.json", 10);
        for (addr, seen) in [("0xb", NOW - 5), ("0xa", NOW - 5), ("0xc", NOW)] {
            let mut s = signal(addr, 1.0);
            s.first_seen_at = seen;
            store.upsert(s, seen).unwrap();
        }
        let order: Vec<_> = store.snapshot().into_iter().map(|s| s.address).collect();
        assert_eq!(order, vec!["0xc", "0xa", "0xb"]);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("signals.json");

        let store = SignalStore::new(&path, 10);
        store.upsert(signal("0xaa", 6_000.0), NOW).unwrap();
        store.upsert(signal("0xbb", 2_000.0), NOW).unwrap();
        store.save().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["meta"]["count"], 2);
        assert_eq!(raw["items"].as_array().unwrap().len(), 2);
        assert!(!dir.path().join("nested").join(".signals.json.tmp").exists());

        let reloaded = SignalStore::new(&path, 10);
        assert_eq!(reloaded.load().await.unwrap(), 2);
        assert_eq!(reloaded.get("0xaa").unwrap().liquidity_usd, 6_000.0);
    }

    #[tokio::test]
    async fn test_corrupt_or_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signals.json");

        let store = SignalStore::new(&path, 10);
        assert_eq!(store.load().await.unwrap(), 0);

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(store.load().await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_import_legacy_shapes() {
        let dir = TempDir::new().unwrap();
        let array = dir.path().join("array.json");
        let items = dir.path().join("items.json");
        let candidates = dir.path().join("candidates.json");
        let broken = dir.path().join("broken.json");

        std::fs::write(&array, r#"[{"address":"0xA1"},{"address":"0xa1","liquidityUsd":9}]"#).unwrap();
        std::fs::write(&items, r#"{"items":[{"address":"0xb1"},{"symbol":"NOADDR"}]}"#).unwrap();
        std::fs::write(&candidates, r#"{"meta":{},"candidates":[{"address":"0xa1"},{"address":"0xc1"}]}"#)
            .unwrap();
        std::fs::write(&broken, "[[[").unwrap();

        let store = SignalStore::new(dir.path().join("signals.json"), 100);
        assert_eq!(store.import_file(&array, NOW).await, 1);
        assert_eq!(store.import_file(&items, NOW).await, 1);
        assert_eq!(store.import_file(&candidates, NOW).await, 1);
        assert_eq!(store.import_file(&broken, NOW).await, 0);
        assert_eq!(store.import_file(&dir.path().join("missing.json"), NOW).await, 0);

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("0xa1").unwrap().liquidity_usd, 0.0);
    }

    #[tokio::test]
    async fn test_import_keeps_legacy_age() {
        use crate::classifier::{Classifier, Tier, TierRules};

        let dir = TempDir::new().unwrap();
        let detected_at = NOW - 48 * 3_600_000;
        let legacy = dir.path().join("legacy.json");
        std::fs::write(
            &legacy,
            format!(
                r#"[{{"address":"0xold","liquidityUsd":30000,"ageMinutes":2880,"detectedAt":{}}},
                    {{"address":"0xseen","liquidityUsd":30000,"detectedAt":{}}}]"#,
                detected_at, detected_at
            ),
        )
        .unwrap();

        let store = SignalStore::new(dir.path().join("signals.json"), 100);
        assert_eq!(store.import_file(&legacy, NOW).await, 2);

        let old = store.get("0xold").unwrap();
        assert_eq!(old.first_seen_at, detected_at);
        assert_eq!(old.pair_created_at, Some(NOW - 2880 * 60_000));

        let seen = store.get("0xseen").unwrap();
        assert_eq!(seen.first_seen_at, detected_at);
        assert_eq!(seen.pair_created_at, None);

        let classifier = Classifier::new(TierRules::default());
        assert_eq!(old.age_minutes(NOW), Some(2880.0));
        assert_eq!(classifier.classify_one(&old, NOW), Some(Tier::Certified));
        assert_eq!(classifier.classify_one(&seen, NOW), Some(Tier::Certified));
    }
}
