//! Per-symbol score history used for trend detection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::store::{read_json_lenient, write_json_atomic};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix ms
    pub timestamp: i64,
    pub score: u8,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub mcap: f64,
}

/// Score snapshots keyed by symbol, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalHistory {
    entries: BTreeMap<String, Vec<HistoryEntry>>,
}

impl SignalHistory {
    /// Load from disk; missing or corrupt files give an empty history
    pub async fn load(path: &Path) -> Self {
        let history: Self = read_json_lenient(path).await.unwrap_or_default();
        debug!("Loaded history for {} symbols", history.entries.len());
        history
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self).await
    }

    pub fn entries(&self, symbol: &str) -> &[HistoryEntry] {
        self.entries.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn symbols(&self) -> usize {
        self.entries.len()
    }

    /// Append a snapshot, then drop entries past retention and over the cap
    pub fn record(
        &mut self,
        symbol: &str,
        entry: HistoryEntry,
        max_len: usize,
        retention_days: i64,
    ) {
        let now = entry.timestamp;
        let list = self.entries.entry(symbol.to_string()).or_default();
        list.push(entry);

        let cutoff = now - retention_days * MS_PER_DAY;
        list.retain(|e| e.timestamp > cutoff);
        if list.len() > max_len {
            let excess = list.len() - max_len;
            list.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000_000;

    fn entry(timestamp: i64, score: u8) -> HistoryEntry {
        HistoryEntry {
            timestamp,
            score,
            price: 0.0,
            mcap: 0.0,
        }
    }

    #[test]
    fn test_record_caps_length() {
        let mut history = SignalHistory::default();
        for i in 0..105 {
            history.record("LCAT", entry(NOW + i, i as u8), 100, 30);
        }
        let entries = history.entries("LCAT");
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].score, 5);
        assert_eq!(entries[99].score, 104);
    }

    #[test]
    fn test_record_drops_expired() {
        let mut history = SignalHistory::default();
        history.record("LCAT", entry(NOW - 31 * MS_PER_DAY, 50), 100, 30);
        history.record("LCAT", entry(NOW, 60), 100, 30);
        assert_eq!(history.entries("LCAT"), &[entry(NOW, 60)]);
    }

    #[tokio::test]
    async fn test_persistence_and_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signal_history.json");

        let mut history = SignalHistory::default();
        history.record("LCAT", entry(NOW, 70), 100, 30);
        history.save(&path).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["LCAT"][0]["score"], 70);

        let loaded = SignalHistory::load(&path).await;
        assert_eq!(loaded.entries("LCAT").len(), 1);

        std::fs::write(&path, "nope").unwrap();
        assert_eq!(SignalHistory::load(&path).await.symbols(), 0);
    }
}
