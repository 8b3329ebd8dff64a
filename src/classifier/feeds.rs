//! Tier feed files consumed by the website

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{ClassifiedSignal, Feeds, Tier};
use crate::error::{Error, Result};
use crate::store::write_json_atomic;

pub const FEED_VERSION: &str = "2.0";

/// Feed health as shown by the website
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    /// Feed has entries
    Ok,
    /// Nothing qualified, but the store had records
    Calm,
    /// No input at all, collectors are likely failing
    Degraded,
}

impl FeedStatus {
    pub fn evaluate(feed_len: usize, input_len: usize) -> Self {
        if feed_len > 0 {
            FeedStatus::Ok
        } else if input_len > 0 {
            FeedStatus::Calm
        } else {
            FeedStatus::Degraded
        }
    }
}

fn feed_document(tier: Tier, items: &[ClassifiedSignal], input_len: usize) -> Value {
    let mut doc = serde_json::Map::new();
    doc.insert(
        "meta".to_string(),
        json!({
            "updated_at": Utc::now().to_rfc3339(),
            "version": FEED_VERSION,
            "tier": tier.as_str(),
            "count": items.len(),
            "status": FeedStatus::evaluate(items.len(), input_len),
        }),
    );
    doc.insert(tier.feed_key().to_string(), json!(items));
    Value::Object(doc)
}

/// Write all five tier feeds into `dir`
pub async fn write_feeds(dir: &Path, feeds: &Feeds) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(Tier::ALL.len());
    for tier in Tier::ALL {
        let items = feeds.get(tier);
        let path = dir.join(tier.feed_file());
        let doc = feed_document(tier, items, feeds.input_count);

        write_json_atomic(&path, &doc)
            .await
            .map_err(|e| Error::FeedWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if items.is_empty() && feeds.input_count == 0 {
            warn!(tier = %tier, "Feed degraded: no input records");
        }
        written.push(path);
    }

    info!(
        input = feeds.input_count,
        cio = feeds.get(Tier::Cio).len(),
        watch = feeds.get(Tier::Watch).len(),
        hotlist = feeds.get(Tier::Hotlist).len(),
        fast_certified = feeds.get(Tier::FastCertified).len(),
        certified = feeds.get(Tier::Certified).len(),
        "Feeds written"
    );
    Ok(written)
}

/// Read back the entries of one tier feed
pub async fn read_feed(dir: &Path, tier: Tier) -> Option<Vec<ClassifiedSignal>> {
    let path = dir.join(tier.feed_file());
    let mut doc: Value = crate::store::read_json_lenient(&path).await?;
    let items = doc.get_mut(tier.feed_key())?.take();
    match serde_json::from_value(items) {
        Ok(items) => Some(items),
        Err(e) => {
            warn!("Malformed {} feed at {}: {}", tier, path.display(), e);
            None
        }
    }
}
