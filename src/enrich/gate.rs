//! Access gating for enriched signals
//!
//! Splits enriched records into the public feed (WATCH and PULSE once
//! their embargo has passed) and the premium ALPHA feed.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{Action, EnrichedSignal};
use crate::config::EnrichmentSettings;
use crate::error::{Error, Result};
use crate::store::write_json_atomic;

pub const SCHEMA_VERSION: &str = "2.1";

pub const PUBLIC_FILE: &str = "pulse_public.json";
pub const ALPHA_FILE: &str = "pulse_alpha.json";
pub const FULL_FILE: &str = "pulse_full.json";

const MS_PER_MINUTE: i64 = 60_000;

/// Who gets to see a record, and when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessTier {
    Watch,
    Pulse,
    Alpha,
}

impl AccessTier {
    pub fn access_level(&self) -> &'static str {
        match self {
            AccessTier::Alpha => "premium",
            AccessTier::Pulse => "freemium",
            AccessTier::Watch => "public",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, AccessTier::Watch | AccessTier::Pulse)
    }
}

/// Inputs the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct GateInput {
    pub confidence: u8,
    pub action: Action,
    pub liquidity_usd: f64,
    pub early_late_score: u8,
    pub volume5m: f64,
    pub volume1h: f64,
}

pub fn qualify(input: &GateInput, settings: &EnrichmentSettings) -> AccessTier {
    if input.confidence < settings.alpha_min_confidence || input.action == Action::Wait {
        return AccessTier::Watch;
    }
    if input.liquidity_usd < settings.alpha_min_liquidity_usd {
        return AccessTier::Pulse;
    }
    if input.early_late_score > settings.alpha_max_early_late_score {
        return AccessTier::Pulse;
    }
    // 5m volume above a fifth of the hour looks like a flash pump
    if input.volume1h > 0.0 && input.volume5m > input.volume1h / 5.0 {
        return AccessTier::Pulse;
    }
    AccessTier::Alpha
}

/// Unix ms before which the record stays out of the public feed
///
/// The delay counts from `anchor_ms`, the record's first sighting.
pub fn embargo_until(tier: AccessTier, anchor_ms: i64, settings: &EnrichmentSettings) -> i64 {
    let delay_minutes = match tier {
        AccessTier::Alpha => settings.alpha_delay_minutes,
        AccessTier::Pulse => settings.pulse_delay_minutes,
        AccessTier::Watch => 0,
    };
    anchor_ms + delay_minutes * MS_PER_MINUTE
}

/// Records for each output file
#[derive(Debug, Default)]
pub struct GatedOutputs<'a> {
    pub public: Vec<&'a EnrichedSignal>,
    pub alpha: Vec<&'a EnrichedSignal>,
    pub full: Vec<&'a EnrichedSignal>,
}

pub fn split(items: &[EnrichedSignal], now_ms: i64) -> GatedOutputs<'_> {
    let mut out = GatedOutputs::default();
    for item in items {
        if item.access_tier.is_public() && item.embargo_until <= now_ms {
            out.public.push(item);
        }
        if item.access_tier == AccessTier::Alpha {
            out.alpha.push(item);
        }
        out.full.push(item);
    }
    out
}

/// Write public, alpha and full files into `dir`
pub async fn write_outputs(dir: &Path, items: &[EnrichedSignal], now_ms: i64) -> Result<Vec<PathBuf>> {
    let outputs = split(items, now_ms);
    let mut written = Vec::with_capacity(3);

    for (file, tier, records) in [
        (PUBLIC_FILE, "public", &outputs.public),
        (ALPHA_FILE, "alpha", &outputs.alpha),
        (FULL_FILE, "full", &outputs.full),
    ] {
        let path = dir.join(file);
        let doc = json!({
            "schemaVersion": SCHEMA_VERSION,
            "tier": tier,
            "generatedAt": now_ms,
            "count": records.len(),
            "items": records,
        });
        write_json_atomic(&path, &doc)
            .await
            .map_err(|e| Error::FeedWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        written.push(path);
    }

    info!(
        public = outputs.public.len(),
        alpha = outputs.alpha.len(),
        full = outputs.full.len(),
        "Pulse outputs written"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> GateInput {
        GateInput {
            confidence: 80,
            action: Action::Watch,
            liquidity_usd: 400_000.0,
            early_late_score: 50,
            volume5m: 1_000.0,
            volume1h: 20_000.0,
        }
    }

    #[test]
    fn test_alpha_when_everything_holds() {
        let settings = EnrichmentSettings::default();
        assert_eq!(qualify(&input(), &settings), AccessTier::Alpha);
    }

    #[test]
    fn test_watch_on_low_confidence_or_wait() {
        let settings = EnrichmentSettings::default();
        let low = GateInput {
            confidence: 64,
            ..input()
        };
        assert_eq!(qualify(&low, &settings), AccessTier::Watch);

        let waiting = GateInput {
            action: Action::Wait,
            ..input()
        };
        assert_eq!(qualify(&waiting, &settings), AccessTier::Watch);
    }

    #[test]
    fn test_pulse_conditions() {
        let settings = EnrichmentSettings::default();
        let thin = GateInput {
            liquidity_usd: 299_999.0,
            ..input()
        };
        assert_eq!(qualify(&thin, &settings), AccessTier::Pulse);

        let late = GateInput {
            early_late_score: 76,
            ..input()
        };
        assert_eq!(qualify(&late, &settings), AccessTier::Pulse);

        let flash = GateInput {
            volume5m: 4_001.0,
            ..input()
        };
        assert_eq!(qualify(&flash, &settings), AccessTier::Pulse);
    }

    #[test]
    fn test_embargo_delays() {
        let settings = EnrichmentSettings::default();
        let now = 1_000_000;
        assert_eq!(embargo_until(AccessTier::Alpha, now, &settings), now + 15 * 60_000);
        assert_eq!(embargo_until(AccessTier::Pulse, now, &settings), now + 5 * 60_000);
        assert_eq!(embargo_until(AccessTier::Watch, now, &settings), now);
        assert_eq!(AccessTier::Pulse.access_level(), "freemium");
    }
}
