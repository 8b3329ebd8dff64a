//! Normalized token signal record
//!
//! Every source (DEX search, token profiles, chain logs) is reduced to a
//! `TokenSignal` keyed by the lowercased token address.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MS_PER_MINUTE: f64 = 60_000.0;

/// Buy/sell counts over one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnCount {
    #[serde(default)]
    pub buys: u32,
    #[serde(default)]
    pub sells: u32,
}

impl TxnCount {
    pub fn new(buys: u32, sells: u32) -> Self {
        Self { buys, sells }
    }

    pub fn total(&self) -> u32 {
        self.buys.saturating_add(self.sells)
    }
}

/// Coarse risk bucket derived from risk tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    #[default]
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "🟢",
            RiskLevel::Medium => "🟡",
            RiskLevel::High => "🔴",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed token/pair at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSignal {
    /// Token contract address, lowercased
    pub address: String,
    #[serde(default)]
    pub pair_address: String,
    #[serde(default)]
    pub dex_id: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quote_symbol: String,
    #[serde(default)]
    pub pair_url: Option<String>,

    #[serde(default)]
    pub price_usd: f64,
    #[serde(default)]
    pub liquidity_usd: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub volume5m: f64,
    #[serde(default)]
    pub volume1h: f64,
    #[serde(default)]
    pub volume24h: f64,

    #[serde(default)]
    pub price_change5m: f64,
    #[serde(default)]
    pub price_change1h: f64,
    #[serde(default)]
    pub price_change24h: f64,

    #[serde(default)]
    pub txns5m: TxnCount,
    /// Only some sources report a 15-minute window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txns15m: Option<TxnCount>,
    #[serde(default)]
    pub txns1h: TxnCount,
    #[serde(default)]
    pub txns6h: TxnCount,
    #[serde(default)]
    pub txns24h: TxnCount,

    /// Pair creation time reported by the source (unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_created_at: Option<i64>,
    /// First time any collector saw this address (unix ms)
    #[serde(default, alias = "detectedAt")]
    pub first_seen_at: i64,
    /// Last refresh (unix ms)
    #[serde(default)]
    pub last_seen_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holders: Option<u64>,

    /// Ingest score 0-100, recomputed on every upsert
    #[serde(default)]
    pub score: u8,
    #[serde(default)]
    pub risk_tags: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Collector tag that produced this record
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub boosted: bool,
}

/// Normalize an EVM address into its key form
pub fn normalize_address(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAddress("empty address".to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

impl TokenSignal {
    /// Create a bare signal for an address observed at `now_ms`
    pub fn new(address: &str, now_ms: i64) -> Result<Self> {
        Ok(Self {
            address: normalize_address(address)?,
            first_seen_at: now_ms,
            last_seen_at: now_ms,
            ..Default::default()
        })
    }

    /// Age in minutes, from the pair creation time or first sighting
    pub fn age_minutes(&self, now_ms: i64) -> Option<f64> {
        let origin = self
            .pair_created_at
            .filter(|ts| *ts > 0)
            .or(Some(self.first_seen_at).filter(|ts| *ts > 0))?;
        Some(((now_ms - origin) as f64 / MS_PER_MINUTE).max(0.0))
    }

    pub fn age_hours(&self, now_ms: i64) -> Option<f64> {
        self.age_minutes(now_ms).map(|m| m / 60.0)
    }

    /// 15-minute transaction count, estimated when not reported
    pub fn txns15m_total(&self) -> u32 {
        match self.txns15m {
            Some(count) => count.total(),
            None => self.txns5m.total().max(self.txns1h.total() / 4),
        }
    }

    /// Volume to market cap ratio over 24h
    pub fn volume_ratio_24h(&self) -> f64 {
        if self.market_cap > 0.0 {
            self.volume24h / self.market_cap
        } else {
            0.0
        }
    }

    /// Recompute score, risk tags and risk level from current metrics
    pub fn rescore(&mut self, now_ms: i64) {
        self.score = ingest_score(self, now_ms);
        self.risk_tags = risk_tags(self);
        self.risk_level = risk_level_for(&self.risk_tags);
    }

    /// Refresh metrics from a newer observation of the same address
    ///
    /// Identity and first sighting are kept; everything observed is replaced.
    pub fn refresh_from(&mut self, newer: &TokenSignal) {
        let first_seen_at = if self.first_seen_at > 0 {
            self.first_seen_at.min(newer.first_seen_at.max(1))
        } else {
            newer.first_seen_at
        };
        let pair_created_at = newer.pair_created_at.or(self.pair_created_at);
        let holders = newer.holders.or(self.holders);
        let boosted = self.boosted || newer.boosted;
        let address = std::mem::take(&mut self.address);

        *self = newer.clone();
        self.address = address;
        self.first_seen_at = first_seen_at;
        self.pair_created_at = pair_created_at;
        self.holders = holders;
        self.boosted = boosted;
    }
}

/// Ingest score: freshness, liquidity and activity bonuses over a base of 50
pub fn ingest_score(signal: &TokenSignal, now_ms: i64) -> u8 {
    let mut score: i32 = 50;

    if let Some(age_h) = signal.age_hours(now_ms) {
        if age_h < 1.0 {
            score += 30;
        } else if age_h < 10.0 {
            score += 20;
        } else if age_h < 30.0 {
            score += 10;
        }
    }

    let liq = signal.liquidity_usd;
    if liq > 10_000.0 {
        score += 15;
    } else if liq > 5_000.0 {
        score += 10;
    } else if liq > 2_000.0 {
        score += 5;
    }

    if signal.volume5m > 1_000.0 {
        score += 10;
    }
    if signal.txns5m.total() > 10 {
        score += 10;
    }
    if signal.boosted {
        score += 5;
    }

    score.clamp(0, 100) as u8
}

/// Tag risks instead of filtering them out
pub fn risk_tags(signal: &TokenSignal) -> Vec<String> {
    let mut tags = Vec::new();
    if signal.liquidity_usd < 5_000.0 {
        tags.push("low_liquidity".to_string());
    }
    if signal.liquidity_usd < 2_000.0 {
        tags.push("very_low_liquidity".to_string());
    }
    if signal.txns5m.total() < 5 {
        tags.push("low_activity".to_string());
    }
    if signal.volume5m < 100.0 {
        tags.push("low_volume".to_string());
    }
    if signal.price_change5m < -10.0 {
        tags.push("dumping".to_string());
    }
    tags
}

pub fn risk_level_for(tags: &[String]) -> RiskLevel {
    match tags.len() {
        0 => RiskLevel::Low,
        1 | 2 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// Drop repeated addresses, keeping the first occurrence
///
/// Records with an empty address are dropped as well.
pub fn dedup_first_wins<I>(signals: I) -> Vec<TokenSignal>
where
    I: IntoIterator<Item = TokenSignal>,
{
    let mut seen = std::collections::HashSet::new();
    signals
        .into_iter()
        .filter_map(|mut s| {
            s.address = normalize_address(&s.address).ok()?;
            seen.insert(s.address.clone()).then_some(s)
        })
        .collect()
}

/// Current wall-clock time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    fn signal(age_minutes: f64) -> TokenSignal {
        let mut s = TokenSignal::new("0xABCdef0000000000000000000000000000000001", NOW).unwrap();
        s.pair_created_at = Some(NOW - (age_minutes * 60_000.0) as i64);
        s
    }

    #[test]
    fn test_address_is_normalized() {
        let s = TokenSignal::new("  0xABCdef  ", NOW).unwrap();
        assert_eq!(s.address, "0xabcdef");
        assert!(TokenSignal::new("   ", NOW).is_err());
    }

    #[test]
    fn test_age_falls_back_to_first_seen() {
        let mut s = TokenSignal::new("0x1", NOW - 120_000).unwrap();
        assert_eq!(s.age_minutes(NOW), Some(2.0));

        s.pair_created_at = Some(NOW - 600_000);
        assert_eq!(s.age_minutes(NOW), Some(10.0));

        let unknown = TokenSignal {
            address: "0x2".into(),
            ..Default::default()
        };
        assert_eq!(unknown.age_minutes(NOW), None);
    }

    #[test]
    fn test_txns15m_estimate() {
        let mut s = signal(20.0);
        s.txns5m = TxnCount::new(3, 2);
        s.txns1h = TxnCount::new(30, 18);
        assert_eq!(s.txns15m_total(), 12);

        s.txns15m = Some(TxnCount::new(9, 5));
        assert_eq!(s.txns15m_total(), 14);
    }

    #[test]
    fn test_txn_total_saturates() {
        let json = r#"{"address":"0xabc","txns5m":{"buys":4294967295,"sells":1}}"#;
        let s: TokenSignal = serde_json::from_str(json).unwrap();
        assert_eq!(s.txns5m.total(), u32::MAX);
        assert_eq!(s.txns15m_total(), u32::MAX);
        assert_eq!(TxnCount::new(u32::MAX, u32::MAX).total(), u32::MAX);
    }

    #[test]
    fn test_ingest_score_fresh_liquid_token() {
        let mut s = signal(20.0);
        s.liquidity_usd = 12_000.0;
        s.volume5m = 1_500.0;
        s.txns5m = TxnCount::new(8, 4);
        // 50 + 30 + 15 + 10 + 10
        assert_eq!(ingest_score(&s, NOW), 100);

        s.boosted = true;
        assert_eq!(ingest_score(&s, NOW), 100);
    }

    #[test]
    fn test_ingest_score_old_thin_token() {
        let mut s = signal(60.0 * 40.0);
        s.liquidity_usd = 1_500.0;
        assert_eq!(ingest_score(&s, NOW), 50);
    }

    #[test]
    fn test_risk_tags_and_level() {
        let mut s = signal(5.0);
        s.liquidity_usd = 1_000.0;
        s.price_change5m = -12.0;
        s.rescore(NOW);
        assert_eq!(
            s.risk_tags,
            vec!["low_liquidity", "very_low_liquidity", "low_activity", "low_volume", "dumping"]
        );
        assert_eq!(s.risk_level, RiskLevel::High);

        s.liquidity_usd = 50_000.0;
        s.volume5m = 5_000.0;
        s.txns5m = TxnCount::new(20, 10);
        s.price_change5m = 3.0;
        s.rescore(NOW);
        assert!(s.risk_tags.is_empty());
        assert_eq!(s.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_refresh_keeps_identity_and_first_seen() {
        let mut old = signal(30.0);
        old.first_seen_at = NOW - 1_000_000;
        old.holders = Some(120);
        old.liquidity_usd = 4_000.0;

        let mut newer = TokenSignal::new(&old.address, NOW).unwrap();
        newer.liquidity_usd = 9_000.0;
        newer.source = "search".into();

        old.refresh_from(&newer);
        assert_eq!(old.liquidity_usd, 9_000.0);
        assert_eq!(old.first_seen_at, NOW - 1_000_000);
        assert_eq!(old.last_seen_at, NOW);
        assert_eq!(old.holders, Some(120));
        assert!(old.pair_created_at.is_some());
        assert_eq!(old.source, "search");
    }

    #[test]
    fn test_dedup_keeps_first_and_drops_empty() {
        let mut a = signal(5.0);
        a.liquidity_usd = 1.0;
        let mut b = a.clone();
        b.address = b.address.to_uppercase().replace("0X", "0x");
        b.liquidity_usd = 2.0;
        let empty = TokenSignal::default();

        let out = dedup_first_wins(vec![a, empty, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].liquidity_usd, 1.0);
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let json = r#"{"address":"0xabc","liquidityUsd":6000,"txns5m":{"buys":4,"sells":1}}"#;
        let s: TokenSignal = serde_json::from_str(json).unwrap();
        assert_eq!(s.liquidity_usd, 6000.0);
        assert_eq!(s.txns5m.total(), 5);
        assert_eq!(s.risk_level, RiskLevel::High);
        assert!(s.txns15m.is_none());
    }
}
