//! Tier classification
//!
//! Buckets deduplicated signals into CIO / WATCH / HOTLIST / FAST_CERTIFIED /
//! CERTIFIED by evaluating the rule chain in order; the first satisfied
//! rule wins. Tiers are labels recomputed from scratch on every pass.

pub mod feeds;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::signal::{dedup_first_wins, RiskLevel, TokenSignal};

pub use feeds::{write_feeds, FeedStatus};
pub use rules::{Tier, TierRule, TierRules};

/// Risk bias shown next to HOTLIST entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBias {
    pub level: RiskLevel,
    pub text: String,
}

impl RiskBias {
    pub fn evaluate(signal: &TokenSignal) -> Self {
        let liq = signal.liquidity_usd;
        let vol5m = signal.volume5m;
        let tx5m = signal.txns5m.total();

        if liq > 20_000.0 && vol5m > 5_000.0 && tx5m > 20 {
            return Self {
                level: RiskLevel::Low,
                text: "momentum + structure OK".to_string(),
            };
        }
        if liq > 10_000.0 && vol5m > 2_000.0 && tx5m > 10 {
            return Self {
                level: RiskLevel::Medium,
                text: "momentum OK, structure fragile".to_string(),
            };
        }
        Self {
            level: RiskLevel::High,
            text: "pure speculation, scalp only".to_string(),
        }
    }
}

/// Short volume trend for FAST_CERTIFIED entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTrend {
    Up,
    Stable,
}

/// Tier-specific derived scores; only the fields of the assigned tier are set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cio_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotlist_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub momentum_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vol_trend: Option<VolumeTrend>,
}

/// A signal with its tier assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedSignal {
    #[serde(flatten)]
    pub signal: TokenSignal,
    pub tier: Tier,
    pub tier_label: String,
    pub age_minutes: f64,
    pub tier_scores: TierScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_bias: Option<RiskBias>,
}

impl ClassifiedSignal {
    /// Key each feed is sorted by (descending unless noted)
    fn sort_value(&self) -> f64 {
        let s = &self.tier_scores;
        match self.tier {
            Tier::Cio => s.cio_score.unwrap_or(0) as f64,
            // youngest first
            Tier::Watch => -self.age_minutes,
            Tier::Hotlist => s.opportunity_score.unwrap_or(0) as f64,
            Tier::FastCertified => s.momentum_score.unwrap_or(0) as f64,
            Tier::Certified => self.signal.holders.unwrap_or(0) as f64,
        }
    }
}

/// Output of one classification pass
#[derive(Debug, Clone, Default)]
pub struct Feeds {
    pub by_tier: BTreeMap<Tier, Vec<ClassifiedSignal>>,
    /// Unique records considered
    pub input_count: usize,
    /// Records that matched no tier
    pub unclassified: usize,
}

impl Feeds {
    pub fn get(&self, tier: Tier) -> &[ClassifiedSignal] {
        self.by_tier.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.by_tier.values().map(Vec::len).sum()
    }

    /// Address -> tier map, useful for comparing passes
    pub fn assignments(&self) -> BTreeMap<String, Tier> {
        self.by_tier
            .iter()
            .flat_map(|(tier, items)| items.iter().map(move |c| (c.signal.address.clone(), *tier)))
            .collect()
    }
}

/// Rule-chain classifier
pub struct Classifier {
    rules: TierRules,
}

impl Classifier {
    pub fn new(rules: TierRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &TierRules {
        &self.rules
    }

    /// Assign at most one tier to a single record
    pub fn classify_one(&self, signal: &TokenSignal, now_ms: i64) -> Option<Tier> {
        let age = signal.age_minutes(now_ms)?;
        let liq = signal.liquidity_usd;
        let tx5m = signal.txns5m.total();
        let tx15m = signal.txns15m_total();
        let tx1h = signal.txns1h.total();

        for (tier, rule) in self.rules.ordered() {
            if rule.contains_age(age)
                && liq >= rule.min_liquidity_usd
                && rule.meets_activity(tx5m, tx15m, tx1h)
            {
                return Some(tier);
            }
        }
        None
    }

    /// Deduplicate, classify and sort a batch of records
    pub fn classify<I>(&self, signals: I, now_ms: i64) -> Feeds
    where
        I: IntoIterator<Item = TokenSignal>,
    {
        let unique = dedup_first_wins(signals);
        let mut feeds = Feeds {
            input_count: unique.len(),
            ..Default::default()
        };
        for tier in Tier::ALL {
            feeds.by_tier.insert(tier, Vec::new());
        }

        for signal in unique {
            let Some(tier) = self.classify_one(&signal, now_ms) else {
                feeds.unclassified += 1;
                continue;
            };
            let classified = annotate(signal, tier, now_ms);
            debug!(
                address = %classified.signal.address,
                symbol = %classified.signal.symbol,
                tier = %tier,
                "Classified signal"
            );
            feeds.by_tier.entry(tier).or_default().push(classified);
        }

        for items in feeds.by_tier.values_mut() {
            items.sort_by(|a, b| {
                b.sort_value()
                    .partial_cmp(&a.sort_value())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.signal.address.cmp(&b.signal.address))
            });
        }

        feeds
    }
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Cio => "0-10m",
        Tier::Watch => "10-30m",
        Tier::Hotlist => "30-60m",
        Tier::FastCertified => "1-24h",
        Tier::Certified => "24h+",
    }
}

fn annotate(signal: TokenSignal, tier: Tier, now_ms: i64) -> ClassifiedSignal {
    let age_minutes = signal.age_minutes(now_ms).unwrap_or(0.0);
    let liq = signal.liquidity_usd;
    let mut scores = TierScores::default();
    let mut risk_bias = None;

    match tier {
        Tier::Cio => {
            let score = (liq / 1_000.0).floor() + (signal.volume5m / 1_000.0).floor();
            scores.cio_score = Some(score.clamp(0.0, 100.0) as u32);
        }
        Tier::Watch => {
            scores.checks = Some((age_minutes / 10.0).floor() as u32 + 1);
        }
        Tier::Hotlist => {
            let tx15m = signal.txns15m_total();
            let score = (liq / 2_000.0).floor() + (tx15m / 2) as f64;
            scores.hotlist_score = Some(score.clamp(0.0, 100.0) as u32);
            scores.opportunity_score = Some(tx15m / 3);
            risk_bias = Some(RiskBias::evaluate(&signal));
        }
        Tier::FastCertified => {
            scores.momentum_score = Some((liq / 1_000.0).floor().clamp(0.0, 100.0) as u32);
            scores.vol_trend = Some(if signal.volume5m > signal.volume1h / 12.0 {
                VolumeTrend::Up
            } else {
                VolumeTrend::Stable
            });
        }
        Tier::Certified => {}
    }

    ClassifiedSignal {
        signal,
        tier,
        tier_label: tier_label(tier).to_string(),
        age_minutes,
        tier_scores: scores,
        risk_bias,
    }
}
