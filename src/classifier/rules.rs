//! Declarative tier thresholds ("launch mode")
//!
//! All age/liquidity/activity cutoffs the classifier uses live here so
//! one config object drives every tier.

use serde::{Deserialize, Serialize};

/// Classification bucket, recomputed from current metrics on every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Cio,
    Watch,
    Hotlist,
    FastCertified,
    Certified,
}

impl Tier {
    /// Evaluation order of the rule chain
    pub const ALL: [Tier; 5] = [
        Tier::Cio,
        Tier::Watch,
        Tier::Hotlist,
        Tier::FastCertified,
        Tier::Certified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cio => "CIO",
            Tier::Watch => "WATCH",
            Tier::Hotlist => "HOTLIST",
            Tier::FastCertified => "FAST_CERTIFIED",
            Tier::Certified => "CERTIFIED",
        }
    }

    /// Feed file name under the signals directory
    pub fn feed_file(&self) -> &'static str {
        match self {
            Tier::Cio => "cio_feed.json",
            Tier::Watch => "watch_feed.json",
            Tier::Hotlist => "hotlist_feed.json",
            Tier::FastCertified => "fast_certified_feed.json",
            Tier::Certified => "certified_feed.json",
        }
    }

    /// Array key inside the feed envelope, as the website reads it
    pub fn feed_key(&self) -> &'static str {
        match self {
            Tier::Cio => "candidates",
            Tier::Watch => "watch",
            Tier::Hotlist => "hotlist",
            Tier::FastCertified => "fast_certified",
            Tier::Certified => "certified",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for one tier
///
/// The age window is half-open: `min_age_minutes <= age < max_age_minutes`.
/// Activity minimums are alternatives: when any is configured, meeting one
/// of them is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    #[serde(default)]
    pub min_age_minutes: f64,
    /// `None` means unbounded
    #[serde(default)]
    pub max_age_minutes: Option<f64>,
    #[serde(default)]
    pub min_liquidity_usd: f64,
    #[serde(default)]
    pub min_txns_5m: Option<u32>,
    #[serde(default)]
    pub min_txns_15m: Option<u32>,
    #[serde(default)]
    pub min_txns_1h: Option<u32>,
}

impl TierRule {
    pub fn window(min_age_minutes: f64, max_age_minutes: Option<f64>, min_liquidity_usd: f64) -> Self {
        Self {
            min_age_minutes,
            max_age_minutes,
            min_liquidity_usd,
            min_txns_5m: None,
            min_txns_15m: None,
            min_txns_1h: None,
        }
    }

    pub fn contains_age(&self, age_minutes: f64) -> bool {
        age_minutes >= self.min_age_minutes
            && self.max_age_minutes.map_or(true, |max| age_minutes < max)
    }

    pub fn meets_activity(&self, txns_5m: u32, txns_15m: u32, txns_1h: u32) -> bool {
        let checks = [
            self.min_txns_5m.map(|min| txns_5m >= min),
            self.min_txns_15m.map(|min| txns_15m >= min),
            self.min_txns_1h.map(|min| txns_1h >= min),
        ];
        let mut configured = checks.iter().flatten().peekable();
        if configured.peek().is_none() {
            return true;
        }
        configured.any(|ok| *ok)
    }

    fn describe(&self) -> String {
        let upper = match self.max_age_minutes {
            Some(max) => format!("{}m", max),
            None => "inf".to_string(),
        };
        let mut parts = vec![format!(
            "age [{}m, {}), liq >= ${}",
            self.min_age_minutes, upper, self.min_liquidity_usd
        )];
        if let Some(n) = self.min_txns_5m {
            parts.push(format!("tx5m >= {}", n));
        }
        if let Some(n) = self.min_txns_15m {
            parts.push(format!("tx15m >= {}", n));
        }
        if let Some(n) = self.min_txns_1h {
            parts.push(format!("tx1h >= {}", n));
        }
        parts.join(", ")
    }
}

/// Rule set for all five tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRules {
    #[serde(default = "default_cio")]
    pub cio: TierRule,
    #[serde(default = "default_watch")]
    pub watch: TierRule,
    #[serde(default = "default_hotlist")]
    pub hotlist: TierRule,
    #[serde(default = "default_fast_certified")]
    pub fast_certified: TierRule,
    #[serde(default = "default_certified")]
    pub certified: TierRule,
}

fn default_cio() -> TierRule {
    TierRule::window(0.0, Some(10.0), 1_000.0)
}

fn default_watch() -> TierRule {
    TierRule {
        min_txns_5m: Some(8),
        ..TierRule::window(10.0, Some(30.0), 4_000.0)
    }
}

fn default_hotlist() -> TierRule {
    TierRule {
        min_txns_15m: Some(12),
        min_txns_1h: Some(40),
        ..TierRule::window(30.0, Some(60.0), 5_000.0)
    }
}

fn default_fast_certified() -> TierRule {
    TierRule::window(60.0, Some(24.0 * 60.0), 15_000.0)
}

fn default_certified() -> TierRule {
    TierRule::window(24.0 * 60.0, None, 25_000.0)
}

impl Default for TierRules {
    fn default() -> Self {
        Self {
            cio: default_cio(),
            watch: default_watch(),
            hotlist: default_hotlist(),
            fast_certified: default_fast_certified(),
            certified: default_certified(),
        }
    }
}

impl TierRules {
    pub fn rule(&self, tier: Tier) -> &TierRule {
        match tier {
            Tier::Cio => &self.cio,
            Tier::Watch => &self.watch,
            Tier::Hotlist => &self.hotlist,
            Tier::FastCertified => &self.fast_certified,
            Tier::Certified => &self.certified,
        }
    }

    /// Rules in evaluation order
    pub fn ordered(&self) -> impl Iterator<Item = (Tier, &TierRule)> {
        Tier::ALL.into_iter().map(move |tier| (tier, self.rule(tier)))
    }

    /// Check every window is well-formed and no two windows overlap
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (tier, rule) in self.ordered() {
            if rule.min_age_minutes < 0.0 {
                return Err(format!("{} min_age_minutes is negative", tier));
            }
            if let Some(max) = rule.max_age_minutes {
                if max <= rule.min_age_minutes {
                    return Err(format!(
                        "{} window is empty: [{}, {})",
                        tier, rule.min_age_minutes, max
                    ));
                }
            }
            if rule.min_liquidity_usd < 0.0 {
                return Err(format!("{} min_liquidity_usd is negative", tier));
            }
        }

        let rules: Vec<_> = self.ordered().collect();
        for (i, (a, ra)) in rules.iter().enumerate() {
            for (b, rb) in rules.iter().skip(i + 1) {
                if windows_overlap(ra, rb) {
                    return Err(format!("{} and {} age windows overlap", a, b));
                }
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        self.ordered()
            .map(|(tier, rule)| format!("    {}: {}", tier, rule.describe()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn windows_overlap(a: &TierRule, b: &TierRule) -> bool {
    let a_max = a.max_age_minutes.unwrap_or(f64::INFINITY);
    let b_max = b.max_age_minutes.unwrap_or(f64::INFINITY);
    a.min_age_minutes < b_max && b.min_age_minutes < a_max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_disjoint() {
        assert!(TierRules::default().validate().is_ok());
    }

    #[test]
    fn test_overlap_detected() {
        let mut rules = TierRules::default();
        rules.cio.max_age_minutes = Some(60.0);
        let err = rules.validate().unwrap_err();
        assert!(err.contains("CIO"));
    }

    #[test]
    fn test_empty_window_rejected() {
        let mut rules = TierRules::default();
        rules.watch.max_age_minutes = Some(10.0);
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_window_is_half_open() {
        let rules = TierRules::default();
        assert!(rules.cio.contains_age(0.0));
        assert!(rules.cio.contains_age(9.99));
        assert!(!rules.cio.contains_age(10.0));
        assert!(rules.watch.contains_age(10.0));
        assert!(rules.certified.contains_age(100_000.0));
    }

    #[test]
    fn test_activity_alternatives() {
        let rules = TierRules::default();
        // HOTLIST: tx15m >= 12 OR tx1h >= 40
        assert!(rules.hotlist.meets_activity(0, 12, 0));
        assert!(rules.hotlist.meets_activity(0, 0, 40));
        assert!(!rules.hotlist.meets_activity(50, 11, 39));
        // no activity minimum configured
        assert!(rules.cio.meets_activity(0, 0, 0));
    }

    #[test]
    fn test_tier_serializes_screaming() {
        assert_eq!(serde_json::to_string(&Tier::FastCertified).unwrap(), "\"FAST_CERTIFIED\"");
        assert_eq!(Tier::Hotlist.feed_key(), "hotlist");
    }
}
