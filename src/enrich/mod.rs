//! Signal enrichment
//!
//! Adds trend, confidence, horizon, suggested action and a readable
//! insight to each record, plus the phase and timing fields the access
//! gate relies on.

pub mod gate;
pub mod history;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::config::{Config, EnrichmentSettings};
use crate::error::Result;
use crate::signal::{RiskLevel, TokenSignal};

pub use gate::{AccessTier, GateInput};
pub use history::{HistoryEntry, SignalHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Flat,
    Down,
}

impl Trend {
    /// Numeric momentum: +1 up, -1 down, 0 flat
    pub fn momentum(&self) -> i8 {
        match self {
            Trend::Up => 1,
            Trend::Flat => 0,
            Trend::Down => -1,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Flat => "stable",
            Trend::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Short,
    Mid,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Wait,
    Watch,
    Enter,
}

impl Action {
    pub fn as_upper(&self) -> &'static str {
        match self {
            Action::Wait => "WAIT",
            Action::Watch => "WATCH",
            Action::Enter => "ENTER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketPhase {
    Accumulation,
    Breakout,
    Extension,
    Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub liquidity_usd: u64,
    pub momentum: i8,
    pub volume_ratio_24h: f64,
}

/// A record with every enrichment and gating field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSignal {
    /// `riskLevel` is replaced by the confidence-based level
    #[serde(flatten)]
    pub signal: TokenSignal,
    pub trend: Trend,
    pub confidence: u8,
    pub horizon: Horizon,
    pub suggested_action: Action,
    pub insight: String,
    pub invalidated_if: Vec<String>,
    pub metrics: SignalMetrics,
    pub market_phase: MarketPhase,
    pub early_late_score: u8,
    pub strength_reasons: Vec<String>,
    pub access_tier: AccessTier,
    pub access_level: String,
    /// Unix ms
    pub embargo_until: i64,
    pub enriched_at: i64,
}

/// Score trend against the last two history entries
pub fn trend(score: u8, history: &[HistoryEntry]) -> Trend {
    if history.len() < 2 {
        return Trend::Flat;
    }
    let recent = &history[history.len().saturating_sub(3)..];
    let previous = &recent[..recent.len() - 1];
    let avg = previous.iter().map(|e| e.score as f64).sum::<f64>() / previous.len() as f64;
    let score = score as f64;

    if score > avg * 1.15 {
        Trend::Up
    } else if score < avg * 0.85 {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// Confidence 30..=95, non-decreasing in liquidity
pub fn confidence(signal: &TokenSignal, now_ms: i64) -> u8 {
    let mut confidence = signal.score as i32;
    let liq = signal.liquidity_usd;

    if liq > 100_000.0 {
        confidence += 10;
    }
    if liq > 500_000.0 {
        confidence += 15;
    }
    if signal.market_cap > 0.0 && signal.volume_ratio_24h() > 0.1 {
        confidence += 10;
    }
    if signal.age_minutes(now_ms).is_some_and(|age| age < 10.0) {
        confidence -= 10;
    }

    confidence.clamp(30, 95) as u8
}

pub fn horizon(signal: &TokenSignal) -> Horizon {
    if signal.volume5m > signal.volume1h / 10.0 || signal.price_change1h > 0.5 {
        Horizon::Short
    } else if signal.liquidity_usd > 500_000.0 {
        Horizon::Mid
    } else {
        Horizon::Long
    }
}

pub fn action(signal: &TokenSignal, trend: Trend, confidence: u8) -> Action {
    if confidence < 40 {
        return Action::Wait;
    }
    if trend == Trend::Down && signal.price_change1h < -0.2 {
        return Action::Wait;
    }
    if confidence > 70 && trend == Trend::Up {
        return Action::Watch;
    }
    if confidence > 80 && signal.liquidity_usd > 200_000.0 {
        return Action::Enter;
    }
    Action::Watch
}

pub fn confidence_risk(confidence: u8) -> RiskLevel {
    if confidence > 70 {
        RiskLevel::Low
    } else if confidence > 50 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

pub fn insight(signal: &TokenSignal, trend: Trend, action: Action, confidence: u8) -> String {
    format!(
        "Liquidity ~${:.0}k, momentum {}, score {}: {} (confidence {}%).",
        signal.liquidity_usd / 1_000.0,
        trend.describe(),
        signal.score,
        action.as_upper(),
        confidence
    )
}

/// Conditions under which the signal should be considered void
pub fn invalidated_if(signal: &TokenSignal, trend: Trend) -> Vec<String> {
    let score_floor = (signal.score as f64 * 0.7).floor() as u64;
    let liquidity_floor = ((signal.liquidity_usd * 0.5 / 10_000.0).floor() * 10_000.0) as u64;
    vec![
        format!("score < {}", score_floor),
        format!("liquidity_usd < {}", liquidity_floor),
        if trend == Trend::Up {
            "momentum_reverses_down".to_string()
        } else {
            "momentum_weakens_2_cycles".to_string()
        },
    ]
}

pub fn market_phase(signal: &TokenSignal, now_ms: i64) -> MarketPhase {
    let pc5m = signal.price_change5m;
    let vol5m = signal.volume5m;
    let age = signal.age_minutes(now_ms).unwrap_or(0.0);

    if pc5m < -5.0 && age > 60.0 {
        MarketPhase::Distribution
    } else if pc5m > 10.0 && vol5m > 5_000.0 {
        MarketPhase::Breakout
    } else if pc5m > 15.0 && vol5m < 3_000.0 {
        MarketPhase::Extension
    } else {
        MarketPhase::Accumulation
    }
}

/// 0 = too early, ~50 = on time, 100 = chasing
pub fn early_late_score(signal: &TokenSignal, trend: Trend, now_ms: i64) -> u8 {
    let age = signal.age_minutes(now_ms).unwrap_or(0.0);
    let mut score: i32 = if age < 5.0 {
        10
    } else if age < 15.0 {
        30
    } else if age < 45.0 {
        50
    } else if age < 120.0 {
        65
    } else if age < 300.0 {
        80
    } else {
        95
    };

    let momentum = trend.momentum() as f64;
    if momentum > 0.5 {
        score -= 5;
    }
    if momentum < -0.3 {
        score += 15;
    }

    let pc5m = signal.price_change5m;
    if pc5m > 30.0 {
        score += 20;
    }
    if pc5m < -10.0 {
        score += 10;
    }

    score.clamp(0, 100) as u8
}

/// Up to three plain-English reasons backing the signal
pub fn strength_reasons(signal: &TokenSignal, trend: Trend) -> Vec<String> {
    let mut reasons = Vec::new();
    let liq = signal.liquidity_usd;

    if liq > 500_000.0 {
        reasons.push("High liquidity (>500k), smooth entry and exit");
    } else if liq > 200_000.0 {
        reasons.push("Solid liquidity (>200k), limited slippage");
    }

    if signal.volume5m > 10_000.0 {
        reasons.push("Strong 5m volume, confirmed interest");
    } else if signal.volume5m > signal.volume1h / 12.0 {
        reasons.push("Consistent volume, no flash pump");
    }

    if signal.price_change5m > 0.0 && signal.price_change5m < 15.0 {
        reasons.push("Moderate upward momentum, no FOMO");
    }
    if trend == Trend::Up {
        reasons.push("Favorable technical trend");
    }
    if signal.txns5m.total() > 50 {
        reasons.push("Sustained trading activity");
    }
    if signal.holders.unwrap_or(0) > 100 {
        reasons.push("Acceptable holder distribution");
    }

    reasons.into_iter().take(3).map(String::from).collect()
}

/// Stateful enricher owning the score history
pub struct Enricher {
    settings: EnrichmentSettings,
    history: SignalHistory,
    history_path: PathBuf,
    output_dir: PathBuf,
}

impl Enricher {
    pub async fn load(config: &Config) -> Self {
        let history_path = config.storage.history_path();
        Self {
            settings: config.enrichment.clone(),
            history: SignalHistory::load(&history_path).await,
            history_path,
            output_dir: config.storage.signals_dir(),
        }
    }

    pub fn with_history(settings: EnrichmentSettings, history: SignalHistory, history_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            settings,
            history,
            history_path,
            output_dir,
        }
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    /// Enrich one record and append it to the history
    pub fn enrich(&mut self, signal: &TokenSignal, now_ms: i64) -> EnrichedSignal {
        let trend = trend(signal.score, self.history.entries(&signal.symbol));
        let confidence = confidence(signal, now_ms);
        let action = action(signal, trend, confidence);
        let early_late = early_late_score(signal, trend, now_ms);

        let access_tier = gate::qualify(
            &GateInput {
                confidence,
                action,
                liquidity_usd: signal.liquidity_usd,
                early_late_score: early_late,
                volume5m: signal.volume5m,
                volume1h: signal.volume1h,
            },
            &self.settings,
        );

        self.history.record(
            &signal.symbol,
            HistoryEntry {
                timestamp: now_ms,
                score: signal.score,
                price: signal.price_usd,
                mcap: signal.market_cap,
            },
            self.settings.history_len,
            self.settings.history_retention_days,
        );

        let mut out = signal.clone();
        out.risk_level = confidence_risk(confidence);

        let first_seen = if signal.first_seen_at > 0 {
            signal.first_seen_at.min(now_ms)
        } else {
            now_ms
        };

        EnrichedSignal {
            trend,
            confidence,
            horizon: horizon(signal),
            suggested_action: action,
            insight: insight(signal, trend, action, confidence),
            invalidated_if: invalidated_if(signal, trend),
            metrics: SignalMetrics {
                liquidity_usd: signal.liquidity_usd.max(0.0).floor() as u64,
                momentum: trend.momentum(),
                volume_ratio_24h: (signal.volume_ratio_24h() * 10_000.0).round() / 10_000.0,
            },
            market_phase: market_phase(signal, now_ms),
            early_late_score: early_late,
            strength_reasons: strength_reasons(signal, trend),
            access_tier,
            access_level: access_tier.access_level().to_string(),
            embargo_until: gate::embargo_until(access_tier, first_seen, &self.settings),
            enriched_at: now_ms,
            signal: out,
        }
    }

    /// Enrich a batch, write the gated outputs and persist history
    pub async fn run_pass(&mut self, signals: &[TokenSignal], now_ms: i64) -> Result<Vec<EnrichedSignal>> {
        let enriched: Vec<EnrichedSignal> = signals.iter().map(|s| self.enrich(s, now_ms)).collect();

        gate::write_outputs(&self.output_dir, &enriched, now_ms).await?;
        self.history.save(&self.history_path).await?;

        info!(
            records = enriched.len(),
            symbols = self.history.symbols(),
            "Enrichment pass complete"
        );
        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TxnCount;
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000_000;

    fn signal(score: u8, liquidity: f64, age_minutes: f64) -> TokenSignal {
        let mut s = TokenSignal::new("0xe1", NOW).unwrap();
        s.symbol = "LCAT".into();
        s.score = score;
        s.liquidity_usd = liquidity;
        s.pair_created_at = Some(NOW - (age_minutes * 60_000.0) as i64);
        s
    }

    fn history(scores: &[u8]) -> Vec<HistoryEntry> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| HistoryEntry {
                timestamp: NOW + i as i64,
                score: *score,
                price: 0.0,
                mcap: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_trend_needs_two_entries() {
        assert_eq!(trend(90, &history(&[])), Trend::Flat);
        assert_eq!(trend(90, &history(&[50])), Trend::Flat);
    }

    #[test]
    fn test_trend_against_recent_average() {
        // last three are 40, 60, 99: avg of the first two is 50
        assert_eq!(trend(58, &history(&[10, 40, 60, 99])), Trend::Up);
        assert_eq!(trend(42, &history(&[10, 40, 60, 99])), Trend::Down);
        assert_eq!(trend(50, &history(&[10, 40, 60, 99])), Trend::Flat);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(confidence(&signal(0, 0.0, 60.0), NOW), 30);
        let mut rich = signal(100, 1_000_000.0, 60.0);
        rich.market_cap = 1_000.0;
        rich.volume24h = 1_000.0;
        assert_eq!(confidence(&rich, NOW), 95);
    }

    #[test]
    fn test_confidence_monotone_in_liquidity() {
        let mut last = 0;
        for liq in [0.0, 50_000.0, 100_001.0, 300_000.0, 500_001.0, 2_000_000.0] {
            let c = confidence(&signal(55, liq, 60.0), NOW);
            assert!(c >= last, "confidence dropped at liq {}", liq);
            last = c;
        }
        assert_eq!(confidence(&signal(55, 500_001.0, 60.0), NOW), 80);
    }

    #[test]
    fn test_young_pairs_are_penalized() {
        assert_eq!(confidence(&signal(70, 0.0, 5.0), NOW), 60);
        assert_eq!(confidence(&signal(70, 0.0, 15.0), NOW), 70);
    }

    #[test]
    fn test_horizon_and_action() {
        let mut s = signal(80, 600_000.0, 60.0);
        s.volume1h = 10_000.0;
        s.volume5m = 100.0;
        assert_eq!(horizon(&s), Horizon::Mid);
        s.price_change1h = 1.0;
        assert_eq!(horizon(&s), Horizon::Short);

        assert_eq!(action(&s, Trend::Flat, 35), Action::Wait);
        assert_eq!(action(&s, Trend::Up, 75), Action::Watch);
        assert_eq!(action(&s, Trend::Flat, 85), Action::Enter);
        s.price_change1h = -1.0;
        assert_eq!(action(&s, Trend::Down, 85), Action::Wait);
    }

    #[test]
    fn test_insight_and_invalidation() {
        let s = signal(80, 123_456.0, 60.0);
        assert_eq!(
            insight(&s, Trend::Flat, Action::Watch, 90),
            "Liquidity ~$123k, momentum stable, score 80: WATCH (confidence 90%)."
        );
        assert_eq!(
            invalidated_if(&s, Trend::Up),
            vec!["score < 56", "liquidity_usd < 60000", "momentum_reverses_down"]
        );
    }

    #[test]
    fn test_market_phase() {
        let mut s = signal(60, 10_000.0, 90.0);
        s.price_change5m = -6.0;
        assert_eq!(market_phase(&s, NOW), MarketPhase::Distribution);

        s.price_change5m = 12.0;
        s.volume5m = 6_000.0;
        assert_eq!(market_phase(&s, NOW), MarketPhase::Breakout);

        s.price_change5m = 20.0;
        s.volume5m = 1_000.0;
        assert_eq!(market_phase(&s, NOW), MarketPhase::Extension);

        s.price_change5m = 1.0;
        assert_eq!(market_phase(&s, NOW), MarketPhase::Accumulation);
    }

    #[test]
    fn test_early_late_score() {
        let s = signal(60, 10_000.0, 3.0);
        assert_eq!(early_late_score(&s, Trend::Flat, NOW), 10);
        assert_eq!(early_late_score(&s, Trend::Up, NOW), 5);

        let mut late = signal(60, 10_000.0, 400.0);
        late.price_change5m = 35.0;
        assert_eq!(early_late_score(&late, Trend::Down, NOW), 100);
    }

    #[test]
    fn test_strength_reasons_capped_at_three() {
        let mut s = signal(60, 600_000.0, 60.0);
        s.volume5m = 20_000.0;
        s.price_change5m = 5.0;
        s.txns5m = TxnCount::new(60, 10);
        s.holders = Some(500);
        let reasons = strength_reasons(&s, Trend::Up);
        assert_eq!(reasons.len(), 3);
        assert!(reasons[0].starts_with("High liquidity"));
    }

    #[tokio::test]
    async fn test_run_pass_writes_outputs_and_history() {
        let dir = TempDir::new().unwrap();
        let history_path = dir.path().join("signal_history.json");
        let mut enricher = Enricher::with_history(
            EnrichmentSettings::default(),
            SignalHistory::default(),
            history_path.clone(),
            dir.path().join("signals"),
        );

        let mut alpha = signal(90, 400_000.0, 30.0);
        alpha.address = "0xalpha".into();
        alpha.symbol = "ALPHA".into();
        alpha.volume1h = 50_000.0;
        alpha.volume5m = 2_000.0;

        let mut watch = signal(20, 1_000.0, 30.0);
        watch.address = "0xwatch".into();
        watch.symbol = "SMOL".into();

        let enriched = enricher.run_pass(&[alpha, watch], NOW).await.unwrap();
        assert_eq!(enriched[0].access_tier, AccessTier::Alpha);
        assert_eq!(enriched[0].signal.risk_level, RiskLevel::Low);
        assert_eq!(enriched[1].access_tier, AccessTier::Watch);

        let read = |name: &str| -> serde_json::Value {
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("signals").join(name)).unwrap())
                .unwrap()
        };
        assert_eq!(read(gate::PUBLIC_FILE)["count"], 1);
        assert_eq!(read(gate::PUBLIC_FILE)["items"][0]["address"], "0xwatch");
        assert_eq!(read(gate::ALPHA_FILE)["count"], 1);
        assert_eq!(read(gate::FULL_FILE)["count"], 2);
        assert_eq!(read(gate::FULL_FILE)["items"][0]["accessLevel"], "premium");

        assert!(history_path.exists());
        assert_eq!(enricher.history().entries("ALPHA").len(), 1);
    }

    #[tokio::test]
    async fn test_pulse_is_released_after_embargo() {
        let dir = TempDir::new().unwrap();
        let mut enricher = Enricher::with_history(
            EnrichmentSettings::default(),
            SignalHistory::default(),
            dir.path().join("signal_history.json"),
            dir.path().join("signals"),
        );
        let public_count = || -> serde_json::Value {
            let path = dir.path().join("signals").join(gate::PUBLIC_FILE);
            serde_json::from_str::<serde_json::Value>(&std::fs::read_to_string(path).unwrap()).unwrap()["count"]
                .clone()
        };

        let pulse = signal(90, 50_000.0, 30.0);

        let first = enricher.run_pass(&[pulse.clone()], NOW).await.unwrap();
        assert_eq!(first[0].access_tier, AccessTier::Pulse);
        assert_eq!(first[0].embargo_until, NOW + 5 * 60_000);
        assert_eq!(public_count(), 0);

        let later = NOW + 10 * 60_000;
        let second = enricher.run_pass(&[pulse], later).await.unwrap();
        assert_eq!(second[0].access_tier, AccessTier::Pulse);
        assert_eq!(second[0].embargo_until, NOW + 5 * 60_000);
        assert_eq!(public_count(), 1);
    }
}
