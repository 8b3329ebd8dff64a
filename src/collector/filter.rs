//! Collector admission filter
//!
//! Rejects bluechips, blocklisted names and records outside the
//! collector's age/liquidity/activity thresholds. Risky but admissible
//! records pass and get risk tags instead.

use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::config::CollectorSettings;
use crate::error::{Error, Result};
use crate::signal::TokenSignal;

/// 1h volume that waives the 5m volume minimum
const ACTIVE_HOUR_VOLUME: f64 = 500.0;

/// Reason why a candidate was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum FilterReason {
    /// Address is on the blocklist
    BlockedAddress,
    /// Symbol is a bluechip or explicitly blocked
    BlockedSymbol(String),
    /// Name or symbol matches a blocked pattern
    BlockedName(String),
    /// Older than the collector's window (minutes)
    TooOld(f64),
    /// Liquidity below minimum (USD)
    LiquidityBelowMinimum(f64),
    /// Market cap above maximum (USD)
    MarketCapAboveMaximum(f64),
    /// 5m volume below minimum (USD)
    VolumeBelowMinimum(f64),
    /// 5m transactions below minimum
    TxnsBelowMinimum(u32),
}

impl FilterReason {
    /// Stable key used in cycle reports
    pub fn kind(&self) -> &'static str {
        match self {
            FilterReason::BlockedAddress => "blocked_address",
            FilterReason::BlockedSymbol(_) => "blocked_symbol",
            FilterReason::BlockedName(_) => "blocked_name",
            FilterReason::TooOld(_) => "too_old",
            FilterReason::LiquidityBelowMinimum(_) => "low_liquidity",
            FilterReason::MarketCapAboveMaximum(_) => "high_market_cap",
            FilterReason::VolumeBelowMinimum(_) => "low_volume",
            FilterReason::TxnsBelowMinimum(_) => "low_txns",
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::BlockedAddress => write!(f, "address is blocklisted"),
            FilterReason::BlockedSymbol(symbol) => write!(f, "symbol {} is blocked", symbol),
            FilterReason::BlockedName(pattern) => {
                write!(f, "name matches blocked pattern: {}", pattern)
            }
            FilterReason::TooOld(age) => write!(f, "age {:.0}m exceeds window", age),
            FilterReason::LiquidityBelowMinimum(usd) => {
                write!(f, "liquidity ${:.0} below minimum", usd)
            }
            FilterReason::MarketCapAboveMaximum(usd) => {
                write!(f, "market cap ${:.0} above maximum", usd)
            }
            FilterReason::VolumeBelowMinimum(usd) => write!(f, "5m volume ${:.0} below minimum", usd),
            FilterReason::TxnsBelowMinimum(n) => write!(f, "{} txns in 5m below minimum", n),
        }
    }
}

/// Filter result
#[derive(Debug, Clone, PartialEq)]
pub enum FilterResult {
    /// Candidate passed all filters
    Pass,
    /// Candidate was rejected
    Filtered(FilterReason),
}

impl FilterResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, FilterResult::Filtered(_))
    }
}

/// Per-collector filter built from its settings
pub struct CollectorFilter {
    min_liquidity_usd: f64,
    max_age_minutes: Option<f64>,
    min_volume_5m: f64,
    min_txns_5m: u32,
    max_market_cap: Option<f64>,
    blocked_patterns: Vec<Regex>,
    blocked_symbols: HashSet<String>,
    blocked_addresses: HashSet<String>,
}

impl CollectorFilter {
    pub fn new(settings: &CollectorSettings) -> Result<Self> {
        let blocked_patterns = settings
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRegex(e.to_string()))?;

        Ok(Self {
            min_liquidity_usd: settings.min_liquidity_usd,
            max_age_minutes: settings.max_age_minutes,
            min_volume_5m: settings.min_volume_5m,
            min_txns_5m: settings.min_txns_5m,
            max_market_cap: settings.max_market_cap,
            blocked_patterns,
            blocked_symbols: settings
                .blocked_symbols
                .iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .collect(),
            blocked_addresses: settings
                .blocked_addresses
                .iter()
                .map(|a| a.trim().to_ascii_lowercase())
                .collect(),
        })
    }

    /// Check one candidate at `now_ms`
    pub fn check(&self, signal: &TokenSignal, now_ms: i64) -> FilterResult {
        if self.blocked_addresses.contains(&signal.address) {
            return FilterResult::Filtered(FilterReason::BlockedAddress);
        }

        let symbol = signal.symbol.trim().to_ascii_uppercase();
        if self.blocked_symbols.contains(&symbol) {
            return FilterResult::Filtered(FilterReason::BlockedSymbol(symbol));
        }

        for pattern in &self.blocked_patterns {
            if pattern.is_match(&signal.name) || pattern.is_match(&signal.symbol) {
                debug!(
                    "Token {} ({}) blocked by pattern: {}",
                    signal.name, signal.symbol, pattern
                );
                return FilterResult::Filtered(FilterReason::BlockedName(pattern.to_string()));
            }
        }

        if let (Some(max_age), Some(age)) = (self.max_age_minutes, signal.age_minutes(now_ms)) {
            if age > max_age {
                return FilterResult::Filtered(FilterReason::TooOld(age));
            }
        }

        if signal.liquidity_usd < self.min_liquidity_usd {
            return FilterResult::Filtered(FilterReason::LiquidityBelowMinimum(signal.liquidity_usd));
        }

        if let Some(max_mcap) = self.max_market_cap {
            if signal.market_cap > max_mcap {
                return FilterResult::Filtered(FilterReason::MarketCapAboveMaximum(signal.market_cap));
            }
        }

        if signal.volume5m < self.min_volume_5m && signal.volume1h < ACTIVE_HOUR_VOLUME {
            return FilterResult::Filtered(FilterReason::VolumeBelowMinimum(signal.volume5m));
        }

        let txns = signal.txns5m.total();
        if txns < self.min_txns_5m {
            return FilterResult::Filtered(FilterReason::TxnsBelowMinimum(txns));
        }

        FilterResult::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TxnCount;

    const NOW: i64 = 1_760_000_000_000;

    fn candidate(symbol: &str, age_minutes: f64) -> TokenSignal {
        let mut s = TokenSignal::new("0xcafe", NOW).unwrap();
        s.symbol = symbol.to_string();
        s.name = format!("{} token", symbol);
        s.pair_created_at = Some(NOW - (age_minutes * 60_000.0) as i64);
        s.liquidity_usd = 2_000.0;
        s.volume5m = 100.0;
        s.txns5m = TxnCount::new(2, 1);
        s
    }

    fn settings() -> CollectorSettings {
        let mut s = CollectorSettings::cio_search();
        s.blocked_patterns = vec!["(?i)scam".to_string(), "(?i)rug".to_string()];
        s.blocked_addresses = vec!["0xDEAD".to_string()];
        s
    }

    #[test]
    fn test_pass_filter() {
        let filter = CollectorFilter::new(&settings()).unwrap();
        assert!(filter.check(&candidate("LCAT", 5.0), NOW).is_pass());
    }

    #[test]
    fn test_bluechip_symbol_blocked_case_insensitive() {
        let filter = CollectorFilter::new(&settings()).unwrap();
        let result = filter.check(&candidate("weth", 5.0), NOW);
        assert_eq!(
            result,
            FilterResult::Filtered(FilterReason::BlockedSymbol("WETH".into()))
        );
    }

    #[test]
    fn test_blocked_pattern_and_address() {
        let filter = CollectorFilter::new(&settings()).unwrap();
        assert!(filter.check(&candidate("SCAMX", 5.0), NOW).is_filtered());

        let mut s = candidate("OK", 5.0);
        s.address = "0xdead".into();
        assert_eq!(
            filter.check(&s, NOW),
            FilterResult::Filtered(FilterReason::BlockedAddress)
        );
    }

    #[test]
    fn test_thresholds() {
        let filter = CollectorFilter::new(&settings()).unwrap();

        let old = candidate("OLD", 90.0);
        assert_eq!(filter.check(&old, NOW).is_filtered(), true);

        let mut thin = candidate("THIN", 5.0);
        thin.liquidity_usd = 999.0;
        assert!(matches!(
            filter.check(&thin, NOW),
            FilterResult::Filtered(FilterReason::LiquidityBelowMinimum(_))
        ));

        let mut quiet = candidate("QUIET", 5.0);
        quiet.volume5m = 10.0;
        assert_eq!(filter.check(&quiet, NOW).is_filtered(), true);
        // busy hour waives the 5m volume minimum
        quiet.volume1h = 800.0;
        assert!(filter.check(&quiet, NOW).is_pass());

        let mut idle = candidate("IDLE", 5.0);
        idle.txns5m = TxnCount::new(1, 0);
        assert_eq!(
            filter.check(&idle, NOW),
            FilterResult::Filtered(FilterReason::TxnsBelowMinimum(1))
        );
    }

    #[test]
    fn test_market_cap_cap() {
        let filter = CollectorFilter::new(&CollectorSettings::profiles()).unwrap();
        let mut big = candidate("BIG", 30.0);
        big.liquidity_usd = 80_000.0;
        big.market_cap = 90_000_000.0;
        assert_eq!(filter.check(&big, NOW).is_filtered(), true);
        assert_eq!(
            filter.check(&big, NOW),
            FilterResult::Filtered(FilterReason::MarketCapAboveMaximum(90_000_000.0))
        );
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut s = settings();
        s.blocked_patterns = vec!["(".to_string()];
        assert!(CollectorFilter::new(&s).is_err());
    }
}
