//! Signal collection
//!
//! A collector pulls candidates from one source, filters them with its own
//! thresholds and upserts the survivors into the shared store.

pub mod filter;
pub mod rpc;

use async_trait::async_trait;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CollectorSettings, Config, SourceSettings};
use crate::dexscreener::DexScreenerClient;
use crate::error::Result;
use crate::signal::{dedup_first_wins, TokenSignal};
use crate::store::{SignalStore, UpsertOutcome};

pub use filter::{CollectorFilter, FilterReason, FilterResult};
pub use rpc::ChainLogSource;

/// Jittered pause between search queries (ms)
const QUERY_PAUSE_MS: std::ops::Range<u64> = 200..700;

/// Where candidates come from
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Source kind for logging
    fn kind(&self) -> &'static str;

    /// Fetch raw candidates observed at `now_ms`
    ///
    /// Per-request failures inside a source are logged and skipped; an
    /// error here means the whole source was unreachable.
    async fn fetch(&self, now_ms: i64) -> Result<Vec<TokenSignal>>;
}

/// Free-text pair search over several queries
pub struct DexSearchSource {
    client: Arc<DexScreenerClient>,
    queries: Vec<String>,
    tag: String,
}

impl DexSearchSource {
    pub fn new(client: Arc<DexScreenerClient>, queries: Vec<String>, tag: &str) -> Self {
        Self {
            client,
            queries,
            tag: tag.to_string(),
        }
    }
}

#[async_trait]
impl SignalSource for DexSearchSource {
    fn kind(&self) -> &'static str {
        "search"
    }

    async fn fetch(&self, now_ms: i64) -> Result<Vec<TokenSignal>> {
        let mut signals = Vec::new();
        for (i, query) in self.queries.iter().enumerate() {
            if i > 0 {
                let pause = rand::thread_rng().gen_range(QUERY_PAUSE_MS);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            match self.client.search_pairs(query).await {
                Ok(pairs) => {
                    debug!(query = %query, "Search returned {} pairs", pairs.len());
                    signals.extend(pairs.iter().filter_map(|p| p.to_signal(now_ms, &self.tag).ok()));
                }
                Err(e) => warn!(query = %query, "Search failed: {}", e),
            }
        }
        Ok(signals)
    }
}

/// Which DexScreener listing a lookup source walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Profiles,
    Boosts,
}

/// Latest profiles or boosts, each resolved to its deepest pair
pub struct TokenListingSource {
    client: Arc<DexScreenerClient>,
    listing: Listing,
    limit: usize,
    lookup_pause: Duration,
    tag: String,
}

impl TokenListingSource {
    pub fn new(
        client: Arc<DexScreenerClient>,
        listing: Listing,
        limit: usize,
        lookup_pause: Duration,
        tag: &str,
    ) -> Self {
        Self {
            client,
            listing,
            limit,
            lookup_pause,
            tag: tag.to_string(),
        }
    }

    async fn addresses(&self) -> Result<Vec<String>> {
        let addresses = match self.listing {
            Listing::Profiles => self
                .client
                .get_latest_profiles()
                .await?
                .into_iter()
                .map(|p| p.token_address)
                .collect::<Vec<_>>(),
            Listing::Boosts => self
                .client
                .get_latest_boosts()
                .await?
                .into_iter()
                .map(|b| b.token_address)
                .collect(),
        };
        let mut seen = HashSet::new();
        Ok(addresses
            .into_iter()
            .map(|a| a.trim().to_ascii_lowercase())
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .take(self.limit)
            .collect())
    }
}

#[async_trait]
impl SignalSource for TokenListingSource {
    fn kind(&self) -> &'static str {
        match self.listing {
            Listing::Profiles => "profiles",
            Listing::Boosts => "boosts",
        }
    }

    async fn fetch(&self, now_ms: i64) -> Result<Vec<TokenSignal>> {
        let addresses = self.addresses().await?;
        info!("Checking {} {} from DexScreener", addresses.len(), self.kind());

        let mut signals = Vec::new();
        for address in addresses {
            match self.client.get_token_pairs(&address).await {
                Ok(Some(pair)) => {
                    if let Ok(mut signal) = pair.to_signal(now_ms, &self.tag) {
                        if self.listing == Listing::Boosts {
                            signal.boosted = true;
                            signal.rescore(now_ms);
                        }
                        signals.push(signal);
                    }
                }
                Ok(None) => debug!(address = %address, "No pair on chain"),
                Err(e) => warn!(address = %address, "Token lookup failed: {}", e),
            }

            // Rate limiting
            tokio::time::sleep(self.lookup_pause).await;
        }
        Ok(signals)
    }
}

/// Outcome of one collection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new_records: usize,
    pub refreshed: usize,
    /// Rejection counts keyed by reason
    pub rejected: BTreeMap<&'static str, usize>,
    /// Source was unreachable this cycle
    pub source_failed: bool,
}

impl CycleReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched {}, new {}, refreshed {}, rejected {}",
            self.fetched,
            self.new_records,
            self.refreshed,
            self.rejected_total()
        )
    }
}

/// One configured collector bound to the shared store
pub struct Collector {
    settings: CollectorSettings,
    source: Box<dyn SignalSource>,
    filter: CollectorFilter,
    store: Arc<SignalStore>,
}

impl Collector {
    pub fn new(
        settings: CollectorSettings,
        source: Box<dyn SignalSource>,
        store: Arc<SignalStore>,
    ) -> Result<Self> {
        let filter = CollectorFilter::new(&settings)?;
        Ok(Self {
            settings,
            source,
            filter,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.settings.interval_secs)
    }

    /// Fetch, dedup, filter, upsert and persist
    pub async fn run_cycle(&self, now_ms: i64) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let raw = match self.source.fetch(now_ms).await {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => {
                warn!(collector = %self.name(), source = self.source.kind(), "Source unavailable: {}", e);
                report.source_failed = true;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let candidates = dedup_first_wins(raw);
        report.fetched = candidates.len();

        for mut signal in candidates {
            if let FilterResult::Filtered(reason) = self.filter.check(&signal, now_ms) {
                debug!(
                    collector = %self.name(),
                    address = %signal.address,
                    symbol = %signal.symbol,
                    "Rejected: {}",
                    reason
                );
                *report.rejected.entry(reason.kind()).or_default() += 1;
                continue;
            }

            signal.source = self.settings.name.clone();
            match self.store.upsert(signal, now_ms)? {
                UpsertOutcome::Inserted => report.new_records += 1,
                UpsertOutcome::Refreshed => report.refreshed += 1,
            }
        }

        if report.new_records + report.refreshed > 0 {
            self.store.save().await?;
        }

        info!(collector = %self.name(), "Cycle complete: {}", report);
        Ok(report)
    }
}

/// Build the source a collector's settings describe
pub fn build_source(
    settings: &CollectorSettings,
    config: &Config,
    client: Arc<DexScreenerClient>,
) -> Result<Box<dyn SignalSource>> {
    let pause = Duration::from_millis(config.dexscreener.request_pause_ms);
    let source: Box<dyn SignalSource> = match &settings.source {
        SourceSettings::Search { queries } => {
            Box::new(DexSearchSource::new(client, queries.clone(), &settings.name))
        }
        SourceSettings::Profiles { limit } => Box::new(TokenListingSource::new(
            client,
            Listing::Profiles,
            *limit,
            pause,
            &settings.name,
        )),
        SourceSettings::Boosts { limit } => Box::new(TokenListingSource::new(
            client,
            Listing::Boosts,
            *limit,
            pause,
            &settings.name,
        )),
        SourceSettings::ChainLogs {
            rpc_url,
            event_topic,
            factories,
            max_block_span,
            ignore_tokens,
        } => Box::new(ChainLogSource::new(
            rpc_url,
            client,
            event_topic,
            factories,
            *max_block_span,
            ignore_tokens,
            pause,
            &settings.name,
        )?),
    };
    Ok(source)
}

/// Build every enabled collector from config
pub fn build_collectors(config: &Config, store: Arc<SignalStore>) -> Result<Vec<Collector>> {
    let client = Arc::new(DexScreenerClient::new(&config.dexscreener, &config.chain.chain_id)?);
    config
        .collectors
        .iter()
        .filter(|c| c.enabled)
        .map(|settings| {
            let source = build_source(settings, config, client.clone())?;
            Collector::new(settings.clone(), source, store.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::signal::TxnCount;
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000_000;

    struct FixedSource {
        result: std::sync::Mutex<Option<Result<Vec<TokenSignal>>>>,
    }

    impl FixedSource {
        fn ok(signals: Vec<TokenSignal>) -> Box<Self> {
            Box::new(Self {
                result: std::sync::Mutex::new(Some(Ok(signals))),
            })
        }

        fn err(e: Error) -> Box<Self> {
            Box::new(Self {
                result: std::sync::Mutex::new(Some(Err(e))),
            })
        }
    }

    #[async_trait]
    impl SignalSource for FixedSource {
        fn kind(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, _now_ms: i64) -> Result<Vec<TokenSignal>> {
            self.result.lock().unwrap().take().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn candidate(address: &str, symbol: &str, liquidity: f64) -> TokenSignal {
        let mut s = TokenSignal::new(address, NOW).unwrap();
        s.symbol = symbol.to_string();
        s.pair_created_at = Some(NOW - 5 * 60_000);
        s.liquidity_usd = liquidity;
        s.volume5m = 200.0;
        s.txns5m = TxnCount::new(3, 1);
        s
    }

    fn store(dir: &TempDir) -> Arc<SignalStore> {
        SignalStore::shared(dir.path().join("signals.json"), 100)
    }

    #[tokio::test]
    async fn test_cycle_filters_dedups_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let source = FixedSource::ok(vec![
            candidate("0xaaa", "LCAT", 2_000.0),
            candidate("0xAAA", "LCAT", 9_000.0),
            candidate("0xbbb", "WETH", 50_000.0),
            candidate("0xccc", "THIN", 500.0),
        ]);
        let collector = Collector::new(CollectorSettings::cio_search(), source, store.clone()).unwrap();

        let report = collector.run_cycle(NOW).await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.new_records, 1);
        assert_eq!(report.refreshed, 0);
        assert_eq!(report.rejected.get("blocked_symbol"), Some(&1));
        assert_eq!(report.rejected.get("low_liquidity"), Some(&1));

        let stored = store.get("0xaaa").unwrap();
        assert_eq!(stored.liquidity_usd, 2_000.0);
        assert_eq!(stored.source, "cio_search");
        assert!(dir.path().join("signals.json").exists());
    }

    #[tokio::test]
    async fn test_second_sighting_refreshes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let settings = CollectorSettings::cio_search();

        let first = Collector::new(settings.clone(), FixedSource::ok(vec![candidate("0xaaa", "LCAT", 2_000.0)]), store.clone())
            .unwrap();
        first.run_cycle(NOW - 60_000).await.unwrap();

        let second = Collector::new(settings, FixedSource::ok(vec![candidate("0xaaa", "LCAT", 3_000.0)]), store.clone())
            .unwrap();
        let report = second.run_cycle(NOW).await.unwrap();
        assert_eq!(report.new_records, 0);
        assert_eq!(report.refreshed, 1);

        let stored = store.get("0xaaa").unwrap();
        assert_eq!(stored.liquidity_usd, 3_000.0);
        assert_eq!(stored.first_seen_at, NOW - 60_000);
    }

    #[tokio::test]
    async fn test_transient_failure_is_an_empty_cycle() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource::err(Error::Timeout("https://api.dexscreener.com".into()));
        let collector = Collector::new(CollectorSettings::cio_search(), source, store(&dir)).unwrap();

        let report = collector.run_cycle(NOW).await.unwrap();
        assert!(report.source_failed);
        assert_eq!(report.fetched, 0);
        assert!(!dir.path().join("signals.json").exists());
    }

    #[tokio::test]
    async fn test_local_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource::err(Error::Io("disk".into()));
        let collector = Collector::new(CollectorSettings::cio_search(), source, store(&dir)).unwrap();
        assert!(collector.run_cycle(NOW).await.is_err());
    }

    #[test]
    fn test_report_display() {
        let mut report = CycleReport {
            fetched: 5,
            new_records: 2,
            refreshed: 1,
            ..Default::default()
        };
        report.rejected.insert("too_old", 2);
        assert_eq!(report.to_string(), "fetched 5, new 2, refreshed 1, rejected 2");
    }

    #[test]
    fn test_build_collectors_from_defaults() {
        let config = Config::default();
        let dir = TempDir::new().unwrap();
        let collectors = build_collectors(&config, store(&dir)).unwrap();
        assert_eq!(collectors.len(), config.collectors.iter().filter(|c| c.enabled).count());
        assert!(collectors.iter().any(|c| c.name() == "cio_search"));
    }
}
