//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// Re-export tier rules so callers configure the classifier from one place
pub use crate::classifier::rules::{TierRule, TierRules};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub dexscreener: DexScreenerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_collectors")]
    pub collectors: Vec<CollectorSettings>,
    #[serde(default)]
    pub tiers: TierRules,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// DexScreener chain id (e.g. "base")
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexScreenerConfig {
    #[serde(default = "default_dexscreener_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between consecutive lookups (ms), jitter is added on top
    #[serde(default = "default_request_pause_ms")]
    pub request_pause_ms: u64,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: default_dexscreener_url(),
            timeout_secs: default_http_timeout_secs(),
            request_pause_ms: default_request_pause_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of every JSON file the website polls
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Store capacity; oldest records are evicted past this
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Records not refreshed for this long are pruned
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Legacy collector outputs merged into the store at startup
    #[serde(default)]
    pub legacy_imports: Vec<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_records: default_max_records(),
            retention_hours: default_retention_hours(),
            legacy_imports: Vec::new(),
        }
    }
}

impl StorageConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("signals.json")
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.data_dir.join("signals")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("signal_history.json")
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.data_dir.join("alerts.json")
    }
}

/// Where a collector pulls candidates from
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSettings {
    /// DEX pair search over a list of query terms
    Search {
        #[serde(default = "default_search_queries")]
        queries: Vec<String>,
    },
    /// Latest token profiles, each resolved to its best pair
    Profiles {
        #[serde(default = "default_lookup_limit")]
        limit: usize,
    },
    /// Latest boosted tokens, each resolved to its best pair
    Boosts {
        #[serde(default = "default_lookup_limit")]
        limit: usize,
    },
    /// Pool-creation logs from a JSON-RPC node
    ChainLogs {
        rpc_url: String,
        #[serde(default = "default_pool_created_topic")]
        event_topic: String,
        #[serde(default)]
        factories: Vec<String>,
        #[serde(default = "default_max_block_span")]
        max_block_span: u64,
        #[serde(default = "default_ignore_tokens")]
        ignore_tokens: Vec<String>,
    },
}

/// One configurable collector (endpoint + thresholds + output tag)
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    /// Tag written into every record this collector produces
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub source: SourceSettings,
    #[serde(default = "default_collector_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub min_liquidity_usd: f64,
    #[serde(default)]
    pub max_age_minutes: Option<f64>,
    #[serde(default)]
    pub min_volume_5m: f64,
    #[serde(default)]
    pub min_txns_5m: u32,
    #[serde(default)]
    pub max_market_cap: Option<f64>,
    /// Regexes matched against name and symbol
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    #[serde(default = "default_blocked_symbols")]
    pub blocked_symbols: Vec<String>,
    #[serde(default)]
    pub blocked_addresses: Vec<String>,
}

impl CollectorSettings {
    /// Ultra-launch CIO collector: fresh pairs from the search rake
    pub fn cio_search() -> Self {
        Self {
            name: "cio_search".to_string(),
            enabled: true,
            source: SourceSettings::Search {
                queries: default_search_queries(),
            },
            interval_secs: 30,
            min_liquidity_usd: 1_000.0,
            max_age_minutes: Some(60.0),
            min_volume_5m: 50.0,
            min_txns_5m: 2,
            max_market_cap: None,
            blocked_patterns: Vec::new(),
            blocked_symbols: default_blocked_symbols(),
            blocked_addresses: Vec::new(),
        }
    }

    /// Profile-driven collector with a wider age window
    pub fn profiles() -> Self {
        Self {
            name: "profiles".to_string(),
            enabled: true,
            source: SourceSettings::Profiles {
                limit: default_lookup_limit(),
            },
            interval_secs: 60,
            min_liquidity_usd: 5_000.0,
            max_age_minutes: Some(48.0 * 60.0),
            min_volume_5m: 0.0,
            min_txns_5m: 0,
            max_market_cap: Some(50_000_000.0),
            blocked_patterns: Vec::new(),
            blocked_symbols: default_blocked_symbols(),
            blocked_addresses: Vec::new(),
        }
    }

    /// Boosted tokens, flagged so the ingest score credits them
    pub fn boosts() -> Self {
        Self {
            name: "boosts".to_string(),
            source: SourceSettings::Boosts {
                limit: default_lookup_limit(),
            },
            interval_secs: 60,
            ..Self::profiles()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_classifier_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentSettings {
    #[serde(default = "default_enrichment_interval_secs")]
    pub interval_secs: u64,
    /// Max history entries kept per symbol
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: i64,
    /// ALPHA gate: minimum confidence
    #[serde(default = "default_alpha_min_confidence")]
    pub alpha_min_confidence: u8,
    /// ALPHA gate: minimum liquidity in USD
    #[serde(default = "default_alpha_min_liquidity")]
    pub alpha_min_liquidity_usd: f64,
    /// ALPHA gate: records later than this are PULSE
    #[serde(default = "default_alpha_max_early_late")]
    pub alpha_max_early_late_score: u8,
    /// Public embargo for ALPHA records (minutes)
    #[serde(default = "default_alpha_delay_minutes")]
    pub alpha_delay_minutes: i64,
    /// Public embargo for PULSE records (minutes)
    #[serde(default = "default_pulse_delay_minutes")]
    pub pulse_delay_minutes: i64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_enrichment_interval_secs(),
            history_len: default_history_len(),
            history_retention_days: default_history_retention_days(),
            alpha_min_confidence: default_alpha_min_confidence(),
            alpha_min_liquidity_usd: default_alpha_min_liquidity(),
            alpha_max_early_late_score: default_alpha_max_early_late(),
            alpha_delay_minutes: default_alpha_delay_minutes(),
            pulse_delay_minutes: default_pulse_delay_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_notifier_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_bot_token")]
    pub bot_token: String,
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
    #[serde(default = "default_telegram_timeout_secs")]
    pub timeout_secs: u64,
    /// Records below this liquidity never alert
    #[serde(default = "default_notify_min_liquidity")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_max_per_cycle")]
    pub max_per_cycle: usize,
    /// Entries kept in the website's alerts file
    #[serde(default = "default_alerts_cap")]
    pub alerts_cap: usize,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_notifier_interval_secs(),
            api_base: default_telegram_api(),
            bot_token: default_bot_token(),
            chat_id: default_chat_id(),
            timeout_secs: default_telegram_timeout_secs(),
            min_liquidity_usd: default_notify_min_liquidity(),
            max_per_cycle: default_max_per_cycle(),
            alerts_cap: default_alerts_cap(),
        }
    }
}

impl NotifierSettings {
    pub fn has_credentials(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Consecutive empty CIO feeds tolerated before failing
    #[serde(default = "default_max_empty_streak")]
    pub max_empty_streak: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_empty_streak: default_max_empty_streak(),
        }
    }
}

// Default value functions
fn default_chain_id() -> String {
    "base".to_string()
}

fn default_dexscreener_url() -> String {
    std::env::var("DEXSCREENER_API_URL").unwrap_or_else(|_| "https://api.dexscreener.com".into())
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_request_pause_ms() -> u64 {
    200
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_records() -> usize {
    500
}

fn default_retention_hours() -> u64 {
    72
}

fn default_collectors() -> Vec<CollectorSettings> {
    vec![
        CollectorSettings::cio_search(),
        CollectorSettings::profiles(),
        CollectorSettings::boosts(),
    ]
}

fn default_search_queries() -> Vec<String> {
    vec!["WETH".into(), "USDC".into(), "ETH".into()]
}

fn default_lookup_limit() -> usize {
    30
}

/// keccak256("PairCreated(address,address,address,uint256)")
fn default_pool_created_topic() -> String {
    "0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9".into()
}

fn default_max_block_span() -> u64 {
    3
}

fn default_ignore_tokens() -> Vec<String> {
    vec![
        "0x4200000000000000000000000000000000000006".into(), // WETH
        "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913".into(), // USDC
        "0x50c5725949a6f0c72e6c4a641f24049a917db0cb".into(), // DAI
        "0x2ae3f1ec7f1f5012cfeab0185bfc7aa3cf0dec22".into(), // cbETH
        "0xd9aaec86b65d86f6a7b5b1b0c42ffa531710b6ca".into(), // USDbC
    ]
}

fn default_blocked_symbols() -> Vec<String> {
    [
        "AERO", "AERODROME", "CBBTC", "SOL", "WETH", "ETH", "USDC", "USDT", "DAI", "VIRTUAL",
        "BRETT", "DEGEN", "CLANKER", "BASE", "USDBC", "WSTETH", "CBETH", "WEETH", "WBTC",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_collector_interval_secs() -> u64 {
    30
}

fn default_classifier_interval_secs() -> u64 {
    30
}

fn default_enrichment_interval_secs() -> u64 {
    60
}

fn default_history_len() -> usize {
    100
}

fn default_history_retention_days() -> i64 {
    30
}

fn default_alpha_min_confidence() -> u8 {
    65
}

fn default_alpha_min_liquidity() -> f64 {
    300_000.0
}

fn default_alpha_max_early_late() -> u8 {
    75
}

fn default_alpha_delay_minutes() -> i64 {
    15
}

fn default_pulse_delay_minutes() -> i64 {
    5
}

fn default_notifier_interval_secs() -> u64 {
    60
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".into()
}

fn default_bot_token() -> String {
    std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
}

fn default_chat_id() -> String {
    std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default()
}

fn default_telegram_timeout_secs() -> u64 {
    20
}

fn default_notify_min_liquidity() -> f64 {
    2_000.0
}

fn default_max_per_cycle() -> usize {
    10
}

fn default_alerts_cap() -> usize {
    50
}

fn default_max_empty_streak() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("chain.chain_id", default_chain_id())?
            .set_default("dexscreener.base_url", default_dexscreener_url())?
            .set_default("dexscreener.timeout_secs", default_http_timeout_secs() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix LURKER_)
            .add_source(
                config::Environment::with_prefix("LURKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id.trim().is_empty() {
            anyhow::bail!("chain.chain_id must not be empty");
        }

        if self.storage.max_records == 0 {
            anyhow::bail!("storage.max_records must be positive");
        }

        self.tiers
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid tier rules: {}", e))?;

        let mut names = std::collections::HashSet::new();
        for collector in &self.collectors {
            if !names.insert(collector.name.as_str()) {
                anyhow::bail!("Duplicate collector name: {}", collector.name);
            }
            if collector.interval_secs == 0 {
                anyhow::bail!("Collector {} interval_secs must be positive", collector.name);
            }
            // Compile regex to check
            for pattern in &collector.blocked_patterns {
                regex::Regex::new(pattern).with_context(|| {
                    format!("Invalid blocked_pattern regex in {}: {}", collector.name, pattern)
                })?;
            }
            if let SourceSettings::ChainLogs { rpc_url, max_block_span, .. } = &collector.source {
                if rpc_url.trim().is_empty() {
                    anyhow::bail!("Collector {} needs an rpc_url", collector.name);
                }
                if *max_block_span == 0 {
                    anyhow::bail!("Collector {} max_block_span must be positive", collector.name);
                }
            }
        }

        for (name, secs) in [
            ("classifier", self.classifier.interval_secs),
            ("enrichment", self.enrichment.interval_secs),
            ("notifier", self.notifier.interval_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{}.interval_secs must be positive", name);
            }
        }

        if self.enrichment.alpha_min_confidence > 100 || self.enrichment.alpha_max_early_late_score > 100 {
            anyhow::bail!("enrichment scores are on a 0-100 scale");
        }

        if self.notifier.max_per_cycle == 0 {
            anyhow::bail!("notifier.max_per_cycle must be positive");
        }

        if self.notifier.enabled && !self.notifier.has_credentials() {
            tracing::warn!(
                "Notifier enabled without TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID - alerts will only be logged"
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let collectors = self
            .collectors
            .iter()
            .map(|c| {
                format!(
                    "    {} [{}]: every {}s, min_liq ${}, max_age {:?}m, source {}",
                    c.name,
                    if c.enabled { "on" } else { "off" },
                    c.interval_secs,
                    c.min_liquidity_usd,
                    c.max_age_minutes,
                    source_label(&c.source),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Configuration:
  Chain: {}
  DexScreener:
    base_url: {}
    timeout: {}s
  Storage:
    data_dir: {}
    max_records: {}
    retention: {}h
  Collectors:
{}
  Tiers:
{}
  Enrichment:
    interval: {}s
    alpha: confidence >= {}, liquidity >= ${}, early/late <= {}
  Notifier:
    enabled: {}
    bot_token: {}
    chat_id: {}
    min_liquidity: ${}
"#,
            self.chain.chain_id,
            mask_url(&self.dexscreener.base_url),
            self.dexscreener.timeout_secs,
            self.storage.data_dir.display(),
            self.storage.max_records,
            self.storage.retention_hours,
            collectors,
            self.tiers.describe(),
            self.enrichment.interval_secs,
            self.enrichment.alpha_min_confidence,
            self.enrichment.alpha_min_liquidity_usd,
            self.enrichment.alpha_max_early_late_score,
            self.notifier.enabled,
            if self.notifier.bot_token.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            if self.notifier.chat_id.is_empty() {
                "(not set)"
            } else {
                self.notifier.chat_id.as_str()
            },
            self.notifier.min_liquidity_usd,
        )
    }
}

fn source_label(source: &SourceSettings) -> String {
    match source {
        SourceSettings::Search { queries } => format!("search({})", queries.join(",")),
        SourceSettings::Profiles { limit } => format!("profiles(limit {})", limit),
        SourceSettings::Boosts { limit } => format!("boosts(limit {})", limit),
        SourceSettings::ChainLogs { rpc_url, .. } => format!("chain_logs({})", mask_url(rpc_url)),
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            dexscreener: DexScreenerConfig::default(),
            storage: StorageConfig::default(),
            collectors: default_collectors(),
            tiers: TierRules::default(),
            classifier: ClassifierConfig::default(),
            enrichment: EnrichmentSettings::default(),
            notifier: NotifierSettings::default(),
            health: HealthConfig::default(),
        }
    }
}
