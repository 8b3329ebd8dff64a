// DexScreener API client for new pair discovery
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::DexScreenerConfig;
use crate::error::{Error, Result};
use crate::signal::{normalize_address, TxnCount, TokenSignal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProfile {
    pub url: Option<String>,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    pub icon: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBoost {
    pub url: Option<String>,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    #[serde(rename = "totalAmount")]
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Txns {
    pub m5: Option<TxnCount>,
    pub h1: Option<TxnCount>,
    pub h6: Option<TxnCount>,
    pub h24: Option<TxnCount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId", default)]
    pub dex_id: String,
    pub url: Option<String>,
    #[serde(rename = "pairAddress", default)]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: Option<BaseToken>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub txns: Option<Txns>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "fdv")]
    pub fdv: Option<f64>,
    /// Unix ms
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

impl DexPair {
    pub fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    pub fn is_on_chain(&self, chain_id: &str) -> bool {
        self.chain_id.eq_ignore_ascii_case(chain_id)
    }

    /// Normalize into a signal observed at `now_ms`, tagged with `source`
    pub fn to_signal(&self, now_ms: i64, source: &str) -> Result<TokenSignal> {
        let mut signal = TokenSignal::new(&self.base_token.address, now_ms)?;

        let price_change = self.price_change.clone().unwrap_or_default();
        let volume = self.volume.clone().unwrap_or_default();
        let txns = self.txns.clone().unwrap_or_default();

        signal.pair_address = self.pair_address.to_ascii_lowercase();
        signal.dex_id = self.dex_id.clone();
        signal.chain = self.chain_id.to_ascii_lowercase();
        signal.symbol = self
            .base_token
            .symbol
            .clone()
            .unwrap_or_else(|| "???".to_string());
        signal.name = self
            .base_token
            .name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());
        signal.quote_symbol = self
            .quote_token
            .as_ref()
            .and_then(|q| q.symbol.clone())
            .unwrap_or_default();
        signal.pair_url = self.url.clone();

        signal.price_usd = self
            .price_usd
            .as_ref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0);
        signal.liquidity_usd = self.liquidity_usd();
        signal.market_cap = self.market_cap.or(self.fdv).unwrap_or(0.0);
        signal.volume5m = volume.m5.unwrap_or(0.0);
        signal.volume1h = volume.h1.unwrap_or(0.0);
        signal.volume24h = volume.h24.unwrap_or(0.0);

        signal.price_change5m = price_change.m5.unwrap_or(0.0);
        signal.price_change1h = price_change.h1.unwrap_or(0.0);
        signal.price_change24h = price_change.h24.unwrap_or(0.0);

        signal.txns5m = txns.m5.unwrap_or_default();
        signal.txns1h = txns.h1.unwrap_or_default();
        signal.txns6h = txns.h6.unwrap_or_default();
        signal.txns24h = txns.h24.unwrap_or_default();

        signal.pair_created_at = self.pair_created_at.filter(|ts| *ts > 0);
        signal.source = source.to_string();
        signal.rescore(now_ms);
        Ok(signal)
    }
}

/// Pick the deepest pair on `chain_id`
pub fn best_pair(pairs: Vec<DexPair>, chain_id: &str) -> Option<DexPair> {
    pairs
        .into_iter()
        .filter(|p| p.is_on_chain(chain_id))
        .max_by(|a, b| {
            a.liquidity_usd()
                .partial_cmp(&b.liquidity_usd())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: String,
}

impl DexScreenerClient {
    pub fn new(config: &DexScreenerConfig, chain_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("lurker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain_id: chain_id.to_string(),
        })
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn request(&self, path: &str, query: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let builder = self.client.get(format!("{}{}", self.base_url, path));
        if query.is_empty() {
            builder
        } else {
            builder.query(query)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let request = self.request(path, query).build()?;
        let url = request.url().to_string();
        debug!("GET {}", url);
        let resp = self.client.execute(request).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                url,
            });
        }
        Ok(resp.json().await?)
    }

    /// Search pairs by free-text query, restricted to our chain
    pub async fn search_pairs(&self, query: &str) -> Result<Vec<DexPair>> {
        let data: TokenPairsResponse = self
            .get_json("/latest/dex/search", &[("q", query.trim())])
            .await?;
        Ok(data
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.is_on_chain(&self.chain_id))
            .collect())
    }

    /// Fetch the deepest pair for a token address
    pub async fn get_token_pairs(&self, address: &str) -> Result<Option<DexPair>> {
        let address = normalize_address(address)?;
        let data: TokenPairsResponse = self
            .get_json(&format!("/latest/dex/tokens/{}", address), &[])
            .await?;
        Ok(best_pair(data.pairs.unwrap_or_default(), &self.chain_id))
    }

    /// Fetch latest token profiles on our chain
    pub async fn get_latest_profiles(&self) -> Result<Vec<TokenProfile>> {
        let profiles: Vec<TokenProfile> = self.get_json("/token-profiles/latest/v1", &[]).await?;
        Ok(profiles
            .into_iter()
            .filter(|p| p.chain_id.eq_ignore_ascii_case(&self.chain_id))
            .collect())
    }

    /// Fetch latest boosted tokens on our chain
    pub async fn get_latest_boosts(&self) -> Result<Vec<TokenBoost>> {
        let boosts: Vec<TokenBoost> = self.get_json("/token-boosts/latest/v1", &[]).await?;
        Ok(boosts
            .into_iter()
            .filter(|b| b.chain_id.eq_ignore_ascii_case(&self.chain_id))
            .collect())
    }
}
