//! Pool-creation logs from an EVM JSON-RPC node
//!
//! Scans a few blocks per poll for factory events, pulls the two token
//! addresses out of the indexed topics and resolves each on DexScreener.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::SignalSource;
use crate::dexscreener::DexScreenerClient;
use crate::error::{Error, Result};
use crate::signal::TokenSignal;

const RPC_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

/// Event log as returned by `eth_getLogs`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

impl LogEntry {
    /// Token addresses from indexed topics 1 and 2
    pub fn token_addresses(&self) -> Vec<String> {
        self.topics
            .iter()
            .skip(1)
            .take(2)
            .filter_map(|t| topic_to_address(t))
            .collect()
    }
}

/// Last 20 bytes of a 32-byte topic as a lowercased address
pub fn topic_to_address(topic: &str) -> Option<String> {
    let hex = topic.strip_prefix("0x").unwrap_or(topic);
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex[24..].to_ascii_lowercase()))
}

pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(hex, 16).map_err(|e| Error::Rpc(format!("bad hex quantity {}: {}", value, e)))
}

/// Minimal JSON-RPC client
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Rpc(format!("Failed to build RPC client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                url: method.to_string(),
            });
        }
        let parsed: RpcResponse<T> = resp.json().await?;
        decode_response(parsed, method)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&hex)
    }

    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        topic0: &str,
        addresses: &[String],
    ) -> Result<Vec<LogEntry>> {
        let mut filter = json!({
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "topics": [topic0],
        });
        if !addresses.is_empty() {
            filter["address"] = json!(addresses);
        }
        self.call("eth_getLogs", json!([filter])).await
    }
}

fn decode_response<T>(resp: RpcResponse<T>, method: &str) -> Result<T> {
    if let Some(err) = resp.error {
        return Err(Error::RpcResponse {
            code: err.code,
            message: err.message,
        });
    }
    resp.result
        .ok_or_else(|| Error::Rpc(format!("{} returned no result", method)))
}

/// Block window for the next poll, `None` when caught up
pub fn next_window(last_scanned: Option<u64>, head: u64, span: u64) -> Option<(u64, u64)> {
    let from = match last_scanned {
        Some(last) => last + 1,
        None => head.saturating_sub(span),
    };
    if from > head {
        return None;
    }
    Some((from, head.min(from + span.saturating_sub(1))))
}

/// Collector source backed by factory logs
pub struct ChainLogSource {
    rpc: RpcClient,
    dexscreener: Arc<DexScreenerClient>,
    event_topic: String,
    factories: Vec<String>,
    max_block_span: u64,
    ignore_tokens: HashSet<String>,
    lookup_pause: Duration,
    last_scanned: Mutex<Option<u64>>,
    tag: String,
}

impl ChainLogSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc_url: &str,
        dexscreener: Arc<DexScreenerClient>,
        event_topic: &str,
        factories: &[String],
        max_block_span: u64,
        ignore_tokens: &[String],
        lookup_pause: Duration,
        tag: &str,
    ) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::new(rpc_url)?,
            dexscreener,
            event_topic: event_topic.to_ascii_lowercase(),
            factories: factories.iter().map(|f| f.to_ascii_lowercase()).collect(),
            max_block_span: max_block_span.max(1),
            ignore_tokens: ignore_tokens.iter().map(|t| t.to_ascii_lowercase()).collect(),
            lookup_pause,
            last_scanned: Mutex::new(None),
            tag: tag.to_string(),
        })
    }

    /// New token addresses in `logs`, minus quote tokens
    pub fn extract_tokens(&self, logs: &[LogEntry]) -> Vec<String> {
        let mut seen = HashSet::new();
        logs.iter()
            .flat_map(LogEntry::token_addresses)
            .filter(|addr| !self.ignore_tokens.contains(addr))
            .filter(|addr| seen.insert(addr.clone()))
            .collect()
    }
}

#[async_trait]
impl SignalSource for ChainLogSource {
    fn kind(&self) -> &'static str {
        "chain_logs"
    }

    async fn fetch(&self, now_ms: i64) -> Result<Vec<TokenSignal>> {
        let head = self.rpc.block_number().await?;

        let mut last = self.last_scanned.lock().await;
        let Some((from, to)) = next_window(*last, head, self.max_block_span) else {
            debug!("No new blocks since {}", head);
            return Ok(Vec::new());
        };

        let logs = self
            .rpc
            .get_logs(from, to, &self.event_topic, &self.factories)
            .await?;
        *last = Some(to);
        drop(last);

        let tokens = self.extract_tokens(&logs);
        if !tokens.is_empty() {
            info!(
                from_block = from,
                to_block = to,
                "Found {} new tokens in {} logs",
                tokens.len(),
                logs.len()
            );
        }

        let mut signals = Vec::new();
        for address in tokens {
            match self.dexscreener.get_token_pairs(&address).await {
                Ok(Some(pair)) => match pair.to_signal(now_ms, &self.tag) {
                    Ok(signal) => signals.push(signal),
                    Err(e) => debug!("Skipping pair for {}: {}", address, e),
                },
                // Not indexed yet, the next sighting will pick it up
                Ok(None) => debug!(address = %address, "No pair yet"),
                Err(e) => warn!(address = %address, "Token lookup failed: {}", e),
            }
            tokio::time::sleep(self.lookup_pause).await;
        }
        Ok(signals)
    }
}
