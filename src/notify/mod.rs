//! Alert notifier
//!
//! Pushes new CIO/HOTLIST entries and badge upgrades to a message sink,
//! remembers what was posted per address and keeps the website's alert log.

pub mod telegram;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::classifier::ClassifiedSignal;
use crate::config::{Config, NotifierSettings};
use crate::error::Result;
use crate::store::{read_json_lenient, write_json_atomic};

pub use telegram::TelegramSink;

/// Delivery seam for formatted alerts
#[async_trait]
pub trait MessageSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, text: &str) -> Result<()>;
}

/// Alert quality badge, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Badge {
    Watch,
    Good,
    Premium,
}

impl Badge {
    pub fn evaluate(score: u8, liquidity_usd: f64, volume1h: f64) -> Self {
        let pumping = volume1h > 100_000.0;
        if score >= 80 && (liquidity_usd > 40_000.0 || pumping) {
            Badge::Premium
        } else if score >= 60 || liquidity_usd > 30_000.0 || volume1h > 50_000.0 {
            Badge::Good
        } else {
            Badge::Watch
        }
    }

    pub fn for_signal(item: &ClassifiedSignal) -> Self {
        let s = &item.signal;
        Self::evaluate(s.score, s.liquidity_usd, s.volume1h)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Watch => "WATCH",
            Badge::Good => "GOOD",
            Badge::Premium => "PREMIUM",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Badge::Watch => "👁️",
            Badge::Good => "✅",
            Badge::Premium => "🔥",
        }
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifiedEntry {
    pub badge: Badge,
    pub symbol: String,
    pub notified_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgraded_at: Option<String>,
}

/// Posted addresses and their last badge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyState {
    #[serde(default)]
    pub notified: BTreeMap<String, NotifiedEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    New,
    Upgrade,
}

/// One decided alert, before delivery
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAlert {
    pub item: ClassifiedSignal,
    pub badge: Badge,
    pub kind: AlertKind,
    /// Badge at the previous notification, for upgrades
    pub previous: Option<Badge>,
}

/// Entry of the website's alert log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub tier: String,
    pub badge: Badge,
    pub kind: AlertKind,
    pub liquidity_usd: f64,
    pub score: u8,
    pub url: String,
    pub sent_at: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyReport {
    pub candidates: usize,
    pub planned: usize,
    pub sent: usize,
    pub failed: usize,
    pub dry_run: bool,
}

pub fn dexscreener_link(chain: &str, address: &str) -> String {
    let chain = if chain.is_empty() { "base" } else { chain };
    format!("https://dexscreener.com/{}/{}", chain, address)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML body for a new-token alert
pub fn format_alert(item: &ClassifiedSignal, badge: Badge, chain: &str) -> String {
    let s = &item.signal;
    format!(
        "<b>{} {}</b> · {}\n\n<b>${}</b> — {}\n\n📊 Score: {}/100\n{} Risk: {}\n💧 Liquidity: ${:.1}k\n📈 Volume 1h: ${:.1}k\n🔥 Volume 5m: ${:.1}k\n⏱️ Age: {:.0} minutes\n\n<a href=\"{}\">View on DexScreener →</a>\n\n👁️ LURKER — Early Detection",
        badge.emoji(),
        badge,
        item.tier,
        escape_html(&s.symbol),
        escape_html(&s.name),
        s.score,
        s.risk_level.emoji(),
        s.risk_level.as_str().to_uppercase(),
        s.liquidity_usd / 1_000.0,
        s.volume1h / 1_000.0,
        s.volume5m / 1_000.0,
        item.age_minutes,
        dexscreener_link(chain, &s.address),
    )
}

/// HTML body for a badge upgrade
pub fn format_upgrade(item: &ClassifiedSignal, from: Badge, to: Badge, chain: &str) -> String {
    let s = &item.signal;
    format!(
        "<b>{} UPGRADE: {} → {}</b>\n\n<b>${}</b>\n\n💧 Liquidity: ${:.1}k\n\nToken upgraded to {}!\n\n<a href=\"{}\">View on DexScreener →</a>\n\n👁️ LURKER",
        to.emoji(),
        from,
        to,
        escape_html(&s.symbol),
        s.liquidity_usd / 1_000.0,
        to,
        dexscreener_link(chain, &s.address),
    )
}

/// Decide which items alert this cycle
///
/// New addresses alert; known addresses alert only when their badge rose.
/// Items below the liquidity floor never alert.
pub fn plan_alerts(
    items: &[ClassifiedSignal],
    state: &NotifyState,
    settings: &NotifierSettings,
) -> Vec<PendingAlert> {
    let mut seen = HashSet::new();
    let mut pending = Vec::new();

    for item in items {
        if pending.len() >= settings.max_per_cycle {
            break;
        }
        let address = &item.signal.address;
        if !seen.insert(address.clone()) {
            continue;
        }
        if item.signal.liquidity_usd < settings.min_liquidity_usd {
            debug!(address = %address, "Below alert liquidity floor");
            continue;
        }

        let badge = Badge::for_signal(item);
        match state.notified.get(address) {
            None => pending.push(PendingAlert {
                item: item.clone(),
                badge,
                kind: AlertKind::New,
                previous: None,
            }),
            Some(entry) if badge > entry.badge => pending.push(PendingAlert {
                item: item.clone(),
                badge,
                kind: AlertKind::Upgrade,
                previous: Some(entry.badge),
            }),
            Some(_) => {}
        }
    }
    pending
}

pub struct Notifier {
    settings: NotifierSettings,
    chain_id: String,
    state_path: PathBuf,
    alerts_path: PathBuf,
    sink: Option<Box<dyn MessageSink>>,
}

impl Notifier {
    pub fn new(
        settings: NotifierSettings,
        chain_id: &str,
        state_path: PathBuf,
        alerts_path: PathBuf,
        sink: Option<Box<dyn MessageSink>>,
    ) -> Self {
        Self {
            settings,
            chain_id: chain_id.to_string(),
            state_path,
            alerts_path,
            sink,
        }
    }

    /// Build from config; without credentials or with `dry_run` nothing is sent
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        let sink: Option<Box<dyn MessageSink>> = if dry_run {
            None
        } else if !config.notifier.has_credentials() {
            warn!("Telegram credentials missing, notifier runs in dry-run mode");
            None
        } else {
            Some(Box::new(TelegramSink::new(&config.notifier)?))
        };
        Ok(Self::new(
            config.notifier.clone(),
            &config.chain.chain_id,
            config.storage.state_dir().join("notified.json"),
            config.storage.alerts_path(),
            sink,
        ))
    }

    pub fn is_dry_run(&self) -> bool {
        self.sink.is_none()
    }

    pub async fn load_state(&self) -> NotifyState {
        read_json_lenient(&self.state_path).await.unwrap_or_default()
    }

    /// Plan, deliver and record alerts for `items`
    pub async fn run_pass(&self, items: &[ClassifiedSignal]) -> Result<NotifyReport> {
        let mut state = self.load_state().await;
        let pending = plan_alerts(items, &state, &self.settings);
        let mut report = NotifyReport {
            candidates: items.len(),
            planned: pending.len(),
            dry_run: self.is_dry_run(),
            ..Default::default()
        };

        let mut sent_records = Vec::new();
        for alert in pending {
            let message = match alert.previous {
                Some(from) => format_upgrade(&alert.item, from, alert.badge, &self.chain_id),
                None => format_alert(&alert.item, alert.badge, &self.chain_id),
            };

            let Some(sink) = &self.sink else {
                info!(
                    address = %alert.item.signal.address,
                    badge = %alert.badge,
                    "[dry-run] would send:\n{}",
                    message
                );
                continue;
            };

            if let Err(e) = sink.send(&message).await {
                // not recorded, so the next cycle retries it
                warn!(
                    address = %alert.item.signal.address,
                    sink = sink.name(),
                    "Alert delivery failed: {}",
                    e
                );
                report.failed += 1;
                continue;
            }

            report.sent += 1;
            let now = Utc::now().to_rfc3339();
            let s = &alert.item.signal;
            match state.notified.get_mut(&s.address) {
                Some(entry) => {
                    entry.badge = alert.badge;
                    entry.upgraded_at = Some(now.clone());
                }
                None => {
                    state.notified.insert(
                        s.address.clone(),
                        NotifiedEntry {
                            badge: alert.badge,
                            symbol: s.symbol.clone(),
                            notified_at: now.clone(),
                            upgraded_at: None,
                        },
                    );
                }
            }
            sent_records.push(AlertRecord {
                address: s.address.clone(),
                symbol: s.symbol.clone(),
                name: s.name.clone(),
                tier: alert.item.tier.to_string(),
                badge: alert.badge,
                kind: alert.kind,
                liquidity_usd: s.liquidity_usd,
                score: s.score,
                url: dexscreener_link(&self.chain_id, &s.address),
                sent_at: now,
            });
        }

        if !sent_records.is_empty() {
            write_json_atomic(&self.state_path, &state).await?;
            self.append_alerts(sent_records).await?;
        }

        info!(
            candidates = report.candidates,
            planned = report.planned,
            sent = report.sent,
            failed = report.failed,
            dry_run = report.dry_run,
            "Notifier pass complete"
        );
        Ok(report)
    }

    async fn append_alerts(&self, mut records: Vec<AlertRecord>) -> Result<()> {
        let existing: Vec<AlertRecord> = read_json_lenient(&self.alerts_path).await.unwrap_or_default();
        // newest first
        records.reverse();
        records.extend(existing);
        records.truncate(self.settings.alerts_cap);
        write_json_atomic(&self.alerts_path, &records).await
    }
}
