//! CLI command implementations

use anyhow::{Context, Result};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{feeds, Classifier, Feeds, Tier};
use crate::collector::{build_collectors, Collector};
use crate::config::Config;
use crate::enrich::Enricher;
use crate::health::HealthCheck;
use crate::notify::Notifier;
use crate::signal::now_ms;
use crate::store::SignalStore;

const MS_PER_HOUR: i64 = 3_600_000;

/// Load the store, importing legacy feeds when configured
async fn open_store(config: &Config, import_legacy: bool) -> Result<Arc<SignalStore>> {
    let store = SignalStore::shared(config.storage.store_path(), config.storage.max_records);
    store
        .load()
        .await
        .context("Failed to load signal store")?;

    if import_legacy && !config.storage.legacy_imports.is_empty() {
        let now = now_ms();
        let mut imported = 0;
        for path in &config.storage.legacy_imports {
            imported += store.import_file(path, now).await;
        }
        if imported > 0 {
            store.save().await?;
        }
    }
    info!("Store ready: {} records", store.len());
    Ok(store)
}

/// Prune expired records, classify the rest and write the tier feeds
async fn classify_pass(config: &Config, store: &SignalStore, classifier: &Classifier) -> crate::Result<Feeds> {
    let now = now_ms();
    let retention_ms = config.storage.retention_hours as i64 * MS_PER_HOUR;
    if store.prune_older_than(retention_ms, now) > 0 {
        store.save().await?;
    }

    let feeds = classifier.classify(store.snapshot(), now);
    feeds::write_feeds(&config.storage.signals_dir(), &feeds).await?;
    Ok(feeds)
}

/// Notify over the CIO and HOTLIST feeds on disk
async fn notify_pass(config: &Config, notifier: &Notifier) -> crate::Result<()> {
    let dir = config.storage.signals_dir();
    let mut items = Vec::new();
    for tier in [Tier::Cio, Tier::Hotlist] {
        match feeds::read_feed(&dir, tier).await {
            Some(feed) => items.extend(feed),
            None => debug!(tier = %tier, "Feed not available yet"),
        }
    }
    notifier.run_pass(&items).await?;
    Ok(())
}

/// Run `tick` every `period` until cancelled; failures are logged, not fatal
async fn every<F, Fut>(name: String, period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = tick().await {
                    error!(task = %name, "Cycle failed: {}", e);
                }
            }
        }
    }
    debug!(task = %name, "Loop stopped");
}

/// Start the long-running service
pub async fn run(config: &Config) -> Result<()> {
    info!("Starting LURKER on chain {}...", config.chain.chain_id);

    let config = Arc::new(config.clone());
    let store = open_store(&config, true).await?;
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let collectors: Vec<Arc<Collector>> = build_collectors(&config, store.clone())?
        .into_iter()
        .map(Arc::new)
        .collect();
    if collectors.is_empty() {
        warn!("No collectors enabled - feeds will only reflect stored records");
    }
    for collector in collectors {
        info!("Collector {} every {:?}", collector.name(), collector.interval());
        let name = format!("collector:{}", collector.name());
        let period = collector.interval();
        tasks.push(tokio::spawn(every(name, period, cancel.clone(), move || {
            let collector = collector.clone();
            async move { collector.run_cycle(now_ms()).await.map(|_| ()) }
        })));
    }

    let classifier = Arc::new(Classifier::new(config.tiers.clone()));
    {
        let (config, store) = (config.clone(), store.clone());
        tasks.push(tokio::spawn(every(
            "classifier".to_string(),
            Duration::from_secs(config.classifier.interval_secs),
            cancel.clone(),
            move || {
                let (config, store, classifier) = (config.clone(), store.clone(), classifier.clone());
                async move { classify_pass(&config, &store, &classifier).await.map(|_| ()) }
            },
        )));
    }

    let enricher = Arc::new(Mutex::new(Enricher::load(&config).await));
    {
        let store = store.clone();
        tasks.push(tokio::spawn(every(
            "enrichment".to_string(),
            Duration::from_secs(config.enrichment.interval_secs),
            cancel.clone(),
            move || {
                let (enricher, store) = (enricher.clone(), store.clone());
                async move {
                    let snapshot = store.snapshot();
                    enricher.lock().await.run_pass(&snapshot, now_ms()).await.map(|_| ())
                }
            },
        )));
    }

    if config.notifier.enabled {
        let notifier = Arc::new(Notifier::from_config(&config, false)?);
        let config = config.clone();
        tasks.push(tokio::spawn(every(
            "notifier".to_string(),
            Duration::from_secs(config.notifier.interval_secs),
            cancel.clone(),
            move || {
                let (config, notifier) = (config.clone(), notifier.clone());
                async move { notify_pass(&config, &notifier).await }
            },
        )));
    } else {
        info!("Notifier disabled");
    }

    info!("LURKER running with {} tasks. Press Ctrl+C to stop.", tasks.len());

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
        }
    }

    cancel.cancel();
    for res in join_all(tasks).await {
        if let Err(e) = res {
            error!("Task ended abnormally: {}", e);
        }
    }

    store.save().await.context("Failed to save store on shutdown")?;
    info!("Store saved ({} records), bye", store.len());
    Ok(())
}

/// Run one collection cycle
pub async fn collect(config: &Config, name: Option<&str>) -> Result<()> {
    let store = open_store(config, false).await?;
    let collectors = build_collectors(config, store.clone())?;

    let selected: Vec<_> = collectors
        .iter()
        .filter(|c| name.map_or(true, |n| c.name() == n))
        .collect();
    if selected.is_empty() {
        anyhow::bail!("No enabled collector named {}", name.unwrap_or("(any)"));
    }

    println!("\n=== COLLECTION CYCLE ===\n");
    for collector in selected {
        let report = collector.run_cycle(now_ms()).await?;
        println!("{}: {}", collector.name(), report);
        for (reason, count) in &report.rejected {
            println!("    rejected {}: {}", reason, count);
        }
        if report.source_failed {
            println!("    (source unavailable this cycle)");
        }
    }
    println!("\nStore: {} records", store.len());
    Ok(())
}

/// Run one classification pass
pub async fn classify(config: &Config) -> Result<()> {
    let store = open_store(config, false).await?;
    let classifier = Classifier::new(config.tiers.clone());
    let feeds = classify_pass(config, &store, &classifier).await?;

    println!("\n=== TIER FEEDS ===\n");
    for tier in Tier::ALL {
        println!("{:<15} {}", tier.as_str(), feeds.get(tier).len());
    }
    println!("{:<15} {}", "unclassified", feeds.unclassified);
    Ok(())
}

/// Run one enrichment and gating pass
pub async fn enrich(config: &Config) -> Result<()> {
    let store = open_store(config, false).await?;
    let mut enricher = Enricher::load(config).await;
    let enriched = enricher.run_pass(&store.snapshot(), now_ms()).await?;

    println!("\n=== ENRICHMENT ===\n");
    for item in enriched.iter().take(20) {
        println!(
            "{:<10} {:?} | {}% | {:?} | {:?} | {}",
            item.signal.symbol,
            item.trend,
            item.confidence,
            item.suggested_action,
            item.access_tier,
            item.insight
        );
    }
    println!("\n{} records enriched", enriched.len());
    Ok(())
}

/// Run one notification pass
pub async fn notify(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - alerts are only logged");
    }
    let notifier = Notifier::from_config(config, dry_run)?;
    notify_pass(config, &notifier).await?;
    Ok(())
}

/// Check CIO feed health
pub async fn health(config: &Config, manual: bool) -> Result<()> {
    println!("\n=== FEED HEALTH CHECK ===\n");
    println!(
        "Mode: {}",
        if manual { "MANUAL (strict)" } else { "SCHEDULE (streak-based)" }
    );

    let check = HealthCheck::new(
        &config.storage.signals_dir(),
        &config.storage.state_dir(),
        config.health.max_empty_streak,
    );
    let report = check.run(manual).await?;

    if let Some(updated_at) = &report.updated_at {
        println!("Feed timestamp: {}", updated_at);
    }
    println!("Candidate count: {}", report.count);
    println!("Empty streak: {}", report.streak);

    match &report.failure {
        None => {
            println!("\nFeed healthy");
            Ok(())
        }
        Some(failure) => {
            println!("\nFAIL: {}", failure);
            anyhow::bail!("Health check failed: {}", failure)
        }
    }
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
