//! CLI command implementations.
//!
//! Each `run_*` function builds what it needs from [`Config`], runs one
//! orchestrator operation, and prints a short report to stdout. Diagnostics
//! go through `tracing` to stderr.

use anyhow::{bail, Result};
use std::sync::Arc;

use convo_sync_core::models::DataType;

use crate::config::Config;
use crate::embedding::{create_provider, DisabledProvider};
use crate::error::SyncError;
use crate::generation::{create_generator, to_plain_text};
use crate::lifecycle::ResetOutcome;
use crate::metadata::SyncMetadata;
use crate::orchestrator::{ReadyIndex, Readiness, SyncOrchestrator, SyncReport};
use crate::sources::create_source;

fn orchestrator(config: &Config, data_type: DataType) -> Result<SyncOrchestrator> {
    let embedder = create_provider(&config.embedding)?;
    let source = create_source(&config.source)?;
    Ok(SyncOrchestrator::from_config(config, data_type, embedder, source))
}

/// `ensure_ready`, translating the outcomes a user has to act on.
///
/// Returns `None` when there was nothing to index.
async fn ready(orch: &SyncOrchestrator) -> Result<Option<ReadyIndex>> {
    match orch.ensure_ready().await {
        Ok(ready) => {
            for w in &ready.warnings {
                println!("  warning: {}", w);
            }
            Ok(Some(ready))
        }
        Err(SyncError::NoData) => {
            println!(
                "No messages found for {}; index not created.",
                orch.data_type()
            );
            Ok(None)
        }
        Err(SyncError::ManualIntervention(guide)) => {
            println!("{}", guide);
            bail!("index at {} requires manual deletion", guide.path.display())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_ensure(config: &Config, data_type: DataType) -> Result<()> {
    let orch = orchestrator(config, data_type)?;
    let Some(ready) = ready(&orch).await? else {
        return Ok(());
    };

    let label = match ready.readiness {
        Readiness::Bootstrapped => "created",
        Readiness::Loaded => "loaded",
        Readiness::Rebuilt => "rebuilt",
    };
    println!("ensure {}", data_type);
    println!("  index: {} ({})", orch.lifecycle().index_dir().display(), label);
    print_metadata(&ready.metadata);

    ready.store.close().await;
    Ok(())
}

pub async fn run_sync(config: &Config, data_type: DataType, dry_run: bool) -> Result<()> {
    let orch = orchestrator(config, data_type)?;

    if dry_run {
        println!("sync {} (dry-run)", data_type);
        if !orch.lifecycle().exists() {
            let records = orch.fetch().await?;
            println!("  index: absent");
            println!("  would bootstrap: {} messages", records.len());
            return Ok(());
        }
        let store = orch.lifecycle().open_existing().await?;
        let pending = orch.pending(store.as_ref()).await;
        store.close().await;
        println!("  new messages: {}", pending?.len());
        return Ok(());
    }

    let Some(ready) = ready(&orch).await? else {
        return Ok(());
    };

    // A fresh bootstrap already holds everything the source has.
    let result = if ready.readiness == Readiness::Loaded {
        orch.sync(ready.store.as_ref()).await
    } else {
        Ok(SyncReport {
            new_records: 0,
            message_count: ready.metadata.message_count,
            warnings: Vec::new(),
        })
    };
    ready.store.close().await;
    let report = result?;

    println!("sync {}", data_type);
    if report.is_noop() {
        println!("  no new messages");
    } else {
        println!("  new messages: {}", report.new_records);
    }
    println!("  message count: {}", report.message_count);
    for w in &report.warnings {
        println!("  warning: {}", w);
    }
    Ok(())
}

pub async fn run_reset(config: &Config, data_type: DataType) -> Result<()> {
    // Reset never embeds; skip provider credential checks.
    let source = create_source(&config.source)?;
    let orch = SyncOrchestrator::from_config(config, data_type, Arc::new(DisabledProvider), source);

    println!("reset {}", data_type);
    match orch.reset(None).await {
        ResetOutcome::AlreadyAbsent => println!("  nothing to delete"),
        ResetOutcome::Deleted { attempts } => {
            println!("  deleted {} (attempts: {})", orch.lifecycle().index_dir().display(), attempts)
        }
        ResetOutcome::ForceDeleted => {
            println!("  deleted {} (forced)", orch.lifecycle().index_dir().display())
        }
        ResetOutcome::NeedsManualIntervention(guide) => {
            println!("{}", guide);
            bail!("index at {} requires manual deletion", guide.path.display());
        }
    }
    Ok(())
}

pub async fn run_status(config: &Config, data_type: DataType) -> Result<()> {
    let source = create_source(&config.source)?;
    let orch = SyncOrchestrator::from_config(config, data_type, Arc::new(DisabledProvider), source);
    let status = orch.status().await;

    println!("status {}", status.data_type);
    println!("  index:         {}", orch.lifecycle().index_dir().display());
    println!("  exists:        {}", status.exists);
    if let Some(name) = &status.partner_nickname {
        println!("  partner:       {}", name);
    }
    print_metadata(&status.metadata);
    match status.indexed {
        Some(n) => println!("  indexed:       {}", n),
        None if status.exists => println!("  indexed:       unreadable"),
        None => {}
    }
    Ok(())
}

pub async fn run_query(config: &Config, data_type: DataType, text: &str, k: usize) -> Result<()> {
    let orch = orchestrator(config, data_type)?;
    let Some(ready) = ready(&orch).await? else {
        return Ok(());
    };
    let hits = orch.query(ready.store.as_ref(), text, k).await;
    ready.store.close().await;
    let hits = hits?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        let r = &hit.record;
        println!("{}. [{:.3}] {} {} [{}]", i + 1, hit.score, r.date, r.time, r.speaker);
        println!("    {}", r.text.trim());
    }
    Ok(())
}

pub async fn run_context(config: &Config, n: usize) -> Result<()> {
    let source = create_source(&config.source)?;
    let orch = SyncOrchestrator::from_config(
        config,
        DataType::FullConversation,
        Arc::new(DisabledProvider),
        source,
    );
    let ctx = orch.recent(n).await?;

    println!("--- Recent ({}) ---", ctx.recent.len());
    for r in &ctx.recent {
        println!("{} {} [{}] {}", r.date, r.time, r.speaker, r.text.trim());
    }
    println!();
    if let Some(p) = &ctx.latest_partner {
        println!("latest partner: {} {} {}", p.date, p.time, p.text.trim());
    }
    if let Some(s) = &ctx.latest_self {
        println!("latest self:    {} {} {}", s.date, s.time, s.text.trim());
    }
    Ok(())
}

pub async fn run_reply(config: &Config, data_type: DataType, n: usize) -> Result<()> {
    let generator = create_generator(&config.generation)?;
    let orch = orchestrator(config, data_type)?;
    let Some(ready) = ready(&orch).await? else {
        return Ok(());
    };
    let draft = orch
        .draft_reply(
            ready.store.as_ref(),
            generator.as_ref(),
            n,
            config.generation.context_k,
        )
        .await;
    ready.store.close().await;

    println!("{}", draft?);
    Ok(())
}

pub async fn run_analyze(config: &Config, data_type: DataType, k: usize) -> Result<()> {
    let generator = create_generator(&config.generation)?;
    let orch = orchestrator(config, data_type)?;
    let Some(ready) = ready(&orch).await? else {
        return Ok(());
    };
    let analysis = orch
        .analyze(ready.store.as_ref(), generator.as_ref(), k)
        .await;
    ready.store.close().await;

    println!("{}", analysis?);
    Ok(())
}

/// Wishlist from the full conversation, as plain text unless `markdown`.
pub async fn run_wishlist(config: &Config, k: usize, markdown: bool) -> Result<()> {
    let generator = create_generator(&config.generation)?;
    let orch = orchestrator(config, DataType::FullConversation)?;
    let Some(ready) = ready(&orch).await? else {
        return Ok(());
    };
    let wishlist = orch
        .wishlist(ready.store.as_ref(), generator.as_ref(), k)
        .await;
    ready.store.close().await;
    let wishlist = wishlist?;

    if markdown {
        println!("{}", wishlist);
    } else {
        println!("{}", to_plain_text(&wishlist));
    }
    Ok(())
}

fn print_metadata(meta: &SyncMetadata) {
    println!("  message count: {}", meta.message_count);
    match meta.last_update {
        Some(ts) => println!("  last update:   {}", format_ts_relative(ts.timestamp())),
        None => println!("  last update:   never"),
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
