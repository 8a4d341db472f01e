use std::time::Duration;

use anyhow::{bail, Context, Result};
use bscout_core::{AthleteKey, CategoryDescriptor};
use bscout_session::{cancel_channel, AcquisitionSession, HttpTransport};
use bscout_storage::{HttpClientConfig, HttpFetcher, SnapshotStore};
use bscout_sync::{
    merge_all, opponent_path, reparse_all, ConsolidatedStore, EventCatalog, RunSummary,
    ScoutConfig, StepOutcome,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bscout")]
#[command(about = "Bracket Scout command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a human-gated acquisition session for one event.
    Acquire {
        #[arg(long)]
        event: String,
        /// Restrict to specific category ids (repeatable).
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Refetch categories that already have a fresh snapshot.
        #[arg(long)]
        force: bool,
    },
    /// Re-extract retained snapshots and merge the results.
    ReparseAll {
        #[arg(long)]
        event: Option<String>,
        /// Every retained snapshot, not just the newest per category.
        #[arg(long)]
        force: bool,
    },
    /// Merge the newest snapshot of every category into the store.
    MergeAll,
    /// Show the opponents an athlete faced through one category.
    Path {
        #[arg(long)]
        event: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        athlete: String,
        /// Needed only when the name alone is ambiguous.
        #[arg(long)]
        country: Option<String>,
    },
    /// List catalog events with their snapshot counts.
    ListEvents,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bscout=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ScoutConfig::from_env();

    match cli.command {
        Commands::Acquire {
            event,
            categories,
            force,
        } => run_acquire(&config, &event, &categories, force).await,
        Commands::ReparseAll { event, force } => {
            run_reparse(&config, event.as_deref(), force).await
        }
        Commands::MergeAll => run_reparse(&config, None, false).await,
        Commands::Path {
            event,
            category,
            athlete,
            country,
        } => run_path(&config, &event, &category, &athlete, country).await,
        Commands::ListEvents => run_list_events(&config).await,
    }
}

async fn run_acquire(
    config: &ScoutConfig,
    event: &str,
    categories: &[String],
    force: bool,
) -> Result<()> {
    let catalog = EventCatalog::load(&config.catalog_path).await?;
    let entry = catalog
        .find(event)
        .with_context(|| format!("event {event} not in {}", config.catalog_path.display()))?;
    let known = entry.category_descriptors();

    let targets: Vec<CategoryDescriptor> = if categories.is_empty() {
        known
    } else {
        categories
            .iter()
            .map(|id| {
                known
                    .iter()
                    .find(|d| d.category_id == *id)
                    .cloned()
                    .unwrap_or_else(|| CategoryDescriptor::bare(event, id.clone()))
            })
            .collect()
    };
    if targets.is_empty() {
        println!("no catalogued categories for event {event}; discovering from the draw listing");
    }

    let fetcher = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        ..Default::default()
    })?;
    let transport = HttpTransport::new(fetcher, config.base_url.clone());
    let store = SnapshotStore::new(config.snapshots_dir());

    let (cancel_tx, cancel_rx) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let mut session = AcquisitionSession::new(transport, store).with_cancel(cancel_rx);
    println!("opening event {event}; solve the verification page in a browser if one appears");
    let report = session
        .acquire(event, &targets, &config.session_options(force))
        .await?;

    for category in &report.succeeded {
        println!("fetched  {:<8} {}", category.category_id, category.label);
    }
    for category in &report.skipped {
        println!("fresh    {:<8} {}", category.category_id, category.label);
    }
    for (category, reason) in &report.failed {
        println!(
            "FAILED   {:<8} {}: {reason}",
            category.category_id, category.label
        );
    }
    println!(
        "acquire complete: {} fetched, {} fresh, {} failed",
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}

async fn run_reparse(config: &ScoutConfig, event: Option<&str>, force: bool) -> Result<()> {
    let snapshots = SnapshotStore::new(config.snapshots_dir());
    let outcome = reparse_all(&snapshots, event, force).await?;
    let (_store, summary) =
        merge_all(&config.store_path(), outcome.brackets, outcome.failures).await?;
    print_run_summary(&summary);
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    for report in &summary.merged {
        println!(
            "merged   {}/{}: +{} ~{} ={} ambiguous {}",
            report.event_id,
            report.category_id,
            report.inserted,
            report.replaced,
            report.unchanged,
            report.ambiguous
        );
    }
    for failure in &summary.failed {
        println!(
            "FAILED   {}/{}: {}",
            failure.event_id, failure.category_id, failure.detail
        );
    }
    println!(
        "store {} now holds {} matches across {} athletes",
        summary.store_path, summary.stored_matches, summary.indexed_athletes
    );
}

async fn run_path(
    config: &ScoutConfig,
    event: &str,
    category: &str,
    athlete: &str,
    country: Option<String>,
) -> Result<()> {
    let store = ConsolidatedStore::load(&config.store_path()).await?;
    let country = match country {
        Some(code) => code,
        None => resolve_country(&store, event, category, athlete)?,
    };
    let key = AthleteKey::new(athlete, country);
    let steps = opponent_path(&store, event, category, &key)?;

    if let Some(meta) = store.category_meta(event, category) {
        println!("{} — {}", meta.event_name, meta.category_label);
    }
    for step in &steps {
        match &step.opponent {
            Some(opponent) => println!(
                "{:<16} vs {} ({}) — {}",
                step.round_label,
                opponent.athlete_name,
                opponent.country_code,
                outcome_word(step.outcome)
            ),
            None => println!("{:<16} bye", step.round_label),
        }
    }
    Ok(())
}

fn outcome_word(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Won => "won",
        StepOutcome::Lost => "lost",
        StepOutcome::Bye => "bye",
        StepOutcome::Unresolved => "unresolved",
    }
}

/// Infer the country code when the name alone is unambiguous in the category.
fn resolve_country(
    store: &ConsolidatedStore,
    event: &str,
    category: &str,
    name: &str,
) -> Result<String> {
    let mut countries: Vec<String> = Vec::new();
    for stored in store.category_matches(event, category) {
        for corner in [&stored.record.red, &stored.record.blue]
            .into_iter()
            .flatten()
        {
            if corner.athlete_name.eq_ignore_ascii_case(name)
                && !countries.contains(&corner.country_code)
            {
                countries.push(corner.country_code.clone());
            }
        }
    }
    match countries.as_slice() {
        [] => bail!("athlete {name:?} not found in {event}/{category}"),
        [only] => Ok(only.clone()),
        many => bail!(
            "athlete {name:?} appears under {}; pass --country",
            many.join(", ")
        ),
    }
}

async fn run_list_events(config: &ScoutConfig) -> Result<()> {
    let catalog = EventCatalog::load(&config.catalog_path).await?;
    let snapshots = SnapshotStore::new(config.snapshots_dir());

    for entry in &catalog.events {
        let with_snapshots = snapshots.category_ids(&entry.event_id).await?.len();
        println!(
            "{:<8} {:<44} {} categories with snapshots",
            entry.event_id, entry.name, with_snapshots
        );
    }
    for event_id in snapshots.event_ids().await? {
        if catalog.find(&event_id).is_none() {
            let with_snapshots = snapshots.category_ids(&event_id).await?.len();
            println!("{event_id:<8} {:<44} {with_snapshots} categories with snapshots", "(not in catalog)");
        }
    }
    Ok(())
}
