//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use errorpress_collector::StackExchangeCollector;
use errorpress_core::{
    BridgeGenerator, Collaborators, ItemOutcome, Pipeline, ProgressReporter, RunSummary, SlotStore,
};
use errorpress_discovery::sources_from_config;
use errorpress_publisher::WordPressPublisher;
use errorpress_shared::{AppConfig, Item, Publisher, init_config, load_config, load_config_from};
use errorpress_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// errorpress: turn trending error messages into troubleshooting articles.
#[derive(Parser)]
#[command(
    name = "errorpress",
    version,
    about = "Discover trending error messages and publish troubleshooting articles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.errorpress/errorpress.toml).
    #[arg(long, global = true, env = "ERRORPRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Resume pending items, then discover, sequence and process a new batch.
    Run,

    /// Show what a run would admit without writing anything.
    Discover {
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add an error by hand. Skips discovery and starts at collection.
    Inject {
        /// Error message text.
        error: String,
    },

    /// List sequenced items.
    List {
        /// Show recent runs instead of items.
        #[arg(long)]
        runs: bool,

        /// Number of runs to show with --runs.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. `RUST_LOG` wins when set.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "errorpress=info",
        1 => "errorpress=debug",
        _ => "errorpress=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // logs go to stderr so stdout stays clean for --json output
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run => cmd_run(&load(config_path.as_ref())?).await,
        Command::Discover { json } => cmd_discover(&load(config_path.as_ref())?, json).await,
        Command::Inject { error } => cmd_inject(&load(config_path.as_ref())?, &error).await,
        Command::List { runs, limit } => {
            let config = load(config_path.as_ref())?;
            if runs {
                cmd_list_runs(&config, limit).await
            } else {
                cmd_list(&config).await
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path.as_ref()),
            ConfigAction::Show => cmd_config_show(&load(config_path.as_ref())?),
        },
    }
}

fn load(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<(Storage, SlotStore)> {
    let storage = Storage::open(&config.storage.db_path()?).await?;
    let slots = SlotStore::new(config.storage.slots_path()?);
    Ok((storage, slots))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig) -> Result<()> {
    let (storage, slots) = open_storage(config).await?;
    let sources = sources_from_config(config)?;
    if sources.is_empty() {
        warn!("no signal sources enabled, only pending items will be processed");
    }

    let collector = StackExchangeCollector::from_config(config)?;
    let generator = BridgeGenerator::from_config(config);
    let publisher = publisher_for(config)?;
    let pipeline = Pipeline::new(
        config,
        &storage,
        slots,
        Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: publisher.as_ref().map(|p| p as &dyn Publisher),
        },
    );

    let reporter = CliProgress::new();
    let summary = pipeline.run(&sources, &reporter).await?;
    print_summary(&summary);
    Ok(())
}

async fn cmd_discover(config: &AppConfig, json: bool) -> Result<()> {
    let sources = sources_from_config(config)?;

    // a missing database just means nothing is indexed yet
    let db_path = config.storage.db_path()?;
    let storage = if db_path.exists() {
        Some(Storage::open_readonly(&db_path).await?)
    } else {
        None
    };

    let plan = errorpress_core::discover(config, &sources, storage.as_ref()).await?;

    if json {
        let admitted: Vec<_> = plan
            .admitted
            .iter()
            .map(|c| {
                serde_json::json!({
                    "text": c.raw_text,
                    "fingerprint": c.fingerprint,
                    "source": c.source,
                    "confidence": c.confidence_score,
                    "signals": c.source_signals,
                    "url": c.source_url,
                })
            })
            .collect();
        let excluded: Vec<_> = plan
            .excluded
            .iter()
            .map(|e| serde_json::json!({"text": e.candidate.raw_text, "reason": e.reason}))
            .collect();
        let out = serde_json::json!({
            "discovered": plan.discovered,
            "admitted": admitted,
            "duplicates": plan.duplicates.len(),
            "excluded": excluded,
            "dropped": plan.dropped.len(),
            "failed_sources": plan.failed_sources,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} discovered, {} duplicate, {} excluded, {} admitted",
        plan.discovered,
        plan.duplicates.len(),
        plan.excluded.len(),
        plan.admitted.len()
    );
    if !plan.failed_sources.is_empty() {
        let names: Vec<_> = plan.failed_sources.iter().map(|s| s.as_str()).collect();
        println!("  Failed sources: {}", names.join(", "));
    }
    println!();
    for candidate in &plan.admitted {
        println!(
            "  {:.3}  {:<14} {}",
            candidate.confidence_score,
            candidate.source.as_str(),
            candidate.raw_text
        );
    }
    if !plan.excluded.is_empty() {
        println!();
        println!("  Excluded:");
        for exclusion in &plan.excluded {
            println!("    {}  ({})", exclusion.candidate.raw_text, exclusion.reason);
        }
    }
    println!();
    Ok(())
}

async fn cmd_inject(config: &AppConfig, error: &str) -> Result<()> {
    let (storage, slots) = open_storage(config).await?;
    let collector = StackExchangeCollector::from_config(config)?;
    let generator = BridgeGenerator::from_config(config);
    let publisher = publisher_for(config)?;
    let pipeline = Pipeline::new(
        config,
        &storage,
        slots,
        Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: publisher.as_ref().map(|p| p as &dyn Publisher),
        },
    );

    info!(error, "injecting error");
    let reporter = CliProgress::new();
    let (item, outcome) = pipeline.inject(error, &reporter).await?;

    println!();
    println!("  Item #{:04} {}", item.sequence_id, item.slug);
    println!("  State:   {}", item.state);
    println!("  Outcome: {}", describe(&outcome));
    if let Some(quality) = &item.quality {
        println!(
            "  Quality: {} words, SEO {:.0}",
            quality.word_count, quality.seo_score
        );
    }
    println!();
    Ok(())
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let db_path = config.storage.db_path()?;
    if !db_path.exists() {
        println!("No items yet. Run `errorpress run` or `errorpress inject <error>`.");
        return Ok(());
    }
    let storage = Storage::open_readonly(&db_path).await?;
    let items = storage.list_items().await?;
    if items.is_empty() {
        println!("No items yet.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<16} {:<40} {:<14} PUBLISHED",
        "SEQ", "STATE", "SLUG", "SOURCE"
    );
    for row in items {
        println!(
            "{:>6}  {:<16} {:<40} {:<14} {}",
            format!("{:04}", row.sequence_id),
            row.state.as_str(),
            truncate(&row.slug, 40),
            row.source,
            row.publish_ref.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_list_runs(config: &AppConfig, limit: u32) -> Result<()> {
    let db_path = config.storage.db_path()?;
    if !db_path.exists() {
        println!("No runs yet.");
        return Ok(());
    }
    let storage = Storage::open_readonly(&db_path).await?;
    for run in storage.recent_runs(limit).await? {
        let status = if run.finished_at.is_some() {
            "finished"
        } else {
            "incomplete"
        };
        println!("{}  {:<7} {:<10} {}", run.started_at, run.kind, status, run.id);
        if let Some(stats) = run.stats_json.as_deref() {
            println!("    {stats}");
        }
    }
    Ok(())
}

fn cmd_config_init(path: Option<&PathBuf>) -> Result<()> {
    let written = init_config(path.map(PathBuf::as_path))?;
    println!("Config initialized at: {}", written.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn publisher_for(config: &AppConfig) -> Result<Option<WordPressPublisher>> {
    if !config.publish.enabled {
        info!("publishing disabled, gated items stay in quality_checked");
        return Ok(None);
    }
    Ok(Some(WordPressPublisher::from_config(config)?))
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Run complete");
    if let Some(id) = &summary.run_id {
        println!("  Run:        {id}");
    }
    println!("  Resumed:    {}", summary.resumed);
    println!(
        "  Discovered: {} ({} duplicate, {} excluded, {} dropped)",
        summary.discovered, summary.duplicates, summary.excluded, summary.dropped_records
    );
    println!("  Sequenced:  {}", summary.sequenced);
    println!("  Published:  {}", summary.published);
    println!("  Awaiting:   {}", summary.awaiting_publish);
    println!("  Rejected:   {}", summary.rejected);
    println!("  Deferred:   {}", summary.deferred);
    if summary.failed > 0 {
        println!("  Failed:     {}", summary.failed);
    }
    if !summary.failed_sources.is_empty() {
        let names: Vec<_> = summary.failed_sources.iter().map(|s| s.as_str()).collect();
        println!("  Sources down: {}", names.join(", "));
    }
    println!(
        "  Time:       {:.1}s",
        summary.elapsed_ms as f64 / 1000.0
    );
    println!();
}

fn describe(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Published(r) => format!("published ({r})"),
        ItemOutcome::AwaitingPublish => "awaiting publish".into(),
        ItemOutcome::Rejected(reason) => format!("rejected: {reason}"),
        ItemOutcome::Deferred(reason) => format!("deferred: {reason}"),
        ItemOutcome::Failed(reason) => format!("failed: {reason}"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner that shows the current phase and the last finished item.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_finished(&self, item: &Item, outcome: &ItemOutcome, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "[{current}/{total}] #{:04} {} {}",
            item.sequence_id,
            truncate(&item.slug, 40),
            describe(outcome)
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "errorpress",
            "inject",
            "ENOSPC: no space left on device",
            "--config",
            "/tmp/ep.toml",
            "-vv",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ep.toml")));
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Inject { ref error } if error.starts_with("ENOSPC")));
    }

    #[test]
    fn list_runs_flag() {
        let cli = Cli::try_parse_from(["errorpress", "list", "--runs", "--limit", "3"]).expect("parse");
        assert!(matches!(cli.command, Command::List { runs: true, limit: 3 }));
    }

    #[test]
    fn inject_requires_error_text() {
        assert!(Cli::try_parse_from(["errorpress", "inject"]).is_err());
    }

    #[test]
    fn truncates_long_slugs() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
