//! Synheart Tier Digest CLI
//!
//! Hosts the tier scheduler as a foreground daemon and offers a few
//! commands to inspect and control it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synheart_tier_digest::{
    analysis::HttpAnalysisClient,
    collector::DirectoryEvidenceSource,
    config::Config,
    core::Tier,
    gate::ConfigGate,
    registry::ClassificationRegistry,
    scheduler::{SchedulerOptions, TierScheduler},
    store::{FileRecordStore, FileTaxonomyStore},
    transparency::SchedulerStatus,
    VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synheart-digest")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Tiered activity summaries from captured evidence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tier loops in the foreground
    Start {
        /// Tiers to run (base, mid, top, or all)
        #[arg(long, default_value = "all")]
        tiers: String,

        /// Serve /health and /status on this port (requires server feature)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single tier once and exit
    RunOnce {
        /// Tier to run (base, mid or top)
        tier: String,
    },

    /// Pause processing
    Pause,

    /// Resume processing
    Resume,

    /// Show scheduler status
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config from {:?}: {e}", Config::config_path());
            std::process::exit(1);
        }
    };
    init_tracing(&config.log_filter);

    let result = match cli.command {
        Commands::Start { tiers, port } => run_async(cmd_start(config, &tiers, port)),
        Commands::RunOnce { tier } => run_async(cmd_run_once(config, &tier)),
        Commands::Pause => cmd_pause(config),
        Commands::Resume => cmd_resume(config),
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Config => {
            cmd_config(&config);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_async<F>(fut: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;
    runtime.block_on(fut)
}

/// Wire the scheduler to the file-backed collaborators named in the config.
fn build_scheduler(config: &Config) -> anyhow::Result<TierScheduler> {
    config.validate()?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let records = Arc::new(FileRecordStore::new(config.records_path()));
    let taxonomy = Arc::new(FileTaxonomyStore::new(config.taxonomy_path()));
    let registry = Arc::new(ClassificationRegistry::new(
        taxonomy,
        records.clone(),
        config.registry.proposed_recency_days,
        config.tiers.base_minutes,
    ));
    let evidence = Arc::new(DirectoryEvidenceSource::new(
        &config.evidence.capture_dir,
        &config.evidence.extensions,
    ));
    let analysis = Arc::new(HttpAnalysisClient::new(&config.analysis)?);

    Ok(TierScheduler::builder(
        SchedulerOptions::from_config(config),
        evidence,
        records,
        analysis,
    )
    .registry(registry)
    .gate(Arc::new(ConfigGate::new(Config::config_path(), config)))
    .build())
}

async fn cmd_start(mut config: Config, tiers: &str, port: Option<u16>) -> anyhow::Result<()> {
    println!("Synheart Tier Digest v{VERSION}");
    println!();

    config.tiers.enabled_from_csv(tiers);
    if !config.tiers.any_enabled() {
        anyhow::bail!("At least one tier must be enabled (base, mid, top or all)");
    }

    let scheduler = build_scheduler(&config)?;

    println!("Configuration:");
    for tier in Tier::ALL {
        println!(
            "  {:<4} every {:>3}m: {}",
            tier.as_str(),
            config.tiers.windows().minutes(tier),
            if config.tiers.is_enabled(tier) {
                "enabled"
            } else {
                "disabled"
            }
        );
    }
    println!("  Captures: {:?}", config.evidence.capture_dir);
    println!("  Records: {:?}", config.records_path());
    println!("  Analysis endpoint: {}", config.analysis.endpoint);
    if config.paused {
        println!();
        println!("Processing is currently paused.");
        println!("Run `synheart-digest resume` to start producing summaries.");
    }
    println!();

    #[cfg(feature = "server")]
    let server_shutdown = match port {
        Some(port) => {
            let server_config = synheart_tier_digest::server::ServerConfig::new(port);
            let (addr, shutdown) =
                synheart_tier_digest::server::run(server_config, scheduler.clone()).await?;
            println!("  Status server: http://{addr}/status");
            Some(shutdown)
        }
        None => None,
    };
    #[cfg(not(feature = "server"))]
    if port.is_some() {
        eprintln!("Warning: --port ignored (server feature not enabled at compile time)");
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    scheduler.start();
    println!("Press Ctrl+C to stop");

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    println!("Stopping, waiting for in-flight runs to finish...");
    scheduler.stop().await;

    #[cfg(feature = "server")]
    if let Some(shutdown) = server_shutdown {
        let _ = shutdown.send(());
    }

    // Final stats
    println!();
    println!("{}", scheduler.log().summary());
    Ok(())
}

async fn cmd_run_once(config: Config, tier_name: &str) -> anyhow::Result<()> {
    let tier = Tier::from_name(tier_name)
        .with_context(|| format!("Unknown tier '{tier_name}' (expected base, mid or top)"))?;

    let scheduler = build_scheduler(&config)?;
    let outcome = scheduler.trigger(tier).await?;
    println!("{tier}: {outcome:?}");
    Ok(())
}

fn cmd_pause(mut config: Config) -> anyhow::Result<()> {
    config.paused = true;
    config.save().context("Error saving config")?;
    println!("Processing paused. Use 'synheart-digest resume' to continue.");
    Ok(())
}

fn cmd_resume(mut config: Config) -> anyhow::Result<()> {
    config.paused = false;
    config.save().context("Error saving config")?;
    println!("Processing resumed.");
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Synheart Tier Digest Status");
    println!("===========================");
    println!();
    println!("  Paused: {}", config.paused);
    if let Some(hours) = &config.active_hours {
        println!(
            "  Active hours: {:02}:00-{:02}:00 ({})",
            hours.start_hour, hours.end_hour, hours.timezone
        );
    }
    println!();

    match SchedulerStatus::load(&config.status_path()) {
        Ok(status) => print!("{}", status.summary()),
        Err(_) => println!("No previous session data found."),
    }
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
