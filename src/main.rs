use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repomirror::config::LoggingConfig;
use repomirror::filter::should_skip;
use repomirror::health::CheckResult;
use repomirror::{
    BatchRunner, BatchSummary, Config, GitLabListing, HealthCheck, Plan, RepoListing, StateDb,
};

#[derive(Parser)]
#[command(name = "repomirror")]
#[command(about = "Keep bare mirrors of every repository on your GitLab accounts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Directory that will hold the mirrors
        #[arg(short, long, default_value = "${HOME}/mirrors")]
        destination: String,
    },

    /// Mirror or update every repository of every source
    Sync {
        /// Show what would happen without touching any mirror
        #[arg(long)]
        dry_run: bool,

        /// Only sync the source with this domain or user@domain
        #[arg(long)]
        source: Option<String>,
    },

    /// List remote repositories per source
    List {
        /// Only list the source with this domain or user@domain
        #[arg(long)]
        source: Option<String>,
    },

    /// Show the mirror manifest
    Status {
        /// Only show mirrors whose last sync failed
        #[arg(long)]
        failed: bool,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // init must work before any config exists
    if let Commands::Init { destination } = &cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose);
        return cmd_init(destination, cli.config.as_deref());
    }

    let mut config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging, cli.verbose);
    info!("Starting repomirror v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Sync { dry_run, source } => {
            config.resolve_tokens()?;
            cmd_sync(dry_run, source, &config).await
        }
        Commands::List { source } => {
            config.resolve_tokens()?;
            cmd_list(source, &config).await
        }
        Commands::Status { failed } => cmd_status(failed, &config),
        Commands::Doctor => cmd_doctor(&config),
    }
}

/// Initialize logging; RUST_LOG wins over the configured level
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let layer = fmt::layer().with_ansi(logging.color);
    let registry = tracing_subscriber::registry().with(filter);

    // try_init: a second subscriber is not worth failing the command for
    let _ = match logging.format.as_str() {
        "pretty" => registry.with(layer.pretty()).try_init(),
        "full" => registry.with(layer).try_init(),
        _ => registry.with(layer.compact()).try_init(),
    };
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

fn select_sources(config: &Config, name: Option<&str>) -> Result<Vec<repomirror::Source>> {
    let Some(name) = name else {
        return Ok(config.sources.clone());
    };
    let selected: Vec<_> = config
        .sources
        .iter()
        .filter(|s| s.matches_name(name))
        .cloned()
        .collect();
    if selected.is_empty() {
        bail!("No configured source matches '{}'", name);
    }
    Ok(selected)
}

/// Write a default configuration file
fn cmd_init(destination: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };
    if config_path.exists() {
        bail!("Configuration already exists at {}", config_path.display());
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let config = Config {
        destination: destination.to_string(),
        ..Config::default()
    };
    config.save(&config_path)?;
    info!("Configuration saved to: {:?}", config_path);

    println!("✅ repomirror initialized");
    println!("   Config: {}", config_path.display());
    println!("   Destination: {}", destination);
    println!("   Next: add a source to the config and run 'repomirror sync'");

    Ok(())
}

/// Run the batch, or print the plan with --dry-run
async fn cmd_sync(dry_run: bool, source: Option<String>, config: &Config) -> Result<()> {
    let mut config = config.clone();
    config.sources = select_sources(&config, source.as_deref())?;

    if config.sources.is_empty() {
        warn!("No sources configured; nothing to sync");
        println!("No sources configured. Add one to the configuration file.");
        return Ok(());
    }

    let runner = BatchRunner::from_config(&config)?;

    if dry_run {
        println!("🔍 Dry run mode - no mirror will be touched\n");
        for source in runner.sources() {
            println!("📦 {}", source);
            match runner.plan_source(source).await {
                Ok(planned) => {
                    for repo in planned {
                        let action = match &repo.plan {
                            Plan::Skip => "⏭️  skip".to_string(),
                            Plan::NewMirror => "📥 mirror".to_string(),
                            Plan::ExistingMirror(_) => "🔄 update".to_string(),
                            Plan::Fail(e) => format!("❌ fail ({})", e),
                        };
                        println!(
                            "   {} {} -> {}",
                            action,
                            repo.record.http_url_to_repo,
                            repo.local_path.display()
                        );
                    }
                }
                Err(e) => println!("   ❌ listing failed: {}", e),
            }
            println!();
        }
        return Ok(());
    }

    println!("🔄 Mirroring into {}", config.destination);
    let summary = runner.run().await?;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!("\n🎉 Synchronization Complete!");
    println!(
        "   {:<40} {:>6} {:>8} {:>9} {:>8} {:>7} {:>14} {:>14}",
        "source", "repos", "skipped", "mirrored", "updated", "failed", "failed_mirror", "failed_update"
    );
    for stat in &summary.stats {
        println!(
            "   {:<40} {:>6} {:>8} {:>9} {:>8} {:>7} {:>14} {:>14}",
            stat.source.to_string(),
            stat.repos,
            stat.skipped,
            stat.mirrored,
            stat.updated,
            stat.failed,
            stat.failed_mirror,
            stat.failed_update
        );
        if let Some(e) = &stat.listing_error {
            println!("     ❌ listing failed: {}", e);
        }
    }
    println!(
        "   📊 Total repositories: {}",
        summary.total_repositories()
    );
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if !summary.failures.is_empty() {
        println!("\n🔍 Failed Repositories:");
        for report in &summary.failures {
            println!(
                "   ❌ [{}] {} -> {}: {}",
                report.outcome,
                report.remote_url,
                report.local_path.display(),
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// List remote repositories and whether they would be mirrored
async fn cmd_list(source: Option<String>, config: &Config) -> Result<()> {
    let listing = GitLabListing::new();
    let destination = config.destination_path();

    for source in select_sources(config, source.as_deref())? {
        match listing.list_all(&source).await {
            Ok(repos) => {
                println!("📦 {} ({} repositories)", source, repos.len());
                for repo in repos {
                    let marker = if should_skip(&source, &repo.http_url_to_repo) {
                        "⏭️ "
                    } else {
                        "📁"
                    };
                    println!(
                        "  {} {} -> {}",
                        marker,
                        repo.path_with_namespace,
                        repo.local_path(&destination, &source.domain)
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "(invalid path)".to_string())
                    );
                }
            }
            Err(e) => println!("📦 {}\n  ❌ listing failed: {}", source, e),
        }
    }

    Ok(())
}

/// Show the mirror manifest
fn cmd_status(failed: bool, config: &Config) -> Result<()> {
    if !config.state.enabled {
        println!("The mirror manifest is disabled (state.enabled: false)");
        return Ok(());
    }

    let path = config.state_db_path();
    if !path.exists() {
        println!("No manifest yet at {}; run 'repomirror sync' first", path.display());
        return Ok(());
    }

    let db = StateDb::open_at(&path)?;
    let mirrors = if failed {
        db.list_failed()?
    } else {
        db.list_mirrors()?
    };

    if mirrors.is_empty() {
        println!("No mirrors recorded");
        return Ok(());
    }

    for entry in mirrors {
        let outcome = entry
            .last_outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{:<14} {}/{}  (last sync {})",
            outcome,
            entry.domain,
            entry.path_with_namespace,
            entry.last_sync_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(pack) = entry.largest_pack_bytes {
            println!("               largest pack {} bytes", pack);
        }
        if let Some(error) = &entry.last_error {
            println!("               {}", error);
        }
    }

    Ok(())
}

/// System health check and diagnostics
fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 repomirror System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
