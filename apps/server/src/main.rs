//! Divergence Bot - Headless Server
//!
//! Periodically compares watched Binance pairs and posts divergence alerts to
//! Telegram.

mod admin;
mod config;
mod scheduler;
mod state;

use admin::AdminError;
use clap::{Parser, Subcommand};
use config::{parse_threshold, AppConfig, ConfigError};
use scheduler::{Scheduler, SchedulerConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use divergence_alerts::{
    Database, DbError, DryRunChannel, NotificationChannel, NotificationDispatcher, NotifierConfig,
    TelegramChannel,
};
use divergence_engine::{DedupConfig, DedupGuard, DivergenceAnalyzer};
use divergence_feeds::{BinanceRestFetcher, FeedError, PriceSource};

#[derive(Error, Debug)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Price source error: {0}")]
    Feed(#[from] FeedError),
    #[error("Symbol {0} is not listed on the exchange")]
    UnknownSymbol(String),
    #[error("Invalid dedup window: {0:?}")]
    DedupWindow(Duration),
    #[error(transparent)]
    Admin(#[from] AdminError),
}

/// Divergence Bot CLI
#[derive(Parser, Debug)]
#[command(name = "divergence-bot")]
#[command(about = "Pair divergence detection and Telegram alerts", long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log alerts instead of sending them to Telegram
    #[arg(long, default_value_t = false, global = true)]
    dry_run: bool,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Default check interval in seconds (overrides CHECK_INTERVAL)
    #[arg(long)]
    check_interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the detection loop (default)
    Run,
    /// Add a pair to the watch list
    AddPair {
        /// Exchange symbol, e.g. BTCUSDT
        symbol: String,
        /// Divergence threshold in percent
        #[arg(short, long)]
        threshold: Option<String>,
    },
    /// List watched pairs
    ListPairs,
    /// Flip a pair between active and inactive
    TogglePair {
        /// Pair id as shown by list-pairs
        id: i64,
    },
    /// Change a pair's divergence threshold
    SetThreshold {
        /// Pair id as shown by list-pairs
        id: i64,
        /// New threshold in percent
        threshold: String,
    },
    /// Change a runtime setting: check_interval, bot_active or notification_group_id
    Set {
        key: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Show the effective runtime settings
    ShowSettings,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

fn load_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::from_env()?;
    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(secs) = args.check_interval {
        if secs == 0 {
            return Err(ConfigError::Invalid {
                key: "CHECK_INTERVAL",
                value: secs.to_string(),
            });
        }
        config.check_interval = Duration::from_secs(secs);
    }
    Ok(config)
}

fn build_channel(
    config: &AppConfig,
    dry_run: bool,
) -> Result<Arc<dyn NotificationChannel>, ConfigError> {
    if dry_run {
        info!("  Channel: dry-run (alerts are logged only)");
        return Ok(Arc::new(DryRunChannel));
    }
    let token = config.require_bot_token()?;
    info!("  Channel: Telegram");
    Ok(Arc::new(TelegramChannel::new(token)))
}

async fn run_bot(config: AppConfig, dry_run: bool) -> Result<(), AppError> {
    info!("🚀 Divergence Bot starting...");
    info!("  Database: {}", config.database_url);
    info!("  Default interval: {}s", config.check_interval.as_secs());
    info!("  Dedup window: {}s", config.dedup_window.as_secs());
    info!("  History retention: {} days", config.history_retention_days);

    let channel = build_channel(&config, dry_run)?;
    let db = Arc::new(Database::connect(&config.database_url).await?);
    let prices: Arc<dyn PriceSource> =
        Arc::new(BinanceRestFetcher::new(config.binance_api_key.clone())?);

    let pairs = db.list_pairs().await?;
    let active = pairs.iter().filter(|p| p.is_active).count();
    info!("  Watched pairs: {} ({} active)", pairs.len(), active);
    if active < 2 {
        warn!("Fewer than 2 active pairs; add some with `divergence-bot add-pair <SYMBOL>`");
    }
    if config.notification_group_id.is_none() {
        info!("  No static destination; relying on the notification_group_id setting");
    }

    let window = chrono::Duration::from_std(config.dedup_window)
        .map_err(|_| AppError::DedupWindow(config.dedup_window))?;
    let dedup = DedupGuard::new(
        db.clone(),
        DedupConfig {
            window,
            ..Default::default()
        },
    );
    let analyzer = DivergenceAnalyzer::new(db.clone(), prices, db.clone(), dedup);
    let dispatcher = NotificationDispatcher::new(
        db.clone(),
        db.clone(),
        channel,
        NotifierConfig {
            default_destination: config.notification_group_id.clone(),
        },
    );
    let scheduler = Arc::new(Scheduler::new(
        analyzer,
        dispatcher,
        db.clone(),
        db.clone(),
        SchedulerConfig {
            default_interval: config.check_interval,
            history_retention: config.history_retention(),
            ..Default::default()
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = Arc::clone(&scheduler);
    let scheduler_handle = tokio::spawn(async move {
        runner.run(shutdown_rx).await;
    });

    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    warn!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Let an in-flight cycle finish its current delivery
    if tokio::time::timeout(Duration::from_secs(30), scheduler_handle)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop in time");
    }

    // Final stats
    let stats = scheduler.stats();
    let summary = stats.summary();
    info!("📈 Final Stats:");
    info!("  Total uptime: {} seconds", summary.uptime_secs);
    info!(
        "  Cycles: {} completed, {} skipped, {} failed",
        summary.cycles_completed, summary.cycles_skipped, summary.cycles_failed
    );
    info!("  Findings: {}", summary.findings_detected);
    info!("  Notifications sent: {}", summary.notifications_sent);
    if !stats.is_healthy() {
        warn!("  Scheduler was unhealthy at shutdown");
    }

    info!("👋 Divergence Bot stopped");
    Ok(())
}

async fn add_pair(
    config: AppConfig,
    symbol: &str,
    threshold: Option<&str>,
) -> Result<(), AppError> {
    let symbol = symbol.trim().to_uppercase();
    let threshold = match threshold {
        Some(raw) => parse_threshold("--threshold", raw)?,
        None => config.default_threshold,
    };

    let prices = BinanceRestFetcher::new(config.binance_api_key.clone())?;
    if !prices.validate_symbol(&symbol).await {
        return Err(AppError::UnknownSymbol(symbol));
    }

    let db = Database::connect(&config.database_url).await?;
    let pair = db.add_pair(&symbol, threshold).await?;
    info!(
        id = pair.id,
        symbol = %pair.symbol,
        threshold = pair.divergence_threshold,
        "Pair added"
    );
    Ok(())
}

async fn list_pairs(config: AppConfig) -> Result<(), AppError> {
    let db = Database::connect(&config.database_url).await?;
    let pairs = db.list_pairs().await?;
    if pairs.is_empty() {
        println!("No pairs configured");
        return Ok(());
    }
    for pair in pairs {
        println!(
            "{:>4}  {:<12} {:>8.2}%  {}",
            pair.id,
            pair.symbol,
            pair.divergence_threshold,
            if pair.is_active { "active" } else { "inactive" }
        );
    }
    Ok(())
}

async fn toggle_pair(config: AppConfig, id: i64) -> Result<(), AppError> {
    let db = Database::connect(&config.database_url).await?;
    let pair = admin::toggle_pair(&db, id).await?;
    println!(
        "{} is now {}",
        pair.symbol,
        if pair.is_active { "active" } else { "inactive" }
    );
    Ok(())
}

async fn set_threshold(config: AppConfig, id: i64, threshold: &str) -> Result<(), AppError> {
    let db = Database::connect(&config.database_url).await?;
    let pair = admin::set_threshold(&db, id, threshold).await?;
    println!("{} threshold: {:.2}%", pair.symbol, pair.divergence_threshold);
    Ok(())
}

async fn set_setting(config: AppConfig, key: &str, value: &str) -> Result<(), AppError> {
    let db = Database::connect(&config.database_url).await?;
    admin::set_setting(&db, key, value).await?;
    Ok(())
}

async fn show_settings(config: AppConfig) -> Result<(), AppError> {
    let db = Database::connect(&config.database_url).await?;
    for (key, value) in admin::show_settings(&db, &config).await? {
        println!("{key:<24} {value}");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_logging(&args.log_level);

    let result = match load_config(&args) {
        Ok(config) => match &args.command {
            None | Some(Command::Run) => run_bot(config, args.dry_run).await,
            Some(Command::AddPair { symbol, threshold }) => {
                add_pair(config, symbol, threshold.as_deref()).await
            }
            Some(Command::ListPairs) => list_pairs(config).await,
            Some(Command::TogglePair { id }) => toggle_pair(config, *id).await,
            Some(Command::SetThreshold { id, threshold }) => {
                set_threshold(config, *id, threshold).await
            }
            Some(Command::Set { key, value }) => set_setting(config, key, value).await,
            Some(Command::ShowSettings) => show_settings(config).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_subcommands() {
        let args = Args::parse_from([
            "divergence-bot",
            "--dry-run",
            "add-pair",
            "btcusdt",
            "-t",
            "2.5",
        ]);
        assert!(args.dry_run);
        match args.command {
            Some(Command::AddPair { symbol, threshold }) => {
                assert_eq!(symbol, "btcusdt");
                assert_eq!(threshold.as_deref(), Some("2.5"));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::parse_from(["divergence-bot"]);
        assert!(args.command.is_none());
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_args_parse_admin_subcommands() {
        let args = Args::parse_from(["divergence-bot", "set", "notification_group_id", "-100123"]);
        match args.command {
            Some(Command::Set { key, value }) => {
                assert_eq!(key, "notification_group_id");
                assert_eq!(value, "-100123");
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::parse_from(["divergence-bot", "set-threshold", "3", "2.5"]);
        match args.command {
            Some(Command::SetThreshold { id, threshold }) => {
                assert_eq!(id, 3);
                assert_eq!(threshold, "2.5");
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::parse_from(["divergence-bot", "toggle-pair", "7"]);
        assert!(matches!(args.command, Some(Command::TogglePair { id: 7 })));

        let args = Args::parse_from(["divergence-bot", "show-settings"]);
        assert!(matches!(args.command, Some(Command::ShowSettings)));
    }

    #[test]
    fn test_dry_run_needs_no_token() {
        let config = AppConfig::default();
        assert!(build_channel(&config, true).is_ok());
        assert!(matches!(
            build_channel(&config, false),
            Err(ConfigError::Missing("BOT_TOKEN"))
        ));
    }

    #[tokio::test]
    async fn test_list_pairs_on_empty_database() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        assert!(list_pairs(config.clone()).await.is_ok());
        assert!(show_settings(config.clone()).await.is_ok());
        assert!(set_setting(config.clone(), "bot_active", "off").await.is_ok());
        assert!(matches!(
            toggle_pair(config, 1).await,
            Err(AppError::Admin(AdminError::PairNotFound(1)))
        ));
    }
}
