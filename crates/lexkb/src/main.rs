use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lexkb::config::log_level_name;
use lexkb::pipeline::LogProgress;
use lexkb::worker::{
    backfill_episodes, build_episode_writer, build_pipeline, database_path, BackfillOptions,
    Poller,
};
use lexkb::{Database, WorkerConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "lexkb-worker")]
#[command(version, about = "Legal knowledge-base enrichment worker", long_about = None)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, value_name = "FILE", env = "LEGAL_KB_CONFIG")]
    config: Option<PathBuf>,

    /// Process at most one job and exit
    #[arg(long)]
    once: bool,

    /// Poll interval in seconds, overriding the config file
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send a graph episode for every active knowledge-base entry
    Backfill {
        /// Newest entries only
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// List the entries without writing episodes
        #[arg(long)]
        dry_run: bool,
    },
}

/// `RUST_LOG` wins, then `-v`, then the configured level.
fn init_logging(verbose: u8, configured: Option<&str>, format: LogFormat) {
    // Route `log` records from library code into tracing.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }

    let level = match verbose {
        0 => configured.and_then(log_level_name).unwrap_or("info"),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lexkb={}", level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    if let Err(e) = result {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = lexkb::load_worker_config(cli.config.as_deref());
    let configured = loaded.as_ref().ok().and_then(|c| c.log_level.as_deref());
    init_logging(cli.verbose, configured, cli.log_format);

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(Command::Backfill { limit, dry_run }) = cli.command {
        let options = BackfillOptions { limit, dry_run };
        return run_backfill(&config, options).await;
    }

    info!("Starting lexkb worker v{}", env!("CARGO_PKG_VERSION"));

    if let Some(interval) = cli.interval.filter(|secs| *secs > 0) {
        config.poll_interval_secs = interval;
    }

    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Failed to start worker: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested; finishing current job");
        shutdown_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let poller = Poller::new(
        pipeline,
        Duration::from_secs(config.poll_interval_secs),
        shutdown,
    );

    if cli.once {
        return match poller.run_once(&LogProgress).await {
            Ok(Some(outcome)) if outcome.is_success() => ExitCode::SUCCESS,
            Ok(Some(_)) => ExitCode::FAILURE,
            Ok(None) => {
                info!("No queued jobs");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to claim job: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    poller.run(&LogProgress).await;
    ExitCode::SUCCESS
}

async fn run_backfill(config: &WorkerConfig, options: BackfillOptions) -> ExitCode {
    if !config.graph.enabled {
        error!("Enable the graph (LEGAL_KB_ENABLE_GRAPHITI=yes) to run backfill");
        return ExitCode::FAILURE;
    }

    let writer = match build_episode_writer(config) {
        Ok(Some(writer)) => writer,
        Ok(None) => {
            error!("Backfill needs graph.service_url");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to set up graph client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let db = match database_path(config).and_then(|path| Ok(Database::open(&path)?)) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match backfill_episodes(&db, writer.as_ref(), options).await {
        Ok(stats) if stats.failed > 0 => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Backfill aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
