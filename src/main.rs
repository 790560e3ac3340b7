use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seikyoku::config::Config;
use seikyoku::i18n;
use seikyoku::metrics;
use seikyoku::monitor::MonitorScheduler;
use seikyoku::source::SimulatedSource;

#[derive(Parser)]
#[command(
    name = "seikyoku",
    version,
    about = "Election situation monitor with trend analysis and alerting",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Language for localized messages (ja, en); overrides SEIKYOKU_LANG
    #[arg(long, global = true)]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop against the simulated source
    Run {
        /// Interval name (real_time, frequent, regular, daily)
        #[arg(short, long)]
        interval: Option<String>,

        /// Explicit interval in seconds, overrides --interval
        #[arg(long)]
        every_secs: Option<u64>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Seed for the simulated source
        #[arg(long, default_value = "2025")]
        seed: u64,
    },

    /// Run a few ticks and print the daily report as JSON
    Report {
        /// Ticks to run before building the report
        #[arg(short, long, default_value = "8")]
        ticks: usize,

        /// Seed for the simulated source
        #[arg(long, default_value = "2025")]
        seed: u64,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Publish a test alert and verify the alert pipeline
    Selftest,

    /// Run a few ticks and print Prometheus metrics
    Metrics {
        /// Ticks to run before encoding metrics
        #[arg(short, long, default_value = "3")]
        ticks: usize,

        /// Seed for the simulated source
        #[arg(long, default_value = "2025")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.lang.as_deref() {
        Some(lang) => i18n::set_locale(lang),
        None => i18n::init_from_env(),
    }

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    tracing::info!("seikyoku starting");

    match cli.command {
        Commands::Run {
            interval,
            every_secs,
            duration_secs,
            seed,
        } => {
            tracing::info!(
                interval = ?interval,
                every_secs = ?every_secs,
                duration_secs = ?duration_secs,
                seed = %seed,
                "Starting run command"
            );
            run(config, interval, every_secs, duration_secs, seed).await?;
        }

        Commands::Report {
            ticks,
            seed,
            output,
        } => {
            tracing::info!(ticks = %ticks, seed = %seed, output = ?output, "Starting report command");
            report(config, ticks, seed, output).await?;
        }

        Commands::Selftest => {
            let scheduler = MonitorScheduler::new(config, Arc::new(SimulatedSource::default()));
            if scheduler.test_system() {
                println!("Self-test passed");
            } else {
                anyhow::bail!("Self-test failed");
            }
        }

        Commands::Metrics { ticks, seed } => {
            let scheduler = MonitorScheduler::new(config, Arc::new(SimulatedSource::new(seed)));
            for _ in 0..ticks {
                scheduler.run_once().await;
            }
            let text = metrics::encode_metrics()
                .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
            print!("{text}");
        }
    }

    tracing::info!("seikyoku completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("seikyoku=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("seikyoku={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn run(
    config: Config,
    interval: Option<String>,
    every_secs: Option<u64>,
    duration_secs: Option<u64>,
    seed: u64,
) -> Result<()> {
    let default_interval = config.monitor.default_interval;
    let scheduler = MonitorScheduler::new(config, Arc::new(SimulatedSource::new(seed)));
    scheduler.register_callback(|alert| {
        println!("{}\n", alert.format_message());
    });

    let started = match (every_secs, interval) {
        (Some(secs), _) => scheduler.start_every(Duration::from_secs(secs)),
        (None, Some(name)) => scheduler.start_named(&name),
        (None, None) => scheduler.start(default_interval),
    };
    if !started {
        anyhow::bail!("Monitor failed to start");
    }

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
    }

    tracing::info!("Shutting down monitor");
    scheduler.stop().await;

    let status = scheduler.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn report(config: Config, ticks: usize, seed: u64, output: Option<PathBuf>) -> Result<()> {
    let scheduler = MonitorScheduler::new(config, Arc::new(SimulatedSource::new(seed)));
    for _ in 0..ticks {
        scheduler.run_once().await;
    }

    let report = scheduler.generate_daily_report().await;
    let json = serde_json::to_string_pretty(&report)?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
