//! drive-mirror
//!
//! Synchronise local files with their Google Drive documents: whichever side
//! was modified more recently overwrites the other, every poll cycle.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drive_mirror::config::{MirrorConfig, PairSpec};
use drive_mirror::remote::DriveClient;
use drive_mirror::sync::PollScheduler;

#[derive(Parser)]
#[command(name = "drive-mirror")]
#[command(about = "Synchronise local files with the corresponding Google Drive documents")]
#[command(version)]
struct Args {
    /// Local file path and Google Drive file id separated by a comma (repeatable)
    #[arg(short, long, value_name = "LOCAL,REMOTE_ID")]
    sync: Vec<PairSpec>,

    /// How often to check for changes (in seconds) [default: 10]
    #[arg(short, long, env = "DRIVE_MIRROR_INTERVAL")]
    interval: Option<u64>,

    /// TOML config file with [[pair]] tables and [drive] settings
    #[arg(short, long, env = "DRIVE_MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit, failing if any pair failed
    #[arg(long)]
    once: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "DRIVE_MIRROR_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}

async fn run(config: MirrorConfig, once: bool) -> anyhow::Result<()> {
    let drive = DriveClient::from_env(config.drive.clone())
        .context("cannot set up the Google Drive client")?;
    let scheduler = PollScheduler::from_config(&config);

    tracing::info!(
        "Mirroring {} pairs, checking every {} seconds",
        scheduler.pairs().len(),
        scheduler.interval().as_secs()
    );

    if once {
        let report = scheduler.run_cycle(&drive).await;
        tracing::info!(
            "Sync done: {} uploaded, {} downloaded, {} unchanged, {} failed",
            report.uploaded,
            report.downloaded,
            report.unchanged,
            report.failed
        );
        if !report.all_succeeded() {
            anyhow::bail!("{} of {} pairs failed", report.failed, report.total());
        }
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    };
    scheduler.run_until(&drive, shutdown).await;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs);

    let config = MirrorConfig::load(args.config.as_deref(), args.sync, args.interval)?;
    config.validate(!args.once)?;

    // Pairs are reconciled strictly in sequence
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start the async runtime")?;

    runtime.block_on(run(config, args.once))
}
