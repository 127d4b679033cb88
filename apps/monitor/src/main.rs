use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ward_monitor::config::SharedConfig;
use ward_monitor::monitoring::checker::{NetProber, Prober};
use ward_monitor::monitoring::history::HistoryStore;
use ward_monitor::monitoring::notify::{Notifier, TelegramNotifier};
use ward_monitor::monitoring::scheduler::Monitor;
use ward_monitor::report::{DailyReporter, NoAgenda};

#[derive(Debug, Parser)]
#[command(name = "ward-monitor", version, about = "Availability monitoring engine for the Ward dashboard")]
struct Args {
    /// Path to the dashboard configuration document.
    #[arg(long, default_value = "ward.json")]
    config: PathBuf,
    /// Directory holding the durable history snapshot.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    // The one genuinely fatal startup condition.
    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory {}", args.data_dir.display())
    })?;

    let config = SharedConfig::load(&args.config).with_context(|| {
        format!("failed to load configuration document {}", args.config.display())
    })?;

    let history = Arc::new(HistoryStore::new(&args.data_dir));
    history.load();

    let notifier: Arc<dyn Notifier> =
        Arc::new(TelegramNotifier::new(&config.read().telegram.bot_token)?);
    let prober: Arc<dyn Prober> = Arc::new(NetProber::new()?);

    let monitor = Monitor::new(config.clone(), Arc::clone(&history), prober, Arc::clone(&notifier));
    monitor.start();

    // Always armed; the reporter gates on the latest settings at each
    // firing, so enabling the daily summary later needs no restart.
    let reporter = Arc::new(DailyReporter::new(
        config.clone(),
        Arc::clone(&history),
        Arc::new(NoAgenda),
        Arc::new(NoAgenda),
        notifier,
    ));
    let report_task = tokio::spawn(reporter.run());

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    // Daily report first so no digest fires mid-shutdown, then the timers,
    // then the history flush inside stop().
    report_task.abort();
    monitor.stop();

    Ok(())
}
