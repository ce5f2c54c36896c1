use anyhow::{anyhow, Result};
use clap::Parser;
use flux_config::ConfigLoader;
use flux_logging::LoggingOptions;
use flux_metrics::{ProcessMetricsCollector, ReplicationMetrics};
use flux_replicator::{LivenessWatchdog, ReplicationContext, SyncScheduler};
use flux_server::app;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "One-way incremental InfluxDB replicator", long_about = None)]
struct Args {
    /// Config file path (missing file falls back to defaults and environment)
    #[arg(short, long, env = "REPLICATOR_CONFIG", default_value = "config/replicator.toml")]
    config: PathBuf,

    /// Log filter, overrides logging.level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new().with_file(&args.config).load()?;

    flux_logging::init(&LoggingOptions {
        level: args.log_level.unwrap_or_else(|| config.logging.level.clone()),
        json: config.logging.json,
        with_target: true,
    })?;

    info!(
        config = %args.config.display(),
        primary = %config.primary.url(),
        primary_db = %config.primary.database,
        secondary = %config.secondary.url(),
        secondary_db = %config.secondary.database,
        "Starting influx-replicator"
    );

    let metrics = Arc::new(ReplicationMetrics::new()?);
    let timeout = config.sync.request_timeout();
    let source = app::connect_store("primary", &config.primary, timeout)?;
    let target = app::connect_store("secondary", &config.secondary, timeout)?;
    let context = ReplicationContext::new(metrics.clone());

    let _process_metrics = ProcessMetricsCollector::new(metrics.clone())
        .start_periodic_collection(config.metrics.process_refresh_secs);

    let server = tokio::spawn(app::serve_metrics(
        config.metrics.listen_addr(),
        metrics.clone(),
    ));

    let _watchdog = LivenessWatchdog::new(
        context.liveness().clone(),
        config.watchdog.liveness_window(),
        config.watchdog.tick(),
    )
    .spawn();

    let scheduler = SyncScheduler::new(source, target, context, app::scheduler_options(&config.sync));

    tokio::select! {
        _ = scheduler.run() => {}
        result = server => {
            return match result {
                Ok(Ok(())) => Err(anyhow!("Metrics endpoint stopped unexpectedly")),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow!("Metrics endpoint task failed: {}", e)),
            };
        }
        signal = app::shutdown_signal() => {
            info!("Received {}, shutting down", signal);
        }
    }

    Ok(())
}
