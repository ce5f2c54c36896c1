use anyhow::{anyhow, Context, Result};
use flux_config::{StoreConfig, SyncConfig};
use flux_metrics::ReplicationMetrics;
use flux_replicator::{Backoff, SchedulerOptions};
use flux_timeseries::{InfluxConfig, InfluxStore, TimeSeriesStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::api::create_router;

/// 由连接配置生成 InfluxDB 客户端配置，用户名为空时不带认证
pub fn influx_config(name: &str, store: &StoreConfig, timeout: Duration) -> InfluxConfig {
    let config = InfluxConfig::new(name, store.url(), &store.database).with_timeout(timeout);
    if store.has_credentials() {
        config.with_credentials(&store.username, &store.password)
    } else {
        config
    }
}

pub fn connect_store(
    name: &str,
    store: &StoreConfig,
    timeout: Duration,
) -> Result<Arc<dyn TimeSeriesStore>> {
    let client = InfluxStore::new(influx_config(name, store, timeout))
        .with_context(|| format!("Failed to create {} store client", name))?;
    Ok(Arc::new(client))
}

pub fn scheduler_options(sync: &SyncConfig) -> SchedulerOptions {
    SchedulerOptions {
        page_size: sync.page_size,
        pages_per_measurement: sync.pages_per_measurement,
        backoff: Backoff::new(sync.busy_interval(), sync.idle_interval()),
    }
}

/// 在给定地址上提供 `/metrics`
pub async fn serve_metrics(listen: String, metrics: Arc<ReplicationMetrics>) -> Result<()> {
    let addr = tokio::net::lookup_host(&listen)
        .await
        .with_context(|| format!("Invalid metrics address {}", listen))?
        .next()
        .ok_or_else(|| anyhow!("Metrics address {} did not resolve", listen))?;

    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;

    info!("Metrics endpoint listening on http://{}/metrics", addr);

    server
        .serve(create_router(metrics).into_make_service())
        .await
        .context("Metrics endpoint failed")
}

/// 等待 SIGTERM 或 Ctrl+C，返回信号名称
pub async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => return "SIGTERM",
                    _ = signal::ctrl_c() => return "SIGINT",
                }
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
