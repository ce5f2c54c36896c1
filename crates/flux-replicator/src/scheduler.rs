use chrono::{DateTime, Utc};
use flux_timeseries::TimeSeriesStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::context::ReplicationContext;
use crate::error::{Phase, ReplicationError};
use crate::replicate::BatchReplicator;
use crate::schema::SchemaDiscoverer;
use crate::watermark::WatermarkResolver;

/// 一轮同步中某个测量的失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementFailure {
    /// 顶层列举失败时为 None
    pub measurement: Option<String>,
    pub phase: Phase,
    pub message: String,
}

impl From<&ReplicationError> for MeasurementFailure {
    fn from(err: &ReplicationError) -> Self {
        Self {
            measurement: err.measurement().map(str::to_string),
            phase: err.phase(),
            message: err.to_string(),
        }
    }
}

/// 一轮同步的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCycle {
    pub started_at: DateTime<Utc>,
    /// 每个测量写入的条目数
    pub synced: BTreeMap<String, usize>,
    pub errors: Vec<MeasurementFailure>,
    pub duration: Duration,
}

impl SyncCycle {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            synced: BTreeMap::new(),
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn total_synced(&self) -> usize {
        self.synced.values().sum()
    }

    pub fn synced_for(&self, measurement: &str) -> usize {
        self.synced.get(measurement).copied().unwrap_or(0)
    }
}

/// 轮次之间的等待策略
///
/// 上一轮有数据写入时很可能还有积压，使用较短的间隔；否则空闲轮询。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub busy: Duration,
    pub idle: Duration,
}

impl Backoff {
    pub fn new(busy: Duration, idle: Duration) -> Self {
        Self { busy, idle }
    }

    pub fn next_delay(&self, synced: usize) -> Duration {
        if synced > 0 {
            self.busy
        } else {
            self.idle
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(10))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub page_size: usize,
    /// 每轮每个测量最多复制的页数，页与页之间重新计算水位线
    pub pages_per_measurement: usize,
    pub backoff: Backoff,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            page_size: 20_000,
            pages_per_measurement: 1,
            backoff: Backoff::default(),
        }
    }
}

/// 同步调度器
///
/// 逐个测量、逐页顺序执行；任何可恢复错误都只记录和计数，循环本身不会停止。
pub struct SyncScheduler {
    discoverer: SchemaDiscoverer,
    resolver: WatermarkResolver,
    replicator: BatchReplicator,
    context: ReplicationContext,
    options: SchedulerOptions,
}

impl SyncScheduler {
    pub fn new(
        source: Arc<dyn TimeSeriesStore>,
        target: Arc<dyn TimeSeriesStore>,
        context: ReplicationContext,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            discoverer: SchemaDiscoverer::new(source.clone()),
            resolver: WatermarkResolver::new(target.clone(), context.metrics().clone()),
            replicator: BatchReplicator::new(source, target, options.page_size),
            context,
            options,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// 无限循环执行同步
    pub async fn run(&self) {
        info!(
            page_size = self.options.page_size,
            busy_ms = self.options.backoff.busy.as_millis() as u64,
            idle_ms = self.options.backoff.idle.as_millis() as u64,
            "Replication scheduler started"
        );

        loop {
            let cycle = self.run_pass().await;
            let delay = self.options.backoff.next_delay(cycle.total_synced());
            debug!(delay_ms = delay.as_millis() as u64, "Sleeping until next pass");
            sleep(delay).await;
        }
    }

    /// 执行一轮同步
    pub async fn run_pass(&self) -> SyncCycle {
        let started = Instant::now();
        let mut cycle = SyncCycle::new(Utc::now());

        match self.discoverer.list_measurements().await {
            Ok(measurements) => {
                self.context.metrics().set_measurements(measurements.len());
                for measurement in &measurements {
                    self.sync_measurement(measurement, &mut cycle).await;
                }
            }
            Err(e) => self.record_failure(&mut cycle, &e),
        }

        let total = cycle.total_synced();
        self.context.metrics().record_synchronized(total as u64);
        cycle.duration = started.elapsed();
        self.context
            .metrics()
            .observe_pass_duration(cycle.duration.as_secs_f64());
        self.context.record_pass_completed(Utc::now());

        info!(
            synced = total,
            errors = cycle.errors.len(),
            duration_ms = cycle.duration.as_millis() as u64,
            "Replication pass completed"
        );

        cycle
    }

    async fn sync_measurement(&self, measurement: &str, cycle: &mut SyncCycle) {
        let schema = match self.discoverer.discover(measurement).await {
            Ok(schema) => schema,
            Err(e) => {
                self.record_failure(cycle, &e);
                return;
            }
        };

        let mut synced = 0;
        for _ in 0..self.options.pages_per_measurement {
            let result = match self.resolver.resolve(&schema).await {
                Ok(watermark) => {
                    self.replicator
                        .replicate(&schema.name, watermark.at, &schema.tag_keys, &schema.field_keys)
                        .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(0) => break,
                Ok(count) => synced += count,
                Err(e) => {
                    self.record_failure(cycle, &e);
                    break;
                }
            }
        }

        cycle.synced.insert(measurement.to_string(), synced);
    }

    fn record_failure(&self, cycle: &mut SyncCycle, err: &ReplicationError) {
        self.context.metrics().record_error();
        warn!(
            measurement = err.measurement().unwrap_or("-"),
            phase = %err.phase(),
            error = %err,
            "Replication error"
        );
        cycle.errors.push(MeasurementFailure::from(err));
    }
}
