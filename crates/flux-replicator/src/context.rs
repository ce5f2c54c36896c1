use chrono::{DateTime, Utc};
use flux_metrics::ReplicationMetrics;
use std::sync::Arc;

use crate::watchdog::LivenessClock;

/// 调度器、看门狗和指标端点之间共享的状态
#[derive(Clone)]
pub struct ReplicationContext {
    metrics: Arc<ReplicationMetrics>,
    liveness: LivenessClock,
}

impl ReplicationContext {
    pub fn new(metrics: Arc<ReplicationMetrics>) -> Self {
        Self::with_clock(metrics, LivenessClock::new())
    }

    pub fn with_clock(metrics: Arc<ReplicationMetrics>, liveness: LivenessClock) -> Self {
        Self { metrics, liveness }
    }

    pub fn metrics(&self) -> &Arc<ReplicationMetrics> {
        &self.metrics
    }

    pub fn liveness(&self) -> &LivenessClock {
        &self.liveness
    }

    /// 记录一轮同步完成
    pub fn record_pass_completed(&self, at: DateTime<Utc>) {
        self.liveness.record(at);
        self.metrics.set_last_success(at);
    }
}
