use std::sync::Arc;
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use crate::collector::ReplicationMetrics;

/// 进程指标收集器
pub struct ProcessMetricsCollector {
    system: System,
    pid: Option<Pid>,
    metrics: Arc<ReplicationMetrics>,
}

impl ProcessMetricsCollector {
    pub fn new(metrics: Arc<ReplicationMetrics>) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = %e, "Current pid unavailable, process metrics disabled");
                None
            }
        };

        Self {
            system: System::new(),
            pid,
            metrics,
        }
    }

    /// 刷新当前进程的指标
    pub fn update(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };

        if !self.system.refresh_process(pid) {
            warn!(pid = %pid, "Failed to refresh process information");
            return;
        }

        if let Some(process) = self.system.process(pid) {
            self.metrics.set_resident_memory(process.memory());
            self.metrics.set_virtual_memory(process.virtual_memory());
            self.metrics.set_cpu_usage(f64::from(process.cpu_usage()) / 100.0);
            self.metrics.set_start_time(process.start_time());

            debug!(
                "Process metrics updated: CPU={:.2}%, Memory={}MB",
                process.cpu_usage(),
                process.memory() / 1024 / 1024
            );
        }
    }

    /// 启动定期收集
    pub fn start_periodic_collection(mut self, interval_secs: u64) -> JoinHandle<()> {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                self.update();
            }
        })
    }
}
