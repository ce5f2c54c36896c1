use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};

/// 复制指标
///
/// 注册表由实例自身持有，调度器和 `/metrics` 处理器通过 `Arc` 共享。
pub struct ReplicationMetrics {
    // 复制指标
    synchronized_entries: IntCounter,
    errors_total: IntCounter,
    source_last_timestamp: GaugeVec,
    target_last_timestamp: GaugeVec,
    last_success_timestamp: Gauge,
    pass_duration: Histogram,
    measurements: IntGauge,

    // 进程指标
    resident_memory_bytes: Gauge,
    virtual_memory_bytes: Gauge,
    cpu_usage_ratio: Gauge,
    start_time_seconds: Gauge,

    registry: Registry,
}

impl ReplicationMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let synchronized_entries = IntCounter::new(
            "influx_replication_synchronized_entries",
            "Total number of entries written to the secondary store",
        )?;
        registry.register(Box::new(synchronized_entries.clone()))?;

        let errors_total = IntCounter::new(
            "influx_replication_errors_total",
            "Total number of replication error events",
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let source_last_timestamp = GaugeVec::new(
            Opts::new(
                "influx_replication_source_last_timestamp_seconds",
                "Timestamp of the newest point in the primary store",
            ),
            &["measurement"],
        )?;
        registry.register(Box::new(source_last_timestamp.clone()))?;

        let target_last_timestamp = GaugeVec::new(
            Opts::new(
                "influx_replication_target_last_timestamp_seconds",
                "Timestamp of the newest replicated point in the secondary store",
            ),
            &["measurement"],
        )?;
        registry.register(Box::new(target_last_timestamp.clone()))?;

        let last_success_timestamp = Gauge::new(
            "influx_replication_last_success_timestamp_seconds",
            "Unix time of the last completed replication pass",
        )?;
        registry.register(Box::new(last_success_timestamp.clone()))?;

        let pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "influx_replication_pass_duration_seconds",
                "Duration of a replication pass",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(pass_duration.clone()))?;

        let measurements = IntGauge::new(
            "influx_replication_measurements",
            "Number of measurements seen in the last pass",
        )?;
        registry.register(Box::new(measurements.clone()))?;

        // 进程指标
        let resident_memory_bytes =
            Gauge::new("process_resident_memory_bytes", "Resident memory size in bytes")?;
        registry.register(Box::new(resident_memory_bytes.clone()))?;

        let virtual_memory_bytes =
            Gauge::new("process_virtual_memory_bytes", "Virtual memory size in bytes")?;
        registry.register(Box::new(virtual_memory_bytes.clone()))?;

        let cpu_usage_ratio = Gauge::new("process_cpu_usage_ratio", "Process CPU usage ratio")?;
        registry.register(Box::new(cpu_usage_ratio.clone()))?;

        let start_time_seconds = Gauge::new(
            "process_start_time_seconds",
            "Start time of the process since unix epoch in seconds",
        )?;
        registry.register(Box::new(start_time_seconds.clone()))?;

        Ok(Self {
            synchronized_entries,
            errors_total,
            source_last_timestamp,
            target_last_timestamp,
            last_success_timestamp,
            pass_duration,
            measurements,
            resident_memory_bytes,
            virtual_memory_bytes,
            cpu_usage_ratio,
            start_time_seconds,
            registry,
        })
    }

    // 复制指标记录
    pub fn record_synchronized(&self, count: u64) {
        self.synchronized_entries.inc_by(count);
    }

    pub fn record_error(&self) {
        self.errors_total.inc();
    }

    pub fn set_source_last(&self, measurement: &str, timestamp: DateTime<Utc>) {
        self.source_last_timestamp
            .with_label_values(&[measurement])
            .set(seconds(timestamp));
    }

    pub fn set_target_last(&self, measurement: &str, timestamp: DateTime<Utc>) {
        self.target_last_timestamp
            .with_label_values(&[measurement])
            .set(seconds(timestamp));
    }

    pub fn set_last_success(&self, timestamp: DateTime<Utc>) {
        self.last_success_timestamp.set(seconds(timestamp));
    }

    pub fn observe_pass_duration(&self, duration_secs: f64) {
        self.pass_duration.observe(duration_secs);
    }

    pub fn set_measurements(&self, count: usize) {
        self.measurements.set(count as i64);
    }

    // 进程指标记录
    pub fn set_resident_memory(&self, bytes: u64) {
        self.resident_memory_bytes.set(bytes as f64);
    }

    pub fn set_virtual_memory(&self, bytes: u64) {
        self.virtual_memory_bytes.set(bytes as f64);
    }

    pub fn set_cpu_usage(&self, ratio: f64) {
        self.cpu_usage_ratio.set(ratio);
    }

    pub fn set_start_time(&self, unix_secs: u64) {
        self.start_time_seconds.set(unix_secs as f64);
    }

    pub fn synchronized_entries(&self) -> u64 {
        self.synchronized_entries.get()
    }

    pub fn errors(&self) -> u64 {
        self.errors_total.get()
    }

    pub fn last_success(&self) -> f64 {
        self.last_success_timestamp.get()
    }

    /// 导出为 Prometheus 文本格式
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn seconds(timestamp: DateTime<Utc>) -> f64 {
    timestamp.timestamp() as f64 + f64::from(timestamp.timestamp_subsec_nanos()) / 1e9
}
