use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 复制器配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplicatorConfig {
    /// 源端（主库）
    pub primary: StoreConfig,
    /// 目标端（副本）
    pub secondary: StoreConfig,
    pub sync: SyncConfig,
    pub watchdog: WatchdogConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// InfluxDB 连接配置
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    /// `http` 或 `https`
    pub protocol: String,
    pub database: String,
    /// 为空时不使用认证
    pub username: String,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            protocol: "http".to_string(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl StoreConfig {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    fn validate(&self, side: &str) -> Result<()> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(anyhow!(
                "{}.protocol must be http or https, got '{}'",
                side,
                self.protocol
            ));
        }

        if self.host.trim().is_empty() {
            return Err(anyhow!("{}.host must not be empty", side));
        }

        if self.port == 0 {
            return Err(anyhow!("{}.port must be greater than 0", side));
        }

        if self.database.trim().is_empty() {
            return Err(anyhow!("{}.database must not be empty", side));
        }

        Ok(())
    }
}

/// 同步循环配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 每页最多复制的条目数
    pub page_size: usize,
    /// 上一轮有数据写入时的等待时间
    pub busy_interval_ms: u64,
    /// 上一轮没有数据写入时的等待时间
    pub idle_interval_ms: u64,
    /// 每轮每个测量最多复制的页数
    pub pages_per_measurement: usize,
    /// 单个 HTTP 请求的超时
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20_000,
            busy_interval_ms: 0,
            idle_interval_ms: 10_000,
            pages_per_measurement: 1,
            request_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    pub fn busy_interval(&self) -> Duration {
        Duration::from_millis(self.busy_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 存活看门狗配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// 超过该时长没有完成任何一轮同步则退出进程
    pub liveness_window_secs: u64,
    /// 检查周期
    pub tick_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 300,
            tick_secs: 30,
        }
    }
}

impl WatchdogConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// 指标端点配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
    /// 进程指标刷新周期
    pub process_refresh_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            process_refresh_secs: 5,
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ReplicatorConfig {
    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        self.primary.validate("primary")?;
        self.secondary.validate("secondary")?;

        if self.sync.page_size == 0 {
            return Err(anyhow!("sync.page_size must be greater than 0"));
        }

        if self.sync.pages_per_measurement == 0 {
            return Err(anyhow!("sync.pages_per_measurement must be greater than 0"));
        }

        if self.sync.busy_interval_ms >= self.sync.idle_interval_ms {
            return Err(anyhow!(
                "sync.busy_interval_ms ({}) must be less than sync.idle_interval_ms ({})",
                self.sync.busy_interval_ms,
                self.sync.idle_interval_ms
            ));
        }

        if self.watchdog.tick_secs == 0 {
            return Err(anyhow!("watchdog.tick_secs must be greater than 0"));
        }

        if self.watchdog.tick_secs >= self.watchdog.liveness_window_secs {
            return Err(anyhow!(
                "watchdog.tick_secs ({}) must be less than watchdog.liveness_window_secs ({})",
                self.watchdog.tick_secs,
                self.watchdog.liveness_window_secs
            ));
        }

        if self.watchdog.liveness_window_secs.saturating_mul(1000) <= self.sync.idle_interval_ms {
            return Err(anyhow!(
                "watchdog.liveness_window_secs ({}) must exceed sync.idle_interval_ms ({})",
                self.watchdog.liveness_window_secs,
                self.sync.idle_interval_ms
            ));
        }

        Ok(())
    }
}
