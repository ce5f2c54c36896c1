use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    AlreadyInitialized(String),
}

/// 日志输出配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingOptions {
    /// 过滤指令，例如 `info` 或 `flux_replicator=debug,info`
    pub level: String,

    /// 输出 JSON 行
    pub json: bool,

    /// 输出事件的 target（模块路径）
    pub with_target: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

pub fn parse_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives).map_err(|e| LoggingError::InvalidFilter {
        filter: directives.to_string(),
        reason: e.to_string(),
    })
}

/// 构建过滤器，`RUST_LOG` 优先于配置的级别
pub fn build_filter(options: &LoggingOptions) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => parse_filter(&directives),
        _ => parse_filter(&options.level),
    }
}

/// 安装全局 tracing subscriber
///
/// 重复初始化返回 `AlreadyInitialized`，不会 panic。
pub fn init(options: &LoggingOptions) -> Result<(), LoggingError> {
    let filter = build_filter(options)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(options.with_target);

    let result = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
