use flux_timeseries::StoreError;
use flux_types::SeriesKeyError;
use std::fmt;
use thiserror::Error;

/// 出错时所处的复制阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// 列出测量
    Listing,
    /// 发现标签键和字段键
    Discovery,
    /// 计算水位线
    Watermark,
    /// 读取源端数据
    Query,
    /// 写入目标端
    Write,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Listing => "listing",
            Phase::Discovery => "discovery",
            Phase::Watermark => "watermark",
            Phase::Query => "query",
            Phase::Write => "write",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 复制错误
///
/// 全部可恢复：调度器记录并计数后在下一轮重试。
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Failed to list measurements: {source}")]
    Listing {
        #[source]
        source: StoreError,
    },

    #[error("Failed to discover schema of '{measurement}': {source}")]
    Discovery {
        measurement: String,
        #[source]
        source: StoreError,
    },

    #[error("Malformed series identifier '{series}' in '{measurement}': {source}")]
    InvalidSeries {
        measurement: String,
        series: String,
        #[source]
        source: SeriesKeyError,
    },

    #[error("Measurement '{measurement}' has no points to sample")]
    NoSamplePoint { measurement: String },

    #[error("Measurement '{measurement}' has no field columns")]
    NoFieldKeys { measurement: String },

    #[error("Failed to resolve watermark of '{measurement}': {source}")]
    Watermark {
        measurement: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to query '{measurement}' from source: {source}")]
    Query {
        measurement: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write {points} points of '{measurement}' to target: {source}")]
    Write {
        measurement: String,
        points: usize,
        #[source]
        source: StoreError,
    },
}

/// 复制结果类型
pub type Result<T> = std::result::Result<T, ReplicationError>;

impl ReplicationError {
    pub fn phase(&self) -> Phase {
        match self {
            ReplicationError::Listing { .. } => Phase::Listing,
            ReplicationError::Discovery { .. }
            | ReplicationError::InvalidSeries { .. }
            | ReplicationError::NoSamplePoint { .. }
            | ReplicationError::NoFieldKeys { .. } => Phase::Discovery,
            ReplicationError::Watermark { .. } => Phase::Watermark,
            ReplicationError::Query { .. } => Phase::Query,
            ReplicationError::Write { .. } => Phase::Write,
        }
    }

    /// 出错的测量，顶层列举失败时为 None
    pub fn measurement(&self) -> Option<&str> {
        match self {
            ReplicationError::Listing { .. } => None,
            ReplicationError::Discovery { measurement, .. }
            | ReplicationError::InvalidSeries { measurement, .. }
            | ReplicationError::NoSamplePoint { measurement }
            | ReplicationError::NoFieldKeys { measurement }
            | ReplicationError::Watermark { measurement, .. }
            | ReplicationError::Query { measurement, .. }
            | ReplicationError::Write { measurement, .. } => Some(measurement),
        }
    }
}
