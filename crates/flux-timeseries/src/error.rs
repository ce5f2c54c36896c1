use thiserror::Error;

/// 时序存储访问错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn decode(msg: impl Into<String>) -> Self {
        StoreError::Decode(msg.into())
    }
}
