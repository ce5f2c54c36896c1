use crate::error::Result;
use crate::query::InfluxQuery;
use async_trait::async_trait;
use flux_types::{Point, Row};

/// 时序数据存储 trait
///
/// 复制器只依赖这几个操作，源端和目标端使用同一个接口。
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// 存储名称（用于日志）
    fn name(&self) -> &str;

    /// 列出数据库中的全部测量
    async fn list_measurements(&self) -> Result<Vec<String>>;

    /// 列出某个测量下的序列标识，形如 `m,k=v,...`
    async fn list_series(&self, measurement: &str) -> Result<Vec<String>>;

    /// 执行查询
    async fn query(&self, query: &InfluxQuery) -> Result<Vec<Row>>;

    /// 在一次调用中批量写入数据点，返回实际写入的点数
    ///
    /// 没有可写字段的点会被跳过，不计入返回值。
    async fn write_batch(&self, measurement: &str, points: &[Point]) -> Result<usize>;
}
