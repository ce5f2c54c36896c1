use chrono::{DateTime, Utc};
use flux_metrics::ReplicationMetrics;
use flux_timeseries::{InfluxQuery, TimeSeriesStore};
use std::sync::Arc;
use tracing::info;

use crate::error::{ReplicationError, Result};
use crate::schema::MeasurementSchema;

/// 复制水位线：目标端已有的最新时间，下一次只读取严格大于它的点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub measurement: String,
    pub at: DateTime<Utc>,
    /// 目标端没有该测量的数据时为 None
    pub target_last: Option<DateTime<Utc>>,
}

impl Watermark {
    /// 目标端为空时从纪元开始
    pub fn epoch(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            at: DateTime::UNIX_EPOCH,
            target_last: None,
        }
    }

    pub fn is_epoch(&self) -> bool {
        self.target_last.is_none()
    }
}

/// 水位线计算
///
/// 不持久化任何状态，每次都从目标端的实际内容重新计算。
pub struct WatermarkResolver {
    target: Arc<dyn TimeSeriesStore>,
    metrics: Arc<ReplicationMetrics>,
}

impl WatermarkResolver {
    pub fn new(target: Arc<dyn TimeSeriesStore>, metrics: Arc<ReplicationMetrics>) -> Self {
        Self { target, metrics }
    }

    /// 目标端所有字段中最新一个非空值的时间
    ///
    /// 各字段的稀疏程度不同，只看单个字段会让水位线停在该字段最后出现的位置。
    pub async fn resolve(&self, schema: &MeasurementSchema) -> Result<Watermark> {
        if schema.field_keys.is_empty() {
            return Err(ReplicationError::NoFieldKeys {
                measurement: schema.name.clone(),
            });
        }

        let mut target_last: Option<DateTime<Utc>> = None;
        for field in &schema.field_keys {
            let rows = self
                .target
                .query(&InfluxQuery::last_value(&schema.name, field))
                .await
                .map_err(|source| ReplicationError::Watermark {
                    measurement: schema.name.clone(),
                    source,
                })?;

            if let Some(row) = rows.first() {
                target_last = target_last.max(Some(row.timestamp));
            }
        }

        let watermark = match target_last {
            Some(at) => Watermark {
                measurement: schema.name.clone(),
                at,
                target_last: Some(at),
            },
            None => Watermark::epoch(&schema.name),
        };

        self.metrics.set_source_last(&schema.name, schema.source_last);
        if let Some(target_last) = watermark.target_last {
            self.metrics.set_target_last(&schema.name, target_last);
        }

        info!(
            measurement = %schema.name,
            source_last = %schema.source_last,
            target_last = ?watermark.target_last,
            "Replication lag"
        );

        Ok(watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flux_timeseries::{MemoryStore, Point};

    fn schema() -> MeasurementSchema {
        MeasurementSchema {
            name: "temp".to_string(),
            tag_keys: vec!["sensor".to_string()],
            field_keys: vec!["value".to_string()],
            source_last: Utc.timestamp_nanos(3),
        }
    }

    #[tokio::test]
    async fn test_empty_target_resolves_to_epoch() {
        let target = Arc::new(MemoryStore::new("target"));
        let metrics = Arc::new(ReplicationMetrics::new().unwrap());
        let resolver = WatermarkResolver::new(target, metrics);

        let watermark = resolver.resolve(&schema()).await.unwrap();

        assert!(watermark.is_epoch());
        assert_eq!(watermark.at, Utc.timestamp_nanos(0));
    }

    #[tokio::test]
    async fn test_watermark_is_target_last() {
        let target = Arc::new(MemoryStore::new("target"));
        target
            .write_batch(
                "temp",
                &[
                    Point::new(Utc.timestamp_nanos(1))
                        .with_tag("sensor", "a")
                        .with_field("value", 1.0),
                    Point::new(Utc.timestamp_nanos(2))
                        .with_tag("sensor", "a")
                        .with_field("value", 2.0),
                ],
            )
            .await
            .unwrap();
        let metrics = Arc::new(ReplicationMetrics::new().unwrap());
        let resolver = WatermarkResolver::new(target, metrics.clone());

        let watermark = resolver.resolve(&schema()).await.unwrap();

        assert_eq!(watermark.at, Utc.timestamp_nanos(2));
        assert!(metrics
            .export()
            .unwrap()
            .contains("influx_replication_target_last_timestamp_seconds{measurement=\"temp\"}"));
    }

    #[tokio::test]
    async fn test_watermark_spans_all_fields() {
        let target = Arc::new(MemoryStore::new("target"));
        target
            .write_batch(
                "temp",
                &[
                    Point::new(Utc.timestamp_nanos(1))
                        .with_field("alarm", 1.0)
                        .with_field("value", 1.0),
                    Point::new(Utc.timestamp_nanos(4)).with_field("value", 4.0),
                ],
            )
            .await
            .unwrap();
        let metrics = Arc::new(ReplicationMetrics::new().unwrap());
        let resolver = WatermarkResolver::new(target, metrics);
        let schema = MeasurementSchema {
            name: "temp".to_string(),
            tag_keys: Vec::new(),
            field_keys: vec!["alarm".to_string(), "value".to_string()],
            source_last: Utc.timestamp_nanos(10),
        };

        let watermark = resolver.resolve(&schema).await.unwrap();

        assert_eq!(watermark.at, Utc.timestamp_nanos(4));
    }

    #[tokio::test]
    async fn test_no_field_keys_is_discovery_error() {
        let target = Arc::new(MemoryStore::new("target"));
        let metrics = Arc::new(ReplicationMetrics::new().unwrap());
        let resolver = WatermarkResolver::new(target, metrics);
        let mut schema = schema();
        schema.field_keys.clear();

        let err = resolver.resolve(&schema).await.unwrap_err();

        assert!(matches!(err, ReplicationError::NoFieldKeys { .. }));
    }
}
