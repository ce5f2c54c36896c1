use chrono::{DateTime, Utc};
use flux_timeseries::{InfluxQuery, TimeSeriesStore};
use flux_types::{Row, SeriesKey, SeriesKeyError};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ReplicationError, Result};

/// 运行时发现的测量结构
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSchema {
    pub name: String,
    /// 按首次出现的顺序去重
    pub tag_keys: Vec<String>,
    /// 按列名字典序
    pub field_keys: Vec<String>,
    /// 源端最新一个点的时间
    pub source_last: DateTime<Utc>,
}

/// 从序列标识中收集标签键
pub fn tag_keys_from_series<S: AsRef<str>>(
    series: &[S],
) -> std::result::Result<Vec<String>, (String, SeriesKeyError)> {
    let mut keys: Vec<String> = Vec::new();

    for raw in series {
        let raw = raw.as_ref();
        let key = SeriesKey::parse(raw).map_err(|e| (raw.to_string(), e))?;
        for tag in key.tag_keys() {
            if !keys.iter().any(|k| k == tag) {
                keys.push(tag.to_string());
            }
        }
    }

    Ok(keys)
}

/// 样本行中除标签键以外的列即字段键
pub fn field_keys_from_sample(sample: &Row, tag_keys: &[String]) -> Vec<String> {
    sample
        .column_names()
        .filter(|column| *column != "time" && !tag_keys.iter().any(|t| t == column))
        .map(str::to_string)
        .collect()
}

/// 结构发现器
pub struct SchemaDiscoverer {
    source: Arc<dyn TimeSeriesStore>,
}

impl SchemaDiscoverer {
    pub fn new(source: Arc<dyn TimeSeriesStore>) -> Self {
        Self { source }
    }

    pub async fn list_measurements(&self) -> Result<Vec<String>> {
        self.source
            .list_measurements()
            .await
            .map_err(|source| ReplicationError::Listing { source })
    }

    /// 发现一个测量的标签键和字段键
    ///
    /// 测量当前没有任何点时无法确定字段，返回 `NoSamplePoint`。
    pub async fn discover(&self, measurement: &str) -> Result<MeasurementSchema> {
        let series = self
            .source
            .list_series(measurement)
            .await
            .map_err(|source| ReplicationError::Discovery {
                measurement: measurement.to_string(),
                source,
            })?;

        let tag_keys = tag_keys_from_series(&series).map_err(|(series, source)| {
            ReplicationError::InvalidSeries {
                measurement: measurement.to_string(),
                series,
                source,
            }
        })?;

        let sample = self
            .source
            .query(&InfluxQuery::latest(measurement))
            .await
            .map_err(|source| ReplicationError::Discovery {
                measurement: measurement.to_string(),
                source,
            })?
            .into_iter()
            .next()
            .ok_or_else(|| ReplicationError::NoSamplePoint {
                measurement: measurement.to_string(),
            })?;

        let field_keys = field_keys_from_sample(&sample, &tag_keys);
        if field_keys.is_empty() {
            return Err(ReplicationError::NoFieldKeys {
                measurement: measurement.to_string(),
            });
        }

        debug!(
            measurement = %measurement,
            series = series.len(),
            tags = ?tag_keys,
            fields = ?field_keys,
            "Schema discovered"
        );

        Ok(MeasurementSchema {
            name: measurement.to_string(),
            tag_keys,
            field_keys,
            source_last: sample.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flux_timeseries::{MemoryStore, Point, StoreOp};
    use flux_types::FieldValue;

    #[test]
    fn test_tag_keys_from_series() {
        let series = vec!["temp,sensor=a", "temp,sensor=b,site=north", "temp,site=south"];
        assert_eq!(tag_keys_from_series(&series).unwrap(), vec!["sensor", "site"]);
    }

    #[test]
    fn test_tag_keys_handle_escapes() {
        let series = vec![r"car\ park,zone\,id=a\=1"];
        assert_eq!(tag_keys_from_series(&series).unwrap(), vec!["zone,id"]);
    }

    #[test]
    fn test_tag_keys_untagged_series() {
        let series = vec!["cpu"];
        assert!(tag_keys_from_series(&series).unwrap().is_empty());
    }

    #[test]
    fn test_tag_keys_malformed_series() {
        let series = vec!["temp,sensor"];
        let (raw, _) = tag_keys_from_series(&series).unwrap_err();
        assert_eq!(raw, "temp,sensor");
    }

    #[test]
    fn test_field_keys_from_sample() {
        let sample = Row::new(Utc.timestamp_nanos(3))
            .with_column("sensor", "a")
            .with_column("value", 1.0);

        let fields = field_keys_from_sample(&sample, &["sensor".to_string()]);
        assert_eq!(fields, vec!["value"]);
    }

    #[test]
    fn test_field_keys_keep_null_columns() {
        let sample = Row::new(Utc.timestamp_nanos(3))
            .with_column("humidity", FieldValue::Null)
            .with_column("value", 1.0);

        assert_eq!(field_keys_from_sample(&sample, &[]), vec!["humidity", "value"]);
    }

    #[tokio::test]
    async fn test_discover() {
        let source = Arc::new(MemoryStore::new("source"));
        source
            .write_batch(
                "temp",
                &[
                    Point::new(Utc.timestamp_nanos(1))
                        .with_tag("sensor", "a")
                        .with_field("value", 1.0),
                    Point::new(Utc.timestamp_nanos(2))
                        .with_tag("sensor", "b")
                        .with_field("value", 2.0),
                ],
            )
            .await
            .unwrap();

        let discoverer = SchemaDiscoverer::new(source);
        let schema = discoverer.discover("temp").await.unwrap();

        assert_eq!(schema.tag_keys, vec!["sensor"]);
        assert_eq!(schema.field_keys, vec!["value"]);
        assert_eq!(schema.source_last, Utc.timestamp_nanos(2));
    }

    #[tokio::test]
    async fn test_discover_empty_measurement() {
        let source = Arc::new(MemoryStore::new("source"));
        source.register_empty_measurement("expired").await;

        let discoverer = SchemaDiscoverer::new(source);
        let err = discoverer.discover("expired").await.unwrap_err();

        assert!(matches!(err, ReplicationError::NoSamplePoint { .. }));
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let source = Arc::new(MemoryStore::new("source"));
        source.fail_next(StoreOp::ListMeasurements, 1).await;

        let discoverer = SchemaDiscoverer::new(source);
        let err = discoverer.list_measurements().await.unwrap_err();

        assert!(matches!(err, ReplicationError::Listing { .. }));
    }
}
