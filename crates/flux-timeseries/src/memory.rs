use crate::error::{Result, StoreError};
use crate::query::InfluxQuery;
use crate::store::TimeSeriesStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flux_types::{FieldValue, Point, Row, SeriesKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// 可注入故障的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListMeasurements,
    ListSeries,
    Query,
    Write,
}

/// 序列内的点标识：时间戳 + 排序后的标签集合
type PointKey = (DateTime<Utc>, Vec<(String, String)>);

#[derive(Default)]
struct MemoryInner {
    measurements: BTreeMap<String, BTreeMap<PointKey, Point>>,
    failures: HashMap<StoreOp, usize>,
    write_calls: usize,
}

/// 内存时序存储
///
/// 语义与 InfluxDB 一致：相同标签集合和时间戳的点视为同一个点，
/// 再次写入时覆盖对应字段，不会产生重复。
pub struct MemoryStore {
    name: String,
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(MemoryInner::default()),
        }
    }

    /// 让接下来 `count` 次 `op` 调用失败
    pub async fn fail_next(&self, op: StoreOp, count: usize) {
        let mut inner = self.inner.write().await;
        *inner.failures.entry(op).or_insert(0) += count;
    }

    /// 按时间顺序返回某个测量的全部点
    pub async fn points(&self, measurement: &str) -> Vec<Point> {
        let inner = self.inner.read().await;
        inner
            .measurements
            .get(measurement)
            .map(|points| {
                let mut points: Vec<Point> = points.values().cloned().collect();
                points.sort_by_key(|p| p.timestamp);
                points
            })
            .unwrap_or_default()
    }

    pub async fn len(&self, measurement: &str) -> usize {
        let inner = self.inner.read().await;
        inner.measurements.get(measurement).map_or(0, BTreeMap::len)
    }

    pub async fn write_calls(&self) -> usize {
        self.inner.read().await.write_calls
    }

    /// 注册一个没有任何点的序列（模拟数据已过期但序列索引仍在）
    pub async fn register_empty_measurement(&self, measurement: &str) {
        let mut inner = self.inner.write().await;
        inner.measurements.entry(measurement.to_string()).or_default();
    }

    fn take_failure(inner: &mut MemoryInner, op: StoreOp) -> Result<()> {
        match inner.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Rejected(format!("injected {:?} failure", op)))
            }
            _ => Ok(()),
        }
    }
}

/// 按 `SELECT *` 语义生成行：测量中出现过的所有标签列和字段列，缺失的为 null
fn to_rows<'a>(points: impl Iterator<Item = &'a Point>, columns: &BTreeSet<String>) -> Vec<Row> {
    points
        .map(|point| {
            let mut row = Row::new(point.timestamp);
            for column in columns {
                let value = point
                    .tags
                    .get(column)
                    .map(|v| FieldValue::String(v.clone()))
                    .or_else(|| point.fields.get(column).cloned())
                    .unwrap_or(FieldValue::Null);
                row.columns.insert(column.clone(), value);
            }
            row
        })
        .collect()
}

fn columns_of(points: &BTreeMap<PointKey, Point>) -> BTreeSet<String> {
    points
        .values()
        .flat_map(|p| p.tags.keys().chain(p.fields.keys()).cloned())
        .collect()
}

fn sorted_by_time(points: &BTreeMap<PointKey, Point>) -> Vec<&Point> {
    // PointKey 以时间戳开头，BTreeMap 迭代即为时间升序
    points.values().collect()
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_measurements(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        Self::take_failure(&mut inner, StoreOp::ListMeasurements)?;
        Ok(inner.measurements.keys().cloned().collect())
    }

    async fn list_series(&self, measurement: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        Self::take_failure(&mut inner, StoreOp::ListSeries)?;

        let series: BTreeSet<String> = inner
            .measurements
            .get(measurement)
            .map(|points| {
                points
                    .keys()
                    .map(|(_, tags)| {
                        tags.iter()
                            .fold(SeriesKey::new(measurement), |key, (k, v)| key.with_tag(k, v))
                            .to_string()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(series.into_iter().collect())
    }

    async fn query(&self, query: &InfluxQuery) -> Result<Vec<Row>> {
        let mut inner = self.inner.write().await;
        Self::take_failure(&mut inner, StoreOp::Query)?;

        let Some(points) = inner.measurements.get(query.measurement()) else {
            return Ok(Vec::new());
        };
        let ordered = sorted_by_time(points);

        let rows = match query {
            InfluxQuery::Latest { .. } => {
                to_rows(ordered.last().copied().into_iter(), &columns_of(points))
            }
            InfluxQuery::LastValue { field, .. } => ordered
                .iter()
                .rev()
                .find_map(|p| {
                    p.fields
                        .get(field)
                        .filter(|v| !v.is_null())
                        .map(|v| Row::new(p.timestamp).with_column("last", v.clone()))
                })
                .into_iter()
                .collect(),
            InfluxQuery::After { after, limit, .. } => to_rows(
                ordered
                    .iter()
                    .copied()
                    .filter(|p| p.timestamp > *after)
                    .take(*limit),
                &columns_of(points),
            ),
        };

        Ok(rows)
    }

    async fn write_batch(&self, measurement: &str, points: &[Point]) -> Result<usize> {
        let mut inner = self.inner.write().await;
        inner.write_calls += 1;
        Self::take_failure(&mut inner, StoreOp::Write)?;

        let series = inner.measurements.entry(measurement.to_string()).or_default();
        let mut written = 0;
        for point in points {
            let fields: Vec<(String, FieldValue)> = point
                .fields
                .iter()
                .filter(|(_, v)| is_writable(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            // 与行协议编码一致：没有可写字段的点被跳过
            if fields.is_empty() {
                continue;
            }
            let key: PointKey = (
                point.timestamp,
                point.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            );
            match series.get_mut(&key) {
                Some(existing) => existing.fields.extend(fields),
                None => {
                    let mut stored = Point::new(point.timestamp);
                    stored.tags = point.tags.clone();
                    stored.fields = fields.into_iter().collect();
                    series.insert(key, stored);
                }
            }
            written += 1;
        }

        debug!(
            store = %self.name,
            measurement = %measurement,
            points = written,
            "Batch written to memory store"
        );

        Ok(written)
    }
}

fn is_writable(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => false,
        FieldValue::Number(n) => n.is_finite(),
        _ => true,
    }
}
