use chrono::{DateTime, Utc};
use flux_timeseries::{InfluxQuery, TimeSeriesStore};
use flux_types::{Point, Row};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ReplicationError, Result};

/// 批量复制器
///
/// 每次调用最多复制一页，剩余的积压留给下一轮。
pub struct BatchReplicator {
    source: Arc<dyn TimeSeriesStore>,
    target: Arc<dyn TimeSeriesStore>,
    page_size: usize,
}

impl BatchReplicator {
    pub fn new(
        source: Arc<dyn TimeSeriesStore>,
        target: Arc<dyn TimeSeriesStore>,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 复制水位线之后的一页数据，返回写入的条目数
    ///
    /// 返回 0 表示该测量本轮已追平。
    pub async fn replicate(
        &self,
        measurement: &str,
        watermark: DateTime<Utc>,
        tag_keys: &[String],
        field_keys: &[String],
    ) -> Result<usize> {
        // 多取一行，用于判断页尾的时间戳是否被截断
        let rows = self
            .source
            .query(&InfluxQuery::after(measurement, watermark, self.page_size.saturating_add(1)))
            .await
            .map_err(|source| ReplicationError::Query {
                measurement: measurement.to_string(),
                source,
            })?;

        if rows.is_empty() {
            debug!(measurement = %measurement, watermark = %watermark, "Caught up");
            return Ok(0);
        }

        if let Some(instant) = overflowing_instant(&rows, self.page_size) {
            warn!(
                measurement = %measurement,
                instant = %instant,
                page_size = self.page_size,
                "More points share one timestamp than fit in a page, the overflow is skipped"
            );
        }

        let fetched = rows.len();
        let page = bound_page(rows, self.page_size);
        let points: Vec<Point> = page
            .iter()
            .map(|row| Point::from_row(row, tag_keys, field_keys))
            .filter(|point| !point.fields.is_empty())
            .collect();

        if points.is_empty() {
            return Ok(0);
        }

        let written = self
            .target
            .write_batch(measurement, &points)
            .await
            .map_err(|source| ReplicationError::Write {
                measurement: measurement.to_string(),
                points: points.len(),
                source,
            })?;

        info!(
            measurement = %measurement,
            entries = written,
            skipped = points.len().saturating_sub(written),
            deferred = fetched.saturating_sub(page.len()),
            from = %points[0].timestamp,
            to = %points[points.len() - 1].timestamp,
            "Entries replicated"
        );

        Ok(written)
    }
}

/// 整页加上多取的一行都落在同一时间戳时返回该时间戳
///
/// 此时 `bound_page` 只能保留整页，水位线越过该时刻后，同一时刻页外的点不会再被读取。
pub(crate) fn overflowing_instant(rows: &[Row], page_size: usize) -> Option<DateTime<Utc>> {
    let first = rows.first()?;
    let extra = rows.get(page_size)?;
    (first.timestamp == extra.timestamp).then_some(extra.timestamp)
}

/// 将探测结果裁剪为一页
///
/// `rows` 按时间升序、最多 `page_size + 1` 行。页满且页尾时间戳延续到页外时，
/// 去掉页尾这一组同时间戳的行，保证下一轮按 `time > 水位线` 读取时不会漏掉
/// 其它序列在该时刻的点。整页只有一个时间戳时保留整页。
pub(crate) fn bound_page(mut rows: Vec<Row>, page_size: usize) -> Vec<Row> {
    if rows.len() <= page_size {
        return rows;
    }

    let boundary = rows[page_size].timestamp;
    rows.truncate(page_size);

    if rows[page_size - 1].timestamp == boundary {
        let keep = rows.partition_point(|row| row.timestamp < boundary);
        if keep > 0 {
            rows.truncate(keep);
        }
    }

    rows
}
