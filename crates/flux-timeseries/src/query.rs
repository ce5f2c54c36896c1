use chrono::{DateTime, Utc};
use std::fmt;

/// 复制过程中用到的查询
///
/// `Display` 输出对应的 InfluxQL 文本。
#[derive(Debug, Clone, PartialEq)]
pub enum InfluxQuery {
    /// 最新的一行（全部列）
    Latest { measurement: String },

    /// 某个字段的最后一个值，结果时间戳即该值所在点的时间
    LastValue { measurement: String, field: String },

    /// 时间严格大于 `after` 的行，按时间升序，最多 `limit` 行
    After {
        measurement: String,
        after: DateTime<Utc>,
        limit: usize,
    },
}

impl InfluxQuery {
    pub fn latest(measurement: impl Into<String>) -> Self {
        InfluxQuery::Latest {
            measurement: measurement.into(),
        }
    }

    pub fn last_value(measurement: impl Into<String>, field: impl Into<String>) -> Self {
        InfluxQuery::LastValue {
            measurement: measurement.into(),
            field: field.into(),
        }
    }

    pub fn after(measurement: impl Into<String>, after: DateTime<Utc>, limit: usize) -> Self {
        InfluxQuery::After {
            measurement: measurement.into(),
            after,
            limit,
        }
    }

    pub fn measurement(&self) -> &str {
        match self {
            InfluxQuery::Latest { measurement }
            | InfluxQuery::LastValue { measurement, .. }
            | InfluxQuery::After { measurement, .. } => measurement,
        }
    }
}

impl fmt::Display for InfluxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfluxQuery::Latest { measurement } => write!(
                f,
                "SELECT * FROM {} ORDER BY time DESC LIMIT 1",
                quote_ident(measurement)
            ),
            InfluxQuery::LastValue { measurement, field } => write!(
                f,
                "SELECT last({}) FROM {}",
                quote_ident(field),
                quote_ident(measurement)
            ),
            InfluxQuery::After {
                measurement,
                after,
                limit,
            } => write!(
                f,
                "SELECT * FROM {} WHERE time > {} ORDER BY time ASC LIMIT {}",
                quote_ident(measurement),
                // 纯整数在 InfluxQL 中按纳秒解释
                after.timestamp_nanos_opt().unwrap_or(i64::MAX),
                limit
            ),
        }
    }
}

/// 双引号标识符
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_latest() {
        let query = InfluxQuery::latest("temp");
        assert_eq!(
            query.to_string(),
            r#"SELECT * FROM "temp" ORDER BY time DESC LIMIT 1"#
        );
    }

    #[test]
    fn test_render_last_value() {
        let query = InfluxQuery::last_value("temp", "value");
        assert_eq!(query.to_string(), r#"SELECT last("value") FROM "temp""#);
    }

    #[test]
    fn test_render_after_uses_nanoseconds() {
        let after = Utc.timestamp_nanos(1_600_000_000_123_456_789);
        let query = InfluxQuery::after("temp", after, 20000);
        assert_eq!(
            query.to_string(),
            r#"SELECT * FROM "temp" WHERE time > 1600000000123456789 ORDER BY time ASC LIMIT 20000"#
        );
        assert_eq!(query.measurement(), "temp");
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident(r#"we"ird\name"#), r#""we\"ird\\name""#);
    }
}
