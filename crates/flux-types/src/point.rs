use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 字段值
///
/// 存储端没有预先声明的模式，列类型只能在读取时确定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// 作为标签值使用时的字符串形式，空值返回 None
    pub fn to_tag_value(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
            Value::String(s) => FieldValue::String(s),
            // 数组和对象不是合法的列值，保留其 JSON 文本
            other => FieldValue::String(other.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// 查询结果中的一行：时间戳加任意命名列（不含 time 列）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub timestamp: DateTime<Utc>,
    pub columns: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.columns.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.columns.get(key)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// 待写入目标端的数据点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// 按标签键和字段键拆分一行
    ///
    /// 只保留给定键集合中的列，空值或缺失的列直接忽略，时间戳原样保留。
    pub fn from_row(row: &Row, tag_keys: &[String], field_keys: &[String]) -> Self {
        let tags = tag_keys
            .iter()
            .filter_map(|key| {
                row.get(key)
                    .and_then(FieldValue::to_tag_value)
                    .map(|value| (key.clone(), value))
            })
            .collect();

        let fields = field_keys
            .iter()
            .filter_map(|key| {
                row.get(key)
                    .filter(|value| !value.is_null())
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        Self {
            tags,
            fields,
            timestamp: row.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_field_value_from_json() {
        assert_eq!(FieldValue::from(json!("a")), FieldValue::String("a".to_string()));
        assert_eq!(FieldValue::from(json!(21.5)), FieldValue::Number(21.5));
        assert_eq!(FieldValue::from(json!(3)), FieldValue::Number(3.0));
        assert_eq!(FieldValue::from(json!(true)), FieldValue::Boolean(true));
        assert_eq!(FieldValue::from(json!(null)), FieldValue::Null);
        assert_eq!(
            FieldValue::from(json!([1, 2])),
            FieldValue::String("[1,2]".to_string())
        );
    }

    #[test]
    fn test_tag_value_conversion() {
        assert_eq!(FieldValue::from("a").to_tag_value(), Some("a".to_string()));
        assert_eq!(FieldValue::from(2.0).to_tag_value(), Some("2".to_string()));
        assert_eq!(FieldValue::Null.to_tag_value(), None);
    }

    #[test]
    fn test_point_from_row_splits_tags_and_fields() {
        let ts = Utc.timestamp_nanos(1_000_000_123);
        let row = Row::new(ts)
            .with_column("sensor", "a")
            .with_column("value", 21.5)
            .with_column("ok", true)
            .with_column("extra", "ignored");

        let point = Point::from_row(&row, &keys(&["sensor"]), &keys(&["value", "ok"]));

        assert_eq!(point.timestamp, ts);
        assert_eq!(point.tags.get("sensor"), Some(&"a".to_string()));
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.fields.get("value"), Some(&FieldValue::Number(21.5)));
        assert!(!point.fields.contains_key("extra"));
    }

    #[test]
    fn test_point_from_row_omits_nulls() {
        let row = Row::new(Utc.timestamp_nanos(1))
            .with_column("sensor", FieldValue::Null)
            .with_column("value", FieldValue::Null)
            .with_column("humidity", 40.0);

        let point = Point::from_row(
            &row,
            &keys(&["sensor", "site"]),
            &keys(&["value", "humidity", "missing"]),
        );

        assert!(point.tags.is_empty());
        assert_eq!(point.fields.len(), 1);
        assert!(point.fields.contains_key("humidity"));
    }
}
