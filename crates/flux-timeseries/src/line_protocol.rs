use flux_types::{escape_key, escape_measurement, FieldValue, Point};
use std::fmt::Write;
use tracing::warn;

/// 将一个数据点编码为行协议
///
/// 空值和非有限数字会被跳过；没有任何可写字段或时间戳超出范围时返回 None。
pub fn encode_point(measurement: &str, point: &Point) -> Option<String> {
    let timestamp = point.timestamp.timestamp_nanos_opt()?;

    let mut fields = String::new();
    for (key, value) in &point.fields {
        let encoded = match value {
            FieldValue::Null => continue,
            FieldValue::Number(n) if !n.is_finite() => continue,
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::String(s) => quote_string(s),
        };
        if !fields.is_empty() {
            fields.push(',');
        }
        let _ = write!(fields, "{}={}", escape_key(key), encoded);
    }

    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(measurement);
    for (key, value) in &point.tags {
        // 空标签值在行协议中不合法
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }
    let _ = write!(line, " {} {}", fields, timestamp);

    Some(line)
}

/// 一批编码后的行协议文本
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedBatch {
    pub body: String,
    /// 成功编码的点数
    pub lines: usize,
}

/// 将一批数据点编码为换行分隔的行协议文本
pub fn encode_batch(measurement: &str, points: &[Point]) -> EncodedBatch {
    let lines: Vec<String> = points
        .iter()
        .filter_map(|point| {
            let line = encode_point(measurement, point);
            if line.is_none() {
                warn!(
                    measurement = %measurement,
                    timestamp = %point.timestamp,
                    "Skipping point without writable fields"
                );
            }
            line
        })
        .collect();

    EncodedBatch {
        lines: lines.len(),
        body: lines.join("\n"),
    }
}

fn quote_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
