use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesKeyError {
    #[error("Empty series key")]
    Empty,

    #[error("Tag pair without '=' in series key: {0}")]
    MissingEquals(String),
}

/// 序列标识：测量名加一组 `key=value` 标签
///
/// 文本形式与行协议一致，例如 `temp,sensor=a,site=north`，
/// 其中 `,`、`=` 和空格可以用反斜杠转义。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesKey {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
}

impl SeriesKey {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// 解析序列标识
    pub fn parse(raw: &str) -> Result<Self, SeriesKeyError> {
        if raw.is_empty() {
            return Err(SeriesKeyError::Empty);
        }

        let mut segments = split_unescaped(raw, ',').into_iter();
        let measurement = segments
            .next()
            .map(|s| unescape(&s))
            .ok_or(SeriesKeyError::Empty)?;

        let tags = segments
            .map(|segment| {
                let mut parts = split_unescaped(&segment, '=').into_iter();
                let key = parts.next().unwrap_or_default();
                let rest: Vec<String> = parts.collect();
                if rest.is_empty() {
                    return Err(SeriesKeyError::MissingEquals(segment.clone()));
                }
                // 未转义的 '=' 出现在值中时按原样拼回
                Ok((unescape(&key), unescape(&rest.join("="))))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { measurement, tags })
    }

    pub fn tag_keys(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|(k, _)| k.as_str())
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", escape_measurement(&self.measurement))?;
        for (key, value) in &self.tags {
            write!(f, ",{}={}", escape_key(key), escape_key(value))?;
        }
        Ok(())
    }
}

/// 测量名转义（逗号、空格）
pub fn escape_measurement(name: &str) -> String {
    escape_chars(name, &[',', ' '])
}

/// 标签键、标签值和字段键转义（逗号、等号、空格）
pub fn escape_key(key: &str) -> String {
    escape_chars(key, &[',', '=', ' '])
}

fn escape_chars(input: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 按未转义的分隔符切分，转义序列保持原样
fn split_unescaped(input: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ',' | '=' | ' ') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
