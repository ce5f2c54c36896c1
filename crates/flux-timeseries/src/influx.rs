use crate::error::{Result, StoreError};
use crate::line_protocol;
use crate::query::{quote_ident, InfluxQuery};
use crate::store::TimeSeriesStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use flux_types::{FieldValue, Point, Row};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// InfluxDB 连接配置
#[derive(Clone)]
pub struct InfluxConfig {
    /// 存储名称（primary / secondary），仅用于日志
    pub name: String,

    /// 服务地址，例如 http://localhost:8086
    pub url: String,

    /// 数据库名
    pub database: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// 单个请求超时
    pub timeout: Duration,
}

impl InfluxConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            database: database.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// InfluxDB 1.x HTTP API 客户端
pub struct InfluxStore {
    config: InfluxConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<ResultSeries>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultSeries {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxStore {
    /// 创建客户端
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        info!(
            store = %config.name,
            url = %config.url,
            database = %config.database,
            "InfluxDB client created"
        );

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) if !username.is_empty() => {
                request.basic_auth(username, self.config.password.clone())
            }
            _ => request,
        }
    }

    async fn run_query(&self, statement: &str) -> Result<Vec<ResultSeries>> {
        let request = self.client.get(self.endpoint("query")).query(&[
            ("db", self.config.database.as_str()),
            ("q", statement),
            ("epoch", "ns"),
        ]);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse =
            serde_json::from_str(&body).map_err(|e| StoreError::decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(StoreError::Statement(error));
        }

        let mut series = Vec::new();
        for result in parsed.results {
            if let Some(error) = result.error {
                return Err(StoreError::Statement(error));
            }
            series.extend(result.series);
        }

        debug!(
            store = %self.config.name,
            statement = %statement,
            series = series.len(),
            "Query executed"
        );

        Ok(series)
    }
}

/// 取每行第一个字符串列（SHOW MEASUREMENTS / SHOW SERIES）
fn first_column_strings(series: Vec<ResultSeries>, column: &str) -> Vec<String> {
    series
        .into_iter()
        .flat_map(|s| {
            let index = s.columns.iter().position(|c| c == column).unwrap_or(0);
            s.values
                .into_iter()
                .filter_map(move |mut values| match values.get_mut(index).map(std::mem::take) {
                    Some(serde_json::Value::String(v)) => Some(v),
                    _ => None,
                })
        })
        .collect()
}

fn decode_rows(series: Vec<ResultSeries>) -> Result<Vec<Row>> {
    let mut rows = Vec::new();

    for s in series {
        let time_index = s
            .columns
            .iter()
            .position(|c| c == "time")
            .ok_or_else(|| StoreError::decode("result has no time column"))?;

        for values in s.values {
            let nanos = values
                .get(time_index)
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| StoreError::decode("time column is not an integer"))?;

            let mut row = Row::new(Utc.timestamp_nanos(nanos));
            for (index, (column, value)) in s.columns.iter().zip(values).enumerate() {
                if index != time_index {
                    row.columns.insert(column.clone(), FieldValue::from(value));
                }
            }
            rows.push(row);
        }
    }

    Ok(rows)
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_measurements(&self) -> Result<Vec<String>> {
        let series = self.run_query("SHOW MEASUREMENTS").await?;
        Ok(first_column_strings(series, "name"))
    }

    async fn list_series(&self, measurement: &str) -> Result<Vec<String>> {
        let statement = format!("SHOW SERIES FROM {}", quote_ident(measurement));
        let series = self.run_query(&statement).await?;
        Ok(first_column_strings(series, "key"))
    }

    async fn query(&self, query: &InfluxQuery) -> Result<Vec<Row>> {
        let series = self.run_query(&query.to_string()).await?;
        decode_rows(series)
    }

    async fn write_batch(&self, measurement: &str, points: &[Point]) -> Result<usize> {
        let batch = line_protocol::encode_batch(measurement, points);
        if batch.lines == 0 {
            return Ok(0);
        }

        let request = self
            .client
            .post(self.endpoint("write"))
            .query(&[("db", self.config.database.as_str()), ("precision", "ns")])
            .body(batch.body);

        let response = self.authorize(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            store = %self.config.name,
            measurement = %measurement,
            points = batch.lines,
            skipped = points.len() - batch.lines,
            "Batch written"
        );

        Ok(batch.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> InfluxStore {
        InfluxStore::new(InfluxConfig::new("primary", server.uri(), "telemetry")).unwrap()
    }

    #[tokio::test]
    async fn test_list_measurements() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("db", "telemetry"))
            .and(query_param("q", "SHOW MEASUREMENTS"))
            .and(query_param("epoch", "ns"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "statement_id": 0,
                    "series": [{
                        "name": "measurements",
                        "columns": ["name"],
                        "values": [["cpu"], ["temp"]]
                    }]
                }]
            })))
            .mount(&server)
            .await;

        let measurements = store_for(&server).list_measurements().await.unwrap();
        assert_eq!(measurements, vec!["cpu".to_string(), "temp".to_string()]);
    }

    #[tokio::test]
    async fn test_list_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("q", r#"SHOW SERIES FROM "temp""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "statement_id": 0,
                    "series": [{
                        "columns": ["key"],
                        "values": [["temp,sensor=a"], ["temp,sensor=b"]]
                    }]
                }]
            })))
            .mount(&server)
            .await;

        let series = store_for(&server).list_series("temp").await.unwrap();
        assert_eq!(series, vec!["temp,sensor=a", "temp,sensor=b"]);
    }

    #[tokio::test]
    async fn test_empty_result_has_no_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "results": [{ "statement_id": 0 }] })),
            )
            .mount(&server)
            .await;

        let rows = store_for(&server)
            .query(&InfluxQuery::last_value("temp", "value"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_query_decodes_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("q", r#"SELECT * FROM "temp" ORDER BY time DESC LIMIT 1"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "statement_id": 0,
                    "series": [{
                        "name": "temp",
                        "columns": ["time", "note", "sensor", "value"],
                        "values": [[1600000000123456789_i64, null, "a", 21.5]]
                    }]
                }]
            })))
            .mount(&server)
            .await;

        let rows = store_for(&server)
            .query(&InfluxQuery::latest("temp"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.timestamp.timestamp_nanos_opt(), Some(1600000000123456789));
        assert_eq!(row.get("sensor"), Some(&FieldValue::String("a".to_string())));
        assert_eq!(row.get("value"), Some(&FieldValue::Number(21.5)));
        assert_eq!(row.get("note"), Some(&FieldValue::Null));
        assert!(row.get("time").is_none());
    }

    #[tokio::test]
    async fn test_statement_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "statement_id": 0, "error": "database not found: telemetry" }]
            })))
            .mount(&server)
            .await;

        let err = store_for(&server).list_measurements().await.unwrap_err();
        assert!(matches!(err, StoreError::Statement(msg) if msg.contains("database not found")));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(401).set_body_string("authorization failed"))
            .mount(&server)
            .await;

        let err = store_for(&server).list_measurements().await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_write_batch_posts_line_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .and(query_param("db", "telemetry"))
            .and(query_param("precision", "ns"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .and(body_string("temp,sensor=a value=1 1\ntemp,sensor=a value=2 2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = InfluxStore::new(
            InfluxConfig::new("secondary", server.uri(), "telemetry").with_credentials("user", "pass"),
        )
        .unwrap();

        let points = vec![
            Point::new(Utc.timestamp_nanos(1))
                .with_tag("sensor", "a")
                .with_field("value", 1.0),
            Point::new(Utc.timestamp_nanos(2))
                .with_tag("sensor", "a")
                .with_field("value", 2.0),
        ];

        assert_eq!(store.write_batch("temp", &points).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_write_batch_counts_encoded_points_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .and(body_string("temp value=1 1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let points = vec![
            Point::new(Utc.timestamp_nanos(1)).with_field("value", 1.0),
            Point::new(Utc.timestamp_nanos(2)).with_field("value", f64::INFINITY),
        ];

        let written = store_for(&server).write_batch("temp", &points).await.unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_write_batch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/write"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"field type conflict"}"#),
            )
            .mount(&server)
            .await;

        let points = vec![Point::new(Utc.timestamp_nanos(1)).with_field("value", 1.0)];
        let err = store_for(&server).write_batch("temp", &points).await.unwrap_err();

        match err {
            StoreError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("field type conflict"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_write_empty_batch_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(store_for(&server).write_batch("temp", &[]).await.unwrap(), 0);
    }
}
