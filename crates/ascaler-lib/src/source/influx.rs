//! Time-series store client (InfluxDB 0.8 HTTP API)

use crate::error::ScaleError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Connection settings for the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// `host:port`, or a full URL
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8086".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            database: "k8s".to_string(),
        }
    }
}

/// One named series as returned by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub points: Vec<Vec<Value>>,
}

impl Series {
    /// Counter value of the series: third column of the first point
    pub fn counter(&self) -> Result<i64, ScaleError> {
        let value = self
            .points
            .first()
            .and_then(|point| point.get(2))
            .ok_or_else(|| {
                ScaleError::Decode(format!("series {} has no value in its first point", self.name))
            })?;
        to_i64(value)
    }
}

/// Truncate a JSON number to an integer
pub fn to_i64(value: &Value) -> Result<i64, ScaleError> {
    value
        .as_f64()
        .map(|f| f as i64)
        .ok_or_else(|| {
            ScaleError::Decode(format!(
                "cannot convert {} to int64, expecting a number",
                value
            ))
        })
}

/// Counter per series name, keeping the largest value when a name repeats
pub fn max_by_name(series: &[Series]) -> Result<HashMap<String, i64>, ScaleError> {
    let mut values = HashMap::new();
    for s in series {
        let value = s.counter()?;
        values
            .entry(s.name.clone())
            .and_modify(|v: &mut i64| *v = (*v).max(value))
            .or_insert(value);
    }
    Ok(values)
}

/// `SELECT` covering `[now - (k+1)*interval, now - k*interval]`
pub fn window_query(columns: &[String], table: &str, poll_interval: Duration, k: u64) -> String {
    let secs = poll_interval.as_secs();
    format!(
        "SELECT {} FROM {} WHERE time > now() - {}s AND time < now() - {}s",
        columns.join(","),
        table,
        secs * (k + 1),
        secs * k
    )
}

/// Query access to a series store
#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn query(&self, query: &str) -> Result<Vec<Series>>;
}

/// HTTP client for the store
pub struct InfluxClient {
    client: Client,
    base_url: Url,
    config: InfluxConfig,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig, timeout: Duration) -> Result<Self> {
        let address = if config.host.contains("://") {
            config.host.clone()
        } else {
            format!("http://{}", config.host)
        };
        let base_url = Url::parse(&address)
            .with_context(|| format!("Invalid store address: {}", config.host))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create store HTTP client")?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Create the configured database
    pub async fn create_database(&self) -> Result<()> {
        let url = self.base_url.join("db").context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .query(&[
                ("u", self.config.username.as_str()),
                ("p", self.config.password.as_str()),
            ])
            .json(&serde_json::json!({ "name": self.config.database }))
            .send()
            .await
            .context("Failed to send create database request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Store error ({}): {}", status, body);
        }

        info!(database = %self.config.database, "Created database");
        Ok(())
    }
}

#[async_trait]
impl SeriesStore for InfluxClient {
    async fn query(&self, query: &str) -> Result<Vec<Series>> {
        let path = format!("db/{}/series", self.config.database);
        let url = self.base_url.join(&path).context("Invalid path")?;

        debug!(query = %query, "Querying store");
        let response = self
            .client
            .get(url)
            .query(&[
                ("u", self.config.username.as_str()),
                ("p", self.config.password.as_str()),
                ("q", query),
                ("time_precision", "s"),
            ])
            .send()
            .await
            .context("Failed to send store query")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Store error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse store response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn series(name: &str, value: Value) -> Series {
        Series {
            name: name.to_string(),
            columns: vec![
                "time".to_string(),
                "sequence_number".to_string(),
                "request_count".to_string(),
            ],
            points: vec![vec![json!(1_700_000_000), json!(1), value]],
        }
    }

    #[test]
    fn test_window_query() {
        let columns = vec!["request_count".to_string()];
        assert_eq!(
            window_query(&columns, "/^eap/i", Duration::from_secs(10), 0),
            "SELECT request_count FROM /^eap/i WHERE time > now() - 10s AND time < now() - 0s"
        );
        assert_eq!(
            window_query(&columns, "t", Duration::from_secs(10), 1),
            "SELECT request_count FROM t WHERE time > now() - 20s AND time < now() - 10s"
        );
    }

    #[test]
    fn test_counter_truncates_floats() {
        assert_eq!(series("s", json!(41.9)).counter().unwrap(), 41);
        assert_eq!(series("s", json!(42)).counter().unwrap(), 42);
    }

    #[test]
    fn test_counter_rejects_non_numeric() {
        assert!(matches!(
            series("s", json!("42")).counter(),
            Err(ScaleError::Decode(_))
        ));

        let empty = Series {
            name: "s".to_string(),
            columns: vec![],
            points: vec![],
        };
        assert!(matches!(empty.counter(), Err(ScaleError::Decode(_))));
    }

    #[test]
    fn test_max_by_name() {
        let values = max_by_name(&[
            series("a", json!(10)),
            series("a", json!(30)),
            series("a", json!(20)),
            series("b", json!(5)),
        ])
        .unwrap();

        assert_eq!(values["a"], 30);
        assert_eq!(values["b"], 5);
    }

    #[tokio::test]
    async fn test_query_wire_format() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/db/k8s/series")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("u".into(), "root".into()),
                mockito::Matcher::UrlEncoded("p".into(), "secret".into()),
                mockito::Matcher::UrlEncoded("q".into(), "SELECT request_count FROM t".into()),
                mockito::Matcher::UrlEncoded("time_precision".into(), "s".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([{
                    "name": "default.eap-controller-1.eap-container.dmr",
                    "columns": ["time", "sequence_number", "request_count"],
                    "points": [[1700000000, 1, 1234.0]]
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let client = InfluxClient::new(
            InfluxConfig {
                host: server.url(),
                password: "secret".to_string(),
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client.query("SELECT request_count FROM t").await.unwrap();
        mock.assert_async().await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].counter().unwrap(), 1234);
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(400)
            .with_body("Couldn't find series")
            .create_async()
            .await;

        let client = InfluxClient::new(
            InfluxConfig {
                host: server.url(),
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client.query("SELECT x FROM y").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_create_database() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/db")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::Json(json!({ "name": "k8s" })))
            .with_status(201)
            .create_async()
            .await;

        let client = InfluxClient::new(
            InfluxConfig {
                host: server.url(),
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        client.create_database().await.unwrap();
        mock.assert_async().await;
    }
}
