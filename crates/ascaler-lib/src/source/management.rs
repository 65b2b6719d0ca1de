//! Management-interface client
//!
//! Each application pod answers `POST /management` with a JSON envelope
//! around the requested resource. The autoscaler only reads the HTTP
//! connector's runtime attributes.

use crate::models::ManagementEndpoint;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;
use tracing::debug;

/// Resource address of the HTTP connector
pub const CONNECTOR_ADDRESS: [&str; 4] = ["subsystem", "web", "connector", "http"];

/// Body of a `read-resource` request
#[derive(Debug, Clone, Serialize)]
pub struct ManagementRequest {
    pub operation: String,
    #[serde(rename = "include-runtime")]
    pub include_runtime: bool,
    pub address: Vec<String>,
    #[serde(rename = "json.pretty")]
    pub pretty: u8,
}

impl ManagementRequest {
    pub fn read_resource(address: &[&str]) -> Self {
        Self {
            operation: "read-resource".to_string(),
            include_runtime: true,
            address: address.iter().map(|s| s.to_string()).collect(),
            pretty: 1,
        }
    }
}

/// Envelope wrapped around every management response
#[derive(Debug, Clone, Deserialize)]
pub struct ManagementResponse<T> {
    pub outcome: String,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(rename = "failure-description", default)]
    pub failure_description: Option<serde_json::Value>,
    #[serde(rename = "rolled-back", default)]
    pub rolled_back: bool,
}

impl<T> ManagementResponse<T> {
    /// The result of a successful operation
    pub fn into_result(self) -> Result<T> {
        if self.outcome != "success" {
            let reason = self
                .failure_description
                .map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "no failure description".to_string());
            bail!(
                "management operation failed (outcome {}, rolled back: {}): {}",
                self.outcome,
                self.rolled_back,
                reason
            );
        }
        self.result.context("management response carries no result")
    }
}

/// Integer that may arrive as a JSON number or a JSON string.
///
/// Always written back as a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StringInt(pub i64);

impl<'de> Deserialize<'de> for StringInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(i64),
            Float(f64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Number(n) => Ok(StringInt(n)),
            Wire::Float(f) => Ok(StringInt(f as i64)),
            Wire::Text(s) => s
                .trim()
                .parse()
                .map(StringInt)
                .map_err(|_| serde::de::Error::custom(format!("invalid integer string '{}'", s))),
        }
    }
}

impl Serialize for StringInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

/// Runtime attributes of the HTTP connector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorStats {
    #[serde(rename = "requestCount")]
    pub request_count: StringInt,
    #[serde(rename = "bytesReceived", default)]
    pub bytes_received: StringInt,
    #[serde(rename = "bytesSent", default)]
    pub bytes_sent: StringInt,
    #[serde(rename = "errorCount", default)]
    pub error_count: StringInt,
    #[serde(rename = "maxTime", default)]
    pub max_time: StringInt,
    #[serde(rename = "processingTime", default)]
    pub processing_time: StringInt,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(rename = "socket-binding", default)]
    pub socket_binding: Option<String>,
    #[serde(rename = "virtual-server", default)]
    pub virtual_server: Option<String>,
    #[serde(rename = "max-connections", default)]
    pub max_connections: Option<i64>,
}

/// HTTP client for pod management interfaces
#[derive(Clone)]
pub struct ManagementClient {
    client: Client,
}

impl ManagementClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create management HTTP client")?;
        Ok(Self { client })
    }

    /// Read the HTTP connector's runtime attributes from one endpoint
    pub async fn connector_stats(&self, endpoint: &ManagementEndpoint) -> Result<ConnectorStats> {
        let request = ManagementRequest::read_resource(&CONNECTOR_ADDRESS);

        let response = self
            .client
            .post(endpoint.url())
            .json(&request)
            .send()
            .await
            .context("Failed to send management request")?;

        // Failed operations still carry a decodable envelope
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read management response")?;

        let envelope: ManagementResponse<ConnectorStats> = serde_json::from_str(&body)
            .with_context(|| format!("Unexpected management response ({}): {}", status, body))?;

        let stats = envelope.into_result()?;
        debug!(
            endpoint = %endpoint,
            request_count = stats.request_count.0,
            "Read connector stats"
        );
        Ok(stats)
    }

    /// Cumulative request count of one endpoint
    pub async fn request_count(&self, endpoint: &ManagementEndpoint) -> Result<i64> {
        Ok(self.connector_stats(endpoint).await?.request_count.0)
    }
}
