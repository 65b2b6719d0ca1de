//! Autoscaler configuration
//!
//! Read from an optional file, then overlaid by `ASCALER_*` environment
//! variables (`__` separates nested keys, e.g. `ASCALER_GROUP__POD_RATE`).

use anyhow::{Context, Result};
use ascaler_lib::orchestrator::{GroupKind, OrchestratorConfig};
use ascaler_lib::resolver::EndpointMode;
use ascaler_lib::source::influx::InfluxConfig;
use ascaler_lib::{
    DrainConfig, GroupTarget, LabelSelector, PollConfig, ScaleError, ScalingPolicy, SourceKind,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Only orchestrator API version the client speaks
const SUPPORTED_API_VERSION: &str = "v1";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub source: SourceKind,

    #[serde(default)]
    pub endpoint_mode: EndpointMode,

    /// Stop on orchestrator update failures instead of retrying next tick
    #[serde(default = "default_true")]
    pub exit_on_mutation_error: bool,

    /// Health/metrics port, 0 disables the server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    #[serde(default)]
    pub group: GroupSettings,

    #[serde(default)]
    pub influxdb: InfluxSettings,

    #[serde(default)]
    pub drain: DrainSettings,

    #[serde(default)]
    pub http: HttpSettings,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub master: String,
    pub api_version: String,
    pub insecure: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub bearer_token_file: Option<PathBuf>,
    /// Pod namespace; unset lists pods across all namespaces
    pub namespace: Option<String>,
    pub group_namespace: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            master: "https://localhost:8443".to_string(),
            api_version: SUPPORTED_API_VERSION.to_string(),
            insecure: false,
            cert_file: None,
            key_file: None,
            ca_file: None,
            bearer_token_file: None,
            namespace: None,
            group_namespace: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    pub selector: String,
    pub replica_group: String,
    pub kind: GroupKind,
    /// Requests per second one pod can serve
    pub pod_rate: u32,
    pub max_replicas: u32,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            selector: "name=eapPod".to_string(),
            replica_group: "eaprc".to_string(),
            kind: GroupKind::ReplicationController,
            pod_rate: 1000,
            max_replicas: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxSettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Series name pattern queried each cycle
    pub table: String,
    pub columns: Vec<String>,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        let connection = InfluxConfig::default();
        Self {
            host: connection.host,
            username: connection.username,
            password: connection.password,
            database: connection.database,
            table: r"/^default\.eap-controller-.*\.eap-container\.dmr/i".to_string(),
            columns: vec!["request_count".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrainSettings {
    pub max_passes: u32,
    pub retry_backoff_ms: u64,
    /// Wait between the two counter reads of a drain check
    pub settle_ms: u64,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            max_passes: 10,
            retry_backoff_ms: 1000,
            settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load, normalize and validate. Any failure here is fatal at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("ASCALER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("influxdb.columns"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Give a scheme-less master address the `http://` scheme
    pub fn normalize(&mut self) {
        let master = self.orchestrator.master.trim().to_string();
        if !master.is_empty() && !master.contains("://") {
            self.orchestrator.master = format!("http://{}", master);
        }
    }

    pub fn validate(&self) -> Result<(), ScaleError> {
        let invalid = |msg: String| -> Result<(), ScaleError> { Err(ScaleError::Config(msg)) };

        if self.orchestrator.master.trim().is_empty() {
            return invalid("orchestrator.master must be set".to_string());
        }
        if let Err(e) = url::Url::parse(&self.orchestrator.master) {
            return invalid(format!(
                "orchestrator.master '{}' is not a valid URL: {}",
                self.orchestrator.master, e
            ));
        }
        if self.orchestrator.api_version != SUPPORTED_API_VERSION {
            return invalid(format!(
                "orchestrator.api_version '{}' is not supported (expected {})",
                self.orchestrator.api_version, SUPPORTED_API_VERSION
            ));
        }
        self.selector()?;
        if self.group.replica_group.trim().is_empty() {
            return invalid("group.replica_group must be set".to_string());
        }
        if self.group.pod_rate == 0 {
            return invalid("group.pod_rate must be greater than zero".to_string());
        }
        if self.group.max_replicas == 0 {
            return invalid("group.max_replicas must be greater than zero".to_string());
        }
        if self.poll_interval_secs == 0 {
            return invalid("poll_interval_secs must be greater than zero".to_string());
        }
        if self.drain.max_passes == 0 {
            return invalid("drain.max_passes must be greater than zero".to_string());
        }
        if self.source == SourceKind::Influxdb && self.influxdb.columns.is_empty() {
            return invalid("influxdb.columns must name at least one column".to_string());
        }
        Ok(())
    }

    pub fn selector(&self) -> Result<LabelSelector, ScaleError> {
        LabelSelector::parse(&self.group.selector)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    pub fn target(&self) -> Result<GroupTarget, ScaleError> {
        Ok(GroupTarget {
            selector: self.selector()?,
            replica_group: self.group.replica_group.clone(),
        })
    }

    pub fn scaling_policy(&self) -> ScalingPolicy {
        ScalingPolicy {
            pod_rate: self.group.pod_rate,
            max_replicas: self.group.max_replicas,
        }
    }

    pub fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            max_passes: self.drain.max_passes,
            retry_backoff: Duration::from_millis(self.drain.retry_backoff_ms),
        }
    }

    pub fn drain_settle(&self) -> Duration {
        Duration::from_millis(self.drain.settle_ms)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval(),
            exit_on_mutation_error: self.exit_on_mutation_error,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let o = &self.orchestrator;
        OrchestratorConfig {
            master: o.master.clone(),
            insecure: o.insecure,
            cert_file: o.cert_file.clone(),
            key_file: o.key_file.clone(),
            ca_file: o.ca_file.clone(),
            bearer_token_file: o.bearer_token_file.clone(),
            namespace: o.namespace.clone().filter(|ns| !ns.is_empty()),
            group_namespace: o.group_namespace.clone(),
            group_kind: self.group.kind,
            request_timeout: self.request_timeout(),
        }
    }

    pub fn influx_config(&self) -> InfluxConfig {
        InfluxConfig {
            host: self.influxdb.host.clone(),
            username: self.influxdb.username.clone(),
            password: self.influxdb.password.clone(),
            database: self.influxdb.database.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            source: SourceKind::default(),
            endpoint_mode: EndpointMode::default(),
            exit_on_mutation_error: true,
            api_port: default_api_port(),
            orchestrator: OrchestratorSettings::default(),
            group: GroupSettings::default(),
            influxdb: InfluxSettings::default(),
            drain: DrainSettings::default(),
            http: HttpSettings::default(),
        }
    }
}
