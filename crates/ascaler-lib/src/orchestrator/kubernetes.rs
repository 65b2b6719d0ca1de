//! Kubernetes-backed orchestrator client
//!
//! Supports the transport flavors the autoscaler is deployed with:
//! - Mutual TLS from PEM certificate, key and CA files
//! - Bearer token read from a file (only if the file exists)
//! - Insecure mode accepting any server certificate
//! - Plain HTTP when the master address is `http://`

use super::Orchestrator;
use crate::models::{ContainerSpec, DeclaredPort, Pod, PodPhase};
use crate::selector::LabelSelector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod as KubePod, ReplicationController};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Resource kind of the replica group being scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    #[default]
    ReplicationController,
    ReplicaSet,
    Deployment,
}

/// Connection and scoping settings for the orchestrator client
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// API server address (e.g., "https://localhost:8443")
    pub master: String,
    /// Accept any server certificate
    pub insecure: bool,
    /// Client certificate for mutual TLS
    pub cert_file: Option<PathBuf>,
    /// Client private key for mutual TLS
    pub key_file: Option<PathBuf>,
    /// CA bundle used to verify the API server
    pub ca_file: Option<PathBuf>,
    /// Bearer token file, ignored when missing
    pub bearer_token_file: Option<PathBuf>,
    /// Namespace pods are listed in; `None` lists across all namespaces
    pub namespace: Option<String>,
    /// Namespace of the replica group
    pub group_namespace: String,
    pub group_kind: GroupKind,
    pub request_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            master: "https://localhost:8443".to_string(),
            insecure: false,
            cert_file: None,
            key_file: None,
            ca_file: None,
            bearer_token_file: None,
            namespace: None,
            group_namespace: "default".to_string(),
            group_kind: GroupKind::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`Orchestrator`] implementation talking to a Kubernetes API server
pub struct KubeOrchestrator {
    client: Client,
    config: OrchestratorConfig,
}

impl KubeOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let kube_config = client_config(&config)?;
        let client = Client::try_from(kube_config).context("Failed to create orchestrator client")?;

        info!(
            master = %config.master,
            insecure = config.insecure,
            namespace = ?config.namespace,
            group_kind = ?config.group_kind,
            "Orchestrator client configured"
        );

        Ok(Self { client, config })
    }

    fn pods(&self) -> Api<KubePod> {
        match &self.config.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn group_api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.config.group_namespace)
    }
}

fn client_config(config: &OrchestratorConfig) -> Result<kube::Config> {
    let cluster_url = config
        .master
        .parse()
        .with_context(|| format!("Invalid orchestrator address: {}", config.master))?;

    let mut kube_config = kube::Config::new(cluster_url);
    kube_config.default_namespace = config.group_namespace.clone();
    kube_config.read_timeout = Some(config.request_timeout);
    kube_config.accept_invalid_certs = config.insecure;

    if let Some(ca_file) = &config.ca_file {
        kube_config.root_cert = Some(load_ca_bundle(ca_file)?);
    }

    if let (Some(cert), Some(key)) = (&config.cert_file, &config.key_file) {
        kube_config.auth_info.client_certificate = Some(cert.display().to_string());
        kube_config.auth_info.client_key = Some(key.display().to_string());
    }

    if let Some(token_file) = &config.bearer_token_file {
        if token_file.exists() {
            kube_config.auth_info.token_file = Some(token_file.display().to_string());
        } else {
            debug!(path = ?token_file, "Bearer token file not found, skipping");
        }
    }

    Ok(kube_config)
}

/// Read every DER certificate out of a PEM bundle
fn load_ca_bundle(path: &Path) -> Result<Vec<Vec<u8>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to read CA certificate from {:?}", path))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .with_context(|| format!("Failed to parse CA certificate {:?}", path))?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in {:?}", path);
    }
    Ok(certs)
}

/// Project an API pod onto the fields the engine reads
pub(crate) fn convert_pod(pod: &KubePod) -> Pod {
    let meta = &pod.metadata;
    let status = pod.status.as_ref();
    let spec = pod.spec.as_ref();

    let containers = spec
        .map(|spec| {
            spec.containers
                .iter()
                .map(|container| ContainerSpec {
                    name: container.name.clone(),
                    ports: container
                        .ports
                        .iter()
                        .flatten()
                        .map(|port| DeclaredPort {
                            name: port.name.clone(),
                            container_port: u16::try_from(port.container_port).unwrap_or_default(),
                            host_port: port.host_port.and_then(|p| u16::try_from(p).ok()),
                        })
                        .collect(),
                })
                .collect()
        })
        .unwrap_or_default();

    Pod {
        uid: meta.uid.clone().unwrap_or_default(),
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        host_ip: status.and_then(|s| s.host_ip.clone()),
        node_name: spec.and_then(|s| s.node_name.clone()),
        phase: status
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::from)
            .unwrap_or(PodPhase::Unknown),
        labels: meta.labels.clone().unwrap_or_default(),
        containers,
        terminating: meta.deletion_timestamp.is_some(),
    }
}

/// Merge patch touching a single label; `None` removes it
fn label_patch(key: &str, value: Option<&str>) -> Value {
    let mut labels = Map::new();
    labels.insert(key.to_string(), value.map(Value::from).unwrap_or(Value::Null));
    json!({ "metadata": { "labels": labels } })
}

async fn read_scale<K>(api: Api<K>, group: &str) -> Result<u32>
where
    K: Clone + DeserializeOwned + Debug,
{
    let scale = api
        .get_scale(group)
        .await
        .with_context(|| format!("Failed to read scale of replica group {}", group))?;

    let replicas = scale.spec.and_then(|spec| spec.replicas).unwrap_or(0);
    Ok(u32::try_from(replicas).unwrap_or(0))
}

async fn write_scale<K>(api: Api<K>, group: &str, replicas: u32) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    let patch = json!({ "spec": { "replicas": replicas } });
    api.patch_scale(group, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| {
            format!(
                "Failed to set replica group {} to {} replicas",
                group, replicas
            )
        })?;
    Ok(())
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(&selector.to_string());
        let list = self
            .pods()
            .list(&params)
            .await
            .with_context(|| format!("Failed to list pods for selector '{}'", selector))?;

        debug!(selector = %selector, count = list.items.len(), "Listed pods");
        Ok(list.items.iter().map(convert_pod).collect())
    }

    async fn set_pod_label(&self, pod: &Pod, key: &str, value: Option<&str>) -> Result<()> {
        let api: Api<KubePod> = Api::namespaced(self.client.clone(), &pod.namespace);
        api.patch(&pod.name, &PatchParams::default(), &Patch::Merge(label_patch(key, value)))
            .await
            .with_context(|| format!("Failed to update label {} on pod {}", key, pod))?;
        Ok(())
    }

    async fn delete_pod(&self, pod: &Pod) -> Result<()> {
        let api: Api<KubePod> = Api::namespaced(self.client.clone(), &pod.namespace);
        api.delete(&pod.name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete pod {}", pod))?;
        Ok(())
    }

    async fn get_replicas(&self, group: &str) -> Result<u32> {
        match self.config.group_kind {
            GroupKind::ReplicationController => {
                read_scale(self.group_api::<ReplicationController>(), group).await
            }
            GroupKind::ReplicaSet => read_scale(self.group_api::<ReplicaSet>(), group).await,
            GroupKind::Deployment => read_scale(self.group_api::<Deployment>(), group).await,
        }
    }

    async fn set_replicas(&self, group: &str, replicas: u32) -> Result<()> {
        match self.config.group_kind {
            GroupKind::ReplicationController => {
                write_scale(self.group_api::<ReplicationController>(), group, replicas).await
            }
            GroupKind::ReplicaSet => {
                write_scale(self.group_api::<ReplicaSet>(), group, replicas).await
            }
            GroupKind::Deployment => {
                write_scale(self.group_api::<Deployment>(), group, replicas).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::io::Write;

    fn api_pod() -> KubePod {
        KubePod {
            metadata: ObjectMeta {
                uid: Some("uid-1".to_string()),
                name: Some("eap-1".to_string()),
                namespace: Some("default".to_string()),
                labels: Some([("name".to_string(), "eapPod".to_string())].into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-1".to_string()),
                containers: vec![Container {
                    name: "eap-container".to_string(),
                    ports: Some(vec![ContainerPort {
                        name: Some("mgmt".to_string()),
                        container_port: 9990,
                        host_port: Some(39990),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                pod_ip: Some("10.1.0.7".to_string()),
                host_ip: Some("192.168.1.20".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_convert_pod() {
        let pod = convert_pod(&api_pod());

        assert_eq!(pod.uid, "uid-1");
        assert_eq!(pod.to_string(), "default/eap-1");
        assert_eq!(pod.phase, PodPhase::Running);
        assert_eq!(pod.labels.get("name").map(String::as_str), Some("eapPod"));
        assert_eq!(pod.node_name.as_deref(), Some("node-1"));
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].ports[0].host_port, Some(39990));
        assert!(pod.containers[0].ports[0].is_management());
        assert!(!pod.terminating);
    }

    #[test]
    fn test_convert_pod_without_status() {
        let mut api = api_pod();
        api.status = None;
        api.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let pod = convert_pod(&api);
        assert_eq!(pod.phase, PodPhase::Unknown);
        assert!(pod.pod_ip.is_none());
        assert!(pod.terminating);
    }

    #[test]
    fn test_label_patch() {
        assert_eq!(
            label_patch("state", Some("Suspended")),
            json!({ "metadata": { "labels": { "state": "Suspended" } } })
        );
        assert_eq!(
            label_patch("state", None),
            json!({ "metadata": { "labels": { "state": null } } })
        );
    }

    #[test]
    fn test_client_config_flavors() {
        let mut token = tempfile::NamedTempFile::new().unwrap();
        writeln!(token, "secret-token").unwrap();

        let config = OrchestratorConfig {
            master: "https://master.example:8443".to_string(),
            insecure: true,
            cert_file: Some(PathBuf::from("/certs/client.crt")),
            key_file: Some(PathBuf::from("/certs/client.key")),
            bearer_token_file: Some(token.path().to_path_buf()),
            ..Default::default()
        };
        let kube_config = client_config(&config).unwrap();

        assert!(kube_config.accept_invalid_certs);
        assert_eq!(kube_config.cluster_url.host(), Some("master.example"));
        assert_eq!(
            kube_config.auth_info.client_certificate.as_deref(),
            Some("/certs/client.crt")
        );
        assert!(kube_config.auth_info.token_file.is_some());
    }

    #[test]
    fn test_missing_token_file_is_ignored() {
        let config = OrchestratorConfig {
            master: "http://localhost:8080".to_string(),
            bearer_token_file: Some(PathBuf::from("/nonexistent/token")),
            ..Default::default()
        };
        let kube_config = client_config(&config).unwrap();
        assert!(kube_config.auth_info.token_file.is_none());
    }

    #[test]
    fn test_invalid_ca_bundle() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        writeln!(ca, "not a certificate").unwrap();
        assert!(load_ca_bundle(ca.path()).is_err());
    }

    #[test]
    fn test_group_kind_deserialize() {
        let kind: GroupKind = serde_json::from_str("\"replica-set\"").unwrap();
        assert_eq!(kind, GroupKind::ReplicaSet);
        assert_eq!(GroupKind::default(), GroupKind::ReplicationController);
    }
}
