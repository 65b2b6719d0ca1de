//! Orchestrator API seam
//!
//! The engine only needs a handful of operations from the orchestrator:
//! listing pods by selector, toggling a pod label, deleting a pod, and
//! reading or writing a replica group's replica count.

mod kubernetes;

#[cfg(test)]
pub(crate) mod fake;

pub use kubernetes::{GroupKind, KubeOrchestrator, OrchestratorConfig};

use crate::models::Pod;
use crate::selector::LabelSelector;
use anyhow::Result;
use async_trait::async_trait;

/// Operations the autoscaler performs against the orchestrator
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List pods matching the selector, in any phase
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>>;

    /// Set (`Some`) or remove (`None`) a single label on a pod
    async fn set_pod_label(&self, pod: &Pod, key: &str, value: Option<&str>) -> Result<()>;

    /// Delete a pod
    async fn delete_pod(&self, pod: &Pod) -> Result<()>;

    /// Read the desired replica count of a replica group
    async fn get_replicas(&self, group: &str) -> Result<u32>;

    /// Write the desired replica count of a replica group
    async fn set_replicas(&self, group: &str, replicas: u32) -> Result<()>;
}

/// List pods and keep only the running ones
pub async fn running_pods(
    orchestrator: &dyn Orchestrator,
    selector: &LabelSelector,
) -> Result<Vec<Pod>> {
    let pods = orchestrator.list_pods(selector).await?;
    Ok(pods.into_iter().filter(Pod::is_running).collect())
}
