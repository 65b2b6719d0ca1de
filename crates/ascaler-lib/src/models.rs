//! Core data models for the autoscaler

use crate::resolver::EndpointResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Port name that marks a management interface
pub const MGMT_PORT_NAME: &str = "mgmt";

/// Conventional management interface port
pub const MGMT_PORT_NUMBER: u16 = 9990;

/// Label toggled by the drain protocol
pub const STATE_LABEL: &str = "state";

/// Value of [`STATE_LABEL`] while a pod is being drained
pub const STATE_SUSPENDED: &str = "Suspended";

/// Lifecycle phase of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// A port declared by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredPort {
    pub name: Option<String>,
    pub container_port: u16,
    pub host_port: Option<u16>,
}

impl DeclaredPort {
    /// Whether this port exposes the management interface
    pub fn is_management(&self) -> bool {
        self.name.as_deref() == Some(MGMT_PORT_NAME) || self.container_port == MGMT_PORT_NUMBER
    }
}

/// A container as declared in the pod spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub ports: Vec<DeclaredPort>,
}

/// One orchestrator-managed pod, rebuilt from list results every poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub pod_ip: Option<String>,
    pub host_ip: Option<String>,
    pub node_name: Option<String>,
    pub phase: PodPhase,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerSpec>,
    /// Deletion has been requested but the pod is still listed
    pub terminating: bool,
}

impl Pod {
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }

    /// Running and not already on its way out
    pub fn is_drain_candidate(&self) -> bool {
        self.is_running() && !self.terminating
    }

    /// Management endpoints of this pod, at most one per container.
    ///
    /// The first declared port named `mgmt` or numbered 9990 wins.
    pub fn management_endpoints(
        &self,
        resolver: &dyn EndpointResolver,
    ) -> Vec<ManagementEndpoint> {
        self.containers
            .iter()
            .filter_map(|container| {
                container
                    .ports
                    .iter()
                    .find(|port| port.is_management())
                    .map(|port| {
                        let (host, port) = resolver.resolve(self, port);
                        ManagementEndpoint {
                            pod_uid: self.uid.clone(),
                            pod_name: self.name.clone(),
                            container: container.name.clone(),
                            host,
                            port,
                        }
                    })
            })
            .collect()
    }
}

impl fmt::Display for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Resolved management interface of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementEndpoint {
    /// Owning pod
    pub pod_uid: String,
    pub pod_name: String,
    pub container: String,
    pub host: String,
    pub port: u16,
}

impl ManagementEndpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}/management", self.host, self.port)
    }
}

impl fmt::Display for ManagementEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}:{})", self.pod_name, self.container, self.host, self.port)
    }
}
