//! Host/port resolution for a pod's management interface
//!
//! Two deployment flavors exist. They differ only in which pod status fields
//! they read; the choice is made once at startup.

use crate::models::{DeclaredPort, Pod};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Derives the reachable host and port for a declared container port.
///
/// There is no error path: empty fields produce an unreachable address and
/// the subsequent fetch fails like any other fetch error.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, pod: &Pod, port: &DeclaredPort) -> (String, u16);
}

/// Talks to the pod through its externally routable host IP and host port
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPortResolver;

impl EndpointResolver for HostPortResolver {
    fn resolve(&self, pod: &Pod, port: &DeclaredPort) -> (String, u16) {
        (
            pod.host_ip.clone().unwrap_or_default(),
            port.host_port.unwrap_or_default(),
        )
    }
}

/// Talks to the pod through its cluster IP and container port
#[derive(Debug, Clone, Copy, Default)]
pub struct PodIpResolver;

impl EndpointResolver for PodIpResolver {
    fn resolve(&self, pod: &Pod, port: &DeclaredPort) -> (String, u16) {
        (pod.pod_ip.clone().unwrap_or_default(), port.container_port)
    }
}

/// Resolver selection as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointMode {
    /// Cluster networking, the default
    #[default]
    PodIp,
    /// Host-mapped ports
    HostPort,
}

impl EndpointMode {
    pub fn resolver(self) -> Arc<dyn EndpointResolver> {
        match self {
            EndpointMode::PodIp => Arc::new(PodIpResolver),
            EndpointMode::HostPort => Arc::new(HostPortResolver),
        }
    }
}
