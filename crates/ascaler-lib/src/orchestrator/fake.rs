//! In-memory orchestrator used by engine tests

use super::Orchestrator;
use crate::models::{Pod, PodPhase};
use crate::selector::LabelSelector;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded orchestrator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    SetLabel {
        pod: String,
        key: String,
        value: Option<String>,
    },
    Delete(String),
    GetReplicas(String),
    SetReplicas(String, u32),
}

#[derive(Default)]
struct State {
    pods: Vec<Pod>,
    replicas: HashMap<String, u32>,
    calls: Vec<Call>,
    fail_list: bool,
    fail_mutations: bool,
}

#[derive(Default)]
pub struct FakeOrchestrator {
    state: Mutex<State>,
}

impl FakeOrchestrator {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self {
            state: Mutex::new(State {
                pods,
                ..Default::default()
            }),
        }
    }

    pub fn with_replicas(self, group: &str, replicas: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .replicas
            .insert(group.to_string(), replicas);
        self
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.state.lock().unwrap().fail_mutations = fail;
    }

    pub fn set_phase(&self, uid: &str, phase: PodPhase) {
        let mut state = self.state.lock().unwrap();
        for pod in state.pods.iter_mut().filter(|p| p.uid == uid) {
            pod.phase = phase;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn set_replica_calls(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetReplicas(_, n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn replicas(&self, group: &str) -> Option<u32> {
        self.state.lock().unwrap().replicas.get(group).copied()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .unwrap()
            .pods
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List);
        if state.fail_list {
            bail!("list refused");
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| selector.matches(&p.labels))
            .cloned()
            .collect())
    }

    async fn set_pod_label(&self, pod: &Pod, key: &str, value: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetLabel {
            pod: pod.name.clone(),
            key: key.to_string(),
            value: value.map(str::to_string),
        });
        if state.fail_mutations {
            bail!("label update refused");
        }
        if let Some(stored) = state.pods.iter_mut().find(|p| p.uid == pod.uid) {
            match value {
                Some(v) => stored.labels.insert(key.to_string(), v.to_string()),
                None => stored.labels.remove(key),
            };
        }
        Ok(())
    }

    async fn delete_pod(&self, pod: &Pod) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(pod.name.clone()));
        if state.fail_mutations {
            bail!("delete refused");
        }
        state.pods.retain(|p| p.uid != pod.uid);
        Ok(())
    }

    async fn get_replicas(&self, group: &str) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetReplicas(group.to_string()));
        match state.replicas.get(group) {
            Some(n) => Ok(*n),
            None => bail!("replica group {} not found", group),
        }
    }

    async fn set_replicas(&self, group: &str, replicas: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::SetReplicas(group.to_string(), replicas));
        if state.fail_mutations {
            bail!("scale refused");
        }
        state.replicas.insert(group.to_string(), replicas);
        Ok(())
    }
}
