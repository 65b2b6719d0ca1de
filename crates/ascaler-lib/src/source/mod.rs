//! Metric sources
//!
//! A metric source turns raw samples into a per-group request rate once per
//! poll tick and then hands the result to the [`Scaler`](crate::scaling::Scaler).
//! The same object answers the scaler's drain questions, so each source also
//! implements [`DrainInspector`].
//!
//! Two variants exist:
//! - [`DirectPollSource`]: polls every pod's management interface
//! - [`TimeSeriesSource`]: queries a time-series store

mod direct;
pub mod influx;
pub mod management;
mod timeseries;


pub use direct::DirectPollSource;
pub use timeseries::TimeSeriesSource;

use crate::error::ScaleError;
use crate::models::{Pod, STATE_LABEL, STATE_SUSPENDED};
use crate::orchestrator::Orchestrator;
use crate::rate::AccumulatorContext;
use crate::selector::LabelSelector;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The managed pod group and the replica group that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTarget {
    pub selector: LabelSelector,
    pub replica_group: String,
}

/// Label value a pod had before it was suspended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    pub previous_state: Option<String>,
}

/// Capability set consulted while draining pods on scale-down
#[async_trait]
pub trait DrainInspector: Send + Sync {
    fn target(&self) -> &GroupTarget;

    fn selector(&self) -> &LabelSelector {
        &self.target().selector
    }

    fn replica_group(&self) -> &str {
        &self.target().replica_group
    }

    /// Whether a suspended pod can be removed right now
    async fn can_scale_down(&self, pod: &Pod) -> bool;

    /// Take a pod out of rotation by flipping its state label
    async fn suspend_pod(&self, orchestrator: &dyn Orchestrator, pod: &Pod) -> Result<Suspension> {
        let suspension = Suspension {
            previous_state: pod.labels.get(STATE_LABEL).cloned(),
        };
        orchestrator
            .set_pod_label(pod, STATE_LABEL, Some(STATE_SUSPENDED))
            .await?;
        debug!(pod = %pod, previous = ?suspension.previous_state, "Suspended pod");
        Ok(suspension)
    }

    /// Undo [`suspend_pod`](Self::suspend_pod)
    async fn resume_pod(
        &self,
        orchestrator: &dyn Orchestrator,
        pod: &Pod,
        suspension: Suspension,
    ) -> Result<()> {
        orchestrator
            .set_pod_label(pod, STATE_LABEL, suspension.previous_state.as_deref())
            .await?;
        debug!(pod = %pod, "Resumed pod");
        Ok(())
    }
}

/// A source of request-rate samples driving one scaling decision per tick
#[async_trait]
pub trait MetricSource: DrainInspector {
    fn name(&self) -> &'static str;

    /// Sample, compute the group's rate and apply the resulting replica count
    async fn check_data(&self, ctx: &mut AccumulatorContext) -> Result<(), ScaleError>;
}

/// Source selection as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Direct polling of pod management interfaces
    #[default]
    K8s,
    /// Time-series store queries
    Influxdb,
}
