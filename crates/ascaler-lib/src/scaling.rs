//! Applying replica targets to the orchestrator
//!
//! Scale-up is a single replica update. Scale-down drains pods one at a
//! time: each candidate is suspended, checked, and then either removed or
//! resumed, re-listing the group between passes until enough pods are gone.

use crate::error::ScaleError;
use crate::observability::ScalerMetrics;
use crate::models::Pod;
use crate::orchestrator::Orchestrator;
use crate::rate::GroupState;
use crate::replicas::desired_replicas;
use crate::source::DrainInspector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sizing parameters of the managed group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    /// Requests per second one pod can serve
    pub pod_rate: u32,
    pub max_replicas: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            pod_rate: 1000,
            max_replicas: 20,
        }
    }
}

/// Bounds on the drain loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    /// Maximum number of list-and-drain passes per scale-down
    pub max_passes: u32,
    /// Pause between passes
    pub retry_backoff: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            max_passes: 10,
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// What a reconcile call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// No usable target this cycle
    Skipped,
    Unchanged(u32),
    ScaledUp { from: u32, to: u32 },
    ScaledDown { from: u32, to: u32 },
}

pub struct Scaler {
    orchestrator: Arc<dyn Orchestrator>,
    policy: ScalingPolicy,
    drain: DrainConfig,
    metrics: ScalerMetrics,
}

impl Scaler {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        policy: ScalingPolicy,
        drain: DrainConfig,
    ) -> Self {
        Self {
            orchestrator,
            policy,
            drain,
            metrics: ScalerMetrics::new(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    /// Move the replica group towards the target implied by `rate`
    pub async fn reconcile(
        &self,
        inspector: &dyn DrainInspector,
        state: &mut GroupState,
        rate: f64,
    ) -> Result<ScaleOutcome, ScaleError> {
        self.metrics.set_aggregate_rate(rate);

        let Some(desired) = desired_replicas(rate, self.policy.pod_rate, self.policy.max_replicas)
        else {
            info!(
                selector = %inspector.selector(),
                rate,
                "No usable replica target, skipping"
            );
            return Ok(ScaleOutcome::Skipped);
        };
        self.metrics.set_desired_replicas(desired);

        let current = match state.current_replicas {
            Some(current) => current,
            None => {
                let current = self
                    .orchestrator
                    .get_replicas(inspector.replica_group())
                    .await
                    .map_err(ScaleError::Query)?;
                state.current_replicas = Some(current);
                current
            }
        };
        self.metrics.set_current_replicas(current);

        info!(
            replica_group = %inspector.replica_group(),
            rate,
            pod_rate = self.policy.pod_rate,
            desired,
            current,
            "Computed replica target"
        );

        if desired > current {
            self.scale_up(inspector, state, current, desired).await
        } else if desired < current {
            self.scale_down(inspector, state, current, desired).await
        } else {
            Ok(ScaleOutcome::Unchanged(current))
        }
    }

    async fn scale_up(
        &self,
        inspector: &dyn DrainInspector,
        state: &mut GroupState,
        current: u32,
        desired: u32,
    ) -> Result<ScaleOutcome, ScaleError> {
        info!(
            replica_group = %inspector.replica_group(),
            from = current,
            to = desired,
            "Scaling up"
        );

        self.orchestrator
            .set_replicas(inspector.replica_group(), desired)
            .await
            .map_err(ScaleError::Mutation)?;

        state.current_replicas = Some(desired);
        self.metrics.set_current_replicas(desired);
        self.metrics.inc_scale_event("up");

        Ok(ScaleOutcome::ScaledUp {
            from: current,
            to: desired,
        })
    }

    async fn scale_down(
        &self,
        inspector: &dyn DrainInspector,
        state: &mut GroupState,
        current: u32,
        desired: u32,
    ) -> Result<ScaleOutcome, ScaleError> {
        info!(
            replica_group = %inspector.replica_group(),
            from = current,
            to = desired,
            "Scaling down"
        );

        let target = current - desired;
        let mut removed = 0;

        for pass in 1..=self.drain.max_passes {
            let pods = self
                .orchestrator
                .list_pods(inspector.selector())
                .await
                .map_err(ScaleError::Query)?;

            for pod in pods.iter().filter(|p| p.is_drain_candidate()) {
                if removed == target {
                    break;
                }
                if self.drain_pod(inspector, state, pod).await? {
                    removed += 1;
                }
            }

            if removed == target {
                self.metrics.inc_scale_event("down");
                return Ok(ScaleOutcome::ScaledDown {
                    from: current,
                    to: desired,
                });
            }

            debug!(
                pass,
                removed,
                remaining = target - removed,
                "Drain pass finished short of target"
            );
            if pass < self.drain.max_passes {
                tokio::time::sleep(self.drain.retry_backoff).await;
            }
        }

        self.metrics.inc_drain_stalls();
        warn!(
            replica_group = %inspector.replica_group(),
            removed,
            remaining = target - removed,
            "Drain stalled"
        );
        Err(ScaleError::DrainStalled {
            removed,
            remaining: target - removed,
            passes: self.drain.max_passes,
        })
    }

    /// Suspend one pod and either remove or resume it. Returns whether it
    /// was removed.
    async fn drain_pod(
        &self,
        inspector: &dyn DrainInspector,
        state: &mut GroupState,
        pod: &Pod,
    ) -> Result<bool, ScaleError> {
        let orchestrator = self.orchestrator.as_ref();

        let suspension = inspector
            .suspend_pod(orchestrator, pod)
            .await
            .map_err(ScaleError::Mutation)?;

        if !inspector.can_scale_down(pod).await {
            inspector
                .resume_pod(orchestrator, pod, suspension)
                .await
                .map_err(ScaleError::Mutation)?;
            self.metrics.inc_drain_outcome("resumed");
            debug!(pod = %pod, "Pod still busy, resumed");
            return Ok(false);
        }

        // The group controller may start a replacement between these two
        // calls; lowering the count then lets it choose which pod to stop.
        orchestrator
            .delete_pod(pod)
            .await
            .map_err(ScaleError::Mutation)?;

        let replicas = state
            .current_replicas
            .unwrap_or_default()
            .saturating_sub(1);
        orchestrator
            .set_replicas(inspector.replica_group(), replicas)
            .await
            .map_err(ScaleError::Mutation)?;

        state.current_replicas = Some(replicas);
        self.metrics.set_current_replicas(replicas);
        self.metrics.inc_drain_outcome("removed");
        info!(pod = %pod, replicas, "Removed drained pod");
        Ok(true)
    }
}
