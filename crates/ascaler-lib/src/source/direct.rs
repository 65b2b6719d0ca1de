//! Direct polling of pod management interfaces

use super::management::ManagementClient;
use super::{DrainInspector, GroupTarget, MetricSource};
use crate::error::ScaleError;
use crate::models::{ManagementEndpoint, Pod};
use crate::observability::ScalerMetrics;
use crate::orchestrator::running_pods;
use crate::rate::AccumulatorContext;
use crate::resolver::EndpointResolver;
use crate::scaling::Scaler;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads each pod's cumulative request counter over its management
/// interface and sums the per-pod rates.
pub struct DirectPollSource {
    target: GroupTarget,
    resolver: Arc<dyn EndpointResolver>,
    client: ManagementClient,
    scaler: Scaler,
    poll_interval: Duration,
    /// Wait between the two reads of the drain check
    settle: Duration,
    metrics: ScalerMetrics,
}

impl DirectPollSource {
    pub fn new(
        target: GroupTarget,
        resolver: Arc<dyn EndpointResolver>,
        client: ManagementClient,
        scaler: Scaler,
        poll_interval: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            target,
            resolver,
            client,
            scaler,
            poll_interval,
            settle,
            metrics: ScalerMetrics::new(),
        }
    }

    /// Total request count over all endpoints, or `None` if any read fails
    async fn total_requests(&self, endpoints: &[ManagementEndpoint]) -> Option<i64> {
        let mut total = 0;
        for endpoint in endpoints {
            match self.client.request_count(endpoint).await {
                Ok(count) => total += count,
                Err(e) => {
                    debug!(endpoint = %endpoint, error = %e, "Drain check read failed");
                    return None;
                }
            }
        }
        Some(total)
    }
}

#[async_trait]
impl DrainInspector for DirectPollSource {
    fn target(&self) -> &GroupTarget {
        &self.target
    }

    /// Safe once the pod's counter stops advancing while suspended
    async fn can_scale_down(&self, pod: &Pod) -> bool {
        let endpoints = pod.management_endpoints(self.resolver.as_ref());
        if endpoints.is_empty() {
            return true;
        }

        let Some(before) = self.total_requests(&endpoints).await else {
            return false;
        };
        tokio::time::sleep(self.settle).await;
        let Some(after) = self.total_requests(&endpoints).await else {
            return false;
        };

        debug!(pod = %pod, before, after, "Drain check");
        after <= before
    }
}

#[async_trait]
impl MetricSource for DirectPollSource {
    fn name(&self) -> &'static str {
        "k8s"
    }

    async fn check_data(&self, ctx: &mut AccumulatorContext) -> Result<(), ScaleError> {
        let selector = &self.target.selector;

        let pods = running_pods(self.scaler.orchestrator().as_ref(), selector)
            .await
            .map_err(ScaleError::Query)?;
        if pods.is_empty() {
            info!(selector = %selector, "No running pods, skipping");
            // Close the cycle so no history outlives the empty pod set
            ctx.group_mut(selector).finalize(Utc::now());
            return Ok(());
        }

        let state = ctx.group_mut(selector);
        let now = Utc::now();

        for pod in &pods {
            for endpoint in pod.management_endpoints(self.resolver.as_ref()) {
                match self.client.request_count(&endpoint).await {
                    Ok(count) => state.record(&pod.uid, count, now, self.poll_interval),
                    Err(cause) => {
                        self.metrics.inc_fetch_errors();
                        let err = ScaleError::Fetch {
                            endpoint: endpoint.to_string(),
                            cause,
                        };
                        warn!(pod = %pod, error = %err, "Skipping container");
                    }
                }
            }
        }

        let sample = state.finalize(Utc::now());
        info!(
            selector = %selector,
            pods = pods.len(),
            sampled = sample.seen_pods,
            measured = sample.measured_pods,
            rate = sample.rate,
            "Request rate"
        );

        if sample.measured_pods == 0 {
            debug!(selector = %selector, "No pod has a full interval of history yet");
            return Ok(());
        }

        self.scaler.reconcile(self, state, sample.rate).await?;
        Ok(())
    }
}
