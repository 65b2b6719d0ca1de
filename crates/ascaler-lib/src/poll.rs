//! Fixed-interval poll loop
//!
//! Runs exactly one check-compute-scale cycle per tick. Cycles never
//! overlap: a slow cycle delays the next tick instead of piling up.

use crate::error::ScaleError;
use crate::health::{components, HealthRegistry};
use crate::observability::ScalerMetrics;
use crate::rate::AccumulatorContext;
use crate::source::MetricSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// End the loop on orchestrator mutation errors
    pub exit_on_mutation_error: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            exit_on_mutation_error: true,
        }
    }
}

/// Drives a [`MetricSource`] once per tick and owns its accumulator state
pub struct PollDriver {
    source: Arc<dyn MetricSource>,
    config: PollConfig,
    context: AccumulatorContext,
    health: HealthRegistry,
    metrics: ScalerMetrics,
}

impl PollDriver {
    pub fn new(source: Arc<dyn MetricSource>, config: PollConfig, health: HealthRegistry) -> Self {
        Self {
            source,
            config,
            context: AccumulatorContext::new(),
            health,
            metrics: ScalerMetrics::new(),
        }
    }

    pub fn context(&self) -> &AccumulatorContext {
        &self.context
    }

    /// Run one cycle. Returns an error only when the loop should stop.
    pub async fn tick(&mut self) -> Result<(), ScaleError> {
        let start = Instant::now();
        let result = self.source.check_data(&mut self.context).await;
        let elapsed = start.elapsed();

        self.metrics
            .observe_cycle(elapsed.as_secs_f64(), result.is_err());

        match result {
            Ok(()) => {
                self.health.set_healthy(components::POLL_LOOP).await;
                Ok(())
            }
            Err(e) if self.is_terminal(&e) => {
                error!(
                    source = self.source.name(),
                    error = %e,
                    "Unrecoverable error, stopping poll loop"
                );
                self.health
                    .set_unhealthy(components::POLL_LOOP, e.to_string())
                    .await;
                Err(e)
            }
            Err(e) => {
                warn!(
                    source = self.source.name(),
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Poll cycle failed, retrying next tick"
                );
                self.health
                    .set_degraded(components::POLL_LOOP, e.to_string())
                    .await;
                Ok(())
            }
        }
    }

    fn is_terminal(&self, err: &ScaleError) -> bool {
        match err {
            ScaleError::Mutation(_) => self.config.exit_on_mutation_error,
            other => other.is_fatal(),
        }
    }

    /// Tick until shutdown or an unrecoverable error
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ScaleError> {
        info!(
            source = self.source.name(),
            selector = %self.source.selector(),
            interval_secs = self.config.interval.as_secs(),
            "Starting poll loop"
        );
        self.health.register(components::POLL_LOOP).await;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down poll loop");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::models::Pod;
    use crate::selector::LabelSelector;
    use crate::source::{DrainInspector, GroupTarget};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Step {
        Ok,
        Query,
        Mutation,
    }

    struct ScriptedSource {
        target: GroupTarget,
        script: Mutex<VecDeque<Step>>,
        cycles: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                target: GroupTarget {
                    selector: LabelSelector::parse("name=eapPod").unwrap(),
                    replica_group: "eaprc".to_string(),
                },
                script: Mutex::new(steps.into()),
                cycles: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DrainInspector for ScriptedSource {
        fn target(&self) -> &GroupTarget {
            &self.target
        }

        async fn can_scale_down(&self, _pod: &Pod) -> bool {
            true
        }
    }

    #[async_trait]
    impl MetricSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn check_data(&self, ctx: &mut AccumulatorContext) -> Result<(), ScaleError> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            ctx.group_mut(&self.target.selector).current_replicas = Some(1);
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
            match step {
                Step::Ok => Ok(()),
                Step::Query => Err(ScaleError::Query(anyhow::anyhow!("list failed"))),
                Step::Mutation => Err(ScaleError::Mutation(anyhow::anyhow!("update refused"))),
            }
        }
    }

    fn config(exit_on_mutation_error: bool) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            exit_on_mutation_error,
        }
    }

    #[tokio::test]
    async fn test_recoverable_error_degrades_and_continues() {
        let source = ScriptedSource::new(vec![Step::Query]);
        let health = HealthRegistry::new();
        let mut driver = PollDriver::new(source.clone(), config(true), health.clone());

        driver.tick().await.unwrap();
        let status = health.health().await;
        assert_eq!(
            status.components[components::POLL_LOOP].status,
            ComponentStatus::Degraded
        );

        driver.tick().await.unwrap();
        let status = health.health().await;
        assert_eq!(
            status.components[components::POLL_LOOP].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_mutation_error_stops_loop_by_default() {
        let source = ScriptedSource::new(vec![Step::Ok, Step::Mutation, Step::Ok]);
        let health = HealthRegistry::new();
        let driver = PollDriver::new(source.clone(), config(true), health.clone());
        let (_tx, rx) = broadcast::channel(1);

        let err = driver.run(rx).await.unwrap_err();

        assert!(err.is_mutation());
        assert_eq!(source.cycles.load(Ordering::SeqCst), 2);
        assert_eq!(health.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_mutation_error_tolerated_when_configured() {
        let source = ScriptedSource::new(vec![Step::Mutation]);
        let mut driver = PollDriver::new(source.clone(), config(false), HealthRegistry::new());

        driver.tick().await.unwrap();
        driver.tick().await.unwrap();
        assert_eq!(source.cycles.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_state_persists_across_ticks() {
        let source = ScriptedSource::new(vec![]);
        let mut driver = PollDriver::new(source.clone(), config(true), HealthRegistry::new());

        driver.tick().await.unwrap();
        let selector = LabelSelector::parse("name=eapPod").unwrap();
        assert_eq!(
            driver.context().group(&selector).unwrap().current_replicas,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let source = ScriptedSource::new(vec![]);
        let driver = PollDriver::new(source.clone(), config(true), HealthRegistry::new());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(driver.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(source.cycles.load(Ordering::SeqCst) >= 1);
    }
}
