use anyhow::{anyhow, Result};
use ascaler::bootstrap;
use ascaler::config::AppConfig;
use ascaler_lib::health::components;
use ascaler_lib::orchestrator::Orchestrator;
use ascaler_lib::{ComponentStatus, HealthRegistry, LabelSelector, Pod, SourceKind};
use async_trait::async_trait;
use std::sync::Arc;

struct StubOrchestrator {
    replicas: Option<u32>,
}

#[async_trait]
impl Orchestrator for StubOrchestrator {
    async fn list_pods(&self, _selector: &LabelSelector) -> Result<Vec<Pod>> {
        Ok(Vec::new())
    }

    async fn set_pod_label(&self, _pod: &Pod, _key: &str, _value: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn delete_pod(&self, _pod: &Pod) -> Result<()> {
        Ok(())
    }

    async fn get_replicas(&self, _group: &str) -> Result<u32> {
        self.replicas.ok_or_else(|| anyhow!("connection refused"))
    }

    async fn set_replicas(&self, _group: &str, _replicas: u32) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_build_direct_source() {
    let config = AppConfig::default();
    let health = HealthRegistry::new();
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(StubOrchestrator { replicas: Some(1) });

    let source = bootstrap::build_source(&config, orchestrator, &health)
        .await
        .unwrap();

    assert_eq!(source.name(), "k8s");
    assert_eq!(source.selector().to_string(), "name=eapPod");
    assert_eq!(source.replica_group(), "eaprc");

    let report = health.health().await;
    assert!(report.components.contains_key(components::METRIC_SOURCE));
}

#[tokio::test]
async fn test_build_store_source_tolerates_existing_database() {
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", "/db")
        .match_query(mockito::Matcher::Any)
        .with_status(409)
        .with_body("database k8s exists")
        .create_async()
        .await;

    let mut config = AppConfig::default();
    config.source = SourceKind::Influxdb;
    config.influxdb.host = server.url();

    let health = HealthRegistry::new();
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(StubOrchestrator { replicas: Some(1) });

    let source = bootstrap::build_source(&config, orchestrator, &health)
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(source.name(), "influxdb");
    assert_eq!(health.health().await.status, ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_probe_orchestrator_reachable() {
    let config = AppConfig::default();
    let health = HealthRegistry::new();
    let orchestrator = StubOrchestrator { replicas: Some(3) };

    bootstrap::probe_orchestrator(&config, &orchestrator, &health).await;

    let report = health.health().await;
    assert_eq!(
        report.components[components::ORCHESTRATOR].status,
        ComponentStatus::Healthy
    );
}

#[tokio::test]
async fn test_probe_orchestrator_unreachable_degrades() {
    let config = AppConfig::default();
    let health = HealthRegistry::new();
    let orchestrator = StubOrchestrator { replicas: None };

    bootstrap::probe_orchestrator(&config, &orchestrator, &health).await;

    let report = health.health().await;
    let component = &report.components[components::ORCHESTRATOR];
    assert_eq!(component.status, ComponentStatus::Degraded);
    assert!(component
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));
    assert_eq!(report.status, ComponentStatus::Degraded);
}
