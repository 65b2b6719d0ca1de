//! Autoscaling engine for a label-selected group of application pods
//!
//! This crate provides the core functionality for:
//! - Metric sources (direct management-interface polling, time-series store)
//! - Request-rate accumulation across pod churn
//! - Replica target computation
//! - Scale-up and graceful drain-based scale-down
//! - The fixed-interval poll driver, health checks and observability

pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod poll;
pub mod rate;
pub mod replicas;
pub mod resolver;
pub mod scaling;
pub mod selector;
pub mod source;

pub use error::ScaleError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::ScalerMetrics;
pub use poll::{PollConfig, PollDriver};
pub use rate::{AccumulatorContext, GroupState, RateSample};
pub use replicas::desired_replicas;
pub use scaling::{DrainConfig, ScaleOutcome, Scaler, ScalingPolicy};
pub use selector::LabelSelector;
pub use source::{DrainInspector, GroupTarget, MetricSource, SourceKind};
