//! Rate estimation from a time-series store

use super::influx::{max_by_name, window_query, Series, SeriesStore};
use super::{DrainInspector, GroupTarget, MetricSource};
use crate::error::ScaleError;
use crate::models::Pod;
use crate::rate::{series_rate, AccumulatorContext};
use crate::scaling::Scaler;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Compares the newest poll window against the one before it and averages
/// the per-series rates.
pub struct TimeSeriesSource {
    target: GroupTarget,
    store: Arc<dyn SeriesStore>,
    table: String,
    columns: Vec<String>,
    scaler: Scaler,
    poll_interval: Duration,
}

impl TimeSeriesSource {
    pub fn new(
        target: GroupTarget,
        store: Arc<dyn SeriesStore>,
        table: impl Into<String>,
        columns: Vec<String>,
        scaler: Scaler,
        poll_interval: Duration,
    ) -> Self {
        Self {
            target,
            store,
            table: table.into(),
            columns,
            scaler,
            poll_interval,
        }
    }

    async fn window(&self, k: u64) -> Result<Vec<Series>, ScaleError> {
        let query = window_query(&self.columns, &self.table, self.poll_interval, k);
        self.store.query(&query).await.map_err(ScaleError::Query)
    }
}

#[async_trait]
impl DrainInspector for TimeSeriesSource {
    fn target(&self) -> &GroupTarget {
        &self.target
    }

    /// Aggregated series carry no per-pod drain signal
    async fn can_scale_down(&self, _pod: &Pod) -> bool {
        true
    }
}

#[async_trait]
impl MetricSource for TimeSeriesSource {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn check_data(&self, ctx: &mut AccumulatorContext) -> Result<(), ScaleError> {
        info!(table = %self.table, "Querying request counts");

        let new_series = self.window(0).await?;
        if new_series.is_empty() {
            debug!(table = %self.table, "No series in the current window");
            return Ok(());
        }
        let old_series = self.window(1).await?;

        let new_window = max_by_name(&new_series)?;
        let old_window = max_by_name(&old_series)?;

        let Some(rate) = series_rate(&new_window, &old_window, self.poll_interval) else {
            return Ok(());
        };
        info!(
            series = new_window.len(),
            rate,
            "Mean request rate per series"
        );

        let state = ctx.group_mut(&self.target.selector);
        self.scaler.reconcile(self, state, rate).await?;
        Ok(())
    }
}
