//! Request-rate accumulation across poll cycles
//!
//! Direct polling keeps one cumulative counter per pod and turns the
//! difference between two cycles into a per-second rate. Pods come and go
//! between polls, so the bookkeeping has to make sure that:
//! - a pod only contributes once it has been present for a full interval
//! - a pod that disappears takes its history with it
//! - a pod that reappears later starts over as a brand-new pod

use crate::selector::LabelSelector;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Counter history of one pod
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PodCounter {
    /// Counter value at the end of the last cycle
    pub previous: i64,
    /// Sum of this cycle's samples (one per management container)
    pub current: i64,
    /// When `previous` was taken
    pub timestamp: DateTime<Utc>,
}

/// Outcome of closing a cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Aggregate requests per second, summed across pods
    pub rate: f64,
    /// Pods with a full interval of history that contributed to `rate`
    pub measured_pods: usize,
    /// Pods sampled this cycle
    pub seen_pods: usize,
}

/// Accumulator state of one managed group, carried from cycle to cycle
#[derive(Debug, Clone, Default)]
pub struct GroupState {
    pods: HashMap<String, PodCounter>,
    /// Pods sampled in the current cycle
    seen: HashSet<String>,
    /// Pods sampled in the previous cycle
    tracked: HashSet<String>,
    /// Replica count last applied (or read) for this group
    pub current_replicas: Option<u32>,
}

impl GroupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one counter sample for `pod`.
    ///
    /// A pod seen for the first time gets `previous = 0` and a synthetic
    /// timestamp one poll interval in the past.
    pub fn record(&mut self, pod: &str, value: i64, now: DateTime<Utc>, poll_interval: Duration) {
        self.seen.insert(pod.to_string());

        let entry = self.pods.entry(pod.to_string()).or_insert_with(|| PodCounter {
            previous: 0,
            current: 0,
            timestamp: now - to_chrono(poll_interval),
        });
        entry.current += value;
    }

    /// Compute the cycle's aggregate rate and roll every counter forward.
    ///
    /// Only pods present in both the previous and the current cycle are
    /// measured; samples with a non-positive elapsed time are skipped.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> RateSample {
        let mut rate = 0.0;
        let mut measured_pods = 0;

        for uid in self.tracked.intersection(&self.seen) {
            let Some(counter) = self.pods.get(uid) else {
                continue;
            };
            let elapsed = (now - counter.timestamp).num_milliseconds() as f64 / 1000.0;
            if elapsed <= 0.0 {
                continue;
            }
            rate += (counter.current - counter.previous) as f64 / elapsed;
            measured_pods += 1;
        }

        let seen = std::mem::take(&mut self.seen);
        self.pods.retain(|uid, _| seen.contains(uid));
        for counter in self.pods.values_mut() {
            counter.previous = counter.current;
            counter.current = 0;
            counter.timestamp = now;
        }
        let seen_pods = seen.len();
        self.tracked = seen;

        RateSample {
            rate,
            measured_pods,
            seen_pods,
        }
    }

    pub fn counter(&self, pod: &str) -> Option<&PodCounter> {
        self.pods.get(pod)
    }

    /// Number of pods with a stored history
    pub fn tracked_pods(&self) -> usize {
        self.pods.len()
    }
}

/// Per-group accumulator state owned by the poll loop
#[derive(Debug, Default)]
pub struct AccumulatorContext {
    groups: HashMap<String, GroupState>,
}

impl AccumulatorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `selector`, created on first sight
    pub fn group_mut(&mut self, selector: &LabelSelector) -> &mut GroupState {
        self.groups.entry(selector.to_string()).or_default()
    }

    pub fn group(&self, selector: &LabelSelector) -> Option<&GroupState> {
        self.groups.get(&selector.to_string())
    }
}

/// Mean per-series rate between two time windows.
///
/// Series missing from the old window count from zero. Returns `None` when
/// the new window is empty.
pub fn series_rate(
    new_window: &HashMap<String, i64>,
    old_window: &HashMap<String, i64>,
    poll_interval: Duration,
) -> Option<f64> {
    if new_window.is_empty() {
        return None;
    }

    let interval = poll_interval.as_secs_f64();
    let total: f64 = new_window
        .iter()
        .map(|(name, new)| {
            let old = old_window.get(name).copied().unwrap_or(0);
            (new - old) as f64 / interval
        })
        .sum();

    Some(total / new_window.len() as f64)
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
