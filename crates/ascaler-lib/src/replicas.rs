//! Replica target computation

/// Replicas needed to serve `rate` requests/second when one pod serves
/// `capacity`, with one pod of headroom, capped at `max`.
///
/// Returns `None` when no scaling action should be taken: a non-finite rate
/// or a target that floors to zero or below (clock anomalies produce
/// negative deltas).
pub fn desired_replicas(rate: f64, capacity: u32, max: u32) -> Option<u32> {
    if capacity == 0 || !rate.is_finite() {
        return None;
    }

    let target = (rate / capacity as f64).floor() + 1.0;
    if target <= 0.0 {
        return None;
    }

    // Saturating cast, then cap
    Some((target.min(u32::MAX as f64) as u32).min(max))
}
