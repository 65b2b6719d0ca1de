//! Failure taxonomy for a poll cycle

use thiserror::Error;

/// Errors surfaced by metric sources, the scaler and the poll driver.
///
/// Fatal errors end the poll loop; everything else is logged and the next
/// tick retries from scratch.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// Invalid startup configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// An aggregate query failed (pod list, replica read, store query)
    #[error("query failed: {0:#}")]
    Query(anyhow::Error),

    /// One management endpoint could not be read
    #[error("failed to fetch stats from {endpoint}: {cause:#}")]
    Fetch {
        endpoint: String,
        cause: anyhow::Error,
    },

    /// A response did not have the expected shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Writing to the orchestrator failed (replica update, pod label, pod delete)
    #[error("orchestrator update failed: {0:#}")]
    Mutation(anyhow::Error),

    /// The drain loop ran out of passes before reaching its target
    #[error("drain stalled after {passes} passes: removed {removed}, {remaining} still to remove")]
    DrainStalled {
        removed: u32,
        remaining: u32,
        passes: u32,
    },
}

impl ScaleError {
    /// Whether this error should end the poll loop under the reference policy
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScaleError::Config(_) | ScaleError::Mutation(_))
    }

    /// Whether this error came from an orchestrator write
    pub fn is_mutation(&self) -> bool {
        matches!(self, ScaleError::Mutation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ScaleError::Config("bad".into()).is_fatal());
        assert!(ScaleError::Mutation(anyhow::anyhow!("boom")).is_fatal());
        assert!(!ScaleError::Query(anyhow::anyhow!("down")).is_fatal());
        assert!(!ScaleError::Decode("not a number".into()).is_fatal());
        assert!(!ScaleError::DrainStalled {
            removed: 1,
            remaining: 2,
            passes: 10
        }
        .is_fatal());
    }

    #[test]
    fn test_display_includes_context_chain() {
        let err = ScaleError::Query(anyhow::anyhow!("connection refused").context("list pods"));
        let text = err.to_string();
        assert!(text.contains("list pods"));
        assert!(text.contains("connection refused"));
    }
}
