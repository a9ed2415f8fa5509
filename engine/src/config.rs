//! Engine configuration.

use crate::retry::RetryPolicy;

/// Configuration for the registration engine.
///
/// # Example
///
/// ```
/// use guestlist_engine::{EngineConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = EngineConfig::default().with_counter_retry(
///     RetryPolicy::default()
///         .with_max_retries(5)
///         .with_initial_delay(Duration::from_millis(10)),
/// );
/// assert_eq!(config.counter_retry.max_retries, 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Retry policy for counter increments/decrements that follow an
    /// irreversible ledger write. Exhaustion surfaces as
    /// `StoreInconsistency`.
    pub counter_retry: RetryPolicy,
}

impl EngineConfig {
    /// Set the counter retry policy.
    #[must_use]
    pub fn with_counter_retry(mut self, policy: RetryPolicy) -> Self {
        self.counter_retry = policy;
        self
    }
}
