//! Configuration types.

use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between wall polls for each monitored group.
    pub poll_interval: Duration,
    /// Maximum number of posts fetched per poll (descending page size).
    pub fetch_limit: u32,
    /// Consecutive failed ticks before a monitor enters cooldown.
    pub error_backoff_threshold: u32,
    /// Cooldown applied once the threshold is crossed.
    pub error_cooldown: Duration,
    /// Delay between posts within one batch when the batch is large,
    /// to avoid hammering the feed's action endpoints.
    pub inter_post_delay: Duration,
    /// Batch size above which `inter_post_delay` applies.
    pub inter_post_delay_min_batch: usize,
    /// Shared classifier rate budget: maximum stored tokens.
    pub rate_capacity: f64,
    /// Shared classifier rate budget: tokens restored per minute.
    pub rate_refill_per_minute: f64,
    /// Interval for the subscribed-vs-monitored reconciliation job.
    pub reconcile_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            fetch_limit: 100,
            error_backoff_threshold: 3,
            error_cooldown: Duration::from_secs(30),
            inter_post_delay: Duration::from_secs(2),
            inter_post_delay_min_batch: 3,
            rate_capacity: 15.0,
            rate_refill_per_minute: 15.0,
            reconcile_interval: Duration::from_secs(300),
        }
    }
}
