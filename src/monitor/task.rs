//! Per-group monitor loop — tick, fetch, classify, dispatch.
//!
//! Each monitored group gets one spawned task running this loop. The loop
//! body is sequential, so a tick that overruns the interval simply delays
//! the next firing instead of overlapping it: at most one fetch → classify
//! → dispatch pipeline is ever in flight per group, while different groups
//! proceed fully in parallel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::classifier::ClassifierClient;
use crate::config::EngineConfig;
use crate::dispatch::ActionDispatcher;
use crate::fetcher::WallFetcher;
use crate::store::SubscriptionStore;

/// Everything a monitor task needs; shared across all monitors.
#[derive(Clone)]
pub struct MonitorDeps {
    pub fetcher: Arc<WallFetcher>,
    pub classifier: Arc<ClassifierClient>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub config: EngineConfig,
}

/// Lifecycle state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Starting,
    Running,
    Stopping,
}

/// Mutable per-group state, owned exclusively by the task itself.
struct MonitorTask {
    group_id: u64,
    /// Highest post id already seen; `None` until the first non-empty fetch.
    cursor: Option<u64>,
    state: MonitorState,
    consecutive_errors: u32,
}

/// Run a group's monitor loop until `shutdown` is set (and `stop` poked).
///
/// The first tick fires one full interval after start, so starting many
/// groups together does not produce a thundering herd. A tick already in
/// flight when stop is requested runs to completion; no tick starts after.
pub async fn run_monitor(
    group_id: u64,
    deps: MonitorDeps,
    shutdown: Arc<AtomicBool>,
    stop: Arc<Notify>,
) {
    let mut task = MonitorTask {
        group_id,
        cursor: None,
        state: MonitorState::Starting,
        consecutive_errors: 0,
    };

    let period = deps.config.poll_interval;
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(group_id, interval_secs = period.as_secs_f64(), "Monitor started");
    task.state = MonitorState::Running;

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = stop.notified() => break,
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let ok = run_tick(&mut task, &deps).await;
        if ok {
            task.consecutive_errors = 0;
        } else {
            task.consecutive_errors += 1;
            if task.consecutive_errors > deps.config.error_backoff_threshold {
                warn!(
                    group_id,
                    consecutive_errors = task.consecutive_errors,
                    cooldown_secs = deps.config.error_cooldown.as_secs_f64(),
                    "Repeated failures, entering cooldown"
                );
                tokio::time::sleep(deps.config.error_cooldown).await;
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    task.state = MonitorState::Stopping;
    info!(group_id, state = ?task.state, "Monitor stopped");
}

/// One tick: fetch new posts, classify each, dispatch each.
///
/// Returns `true` only for a fully successful tick (no fetch error, no
/// per-post dispatch failure); anything less feeds the backoff counter.
/// Per-post problems never abort the rest of the batch.
async fn run_tick(task: &mut MonitorTask, deps: &MonitorDeps) -> bool {
    let group_id = task.group_id;

    let outcome = match deps.fetcher.fetch_new(group_id, task.cursor).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(group_id, error = %e, "Wall fetch failed");
            return false;
        }
    };

    // The cursor advances once the page is fetched, regardless of what
    // happens to the batch: a post that fails classification is not
    // reprocessed forever.
    task.cursor = outcome.cursor;

    if outcome.posts.is_empty() {
        debug!(group_id, cursor = ?task.cursor, "No new posts");
        return true;
    }

    info!(group_id, count = outcome.posts.len(), "New posts to moderate");

    // The policy is read fresh every tick so edits take effect on the next
    // poll without restarting the monitor.
    let policy = match deps.subscriptions.policy_for_group(group_id).await {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            warn!(group_id, "No policy configured; dropping batch unprocessed");
            return true;
        }
        Err(e) => {
            warn!(group_id, error = %e, "Policy lookup failed; dropping batch");
            return false;
        }
    };

    let pace = outcome.posts.len() >= deps.config.inter_post_delay_min_batch;
    let mut failures = 0usize;
    let mut actions = 0usize;

    for (i, post) in outcome.posts.iter().enumerate() {
        if pace && i > 0 {
            tokio::time::sleep(deps.config.inter_post_delay).await;
        }

        let verdict = deps.classifier.classify(&post.body, &policy.prompt).await;
        let result = deps.dispatcher.dispatch(group_id, &policy, post, &verdict).await;

        debug!(group_id, post_id = post.id, outcome = ?result, "Post processed");
        if result.is_failure() {
            failures += 1;
        }
        if matches!(result, crate::dispatch::PostOutcome::Executed { .. }) {
            actions += 1;
        }
    }

    info!(
        group_id,
        processed = outcome.posts.len(),
        actions,
        failures,
        "Tick complete"
    );
    failures == 0
}
