//! Monitor registry — owns one polling task per monitored group.
//!
//! The registry is the single mutation point for the monitor map: the
//! duplicate-start check and the insert happen under one write lock, so two
//! concurrent `start` calls for the same group yield exactly one task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::monitor::task::{MonitorDeps, run_monitor};
use crate::store::SubscriptionStore;

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A live monitor already exists for the group; the request was a no-op.
    AlreadyMonitoring,
}

struct MonitorHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

/// Concurrency-safe registry of per-group monitors.
pub struct MonitorRegistry {
    deps: MonitorDeps,
    monitors: RwLock<HashMap<u64, MonitorHandle>>,
}

impl MonitorRegistry {
    pub fn new(deps: MonitorDeps) -> Self {
        Self {
            deps,
            monitors: RwLock::new(HashMap::new()),
        }
    }

    /// Start monitoring a group. A duplicate request is an observable no-op.
    pub async fn start(&self, group_id: u64) -> StartOutcome {
        let mut monitors = self.monitors.write().await;
        if monitors.contains_key(&group_id) {
            info!(group_id, "Already monitoring, skipping duplicate start");
            return StartOutcome::AlreadyMonitoring;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(run_monitor(
            group_id,
            self.deps.clone(),
            Arc::clone(&shutdown),
            Arc::clone(&stop),
        ));

        monitors.insert(
            group_id,
            MonitorHandle {
                handle,
                shutdown,
                stop,
            },
        );
        info!(group_id, total = monitors.len(), "Monitor registered");
        StartOutcome::Started
    }

    /// Start all groups not already monitored, concurrently. One group's
    /// outcome never affects the others; per-group results are returned.
    pub async fn start_many(&self, group_ids: &[u64]) -> Vec<(u64, StartOutcome)> {
        let outcomes =
            futures::future::join_all(group_ids.iter().map(|&g| self.start(g))).await;

        let started = outcomes
            .iter()
            .filter(|o| **o == StartOutcome::Started)
            .count();
        info!(
            requested = group_ids.len(),
            started,
            skipped = group_ids.len() - started,
            "Bulk monitor start complete"
        );
        group_ids.iter().copied().zip(outcomes).collect()
    }

    /// Stop a group's monitor. Idempotent: stopping a group that is not
    /// monitored is a no-op. A tick already in flight completes; no further
    /// ticks fire.
    pub async fn stop(&self, group_id: u64) {
        let removed = self.monitors.write().await.remove(&group_id);
        if let Some(monitor) = removed {
            monitor.shutdown.store(true, Ordering::Relaxed);
            monitor.stop.notify_one();
            info!(group_id, "Monitor stop requested");
        }
    }

    /// Currently monitored group ids, for diagnostics and reconciliation.
    pub async fn list(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.monitors.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Whether a group is currently monitored.
    pub async fn is_monitoring(&self, group_id: u64) -> bool {
        self.monitors.read().await.contains_key(&group_id)
    }

    /// Stop every monitor and wait for all tasks to drain.
    pub async fn shutdown(&self) {
        let drained: Vec<(u64, MonitorHandle)> =
            self.monitors.write().await.drain().collect();
        let count = drained.len();

        for (_, monitor) in &drained {
            monitor.shutdown.store(true, Ordering::Relaxed);
            monitor.stop.notify_one();
        }
        for (group_id, monitor) in drained {
            if let Err(e) = monitor.handle.await {
                warn!(group_id, error = %e, "Monitor task panicked during shutdown");
            }
        }
        info!(count, "All monitors drained");
    }

    /// Spawn the reconciliation job: periodically diff "currently subscribed"
    /// against "currently monitored" and start any gap.
    pub fn spawn_reconciler(
        self: &Arc<Self>,
        subscriptions: Arc<dyn SubscriptionStore>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first firing; startup already did start_many.
            tick.tick().await;
            loop {
                tick.tick().await;
                let subscribed = match subscriptions.subscribed_groups().await {
                    Ok(groups) => groups,
                    Err(e) => {
                        warn!(error = %e, "Reconciler could not list subscriptions");
                        continue;
                    }
                };

                let mut gap = Vec::new();
                for group_id in subscribed {
                    if !registry.is_monitoring(group_id).await {
                        gap.push(group_id);
                    }
                }
                if !gap.is_empty() {
                    info!(count = gap.len(), "Reconciler starting unmonitored groups");
                    registry.start_many(&gap).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::classifier::{ClassifierClient, PolicyModel, RateBudget};
    use crate::config::EngineConfig;
    use crate::dispatch::ActionDispatcher;
    use crate::error::{ClassifierError, FeedError, NotifyError, StoreError};
    use crate::feed::{FeedSource, GroupRole, SortOrder, WallPost};
    use crate::fetcher::WallFetcher;
    use crate::notify::{ModerationEvent, Notifier};
    use crate::store::{AuditStore, ModerationLogEntry, Policy, SubscriptionStore};

    struct EmptyFeed;

    #[async_trait]
    impl FeedSource for EmptyFeed {
        async fn recent_posts(
            &self,
            _: u64,
            _: SortOrder,
            _: u32,
        ) -> Result<Vec<WallPost>, FeedError> {
            Ok(Vec::new())
        }
        async fn remove_post(&self, _: u64, _: u64) -> Result<(), FeedError> {
            Ok(())
        }
        async fn remove_member(&self, _: u64, _: u64) -> Result<(), FeedError> {
            Ok(())
        }
        async fn set_member_role(&self, _: u64, _: u64, _: u64) -> Result<(), FeedError> {
            Ok(())
        }
        async fn list_roles(&self, _: u64) -> Result<Vec<GroupRole>, FeedError> {
            Ok(Vec::new())
        }
        async fn member_rank(&self, _: u64, _: u64) -> Result<u32, FeedError> {
            Ok(1)
        }
        async fn authenticated_user(&self) -> Result<u64, FeedError> {
            Ok(1)
        }
    }

    struct ApproveAll;

    #[async_trait]
    impl PolicyModel for ApproveAll {
        async fn generate(&self, _: &str) -> Result<String, ClassifierError> {
            Ok(r#"{"approved": true, "action": "none"}"#.into())
        }
    }

    struct NoSubs;

    #[async_trait]
    impl SubscriptionStore for NoSubs {
        async fn policy_for_group(&self, _: u64) -> Result<Option<Policy>, StoreError> {
            Ok(None)
        }
        async fn subscribed_groups(&self) -> Result<Vec<u64>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct NullAudit;

    #[async_trait]
    impl AuditStore for NullAudit {
        async fn append_log(&self, _: &ModerationLogEntry) -> Result<String, StoreError> {
            Ok("id".into())
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn publish(&self, _: &str, _: &ModerationEvent) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn deps() -> MonitorDeps {
        let feed: Arc<dyn FeedSource> = Arc::new(EmptyFeed);
        MonitorDeps {
            fetcher: Arc::new(WallFetcher::new(Arc::clone(&feed), 100)),
            classifier: Arc::new(ClassifierClient::new(
                Arc::new(ApproveAll),
                Arc::new(RateBudget::new(100.0, 6000.0)),
            )),
            dispatcher: Arc::new(ActionDispatcher::new(
                feed,
                Arc::new(NullAudit),
                Arc::new(NullNotifier),
                1,
            )),
            subscriptions: Arc::new(NoSubs),
            config: EngineConfig {
                poll_interval: Duration::from_millis(10),
                ..EngineConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn duplicate_start_is_observable_noop() {
        let registry = MonitorRegistry::new(deps());
        assert_eq!(registry.start(5).await, StartOutcome::Started);
        assert_eq!(registry.start(5).await, StartOutcome::AlreadyMonitoring);
        assert_eq!(registry.list().await, vec![5]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_starts_yield_one_task() {
        let registry = Arc::new(MonitorRegistry::new(deps()));
        let (a, b) = tokio::join!(registry.start(9), registry.start(9));
        let started = [a, b]
            .iter()
            .filter(|o| **o == StartOutcome::Started)
            .count();
        assert_eq!(started, 1);
        assert_eq!(registry.list().await.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn start_many_reports_partial_results() {
        let registry = MonitorRegistry::new(deps());
        registry.start(1).await;

        let outcomes = registry.start_many(&[1, 2, 3]).await;
        assert_eq!(outcomes[0], (1, StartOutcome::AlreadyMonitoring));
        assert_eq!(outcomes[1], (2, StartOutcome::Started));
        assert_eq!(outcomes[2], (3, StartOutcome::Started));
        assert_eq!(registry.list().await, vec![1, 2, 3]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let registry = MonitorRegistry::new(deps());
        registry.start(4).await;
        registry.stop(4).await;
        registry.stop(4).await; // no-op, not an error
        registry.stop(12345).await; // never existed
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn stopped_monitor_task_exits() {
        let registry = MonitorRegistry::new(deps());
        registry.start(6).await;

        let handle = {
            let mut monitors = registry.monitors.write().await;
            let monitor = monitors.remove(&6).unwrap();
            monitor.shutdown.store(true, Ordering::Relaxed);
            monitor.stop.notify_one();
            monitor.handle
        };
        // The task must end promptly even though its first tick is pending.
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not exit after stop")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_everything() {
        let registry = MonitorRegistry::new(deps());
        registry.start_many(&[1, 2, 3, 4]).await;
        registry.shutdown().await;
        assert!(registry.list().await.is_empty());
    }
}
