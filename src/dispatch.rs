//! Action dispatcher — turns a classification verdict into one idempotent,
//! logged side effect.
//!
//! Ordering guarantees, per post:
//! - at most one action category executes;
//! - the post is always removed before any user-level step (exile, demotion,
//!   rank set), so a user is never punished while the offending post stands;
//! - the audit entry is appended after the external action succeeds. A log
//!   failure after a successful action is reported but never retried against
//!   the external system.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::classifier::ClassificationResult;
use crate::error::DispatchError;
use crate::feed::{FeedSource, GroupRole, WallPost};
use crate::notify::{ModerationEvent, Notifier};
use crate::store::{AuditStore, LogKind, ModAction, ModerationLogEntry, Policy};

/// Hard ceiling on demotion depth, bounding the blast radius of a single
/// misclassification.
const MAX_DEMOTION_LEVELS: u32 = 3;

/// Default reason used when the classifier supplies none.
const DEFAULT_REASON: &str = "Violated group wall rules";

/// Per-post dispatch outcome.
#[derive(Debug)]
pub enum PostOutcome {
    /// The post passed the policy; nothing to do.
    Approved,
    /// Violation with no (or unknown) requested action; nothing executed.
    NoAction,
    /// The requested action category is not enabled for this group.
    SkippedDisabled { action: ModAction },
    /// The action executed and was logged.
    Executed { action: ModAction },
    /// The post was removed and that deletion logged, but the follow-up
    /// user-level step failed.
    DeletedOnly {
        intended: ModAction,
        error: DispatchError,
    },
    /// The action could not be executed at all.
    Failed {
        action: ModAction,
        error: DispatchError,
    },
}

impl PostOutcome {
    /// Whether this outcome counts against the monitor's error backoff.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::DeletedOnly { .. } | Self::Failed { .. })
    }
}

struct DemotionApplied {
    from: GroupRole,
    to: GroupRole,
    levels_applied: u32,
}

/// Maps classification verdicts to feed side effects, audit entries, and
/// notifications.
pub struct ActionDispatcher {
    feed: Arc<dyn FeedSource>,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn Notifier>,
    /// The moderating account, recorded on every audit entry.
    issuing_agent_id: u64,
}

impl ActionDispatcher {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn Notifier>,
        issuing_agent_id: u64,
    ) -> Self {
        Self {
            feed,
            audit,
            notifier,
            issuing_agent_id,
        }
    }

    /// Dispatch one post's verdict. Never panics and never propagates an
    /// error: every failure mode is folded into the returned outcome so one
    /// bad post cannot block the rest of its batch.
    pub async fn dispatch(
        &self,
        group_id: u64,
        policy: &Policy,
        post: &WallPost,
        verdict: &ClassificationResult,
    ) -> PostOutcome {
        if verdict.approved {
            return PostOutcome::Approved;
        }

        let action = verdict.action;
        if action == ModAction::None {
            info!(group_id, post_id = post.id, "Violation with no action requested");
            return PostOutcome::NoAction;
        }

        if !policy.enabled.allows(action) {
            info!(
                group_id,
                post_id = post.id,
                action = action.label(),
                "Skipping action: not enabled for this group"
            );
            return PostOutcome::SkippedDisabled { action };
        }

        let reason = if verdict.reason.is_empty() {
            DEFAULT_REASON.to_string()
        } else {
            verdict.reason.clone()
        };

        let result = match action {
            ModAction::Deletion => self.run_deletion(group_id, policy, post, &reason).await,
            ModAction::Exile => self.run_exile(group_id, policy, post, &reason).await,
            ModAction::Demotion => {
                self.run_demotion(group_id, policy, post, &reason, verdict.demotion_levels)
                    .await
            }
            ModAction::RankChange => {
                self.run_rank_change(group_id, policy, post, &reason, &verdict.target_rank_name)
                    .await
            }
            ModAction::None => unreachable!("handled above"),
        };

        match result {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(
                    group_id,
                    post_id = post.id,
                    action = action.label(),
                    error = %error,
                    "Action dispatch failed"
                );
                PostOutcome::Failed { action, error }
            }
        }
    }

    // ── Action handlers ─────────────────────────────────────────────

    async fn run_deletion(
        &self,
        group_id: u64,
        policy: &Policy,
        post: &WallPost,
        reason: &str,
    ) -> Result<PostOutcome, DispatchError> {
        info!(group_id, post_id = post.id, "Deleting post");
        self.feed.remove_post(group_id, post.id).await?;

        self.append_entry(LogKind::Deletion, group_id, post, reason, post.body.clone())
            .await;
        self.notify(group_id, policy, post, ModAction::Deletion, reason, None)
            .await;
        Ok(PostOutcome::Executed {
            action: ModAction::Deletion,
        })
    }

    async fn run_exile(
        &self,
        group_id: u64,
        policy: &Policy,
        post: &WallPost,
        reason: &str,
    ) -> Result<PostOutcome, DispatchError> {
        info!(
            group_id,
            post_id = post.id,
            user_id = post.author.user_id,
            "Exiling author"
        );
        self.feed.remove_post(group_id, post.id).await?;

        if let Err(e) = self.feed.remove_member(group_id, post.author.user_id).await {
            // The deletion stands on its own; log it and surface the exile
            // failure separately.
            self.append_entry(LogKind::Deletion, group_id, post, reason, post.body.clone())
                .await;
            return Ok(PostOutcome::DeletedOnly {
                intended: ModAction::Exile,
                error: DispatchError::ExileFailed {
                    user_id: post.author.user_id,
                    reason: e.to_string(),
                },
            });
        }

        self.append_entry(LogKind::Exile, group_id, post, reason, post.body.clone())
            .await;
        self.notify(group_id, policy, post, ModAction::Exile, reason, None)
            .await;
        Ok(PostOutcome::Executed {
            action: ModAction::Exile,
        })
    }

    async fn run_demotion(
        &self,
        group_id: u64,
        policy: &Policy,
        post: &WallPost,
        reason: &str,
        levels: u32,
    ) -> Result<PostOutcome, DispatchError> {
        self.feed.remove_post(group_id, post.id).await?;

        let applied = self
            .demote(group_id, post.author.user_id, levels)
            .await?;

        info!(
            group_id,
            user_id = post.author.user_id,
            from = %applied.from.name,
            to = %applied.to.name,
            levels = applied.levels_applied,
            "Demoted author"
        );

        let detail = if applied.levels_applied == 0 {
            format!("Already at lowest rank {}", applied.from.name)
        } else {
            format!(
                "Demoted from {} to {} ({} level{})",
                applied.from.name,
                applied.to.name,
                applied.levels_applied,
                if applied.levels_applied == 1 { "" } else { "s" }
            )
        };
        let message = format!("{}\n\n{detail}", post.body);
        self.append_entry(LogKind::Demotion, group_id, post, reason, message)
            .await;
        self.notify(group_id, policy, post, ModAction::Demotion, reason, Some(detail))
            .await;
        Ok(PostOutcome::Executed {
            action: ModAction::Demotion,
        })
    }

    async fn run_rank_change(
        &self,
        group_id: u64,
        policy: &Policy,
        post: &WallPost,
        reason: &str,
        target_rank_name: &str,
    ) -> Result<PostOutcome, DispatchError> {
        self.feed.remove_post(group_id, post.id).await?;

        let roles = self.feed.list_roles(group_id).await.map_err(DispatchError::Feed)?;
        let target = roles
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(target_rank_name));

        let Some(target) = target else {
            // Missing role: fall back to a single-level demotion rather than
            // leaving the author unpunished.
            warn!(
                group_id,
                target = target_rank_name,
                "Requested rank not found; falling back to single-level demotion"
            );
            let applied = self.demote(group_id, post.author.user_id, 1).await?;
            let detail = format!(
                "Rank \"{target_rank_name}\" not found; demoted from {} to {} instead",
                applied.from.name, applied.to.name
            );
            let message = format!("{}\n\n{detail}", post.body);
            self.append_entry(LogKind::Demotion, group_id, post, reason, message)
                .await;
            self.notify(group_id, policy, post, ModAction::RankChange, reason, Some(detail))
                .await;
            return Ok(PostOutcome::Executed {
                action: ModAction::RankChange,
            });
        };

        info!(
            group_id,
            user_id = post.author.user_id,
            target = %target.name,
            "Setting author rank"
        );
        self.feed
            .set_member_role(group_id, post.author.user_id, target.id)
            .await?;

        // Recorded under the demotion kind for audit-taxonomy uniformity.
        let detail = format!(
            "Rank changed from {} to {}",
            post.author.role_name, target.name
        );
        let message = format!("{}\n\n{detail}", post.body);
        self.append_entry(LogKind::Demotion, group_id, post, reason, message)
            .await;
        self.notify(group_id, policy, post, ModAction::RankChange, reason, Some(detail))
            .await;
        Ok(PostOutcome::Executed {
            action: ModAction::RankChange,
        })
    }

    /// Lower a member's rank by up to `levels` tiers, clamped to
    /// [`MAX_DEMOTION_LEVELS`] and floored at the lowest role.
    async fn demote(
        &self,
        group_id: u64,
        user_id: u64,
        levels: u32,
    ) -> Result<DemotionApplied, DispatchError> {
        let levels = levels.min(MAX_DEMOTION_LEVELS);

        let current_rank = self.feed.member_rank(group_id, user_id).await?;
        let mut roles = self.feed.list_roles(group_id).await?;
        roles.sort_by_key(|r| r.rank);

        let current_index = roles
            .iter()
            .position(|r| r.rank == current_rank)
            .ok_or_else(|| DispatchError::RankLadder {
                group_id,
                reason: format!("member rank {current_rank} not in role ladder"),
            })?;

        let target_index = current_index.saturating_sub(levels as usize);
        let levels_applied = (current_index - target_index) as u32;

        if levels_applied > 0 {
            self.feed
                .set_member_role(group_id, user_id, roles[target_index].id)
                .await?;
        }

        Ok(DemotionApplied {
            from: roles[current_index].clone(),
            to: roles[target_index].clone(),
            levels_applied,
        })
    }

    // ── Audit & notification ────────────────────────────────────────

    /// Append an audit entry for an already-performed action. Failure is
    /// reported and swallowed: the external action happened and must not be
    /// retried or rolled back over a logging problem.
    async fn append_entry(
        &self,
        kind: LogKind,
        group_id: u64,
        post: &WallPost,
        reason: &str,
        message: String,
    ) {
        let entry = ModerationLogEntry {
            kind,
            group_id,
            subject_user_id: post.author.user_id,
            reason: reason.to_string(),
            issuing_agent_id: self.issuing_agent_id,
            message,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.audit.append_log(&entry).await {
            error!(
                group_id,
                post_id = post.id,
                kind = kind.as_str(),
                error = %e,
                "Audit log append failed after successful action"
            );
        }
    }

    /// Best-effort notification; failures are logged only.
    async fn notify(
        &self,
        group_id: u64,
        policy: &Policy,
        post: &WallPost,
        action: ModAction,
        reason: &str,
        detail: Option<String>,
    ) {
        let Some(ref target) = policy.notify_target else {
            return;
        };

        let event = ModerationEvent {
            group_id,
            post_id: post.id,
            subject_user_id: post.author.user_id,
            subject_username: post.author.username.clone(),
            action: action.label().to_string(),
            reason: reason.to_string(),
            detail,
            evidence: String::new(),
            timestamp: Utc::now(),
        }
        .with_evidence(&post.body);

        if let Err(e) = self.notifier.publish(target, &event).await {
            warn!(target = %target, error = %e, "Notification publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::error::{FeedError, NotifyError, StoreError};
    use crate::feed::PostAuthor;
    use crate::store::EnabledActions;

    /// Scripted feed that records every mutating call.
    struct RecordingFeed {
        calls: Mutex<Vec<String>>,
        roles: Vec<GroupRole>,
        member_rank: u32,
        fail_remove_post: bool,
        fail_remove_member: bool,
    }

    impl RecordingFeed {
        fn new(roles: Vec<GroupRole>, member_rank: u32) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                roles,
                member_rank,
                fail_remove_post: false,
                fail_remove_member: false,
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for RecordingFeed {
        async fn recent_posts(
            &self,
            _: u64,
            _: crate::feed::SortOrder,
            _: u32,
        ) -> Result<Vec<WallPost>, FeedError> {
            Ok(Vec::new())
        }

        async fn remove_post(&self, group_id: u64, post_id: u64) -> Result<(), FeedError> {
            if self.fail_remove_post {
                return Err(FeedError::Http("post removal down".into()));
            }
            self.record(format!("remove_post:{group_id}:{post_id}"));
            Ok(())
        }

        async fn remove_member(&self, group_id: u64, user_id: u64) -> Result<(), FeedError> {
            if self.fail_remove_member {
                return Err(FeedError::Http("member removal down".into()));
            }
            self.record(format!("remove_member:{group_id}:{user_id}"));
            Ok(())
        }

        async fn set_member_role(
            &self,
            group_id: u64,
            user_id: u64,
            role_id: u64,
        ) -> Result<(), FeedError> {
            self.record(format!("set_member_role:{group_id}:{user_id}:{role_id}"));
            Ok(())
        }

        async fn list_roles(&self, _: u64) -> Result<Vec<GroupRole>, FeedError> {
            Ok(self.roles.clone())
        }

        async fn member_rank(&self, _: u64, _: u64) -> Result<u32, FeedError> {
            Ok(self.member_rank)
        }

        async fn authenticated_user(&self) -> Result<u64, FeedError> {
            Ok(999)
        }
    }

    #[derive(Default)]
    struct MemoryAudit {
        entries: Mutex<Vec<ModerationLogEntry>>,
    }

    #[async_trait]
    impl AuditStore for MemoryAudit {
        async fn append_log(&self, entry: &ModerationLogEntry) -> Result<String, StoreError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(format!("log-{}", self.entries.lock().unwrap().len()))
        }
    }

    #[derive(Default)]
    struct MemoryNotifier {
        events: Mutex<Vec<(String, ModerationEvent)>>,
    }

    #[async_trait]
    impl Notifier for MemoryNotifier {
        async fn publish(&self, target: &str, event: &ModerationEvent) -> Result<(), NotifyError> {
            self.events
                .lock()
                .unwrap()
                .push((target.to_string(), event.clone()));
            Ok(())
        }
    }

    // Four-tier ladder, ascending rank.
    fn ladder() -> Vec<GroupRole> {
        vec![
            GroupRole { id: 100, name: "Guest".into(), rank: 1 },
            GroupRole { id: 101, name: "Member".into(), rank: 10 },
            GroupRole { id: 102, name: "Officer".into(), rank: 100 },
            GroupRole { id: 103, name: "Admiral".into(), rank: 200 },
        ]
    }

    fn post() -> WallPost {
        WallPost {
            id: 77,
            body: "offending post".into(),
            author: PostAuthor {
                user_id: 42,
                username: "troublemaker".into(),
                role_name: "Member".into(),
                role_rank: 10,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn policy() -> Policy {
        Policy {
            prompt: "be nice".into(),
            enabled: EnabledActions::all(),
            notify_target: Some("chan-1".into()),
        }
    }

    fn verdict(action: ModAction) -> ClassificationResult {
        ClassificationResult {
            approved: false,
            action,
            reason: "rule broken".into(),
            demotion_levels: 1,
            target_rank_name: String::new(),
            degraded: false,
        }
    }

    struct Harness {
        feed: Arc<RecordingFeed>,
        audit: Arc<MemoryAudit>,
        notifier: Arc<MemoryNotifier>,
        dispatcher: ActionDispatcher,
    }

    fn harness_with(feed: RecordingFeed) -> Harness {
        let feed = Arc::new(feed);
        let audit = Arc::new(MemoryAudit::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let dispatcher = ActionDispatcher::new(
            Arc::clone(&feed) as Arc<dyn FeedSource>,
            Arc::clone(&audit) as Arc<dyn AuditStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            999,
        );
        Harness {
            feed,
            audit,
            notifier,
            dispatcher,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingFeed::new(ladder(), 10))
    }

    #[tokio::test]
    async fn approved_post_touches_nothing() {
        let h = harness();
        let mut v = verdict(ModAction::Exile);
        v.approved = true;

        let outcome = h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        assert!(matches!(outcome, PostOutcome::Approved));
        assert!(h.feed.calls().is_empty());
        assert!(h.audit.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn degraded_verdict_is_approved_and_inert() {
        let h = harness();
        let v = ClassificationResult::degraded_default();
        let outcome = h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        assert!(matches!(outcome, PostOutcome::Approved));
        assert!(h.feed.calls().is_empty());
    }

    #[tokio::test]
    async fn deletion_removes_logs_and_notifies() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(1, &policy(), &post(), &verdict(ModAction::Deletion))
            .await;

        assert!(matches!(
            outcome,
            PostOutcome::Executed { action: ModAction::Deletion }
        ));
        assert_eq!(h.feed.calls(), vec!["remove_post:1:77"]);

        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::Deletion);
        assert_eq!(entries[0].subject_user_id, 42);
        assert_eq!(entries[0].issuing_agent_id, 999);
        assert_eq!(entries[0].reason, "rule broken");

        let events = h.notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "chan-1");
        assert_eq!(events[0].1.action, "deletion");
    }

    #[tokio::test]
    async fn disabled_action_is_skipped_entirely() {
        let h = harness();
        let mut p = policy();
        p.enabled = EnabledActions::default(); // deletions only

        let outcome = h
            .dispatcher
            .dispatch(1, &p, &post(), &verdict(ModAction::Exile))
            .await;

        assert!(matches!(
            outcome,
            PostOutcome::SkippedDisabled { action: ModAction::Exile }
        ));
        // Not even the post deletion runs: the category as a whole is off.
        assert!(h.feed.calls().is_empty());
        assert!(h.audit.entries.lock().unwrap().is_empty());
        assert!(h.notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exile_removes_post_before_member() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(1, &policy(), &post(), &verdict(ModAction::Exile))
            .await;

        assert!(matches!(
            outcome,
            PostOutcome::Executed { action: ModAction::Exile }
        ));
        assert_eq!(
            h.feed.calls(),
            vec!["remove_post:1:77", "remove_member:1:42"]
        );
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries[0].kind, LogKind::Exile);
    }

    #[tokio::test]
    async fn exile_failure_after_deletion_logs_the_deletion() {
        let mut feed = RecordingFeed::new(ladder(), 10);
        feed.fail_remove_member = true;
        let h = harness_with(feed);

        let outcome = h
            .dispatcher
            .dispatch(1, &policy(), &post(), &verdict(ModAction::Exile))
            .await;

        match outcome {
            PostOutcome::DeletedOnly { intended, error } => {
                assert_eq!(intended, ModAction::Exile);
                assert!(matches!(error, DispatchError::ExileFailed { user_id: 42, .. }));
            }
            other => panic!("expected DeletedOnly, got {other:?}"),
        }
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::Deletion);
    }

    #[tokio::test]
    async fn demotion_clamps_levels_and_floors_at_lowest_rank() {
        // Author at Member (index 1); requested 5 levels must clamp to 3 and
        // floor at Guest (index 0), never going negative.
        let h = harness();
        let mut v = verdict(ModAction::Demotion);
        v.demotion_levels = 5;

        let outcome = h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        assert!(matches!(
            outcome,
            PostOutcome::Executed { action: ModAction::Demotion }
        ));
        assert_eq!(
            h.feed.calls(),
            vec!["remove_post:1:77", "set_member_role:1:42:100"]
        );
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries[0].kind, LogKind::Demotion);
        assert!(entries[0].message.contains("Guest"));
    }

    #[tokio::test]
    async fn multi_level_demotion_walks_the_ladder() {
        // Author at Admiral (rank 200, index 3); 2 levels lands on Member.
        let h = harness_with(RecordingFeed::new(ladder(), 200));
        let mut v = verdict(ModAction::Demotion);
        v.demotion_levels = 2;

        let outcome = h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        assert!(matches!(outcome, PostOutcome::Executed { .. }));
        assert_eq!(
            h.feed.calls(),
            vec!["remove_post:1:77", "set_member_role:1:42:101"]
        );
    }

    #[tokio::test]
    async fn demotion_at_floor_is_logged_but_sets_nothing() {
        // Author already at Guest (index 0): no role set, entry still appended.
        let h = harness_with(RecordingFeed::new(ladder(), 1));
        let outcome = h
            .dispatcher
            .dispatch(1, &policy(), &post(), &verdict(ModAction::Demotion))
            .await;

        assert!(matches!(
            outcome,
            PostOutcome::Executed { action: ModAction::Demotion }
        ));
        assert_eq!(h.feed.calls(), vec!["remove_post:1:77"]);
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("Already at lowest rank"));
    }

    #[tokio::test]
    async fn rank_change_matches_role_name_case_insensitively() {
        let h = harness();
        let mut v = verdict(ModAction::RankChange);
        v.target_rank_name = "oFFicer".into();

        let outcome = h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        assert!(matches!(
            outcome,
            PostOutcome::Executed { action: ModAction::RankChange }
        ));
        assert_eq!(
            h.feed.calls(),
            vec!["remove_post:1:77", "set_member_role:1:42:102"]
        );
        // Logged under the demotion kind for audit uniformity.
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries[0].kind, LogKind::Demotion);
        assert!(entries[0].message.contains("Rank changed from Member to Officer"));
    }

    #[tokio::test]
    async fn rank_change_miss_falls_back_to_single_demotion() {
        let h = harness();
        let mut v = verdict(ModAction::RankChange);
        v.target_rank_name = "Nonexistent".into();

        let outcome = h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        assert!(matches!(
            outcome,
            PostOutcome::Executed { action: ModAction::RankChange }
        ));
        // Member (index 1) demoted one level to Guest.
        assert_eq!(
            h.feed.calls(),
            vec!["remove_post:1:77", "set_member_role:1:42:100"]
        );
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries[0].kind, LogKind::Demotion);
        assert!(entries[0].message.contains("not found"));
    }

    #[tokio::test]
    async fn post_removal_failure_reports_failed_outcome() {
        let mut feed = RecordingFeed::new(ladder(), 10);
        feed.fail_remove_post = true;
        let h = harness_with(feed);

        let outcome = h
            .dispatcher
            .dispatch(1, &policy(), &post(), &verdict(ModAction::Deletion))
            .await;

        assert!(matches!(
            outcome,
            PostOutcome::Failed { action: ModAction::Deletion, .. }
        ));
        assert!(outcome.is_failure());
        assert!(h.audit.entries.lock().unwrap().is_empty());
        assert!(h.notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_notify_target_publishes_nothing() {
        let h = harness();
        let mut p = policy();
        p.notify_target = None;

        let outcome = h
            .dispatcher
            .dispatch(1, &p, &post(), &verdict(ModAction::Deletion))
            .await;
        assert!(matches!(outcome, PostOutcome::Executed { .. }));
        assert!(h.notifier.events.lock().unwrap().is_empty());
        // Audit entry still written.
        assert_eq!(h.audit.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_reason_gets_the_default() {
        let h = harness();
        let mut v = verdict(ModAction::Deletion);
        v.reason = String::new();

        h.dispatcher.dispatch(1, &policy(), &post(), &v).await;
        let entries = h.audit.entries.lock().unwrap();
        assert_eq!(entries[0].reason, DEFAULT_REASON);
    }
}
