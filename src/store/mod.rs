//! Persistence traits and records — subscriptions and the moderation log.
//!
//! The subscription store is owned by the front end; this engine only reads
//! policies from it (fresh on every tick). The audit log is append-only and
//! is the system of record for "did we already act": entries are written as
//! part of the same logical operation as the external side effect.

pub mod libsql_backend;

pub use libsql_backend::LibSqlStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Moderation action categories the classifier can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModAction {
    None,
    Deletion,
    Exile,
    Demotion,
    RankChange,
}

impl ModAction {
    /// Parse the classifier's lowercase action string. Unknown → `None`.
    pub fn parse(s: &str) -> Self {
        match s {
            "deletion" => Self::Deletion,
            "exile" => Self::Exile,
            "demotion" => Self::Demotion,
            "rankchange" => Self::RankChange,
            _ => Self::None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deletion => "deletion",
            Self::Exile => "exile",
            Self::Demotion => "demotion",
            Self::RankChange => "rankchange",
        }
    }
}

/// Which optional action categories are enabled for a group.
///
/// Deletion is always implicitly enabled and cannot be disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnabledActions {
    pub exiles: bool,
    pub demotions: bool,
    pub rank_changes: bool,
}

impl EnabledActions {
    pub fn all() -> Self {
        Self {
            exiles: true,
            demotions: true,
            rank_changes: true,
        }
    }

    /// Whether the given action category may execute under this policy.
    pub fn allows(&self, action: ModAction) -> bool {
        match action {
            ModAction::None | ModAction::Deletion => true,
            ModAction::Exile => self.exiles,
            ModAction::Demotion => self.demotions,
            ModAction::RankChange => self.rank_changes,
        }
    }

    /// Parse from the stored service-name list ("exiles", "demotions",
    /// "rankchanges"). "deletions" is accepted and ignored (always on).
    pub fn from_services<'a, I: IntoIterator<Item = &'a str>>(services: I) -> Self {
        let mut enabled = Self::default();
        for s in services {
            match s {
                "exiles" => enabled.exiles = true,
                "demotions" => enabled.demotions = true,
                "rankchanges" => enabled.rank_changes = true,
                _ => {}
            }
        }
        enabled
    }
}

/// Per-group moderation policy, re-read on every tick.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Natural-language moderation rule passed to the classifier.
    pub prompt: String,
    pub enabled: EnabledActions,
    /// Opaque reference to the front-end channel receiving notifications.
    pub notify_target: Option<String>,
}

/// Audit record kind. Rank changes are recorded as `Demotion` for taxonomy
/// uniformity (both are rank-affecting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Deletion,
    Exile,
    Demotion,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deletion => "deletion",
            Self::Exile => "exile",
            Self::Demotion => "demotion",
        }
    }
}

/// Append-only moderation audit record. Created exactly once per executed
/// action; never updated or deleted.
#[derive(Debug, Clone)]
pub struct ModerationLogEntry {
    pub kind: LogKind,
    pub group_id: u64,
    pub subject_user_id: u64,
    pub reason: String,
    /// The moderating account that performed the action.
    pub issuing_agent_id: u64,
    /// Human-readable detail: the offending post body plus any rank-change
    /// annotation.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Read side of the subscription store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Policy for a group, or `None` when the group has no active
    /// subscription (or no moderation prompt configured).
    async fn policy_for_group(&self, group_id: u64) -> Result<Option<Policy>, StoreError>;

    /// All group ids with an active subscription, for startup and
    /// reconciliation.
    async fn subscribed_groups(&self) -> Result<Vec<u64>, StoreError>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry, returning its generated id.
    async fn append_log(&self, entry: &ModerationLogEntry) -> Result<String, StoreError>;
}
