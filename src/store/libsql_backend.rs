//! libSQL store backend — subscriptions read side and the moderation log.
//!
//! Supports local file and in-memory databases. The subscription table is
//! written by the front end; this engine only reads it. The moderation log
//! is append-only: no update or delete paths exist here by design.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    AuditStore, EnabledActions, LogKind, ModerationLogEntry, Policy, SubscriptionStore,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    group_id            INTEGER PRIMARY KEY,
    moderation_prompt   TEXT,
    services            TEXT NOT NULL DEFAULT '[]',
    notify_target       TEXT,
    active              INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS moderation_log (
    id                  TEXT PRIMARY KEY,
    kind                TEXT NOT NULL,
    group_id            INTEGER NOT NULL,
    subject_user_id     INTEGER NOT NULL,
    reason              TEXT NOT NULL,
    issuing_agent_id    INTEGER NOT NULL,
    message             TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_moderation_log_group
    ON moderation_log (group_id, created_at);
";

/// libSQL-backed [`SubscriptionStore`] and [`AuditStore`].
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to create database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        Ok(())
    }

    /// Insert or replace a subscription row. Used by tests and ops tooling;
    /// in production the front end owns this table.
    pub async fn put_subscription(
        &self,
        group_id: u64,
        prompt: Option<&str>,
        services: &[&str],
        notify_target: Option<&str>,
    ) -> Result<(), StoreError> {
        let services_json = serde_json::to_string(services)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO subscriptions
                    (group_id, moderation_prompt, services, notify_target, active)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![group_id as i64, prompt, services_json, notify_target],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put_subscription: {e}")))?;
        Ok(())
    }

    /// Audit entries for a group, newest first. Diagnostics only; the engine
    /// itself never reads the log back.
    pub async fn logs_for_group(
        &self,
        group_id: u64,
        limit: usize,
    ) -> Result<Vec<ModerationLogEntry>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT kind, group_id, subject_user_id, reason, issuing_agent_id,
                        message, created_at
                 FROM moderation_log
                 WHERE group_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
                params![group_id as i64, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("logs_for_group: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("logs_for_group: {e}")))?
        {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }
}

fn parse_kind(s: &str) -> LogKind {
    match s {
        "exile" => LogKind::Exile,
        "demotion" => LogKind::Demotion,
        _ => LogKind::Deletion,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn row_to_entry(row: &libsql::Row) -> Result<ModerationLogEntry, StoreError> {
    let get_err = |e: libsql::Error| StoreError::Query(format!("row parse: {e}"));
    let kind_str: String = row.get(0).map_err(get_err)?;
    let group_id: i64 = row.get(1).map_err(get_err)?;
    let subject_user_id: i64 = row.get(2).map_err(get_err)?;
    let reason: String = row.get(3).map_err(get_err)?;
    let issuing_agent_id: i64 = row.get(4).map_err(get_err)?;
    let message: String = row.get(5).map_err(get_err)?;
    let created_str: String = row.get(6).map_err(get_err)?;

    Ok(ModerationLogEntry {
        kind: parse_kind(&kind_str),
        group_id: group_id as u64,
        subject_user_id: subject_user_id as u64,
        reason,
        issuing_agent_id: issuing_agent_id as u64,
        message,
        timestamp: parse_datetime(&created_str),
    })
}

#[async_trait]
impl SubscriptionStore for LibSqlStore {
    async fn policy_for_group(&self, group_id: u64) -> Result<Option<Policy>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT moderation_prompt, services, notify_target
                 FROM subscriptions
                 WHERE group_id = ?1 AND active = 1",
                params![group_id as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("policy_for_group: {e}")))?;

        let row = match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("policy_for_group: {e}")))?
        {
            Some(row) => row,
            None => return Ok(None),
        };

        let prompt: Option<String> = row
            .get(0)
            .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
        // A subscription without a moderation prompt cannot classify posts.
        let Some(prompt) = prompt.filter(|p| !p.is_empty()) else {
            return Ok(None);
        };

        let services_json: String = row
            .get(1)
            .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
        let services: Vec<String> = serde_json::from_str(&services_json)
            .map_err(|e| StoreError::Serialization(format!("services column: {e}")))?;
        let notify_target: Option<String> = row
            .get(2)
            .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;

        Ok(Some(Policy {
            prompt,
            enabled: EnabledActions::from_services(services.iter().map(String::as_str)),
            notify_target,
        }))
    }

    async fn subscribed_groups(&self) -> Result<Vec<u64>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT group_id FROM subscriptions
                 WHERE active = 1 AND moderation_prompt IS NOT NULL
                 ORDER BY group_id",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("subscribed_groups: {e}")))?;

        let mut groups = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("subscribed_groups: {e}")))?
        {
            let id: i64 = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
            groups.push(id as u64);
        }
        Ok(groups)
    }
}

#[async_trait]
impl AuditStore for LibSqlStore {
    async fn append_log(&self, entry: &ModerationLogEntry) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO moderation_log
                    (id, kind, group_id, subject_user_id, reason,
                     issuing_agent_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.clone(),
                    entry.kind.as_str(),
                    entry.group_id as i64,
                    entry.subject_user_id as i64,
                    entry.reason.as_str(),
                    entry.issuing_agent_id as i64,
                    entry.message.as_str(),
                    entry.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_log: {e}")))?;

        debug!(id = %id, kind = entry.kind.as_str(), group_id = entry.group_id, "Audit entry appended");
        Ok(id)
    }
}
