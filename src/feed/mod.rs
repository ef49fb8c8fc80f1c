//! Feed source abstraction — the external group-wall platform.
//!
//! The engine consumes the platform through this trait only; the HTTP
//! implementation lives in [`http`]. Tests substitute mock implementations.

pub mod http;

pub use http::HttpFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FeedError;

/// Page sort order for wall fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// The author of a wall post, as reported by the feed.
#[derive(Debug, Clone)]
pub struct PostAuthor {
    pub user_id: u64,
    pub username: String,
    pub role_name: String,
    pub role_rank: u32,
}

/// One immutable wall post. Never mutated locally; input to the classifier
/// and dispatcher only.
#[derive(Debug, Clone)]
pub struct WallPost {
    /// Monotonically increasing platform post id.
    pub id: u64,
    pub body: String,
    pub author: PostAuthor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One role in a group's rank ladder.
#[derive(Debug, Clone)]
pub struct GroupRole {
    pub id: u64,
    pub name: String,
    /// Ordinal rank number; higher means more senior.
    pub rank: u32,
}

/// External feed platform operations used by the engine.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Most recent wall posts for a group, up to `limit`, in `order`.
    async fn recent_posts(
        &self,
        group_id: u64,
        order: SortOrder,
        limit: u32,
    ) -> Result<Vec<WallPost>, FeedError>;

    /// Remove a wall post.
    async fn remove_post(&self, group_id: u64, post_id: u64) -> Result<(), FeedError>;

    /// Remove a member from the group.
    async fn remove_member(&self, group_id: u64, user_id: u64) -> Result<(), FeedError>;

    /// Set a member's role by role id.
    async fn set_member_role(
        &self,
        group_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), FeedError>;

    /// The group's role ladder (order unspecified; callers sort).
    async fn list_roles(&self, group_id: u64) -> Result<Vec<GroupRole>, FeedError>;

    /// A member's current rank number within the group.
    async fn member_rank(&self, group_id: u64, user_id: u64) -> Result<u32, FeedError>;

    /// The user id of the authenticated moderating account.
    async fn authenticated_user(&self) -> Result<u64, FeedError>;
}
