//! Wall fetcher — retrieves new posts and maintains the per-group cursor.
//!
//! The cursor is the highest post id already seen for a group. It advances
//! unconditionally once a page has been fetched, even if downstream
//! processing of the batch later fails in part: a post that fails
//! classification must not be reprocessed forever.

use std::sync::Arc;

use tracing::debug;

use crate::error::FeedError;
use crate::feed::{FeedSource, SortOrder, WallPost};

/// Result of one fetch: posts ordered oldest-first and the advanced cursor.
#[derive(Debug)]
pub struct FetchOutcome {
    /// New posts, oldest first. Empty on a baseline or no-op tick.
    pub posts: Vec<WallPost>,
    /// The new cursor. `None` only if the feed has never returned a post.
    pub cursor: Option<u64>,
}

/// Fetches new wall posts for a group, deduplicated by monotonic post id.
pub struct WallFetcher {
    feed: Arc<dyn FeedSource>,
    fetch_limit: u32,
}

impl WallFetcher {
    pub fn new(feed: Arc<dyn FeedSource>, fetch_limit: u32) -> Self {
        Self { feed, fetch_limit }
    }

    /// Fetch posts newer than `cursor`, oldest first.
    ///
    /// A `None` cursor means this is the group's first poll: it establishes
    /// a baseline at the newest visible post and emits nothing, so the
    /// historical backlog is never replayed through moderation.
    pub async fn fetch_new(
        &self,
        group_id: u64,
        cursor: Option<u64>,
    ) -> Result<FetchOutcome, FeedError> {
        let page = self
            .feed
            .recent_posts(group_id, SortOrder::Descending, self.fetch_limit)
            .await?;

        let Some(max_id) = page.iter().map(|p| p.id).max() else {
            // Empty page: no-op tick, cursor unchanged. On a group whose
            // wall is empty at the first poll this keeps the cursor at None,
            // so the first post ever written becomes the baseline instead of
            // being classified. Deliberate: the baseline is always drawn from
            // observed posts, never synthesized.
            return Ok(FetchOutcome {
                posts: Vec::new(),
                cursor,
            });
        };

        let Some(cursor) = cursor else {
            debug!(group_id, baseline = max_id, "First poll, establishing cursor baseline");
            return Ok(FetchOutcome {
                posts: Vec::new(),
                cursor: Some(max_id),
            });
        };

        let mut posts: Vec<WallPost> = page.into_iter().filter(|p| p.id > cursor).collect();
        // Downstream processing must preserve chronological causality.
        posts.sort_by_key(|p| p.id);

        Ok(FetchOutcome {
            posts,
            cursor: Some(max_id.max(cursor)),
        })
    }
}
