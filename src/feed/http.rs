//! HTTP feed client — cookie-authenticated access to the group platform API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::FeedError;
use crate::feed::{FeedSource, GroupRole, PostAuthor, SortOrder, WallPost};

/// Configuration for the HTTP feed client.
#[derive(Debug, Clone)]
pub struct HttpFeedConfig {
    /// API base, e.g. `https://groups.example.com`.
    pub base_url: String,
    /// Platform session cookie for the moderating account.
    pub cookie: SecretString,
}

/// Reqwest-backed [`FeedSource`].
pub struct HttpFeed {
    config: HttpFeedConfig,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(config: HttpFeedConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn cookie_header(&self) -> String {
        format!(".SECURITYTOKEN={}", self.config.cookie.expose_secret())
    }

    /// Issue a request and map transport/status failures to `FeedError`.
    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, FeedError> {
        let response = request
            .header(reqwest::header::COOKIE, self.cookie_header())
            .send()
            .await
            .map_err(|e| FeedError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                operation: operation.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

// ── Wire DTOs ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WallPage {
    data: Vec<WallPostDto>,
}

#[derive(Deserialize)]
struct WallPostDto {
    id: u64,
    body: String,
    poster: Option<PosterDto>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PosterDto {
    user: UserDto,
    role: RoleDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    user_id: u64,
    username: String,
}

#[derive(Deserialize)]
struct RoleDto {
    id: u64,
    name: String,
    rank: u32,
}

#[derive(Deserialize)]
struct RolesResponse {
    roles: Vec<RoleDto>,
}

#[derive(Deserialize)]
struct MembershipPage {
    data: Vec<MembershipDto>,
}

#[derive(Deserialize)]
struct MembershipDto {
    group: GroupRefDto,
    role: RoleDto,
}

#[derive(Deserialize)]
struct GroupRefDto {
    id: u64,
}

#[derive(Deserialize)]
struct AuthenticatedUserDto {
    id: u64,
}

impl WallPostDto {
    fn into_post(self) -> Option<WallPost> {
        // Posts by deleted accounts come back with a null poster; they
        // cannot be moderated at the user level, so drop them here.
        let poster = self.poster?;
        Some(WallPost {
            id: self.id,
            body: self.body,
            author: PostAuthor {
                user_id: poster.user.user_id,
                username: poster.user.username,
                role_name: poster.role.name,
                role_rank: poster.role.rank,
            },
            created_at: self.created,
            updated_at: self.updated,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn recent_posts(
        &self,
        group_id: u64,
        order: SortOrder,
        limit: u32,
    ) -> Result<Vec<WallPost>, FeedError> {
        let sort = match order {
            SortOrder::Ascending => "Asc",
            SortOrder::Descending => "Desc",
        };
        let url = self.url(&format!(
            "/v2/groups/{group_id}/wall/posts?sortOrder={sort}&limit={limit}"
        ));
        let page: WallPage = self
            .send("recent_posts", self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;

        Ok(page.data.into_iter().filter_map(WallPostDto::into_post).collect())
    }

    async fn remove_post(&self, group_id: u64, post_id: u64) -> Result<(), FeedError> {
        let url = self.url(&format!("/v1/groups/{group_id}/wall/posts/{post_id}"));
        self.send("remove_post", self.client.delete(url)).await?;
        Ok(())
    }

    async fn remove_member(&self, group_id: u64, user_id: u64) -> Result<(), FeedError> {
        let url = self.url(&format!("/v1/groups/{group_id}/users/{user_id}"));
        self.send("remove_member", self.client.delete(url)).await?;
        Ok(())
    }

    async fn set_member_role(
        &self,
        group_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), FeedError> {
        let url = self.url(&format!("/v1/groups/{group_id}/users/{user_id}"));
        let body = serde_json::json!({ "roleId": role_id });
        self.send("set_member_role", self.client.patch(url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_roles(&self, group_id: u64) -> Result<Vec<GroupRole>, FeedError> {
        let url = self.url(&format!("/v1/groups/{group_id}/roles"));
        let response: RolesResponse = self
            .send("list_roles", self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;

        Ok(response
            .roles
            .into_iter()
            .map(|r| GroupRole {
                id: r.id,
                name: r.name,
                rank: r.rank,
            })
            .collect())
    }

    async fn member_rank(&self, group_id: u64, user_id: u64) -> Result<u32, FeedError> {
        let url = self.url(&format!("/v2/users/{user_id}/groups/roles"));
        let page: MembershipPage = self
            .send("member_rank", self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;

        page.data
            .into_iter()
            .find(|m| m.group.id == group_id)
            .map(|m| m.role.rank)
            .ok_or(FeedError::NotAMember { group_id, user_id })
    }

    async fn authenticated_user(&self) -> Result<u64, FeedError> {
        let url = self.url("/v1/users/authenticated");
        let user: AuthenticatedUserDto = self
            .send("authenticated_user", self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
        Ok(user.id)
    }
}
