//! Remote API contract consumed by the collection components.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Web API error code that triggers backoff retries.
pub const RATE_LIMITED_CODE: &str = "ratelimited";

/// Structured remote failure carrying the machine-readable Web API code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("slack api error {code}: {message}")]
pub struct SlackApiError {
    pub code: String,
    pub message: String,
}

impl SlackApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error carrying only a code, as returned by an `ok: false` envelope.
    pub fn code(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            message: code.clone(),
            code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Builds a page, treating an empty or blank cursor as the last page.
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.filter(|cursor| !cursor.trim().is_empty()),
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackReaction {
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub reactions: Vec<SlackReaction>,
}

impl SlackMessage {
    pub fn has_reaction(&self, tag: &str) -> bool {
        self.reactions.iter().any(|reaction| reaction.name == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlackUserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub profile: SlackUserProfile,
}

impl SlackUser {
    /// Profile display name, then real name, then handle; blanks are skipped.
    pub fn preferred_name(&self) -> Option<String> {
        [
            self.profile.display_name.as_deref(),
            self.profile.real_name.as_deref(),
            self.real_name.as_deref(),
            self.name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(ToOwned::to_owned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasFile {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreatedCanvas {
    #[serde(default)]
    pub canvas_id: Option<String>,
    #[serde(default)]
    pub canvas_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub channel: String,
    pub oldest: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepliesRequest {
    pub channel: String,
    pub thread_ts: String,
    pub oldest: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

#[async_trait]
/// Trait contract for the Slack Web API calls used by collection runs.
pub trait SlackApi: Send + Sync {
    /// Channels the bot is a member of (`users.conversations`).
    async fn list_member_channels(
        &self,
        cursor: Option<&str>,
    ) -> Result<Page<SlackChannel>, SlackApiError>;

    /// Channels visible to the bot (`conversations.list`).
    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<SlackChannel>, SlackApiError>;

    async fn channel_history(
        &self,
        request: &HistoryRequest,
    ) -> Result<Page<SlackMessage>, SlackApiError>;

    /// Thread replies; the first item is usually the thread root.
    async fn thread_replies(
        &self,
        request: &RepliesRequest,
    ) -> Result<Page<SlackMessage>, SlackApiError>;

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, SlackApiError>;

    async fn channel_info(&self, channel: &str) -> Result<SlackChannel, SlackApiError>;

    async fn user_info(&self, user: &str) -> Result<SlackUser, SlackApiError>;

    /// Canvas files shared in `channel` (`files.list` with `types=canvas`).
    async fn list_canvases(
        &self,
        channel: &str,
        cursor: Option<&str>,
    ) -> Result<Page<CanvasFile>, SlackApiError>;

    async fn create_canvas(
        &self,
        title: &str,
        channel: &str,
        markdown: &str,
    ) -> Result<CreatedCanvas, SlackApiError>;

    /// Appends markdown via a `canvases.edit` `insert_at_end` change.
    async fn append_to_canvas(&self, canvas_id: &str, markdown: &str)
        -> Result<(), SlackApiError>;

    async fn delete_canvas(&self, canvas_id: &str) -> Result<(), SlackApiError>;
}
