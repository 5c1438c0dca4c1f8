//! Slack Web API client over `reqwest`.
//!
//! Performs exactly one HTTP exchange per call. Retry and timeout policy
//! belong to [`crate::ApiGateway`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::slack_api::{
    CanvasFile, CreatedCanvas, HistoryRequest, Page, RepliesRequest, SlackApi, SlackApiError,
    SlackChannel, SlackMessage, SlackUser, RATE_LIMITED_CODE,
};

const CHANNEL_TYPES: &str = "public_channel,private_channel";
const CHANNEL_LIST_LIMIT: &str = "200";
const FILES_LIST_LIMIT: &str = "100";

#[derive(Debug, Clone, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<CanvasFile>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct PermalinkResponse {
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelInfoResponse {
    channel: SlackChannel,
}

#[derive(Debug, Clone, Deserialize)]
struct UserInfoResponse {
    user: SlackUser,
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl std::fmt::Debug for SlackApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackApiClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl SlackApiClient {
    pub fn new(api_base: String, bot_token: String, request_timeout_ms: u64) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("canvas-collect"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    fn get(&self, method: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/{method}", self.api_base))
            .bearer_auth(&self.bot_token)
    }

    fn post_json(&self, method: &str, payload: &Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(&self.bot_token)
            .json(payload)
    }

    async fn request_json<T>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|error| {
            let code = if error.is_timeout() {
                "request_timeout"
            } else {
                "transport_error"
            };
            SlackApiError::new(code, format!("slack api {operation} request failed: {error}"))
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SlackApiError::new(
                RATE_LIMITED_CODE,
                format!("slack api {operation} returned status 429"),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackApiError::new(
                format!("http_{}", status.as_u16()),
                format!(
                    "slack api {operation} failed with status {}: {}",
                    status.as_u16(),
                    truncate_for_error(&body, 800)
                ),
            ));
        }

        let envelope = response.json::<Value>().await.map_err(|error| {
            SlackApiError::new(
                "decode_error",
                format!("failed to decode slack {operation}: {error}"),
            )
        })?;
        if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = envelope
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(SlackApiError::new(
                code,
                format!("slack api {operation} failed: {code}"),
            ));
        }
        serde_json::from_value::<T>(envelope).map_err(|error| {
            SlackApiError::new(
                "decode_error",
                format!("failed to decode slack {operation}: {error}"),
            )
        })
    }

    async fn list_channel_page(
        &self,
        method: &str,
        cursor: Option<&str>,
    ) -> Result<Page<SlackChannel>, SlackApiError> {
        let mut request = self.get(method).query(&[
            ("types", CHANNEL_TYPES),
            ("limit", CHANNEL_LIST_LIMIT),
            ("exclude_archived", "true"),
        ]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response: ChannelListResponse = self.request_json(method, request).await?;
        Ok(Page::new(
            response.channels,
            response.response_metadata.next_cursor,
        ))
    }
}

#[async_trait]
impl SlackApi for SlackApiClient {
    async fn list_member_channels(
        &self,
        cursor: Option<&str>,
    ) -> Result<Page<SlackChannel>, SlackApiError> {
        self.list_channel_page("users.conversations", cursor).await
    }

    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<SlackChannel>, SlackApiError> {
        self.list_channel_page("conversations.list", cursor).await
    }

    async fn channel_history(
        &self,
        request: &HistoryRequest,
    ) -> Result<Page<SlackMessage>, SlackApiError> {
        let limit = request.limit.to_string();
        let mut builder = self.get("conversations.history").query(&[
            ("channel", request.channel.as_str()),
            ("limit", limit.as_str()),
        ]);
        if let Some(oldest) = request.oldest.as_deref() {
            builder = builder.query(&[("oldest", oldest)]);
        }
        if let Some(cursor) = request.cursor.as_deref() {
            builder = builder.query(&[("cursor", cursor)]);
        }
        let response: MessageListResponse =
            self.request_json("conversations.history", builder).await?;
        Ok(Page::new(
            response.messages,
            response.response_metadata.next_cursor,
        ))
    }

    async fn thread_replies(
        &self,
        request: &RepliesRequest,
    ) -> Result<Page<SlackMessage>, SlackApiError> {
        let limit = request.limit.to_string();
        let mut builder = self.get("conversations.replies").query(&[
            ("channel", request.channel.as_str()),
            ("ts", request.thread_ts.as_str()),
            ("limit", limit.as_str()),
        ]);
        if let Some(oldest) = request.oldest.as_deref() {
            builder = builder.query(&[("oldest", oldest)]);
        }
        if let Some(cursor) = request.cursor.as_deref() {
            builder = builder.query(&[("cursor", cursor)]);
        }
        let response: MessageListResponse =
            self.request_json("conversations.replies", builder).await?;
        Ok(Page::new(
            response.messages,
            response.response_metadata.next_cursor,
        ))
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, SlackApiError> {
        let builder = self
            .get("chat.getPermalink")
            .query(&[("channel", channel), ("message_ts", ts)]);
        let response: PermalinkResponse = self.request_json("chat.getPermalink", builder).await?;
        Ok(response.permalink.unwrap_or_default())
    }

    async fn channel_info(&self, channel: &str) -> Result<SlackChannel, SlackApiError> {
        let builder = self.get("conversations.info").query(&[("channel", channel)]);
        let response: ChannelInfoResponse =
            self.request_json("conversations.info", builder).await?;
        Ok(response.channel)
    }

    async fn user_info(&self, user: &str) -> Result<SlackUser, SlackApiError> {
        let builder = self
            .get("users.info")
            .query(&[("user", user), ("include_locale", "true")]);
        let response: UserInfoResponse = self.request_json("users.info", builder).await?;
        Ok(response.user)
    }

    async fn list_canvases(
        &self,
        channel: &str,
        cursor: Option<&str>,
    ) -> Result<Page<CanvasFile>, SlackApiError> {
        let mut builder = self.get("files.list").query(&[
            ("types", "canvas"),
            ("channel", channel),
            ("limit", FILES_LIST_LIMIT),
        ]);
        if let Some(cursor) = cursor {
            builder = builder.query(&[("cursor", cursor)]);
        }
        let response: FileListResponse = self.request_json("files.list", builder).await?;
        Ok(Page::new(
            response.files,
            response.response_metadata.next_cursor,
        ))
    }

    async fn create_canvas(
        &self,
        title: &str,
        channel: &str,
        markdown: &str,
    ) -> Result<CreatedCanvas, SlackApiError> {
        let payload = json!({
            "title": title,
            "channel_id": channel,
            "document_content": {
                "type": "markdown",
                "markdown": markdown,
            },
        });
        self.request_json("canvases.create", self.post_json("canvases.create", &payload))
            .await
    }

    async fn append_to_canvas(
        &self,
        canvas_id: &str,
        markdown: &str,
    ) -> Result<(), SlackApiError> {
        let payload = json!({
            "canvas_id": canvas_id,
            "changes": [{
                "operation": "insert_at_end",
                "document_content": {
                    "type": "markdown",
                    "markdown": markdown,
                },
            }],
        });
        let _: Value = self
            .request_json("canvases.edit", self.post_json("canvases.edit", &payload))
            .await?;
        Ok(())
    }

    async fn delete_canvas(&self, canvas_id: &str) -> Result<(), SlackApiError> {
        let payload = json!({ "canvas_id": canvas_id });
        let _: Value = self
            .request_json("canvases.delete", self.post_json("canvases.delete", &payload))
            .await?;
        Ok(())
    }
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
