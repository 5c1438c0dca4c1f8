//! Slack-facing collection runtime for reaction-tagged messages.
//!
//! Wires the remote API client, the backoff gateway, channel resolution,
//! message collection and canvas upserts into one collection command flow.

pub mod backoff_gateway;
pub mod canvas_merger;
pub mod channel_resolver;
pub mod collect_runtime;
pub mod directory_lookups;
pub mod markdown_builder;
pub mod message_collector;
pub mod slack_api;
pub mod slack_api_client;

#[cfg(test)]
mod test_support;

pub use backoff_gateway::{classify_api_error, retry_delay, ApiGateway, RetryPolicy};
pub use canvas_merger::{canvas_title, CanvasMerger, UpsertOutcome, WorkspaceRef};
pub use channel_resolver::{ChannelResolver, ResolvedChannelNames};
pub use collect_runtime::{
    resolve_plan_tier, CanvasCollectConfig, CanvasCollectRuntime, CollectInvocation,
    CollectReport, CollectionObserver, NoopObserver,
};
pub use directory_lookups::{resolve_locale, DirectoryLookups, SupportedLocale};
pub use markdown_builder::{
    render_append_markdown, render_document_markdown, EnglishCatalog, MessageCatalog,
};
pub use message_collector::{
    ChannelRef, CollectOptions, CollectedItem, CollectionOutcome, MessageCollector,
    TEXT_PREVIEW_MAX_CHARS,
};
pub use slack_api::{
    CanvasFile, CreatedCanvas, HistoryRequest, Page, RepliesRequest, SlackApi, SlackApiError,
    SlackChannel, SlackMessage, SlackReaction, SlackUser, SlackUserProfile,
};
pub use slack_api_client::SlackApiClient;
