//! Pagination engine that walks channel history and reply threads for
//! messages carrying a target reaction.
//!
//! Channels are traversed one after another. Each channel has its own item
//! budget; a thread draws from the remaining budget of its channel. Items
//! from different channels interleave freely during traversal and are put in
//! timestamp order once at the end.

use std::collections::{BTreeMap, HashSet};

use canvas_collect_core::{compare_slack_ts, days_ago_to_slack_ts, CollectResult};
use chrono::{DateTime, Utc};

use crate::backoff_gateway::ApiGateway;
use crate::channel_resolver::ChannelResolver;
use crate::directory_lookups::DirectoryLookups;
use crate::slack_api::{HistoryRequest, RepliesRequest, SlackApi, SlackMessage};

pub const HISTORY_PAGE_SIZE: usize = 200;
pub const TEXT_PREVIEW_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedItem {
    /// Slack `seconds.micros` timestamp of the message or reply.
    pub ts: String,
    pub channel_id: String,
    pub channel_name: String,
    /// Empty when the permalink lookup failed.
    pub permalink: String,
    pub author_name: Option<String>,
    pub text_preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub items: Vec<CollectedItem>,
    pub per_channel_cap_hit: BTreeMap<String, bool>,
    pub skipped: Vec<ChannelRef>,
}

impl CollectionOutcome {
    pub fn cap_hit_channels(&self) -> Vec<String> {
        self.per_channel_cap_hit
            .iter()
            .filter(|(_, hit)| **hit)
            .map(|(channel_id, _)| channel_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectOptions {
    /// `None` collects the whole history.
    pub lookback_days: Option<u32>,
    pub max_items_per_channel: usize,
    pub page_size: usize,
    /// Resolve author display names through the directory cache.
    pub include_authors: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            lookback_days: None,
            max_items_per_channel: 500,
            page_size: HISTORY_PAGE_SIZE,
            include_authors: true,
        }
    }
}

#[derive(Debug, Default)]
struct ChannelCollection {
    items: Vec<CollectedItem>,
    cap_hit: bool,
}

#[derive(Debug, Default)]
struct ThreadCollection {
    items: Vec<CollectedItem>,
    overflowed: bool,
}

struct ChannelScope<'s> {
    tag: &'s str,
    channel_id: &'s str,
    channel_name: &'s str,
    oldest: Option<&'s str>,
    options: &'s CollectOptions,
}

pub struct MessageCollector<'a> {
    api: &'a dyn SlackApi,
    gateway: &'a ApiGateway,
    lookups: &'a DirectoryLookups,
    now: Option<DateTime<Utc>>,
}

impl<'a> MessageCollector<'a> {
    pub fn new(
        api: &'a dyn SlackApi,
        gateway: &'a ApiGateway,
        lookups: &'a DirectoryLookups,
    ) -> Self {
        Self {
            api,
            gateway,
            lookups,
            now: None,
        }
    }

    /// Pins the reference time used to compute the lookback bound.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub async fn collect(
        &self,
        tag: &str,
        channel_ids: &[String],
        options: &CollectOptions,
    ) -> CollectResult<CollectionOutcome> {
        let accessible = ChannelResolver::new(self.api, self.gateway)
            .list_accessible_channel_ids()
            .await?;
        let now = self.now.unwrap_or_else(Utc::now);
        let oldest = options
            .lookback_days
            .and_then(|days| days_ago_to_slack_ts(days, now));

        let mut outcome = CollectionOutcome::default();
        let mut seen = HashSet::new();
        for channel_id in channel_ids {
            if !seen.insert(channel_id.as_str()) {
                continue;
            }
            if !accessible.contains(channel_id) {
                let skipped = self.channel_ref(channel_id).await;
                tracing::info!(
                    channel_id = channel_id.as_str(),
                    "skipping channel the bot is not a member of"
                );
                outcome.skipped.push(skipped);
                continue;
            }

            match self
                .collect_channel(tag, channel_id, oldest.as_deref(), options)
                .await
            {
                Ok(collected) => {
                    outcome
                        .per_channel_cap_hit
                        .insert(channel_id.clone(), collected.cap_hit);
                    outcome.items.extend(collected.items);
                }
                Err(error) if error.is_skippable() => {
                    tracing::info!(
                        channel_id = channel_id.as_str(),
                        error = %error,
                        "skipping inaccessible channel"
                    );
                    outcome.skipped.push(self.channel_ref(channel_id).await);
                }
                Err(error) => return Err(error),
            }
        }

        outcome
            .items
            .sort_by(|left, right| compare_slack_ts(&left.ts, &right.ts));
        tracing::debug!(
            tag,
            items = outcome.items.len(),
            skipped = outcome.skipped.len(),
            "collection finished"
        );
        Ok(outcome)
    }

    async fn collect_channel(
        &self,
        tag: &str,
        channel_id: &str,
        oldest: Option<&str>,
        options: &CollectOptions,
    ) -> CollectResult<ChannelCollection> {
        let channel_name = self.channel_name(channel_id).await;
        let scope = ChannelScope {
            tag,
            channel_id,
            channel_name: &channel_name,
            oldest,
            options,
        };
        let max_items = options.max_items_per_channel;
        let mut collected = ChannelCollection::default();
        let mut cursor: Option<String> = None;

        'pages: loop {
            let request = HistoryRequest {
                channel: channel_id.to_string(),
                oldest: oldest.map(ToOwned::to_owned),
                cursor: cursor.take(),
                limit: options.page_size.max(1),
            };
            let page = self
                .gateway
                .call("conversations.history", || self.api.channel_history(&request))
                .await?;

            for message in &page.items {
                if collected.items.len() >= max_items {
                    collected.cap_hit = true;
                    break 'pages;
                }
                let Some(ts) = message.ts.as_deref() else {
                    continue;
                };

                if message.has_reaction(tag) {
                    collected.items.push(self.build_item(&scope, message, ts).await);
                }

                if message.reply_count > 0 {
                    let remaining = max_items.saturating_sub(collected.items.len());
                    let thread = self.collect_thread(&scope, ts, remaining).await?;
                    collected.items.extend(thread.items);
                    if thread.overflowed {
                        collected.cap_hit = true;
                        break 'pages;
                    }
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if collected.cap_hit {
            tracing::info!(
                channel_id,
                max_items,
                "per-channel item cap reached"
            );
        }
        Ok(collected)
    }

    /// Collects matching replies oldest-first, never more than `remaining`.
    async fn collect_thread(
        &self,
        scope: &ChannelScope<'_>,
        thread_ts: &str,
        remaining: usize,
    ) -> CollectResult<ThreadCollection> {
        let mut collected = ThreadCollection::default();
        let mut cursor: Option<String> = None;

        'pages: loop {
            let request = RepliesRequest {
                channel: scope.channel_id.to_string(),
                thread_ts: thread_ts.to_string(),
                oldest: scope.oldest.map(ToOwned::to_owned),
                cursor: cursor.take(),
                limit: scope.options.page_size.max(1),
            };
            let page = self
                .gateway
                .call("conversations.replies", || self.api.thread_replies(&request))
                .await?;

            for reply in &page.items {
                let Some(ts) = reply.ts.as_deref() else {
                    continue;
                };
                if ts == thread_ts || !reply.has_reaction(scope.tag) {
                    continue;
                }
                if collected.items.len() >= remaining {
                    collected.overflowed = true;
                    break 'pages;
                }
                collected.items.push(self.build_item(scope, reply, ts).await);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(collected)
    }

    async fn build_item(
        &self,
        scope: &ChannelScope<'_>,
        message: &SlackMessage,
        ts: &str,
    ) -> CollectedItem {
        let permalink = self.permalink(scope.channel_id, ts).await;
        let author_name = match message.user.as_deref() {
            Some(user_id) if scope.options.include_authors => {
                self.lookups
                    .display_name(self.api, self.gateway, user_id)
                    .await
            }
            _ => None,
        };
        CollectedItem {
            ts: ts.to_string(),
            channel_id: scope.channel_id.to_string(),
            channel_name: scope.channel_name.to_string(),
            permalink,
            author_name,
            text_preview: message.text.as_deref().and_then(text_preview),
        }
    }

    async fn permalink(&self, channel_id: &str, ts: &str) -> String {
        match self
            .gateway
            .call("chat.getPermalink", || self.api.permalink(channel_id, ts))
            .await
        {
            Ok(permalink) => permalink,
            Err(error) => {
                tracing::debug!(channel_id, ts, error = %error, "permalink lookup failed");
                String::new()
            }
        }
    }

    async fn channel_name(&self, channel_id: &str) -> String {
        match self
            .gateway
            .call("conversations.info", || self.api.channel_info(channel_id))
            .await
        {
            Ok(channel) => channel
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| channel_id.to_string()),
            Err(error) => {
                tracing::debug!(channel_id, error = %error, "channel name lookup failed");
                channel_id.to_string()
            }
        }
    }

    async fn channel_ref(&self, channel_id: &str) -> ChannelRef {
        ChannelRef {
            id: channel_id.to_string(),
            name: self.channel_name(channel_id).await,
        }
    }
}

/// Single-line preview of message text, bounded to `TEXT_PREVIEW_MAX_CHARS`.
fn text_preview(text: &str) -> Option<String> {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.is_empty() {
        return None;
    }
    if flattened.chars().count() <= TEXT_PREVIEW_MAX_CHARS {
        return Some(flattened);
    }
    let mut preview = flattened
        .chars()
        .take(TEXT_PREVIEW_MAX_CHARS)
        .collect::<String>();
    preview.push('…');
    Some(preview)
}
