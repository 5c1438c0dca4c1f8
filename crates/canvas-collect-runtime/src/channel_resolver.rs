//! Channel name resolution and bot-membership listing.
//!
//! Results are never cached across calls: membership changes are what turn a
//! requested channel into a skipped one, so every run re-reads the listing.

use std::collections::{HashMap, HashSet};

use canvas_collect_core::CollectResult;

use crate::backoff_gateway::ApiGateway;
use crate::slack_api::{SlackApi, SlackChannel};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedChannelNames {
    pub resolved: Vec<String>,
    pub not_found: Vec<String>,
}

pub struct ChannelResolver<'a> {
    api: &'a dyn SlackApi,
    gateway: &'a ApiGateway,
}

impl<'a> ChannelResolver<'a> {
    pub fn new(api: &'a dyn SlackApi, gateway: &'a ApiGateway) -> Self {
        Self { api, gateway }
    }

    /// Exact, case-sensitive name match against the visible channel listing.
    pub async fn resolve_names(&self, names: &[String]) -> CollectResult<ResolvedChannelNames> {
        if names.is_empty() {
            return Ok(ResolvedChannelNames::default());
        }

        let channels = self.list_all_channels().await?;
        let name_to_id = channels
            .into_iter()
            .filter_map(|channel| channel.name.map(|name| (name, channel.id)))
            .collect::<HashMap<_, _>>();

        let mut outcome = ResolvedChannelNames::default();
        for name in names {
            match name_to_id.get(name) {
                Some(id) => outcome.resolved.push(id.clone()),
                None => outcome.not_found.push(name.clone()),
            }
        }
        Ok(outcome)
    }

    /// Ids of every channel the bot is a member of.
    pub async fn list_accessible_channel_ids(&self) -> CollectResult<HashSet<String>> {
        let mut ids = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .gateway
                .call("users.conversations", || {
                    self.api.list_member_channels(cursor.as_deref())
                })
                .await?;
            ids.extend(page.items.into_iter().map(|channel| channel.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn list_all_channels(&self) -> CollectResult<Vec<SlackChannel>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .gateway
                .call("conversations.list", || {
                    self.api.list_channels(cursor.as_deref())
                })
                .await?;
            channels.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(channels)
    }
}
