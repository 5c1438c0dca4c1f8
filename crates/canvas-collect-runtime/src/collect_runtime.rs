//! End-to-end collection command flow: parse, validate, lock, collect, merge.

use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use canvas_collect_core::{
    check_quota, parse_command, CollectError, CollectResult, CollectionRequest, PlanTier,
    ResourceLock,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::backoff_gateway::{ApiGateway, RetryPolicy};
use crate::canvas_merger::{CanvasMerger, WorkspaceRef};
use crate::channel_resolver::ChannelResolver;
use crate::directory_lookups::{DirectoryLookups, SupportedLocale};
use crate::markdown_builder::{
    render_append_markdown, render_document_markdown, EnglishCatalog, MessageCatalog,
};
use crate::message_collector::{ChannelRef, CollectOptions, MessageCollector};
use crate::slack_api::SlackApi;
use crate::slack_api_client::SlackApiClient;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Runtime configuration for collection runs.
pub struct CanvasCollectConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub page_size: usize,
    pub lock_ttl_ms: u64,
    pub lock_sweep_interval_ms: u64,
    pub cache_ttl_ms: u64,
    pub cache_capacity: usize,
    pub plan_override: Option<PlanTier>,
    pub single_tenant: bool,
}

impl Default for CanvasCollectConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            bot_token: String::new(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1_000,
            page_size: 200,
            lock_ttl_ms: 180_000,
            lock_sweep_interval_ms: 60_000,
            cache_ttl_ms: 1_800_000,
            cache_capacity: 1_000,
            plan_override: None,
            single_tenant: true,
        }
    }
}

impl fmt::Debug for CanvasCollectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasCollectConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("page_size", &self.page_size)
            .field("lock_ttl_ms", &self.lock_ttl_ms)
            .field("cache_ttl_ms", &self.cache_ttl_ms)
            .field("cache_capacity", &self.cache_capacity)
            .field("plan_override", &self.plan_override)
            .field("single_tenant", &self.single_tenant)
            .finish()
    }
}

fn non_empty_env<'e>(env: &'e HashMap<String, String>, key: &str) -> Option<&'e str> {
    env.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

impl CanvasCollectConfig {
    /// Overlays environment values on top of the defaults.
    pub fn from_env_map(env: &HashMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(api_base) = non_empty_env(env, "SLACK_API_BASE") {
            config.api_base = api_base.to_string();
        }
        if let Some(bot_token) = non_empty_env(env, "SLACK_BOT_TOKEN") {
            config.bot_token = bot_token.to_string();
        }
        if let Some(raw) = non_empty_env(env, "PLAN_OVERRIDE") {
            match raw.parse::<PlanTier>() {
                Ok(tier) => config.plan_override = Some(tier),
                Err(error) => tracing::warn!(error = %error, "ignoring PLAN_OVERRIDE"),
            }
        }
        config.single_tenant = non_empty_env(env, "SLACK_CLIENT_ID").is_none();
        config
    }

    pub fn from_env() -> Self {
        Self::from_env_map(&std::env::vars().collect())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            call_timeout: Duration::from_millis(self.request_timeout_ms.max(1)),
        }
    }
}

/// Override first, then single-tenant installs, then the stored subscription.
pub fn resolve_plan_tier(config: &CanvasCollectConfig, stored: Option<PlanTier>) -> PlanTier {
    if let Some(tier) = config.plan_override {
        return tier;
    }
    if config.single_tenant {
        return PlanTier::Elevated;
    }
    stored.unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectInvocation {
    pub team_id: String,
    pub team_domain: String,
    /// Anchor channel: always collected, and where the canvas lives.
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub stored_tier: Option<PlanTier>,
}

/// Notified once the run holds its lock and is about to collect.
#[async_trait]
pub trait CollectionObserver: Send + Sync {
    async fn collection_started(&self, tag: &str, channel_count: usize);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl CollectionObserver for NoopObserver {
    async fn collection_started(&self, _tag: &str, _channel_count: usize) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectReport {
    Completed {
        tag: String,
        url: String,
        is_new: bool,
        item_count: usize,
        cap_hit_channels: Vec<String>,
        skipped: Vec<ChannelRef>,
        tier: PlanTier,
        locale: SupportedLocale,
    },
    NoResults {
        tag: String,
        skipped: Vec<ChannelRef>,
    },
}

pub struct CanvasCollectRuntime {
    api: Arc<dyn SlackApi>,
    gateway: ApiGateway,
    locks: Arc<ResourceLock>,
    lookups: DirectoryLookups,
    catalog: Arc<dyn MessageCatalog>,
    config: CanvasCollectConfig,
}

impl CanvasCollectRuntime {
    /// Must be called inside a tokio runtime; spawns the lock sweeper.
    pub fn new(api: Arc<dyn SlackApi>, config: CanvasCollectConfig) -> Self {
        let locks = ResourceLock::with_sweeper(
            Duration::from_millis(config.lock_ttl_ms),
            Duration::from_millis(config.lock_sweep_interval_ms),
        );
        let lookups = DirectoryLookups::new(
            Duration::from_millis(config.cache_ttl_ms),
            config.cache_capacity,
        );
        Self {
            api,
            gateway: ApiGateway::new(config.retry_policy()),
            locks,
            lookups,
            catalog: Arc::new(EnglishCatalog),
            config,
        }
    }

    /// Builds the HTTP-backed runtime; fails outside a tokio runtime instead of
    /// panicking when the lock sweeper is spawned.
    pub fn from_config(config: CanvasCollectConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            bail!("SLACK_BOT_TOKEN is required");
        }
        if tokio::runtime::Handle::try_current().is_err() {
            bail!("canvas collect runtime must be built inside a tokio runtime");
        }
        let client = SlackApiClient::new(
            config.api_base.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
        )?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn MessageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &CanvasCollectConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<ResourceLock> {
        &self.locks
    }

    pub fn lookups(&self) -> &DirectoryLookups {
        &self.lookups
    }

    pub async fn run(
        &self,
        invocation: &CollectInvocation,
        observer: &dyn CollectionObserver,
    ) -> CollectResult<CollectReport> {
        let parsed = parse_command(&invocation.text)?;
        let api = self.api.as_ref();

        let names = ChannelResolver::new(api, &self.gateway)
            .resolve_names(&parsed.channel_names)
            .await?;
        if !names.not_found.is_empty() {
            let missing = names
                .not_found
                .iter()
                .map(|name| format!("#{name}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CollectError::parse("error.channelNotFound").with_detail(missing));
        }

        let request = CollectionRequest::new(
            parsed.target_tag,
            iter::once(invocation.channel_id.clone())
                .chain(parsed.channel_ids)
                .chain(names.resolved),
            parsed.lookback_days,
        );
        let tier = resolve_plan_tier(&self.config, invocation.stored_tier);
        check_quota(&request, tier)?;
        let workspace = WorkspaceRef::new(&invocation.team_id, &invocation.team_domain)?;

        let lock_key = format!("{}:{}", invocation.team_id, request.target_tag);
        let Some(_guard) = self.locks.try_guard(&lock_key) else {
            tracing::info!(lock_key = lock_key.as_str(), "collection already running");
            return Err(CollectError::lock_conflict(&lock_key));
        };

        let tag = request.target_tag.as_str();
        let channel_count = request.channel_ids.len();
        observer.collection_started(tag, channel_count).await;

        let limits = tier.limits();
        let options = CollectOptions {
            lookback_days: request.lookback_days,
            max_items_per_channel: limits.max_items_per_channel,
            page_size: self.config.page_size,
            include_authors: true,
        };
        let outcome = MessageCollector::new(api, &self.gateway, &self.lookups)
            .collect(tag, &request.channel_ids, &options)
            .await?;

        if outcome.items.is_empty() {
            tracing::info!(tag, skipped = outcome.skipped.len(), "no matching messages");
            return Ok(CollectReport::NoResults {
                tag: tag.to_string(),
                skipped: outcome.skipped,
            });
        }

        let locale = self
            .lookups
            .user_locale(api, &self.gateway, &invocation.user_id)
            .await;
        let now = Utc::now();
        let catalog = self.catalog.as_ref();
        let new_markdown =
            render_document_markdown(tag, &outcome.items, channel_count, now, catalog, locale);
        let append_markdown =
            render_append_markdown(tag, &outcome.items, channel_count, now, catalog, locale);

        let upserted = CanvasMerger::new(api, &self.gateway, &workspace)
            .upsert(
                &invocation.channel_id,
                tag,
                &new_markdown,
                &append_markdown,
                limits.document_append,
            )
            .await?;

        tracing::info!(
            tag,
            tier = tier.as_str(),
            items = outcome.items.len(),
            is_new = upserted.is_new,
            "collection completed"
        );
        Ok(CollectReport::Completed {
            tag: tag.to_string(),
            url: upserted.url,
            is_new: upserted.is_new,
            item_count: outcome.items.len(),
            cap_hit_channels: outcome.cap_hit_channels(),
            skipped: outcome.skipped,
            tier,
            locale,
        })
    }

    /// Stops the lock sweeper; held keys stay held until released or expired.
    pub fn shutdown(&self) {
        self.locks.shutdown();
    }
}
