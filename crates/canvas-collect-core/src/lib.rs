//! Foundational primitives for reaction collection runs.
//!
//! Provides the closed error taxonomy, Slack timestamp helpers, the bounded
//! TTL cache, the in-memory resource lock, plan quota checks and the
//! collection command parser.

pub mod command_parser;
pub mod error;
pub mod plan_policy;
pub mod resource_lock;
pub mod time_utils;
pub mod ttl_cache;

pub use command_parser::{parse_command, ParsedCommand, MAX_EXTRA_CHANNELS};
pub use error::{CollectError, CollectErrorKind, CollectResult};
pub use plan_policy::{check_quota, CollectionRequest, PlanTier, TierLimits};
pub use resource_lock::{ResourceLock, ResourceLockGuard, LOCK_SWEEP_INTERVAL, LOCK_TTL};
pub use time_utils::{
    compare_slack_ts, days_ago_to_slack_ts, format_date_only_utc, format_datetime_utc,
    format_time_utc, slack_ts_to_datetime,
};
pub use ttl_cache::{TtlCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
