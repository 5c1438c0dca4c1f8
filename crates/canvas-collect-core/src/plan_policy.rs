//! Subscription tier limits and the pre-collection quota check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CollectError, CollectResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `PlanTier` values.
pub enum PlanTier {
    #[default]
    Basic,
    Elevated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub max_items_per_channel: usize,
    /// `None` means the lookback window is unbounded and optional.
    pub max_lookback_days: Option<u32>,
    pub multi_channel: bool,
    pub document_append: bool,
}

const BASIC_LIMITS: TierLimits = TierLimits {
    max_items_per_channel: 50,
    max_lookback_days: Some(30),
    multi_channel: false,
    document_append: false,
};

const ELEVATED_LIMITS: TierLimits = TierLimits {
    max_items_per_channel: 500,
    max_lookback_days: None,
    multi_channel: true,
    document_append: true,
};

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Elevated => "elevated",
        }
    }

    pub fn limits(self) -> &'static TierLimits {
        match self {
            Self::Basic => &BASIC_LIMITS,
            Self::Elevated => &ELEVATED_LIMITS,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    /// Accepts the tier names and the legacy `free` / `pro` labels.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" | "free" => Ok(Self::Basic),
            "elevated" | "pro" => Ok(Self::Elevated),
            other => Err(format!("unsupported plan tier '{other}'")),
        }
    }
}

/// Parsed collection request; the anchor channel counts as one of `channel_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    pub target_tag: String,
    pub channel_ids: Vec<String>,
    pub lookback_days: Option<u32>,
}

impl CollectionRequest {
    /// Builds a request with `channel_ids` deduplicated in first-seen order.
    pub fn new(
        target_tag: impl Into<String>,
        channel_ids: impl IntoIterator<Item = String>,
        lookback_days: Option<u32>,
    ) -> Self {
        let mut unique = Vec::new();
        for channel_id in channel_ids {
            if !unique.contains(&channel_id) {
                unique.push(channel_id);
            }
        }
        Self {
            target_tag: target_tag.into(),
            channel_ids: unique,
            lookback_days,
        }
    }
}

/// Validates `request` against `tier`; the multi-channel rule is reported first.
pub fn check_quota(request: &CollectionRequest, tier: PlanTier) -> CollectResult<()> {
    let limits = tier.limits();

    if !limits.multi_channel && request.channel_ids.len() > 1 {
        return Err(CollectError::plan_limit("error.planMultiChannel")
            .with_detail(format!("channels={}", request.channel_ids.len())));
    }

    if let Some(max_days) = limits.max_lookback_days {
        match request.lookback_days {
            Some(days) if days <= max_days => {}
            Some(days) => {
                return Err(CollectError::plan_limit("error.planPeriodTooLong")
                    .with_detail(format!("lookback_days={days} max={max_days}")));
            }
            None => {
                return Err(CollectError::plan_limit("error.planPeriodTooLong")
                    .with_detail(format!("lookback_days=unbounded max={max_days}")));
            }
        }
    }

    Ok(())
}
