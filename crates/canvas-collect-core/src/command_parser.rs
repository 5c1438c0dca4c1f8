//! Parser for collection command text such as `:check: <#C1|sales> last 7 days`.

use std::{num::IntErrorKind, sync::OnceLock};

use regex::Regex;

use crate::error::{CollectError, CollectErrorKind, CollectResult};

/// Extra channels allowed besides the anchor channel.
pub const MAX_EXTRA_CHANNELS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCommand {
    /// Reaction name without surrounding colons.
    pub target_tag: String,
    /// Ids from Slack-linked references `<#C123|name>`.
    pub channel_ids: Vec<String>,
    /// Plain `#name` references that still need resolving.
    pub channel_names: Vec<String>,
    pub lookback_days: Option<u32>,
}

fn linked_channel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<#(C[A-Z0-9]+)\|[^>]*>").expect("linked channel pattern"))
}

fn plain_channel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#([\w-]+)").expect("plain channel pattern"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^:([^:\s]+):$").expect("tag pattern"))
}

fn window_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)過去(\d+)日|\blast\s+(\d+)\s+days?\b").expect("window pattern")
    })
}

pub fn parse_command(text: &str) -> CollectResult<ParsedCommand> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CollectError::new(CollectErrorKind::NoTargetTag)
            .with_message_key("error.noEmoji"));
    }

    let mut tokens = trimmed.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    let target_tag = tag_pattern()
        .captures(first)
        .and_then(|captures| captures.get(1))
        .map(|tag| tag.as_str().to_string())
        .ok_or_else(|| CollectError::parse("error.invalidEmoji").with_detail(first))?;

    let remaining = tokens.collect::<Vec<_>>().join(" ");

    let channel_ids = linked_channel_pattern()
        .captures_iter(&remaining)
        .filter_map(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .collect::<Vec<_>>();

    let mut channel_names = Vec::new();
    if channel_ids.is_empty() {
        let without_windows = window_pattern().replace_all(&remaining, " ");
        channel_names = plain_channel_pattern()
            .captures_iter(&without_windows)
            .filter_map(|captures| captures.get(1))
            .map(|name| name.as_str().to_string())
            .collect();
    }

    let total_channels = channel_ids.len() + channel_names.len();
    if total_channels > MAX_EXTRA_CHANNELS {
        return Err(CollectError::parse("error.tooManyChannels")
            .with_detail(format!("channels={total_channels}")));
    }

    let windows = window_pattern()
        .captures_iter(&remaining)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|days| days.as_str().to_string())
        .collect::<Vec<_>>();
    if windows.len() > 1 {
        return Err(CollectError::new(CollectErrorKind::MultipleWindows)
            .with_message_key("error.multiplePeriods"));
    }

    let lookback_days = match windows.first() {
        Some(raw) => {
            // Counts too large for u32 saturate; the quota check and the
            // collector treat them as an unbounded window.
            let days = match raw.parse::<u32>() {
                Ok(days) => days,
                Err(error) if *error.kind() == IntErrorKind::PosOverflow => u32::MAX,
                Err(_) => 0,
            };
            if days == 0 {
                return Err(CollectError::parse("error.invalidPeriod").with_detail(raw.as_str()));
            }
            Some(days)
        }
        None => None,
    };

    Ok(ParsedCommand {
        target_tag,
        channel_ids,
        channel_names,
        lookback_days,
    })
}
