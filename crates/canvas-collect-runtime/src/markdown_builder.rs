//! Canvas markdown rendering and the translation lookup it renders through.

use std::borrow::Cow;
use std::sync::OnceLock;

use canvas_collect_core::{
    format_date_only_utc, format_datetime_utc, format_time_utc, slack_ts_to_datetime,
};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};

use crate::directory_lookups::SupportedLocale;
use crate::message_collector::CollectedItem;

/// Translation lookup keyed by message key with `{{name}}` placeholders.
pub trait MessageCatalog: Send + Sync {
    /// Raw template for `key`, or `None` when the catalog has no entry.
    fn template(&self, locale: SupportedLocale, key: &str) -> Option<&str>;

    /// Renders `key` with `params`; unknown keys render as the key itself and
    /// unknown placeholders are left untouched.
    fn t(&self, locale: SupportedLocale, key: &str, params: &[(&str, String)]) -> String {
        match self.template(locale, key) {
            Some(template) => interpolate(template, params).into_owned(),
            None => key.to_string(),
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid placeholder regex"))
}

fn interpolate<'t>(template: &'t str, params: &[(&str, String)]) -> Cow<'t, str> {
    if params.is_empty() {
        return Cow::Borrowed(template);
    }
    placeholder_regex().replace_all(template, |captures: &Captures<'_>| {
        let name = &captures[1];
        params
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| captures[0].to_string())
    })
}

const ENGLISH_MESSAGES: &[(&str, &str)] = &[
    ("collecting.message", "Collecting :{{emoji}}: messages from {{channelCount}} channels..."),
    ("completion.header", "Collection complete"),
    ("completion.body", "Collected {{count}} messages. <{{canvasUrl}}|View canvas>"),
    (
        "completion.limitWarning",
        "Some channels hit the item limit. Narrow the period and try again, e.g. `:{{emoji}}: {{periodExample}}`",
    ),
    ("completion.skippedChannels", "Skipped (bot not a member): {{channels}}"),
    ("noResult.message", "No matching messages found"),
    ("lock.conflict", "A collection for :{{emoji}}: is already running. Please try again shortly"),
    ("error.noEmoji", "Please specify an emoji, e.g. `:thumbsup:`"),
    ("error.invalidEmoji", "`{{token}}` is not a valid emoji. Use the `:emoji:` format"),
    ("error.tooManyChannels", "You can specify up to 9 channels (10 including the current channel)"),
    ("error.multiplePeriods", "Only one period can be specified"),
    ("error.invalidPeriod", "Period must be at least 1 day"),
    ("error.channelNotFound", "Channel {{channels}} not found"),
    ("error.invalidTeamDomain", "The workspace domain is not valid"),
    ("error.planMultiChannel", "Collecting from several channels requires the elevated plan"),
    ("error.planPeriodTooLong", "Specify a period of at most {{maxDays}} days on your plan"),
    ("error.missingScope", "The app is missing required permissions. Ask an admin to reinstall it"),
    ("error.authInvalid", "The app authentication is invalid. Ask an admin to reinstall it"),
    ("error.authError", "An authentication error occurred. Please contact an admin"),
    ("error.rateLimited", "The API is busy. Please wait and try again"),
    ("error.notInChannel", "The bot is not a member of this channel"),
    ("error.channelNotFoundApi", "The specified channel was not found"),
    ("error.canvasEditFailed", "No permission to edit the canvas. Check with the channel admin"),
    ("error.canvasCreateFailed", "Failed to create the canvas. Please try again later"),
    ("error.unknown", "An unexpected error occurred: {{code}}"),
    ("command.periodExample", "last 7 days"),
    ("markdown.heading", ":{{emoji}}: Collection Results"),
    ("markdown.lastUpdated", "Last updated: {{datetime}}"),
    ("markdown.messageCount", "Messages collected: {{count}}"),
    ("markdown.targetChannels", "Target channels: {{count}}"),
    ("markdown.viewMessage", ":link: View message"),
    ("markdown.linkFailed", "(link unavailable)"),
];

/// English catalog used for every locale that has no dedicated table.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishCatalog;

impl MessageCatalog for EnglishCatalog {
    fn template(&self, _locale: SupportedLocale, key: &str) -> Option<&str> {
        ENGLISH_MESSAGES
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, template)| *template)
    }
}

struct DateGroup<'i> {
    date: String,
    items: Vec<&'i CollectedItem>,
}

struct ChannelGroup<'i> {
    channel_name: &'i str,
    dates: Vec<DateGroup<'i>>,
}

/// Groups by channel name, then UTC date, keeping first-seen order of both.
fn group_by_channel_and_date(items: &[CollectedItem]) -> Vec<ChannelGroup<'_>> {
    let mut groups: Vec<ChannelGroup<'_>> = Vec::new();
    for item in items {
        let position = match groups
            .iter()
            .position(|group| group.channel_name == item.channel_name)
        {
            Some(position) => position,
            None => {
                groups.push(ChannelGroup {
                    channel_name: &item.channel_name,
                    dates: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let date = format_date_only_utc(slack_ts_to_datetime(&item.ts));
        let dates = &mut groups[position].dates;
        match dates.iter_mut().find(|group| group.date == date) {
            Some(group) => group.items.push(item),
            None => dates.push(DateGroup {
                date,
                items: vec![item],
            }),
        }
    }
    groups
}

fn render_item_line(
    item: &CollectedItem,
    catalog: &dyn MessageCatalog,
    locale: SupportedLocale,
) -> String {
    let time = format_time_utc(slack_ts_to_datetime(&item.ts));
    let mut line = if item.permalink.is_empty() {
        format!("- {time} {}", catalog.t(locale, "markdown.linkFailed", &[]))
    } else {
        format!(
            "- {time} [{}]({})",
            catalog.t(locale, "markdown.viewMessage", &[]),
            item.permalink
        )
    };
    if let Some(author) = item.author_name.as_deref() {
        line.push_str(&format!(" *{author}*"));
    }
    if let Some(preview) = item.text_preview.as_deref() {
        line.push_str(&format!(": {preview}"));
    }
    line
}

/// Full canvas body for a fresh or replaced canvas.
pub fn render_document_markdown(
    tag: &str,
    items: &[CollectedItem],
    channel_count: usize,
    now: DateTime<Utc>,
    catalog: &dyn MessageCatalog,
    locale: SupportedLocale,
) -> String {
    let mut lines = vec![
        format!(
            "## {}",
            catalog.t(locale, "markdown.heading", &[("emoji", tag.to_string())])
        ),
        catalog.t(
            locale,
            "markdown.lastUpdated",
            &[("datetime", format_datetime_utc(now))],
        ),
        catalog.t(
            locale,
            "markdown.messageCount",
            &[("count", items.len().to_string())],
        ),
        catalog.t(
            locale,
            "markdown.targetChannels",
            &[("count", channel_count.to_string())],
        ),
        String::new(),
    ];

    for group in group_by_channel_and_date(items) {
        lines.push(format!("### #{}", group.channel_name));
        for date_group in group.dates {
            lines.push(format!("**{}**", date_group.date));
            lines.extend(
                date_group
                    .items
                    .into_iter()
                    .map(|item| render_item_line(item, catalog, locale)),
            );
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// Section appended to an existing canvas, separated by a rule.
pub fn render_append_markdown(
    tag: &str,
    items: &[CollectedItem],
    channel_count: usize,
    now: DateTime<Utc>,
    catalog: &dyn MessageCatalog,
    locale: SupportedLocale,
) -> String {
    format!(
        "---\n\n{}",
        render_document_markdown(tag, items, channel_count, now, catalog, locale)
    )
}
