//! Cached user lookups: locale and display name.
//!
//! A failed lookup returns the default and is not cached, so it never aborts
//! the caller and is retried on the next miss.

use std::fmt;
use std::time::Duration;

use canvas_collect_core::{TtlCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};

use crate::backoff_gateway::ApiGateway;
use crate::slack_api::SlackApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Enumerates supported `SupportedLocale` values.
pub enum SupportedLocale {
    #[default]
    Ja,
    En,
    Hi,
    Fr,
    Es,
    Zh,
    Ko,
}

impl SupportedLocale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
            Self::Hi => "hi",
            Self::Fr => "fr",
            Self::Es => "es",
            Self::Zh => "zh",
            Self::Ko => "ko",
        }
    }

    fn from_language(language: &str) -> Option<Self> {
        match language {
            "ja" => Some(Self::Ja),
            "en" => Some(Self::En),
            "hi" => Some(Self::Hi),
            "fr" => Some(Self::Fr),
            "es" => Some(Self::Es),
            "zh" => Some(Self::Zh),
            "ko" => Some(Self::Ko),
            _ => None,
        }
    }
}

impl fmt::Display for SupportedLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a platform locale such as `en-US` or `zh-TW` onto the supported set.
pub fn resolve_locale(platform_locale: &str) -> SupportedLocale {
    let trimmed = platform_locale.trim();
    if trimmed.is_empty() {
        return SupportedLocale::default();
    }
    let language = trimmed
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    SupportedLocale::from_language(&language).unwrap_or_default()
}

#[derive(Debug)]
pub struct DirectoryLookups {
    locales: TtlCache<SupportedLocale>,
    display_names: TtlCache<Option<String>>,
}

impl Default for DirectoryLookups {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY)
    }
}

impl DirectoryLookups {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            locales: TtlCache::new(ttl, capacity),
            display_names: TtlCache::new(ttl, capacity),
        }
    }

    pub async fn user_locale(
        &self,
        api: &dyn SlackApi,
        gateway: &ApiGateway,
        user_id: &str,
    ) -> SupportedLocale {
        if let Some(locale) = self.locales.get(user_id) {
            return locale;
        }
        match gateway.call("users.info", || api.user_info(user_id)).await {
            Ok(user) => {
                let locale = resolve_locale(user.locale.as_deref().unwrap_or_default());
                self.locales.set(user_id, locale);
                locale
            }
            Err(error) => {
                tracing::debug!(user_id, error = %error, "user locale lookup failed; using default");
                SupportedLocale::default()
            }
        }
    }

    pub async fn display_name(
        &self,
        api: &dyn SlackApi,
        gateway: &ApiGateway,
        user_id: &str,
    ) -> Option<String> {
        if let Some(name) = self.display_names.get(user_id) {
            return name;
        }
        match gateway.call("users.info", || api.user_info(user_id)).await {
            Ok(user) => {
                let name = user.preferred_name();
                self.display_names.set(user_id, name.clone());
                name
            }
            Err(error) => {
                tracing::debug!(user_id, error = %error, "display name lookup failed");
                None
            }
        }
    }

    pub fn clear(&self) {
        self.locales.clear();
        self.display_names.clear();
    }
}
