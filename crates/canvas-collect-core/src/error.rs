//! Closed error taxonomy shared by every collection component.

use std::fmt;

use thiserror::Error;

/// Result alias used across collection components.
pub type CollectResult<T> = Result<T, CollectError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates the closed set of `CollectErrorKind` values.
pub enum CollectErrorKind {
    ParseError,
    NoTargetTag,
    MultipleWindows,
    LockConflict,
    NotAccessible,
    DocumentCreateFailed,
    DocumentEditFailed,
    RateLimited,
    FatalApiError,
    PlanLimit,
    Unknown,
}

impl CollectErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::NoTargetTag => "NO_TARGET_TAG",
            Self::MultipleWindows => "MULTIPLE_WINDOWS",
            Self::LockConflict => "LOCK_CONFLICT",
            Self::NotAccessible => "NOT_ACCESSIBLE",
            Self::DocumentCreateFailed => "DOCUMENT_CREATE_FAILED",
            Self::DocumentEditFailed => "DOCUMENT_EDIT_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::FatalApiError => "FATAL_API_ERROR",
            Self::PlanLimit => "PLAN_LIMIT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns true for kinds a collector recovers from by skipping a channel.
    pub fn is_skippable(self) -> bool {
        matches!(self, Self::NotAccessible)
    }
}

impl fmt::Display for CollectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure value; callers render it with `message_key`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", render_detail(.detail))]
pub struct CollectError {
    pub kind: CollectErrorKind,
    pub detail: Option<String>,
    pub message_key: Option<&'static str>,
}

fn render_detail(detail: &Option<String>) -> String {
    match detail.as_deref() {
        Some(detail) if !detail.is_empty() => format!(": {detail}"),
        _ => String::new(),
    }
}

impl CollectError {
    pub fn new(kind: CollectErrorKind) -> Self {
        Self {
            kind,
            detail: None,
            message_key: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_message_key(mut self, message_key: &'static str) -> Self {
        self.message_key = Some(message_key);
        self
    }

    pub fn parse(message_key: &'static str) -> Self {
        Self::new(CollectErrorKind::ParseError).with_message_key(message_key)
    }

    pub fn plan_limit(message_key: &'static str) -> Self {
        Self::new(CollectErrorKind::PlanLimit).with_message_key(message_key)
    }

    pub fn lock_conflict(key: &str) -> Self {
        Self::new(CollectErrorKind::LockConflict)
            .with_detail(key)
            .with_message_key("lock.conflict")
    }

    pub fn is_skippable(&self) -> bool {
        self.kind.is_skippable()
    }
}
