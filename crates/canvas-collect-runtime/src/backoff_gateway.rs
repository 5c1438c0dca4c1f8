//! Single chokepoint for remote calls: timeout, rate-limit backoff and
//! classification of Web API error codes into the collection taxonomy.

use std::future::Future;
use std::time::Duration;

use canvas_collect_core::{CollectError, CollectErrorKind, CollectResult};

use crate::slack_api::{SlackApiError, RATE_LIMITED_CODE};

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; only rate-limit failures are retried.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Delay before retry number `retry_index` (zero-based): base, 2x base, 4x base.
pub fn retry_delay(base_delay: Duration, retry_index: usize) -> Duration {
    let exponent = retry_index.min(16) as u32;
    base_delay.saturating_mul(2_u32.saturating_pow(exponent))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiErrorCode {
    MissingScope,
    TokenRevoked,
    NotAuthed,
    AccountInactive,
    InvalidAuth,
    RateLimited,
    NotInChannel,
    ChannelNotFound,
    CanvasEditingFailed,
    CanvasCreationFailed,
    Unrecognized,
}

impl ApiErrorCode {
    fn parse(code: &str) -> Self {
        match code.trim() {
            "missing_scope" => Self::MissingScope,
            "token_revoked" => Self::TokenRevoked,
            "not_authed" => Self::NotAuthed,
            "account_inactive" => Self::AccountInactive,
            "invalid_auth" => Self::InvalidAuth,
            RATE_LIMITED_CODE => Self::RateLimited,
            "not_in_channel" => Self::NotInChannel,
            "channel_not_found" => Self::ChannelNotFound,
            "canvas_editing_failed" => Self::CanvasEditingFailed,
            "canvas_creation_failed" => Self::CanvasCreationFailed,
            _ => Self::Unrecognized,
        }
    }
}

/// Maps a Web API error code onto the closed taxonomy; the raw code is kept as detail.
pub fn classify_api_error(code: &str) -> CollectError {
    let (kind, message_key) = match ApiErrorCode::parse(code) {
        ApiErrorCode::MissingScope => (CollectErrorKind::FatalApiError, "error.missingScope"),
        ApiErrorCode::TokenRevoked | ApiErrorCode::NotAuthed | ApiErrorCode::AccountInactive => {
            (CollectErrorKind::FatalApiError, "error.authInvalid")
        }
        ApiErrorCode::InvalidAuth => (CollectErrorKind::FatalApiError, "error.authError"),
        ApiErrorCode::RateLimited => (CollectErrorKind::RateLimited, "error.rateLimited"),
        ApiErrorCode::NotInChannel => (CollectErrorKind::NotAccessible, "error.notInChannel"),
        ApiErrorCode::ChannelNotFound => {
            (CollectErrorKind::ParseError, "error.channelNotFoundApi")
        }
        ApiErrorCode::CanvasEditingFailed => {
            (CollectErrorKind::DocumentEditFailed, "error.canvasEditFailed")
        }
        ApiErrorCode::CanvasCreationFailed => {
            (CollectErrorKind::DocumentCreateFailed, "error.canvasCreateFailed")
        }
        ApiErrorCode::Unrecognized => (CollectErrorKind::Unknown, "error.unknown"),
    };
    let error = CollectError::new(kind).with_message_key(message_key);
    if code.trim().is_empty() {
        error
    } else {
        error.with_detail(code.trim())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiGateway {
    policy: RetryPolicy,
}

impl ApiGateway {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `call`, retrying only rate-limit failures with exponential backoff.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut call: F) -> CollectResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SlackApiError>>,
    {
        let mut retries = 0_usize;
        loop {
            let error = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => {
                    tracing::warn!(
                        operation,
                        timeout_ms = self.policy.call_timeout.as_millis() as u64,
                        "slack api call timed out"
                    );
                    return Err(CollectError::new(CollectErrorKind::Unknown)
                        .with_detail("timeout")
                        .with_message_key("error.unknown"));
                }
            };

            if error.code == RATE_LIMITED_CODE && retries < self.policy.max_retries {
                let delay = retry_delay(self.policy.base_delay, retries);
                retries += 1;
                tracing::warn!(
                    operation,
                    attempt = retries,
                    max_retries = self.policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "slack api rate limited; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let classified = classify_api_error(&error.code);
            tracing::debug!(
                operation,
                code = error.code.as_str(),
                kind = classified.kind.as_str(),
                "slack api call failed"
            );
            return Err(classified);
        }
    }
}
