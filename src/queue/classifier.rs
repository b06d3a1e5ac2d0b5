//! Error classification for queue and retry decisions
//!
//! Typed signals are checked first (the `RateLimited` variant, HTTP 429,
//! known provider codes). Message substring matching is the isolated fallback
//! for providers that only report throttling in free text.

use crate::config::QueueConfig;
use crate::error::AppError;

/// How the queue should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provider throttling: pause the queue, then let the caller retry
    RateLimited,
    /// Network or provider hiccup: retry with exponential backoff
    Transient,
    /// On-chain rejection: never retried
    Revert,
    /// Missing or invalid input: never retried
    NotFound,
    /// Anything else that retrying will not fix
    Fatal,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }
}

/// Strategy deciding the [`ErrorKind`] of an error, swappable per provider
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, err: &AppError) -> ErrorKind;
}

/// JSON-RPC codes used by common providers for throttling
pub const DEFAULT_RATE_LIMIT_CODES: &[i64] = &[-32005, -32029, 429];

/// Message fragments that indicate throttling
pub const DEFAULT_RATE_LIMIT_PATTERNS: &[&str] = &[
    "too many requests",
    "rate limit",
    "call rate limit exhausted",
    "exceeded the rate",
];

/// Default classifier for EVM JSON-RPC providers
#[derive(Debug, Clone)]
pub struct ProviderErrorClassifier {
    codes: Vec<i64>,
    patterns: Vec<String>,
}

impl Default for ProviderErrorClassifier {
    fn default() -> Self {
        Self {
            codes: DEFAULT_RATE_LIMIT_CODES.to_vec(),
            patterns: DEFAULT_RATE_LIMIT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ProviderErrorClassifier {
    /// Default codes and patterns extended with the configured ones
    pub fn from_config(config: &QueueConfig) -> Self {
        let mut classifier = Self::default();
        classifier.codes.extend(config.rate_limit_codes.iter().copied());
        classifier
            .patterns
            .extend(config.rate_limit_patterns.iter().map(|p| p.to_lowercase()));
        classifier
    }

    fn message_says_rate_limited(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.patterns.iter().any(|p| lower.contains(p.as_str()))
    }
}

impl ErrorClassifier for ProviderErrorClassifier {
    fn classify(&self, err: &AppError) -> ErrorKind {
        match err {
            AppError::RateLimited(_) => ErrorKind::RateLimited,
            AppError::Http { status: 429, .. } => ErrorKind::RateLimited,
            AppError::Rpc { code, message } => {
                if self.codes.contains(code) || self.message_says_rate_limited(message) {
                    ErrorKind::RateLimited
                } else {
                    ErrorKind::Transient
                }
            }
            AppError::Network(message) | AppError::Internal(message) => {
                if self.message_says_rate_limited(message) {
                    ErrorKind::RateLimited
                } else {
                    ErrorKind::Transient
                }
            }
            AppError::Http { status, .. } if *status >= 500 => ErrorKind::Transient,
            AppError::Timeout(_) => ErrorKind::Transient,
            AppError::Revert { .. } => ErrorKind::Revert,
            AppError::NotFound(_) | AppError::Validation(_) => ErrorKind::NotFound,
            _ => ErrorKind::Fatal,
        }
    }
}
