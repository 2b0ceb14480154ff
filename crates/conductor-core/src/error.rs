// Structured error taxonomy (C9). Every failure in Conductor surfaces as a
// `ConductorError` carrying a closed category, a code, and a recovery hint.
// New failure conditions must map onto an existing category rather than grow
// the enum.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error categories. Authoritative classifier lives in
/// [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Timeout,
    Network,
    Validation,
    NotFound,
    Permission,
    SizeExceeded,
    ServiceUnavailable,
    ConfigError,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Suggested caller action for a given error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryHint {
    RetryWithBackoff,
    UseFallback,
    FixConfiguration,
    CheckCredentials,
    UserActionRequired,
    None,
}

/// The closed-taxonomy error record carried across component boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{category}: {code}: {message}")]
pub struct StructuredError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub recovery_hint: RecoveryHint,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub correlation_id: String,
}

impl StructuredError {
    pub fn new(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let retryable = is_retryable_code(&code);
        let recovery_hint = recovery_hint_for(category, retryable);
        Self {
            category,
            code,
            message: message.into(),
            retryable,
            recovery_hint,
            metadata: HashMap::new(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }
}

fn recovery_hint_for(category: ErrorCategory, retryable: bool) -> RecoveryHint {
    match category {
        ErrorCategory::Auth => RecoveryHint::CheckCredentials,
        ErrorCategory::RateLimit | ErrorCategory::Timeout | ErrorCategory::Network
        | ErrorCategory::ServiceUnavailable if retryable => RecoveryHint::RetryWithBackoff,
        ErrorCategory::Validation | ErrorCategory::ConfigError => RecoveryHint::FixConfiguration,
        ErrorCategory::Permission => RecoveryHint::UserActionRequired,
        ErrorCategory::NotFound | ErrorCategory::SizeExceeded => RecoveryHint::None,
        _ => RecoveryHint::None,
    }
}

fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "RATE_LIMITER_TIMEOUT" | "CIRCUIT_OPEN" | "UPSTREAM_TRANSIENT"
    )
}

/// Classifies a raw error message (and optional cause chain) per §4.4's
/// retryable word lists, returning the category and retryability that
/// [`ConductorError::from_provider_message`] stamps onto a new
/// [`StructuredError`].
pub fn classify_message(message: &str) -> (ErrorCategory, bool) {
    let lower = message.to_lowercase();

    const NEVER_RETRYABLE: &[&str] = &[
        "authentication",
        "invalid api key",
        "forbidden",
        "not found",
        "invalid request",
        "invalid_request_error",
        "model not found",
        "unauthorizedexception",
        "invalidparameterexception",
        "validation",
        "illegalargumentexception",
    ];
    for marker in NEVER_RETRYABLE {
        if lower.contains(marker) {
            let category = if lower.contains("not found") {
                ErrorCategory::NotFound
            } else if lower.contains("forbidden") {
                ErrorCategory::Permission
            } else if lower.contains("auth") || lower.contains("api key") {
                ErrorCategory::Auth
            } else {
                ErrorCategory::Validation
            };
            return (category, false);
        }
    }

    const ALWAYS_RETRYABLE: &[&str] = &[
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "429",
        "rate limit",
        "throttl",
        "overloaded",
        "busy",
        "temporarily unavailable",
        "502",
        "503",
        "504",
        "resource_exhausted",
        "deadline_exceeded",
        "overloaded_error",
        "model loading",
        "internalservererrorexception",
    ];
    for marker in ALWAYS_RETRYABLE {
        if lower.contains(marker) {
            let category = if lower.contains("rate limit") || lower.contains("429") || lower.contains("throttl") {
                ErrorCategory::RateLimit
            } else if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline_exceeded") {
                ErrorCategory::Timeout
            } else if lower.contains("connection") {
                ErrorCategory::Network
            } else {
                ErrorCategory::ServiceUnavailable
            };
            return (category, true);
        }
    }

    // Ambiguous cases default to non-retryable (fail fast).
    (ErrorCategory::Internal, false)
}

impl StructuredError {
    /// Builds a `StructuredError` from a free-text provider error message,
    /// applying the §4.4/§4.9 classifier.
    pub fn classify(message: impl Into<String>, code: impl Into<String>) -> Self {
        let message = message.into();
        let (category, retryable) = classify_message(&message);
        let recovery_hint = recovery_hint_for(category, retryable);
        Self {
            category,
            code: code.into(),
            message,
            retryable,
            recovery_hint,
            metadata: HashMap::new(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, "AUTH_ERROR", message)
    }

    pub fn rate_limit(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut e = Self::new(ErrorCategory::RateLimit, code, message);
        e.retryable = true;
        e.recovery_hint = RecoveryHint::RetryWithBackoff;
        e
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut e = Self::new(ErrorCategory::Timeout, code, message);
        e.retryable = true;
        e.recovery_hint = RecoveryHint::RetryWithBackoff;
        e
    }

    pub fn network(message: impl Into<String>) -> Self {
        let mut e = Self::new(ErrorCategory::Network, "NETWORK_ERROR", message);
        e.retryable = true;
        e.recovery_hint = RecoveryHint::RetryWithBackoff;
        e
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, "VALIDATION_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, "NOT_FOUND", message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Permission, "PERMISSION_DENIED", message)
    }

    pub fn size_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::SizeExceeded, "SIZE_EXCEEDED", message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut e = Self::new(ErrorCategory::ServiceUnavailable, code, message);
        e.retryable = true;
        e.recovery_hint = RecoveryHint::RetryWithBackoff;
        e
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ConfigError, "CONFIG_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, "INTERNAL_ERROR", message)
    }
}

impl From<std::io::Error> for StructuredError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<serde_json::Error> for StructuredError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(err.to_string())
    }
}

/// Crate-wide result alias, matching the corpus's `AofResult` convention.
pub type ConductorResult<T> = Result<T, StructuredError>;

/// Alias kept for the single error type itself, mirroring `AofError`.
pub type ConductorError = StructuredError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_as_retryable() {
        let (category, retryable) = classify_message("HTTP 429: rate limit exceeded");
        assert_eq!(category, ErrorCategory::RateLimit);
        assert!(retryable);
    }

    #[test]
    fn classifies_auth_as_non_retryable() {
        let (category, retryable) = classify_message("Invalid API key provided");
        assert_eq!(category, ErrorCategory::Auth);
        assert!(!retryable);
    }

    #[test]
    fn ambiguous_errors_default_non_retryable() {
        let (category, retryable) = classify_message("something went sideways");
        assert_eq!(category, ErrorCategory::Internal);
        assert!(!retryable);
    }

    #[test]
    fn constructors_set_expected_category() {
        let err = StructuredError::not_found("stage missing");
        assert_eq!(err.category, ErrorCategory::NotFound);
        assert!(!err.retryable);
    }
}
