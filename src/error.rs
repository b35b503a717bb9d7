//! Pipeline error types
//!
//! Only provider failures (including timeouts), unknown roles, configuration
//! problems and cancellation cross the pipeline boundary. Schema parse and
//! file write failures are absorbed where they happen.

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::pipeline::PipelineTranscript;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Stage {stage} ({role}) failed: {source}")]
    Provider {
        stage: usize,
        role: String,
        #[source]
        source: LlmError,
    },

    #[error("Stage {stage} ({role}) timed out after {after:?}")]
    Timeout {
        stage: usize,
        role: String,
        after: Duration,
    },

    #[error("Run cancelled after {completed} completed stage(s)")]
    Cancelled { completed: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) | PipelineError::UnknownRole(_) => 2,
            PipelineError::Cancelled { .. } => 130,
            PipelineError::Provider { .. } | PipelineError::Timeout { .. } => 1,
        }
    }

    /// Error text safe to show a user
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// A failed run together with everything produced before the failure
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: PipelineError,
    pub transcript: PipelineTranscript,
}

impl RunFailure {
    pub fn new(error: PipelineError, transcript: PipelineTranscript) -> Self {
        Self { error, transcript }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("static regex")
});

static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+\S+").expect("static regex"));

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("static regex")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Redact secrets and sensitive paths, then truncate to 500 bytes
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let sanitized = BEARER_PATTERN.replace_all(&sanitized, "Bearer ***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(truncate_suffix);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let error = PipelineError::Provider {
            stage: 2,
            role: "skeptic".to_string(),
            source: LlmError::ServerError("502".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Stage 2 (skeptic) failed: Server error: 502"
        );
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PipelineError::Cancelled { completed: 3 }.exit_code(), 130);
        assert_eq!(PipelineError::UnknownRole("intern".into()).exit_code(), 2);
        let timeout = PipelineError::Timeout {
            stage: 1,
            role: "researcher".to_string(),
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.exit_code(), 1);
        assert!(timeout.to_string().contains("30s"));
    }

    #[test]
    fn test_error_message_sanitization() {
        let sanitized =
            sanitize_error_message("Failed to authenticate: password=secret123 token=abc456");

        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("abc456"));
        assert!(sanitized.contains("password=***"));
        assert!(sanitized.contains("token=***"));
    }

    #[test]
    fn test_bearer_redaction() {
        let sanitized = sanitize_error_message("header Authorization: Bearer sk-live-123");
        assert!(!sanitized.contains("sk-live-123"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"가".repeat(300));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let sanitized = sanitize_error_message(&"x".repeat(500));
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized = sanitize_error_message("Failed to read /home/user/.aws/credentials");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains(".aws/credentials"));
    }

    #[test]
    fn test_user_message_is_sanitized() {
        let error = PipelineError::Provider {
            stage: 1,
            role: "ceo".to_string(),
            source: LlmError::AuthenticationFailed("api_key=sk-abc".to_string()),
        };
        assert!(!error.user_message().contains("sk-abc"));
    }
}
