//! LLM provider abstraction and trait definitions
//!
//! This module defines the core traits and types for LLM provider interactions,
//! enabling multiple provider backends with a unified interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Message roles in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM completion request parameters
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub response_format: Option<ResponseFormat>,
    pub metadata: HashMap<String, String>,
}

/// LLM completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    pub metadata: HashMap<String, String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why completion finished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// Response format for structured outputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Plain text response
    #[default]
    Text,
    /// JSON object without schema validation
    Json,
    /// JSON with strict schema validation
    JsonSchema { json_schema: JsonSchemaDefinition },
}

/// JSON Schema definition for structured outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaDefinition {
    /// Schema name
    pub name: String,
    /// Whether to use strict mode (OpenAI only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    /// The JSON Schema object
    pub schema: serde_json::Value,
}

/// LLM provider trait for dependency injection and testing
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Generate a completion from the given request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Check if the provider is configured and ready
    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

/// LLM provider errors
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl LlmError {
    /// Whether a bounded retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::NetworkError(_) | LlmError::RateLimitExceeded(_) | LlmError::ServerError(_)
        )
    }

    /// Map an HTTP status and body to the matching error variant
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{provider} API error: {status} - {body}");
        match status.as_u16() {
            401 | 403 => LlmError::AuthenticationFailed(message),
            429 => LlmError::RateLimitExceeded(message),
            500..=599 => LlmError::ServerError(message),
            _ => LlmError::ApiError(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are a CFO.");
        let user = Message::user("Estimate the burn rate.");

        assert_eq!(system.role, MessageRole::System);
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "Estimate the burn rate.");
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LlmError::NetworkError("reset".to_string()).is_retryable());
        assert!(LlmError::RateLimitExceeded("429".to_string()).is_retryable());
        assert!(LlmError::ServerError("502".to_string()).is_retryable());
        assert!(!LlmError::AuthenticationFailed("401".to_string()).is_retryable());
        assert!(!LlmError::ApiError("400".to_string()).is_retryable());
        assert!(!LlmError::InvalidResponse("empty".to_string()).is_retryable());
    }

    #[test]
    fn test_error_from_status() {
        use reqwest::StatusCode;

        assert!(matches!(
            LlmError::from_status("openai", StatusCode::UNAUTHORIZED, "bad key"),
            LlmError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            LlmError::from_status("openai", StatusCode::TOO_MANY_REQUESTS, "slow down"),
            LlmError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            LlmError::from_status("gemini", StatusCode::BAD_GATEWAY, ""),
            LlmError::ServerError(_)
        ));
        let err = LlmError::from_status("anthropic", StatusCode::BAD_REQUEST, "oops");
        assert!(matches!(err, LlmError::ApiError(_)));
        assert!(err.to_string().contains("anthropic API error"));
    }

    #[test]
    fn test_response_format_default_is_text() {
        assert!(matches!(ResponseFormat::default(), ResponseFormat::Text));
    }
}
