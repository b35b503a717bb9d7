//! Mock implementations for testing
//!
//! Provides mock LlmProvider, SearchProvider and ProgressSink implementations
//! so pipelines can run without network access.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::pipeline::CancelFlag;
use crate::progress::{ProgressEvent, ProgressEventKind, ProgressSink};
use crate::search::{SearchError, SearchProvider, SearchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn mock_response(content: Option<String>) -> CompletionResponse {
    CompletionResponse {
        content,
        model: "mock-model".to_string(),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
        finish_reason: FinishReason::Stop,
        metadata: HashMap::new(),
    }
}

/// The user prompt of a request, where the stage context lives
pub fn user_prompt(request: &CompletionRequest) -> &str {
    request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Mock LLM provider cycling through canned responses
#[derive(Debug)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub should_fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            should_fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[call % self.responses.len()].clone()
        };
        Ok(mock_response(Some(content)))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

type Script = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Provider whose answer is computed from the request
pub struct ScriptedProvider {
    script: Box<Script>,
    calls: AtomicUsize,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(
        script: impl Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.script)(&request);
        self.requests.lock().await.push(request);
        result.map(|text| mock_response(Some(text)))
    }
}

/// Fails the first `failures` calls with `error`, then answers `response`
#[derive(Debug)]
pub struct FailingProvider {
    failures: usize,
    error: LlmError,
    response: String,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn failing_first(failures: usize, error: LlmError, response: impl Into<String>) -> Self {
        Self {
            failures,
            error,
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(self.error.clone())
        } else {
            Ok(mock_response(Some(self.response.clone())))
        }
    }
}

/// Mock search provider
#[derive(Debug, Default)]
pub struct MockSearch {
    results: Vec<SearchResult>,
    should_fail: bool,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockSearch {
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock-search"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        self.queries.lock().await.push(query.to_string());
        if self.should_fail {
            return Err(SearchError::RequestFailed("Mock search failure".to_string()));
        }
        Ok(self.results.clone())
    }
}

/// Progress sink that keeps every event, optionally cancelling a run
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
    cancel_after: Option<(usize, CancelFlag)>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `flag` once stage `stage` has completed
    pub fn cancelling_after(stage: usize, flag: CancelFlag) -> Self {
        Self {
            cancel_after: Some((stage, flag)),
            ..Self::default()
        }
    }

    pub async fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<ProgressEventKind> {
        self.events.lock().await.iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn emit(&self, event: ProgressEvent) {
        if let Some((stage, flag)) = &self.cancel_after {
            if event.kind == ProgressEventKind::StageComplete && event.stage == Some(*stage) {
                flag.cancel();
            }
        }
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::system("sys"), Message::user(prompt)],
            model: "mock-model".to_string(),
            max_tokens: None,
            temperature: None,
            response_format: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let provider = MockLlmProvider::new(vec!["a".to_string(), "b".to_string()]);
        let first = provider.complete(request("x")).await.unwrap();
        let second = provider.complete(request("x")).await.unwrap();
        let third = provider.complete(request("x")).await.unwrap();

        assert_eq!(first.content.as_deref(), Some("a"));
        assert_eq!(second.content.as_deref(), Some("b"));
        assert_eq!(third.content.as_deref(), Some("a"));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_provider_sees_prompt() {
        let provider = ScriptedProvider::new(|req| Ok(format!("echo: {}", user_prompt(req))));
        let response = provider.complete(request("hello")).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("echo: hello"));
        assert_eq!(provider.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_recording_progress_cancels() {
        let flag = CancelFlag::new();
        let sink = RecordingProgress::cancelling_after(2, flag.clone());
        let run_id = uuid::Uuid::new_v4();

        sink.emit(ProgressEvent::new(run_id, ProgressEventKind::StageComplete, "").with_stage(1, "r"))
            .await;
        assert!(!flag.is_cancelled());
        sink.emit(ProgressEvent::new(run_id, ProgressEventKind::StageComplete, "").with_stage(2, "r"))
            .await;
        assert!(flag.is_cancelled());
        assert_eq!(sink.events().await.len(), 2);
    }
}
