//! Pipeline runner
//!
//! Executes task descriptors strictly in order. For each stage the prompt is
//! the task instruction, the expected output, optional search results, and
//! then the raw text of every earlier stage. A failed completion aborts the
//! run; schema and file problems are logged and absorbed.

use crate::error::{PipelineError, RunFailure};
use crate::llm::{CompletionGateway, GatewayError, LlmError, Message, ResponseFormat};
use crate::pipeline::structured::parse_structured;
use crate::pipeline::{CancelFlag, PipelineTranscript, StageResult};
use crate::progress::{NoOpProgress, ProgressEvent, ProgressEventKind, ProgressSink};
use crate::search::{format_results, SearchProvider};
use crate::stage_span;
use crate::task::{SchemaMode, TaskDescriptor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Persisting a stage's output failed. Logged, never escalated.
#[derive(Debug, Error)]
#[error("failed to write {path}: {source}")]
pub struct FileWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

pub struct PipelineRunner {
    gateway: Arc<CompletionGateway>,
    search: Option<Arc<dyn SearchProvider>>,
    progress: Arc<dyn ProgressSink>,
    output_dir: PathBuf,
    cancel: CancelFlag,
    run_id: Uuid,
}

impl PipelineRunner {
    pub fn new(gateway: Arc<CompletionGateway>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            search: None,
            progress: Arc::new(NoOpProgress),
            output_dir: output_dir.into(),
            cancel: CancelFlag::new(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_search(mut self, search: Option<Arc<dyn SearchProvider>>) -> Self {
        self.search = search;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub(crate) async fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event).await;
    }

    pub(crate) fn event(&self, kind: ProgressEventKind, message: impl Into<String>) -> ProgressEvent {
        ProgressEvent::new(self.run_id, kind, message)
    }

    /// Run every task in order; on failure the partial transcript is returned
    pub async fn run(&self, tasks: Vec<TaskDescriptor>) -> Result<PipelineTranscript, RunFailure> {
        let mut transcript = PipelineTranscript::new();
        self.emit(self.event(
            ProgressEventKind::RunStart,
            format!("Starting run with {} stage(s)", tasks.len()),
        ))
        .await;

        for task in &tasks {
            if let Err(error) = self.execute_stage(task, &mut transcript).await {
                self.emit(self.event(ProgressEventKind::RunError, error.user_message()))
                    .await;
                return Err(RunFailure::new(error, transcript));
            }
        }

        self.emit(self.event(
            ProgressEventKind::RunComplete,
            format!("Run complete: {} stage(s)", transcript.len()),
        ))
        .await;
        Ok(transcript)
    }

    /// Execute one stage and append its result to `transcript`
    pub async fn execute_stage(
        &self,
        task: &TaskDescriptor,
        transcript: &mut PipelineTranscript,
    ) -> Result<StageResult, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                completed: transcript.len(),
            });
        }

        let index = transcript.len() + 1;
        let span = stage_span!(
            run_id = %self.run_id,
            stage = index,
            role = %task.agent.role.id,
            purpose = %task.purpose,
            model = %task.agent.model.model,
        );

        let result = self
            .execute_stage_inner(index, task, transcript)
            .instrument(span)
            .await?;
        transcript.push(result.clone());
        Ok(result)
    }

    async fn execute_stage_inner(
        &self,
        index: usize,
        task: &TaskDescriptor,
        transcript: &PipelineTranscript,
    ) -> Result<StageResult, PipelineError> {
        let role = task.agent.role.id.to_string();
        let label = task.agent.label();
        info!("Stage started");
        self.emit(
            self.event(ProgressEventKind::StageStart, task.purpose.to_string())
                .with_stage(index, &label),
        )
        .await;

        let search_block = self.gather_search(index, task, &label).await;
        let messages = compose_messages(task, search_block.as_deref(), transcript);

        let response_format = task.output_schema.as_ref().and_then(|s| match s.mode {
            SchemaMode::WholeResponse => Some(ResponseFormat::Json),
            SchemaMode::TrailingBlock => None,
        });

        let response = match self
            .gateway
            .complete(&task.agent.model, messages, response_format)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let error = match e {
                    GatewayError::Provider(source) => PipelineError::Provider {
                        stage: index,
                        role,
                        source,
                    },
                    GatewayError::Timeout(after) => PipelineError::Timeout {
                        stage: index,
                        role,
                        after,
                    },
                };
                warn!(error = %error, "Stage failed");
                self.emit(
                    self.event(ProgressEventKind::StageError, error.user_message())
                        .with_stage(index, &label),
                )
                .await;
                return Err(error);
            }
        };

        let raw_text = match response.content.filter(|c| !c.trim().is_empty()) {
            Some(text) => text,
            None => {
                let error = PipelineError::Provider {
                    stage: index,
                    role,
                    source: LlmError::InvalidResponse("empty completion".to_string()),
                };
                warn!(error = %error, "Stage returned no text");
                self.emit(
                    self.event(ProgressEventKind::StageError, error.user_message())
                        .with_stage(index, &label),
                )
                .await;
                return Err(error);
            }
        };

        let parsed = task.output_schema.as_ref().and_then(|schema| {
            match parse_structured(&raw_text, schema) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(schema = schema.name, error = %e, "Structured output unavailable, gate will use markers");
                    None
                }
            }
        });

        let saved_to = match &task.output_file_path {
            Some(path) => match self.persist(path, &raw_text).await {
                Ok(written) => {
                    info!(path = %written.display(), "Stage output saved");
                    Some(written)
                }
                Err(e) => {
                    warn!(error = %e, "Could not save stage output");
                    None
                }
            },
            None => None,
        };

        debug!(
            chars = raw_text.len(),
            tokens = response.usage.total_tokens,
            structured = parsed.is_some(),
            "Stage complete"
        );
        self.emit(
            self.event(ProgressEventKind::StageOutput, raw_text.clone())
                .with_stage(index, &label),
        )
        .await;
        self.emit(
            self.event(
                ProgressEventKind::StageComplete,
                format!("{} complete ({} chars)", task.purpose, raw_text.len()),
            )
            .with_stage(index, &label),
        )
        .await;

        Ok(StageResult {
            index,
            role_id: task.agent.role.id,
            role_label: label,
            purpose: task.purpose,
            raw_text,
            parsed,
            saved_to,
        })
    }

    /// Search results block, when the task, the agent and the runner all allow it
    async fn gather_search(&self, index: usize, task: &TaskDescriptor, label: &str) -> Option<String> {
        let query = task.search_query.as_deref()?;
        if !task.agent.capabilities.has_search_tool {
            return None;
        }
        let provider = self.search.as_ref()?;

        match provider.search(query).await {
            Ok(results) => {
                info!(provider = provider.name(), results = results.len(), "Search complete");
                self.emit(
                    self.event(
                        ProgressEventKind::SearchResults,
                        format!("{} search result(s) for \"{query}\"", results.len()),
                    )
                    .with_stage(index, label),
                )
                .await;
                Some(format_results(query, &results))
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Search failed, continuing without results");
                None
            }
        }
    }

    async fn persist(&self, path: &Path, text: &str) -> Result<PathBuf, FileWriteError> {
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        };
        let wrap = |source| FileWriteError {
            path: full_path.clone(),
            source,
        };

        if let Some(parent) = full_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
        }
        tokio::fs::write(&full_path, text).await.map_err(wrap)?;
        Ok(full_path)
    }
}

/// System instruction plus the composed user prompt (pure function)
pub fn compose_messages(
    task: &TaskDescriptor,
    search_block: Option<&str>,
    transcript: &PipelineTranscript,
) -> Vec<Message> {
    let mut prompt = format!(
        "{}\n\nExpected output: {}\n",
        task.instruction_text.trim_end(),
        task.expected_output_text
    );

    if let Some(schema) = &task.output_schema {
        prompt.push('\n');
        prompt.push_str(&schema.prompt_instruction());
        prompt.push('\n');
    }

    if let Some(block) = search_block {
        prompt.push('\n');
        prompt.push_str(block);
    }

    if !transcript.is_empty() {
        prompt.push_str("\n# Context from previous stages\n\n");
        prompt.push_str(&transcript.to_markdown());
    }

    vec![
        Message::system(task.agent.role.fixed_instruction),
        Message::user(prompt),
    ]
}
