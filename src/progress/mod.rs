use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: ProgressEventKind,
    pub stage: Option<usize>,
    pub role: Option<String>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    RunStart,
    StageStart,
    SearchResults,
    StageOutput,
    StageComplete,
    StageError,
    GateDecision,
    RunComplete,
    RunTerminated,
    RunError,
}

impl ProgressEvent {
    pub fn new(run_id: Uuid, kind: ProgressEventKind, message: impl Into<String>) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            kind,
            stage: None,
            role: None,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_stage(mut self, stage: usize, role: impl Into<String>) -> Self {
        self.stage = Some(stage);
        self.role = Some(role.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Receiver of run progress. The stream is append-only and ordered.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: ProgressEvent);
}

pub struct NoOpProgress;

#[async_trait]
impl ProgressSink for NoOpProgress {
    async fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to a tokio channel for a separate renderer
#[derive(Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ProgressSink for ChannelProgress {
    async fn emit(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.sender.send(event);
    }
}

/// Human-readable progress on stderr; stdout is reserved for the report
pub struct ConsoleProgress {
    show_output: bool,
}

impl ConsoleProgress {
    pub fn new(show_output: bool) -> Self {
        Self { show_output }
    }

    fn render(&self, event: &ProgressEvent) -> Option<String> {
        let prefix = match (event.stage, event.role.as_deref()) {
            (Some(stage), Some(role)) => format!("[{stage}] {role}: "),
            _ => String::new(),
        };
        let line = match event.kind {
            ProgressEventKind::RunStart => format!("==> {}", event.message),
            ProgressEventKind::StageStart => format!("--> {prefix}{}", event.message),
            ProgressEventKind::SearchResults => format!("    {prefix}{}", event.message),
            ProgressEventKind::StageOutput if self.show_output => {
                format!("{prefix}\n{}\n", event.message)
            }
            ProgressEventKind::StageOutput => return None,
            ProgressEventKind::StageComplete => format!("    {prefix}{}", event.message),
            ProgressEventKind::StageError => format!("!!  {prefix}{}", event.message),
            ProgressEventKind::GateDecision => format!("<?> {}", event.message),
            ProgressEventKind::RunComplete => format!("==> {}", event.message),
            ProgressEventKind::RunTerminated => format!("xx  {}", event.message),
            ProgressEventKind::RunError => format!("!!  {}", event.message),
        };
        Some(line)
    }
}

#[async_trait]
impl ProgressSink for ConsoleProgress {
    async fn emit(&self, event: ProgressEvent) {
        if let Some(line) = self.render(&event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_creation() {
        let run_id = Uuid::new_v4();
        let event = ProgressEvent::new(run_id, ProgressEventKind::StageStart, "research")
            .with_stage(1, "researcher");

        assert_eq!(event.run_id, run_id);
        assert_eq!(event.stage, Some(1));
        assert_eq!(event.role.as_deref(), Some("researcher"));
        assert!(event.metadata.is_none());
    }

    #[test]
    fn test_event_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ProgressEventKind::GateDecision).unwrap(),
            "\"gate_decision\""
        );
    }

    #[tokio::test]
    async fn test_channel_progress_preserves_order() {
        let (sink, mut receiver) = ChannelProgress::channel();
        let run_id = Uuid::new_v4();
        for kind in [
            ProgressEventKind::RunStart,
            ProgressEventKind::StageStart,
            ProgressEventKind::RunComplete,
        ] {
            sink.emit(ProgressEvent::new(run_id, kind, "")).await;
        }

        assert_eq!(receiver.recv().await.unwrap().kind, ProgressEventKind::RunStart);
        assert_eq!(receiver.recv().await.unwrap().kind, ProgressEventKind::StageStart);
        assert_eq!(receiver.recv().await.unwrap().kind, ProgressEventKind::RunComplete);
    }

    #[tokio::test]
    async fn test_channel_progress_survives_dropped_receiver() {
        let (sink, receiver) = ChannelProgress::channel();
        drop(receiver);
        sink.emit(ProgressEvent::new(Uuid::new_v4(), ProgressEventKind::RunStart, ""))
            .await;
    }

    #[test]
    fn test_console_hides_stage_output_by_default() {
        let console = ConsoleProgress::new(false);
        let event = ProgressEvent::new(Uuid::new_v4(), ProgressEventKind::StageOutput, "text");
        assert!(console.render(&event).is_none());

        let verbose = ConsoleProgress::new(true);
        assert!(verbose.render(&event).unwrap().contains("text"));
    }
}
