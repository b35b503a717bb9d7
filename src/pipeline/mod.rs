//! Sequential task pipeline
//!
//! A run is an ordered list of [`TaskDescriptor`](crate::task::TaskDescriptor)s
//! executed one at a time. Each stage sees the raw text of every stage before
//! it, and the [`PipelineTranscript`] only ever grows.

pub mod runner;
pub mod structured;

pub use runner::*;
pub use structured::{extract_json, parse_structured, SchemaParseError};

use crate::roles::RoleId;
use crate::task::Purpose;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Output of one completed stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    /// 1-based position in the run
    pub index: usize,
    pub role_id: RoleId,
    /// Speaker label, e.g. `CLO [Gemini Pro]`
    pub role_label: String,
    pub purpose: Purpose,
    pub raw_text: String,
    /// Schema-validated JSON, when the task carried a schema and it parsed
    pub parsed: Option<serde_json::Value>,
    /// Where the raw text was written; `None` if the task had no output file
    /// or the write failed
    pub saved_to: Option<PathBuf>,
}

/// Ordered, append-only record of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineTranscript {
    results: Vec<StageResult>,
}

impl PipelineTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, result: StageResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn last(&self) -> Option<&StageResult> {
        self.results.last()
    }

    pub fn find(&self, purpose: Purpose) -> Option<&StageResult> {
        self.results.iter().rev().find(|r| r.purpose == purpose)
    }

    /// Every stage as a markdown section, in order
    pub fn to_markdown(&self) -> String {
        self.results
            .iter()
            .map(|r| {
                format!(
                    "## Stage {}: {} ({})\n\n{}\n",
                    r.index,
                    r.role_label,
                    r.purpose,
                    r.raw_text.trim_end()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cooperative cancellation, checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
