//! Research sessions
//!
//! Team compositions for plain research runs, the lean-vs-full A/B
//! comparison, topic refinement through the fast tier, and board
//! consultation on a free-form question.

use crate::error::RunFailure;
use crate::llm::{CompletionGateway, Message, ModelBinding};
use crate::pipeline::{PipelineRunner, PipelineTranscript};
use crate::prompts;
use crate::roles::{RoleId, RoleRegistry};
use crate::task::{build_task, Purpose, TaskContext, TaskDescriptor};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Offset used for report timestamps (KST, UTC+9)
pub const REPORT_UTC_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeamComposition {
    /// Researcher, Skeptic, Writer
    Lean,
    /// Researcher, Analyst, Skeptic, Strategist, Writer
    #[default]
    Full,
}

impl TeamComposition {
    pub fn stages(self) -> &'static [(RoleId, Purpose)] {
        match self {
            TeamComposition::Lean => &[
                (RoleId::Researcher, Purpose::Research),
                (RoleId::Skeptic, Purpose::Debate),
                (RoleId::Writer, Purpose::FinalSynthesis),
            ],
            TeamComposition::Full => &[
                (RoleId::Researcher, Purpose::Research),
                (RoleId::Analyst, Purpose::VisualizeData),
                (RoleId::Skeptic, Purpose::Debate),
                (RoleId::Strategist, Purpose::BusinessAnalysis),
                (RoleId::Writer, Purpose::FinalSynthesis),
            ],
        }
    }

    pub fn mode_title(self) -> &'static str {
        match self {
            TeamComposition::Lean => "Speed Briefing (3-Agent)",
            TeamComposition::Full => "Deep Strategy (5-Agent)",
        }
    }

    fn focus(self) -> &'static str {
        match self {
            TeamComposition::Lean => "Quick, Core Facts, Efficiency",
            TeamComposition::Full => "Investment Defense, ROI, Skepticism",
        }
    }

    fn refine_template(self) -> &'static str {
        match self {
            TeamComposition::Lean => prompts::REFINE_LEAN,
            TeamComposition::Full => prompts::REFINE_FULL,
        }
    }
}

impl fmt::Display for TeamComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamComposition::Lean => write!(f, "lean"),
            TeamComposition::Full => write!(f, "full"),
        }
    }
}

/// What a research run is about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchRequest {
    /// The user's topic; names report files and seeds web search
    pub topic: String,
    /// Refined brief the agents read instead of the bare topic
    pub brief: Option<String>,
    /// Description of an accompanying image
    pub vision: Option<String>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = Some(brief.into());
        self
    }

    pub fn with_vision(mut self, vision: impl Into<String>) -> Self {
        self.vision = Some(vision.into());
        self
    }

    fn context(&self) -> TaskContext {
        let mut context = TaskContext::for_topic(&self.topic);
        if let Some(brief) = &self.brief {
            context = context.with("brief", brief);
        }
        if let Some(vision) = &self.vision {
            context = context.with("vision", vision);
        }
        context
    }
}

/// Task list for a research run
pub fn research_tasks(
    registry: &RoleRegistry,
    team: TeamComposition,
    request: &ResearchRequest,
) -> Vec<TaskDescriptor> {
    let context = request.context();
    team.stages()
        .iter()
        .map(|(role, purpose)| build_task(&registry.agent(*role), *purpose, &context))
        .collect()
}

/// The report a research run produced: the final stage's text
pub fn final_report(transcript: &PipelineTranscript) -> Option<&str> {
    transcript.last().map(|r| r.raw_text.as_str())
}

pub async fn run_research(
    runner: &PipelineRunner,
    registry: &RoleRegistry,
    team: TeamComposition,
    request: &ResearchRequest,
) -> Result<PipelineTranscript, RunFailure> {
    info!(team = %team, refined = request.brief.is_some(), "Starting research run");
    runner
        .run(research_tasks(registry, team, request))
        .await
}

/// Lean and full reports combined under one header
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub topic: String,
    pub generated_at: DateTime<FixedOffset>,
    pub lean: String,
    pub full: String,
}

impl ComparisonReport {
    pub fn new(topic: impl Into<String>, lean: String, full: String) -> Self {
        Self {
            topic: topic.into(),
            generated_at: report_time(),
            lean,
            full,
        }
    }

    pub fn to_markdown(&self) -> String {
        let section = |team: TeamComposition, marker: &str, body: &str| {
            format!(
                "## {marker} Mode {}: {}\n> Focus: {}\n{}\n",
                if team == TeamComposition::Lean { "A" } else { "B" },
                team.mode_title(),
                team.focus(),
                body.trim_end()
            )
        };
        format!(
            "# ⚖️ Strategic A/B Test Report\n\
             **Topic**: {}\n\
             **Date**: {} (KST)\n\n\
             ---\n\n\
             {}\n\
             ---\n\
             ---\n\n\
             {}",
            self.topic,
            self.generated_at.format("%Y-%m-%d %H:%M"),
            section(TeamComposition::Lean, "⚡", &self.lean),
            section(TeamComposition::Full, "💎", &self.full),
        )
    }

    pub fn file_name(&self) -> String {
        report_file_name(&self.generated_at)
    }
}

/// `Strategic_Report_YYYYmmdd_HHMMSS.md`
pub fn report_file_name(at: &DateTime<FixedOffset>) -> String {
    format!("Strategic_Report_{}.md", at.format("%Y%m%d_%H%M%S"))
}

pub fn report_time() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(REPORT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset)
}

/// Run lean then full on the same topic, each with its own transcript
pub async fn compare(
    runner: &PipelineRunner,
    registry: &RoleRegistry,
    request: &ResearchRequest,
) -> Result<ComparisonReport, RunFailure> {
    let lean = run_research(runner, registry, TeamComposition::Lean, request).await?;
    let full = run_research(runner, registry, TeamComposition::Full, request).await?;

    Ok(ComparisonReport::new(
        &request.topic,
        final_report(&lean).unwrap_or_default().to_string(),
        final_report(&full).unwrap_or_default().to_string(),
    ))
}

/// Write a combined report into `dir`; failures are logged and return `None`
pub async fn save_report(dir: &Path, report: &ComparisonReport) -> Option<PathBuf> {
    let path = dir.join(report.file_name());
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(error = %e, dir = %dir.display(), "Could not create output directory");
        return None;
    }
    match tokio::fs::write(&path, report.to_markdown()).await {
        Ok(()) => {
            info!(path = %path.display(), "Comparison report saved");
            Some(path)
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Could not save comparison report");
            None
        }
    }
}

/// Expand a short topic into a structured brief; falls back to the raw topic
pub async fn refine_topic(
    gateway: &CompletionGateway,
    binding: &ModelBinding,
    team: TeamComposition,
    topic: &str,
) -> String {
    let prompt = prompts::render(team.refine_template(), |key| match key {
        "topic" => Some(topic),
        _ => None,
    });

    match gateway
        .complete(binding, vec![Message::user(prompt)], None)
        .await
    {
        Ok(response) => match response.content.filter(|c| !c.trim().is_empty()) {
            Some(refined) => {
                info!(team = %team, chars = refined.len(), "Topic refined");
                refined.trim().to_string()
            }
            None => {
                warn!("Topic refinement returned no text, using the raw topic");
                topic.to_string()
            }
        },
        Err(e) => {
            warn!(error = %e, "Topic refinement failed, using the raw topic");
            topic.to_string()
        }
    }
}

/// Ask the board a free-form question; the CEO chairs
pub async fn consult(
    runner: &PipelineRunner,
    registry: &RoleRegistry,
    question: &str,
) -> Result<PipelineTranscript, RunFailure> {
    let context = TaskContext::for_question(question).with("board_roster", registry.board_roster());
    let task = build_task(&registry.agent(RoleId::Ceo), Purpose::Consultation, &context);
    runner.run(vec![task]).await
}
