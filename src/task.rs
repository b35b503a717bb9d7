//! Task builder
//!
//! [`build_task`] is a pure function from (agent, purpose, context) to the
//! descriptor the runner consumes. It decides the instruction text, the
//! expected output, the structured-output schema, the output file and the
//! search query for each purpose.

use crate::gate::{BoardDecision, KillSwitchResult};
use crate::prompts;
use crate::roles::Agent;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Fallback slug when a topic has no usable characters
pub const DEFAULT_SLUG: &str = "Strategic_Report";
const SLUG_MAX_CHARS: usize = 40;
const NOT_PROVIDED: &str = "(not provided)";

/// What a stage is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Research,
    VisualizeData,
    Debate,
    BusinessAnalysis,
    FinalSynthesis,
    KillSwitchCheck,
    StrategySession,
    Planning,
    Blueprint,
    Consultation,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Research => "research",
            Purpose::VisualizeData => "visualize_data",
            Purpose::Debate => "debate",
            Purpose::BusinessAnalysis => "business_analysis",
            Purpose::FinalSynthesis => "final_synthesis",
            Purpose::KillSwitchCheck => "kill_switch_check",
            Purpose::StrategySession => "strategy_session",
            Purpose::Planning => "planning",
            Purpose::Blueprint => "blueprint",
            Purpose::Consultation => "consultation",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named text inputs for a run (`topic`, `brief`, `project_idea`,
/// `question`, `vision`, `board_roster`). A `brief` replaces the topic in
/// instructions only; file names and search queries keep the topic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContext {
    values: BTreeMap<String, String>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self::new().with("topic", topic)
    }

    pub fn for_project(project_idea: impl Into<String>) -> Self {
        Self::new().with("project_idea", project_idea)
    }

    pub fn for_question(question: impl Into<String>) -> Self {
        Self::new().with("question", question)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// How structured output is embedded in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// The whole response is one JSON object
    WholeResponse,
    /// Free prose ending with a fenced JSON block
    TrailingBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: &'static str,
    pub mode: SchemaMode,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn kill_switch() -> Self {
        Self {
            name: "kill_switch_result",
            mode: SchemaMode::WholeResponse,
            schema: KillSwitchResult::json_schema(),
        }
    }

    pub fn board_decision() -> Self {
        Self {
            name: "board_decision",
            mode: SchemaMode::TrailingBlock,
            schema: BoardDecision::json_schema(),
        }
    }

    /// Instruction appended to the prompt so any provider can comply
    pub fn prompt_instruction(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        match self.mode {
            SchemaMode::WholeResponse => format!(
                "Respond ONLY with a single JSON object (no prose, no code fences) \
                 that validates against this JSON Schema:\n{schema}"
            ),
            SchemaMode::TrailingBlock => format!(
                "After the transcript, end your response with a fenced ```json block \
                 containing one object that validates against this JSON Schema:\n{schema}"
            ),
        }
    }
}

/// Everything the runner needs to execute one stage
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub agent: Agent,
    pub purpose: Purpose,
    pub instruction_text: String,
    pub expected_output_text: String,
    pub output_schema: Option<OutputSchema>,
    /// Relative paths are resolved against the configured output directory
    pub output_file_path: Option<PathBuf>,
    pub search_query: Option<String>,
}

/// Build the descriptor for one stage (pure)
pub fn build_task(agent: &Agent, purpose: Purpose, context: &TaskContext) -> TaskDescriptor {
    let topic = context
        .get("brief")
        .or_else(|| context.get("topic"))
        .unwrap_or(NOT_PROVIDED);
    let project_idea = context.get("project_idea").unwrap_or(NOT_PROVIDED);

    let vision_block = context
        .get("vision")
        .map(|vision| {
            format!(
                "\n[VISION CONTEXT]\nAn image accompanies this request: {vision}\n\
                 1. Describe its key visual elements.\n\
                 2. Connect them to the topic.\n\
                 3. Find external data that validates this visual evidence.\n"
            )
        })
        .unwrap_or_default();

    let template = template_for(purpose);
    let instruction_text = prompts::render(template, |key| match key {
        "topic" => Some(topic),
        "project_idea" => Some(project_idea),
        "question" => Some(context.get("question").unwrap_or(NOT_PROVIDED)),
        "board_roster" => context.get("board_roster"),
        "vision_block" => Some(vision_block.as_str()),
        _ => None,
    });

    let output_schema = match purpose {
        Purpose::KillSwitchCheck => Some(OutputSchema::kill_switch()),
        Purpose::StrategySession => Some(OutputSchema::board_decision()),
        _ => None,
    };

    let output_file_path = match purpose {
        Purpose::FinalSynthesis => Some(PathBuf::from(format!(
            "Strategy_Report_{}.md",
            topic_slug(context.get("topic").unwrap_or_default())
        ))),
        Purpose::Planning => Some(PathBuf::from("task.md")),
        Purpose::Blueprint => Some(PathBuf::from("blueprint.md")),
        Purpose::Consultation => Some(PathBuf::from(format!(
            "board_consultation_{}.md",
            topic_slug(context.get("question").unwrap_or_default())
        ))),
        _ => None,
    };

    let search_query = match purpose {
        Purpose::Research => context.get("topic").map(str::to_string),
        Purpose::KillSwitchCheck => context
            .get("project_idea")
            .map(|idea| format!("\"{idea}\" trademark")),
        _ => None,
    };

    TaskDescriptor {
        agent: agent.clone(),
        purpose,
        instruction_text,
        expected_output_text: expected_output_for(purpose).to_string(),
        output_schema,
        output_file_path,
        search_query,
    }
}

fn template_for(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Research => prompts::RESEARCH,
        Purpose::VisualizeData => prompts::VISUALIZE_DATA,
        Purpose::Debate => prompts::DEBATE,
        Purpose::BusinessAnalysis => prompts::BUSINESS_ANALYSIS,
        Purpose::FinalSynthesis => prompts::FINAL_SYNTHESIS,
        Purpose::KillSwitchCheck => prompts::KILL_SWITCH,
        Purpose::StrategySession => prompts::STRATEGY_SESSION,
        Purpose::Planning => prompts::PLANNING,
        Purpose::Blueprint => prompts::BLUEPRINT,
        Purpose::Consultation => prompts::CONSULTATION,
    }
}

fn expected_output_for(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Research => prompts::expected::RESEARCH,
        Purpose::VisualizeData => prompts::expected::VISUALIZE_DATA,
        Purpose::Debate => prompts::expected::DEBATE,
        Purpose::BusinessAnalysis => prompts::expected::BUSINESS_ANALYSIS,
        Purpose::FinalSynthesis => prompts::expected::FINAL_SYNTHESIS,
        Purpose::KillSwitchCheck => prompts::expected::KILL_SWITCH,
        Purpose::StrategySession => prompts::expected::STRATEGY_SESSION,
        Purpose::Planning => prompts::expected::PLANNING,
        Purpose::Blueprint => prompts::expected::BLUEPRINT,
        Purpose::Consultation => prompts::expected::CONSULTATION,
    }
}

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("static regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("static regex"));

/// Filesystem-safe slug: drop everything but word characters, whitespace
/// and hyphens, collapse separators to `_`, keep at most 40 characters
pub fn topic_slug(topic: &str) -> String {
    let cleaned = NON_WORD.replace_all(topic, "");
    let slug = SEPARATORS.replace_all(cleaned.trim(), "_");
    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::roles::{RoleId, RoleRegistry};

    fn agent(id: RoleId) -> Agent {
        RoleRegistry::new(&AppConfig::default()).agent(id)
    }

    #[test]
    fn test_topic_slug() {
        assert_eq!(topic_slug("AI note-taking apps!"), "AI_note_taking_apps");
        assert_eq!(topic_slug("  spaced   out  "), "spaced_out");
        assert_eq!(topic_slug("?!#"), DEFAULT_SLUG);
        assert_eq!(topic_slug(""), DEFAULT_SLUG);
    }

    #[test]
    fn test_topic_slug_truncates_to_40_chars() {
        let slug = topic_slug(&"word ".repeat(30));
        assert_eq!(slug.chars().count(), 40);
    }

    #[test]
    fn test_brief_replaces_topic_in_instruction_only() {
        let context = TaskContext::for_topic("EV chargers")
            .with("brief", "### [Strategic Request] EV chargers\n\nDetailed brief");

        let research = build_task(&agent(RoleId::Researcher), Purpose::Research, &context);
        assert!(research.instruction_text.contains("Detailed brief"));
        assert_eq!(research.search_query.as_deref(), Some("EV chargers"));

        let report = build_task(&agent(RoleId::Writer), Purpose::FinalSynthesis, &context);
        assert_eq!(
            report.output_file_path,
            Some(PathBuf::from("Strategy_Report_EV_chargers.md"))
        );
    }

    #[test]
    fn test_topic_slug_keeps_unicode_words() {
        assert_eq!(topic_slug("전기차 배터리 시장"), "전기차_배터리_시장");
    }

    #[test]
    fn test_final_synthesis_output_file() {
        let task = build_task(
            &agent(RoleId::Writer),
            Purpose::FinalSynthesis,
            &TaskContext::for_topic("EV batteries 2026"),
        );
        assert_eq!(
            task.output_file_path,
            Some(PathBuf::from("Strategy_Report_EV_batteries_2026.md"))
        );
        assert!(task.instruction_text.contains("EV batteries 2026"));
        assert!(task.output_schema.is_none());
    }

    #[test]
    fn test_governance_output_files() {
        let ctx = TaskContext::for_project("Notes app");
        let planning = build_task(&agent(RoleId::ProjectManager), Purpose::Planning, &ctx);
        let blueprint = build_task(&agent(RoleId::Backend), Purpose::Blueprint, &ctx);
        assert_eq!(planning.output_file_path, Some(PathBuf::from("task.md")));
        assert_eq!(blueprint.output_file_path, Some(PathBuf::from("blueprint.md")));
    }

    #[test]
    fn test_schema_assignment() {
        let ctx = TaskContext::for_project("Google");
        let kill = build_task(&agent(RoleId::Clo), Purpose::KillSwitchCheck, &ctx);
        let board = build_task(&agent(RoleId::Ceo), Purpose::StrategySession, &ctx);

        let kill_schema = kill.output_schema.unwrap();
        assert_eq!(kill_schema.mode, SchemaMode::WholeResponse);
        assert_eq!(kill_schema.name, "kill_switch_result");
        assert_eq!(board.output_schema.unwrap().mode, SchemaMode::TrailingBlock);
        assert!(kill.instruction_text.contains("Project Proposal: \"Google\""));
    }

    #[test]
    fn test_search_queries() {
        let research = build_task(
            &agent(RoleId::Researcher),
            Purpose::Research,
            &TaskContext::for_topic("solid-state batteries"),
        );
        assert_eq!(research.search_query.as_deref(), Some("solid-state batteries"));

        let debate = build_task(
            &agent(RoleId::Skeptic),
            Purpose::Debate,
            &TaskContext::for_topic("solid-state batteries"),
        );
        assert!(debate.search_query.is_none());
    }

    #[test]
    fn test_missing_context_uses_placeholder() {
        let task = build_task(&agent(RoleId::Researcher), Purpose::Research, &TaskContext::new());
        assert!(task.instruction_text.contains(NOT_PROVIDED));
        assert!(task.search_query.is_none());
    }

    #[test]
    fn test_vision_block_only_when_present() {
        let plain = build_task(
            &agent(RoleId::Researcher),
            Purpose::Research,
            &TaskContext::for_topic("retail"),
        );
        assert!(!plain.instruction_text.contains("[VISION CONTEXT]"));

        let with_vision = build_task(
            &agent(RoleId::Researcher),
            Purpose::Research,
            &TaskContext::for_topic("retail").with("vision", "a crowded store shelf"),
        );
        assert!(with_vision.instruction_text.contains("a crowded store shelf"));
    }

    #[test]
    fn test_build_task_is_deterministic() {
        let ctx = TaskContext::for_topic("quantum sensors");
        let a = build_task(&agent(RoleId::Strategist), Purpose::BusinessAnalysis, &ctx);
        let b = build_task(&agent(RoleId::Strategist), Purpose::BusinessAnalysis, &ctx);
        assert_eq!(a, b);
    }
}
