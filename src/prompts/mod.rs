//! Prompt text bundled at compile time.
//!
//! Task templates live in `templates/*.md` and use `{{name}}` placeholders
//! filled by [`render`]. Role instructions are short enough to live here.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const RESEARCH: &str = include_str!("templates/research.md");
pub const VISUALIZE_DATA: &str = include_str!("templates/visualize_data.md");
pub const DEBATE: &str = include_str!("templates/debate.md");
pub const BUSINESS_ANALYSIS: &str = include_str!("templates/business_analysis.md");
pub const FINAL_SYNTHESIS: &str = include_str!("templates/final_synthesis.md");
pub const KILL_SWITCH: &str = include_str!("templates/kill_switch.md");
pub const STRATEGY_SESSION: &str = include_str!("templates/strategy_session.md");
pub const PLANNING: &str = include_str!("templates/planning.md");
pub const BLUEPRINT: &str = include_str!("templates/blueprint.md");
pub const CONSULTATION: &str = include_str!("templates/consultation.md");

/// Topic refinement for the lean (3-agent) team
pub const REFINE_LEAN: &str = include_str!("templates/refine_lean.md");
/// Topic refinement for the full (5-agent) team
pub const REFINE_FULL: &str = include_str!("templates/refine_full.md");

pub mod expected {
    pub const RESEARCH: &str = "A validated dossier of facts with live source links. \
        Focus on hard numbers and strategic moves.";
    pub const VISUALIZE_DATA: &str =
        "Markdown tables and valid Mermaid.js code blocks. No vague text, only numbers and charts.";
    pub const DEBATE: &str = "Transcript of the 3-round debate and a final Risk Assessment Matrix, \
        highlighting the killer arguments that won.";
    pub const BUSINESS_ANALYSIS: &str =
        "Financial projections (TAM/SAM/SOM), a risk hedge report and a detailed execution plan.";
    pub const FINAL_SYNTHESIS: &str = "A complete report with text, tables, Mermaid charts, \
        debate summary and financial model. English main body plus a Korean summary.";
    pub const KILL_SWITCH: &str = "A PASS or KILL decision naming the gate that failed, if any.";
    pub const STRATEGY_SESSION: &str = "A board meeting transcript with model-name attribution, \
        followed by the official minutes and a GO/NO-GO decision.";
    pub const PLANNING: &str =
        "task.md content with the complete task breakdown, timeline and risk mitigation plan.";
    pub const BLUEPRINT: &str =
        "blueprint.md content containing the master architectural specification.";
    pub const CONSULTATION: &str = "A board discussion transcript with each member's perspective, \
        points of agreement and disagreement, and the final consensus recommendation.";
}

pub mod roles {
    pub const RESEARCHER: &str = "You are the research speed-demon. You scan the web for the most \
        recent data points. You do not analyze; you find evidence. Verify every link you cite and \
        discard dead ones.";
    pub const ANALYST: &str = "You are Quant-X, a data visualization specialist. You find every \
        number in the text and turn it into a chart. Your output is visual: markdown tables and \
        Mermaid charts. You reject vague words like 'significant growth' and demand percentages.";
    pub const SKEPTIC: &str = "You moderate the Dialectic Arena. You do not just critique; you \
        stage a fight between the Eternal Optimist and the Doomsday Pessimist, let them argue, \
        then derive the synthesized truth.";
    pub const STRATEGIST: &str = "You are a veteran strategy consultant. You size TAM/SAM/SOM and \
        ROI with Fermi estimates and design concrete, step-by-step execution workflows. You turn \
        abstract research into money-making logic.";
    pub const WRITER: &str = "You are the master of context. You merge research, charts, debates \
        and business strategy into a single coherent report, in English and Korean with no loss \
        of nuance.";
    pub const CEO: &str = "You are the CEO and Vision Architect. You chair the board, judge whether \
        a proposal solves a real and urgent problem, and own the final GO/NO-GO call.";
    pub const CFO: &str = "You are the CFO, a risk and ROI analyst. You estimate costs, revenue \
        models and break-even timelines, and you flag anything that burns capital.";
    pub const CTO: &str = "You are the CTO, a technology strategist. You rate feasibility, pick \
        the stack and call out scalability and architecture risks.";
    pub const CMO: &str = "You are the CMO, a market expert. You define the target persona, map \
        competitors and choose go-to-market channels.";
    pub const CLO: &str = "You are the CLO, the legal officer. You check legality, trademarks, \
        regulation, privacy and IP. During sanitation screening you only block what is \
        unambiguously fatal.";
    pub const PROJECT_MANAGER: &str = "You are the project manager. You break approved strategy \
        into assignable tasks with dependencies, estimates and a critical path.";
    pub const DESIGNER: &str = "You are the product designer. You define color tokens, layout \
        grids and the interaction model.";
    pub const BACKEND: &str = "You are the backend architect. You lead the blueprint: data \
        schema, API routes and service boundaries, described precisely enough to implement.";
    pub const FRONTEND: &str = "You are the frontend architect. You define components, their \
        props and state logic.";
    pub const QA: &str = "You are the QA engineer. You define the critical test cases every \
        implementation must pass.";
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("static regex"));

/// Fill `{{name}}` placeholders; names the lookup doesn't know become empty
pub fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_not_empty() {
        for template in [
            RESEARCH,
            VISUALIZE_DATA,
            DEBATE,
            BUSINESS_ANALYSIS,
            FINAL_SYNTHESIS,
            KILL_SWITCH,
            STRATEGY_SESSION,
            PLANNING,
            BLUEPRINT,
            CONSULTATION,
            REFINE_LEAN,
            REFINE_FULL,
        ] {
            assert!(!template.trim().is_empty());
        }
    }

    #[test]
    fn test_render_fills_known_and_blanks_unknown() {
        let rendered = render("Topic: {{topic}}|{{missing}}|", |key| match key {
            "topic" => Some("EV batteries"),
            _ => None,
        });
        assert_eq!(rendered, "Topic: EV batteries||");
    }

    #[test]
    fn test_kill_switch_names_all_four_gates() {
        for gate in ["#1", "#2", "#3", "#4"] {
            assert!(KILL_SWITCH.contains(&format!("HARD GATE {gate}")));
        }
        assert!(KILL_SWITCH.contains("{{project_idea}}"));
    }
}
