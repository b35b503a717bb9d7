//! Decision gate
//!
//! Turns a gate stage's output into a [`DecisionRecord`]. The structured
//! result is read first; if that is missing or unusable the raw text is
//! scanned against the marker table. Only an affirmatively read negative
//! decision terminates a run.

pub mod markers;
pub mod schema;

pub use markers::{Marker, Strength, BOARD_MARKERS, KILL_SWITCH_MARKERS, MARKER_TABLE_VERSION};
pub use schema::{BoardDecision, KillSwitchResult};

use crate::gate_span;
use crate::pipeline::{extract_json, StageResult};
use crate::task::SchemaMode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchVerdict {
    Pass,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardVerdict {
    Approved,
    Rejected,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    KillSwitch(KillSwitchVerdict),
    Board(BoardVerdict),
}

impl Decision {
    /// True for the decisions that end a governed run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Decision::KillSwitch(KillSwitchVerdict::Kill) | Decision::Board(BoardVerdict::Rejected)
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::KillSwitch(KillSwitchVerdict::Pass) => "PASS",
            Decision::KillSwitch(KillSwitchVerdict::Kill) => "KILL",
            Decision::Board(BoardVerdict::Approved) => "APPROVED",
            Decision::Board(BoardVerdict::Rejected) => "REJECTED",
            Decision::Board(BoardVerdict::Conditional) => "CONDITIONAL",
        };
        write!(f, "{s}")
    }
}

/// Which gate a stage feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSchema {
    KillSwitch,
    Board,
}

impl GateSchema {
    pub fn markers(self) -> &'static [Marker] {
        match self {
            GateSchema::KillSwitch => KILL_SWITCH_MARKERS,
            GateSchema::Board => BOARD_MARKERS,
        }
    }

    fn mode(self) -> SchemaMode {
        match self {
            GateSchema::KillSwitch => SchemaMode::WholeResponse,
            GateSchema::Board => SchemaMode::TrailingBlock,
        }
    }

    /// Continue branch used when nothing could be read
    pub fn default_decision(self) -> Decision {
        match self {
            GateSchema::KillSwitch => Decision::KillSwitch(KillSwitchVerdict::Pass),
            GateSchema::Board => Decision::Board(BoardVerdict::Conditional),
        }
    }
}

impl fmt::Display for GateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateSchema::KillSwitch => write!(f, "kill_switch"),
            GateSchema::Board => write!(f, "board"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Structured,
    MarkerFallback,
    DefaultContinue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub failed_gate: Option<u8>,
    pub gate_name: Option<String>,
    pub reason: String,
    pub evidence: Option<String>,
    pub source: DecisionSource,
}

impl DecisionRecord {
    pub fn is_terminal(&self) -> bool {
        self.decision.is_terminal()
    }
}

/// Evaluate a gate stage. Never fails: ambiguity resolves to the continue branch.
pub fn evaluate(stage: &StageResult, schema: GateSchema) -> DecisionRecord {
    let span = gate_span!(stage = stage.index, gate = %schema);
    let _enter = span.enter();

    let record = structured_decision(stage, schema)
        .or_else(|| marker_decision(&stage.raw_text, schema))
        .unwrap_or_else(|| DecisionRecord {
            decision: schema.default_decision(),
            failed_gate: None,
            gate_name: None,
            reason: "No decision could be read from the stage output; continuing".to_string(),
            evidence: None,
            source: DecisionSource::DefaultContinue,
        });

    info!(
        decision = %record.decision,
        source = ?record.source,
        failed_gate = record.failed_gate,
        "Gate evaluated"
    );
    record
}

/// Uppercase, trim and strip decoration such as `**APPROVED.**`
fn normalise(decision: &str) -> String {
    decision
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_uppercase()
}

fn kill_switch_verdict(decision: &str) -> Option<KillSwitchVerdict> {
    match normalise(decision).as_str() {
        "PASS" | "PASSED" => Some(KillSwitchVerdict::Pass),
        "KILL" | "KILLED" => Some(KillSwitchVerdict::Kill),
        _ => None,
    }
}

fn board_verdict(decision: &str) -> Option<BoardVerdict> {
    match normalise(decision).as_str() {
        "APPROVED" | "APPROVE" | "GO" => Some(BoardVerdict::Approved),
        "REJECTED" | "REJECT" | "NO-GO" | "NO GO" => Some(BoardVerdict::Rejected),
        "CONDITIONAL" | "CONDITIONALLY APPROVED" => Some(BoardVerdict::Conditional),
        _ => None,
    }
}

fn structured_decision(stage: &StageResult, schema: GateSchema) -> Option<DecisionRecord> {
    let value = stage
        .parsed
        .clone()
        .or_else(|| extract_json(&stage.raw_text, schema.mode()))?;

    let record = match schema {
        GateSchema::KillSwitch => {
            let result: KillSwitchResult = serde_json::from_value(value).ok()?;
            let verdict = kill_switch_verdict(&result.decision)?;
            DecisionRecord {
                decision: Decision::KillSwitch(verdict),
                failed_gate: result.gate_failed,
                gate_name: result.gate_name,
                reason: result.reason,
                evidence: result.evidence,
                source: DecisionSource::Structured,
            }
        }
        GateSchema::Board => {
            let result: BoardDecision = serde_json::from_value(value).ok()?;
            let verdict = board_verdict(&result.decision)?;
            DecisionRecord {
                decision: Decision::Board(verdict),
                failed_gate: None,
                gate_name: None,
                reason: board_reason(&result),
                evidence: None,
                source: DecisionSource::Structured,
            }
        }
    };
    debug!("Structured decision read");
    Some(record)
}

fn board_reason(result: &BoardDecision) -> String {
    let mut parts = Vec::new();
    if !result.concerns.is_empty() {
        parts.push(format!("Concerns: {}", result.concerns.join("; ")));
    }
    if !result.conditions.is_empty() {
        parts.push(format!("Conditions: {}", result.conditions.join("; ")));
    }
    if parts.is_empty() {
        format!("Board decision: {}", normalise(&result.decision))
    } else {
        parts.join(" | ")
    }
}

static GATE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)gate\s*#?\s*([1-4])\b").expect("static regex"));

fn marker_decision(text: &str, schema: GateSchema) -> Option<DecisionRecord> {
    let found = markers::scan(text, schema.markers());
    let negative = found.iter().find(|m| m.strength == Strength::StrongNegative);

    let (decision, token) = match (schema, negative) {
        (GateSchema::KillSwitch, Some(m)) => (Decision::KillSwitch(KillSwitchVerdict::Kill), m.token),
        (GateSchema::Board, Some(m)) => (Decision::Board(BoardVerdict::Rejected), m.token),
        (_, None) => {
            let positive = found.first()?;
            let decision = match schema {
                GateSchema::KillSwitch => Decision::KillSwitch(KillSwitchVerdict::Pass),
                GateSchema::Board if found.iter().any(|m| m.token == "CONDITIONAL") => {
                    Decision::Board(BoardVerdict::Conditional)
                }
                GateSchema::Board => Decision::Board(BoardVerdict::Approved),
            };
            (decision, positive.token)
        }
    };

    let failed_gate = match decision {
        Decision::KillSwitch(KillSwitchVerdict::Kill) => GATE_NUMBER
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    };

    debug!(token, table_version = MARKER_TABLE_VERSION, "Marker decision read");
    Some(DecisionRecord {
        decision,
        failed_gate,
        gate_name: None,
        reason: format!("Marker '{token}' found in stage output"),
        evidence: None,
        source: DecisionSource::MarkerFallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleId;
    use crate::task::Purpose;
    use serde_json::json;

    fn stage(text: &str, parsed: Option<serde_json::Value>) -> StageResult {
        StageResult {
            index: 1,
            role_id: RoleId::Clo,
            role_label: "CLO [Deep]".to_string(),
            purpose: Purpose::KillSwitchCheck,
            raw_text: text.to_string(),
            parsed,
            saved_to: None,
        }
    }

    #[test]
    fn test_structured_kill() {
        let parsed = json!({
            "decision": "KILL",
            "gate_failed": 2,
            "gate_name": "Trademark",
            "reason": "Exact match with a registered mark",
            "evidence": "Reg. 40-0000000"
        });
        let record = evaluate(&stage("", Some(parsed)), GateSchema::KillSwitch);
        assert_eq!(record.decision, Decision::KillSwitch(KillSwitchVerdict::Kill));
        assert_eq!(record.failed_gate, Some(2));
        assert_eq!(record.source, DecisionSource::Structured);
        assert!(record.is_terminal());
    }

    #[test]
    fn test_structured_decision_is_normalised() {
        let parsed = json!({"decision": " **pass.** ", "reason": "clear"});
        let record = evaluate(&stage("", Some(parsed)), GateSchema::KillSwitch);
        assert_eq!(record.decision, Decision::KillSwitch(KillSwitchVerdict::Pass));
        assert_eq!(record.source, DecisionSource::Structured);
    }

    #[test]
    fn test_unknown_structured_decision_falls_back_to_markers() {
        let text = r#"{"decision": "MAYBE", "reason": "unclear"} but really: KILL"#;
        let record = evaluate(&stage(text, None), GateSchema::KillSwitch);
        assert_eq!(record.decision, Decision::KillSwitch(KillSwitchVerdict::Kill));
        assert_eq!(record.source, DecisionSource::MarkerFallback);
    }

    #[test]
    fn test_marker_fallback_extracts_gate_number() {
        let record = evaluate(
            &stage("Decision: KILL. Gate #2 (Trademark) failed.", None),
            GateSchema::KillSwitch,
        );
        assert_eq!(record.decision, Decision::KillSwitch(KillSwitchVerdict::Kill));
        assert_eq!(record.failed_gate, Some(2));
    }

    #[test]
    fn test_negative_marker_wins() {
        let record = evaluate(
            &stage("CFO: APPROVED. CTO: GO. Final: REJECTED.", None),
            GateSchema::Board,
        );
        assert_eq!(record.decision, Decision::Board(BoardVerdict::Rejected));
    }

    #[test]
    fn test_board_positive_markers() {
        let approved = evaluate(&stage("Verdict: APPROVED", None), GateSchema::Board);
        assert_eq!(approved.decision, Decision::Board(BoardVerdict::Approved));

        let conditional = evaluate(
            &stage("APPROVED, but CONDITIONAL on a pilot", None),
            GateSchema::Board,
        );
        assert_eq!(conditional.decision, Decision::Board(BoardVerdict::Conditional));
    }

    #[test]
    fn test_no_marker_continues() {
        let record = evaluate(&stage("The board discussed at length.", None), GateSchema::Board);
        assert_eq!(record.decision, Decision::Board(BoardVerdict::Conditional));
        assert_eq!(record.source, DecisionSource::DefaultContinue);
        assert!(!record.is_terminal());

        let record = evaluate(&stage("KILL SWITCH review complete", None), GateSchema::KillSwitch);
        assert_eq!(record.decision, Decision::KillSwitch(KillSwitchVerdict::Pass));
        assert_eq!(record.source, DecisionSource::DefaultContinue);
    }

    #[test]
    fn test_lowercase_go_in_prose_is_not_approval() {
        let record = evaluate(
            &stage("CEO: Let's go ahead and hear the CFO first.", None),
            GateSchema::Board,
        );
        assert_eq!(record.decision, Decision::Board(BoardVerdict::Conditional));
        assert_eq!(record.source, DecisionSource::DefaultContinue);
    }

    #[test]
    fn test_trailing_board_block() {
        let text = "CEO: Let's hear from everyone.\nCFO: numbers look thin.\n\
                    ```json\n{\"decision\": \"REJECTED\", \"concerns\": [\"ROI\"]}\n```";
        let record = evaluate(&stage(text, None), GateSchema::Board);
        assert_eq!(record.decision, Decision::Board(BoardVerdict::Rejected));
        assert_eq!(record.source, DecisionSource::Structured);
        assert!(record.reason.contains("ROI"));
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::Board(BoardVerdict::Conditional).to_string(), "CONDITIONAL");
        assert_eq!(Decision::KillSwitch(KillSwitchVerdict::Kill).to_string(), "KILL");
    }
}
