//! Governed project run
//!
//! `SCREENING -> {TERMINATED | STRATEGY} -> {TERMINATED | PLANNING} ->
//! BLUEPRINT -> DONE`. Screening is the CLO's Kill Switch check and Strategy
//! is the board session chaired by the CEO. Once the board lets a project
//! through, planning and blueprint run without a further gate.

use crate::error::RunFailure;
use crate::gate::{evaluate, DecisionRecord, GateSchema};
use crate::pipeline::{PipelineRunner, PipelineTranscript};
use crate::progress::ProgressEventKind;
use crate::roles::{RoleId, RoleRegistry};
use crate::run_span;
use crate::task::{build_task, Purpose, TaskContext};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceState {
    Screening,
    Strategy,
    Planning,
    Blueprint,
    Done,
    Terminated,
}

impl GovernanceState {
    /// Role, purpose and gate of the stage run in this state
    fn stage(self) -> Option<(RoleId, Purpose, Option<GateSchema>)> {
        match self {
            GovernanceState::Screening => Some((
                RoleId::Clo,
                Purpose::KillSwitchCheck,
                Some(GateSchema::KillSwitch),
            )),
            GovernanceState::Strategy => Some((
                RoleId::Ceo,
                Purpose::StrategySession,
                Some(GateSchema::Board),
            )),
            GovernanceState::Planning => Some((RoleId::ProjectManager, Purpose::Planning, None)),
            GovernanceState::Blueprint => Some((RoleId::Backend, Purpose::Blueprint, None)),
            GovernanceState::Done | GovernanceState::Terminated => None,
        }
    }

    /// State after this one, given the gate decision if the state has a gate
    pub fn next(self, decision: Option<&DecisionRecord>) -> GovernanceState {
        let terminal = decision.is_some_and(DecisionRecord::is_terminal);
        match self {
            GovernanceState::Screening if terminal => GovernanceState::Terminated,
            GovernanceState::Screening => GovernanceState::Strategy,
            GovernanceState::Strategy if terminal => GovernanceState::Terminated,
            GovernanceState::Strategy => GovernanceState::Planning,
            GovernanceState::Planning => GovernanceState::Blueprint,
            GovernanceState::Blueprint => GovernanceState::Done,
            GovernanceState::Done => GovernanceState::Done,
            GovernanceState::Terminated => GovernanceState::Terminated,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, GovernanceState::Done | GovernanceState::Terminated)
    }
}

impl fmt::Display for GovernanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GovernanceState::Screening => "SCREENING",
            GovernanceState::Strategy => "STRATEGY",
            GovernanceState::Planning => "PLANNING",
            GovernanceState::Blueprint => "BLUEPRINT",
            GovernanceState::Done => "DONE",
            GovernanceState::Terminated => "TERMINATED",
        };
        write!(f, "{s}")
    }
}

/// Result of a governed run that did not fail
#[derive(Debug, Clone)]
pub struct GovernanceOutcome {
    pub state: GovernanceState,
    /// Gate decisions in the order they were made
    pub decisions: Vec<DecisionRecord>,
    pub transcript: PipelineTranscript,
    /// Where the blueprint was written, once DONE
    pub blueprint_path: Option<PathBuf>,
    /// State in which the run was stopped, when TERMINATED
    pub terminated_at: Option<GovernanceState>,
}

impl GovernanceOutcome {
    /// Human-readable account of why the run stopped, if it did
    pub fn termination_summary(&self) -> Option<String> {
        let at = self.terminated_at?;
        let record = self.decisions.last()?;
        let gate = match (record.failed_gate, record.gate_name.as_deref()) {
            (Some(n), Some(name)) => format!(" (gate #{n}: {name})"),
            (Some(n), None) => format!(" (gate #{n})"),
            _ => String::new(),
        };
        let evidence = record
            .evidence
            .as_deref()
            .map(|e| format!("\nEvidence: {e}"))
            .unwrap_or_default();
        Some(format!(
            "Project terminated at {at}: {}{gate}\nReason: {}{evidence}",
            record.decision, record.reason
        ))
    }
}

/// Drive a project idea through screening, strategy, planning and blueprint
pub async fn run_governed(
    runner: &PipelineRunner,
    registry: &RoleRegistry,
    project_idea: &str,
) -> Result<GovernanceOutcome, RunFailure> {
    let span = run_span!(run_id = %runner.run_id(), mode = "governed");
    run_governed_inner(runner, registry, project_idea)
        .instrument(span)
        .await
}

async fn run_governed_inner(
    runner: &PipelineRunner,
    registry: &RoleRegistry,
    project_idea: &str,
) -> Result<GovernanceOutcome, RunFailure> {
    let context = TaskContext::for_project(project_idea)
        .with("topic", project_idea)
        .with("board_roster", registry.board_roster());

    let mut transcript = PipelineTranscript::new();
    let mut decisions = Vec::new();
    let mut blueprint_path = None;
    let mut terminated_at = None;
    let mut state = GovernanceState::Screening;

    runner
        .emit(runner.event(
            ProgressEventKind::RunStart,
            format!("Governed run for \"{project_idea}\""),
        ))
        .await;

    while let Some((role_id, purpose, gate)) = state.stage() {
        info!(state = %state, role = %role_id, "Entering state");
        let task = build_task(&registry.agent(role_id), purpose, &context);

        let stage = match runner.execute_stage(&task, &mut transcript).await {
            Ok(stage) => stage,
            Err(error) => {
                runner
                    .emit(runner.event(ProgressEventKind::RunError, error.user_message()))
                    .await;
                return Err(RunFailure::new(error, transcript));
            }
        };

        let record = gate.map(|schema| evaluate(&stage, schema));
        if let Some(record) = &record {
            runner
                .emit(
                    runner
                        .event(
                            ProgressEventKind::GateDecision,
                            format!("{state}: {}", record.decision),
                        )
                        .with_metadata(serde_json::json!({
                            "state": state,
                            "decision": record.decision,
                            "source": record.source,
                            "failed_gate": record.failed_gate,
                        })),
                )
                .await;
        }

        if purpose == Purpose::Blueprint {
            blueprint_path = stage.saved_to.clone();
        }

        let next = state.next(record.as_ref());
        if next == GovernanceState::Terminated {
            terminated_at = Some(state);
        }
        decisions.extend(record);
        state = next;
    }

    let outcome = GovernanceOutcome {
        state,
        decisions,
        transcript,
        blueprint_path,
        terminated_at,
    };

    match outcome.termination_summary() {
        Some(summary) => {
            warn!(state = %state, "Governed run terminated");
            runner
                .emit(runner.event(ProgressEventKind::RunTerminated, summary))
                .await;
        }
        None => {
            info!(state = %state, "Governed run complete");
            runner
                .emit(runner.event(
                    ProgressEventKind::RunComplete,
                    format!("Governed run complete: {} stage(s)", outcome.transcript.len()),
                ))
                .await;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{BoardVerdict, Decision, DecisionSource, KillSwitchVerdict};

    fn record(decision: Decision) -> DecisionRecord {
        DecisionRecord {
            decision,
            failed_gate: None,
            gate_name: None,
            reason: String::new(),
            evidence: None,
            source: DecisionSource::Structured,
        }
    }

    #[test]
    fn test_transitions() {
        let pass = record(Decision::KillSwitch(KillSwitchVerdict::Pass));
        let kill = record(Decision::KillSwitch(KillSwitchVerdict::Kill));
        let rejected = record(Decision::Board(BoardVerdict::Rejected));
        let conditional = record(Decision::Board(BoardVerdict::Conditional));

        assert_eq!(GovernanceState::Screening.next(Some(&pass)), GovernanceState::Strategy);
        assert_eq!(GovernanceState::Screening.next(Some(&kill)), GovernanceState::Terminated);
        assert_eq!(GovernanceState::Strategy.next(Some(&rejected)), GovernanceState::Terminated);
        assert_eq!(GovernanceState::Strategy.next(Some(&conditional)), GovernanceState::Planning);
        assert_eq!(GovernanceState::Planning.next(None), GovernanceState::Blueprint);
        assert_eq!(GovernanceState::Blueprint.next(None), GovernanceState::Done);
        assert!(GovernanceState::Done.is_final());
    }

    #[test]
    fn test_planning_has_no_gate() {
        let (role, purpose, gate) = GovernanceState::Planning.stage().unwrap();
        assert_eq!(role, RoleId::ProjectManager);
        assert_eq!(purpose, Purpose::Planning);
        assert!(gate.is_none());
    }

    #[test]
    fn test_termination_summary() {
        let outcome = GovernanceOutcome {
            state: GovernanceState::Terminated,
            decisions: vec![DecisionRecord {
                failed_gate: Some(2),
                gate_name: Some("Trademark".to_string()),
                reason: "Exact match".to_string(),
                ..record(Decision::KillSwitch(KillSwitchVerdict::Kill))
            }],
            transcript: PipelineTranscript::new(),
            blueprint_path: None,
            terminated_at: Some(GovernanceState::Screening),
        };
        let summary = outcome.termination_summary().unwrap();
        assert!(summary.contains("SCREENING"));
        assert!(summary.contains("KILL (gate #2: Trademark)"));
        assert!(summary.contains("Exact match"));
    }
}
