//! Structured output schemas for gate decisions
//!
//! These mirror what the screening and board stages are asked to emit. The
//! `decision` fields are plain strings so that casing or decoration the
//! model adds ("pass", "APPROVED.") is normalised by the gate rather than
//! rejected by schema validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kill Switch screening result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KillSwitchResult {
    /// PASS or KILL
    pub decision: String,

    /// Gate number (1-4) that failed, absent on PASS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_failed: Option<u8>,

    /// Name of the failed gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_name: Option<String>,

    /// Detailed reason for the decision
    pub reason: String,

    /// Concrete evidence (registration number, statute citation, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl KillSwitchResult {
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(KillSwitchResult);
        serde_json::to_value(schema).expect("Schema should be serializable")
    }
}

/// Board of Directors decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoardDecision {
    /// APPROVED, REJECTED or CONDITIONAL
    pub decision: String,

    /// Conditions attached to a conditional approval
    #[serde(default)]
    pub conditions: Vec<String>,

    /// Key concerns raised by board members
    #[serde(default)]
    pub concerns: Vec<String>,

    /// Strategic recommendations
    #[serde(default)]
    pub recommendations: Vec<String>,

    /// Individual votes, e.g. {"CEO": "APPROVED", "CFO": "CONDITIONAL"}
    #[serde(default)]
    pub vote_breakdown: BTreeMap<String, String>,
}

impl BoardDecision {
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(BoardDecision);
        serde_json::to_value(schema).expect("Schema should be serializable")
    }
}
