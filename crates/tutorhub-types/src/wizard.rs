//! Wizard session types: phase, navigation gate, and read-only snapshot.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::event::SaveStatus;
use crate::institution::InstitutionReceipt;
use crate::step::StepEvaluation;

/// Where the wizard currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "step", rename_all = "snake_case")]
pub enum WizardPhase {
    /// Editing the given 1-based step.
    Step(u32),
    /// Final submission accepted; terminal.
    Submitted,
}

/// Condition the current step must meet before `next()` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationGate {
    /// The step must be at least `in_progress`.
    RequireStarted,
    /// The step must be `completed`.
    RequireCompleted,
}

impl Default for NavigationGate {
    fn default() -> Self {
        NavigationGate::RequireStarted
    }
}

impl fmt::Display for NavigationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationGate::RequireStarted => write!(f, "require_started"),
            NavigationGate::RequireCompleted => write!(f, "require_completed"),
        }
    }
}

impl FromStr for NavigationGate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "require_started" => Ok(NavigationGate::RequireStarted),
            "require_completed" => Ok(NavigationGate::RequireCompleted),
            other => Err(format!("invalid navigation gate: '{other}'")),
        }
    }
}

/// Per-step line of a [`WizardSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub index: u32,
    pub title: String,
    pub visited: bool,
    pub evaluation: StepEvaluation,
}

/// Read-only view of a wizard session for UI indicators and the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardSnapshot {
    pub form: String,
    pub phase: WizardPhase,
    pub current_step: u32,
    pub highest_reached: u32,
    pub step_count: u32,
    pub is_form_complete: bool,
    pub steps: Vec<StepSummary>,
    pub save_status: SaveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<InstitutionReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
