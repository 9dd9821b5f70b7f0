//! Step completion states and field-level validation results.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Derived completion state of one wizard step.
///
/// - NotStarted: no draft, or every field still empty
/// - InProgress: something entered but a required check fails
/// - Completed: every required check passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCompletionState {
    NotStarted,
    InProgress,
    Completed,
}

impl fmt::Display for StepCompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepCompletionState::NotStarted => write!(f, "not_started"),
            StepCompletionState::InProgress => write!(f, "in_progress"),
            StepCompletionState::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for StepCompletionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(StepCompletionState::NotStarted),
            "in_progress" => Ok(StepCompletionState::InProgress),
            "completed" => Ok(StepCompletionState::Completed),
            other => Err(format!("invalid step state: '{other}'")),
        }
    }
}

/// Machine-readable reason a field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    Required,
    InvalidType,
    TooShort,
    TooLong,
    InvalidFormat,
    OutOfRange,
    Mismatch,
    NotAccepted,
    InvalidOption,
}

impl fmt::Display for FieldErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            FieldErrorCode::Required => "required",
            FieldErrorCode::InvalidType => "invalid_type",
            FieldErrorCode::TooShort => "too_short",
            FieldErrorCode::TooLong => "too_long",
            FieldErrorCode::InvalidFormat => "invalid_format",
            FieldErrorCode::OutOfRange => "out_of_range",
            FieldErrorCode::Mismatch => "mismatch",
            FieldErrorCode::NotAccepted => "not_accepted",
            FieldErrorCode::InvalidOption => "invalid_option",
        };
        write!(f, "{code}")
    }
}

/// An inline, per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: FieldErrorCode,
    /// Human-readable message shown next to the field.
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, code: FieldErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code,
            message: message.into(),
        }
    }
}

/// Result of classifying one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvaluation {
    pub step: u32,
    pub state: StepCompletionState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl StepEvaluation {
    pub fn is_completed(&self) -> bool {
        self.state == StepCompletionState::Completed
    }

    /// First error reported for `field`, if any.
    pub fn error_for(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_fromstr_roundtrip() {
        for state in [
            StepCompletionState::NotStarted,
            StepCompletionState::InProgress,
            StepCompletionState::Completed,
        ] {
            let parsed: StepCompletionState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("done".parse::<StepCompletionState>().is_err());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&StepCompletionState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_error_for_finds_field() {
        let evaluation = StepEvaluation {
            step: 2,
            state: StepCompletionState::InProgress,
            errors: vec![FieldError::new(
                "phone",
                FieldErrorCode::InvalidFormat,
                "must be 10 digits",
            )],
        };
        assert_eq!(
            evaluation.error_for("phone").map(|e| e.message.as_str()),
            Some("must be 10 digits")
        );
        assert!(evaluation.error_for("email").is_none());
        assert!(!evaluation.is_completed());
    }
}
