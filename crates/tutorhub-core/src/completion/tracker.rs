//! Step completion tracker: derives a step's state from its draft and the
//! step's field rules.
//!
//! Stateless; all logic is in associated functions. Classification is a pure
//! function of the record, so re-rendering can never move a step backwards.

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use serde_json::Value;
use url::{Host, Url};

use tutorhub_types::draft::{DraftRecord, FieldMap, is_empty_value};
use tutorhub_types::form::{FieldKind, FieldRule, FormDefinition, StepDefinition};
use tutorhub_types::step::{FieldError, FieldErrorCode, StepCompletionState, StepEvaluation};

/// Stateless step classifier.
pub struct CompletionTracker;

impl CompletionTracker {
    /// Classify one step.
    ///
    /// - no record, or nothing filled in: `NotStarted`. A step without
    ///   required fields counts as started once visited.
    /// - every rule passes: `Completed`
    /// - otherwise `InProgress`, with the failing fields listed
    pub fn classify(step: &StepDefinition, record: Option<&DraftRecord>) -> StepEvaluation {
        let not_started = StepEvaluation {
            step: step.index,
            state: StepCompletionState::NotStarted,
            errors: Vec::new(),
        };
        let Some(record) = record else {
            return not_started;
        };
        if record.is_blank() && (step.has_required_fields() || !record.visited) {
            return not_started;
        }

        let errors: Vec<FieldError> = step
            .rules
            .iter()
            .filter_map(|rule| Self::validate_field(rule, record.field(&rule.field), &record.data))
            .collect();

        let state = if errors.is_empty() {
            StepCompletionState::Completed
        } else {
            StepCompletionState::InProgress
        };
        StepEvaluation {
            step: step.index,
            state,
            errors,
        }
    }

    /// Classify every step of `form` against the records keyed by step index.
    pub fn classify_form(
        form: &FormDefinition,
        records: &BTreeMap<u32, DraftRecord>,
    ) -> Vec<StepEvaluation> {
        form.steps
            .iter()
            .map(|step| Self::classify(step, records.get(&step.index)))
            .collect()
    }

    /// Indices of steps that are not `Completed`.
    pub fn incomplete_steps(evaluations: &[StepEvaluation]) -> Vec<u32> {
        evaluations
            .iter()
            .filter(|e| !e.is_completed())
            .map(|e| e.step)
            .collect()
    }

    /// Check one field. `data` is the whole step, for cross-field rules.
    pub fn validate_field(
        rule: &FieldRule,
        value: Option<&Value>,
        data: &FieldMap,
    ) -> Option<FieldError> {
        let field = rule.field.as_str();
        match value {
            Some(v) if !is_empty_value(v) => check_format(field, &rule.kind, v, data).err(),
            _ if !rule.required => None,
            _ if rule.kind == FieldKind::Accepted => Some(FieldError::new(
                field,
                FieldErrorCode::NotAccepted,
                "must be accepted",
            )),
            _ => Some(FieldError::new(field, FieldErrorCode::Required, "is required")),
        }
    }
}

// ---------------------------------------------------------------------------
// Format checks
// ---------------------------------------------------------------------------

fn check_format(field: &str, kind: &FieldKind, value: &Value, data: &FieldMap) -> Result<(), FieldError> {
    let fail = |code, message: String| Err(FieldError::new(field, code, message));

    match kind {
        FieldKind::Text { min_len, max_len } => {
            let len = text(field, value)?.trim().chars().count();
            if len < *min_len {
                return fail(
                    FieldErrorCode::TooShort,
                    format!("must be at least {min_len} characters"),
                );
            }
            if len > *max_len {
                return fail(
                    FieldErrorCode::TooLong,
                    format!("must be at most {max_len} characters"),
                );
            }
            Ok(())
        }
        FieldKind::Email => {
            if is_valid_email(text(field, value)?.trim()) {
                Ok(())
            } else {
                fail(FieldErrorCode::InvalidFormat, "must be a valid email address".into())
            }
        }
        FieldKind::Phone => digits(field, value, 10),
        FieldKind::Pincode => digits(field, value, 6),
        FieldKind::Url => {
            if is_valid_url(text(field, value)?.trim()) {
                Ok(())
            } else {
                fail(FieldErrorCode::InvalidFormat, "must be a valid URL".into())
            }
        }
        FieldKind::Year { min } => {
            let current = i64::from(Utc::now().year());
            let min = i64::from(*min);
            let Some(year) = as_integer(value) else {
                return fail(FieldErrorCode::InvalidType, "must be a year".into());
            };
            if year < min || year > current {
                return fail(
                    FieldErrorCode::OutOfRange,
                    format!("must be between {min} and {current}"),
                );
            }
            Ok(())
        }
        FieldKind::Integer { min, max } => {
            let Some(n) = as_integer(value) else {
                return fail(FieldErrorCode::InvalidType, "must be a whole number".into());
            };
            if n < *min || n > *max {
                return fail(
                    FieldErrorCode::OutOfRange,
                    format!("must be between {min} and {max}"),
                );
            }
            Ok(())
        }
        FieldKind::OneOf { options } => {
            let choice = text(field, value)?;
            if options.iter().any(|o| o == choice) {
                Ok(())
            } else {
                fail(
                    FieldErrorCode::InvalidOption,
                    format!("must be one of: {}", options.join(", ")),
                )
            }
        }
        FieldKind::MultiSelect { min } => {
            let Some(items) = value.as_array() else {
                return fail(FieldErrorCode::InvalidType, "must be a list".into());
            };
            let all_options = items
                .iter()
                .all(|item| item.as_str().is_some_and(|s| !s.trim().is_empty()));
            if !all_options {
                return fail(FieldErrorCode::InvalidType, "must be a list of options".into());
            }
            if items.len() < *min {
                return fail(FieldErrorCode::TooShort, format!("select at least {min}"));
            }
            Ok(())
        }
        FieldKind::Accepted => {
            if value == &Value::Bool(true) {
                Ok(())
            } else {
                fail(FieldErrorCode::NotAccepted, "must be accepted".into())
            }
        }
        FieldKind::Confirms { field: other } => {
            if data.get(other) == Some(value) {
                Ok(())
            } else {
                fail(FieldErrorCode::Mismatch, format!("does not match {other}"))
            }
        }
        FieldKind::Password { min_len } => {
            if text(field, value)?.chars().count() < *min_len {
                return fail(
                    FieldErrorCode::TooShort,
                    format!("must be at least {min_len} characters"),
                );
            }
            Ok(())
        }
        FieldKind::FileKey => text(field, value).map(|_| ()),
    }
}

fn text<'a>(field: &str, value: &'a Value) -> Result<&'a str, FieldError> {
    value
        .as_str()
        .ok_or_else(|| FieldError::new(field, FieldErrorCode::InvalidType, "must be text"))
}

fn digits(field: &str, value: &Value, count: usize) -> Result<(), FieldError> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(FieldError::new(field, FieldErrorCode::InvalidType, "must be text")),
    };
    if raw.len() == count && raw.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(FieldError::new(
            field,
            FieldErrorCode::InvalidFormat,
            format!("must be {count} digits"),
        ))
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

fn is_valid_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    match parsed.host() {
        Some(Host::Domain(domain)) => domain.split('.').all(is_valid_label),
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        None => false,
    }
}

/// One DNS label: letters, digits and inner hyphens.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
