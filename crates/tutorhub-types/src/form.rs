//! Declarative form definitions: steps and their field rules.
//!
//! A [`FormDefinition`] is pure data. The completion tracker in
//! `tutorhub-core` interprets the rules; the controller reads
//! `critical_fields` to decide which edits bypass the debounce.

use serde::{Deserialize, Serialize};

/// Format/type check applied to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text with trimmed length bounds (in characters).
    Text { min_len: usize, max_len: usize },
    Email,
    /// Exactly 10 digits.
    Phone,
    /// Exactly 6 digits.
    Pincode,
    /// `http://` or `https://` URL with a host.
    Url,
    /// A calendar year between `min` and the current year, inclusive.
    Year { min: i32 },
    Integer { min: i64, max: i64 },
    /// One value out of a fixed option list.
    OneOf { options: Vec<String> },
    /// Array of option strings with at least `min` entries.
    MultiSelect { min: usize },
    /// Boolean that must be `true` (terms, verification flags).
    Accepted,
    /// Must equal the value of another field in the same step.
    Confirms { field: String },
    Password { min_len: usize },
    /// Key returned by the document upload endpoint.
    FileKey,
}

/// One field's validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub kind: FieldKind,
    /// Required fields must be present; optional ones are only format-checked
    /// when filled in.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldRule {
    pub fn required(field: &str, kind: FieldKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(field: &str, kind: FieldKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
            required: false,
        }
    }
}

/// One wizard step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// 1-based position in the wizard.
    pub index: u32,
    pub title: String,
    pub rules: Vec<FieldRule>,
}

impl StepDefinition {
    pub fn has_required_fields(&self) -> bool {
        self.rules.iter().any(|r| r.required)
    }
}

/// A complete multi-step form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Form name; session identities are derived from it.
    pub name: String,
    pub steps: Vec<StepDefinition>,
    /// Fields whose loss would force the user to redo significant work.
    /// Edits to these are saved immediately instead of debounced.
    #[serde(default)]
    pub critical_fields: Vec<String>,
}

impl FormDefinition {
    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn step(&self, index: u32) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.index == index)
    }

    pub fn is_critical(&self, field: &str) -> bool {
        self.critical_fields.iter().any(|f| f == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FormDefinition {
        FormDefinition {
            name: "sample".to_string(),
            steps: vec![
                StepDefinition {
                    index: 1,
                    title: "Contact".to_string(),
                    rules: vec![FieldRule::required("phone", FieldKind::Phone)],
                },
                StepDefinition {
                    index: 2,
                    title: "Extras".to_string(),
                    rules: vec![FieldRule::optional("website", FieldKind::Url)],
                },
            ],
            critical_fields: vec!["course_categories".to_string()],
        }
    }

    #[test]
    fn test_step_lookup_and_count() {
        let form = sample();
        assert_eq!(form.step_count(), 2);
        assert_eq!(form.step(2).map(|s| s.title.as_str()), Some("Extras"));
        assert!(form.step(3).is_none());
    }

    #[test]
    fn test_has_required_fields() {
        let form = sample();
        assert!(form.step(1).unwrap().has_required_fields());
        assert!(!form.step(2).unwrap().has_required_fields());
    }

    #[test]
    fn test_critical_fields() {
        let form = sample();
        assert!(form.is_critical("course_categories"));
        assert!(!form.is_critical("phone"));
    }

    #[test]
    fn test_rule_deserialize_defaults_to_required() {
        let rule: FieldRule =
            serde_json::from_str(r#"{"field":"pincode","kind":{"type":"pincode"}}"#).unwrap();
        assert!(rule.required);
        assert_eq!(rule.kind, FieldKind::Pincode);
    }
}
