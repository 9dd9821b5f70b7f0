//! Draft records and their persisted envelope.
//!
//! A draft is the in-progress data of one wizard step, keyed by the form
//! identity and the 1-based step index. Drafts are stored as JSON inside a
//! versioned [`DraftEnvelope`] so that a stored draft written by an older
//! field set can be recognised and discarded instead of mis-validating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::fmt;
use std::str::FromStr;

/// Current schema version written into every [`DraftEnvelope`].
pub const DRAFT_SCHEMA_VERSION: u32 = 1;

/// Separator between the form identity and the step segment of a storage key.
const STEP_SEPARATOR: &str = "::step-";

/// Field name to field value mapping for one step.
pub type FieldMap = Map<String, Value>;

/// Identity of a single draft: `(form, step)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DraftKey {
    /// Form identity (e.g. `institution-signup/0190c4e2-...`).
    pub form: String,
    /// 1-based step index.
    pub step: u32,
}

impl DraftKey {
    pub fn new(form: impl Into<String>, step: u32) -> Self {
        Self {
            form: form.into(),
            step,
        }
    }

    /// Key under which the draft is written to durable storage.
    pub fn storage_key(&self) -> String {
        format!("{}{STEP_SEPARATOR}{}", self.form, self.step)
    }

    /// Storage-key prefix shared by every step of `form`.
    pub fn form_prefix(form: &str) -> String {
        format!("{form}{STEP_SEPARATOR}")
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

impl FromStr for DraftKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (form, step) = s
            .rsplit_once(STEP_SEPARATOR)
            .ok_or_else(|| format!("invalid draft key: '{s}'"))?;
        if form.is_empty() {
            return Err(format!("invalid draft key: '{s}'"));
        }
        let step = step
            .parse::<u32>()
            .map_err(|_| format!("invalid step in draft key: '{s}'"))?;
        Ok(Self::new(form, step))
    }
}

/// The in-memory form of one step's draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub key: DraftKey,
    pub data: FieldMap,
    /// Set the first time the user lands on the step.
    #[serde(default)]
    pub visited: bool,
    pub updated_at: DateTime<Utc>,
}

impl DraftRecord {
    /// An empty, unvisited record for `key`.
    pub fn new(key: DraftKey) -> Self {
        Self {
            key,
            data: FieldMap::new(),
            visited: false,
            updated_at: Utc::now(),
        }
    }

    /// Set one field and bump `updated_at`.
    pub fn set_field(&mut self, field: impl Into<String>, value: Value) {
        self.data.insert(field.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn field(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// True when no field carries a non-empty value.
    pub fn is_blank(&self) -> bool {
        self.data.values().all(is_empty_value)
    }
}

/// Whether `value` counts as "not filled in".
///
/// Empty and whitespace-only strings, `null`, empty arrays, empty objects
/// and `false` are empty. Numbers are never empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(_) => false,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// The JSON document actually written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEnvelope {
    pub schema_version: u32,
    pub form: String,
    pub step: u32,
    #[serde(default)]
    pub visited: bool,
    pub saved_at: DateTime<Utc>,
    pub data: FieldMap,
}

impl DraftEnvelope {
    /// Wrap a record for storage at the current schema version.
    pub fn wrap(record: &DraftRecord) -> Self {
        Self {
            schema_version: DRAFT_SCHEMA_VERSION,
            form: record.key.form.clone(),
            step: record.key.step,
            visited: record.visited,
            saved_at: Utc::now(),
            data: record.data.clone(),
        }
    }

    /// Unwrap into a record, checking the version and that the envelope
    /// belongs to `key`.
    pub fn unwrap_for(self, key: &DraftKey) -> Result<DraftRecord, EnvelopeMismatch> {
        if self.schema_version != DRAFT_SCHEMA_VERSION {
            return Err(EnvelopeMismatch::Version {
                found: self.schema_version,
            });
        }
        if self.form != key.form || self.step != key.step {
            return Err(EnvelopeMismatch::Key {
                found: DraftKey::new(self.form, self.step).storage_key(),
            });
        }
        Ok(DraftRecord {
            key: key.clone(),
            data: self.data,
            visited: self.visited,
            updated_at: self.saved_at,
        })
    }
}

/// Why a stored envelope was rejected on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeMismatch {
    Version { found: u32 },
    Key { found: String },
}

impl fmt::Display for EnvelopeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeMismatch::Version { found } => write!(
                f,
                "schema version {found} does not match current version {DRAFT_SCHEMA_VERSION}"
            ),
            EnvelopeMismatch::Key { found } => write!(f, "envelope belongs to '{found}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_key_format() {
        let key = DraftKey::new("institution-signup/abc", 3);
        assert_eq!(key.storage_key(), "institution-signup/abc::step-3");
        assert_eq!(key.to_string(), key.storage_key());
    }

    #[test]
    fn test_draft_key_parse_roundtrip() {
        let key: DraftKey = "institution-signup/abc::step-7".parse().unwrap();
        assert_eq!(key.form, "institution-signup/abc");
        assert_eq!(key.step, 7);
    }

    #[test]
    fn test_draft_key_parse_rejects_garbage() {
        assert!("no-step-here".parse::<DraftKey>().is_err());
        assert!("::step-1".parse::<DraftKey>().is_err());
        assert!("form::step-x".parse::<DraftKey>().is_err());
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!("   ")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!("a")));
        assert!(!is_empty_value(&json!(["x"])));
        assert!(!is_empty_value(&json!(true)));
    }

    #[test]
    fn test_record_blank_until_filled() {
        let mut record = DraftRecord::new(DraftKey::new("f", 1));
        assert!(record.is_blank());
        record.set_field("name", json!(""));
        assert!(record.is_blank());
        record.set_field("name", json!("Acme Academy"));
        assert!(!record.is_blank());
    }

    #[test]
    fn test_envelope_unwrap_checks_version() {
        let key = DraftKey::new("f", 1);
        let mut envelope = DraftEnvelope::wrap(&DraftRecord::new(key.clone()));
        envelope.schema_version = 0;
        assert_eq!(
            envelope.unwrap_for(&key),
            Err(EnvelopeMismatch::Version { found: 0 })
        );
    }

    #[test]
    fn test_envelope_unwrap_checks_key() {
        let key = DraftKey::new("f", 1);
        let envelope = DraftEnvelope::wrap(&DraftRecord::new(key));
        let other = DraftKey::new("f", 2);
        assert!(matches!(
            envelope.unwrap_for(&other),
            Err(EnvelopeMismatch::Key { .. })
        ));
    }

    #[test]
    fn test_envelope_preserves_visited_and_data() {
        let key = DraftKey::new("f", 5);
        let mut record = DraftRecord::new(key.clone());
        record.visited = true;
        record.set_field("facilities", json!(["library", "lab"]));

        let restored = DraftEnvelope::wrap(&record).unwrap_for(&key).unwrap();
        assert!(restored.visited);
        assert_eq!(restored.data, record.data);
    }
}
