//! Save status and save events for the auto-save subsystem.
//!
//! `SaveStatus` is the snapshot read by save indicators. `SaveEvent` is the
//! side channel through which the draft store reports failures without
//! interrupting the caller. All variants are Clone + Send + Sync for use
//! with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transient save status of one wizard session. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveStatus {
    pub is_saving: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub has_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Events published by the draft store and auto-save coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaveEvent {
    /// Durable storage failed its availability probe. Published at most
    /// once per store; the session continues with in-memory state only.
    StorageUnavailable { reason: String },

    /// A draft was written.
    Saved { key: String, at: DateTime<Utc> },

    /// A single save attempt failed. The data is still held in memory.
    SaveFailed { key: String, reason: String },

    /// A draft was removed (explicit clear or after submission).
    Cleared { key: String },

    /// Removing a draft failed.
    ClearFailed { key: String, reason: String },

    /// A stored draft could not be used and was treated as absent.
    RestoreDiscarded { key: String, reason: String },
}

impl SaveEvent {
    /// Whether this event reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SaveEvent::StorageUnavailable { .. }
                | SaveEvent::SaveFailed { .. }
                | SaveEvent::ClearFailed { .. }
        )
    }
}
