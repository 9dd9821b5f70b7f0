//! Durable draft persistence for wizard steps.

pub mod store;

pub use store::{DraftStore, PROBE_KEY, SaveOutcome};
