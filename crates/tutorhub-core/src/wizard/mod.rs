//! Multi-step wizard sessions.

pub mod controller;

pub use controller::{DEFAULT_SUBMISSION_TIMEOUT, WizardController, WizardSettings};
