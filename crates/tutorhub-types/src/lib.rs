//! Shared domain types for Tutorhub.
//!
//! This crate contains the types used across the signup wizard: drafts and
//! their storage envelope, form definitions, step states, save events,
//! Submission Gateway payloads, configuration, and error enums.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod draft;
pub mod error;
pub mod event;
pub mod form;
pub mod institution;
pub mod step;
pub mod wizard;
