//! Per-step completion tracking.

pub mod tracker;

pub use tracker::CompletionTracker;
