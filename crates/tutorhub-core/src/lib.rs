//! Business logic and repository trait definitions for Tutorhub.
//!
//! This crate owns the signup wizard: the draft store, the auto-save
//! coordinator, the step completion tracker, and the wizard controller. It
//! defines the "ports" (repository traits) that the infrastructure layer
//! implements and depends only on `tutorhub-types` -- never on
//! `tutorhub-infra` or any database/IO crate.

pub mod autosave;
pub mod completion;
pub mod draft;
pub mod event;
pub mod form;
pub mod repository;
pub mod wizard;

#[cfg(test)]
mod testing;
