//! Repository trait definitions (ports).
//!
//! Drafts live in client-side durable storage until the final submit; after
//! that the hosted backend is the source of truth. Each side sits behind its
//! own trait so the wizard never talks to a storage technology directly.
//! Implementations live in tutorhub-infra.

pub mod draft;
pub mod submission;
