//! Infrastructure layer for Tutorhub.
//!
//! Contains implementations of the repository traits defined in `tutorhub-core`:
//! SQLite and in-memory draft storage, the HTTP and local submission gateways,
//! the configuration loader, and data directory resolution.

pub mod backend;
pub mod config;
pub mod filesystem;
pub mod gateway;
pub mod memory;
pub mod sqlite;
