//! HTTP/REST API layer for Tutorhub.
//!
//! Axum-based REST API at `/api/v1/` driving wizard sessions, with the
//! envelope response format and CORS support.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
