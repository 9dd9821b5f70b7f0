//! Auto-save policy for wizard drafts.
//!
//! - `coordinator`: debounced/immediate saves, flush, clear, save status
//! - `unload`: one-shot flush when the page is hidden or left

pub mod coordinator;
pub mod unload;

pub use coordinator::{AutoSaveCoordinator, DEFAULT_DEBOUNCE};
pub use unload::UnloadGuard;
