//! Unload protection: flush pending drafts when the user leaves.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::repository::draft::DraftRepository;

use super::coordinator::AutoSaveCoordinator;

/// Armed handle returned by [`AutoSaveCoordinator::protect_unload`].
///
/// The first of `page_hidden` / `navigating_away` flushes every unsaved
/// draft once and disarms the guard. Later calls, and `cleanup`, do nothing.
/// Dropping the guard deregisters it.
pub struct UnloadGuard<R> {
    coordinator: AutoSaveCoordinator<R>,
    armed: AtomicBool,
}

impl<R: DraftRepository + 'static> UnloadGuard<R> {
    pub(crate) fn new(coordinator: AutoSaveCoordinator<R>) -> Self {
        Self {
            coordinator,
            armed: AtomicBool::new(true),
        }
    }

    /// The page or tab was hidden. Returns the number of drafts written.
    pub async fn page_hidden(&self) -> usize {
        self.trigger("page_hidden").await
    }

    /// The user is navigating away. Returns the number of drafts written.
    pub async fn navigating_away(&self) -> usize {
        self.trigger("navigating_away").await
    }

    /// Disarm without saving.
    pub fn cleanup(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    async fn trigger(&self, trigger: &str) -> usize {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return 0;
        }
        let saved = self.coordinator.flush().await;
        info!(trigger = %trigger, saved, "unload protection flushed drafts");
        saved
    }
}
