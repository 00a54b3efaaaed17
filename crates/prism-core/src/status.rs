//! Shared rebuild-visibility flag.
//!
//! A rebuild wipes both stores before repopulating them, so a query that
//! lands inside that window may see an empty or partially-populated store.
//! The window is made explicit: writers raise the flag for its duration and
//! the query path attaches a warning instead of pretending the stores are
//! consistent.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide store status shared between the ingestion pipeline and the
/// fusion engine.
#[derive(Debug, Default)]
pub struct StoreStatus {
    rebuilding: AtomicBool,
}

impl StoreStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a rebuild as in progress for the lifetime of the returned guard.
    pub fn begin_rebuild(&self) -> RebuildGuard<'_> {
        self.rebuilding.store(true, Ordering::SeqCst);
        RebuildGuard { status: self }
    }

    /// True while a rebuild's wipe-to-recreate window is open.
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }
}

/// Clears the rebuild flag on drop, including on early return or panic.
#[must_use = "dropping the guard immediately ends the rebuild window"]
pub struct RebuildGuard<'a> {
    status: &'a StoreStatus,
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.status.rebuilding.store(false, Ordering::SeqCst);
    }
}
