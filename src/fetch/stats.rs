//! Shared counters for the fetch stage.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared between fetch workers, the writer and the
/// progress reporter.
#[derive(Debug, Default)]
pub struct FetchStats {
    total: AtomicU64,
    done: AtomicU64,
    fetched: AtomicU64,
    skipped: AtomicU64,
    missing: AtomicU64,
    retried: AtomicU64,
    duplicates: AtomicU64,
    status: Mutex<String>,
}

impl FetchStats {
    /// Creates a fresh set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of locators this stage will work through.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    /// Records one locator as finished, whatever the outcome.
    pub fn add_done(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successfully stored payload.
    pub fn add_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a locator skipped by filtering or block exhaustion.
    pub fn add_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a locator the server reported as missing.
    pub fn add_missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one transient-failure retry.
    pub fn add_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a payload stored as a duplicate cross-reference.
    pub fn add_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes a transient status line (streaming download progress).
    pub fn set_status(&self, status: impl Into<String>) {
        if let Ok(mut slot) = self.status.lock() {
            *slot = status.into();
        }
    }

    /// Clears the transient status line.
    pub fn clear_status(&self) {
        self.set_status(String::new());
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn fetched(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn missing(&self) -> u64 {
        self.missing.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Renders the one-line progress string shown by the binary.
    #[must_use]
    pub fn progress(&self) -> String {
        let base = format!("{} of {}", self.done(), self.total());
        let status = self
            .status
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default();
        if status.is_empty() {
            base
        } else {
            format!("{base} ({status})")
        }
    }
}
