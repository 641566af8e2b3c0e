//! Entry extraction stage.
//!
//! Walks every fetched, unprocessed record, asks the plugin to break
//! its payload into candidate segments and extracts a headword,
//! alternates and a definition from each. Records are marked
//! `PROCESSED` whether or not they yield entries, so the selection
//! shrinks monotonically and a resumed run picks up exactly where this
//! one stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::plugin::{Plugin, PluginError};
use crate::store::{Store, StoreError, TaskRecord};
use crate::workdir::WorkDir;

/// Matches a headword carrying a parenthesized integer suffix,
/// capturing the bare form.
static NUMBERED_HEADWORD: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(.*)\([0-9]+\)$").unwrap()
});

/// Errors raised by the processor stage.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A file-backed payload could not be read.
    #[error("cannot read payload file {path}: {source}")]
    Io {
        /// The file named by the record's locator.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A memory-tagged record's payload was not supplied by the plugin.
    #[error("no in-memory payload for record {0}")]
    MissingMemoryPayload(i64),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Plugin extraction failure.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Counts reported after a processing run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    /// Records consumed.
    pub records: u64,
    /// Entries inserted.
    pub entries: u64,
    /// Alternate forms inserted.
    pub alternates: u64,
}

/// Extracts entries from fetched payloads.
///
/// Strictly single-threaded; it is the only store mutator while it runs.
pub struct Processor {
    store: Store,
    plugin: Arc<dyn Plugin>,
    workdir: WorkDir,
    cancel: CancelToken,
    done: AtomicU64,
    total: AtomicU64,
}

impl Processor {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: Store, plugin: Arc<dyn Plugin>, workdir: WorkDir, cancel: CancelToken) -> Self {
        Self {
            store,
            plugin,
            workdir,
            cancel,
            done: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Renders the current progress line.
    #[must_use]
    pub fn progress(&self) -> String {
        format!(
            "{} of {}",
            self.done.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed)
        )
    }

    /// Processes every pending record.
    ///
    /// On cancellation the current record's partial entries are deleted
    /// and it stays unprocessed, so the flag state never lies.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] on IO, plugin or persistence failures.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ProcessStats, ProcessError> {
        let records = self.store.processable().await?;
        self.total.store(records.len() as u64, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);

        let mut stats = ProcessStats::default();
        for record in records {
            if self.cancel.is_cancelled() {
                debug!("cancelled, stopping processor");
                break;
            }

            let finished = self.process_one(&record, &mut stats).await?;
            if !finished {
                self.store.delete_entries_for_task(record.id).await?;
                debug!(id = record.id, "partial entries removed after cancellation");
                break;
            }

            self.store.mark_processed(record.id).await?;
            stats.records += 1;
            self.done.fetch_add(1, Ordering::Relaxed);
        }

        info!(
            records = stats.records,
            entries = stats.entries,
            alternates = stats.alternates,
            "processing finished"
        );
        Ok(stats)
    }

    /// Processes one record; returns false when cancelled mid-record.
    async fn process_one(
        &self,
        record: &TaskRecord,
        stats: &mut ProcessStats,
    ) -> Result<bool, ProcessError> {
        let Some(payload) = self.load_payload(record)? else {
            return Ok(true);
        };

        for segment in self.plugin.segments(&payload) {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let Some(headword) = self.plugin.headword(&segment)? else {
                continue;
            };
            let headword = headword.trim().to_string();
            if headword.is_empty() {
                continue;
            }
            let Some(definition) = self.plugin.definition(&segment)? else {
                continue;
            };
            let definition = definition.trim().to_string();
            if definition.is_empty() {
                continue;
            }

            let mut alternates = self.plugin.alternates(&segment, &headword)?;
            if alternates.is_empty() {
                alternates = default_alternates(&headword);
            }

            let entry_id = self
                .store
                .insert_entry(&headword, &definition, record.id)
                .await?;
            stats.entries += 1;

            let mut seen = Vec::new();
            for form in alternates {
                let form = form.trim().to_string();
                if form.is_empty() || form == headword || seen.contains(&form) {
                    continue;
                }
                self.store.insert_alternate(entry_id, &form).await?;
                seen.push(form);
                stats.alternates += 1;
            }
        }
        Ok(true)
    }

    /// Loads the record's payload text per its location tag.
    fn load_payload(&self, record: &TaskRecord) -> Result<Option<String>, ProcessError> {
        let flags = record.flags();
        if flags.is_file() {
            let path = self.workdir.root().join(&record.locator);
            let bytes = std::fs::read(&path).map_err(|source| ProcessError::Io { path, source })?;
            return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
        if flags.is_memory() {
            return self
                .plugin
                .memory_payload(&record.locator)
                .map(Some)
                .ok_or(ProcessError::MissingMemoryPayload(record.id));
        }
        Ok(record.payload_text().filter(|text| !text.is_empty()))
    }
}

/// Alternates derived from a headword with a parenthesized suffix:
/// the bare form and its lowercase.
fn default_alternates(headword: &str) -> Vec<String> {
    let Some(captures) = NUMBERED_HEADWORD.captures(headword.trim()) else {
        return Vec::new();
    };
    let bare = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    if bare.is_empty() {
        return Vec::new();
    }
    let lowered = bare.to_lowercase();
    let mut forms = vec![bare.clone()];
    if lowered != bare {
        forms.push(lowered);
    }
    forms
}
