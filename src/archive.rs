//! Archive expansion stage.
//!
//! Turns every fetched-but-unexpanded archive into file-backed task
//! records: entries the plugin wants as data land under `raw/` and are
//! inserted as `FILE` tasks for the processor; entries it wants as
//! resources are copied to `res/`. The archive record is then marked
//! `PROCESSED` so a resumed run skips it.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::plugin::Plugin;
use crate::store::{Store, StoreError, TaskFlags, TaskRecord};
use crate::workdir::WorkDir;

/// Errors raised while expanding archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Reading or writing an archive or extracted file failed.
    #[error("archive IO failed on {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The archive file is corrupt or not a zip.
    #[error("cannot read archive {path}: {message}")]
    Malformed {
        /// The archive path.
        path: PathBuf,
        /// Decoder error text.
        message: String,
    },

    /// An archive record carries no stored path.
    #[error("archive record {0} has no stored path")]
    MissingPath(i64),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ArchiveError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Counts reported after an expansion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Archives fully expanded.
    pub archives: u64,
    /// Data files extracted and inserted as tasks.
    pub files: u64,
    /// Resource files copied to `res/`.
    pub resources: u64,
}

/// Expands fetched archives into file-backed task records.
///
/// Strictly single-threaded; it is the only store mutator while it runs.
pub struct ArchiveExpander {
    store: Store,
    plugin: Arc<dyn Plugin>,
    workdir: WorkDir,
    cancel: CancelToken,
    done: AtomicU64,
    total: AtomicU64,
}

impl ArchiveExpander {
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

    /// Expands every unexpanded archive.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] on IO, zip or persistence failures.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ArchiveStats, ArchiveError> {
        let archives = self.store.unexpanded_archives().await?;
        self.total.store(archives.len() as u64, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);

        let mut stats = ArchiveStats::default();
        for record in archives {
            if self.cancel.is_cancelled() {
                debug!("cancelled, stopping expansion");
                break;
            }
            let complete = self.expand_one(&record, &mut stats).await?;
            if !complete {
                debug!(id = record.id, "cancelled mid-archive, left unprocessed");
                break;
            }
            self.store.mark_processed(record.id).await?;
            stats.archives += 1;
            self.done.fetch_add(1, Ordering::Relaxed);
        }

        info!(
            archives = stats.archives,
            files = stats.files,
            resources = stats.resources,
            "archive expansion finished"
        );
        Ok(stats)
    }

    /// Expands one archive; returns false when cancelled mid-archive.
    ///
    /// The caller must not mark a false return as processed: a resumed
    /// run redoes the whole archive and insert-if-absent keeps that
    /// idempotent.
    async fn expand_one(
        &self,
        record: &TaskRecord,
        stats: &mut ArchiveStats,
    ) -> Result<bool, ArchiveError> {
        let relative = record
            .payload_text()
            .ok_or(ArchiveError::MissingPath(record.id))?;
        let archive_path = self.workdir.root().join(&relative);
        debug!(id = record.id, path = %archive_path.display(), "expanding archive");

        let file = std::fs::File::open(&archive_path)
            .map_err(|source| ArchiveError::io(&archive_path, source))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|error| ArchiveError::Malformed {
            path: archive_path.clone(),
            message: error.to_string(),
        })?;

        for index in 0..archive.len() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            // The zip entry handle is not Send; read everything out of
            // it in this block so it is gone before any await below.
            let extracted = {
                let mut entry =
                    archive
                        .by_index(index)
                        .map_err(|error| ArchiveError::Malformed {
                            path: archive_path.clone(),
                            message: error.to_string(),
                        })?;
                if entry.is_dir() {
                    None
                } else {
                    let entry_name = entry.name().to_string();
                    let include = self.plugin.archive_include(&entry_name);
                    let resource = self.plugin.archive_resource(&entry_name);
                    if include || resource {
                        let mut contents = Vec::new();
                        entry
                            .read_to_end(&mut contents)
                            .map_err(|source| ArchiveError::io(&archive_path, source))?;
                        Some((entry_name, contents, include, resource))
                    } else {
                        None
                    }
                }
            };
            let Some((entry_name, contents, include, resource)) = extracted else {
                continue;
            };
            let basename = sanitize_entry_name(&entry_name);

            if include {
                let relative_out = format!("raw/{}_{}_{}", record.id, index, basename);
                let out_path = self.workdir.root().join(&relative_out);
                std::fs::write(&out_path, &contents)
                    .map_err(|source| ArchiveError::io(&out_path, source))?;

                let flags = TaskFlags::FILE | TaskFlags::FETCHED;
                if self
                    .store
                    .insert_task_if_absent(&relative_out, flags)
                    .await?
                    .is_none()
                {
                    warn!(path = %relative_out, "extracted file already recorded");
                }
                stats.files += 1;
            }

            if resource {
                let res_path = self.workdir.res().join(&basename);
                std::fs::write(&res_path, &contents)
                    .map_err(|source| ArchiveError::io(&res_path, source))?;
                stats.resources += 1;
            }
        }
        Ok(true)
    }
}

/// Flattens an archive entry name into a safe file basename.
fn sanitize_entry_name(entry_name: &str) -> String {
    let basename = entry_name.rsplit('/').next().unwrap_or(entry_name);
    let sanitized: String = basename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "entry".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::Database;
    use crate::fetch::FetchMode;
    use crate::frontier::Frontier;
    use crate::plugin::PluginError;

    /// Includes every entry, but requests cancellation as a side effect
    /// of the first include decision.
    struct InterruptedSource {
        cancel: CancelToken,
    }

    impl Plugin for InterruptedSource {
        fn name(&self) -> &str {
            "interrupted"
        }

        fn frontier(&self, _mode: FetchMode) -> Result<Frontier, PluginError> {
            Ok(Frontier::empty())
        }

        fn headword(&self, _segment: &str) -> Result<Option<String>, PluginError> {
            Ok(None)
        }

        fn definition(&self, _segment: &str) -> Result<Option<String>, PluginError> {
            Ok(None)
        }

        fn archive_include(&self, _entry_name: &str) -> bool {
            self.cancel.cancel();
            true
        }
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_expander_cancelled_mid_archive_stays_unprocessed() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let temp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(temp.path());
        workdir.ensure().unwrap();

        let bytes = build_zip(&[("a.html", b"first"), ("b.html", b"second")]);
        std::fs::write(workdir.root().join("zip/1_dict.zip"), &bytes).unwrap();
        let id = store
            .insert_task(
                "https://example.com/dict.zip",
                Some(b"zip/1_dict.zip"),
                TaskFlags::ZIP_FETCHER | TaskFlags::FETCHED,
            )
            .await
            .unwrap();

        let cancel = CancelToken::new();
        let expander = ArchiveExpander::new(
            store.clone(),
            Arc::new(InterruptedSource {
                cancel: cancel.clone(),
            }),
            workdir,
            cancel,
        );
        expander.run().await.unwrap();

        // The first entry made it out before the interrupt took effect,
        // but the archive record stays pending so a resumed run picks
        // up the remaining entries.
        assert_eq!(
            store
                .count_tasks_with(TaskFlags::FILE | TaskFlags::FETCHED)
                .await
                .unwrap(),
            1
        );
        let record = store.get_task(id).await.unwrap().unwrap();
        assert!(!record.flags().is_processed());
    }

    #[test]
    fn test_sanitize_entry_name_takes_basename() {
        assert_eq!(sanitize_entry_name("data/dict.txt"), "dict.txt");
        assert_eq!(sanitize_entry_name("dict.txt"), "dict.txt");
    }

    #[test]
    fn test_sanitize_entry_name_replaces_odd_characters() {
        assert_eq!(sanitize_entry_name("data/my dict!.txt"), "my_dict_.txt");
    }

    #[test]
    fn test_sanitize_entry_name_never_empty() {
        assert_eq!(sanitize_entry_name("data/"), "entry");
    }
}
