//! Working directory layout for one dictionary build.
//!
//! Everything a run produces lives under one root: the state database,
//! downloaded archives (`zip/`), files extracted from them (`raw/`) and
//! resources copied for the final dictionary (`res/`).

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

/// The working directory of one dictionary build.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Points at (but does not create) a working directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for files extracted from archives.
    #[must_use]
    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Directory for downloaded archives.
    #[must_use]
    pub fn zip(&self) -> PathBuf {
        self.root.join("zip")
    }

    /// Directory for resource files shipped with the dictionary.
    #[must_use]
    pub fn res(&self) -> PathBuf {
        self.root.join("res")
    }

    /// Path of the state database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.root.join("db.sqlite")
    }

    /// Creates the root and all area directories. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error if a directory cannot be created.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [self.root.clone(), self.raw(), self.zip(), self.res()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Deletes the area directories and everything in them, then
    /// recreates the empty layout. The root itself (and the state
    /// database file) stays in place; table state is the store's
    /// business.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error if removal or recreation fails.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn wipe(&self) -> io::Result<()> {
        for dir in [self.raw(), self.zip(), self.res()] {
            if dir.exists() {
                debug!(dir = %dir.display(), "removing area directory");
                std::fs::remove_dir_all(&dir)?;
            }
        }
        self.ensure()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_ensure_creates_layout() {
        let temp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(temp.path().join("build"));
        workdir.ensure().unwrap();

        assert!(workdir.raw().is_dir());
        assert!(workdir.zip().is_dir());
        assert!(workdir.res().is_dir());
        assert_eq!(workdir.db_path(), temp.path().join("build/db.sqlite"));
    }

    #[test]
    fn test_workdir_ensure_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(temp.path().join("build"));
        workdir.ensure().unwrap();
        workdir.ensure().unwrap();
        assert!(workdir.raw().is_dir());
    }

    #[test]
    fn test_workdir_wipe_removes_previous_contents() {
        let temp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(temp.path().join("build"));
        workdir.ensure().unwrap();
        std::fs::write(workdir.raw().join("stale.html"), b"old").unwrap();

        workdir.wipe().unwrap();

        assert!(workdir.raw().is_dir());
        assert!(!workdir.raw().join("stale.html").exists());
    }

    #[test]
    fn test_workdir_wipe_keeps_database_file() {
        let temp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::new(temp.path().join("build"));
        workdir.ensure().unwrap();
        std::fs::write(workdir.db_path(), b"state").unwrap();

        workdir.wipe().unwrap();

        assert!(workdir.db_path().exists());
    }
}
