//! Error types for the fetch stage.
//!
//! Transient transport failures never surface here: the client retries
//! them indefinitely until the download succeeds or the run is
//! cancelled. What remains is the non-retryable set.

use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::PluginError;
use crate::store::StoreError;

/// Errors that abort a fetch worker.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The locator could not be parsed into a URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending locator text.
        url: String,
    },

    /// Writing a downloaded archive body to disk failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// The path being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Persistence failure outside the writer queue.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Frontier expansion failure (unreadable word list).
    #[error(transparent)]
    Frontier(#[from] crate::frontier::FrontierError),

    /// Plugin callback failure.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The writer queue shut down while workers were still producing.
    #[error("write queue closed before the fetch stage finished")]
    WriterClosed,

    /// A spawned worker task panicked or was aborted.
    #[error("fetch worker task failed: {0}")]
    Worker(String),
}

impl FetchError {
    pub(crate) fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
