//! Download primitive and concurrent fetch stage.
//!
//! [`HttpClient`] is the single retrying download primitive; the
//! [`FetchStage`] shards the pending locator list round-robin across
//! workers and funnels every resulting mutation through the
//! single-writer queue.

mod client;
mod error;
mod pool;
mod stats;
mod worker;

pub use client::{FetchPayload, FetchRequest, HttpClient};
pub use error::FetchError;
pub use pool::{DEFAULT_WORKER_COUNT, FetchStage};
pub use stats::FetchStats;
pub use worker::FetchWorker;

use crate::store::TaskFlags;

/// What a fetch stage does with the bodies it downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Store the filtered body as the record's payload.
    Raw,
    /// Parse the body for child locators; the page itself keeps no payload.
    Discovery,
    /// Save the body under the work directory and store its path.
    Archive,
}

impl FetchMode {
    /// The origin flag tagging records owned by this mode.
    #[must_use]
    pub fn origin(self) -> TaskFlags {
        match self {
            Self::Raw => TaskFlags::RAW_FETCHER,
            Self::Discovery => TaskFlags::URL_FETCHER,
            Self::Archive => TaskFlags::ZIP_FETCHER,
        }
    }
}
