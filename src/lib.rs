//! Dictforge Core Library
//!
//! This library provides the core functionality for the dictforge tool,
//! which downloads dictionary sources (web pages, word-list lookups,
//! zipped data files), extracts headword/definition entries from them and
//! consolidates the result into a clean glossary ready for export.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`store`] - Flagged task records, entries and alternates
//! - [`fetch`] - Retrying HTTP download primitive and worker pool
//! - [`writer`] - Single-writer persistence queue
//! - [`frontier`] - Locator sources consumed by the fetch stage
//! - [`archive`] - Archive expansion stage
//! - [`process`] - Entry extraction stage
//! - [`consolidate`] - Dedup/merge engine
//! - [`pipeline`] - Stage orchestrator with progress and cancellation
//! - [`plugin`] - Extraction plugin contract and registry
//! - [`export`] - Glossary collection for the external writer

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod cancel;
pub mod consolidate;
pub mod db;
pub mod export;
pub mod fetch;
pub mod frontier;
pub mod pipeline;
pub mod plugin;
pub mod process;
pub mod store;
pub mod workdir;
pub mod writer;

// Re-export commonly used types
pub use archive::{ArchiveError, ArchiveExpander, ArchiveStats};
pub use cancel::CancelToken;
pub use consolidate::{AmbiguityPolicy, ConsolidateStats, Consolidator};
pub use db::Database;
pub use export::{Glossary, GlossaryEntry, xref};
pub use fetch::{
    DEFAULT_WORKER_COUNT, FetchError, FetchMode, FetchPayload, FetchRequest, FetchStage,
    FetchStats, HttpClient,
};
pub use frontier::{Frontier, FrontierError, Locator};
pub use pipeline::{Pipeline, PipelineError, Stage};
pub use plugin::{FilterOutcome, Plugin, PluginError, SourcePolicy, registry};
pub use process::{ProcessError, ProcessStats, Processor};
pub use store::{Store, StoreError, TaskFlags, TaskRecord};
pub use workdir::WorkDir;
pub use writer::{WriteCommand, WriteQueue};
