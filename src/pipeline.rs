//! Stage orchestrator with progress delegation and cancellation.
//!
//! The pipeline owns the ordered stage list (discovery, fetching,
//! archive expansion, processing, consolidation) and runs each to
//! completion before advancing. Between stages it checks the shared
//! cancel token; within a stage, the stage checks it itself. Progress
//! queries are delegated to whichever stage is active.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument};

use crate::archive::{ArchiveError, ArchiveExpander};
use crate::cancel::CancelToken;
use crate::consolidate::{AmbiguityPolicy, Consolidator};
use crate::fetch::{FetchError, FetchMode, FetchStage, HttpClient};
use crate::plugin::Plugin;
use crate::process::{ProcessError, Processor};
use crate::store::{Store, StoreError};
use crate::workdir::WorkDir;

/// Sentinel for "no stage active yet".
const NO_ACTIVE_STAGE: usize = usize::MAX;

/// Errors surfaced by a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A fetch stage failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Archive expansion failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The processor failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A store operation failed outside any stage.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short stage name used in progress lines and logs.
    fn name(&self) -> &str;

    /// Runs the stage to completion or cancellation.
    async fn run(&self) -> Result<(), PipelineError>;

    /// Renders the stage's current progress.
    fn progress(&self) -> String;
}

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> &str {
        match self.mode() {
            FetchMode::Raw => "fetch",
            FetchMode::Discovery => "discover",
            FetchMode::Archive => "fetch archives",
        }
    }

    async fn run(&self) -> Result<(), PipelineError> {
        Self::run(self).await?;
        Ok(())
    }

    fn progress(&self) -> String {
        Self::progress(self)
    }
}

#[async_trait]
impl Stage for ArchiveExpander {
    fn name(&self) -> &str {
        "expand archives"
    }

    async fn run(&self) -> Result<(), PipelineError> {
        Self::run(self).await?;
        Ok(())
    }

    fn progress(&self) -> String {
        Self::progress(self)
    }
}

#[async_trait]
impl Stage for Processor {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self) -> Result<(), PipelineError> {
        Self::run(self).await?;
        Ok(())
    }

    fn progress(&self) -> String {
        Self::progress(self)
    }
}

/// Consolidation bound to its ambiguity policy.
struct ConsolidateStage {
    consolidator: Consolidator,
    policy: AmbiguityPolicy,
}

#[async_trait]
impl Stage for ConsolidateStage {
    fn name(&self) -> &str {
        "consolidate"
    }

    async fn run(&self) -> Result<(), PipelineError> {
        self.consolidator.run(self.policy).await?;
        Ok(())
    }

    fn progress(&self) -> String {
        // One atomic transaction; there is no meaningful fraction.
        "running".to_string()
    }
}

/// Ordered stage list driven to completion.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    active: AtomicUsize,
    cancel: CancelToken,
}

impl Pipeline {
    /// Assembles the standard stage order for one source.
    ///
    /// Discovery runs first so child locators exist before the raw
    /// fetch; archives are fetched and expanded before processing;
    /// consolidation runs last when the source policy asks for it.
    #[must_use]
    pub fn standard(
        plugin: Arc<dyn Plugin>,
        store: Store,
        workdir: WorkDir,
        client: HttpClient,
        cancel: CancelToken,
    ) -> Self {
        let policy = plugin.policy();
        let mut stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(FetchStage::new(
                FetchMode::Discovery,
                Arc::clone(&plugin),
                store.clone(),
                client.clone(),
                workdir.clone(),
                cancel.clone(),
            )),
            Arc::new(FetchStage::new(
                FetchMode::Raw,
                Arc::clone(&plugin),
                store.clone(),
                client.clone(),
                workdir.clone(),
                cancel.clone(),
            )),
            Arc::new(FetchStage::new(
                FetchMode::Archive,
                Arc::clone(&plugin),
                store.clone(),
                client,
                workdir.clone(),
                cancel.clone(),
            )),
            Arc::new(ArchiveExpander::new(
                store.clone(),
                Arc::clone(&plugin),
                workdir.clone(),
                cancel.clone(),
            )),
            Arc::new(Processor::new(
                store.clone(),
                plugin,
                workdir,
                cancel.clone(),
            )),
        ];
        if policy.consolidate {
            stages.push(Arc::new(ConsolidateStage {
                consolidator: Consolidator::new(store),
                policy: policy.ambiguity,
            }));
        }
        Self::with_stages(stages, cancel)
    }

    /// Builds a pipeline from an explicit stage list.
    #[must_use]
    pub fn with_stages(stages: Vec<Arc<dyn Stage>>, cancel: CancelToken) -> Self {
        Self {
            stages,
            active: AtomicUsize::new(NO_ACTIVE_STAGE),
            cancel,
        }
    }

    /// Requests cancellation; the active stage unwinds cooperatively.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Renders `stage-name: stage-progress` for the active stage.
    #[must_use]
    pub fn progress(&self) -> String {
        match self.stages.get(self.active.load(Ordering::Relaxed)) {
            Some(stage) => format!("{}: {}", stage.name(), stage.progress()),
            None => "idle".to_string(),
        }
    }

    /// Runs the stages in order, stopping at cancellation.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; earlier stages' persisted state
    /// is kept, so a rerun resumes from it.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        for (index, stage) in self.stages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("cancelled before {}", stage.name());
                break;
            }
            self.active.store(index, Ordering::Relaxed);
            info!(stage = stage.name(), "stage starting");
            stage.run().await?;
        }
        self.active.store(NO_ACTIVE_STAGE, Ordering::Relaxed);
        Ok(())
    }
}
