//! Worker pool running one fetch stage to completion.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};

use super::client::HttpClient;
use super::error::FetchError;
use super::stats::FetchStats;
use super::worker::{FetchWorker, WorkerShared};
use super::FetchMode;
use crate::cancel::CancelToken;
use crate::plugin::Plugin;
use crate::store::Store;
use crate::workdir::WorkDir;
use crate::writer::WriteQueue;

/// Default number of concurrent fetch workers.
pub const DEFAULT_WORKER_COUNT: usize = 6;

/// One fetch stage: seeds its frontier, shards the pending locators
/// round-robin across workers and drives them to completion.
///
/// Running the same stage again is idempotent: seeding skips known
/// locators and the work list contains only unfetched records.
pub struct FetchStage {
    mode: FetchMode,
    plugin: Arc<dyn Plugin>,
    store: Store,
    client: HttpClient,
    workdir: WorkDir,
    cancel: CancelToken,
    stats: Arc<FetchStats>,
}

impl FetchStage {
    /// Creates a stage for the given mode.
    #[must_use]
    pub fn new(
        mode: FetchMode,
        plugin: Arc<dyn Plugin>,
        store: Store,
        client: HttpClient,
        workdir: WorkDir,
        cancel: CancelToken,
    ) -> Self {
        Self {
            mode,
            plugin,
            store,
            client,
            workdir,
            cancel,
            stats: Arc::new(FetchStats::new()),
        }
    }

    /// The stage's shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<FetchStats> {
        Arc::clone(&self.stats)
    }

    /// The stage mode.
    #[must_use]
    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Renders the current progress line.
    #[must_use]
    pub fn progress(&self) -> String {
        self.stats.progress()
    }

    /// Runs the stage until every pending locator is resolved or the
    /// run is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when seeding, a worker or the writer fails.
    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn run(&self) -> Result<(), FetchError> {
        let policy = self.plugin.policy();
        let origin = self.mode.origin();
        let locators = self.plugin.frontier(self.mode)?.expand()?;

        let mut blocks = HashMap::with_capacity(locators.len());
        for locator in &locators {
            blocks.insert(locator.text.clone(), locator.block);
            self.store
                .insert_task_if_absent(&locator.text, origin)
                .await?;
        }

        let pending = self.store.unfetched(origin).await?;
        self.stats.set_total(pending.len() as u64);
        if pending.is_empty() {
            debug!("nothing to fetch");
            return Ok(());
        }

        let worker_count = match self.mode {
            // Archives are few and large; one worker keeps disk writes simple.
            FetchMode::Archive => 1,
            _ => policy.worker_count.max(1),
        };
        info!(pending = pending.len(), workers = worker_count, "fetch stage starting");

        let queue = WriteQueue::spawn(
            self.store.clone(),
            self.cancel.clone(),
            Arc::clone(&self.stats),
        );
        let shared = Arc::new(WorkerShared {
            mode: self.mode,
            plugin: Arc::clone(&self.plugin),
            policy,
            client: self.client.clone(),
            workdir: self.workdir.clone(),
            cancel: self.cancel.clone(),
            stats: Arc::clone(&self.stats),
            tx: queue.sender(),
            blocks,
            skipped_blocks: Mutex::new(HashSet::new()),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let shard: Vec<_> = pending
                .iter()
                .skip(index)
                .step_by(worker_count)
                .cloned()
                .collect();
            if shard.is_empty() {
                continue;
            }
            let worker = FetchWorker::new(index, shard, Arc::clone(&shared));
            handles.push(tokio::spawn(worker.run()));
        }
        drop(shared);

        let mut outcome = Ok(());
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    if outcome.is_ok() {
                        outcome = Err(error);
                    }
                }
                Err(join_error) => {
                    if outcome.is_ok() {
                        outcome = Err(FetchError::Worker(join_error.to_string()));
                    }
                }
            }
        }

        queue.finish().await?;
        info!(
            fetched = self.stats.fetched(),
            skipped = self.stats.skipped(),
            missing = self.stats.missing(),
            retried = self.stats.retried(),
            duplicates = self.stats.duplicates(),
            "fetch stage finished"
        );
        outcome
    }
}
