//! One fetch worker: a round-robin shard of the pending locator list.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, instrument};
use url::Url;

use super::client::{FetchPayload, HttpClient};
use super::error::FetchError;
use super::stats::FetchStats;
use super::FetchMode;
use crate::cancel::CancelToken;
use crate::plugin::{FilterOutcome, Plugin, SourcePolicy};
use crate::store::TaskFlags;
use crate::workdir::WorkDir;
use crate::writer::WriteCommand;

/// State shared by every worker of one stage.
pub(crate) struct WorkerShared {
    pub mode: FetchMode,
    pub plugin: Arc<dyn Plugin>,
    pub policy: SourcePolicy,
    pub client: HttpClient,
    pub workdir: WorkDir,
    pub cancel: CancelToken,
    pub stats: Arc<FetchStats>,
    pub tx: mpsc::Sender<WriteCommand>,
    /// Locator text to skip-block index, built at frontier expansion.
    pub blocks: HashMap<String, usize>,
    /// Blocks exhausted by a next-block signal. Held only briefly,
    /// never across an await point.
    pub skipped_blocks: Mutex<HashSet<usize>>,
}

impl WorkerShared {
    fn block_of(&self, locator: &str) -> Option<usize> {
        self.blocks.get(locator).copied()
    }

    fn is_block_skipped(&self, block: usize) -> bool {
        self.skipped_blocks
            .lock()
            .map(|set| set.contains(&block))
            .unwrap_or(false)
    }

    fn skip_block(&self, block: usize) {
        if let Ok(mut set) = self.skipped_blocks.lock() {
            set.insert(block);
        }
    }
}

/// One worker over its shard of `(task id, locator)` pairs.
pub struct FetchWorker {
    index: usize,
    shard: Vec<(i64, String)>,
    shared: Arc<WorkerShared>,
}

impl FetchWorker {
    pub(crate) fn new(index: usize, shard: Vec<(i64, String)>, shared: Arc<WorkerShared>) -> Self {
        Self {
            index,
            shard,
            shared,
        }
    }

    /// Works through the shard until it is done or the run is cancelled.
    ///
    /// Every locator ends in exactly one write command, so a resumed run
    /// never re-fetches what this one completed.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on non-retryable failures; transient
    /// transport problems are retried inside the client.
    #[instrument(skip(self), fields(worker = self.index, shard = self.shard.len()))]
    pub async fn run(self) -> Result<(), FetchError> {
        let shared = &self.shared;
        for (id, locator) in &self.shard {
            if shared.cancel.is_cancelled() {
                debug!("cancelled, stopping shard");
                break;
            }

            let block = shared.block_of(locator);
            if block.is_some_and(|block| shared.is_block_skipped(block)) {
                self.write_empty(*id).await?;
                shared.stats.add_skipped();
                shared.stats.add_done();
                continue;
            }

            if let Some(pause_ms) = shared.policy.pause_ms {
                tokio::time::sleep(Duration::from_millis(pause_ms)).await;
                if shared.cancel.is_cancelled() {
                    break;
                }
            }

            let request = shared.plugin.parse_locator(locator)?;
            let Some(payload) = shared
                .client
                .fetch(&request, &shared.policy, &shared.cancel, &shared.stats)
                .await?
            else {
                break;
            };

            match payload {
                FetchPayload::Missing => {
                    self.write_empty(*id).await?;
                    shared.stats.add_missing();
                }
                FetchPayload::Data(bytes) => {
                    match shared.plugin.filter_payload(locator, bytes)? {
                        FilterOutcome::Keep(data) => self.complete(*id, locator, data).await?,
                        FilterOutcome::Discard => {
                            self.write_empty(*id).await?;
                            shared.stats.add_skipped();
                        }
                        FilterOutcome::NextBlock => {
                            if let Some(block) = block {
                                debug!(block, "block exhausted");
                                shared.skip_block(block);
                            }
                            self.write_empty(*id).await?;
                            shared.stats.add_skipped();
                        }
                    }
                }
            }
            shared.stats.add_done();
        }
        Ok(())
    }

    /// Finishes one kept body according to the stage mode.
    async fn complete(&self, id: i64, locator: &str, data: Vec<u8>) -> Result<(), FetchError> {
        let shared = &self.shared;
        match shared.mode {
            FetchMode::Raw => {
                self.send(WriteCommand::StorePayload {
                    id,
                    payload: Some(data),
                    dedup: shared.policy.dedup_payloads,
                })
                .await?;
            }
            FetchMode::Discovery => {
                let children = shared.plugin.discover(locator, &data)?;
                debug!(count = children.len(), "discovered child locators");
                for child in children {
                    self.send(WriteCommand::InsertChild {
                        locator: child,
                        flags: TaskFlags::RAW_FETCHER,
                    })
                    .await?;
                }
                self.write_empty(id).await?;
            }
            FetchMode::Archive => {
                let relative = format!("zip/{id}_{}", archive_filename(locator));
                let path = shared.workdir.root().join(&relative);
                tokio::fs::write(&path, &data)
                    .await
                    .map_err(|source| FetchError::io(path, source))?;
                self.send(WriteCommand::StorePayload {
                    id,
                    payload: Some(relative.into_bytes()),
                    dedup: false,
                })
                .await?;
            }
        }
        shared.stats.add_fetched();
        Ok(())
    }

    async fn write_empty(&self, id: i64) -> Result<(), FetchError> {
        self.send(WriteCommand::StorePayload {
            id,
            payload: None,
            dedup: false,
        })
        .await
    }

    async fn send(&self, command: WriteCommand) -> Result<(), FetchError> {
        self.shared
            .tx
            .send(command)
            .await
            .map_err(|_| FetchError::WriterClosed)
    }
}

/// Derives a safe on-disk name for a downloaded archive.
fn archive_filename(locator: &str) -> String {
    let segment = Url::parse(locator)
        .ok()
        .and_then(|url| {
            url.path_segments().and_then(|mut segments| {
                segments
                    .next_back()
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| {
                        urlencoding::decode(segment)
                            .map(|decoded| decoded.into_owned())
                            .unwrap_or_else(|_| segment.to_string())
                    })
            })
        })
        .unwrap_or_else(|| "archive.zip".to_string());

    let sanitized: String = segment
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
        "archive.zip".to_string()
    } else {
        sanitized
    }
}
