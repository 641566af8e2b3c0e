//! Durable single-writer queue for the fetch stage.
//!
//! Fetch workers never touch the task table themselves: every mutation
//! travels as a [`WriteCommand`] over an mpsc channel into one writer
//! task. That serializes writes (SQLite likes one writer), gives
//! duplicate detection a race-free view of stored payloads, and makes
//! racing inserts for the same locator resolve deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::cancel::CancelToken;
use crate::fetch::{FetchError, FetchStats};
use crate::store::{Store, StoreError, TaskFlags};

/// Channel capacity; workers block briefly when the writer falls behind.
const COMMAND_BUFFER: usize = 64;

/// How long one receive waits before re-checking for cancellation.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// One task-table mutation requested by a fetch worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCommand {
    /// Record a completed fetch: store the payload (possibly none) and
    /// set `FETCHED`. With `dedup` set, a byte-identical stored payload
    /// turns this into a cross-reference instead.
    StorePayload {
        /// The record being completed.
        id: i64,
        /// The filtered body, or `None` for missing/skipped documents.
        payload: Option<Vec<u8>>,
        /// Whether to scan for byte-identical stored payloads.
        dedup: bool,
    },
    /// Insert a discovered child record unless its locator is already
    /// known.
    InsertChild {
        /// Locator of the child.
        locator: String,
        /// Flags for the new record (origin tag, typically).
        flags: TaskFlags,
    },
}

/// Handle to the spawned writer task.
#[derive(Debug)]
pub struct WriteQueue {
    tx: mpsc::Sender<WriteCommand>,
    handle: JoinHandle<Result<(), StoreError>>,
}

impl WriteQueue {
    /// Spawns the writer task over a fresh command channel.
    #[must_use]
    pub fn spawn(store: Store, cancel: CancelToken, stats: Arc<FetchStats>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(writer_loop(store, rx, cancel, stats));
        Self { tx, handle }
    }

    /// Returns a sender for submitting commands.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<WriteCommand> {
        self.tx.clone()
    }

    /// Closes the channel and waits for the writer to drain and exit.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Store`] if a queued mutation failed, or
    /// [`FetchError::Worker`] if the writer task panicked.
    pub async fn finish(self) -> Result<(), FetchError> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|join_error| FetchError::Worker(join_error.to_string()))?
            .map_err(FetchError::from)
    }
}

#[instrument(skip_all)]
async fn writer_loop(
    store: Store,
    mut rx: mpsc::Receiver<WriteCommand>,
    cancel: CancelToken,
    stats: Arc<FetchStats>,
) -> Result<(), StoreError> {
    loop {
        match tokio::time::timeout(RECV_TIMEOUT, rx.recv()).await {
            Ok(Some(command)) => apply(&store, &stats, command).await?,
            Ok(None) => break,
            Err(_elapsed) => {
                if cancel.is_cancelled() {
                    // Workers have stopped producing; drain whatever is
                    // already queued so no completed fetch is lost.
                    while let Ok(command) = rx.try_recv() {
                        apply(&store, &stats, command).await?;
                    }
                    break;
                }
            }
        }
    }
    debug!("writer drained and exiting");
    Ok(())
}

async fn apply(
    store: &Store,
    stats: &Arc<FetchStats>,
    command: WriteCommand,
) -> Result<(), StoreError> {
    match command {
        WriteCommand::StorePayload { id, payload, dedup } => {
            if dedup
                && let Some(bytes) = payload.as_deref()
                && let Some(existing_id) = store.find_identical_payload(bytes).await?
                && existing_id != id
            {
                debug!(id, existing_id, "payload already stored, cross-referencing");
                let reference = existing_id.to_string();
                store
                    .store_payload(
                        id,
                        Some(reference.as_bytes()),
                        TaskFlags::FETCHED | TaskFlags::DUPLICATE,
                    )
                    .await?;
                stats.add_duplicate();
                return Ok(());
            }
            store
                .store_payload(id, payload.as_deref(), TaskFlags::FETCHED)
                .await?;
        }
        WriteCommand::InsertChild { locator, flags } => {
            if store.insert_task_if_absent(&locator, flags).await?.is_none() {
                warn!(locator = %locator, "child locator already known, skipping");
            }
        }
    }
    Ok(())
}
