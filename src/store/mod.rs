//! Pipeline state store: flagged task records, entries and alternates.
//!
//! All pipeline state lives in four SQLite tables (`task`, `entry`,
//! `alternate`, `metadata`). Every stage derives its work list from the
//! task flags, which is what makes each stage naturally resumable: after
//! an interruption the same selection query returns only the unfinished
//! records.
//!
//! # Example
//!
//! ```ignore
//! use dictforge_core::store::{Store, TaskFlags};
//! use dictforge_core::Database;
//!
//! let db = Database::new_in_memory().await?;
//! let store = Store::new(db);
//!
//! store.insert_task("https://example.com/a", None, TaskFlags::RAW_FETCHER).await?;
//! let pending = store.unfetched(TaskFlags::RAW_FETCHER).await?;
//! ```

mod error;
mod flags;
mod task;

pub use error::{StoreDbErrorKind, StoreError};
pub use flags::TaskFlags;
pub use task::{AlternateRow, EntryRow, TaskRecord};

use sqlx::Row;
use tracing::instrument;

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::TaskNotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::TaskNotFound(id))
    } else {
        Ok(())
    }
}

/// Store manager for pipeline state.
///
/// Read access is unrestricted; mutations during the fetch stage must go
/// through the single [`crate::writer::WriteQueue`], while the
/// single-threaded expansion, processing and consolidation stages call
/// the mutation methods directly.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Creates a new store manager with the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Inserts a new task record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, payload), fields(locator = %locator, flags = %flags))]
    pub async fn insert_task(
        &self,
        locator: &str,
        payload: Option<&[u8]>,
        flags: TaskFlags,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO task (locator, payload, flags)
              VALUES (?, ?, ?)
              RETURNING id",
        )
        .bind(locator)
        .bind(payload)
        .bind(flags.bits())
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Inserts a task record unless one with the same locator exists.
    ///
    /// Returns the new id, or `None` when the locator was already known.
    /// Two producers racing to create the same logical record therefore
    /// resolve deterministically at whoever performs the write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self), fields(locator = %locator, flags = %flags))]
    pub async fn insert_task_if_absent(
        &self,
        locator: &str,
        flags: TaskFlags,
    ) -> Result<Option<i64>> {
        let existing = sqlx::query(r"SELECT id FROM task WHERE locator = ? LIMIT 1")
            .bind(locator)
            .fetch_optional(self.db.pool())
            .await?;

        if existing.is_some() {
            return Ok(None);
        }

        let id = self.insert_task(locator, None, flags).await?;
        Ok(Some(id))
    }

    /// Rewrites locator, payload and flags of an existing task record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if no record has the given id.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, payload), fields(locator = %locator, flags = %flags))]
    pub async fn update_task(
        &self,
        id: i64,
        locator: &str,
        payload: Option<&[u8]>,
        flags: TaskFlags,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE task
              SET locator = ?, payload = ?, flags = ?
              WHERE id = ?",
        )
        .bind(locator)
        .bind(payload)
        .bind(flags.bits())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Stores a payload on an existing record and adds the given flag bits.
    ///
    /// The locator is left untouched; this is the write every fetch
    /// completion performs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if no record has the given id.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, payload), fields(flags = %flags))]
    pub async fn store_payload(
        &self,
        id: i64,
        payload: Option<&[u8]>,
        flags: TaskFlags,
    ) -> Result<()> {
        let result = sqlx::query(r"UPDATE task SET payload = ?, flags = flags | ? WHERE id = ?")
            .bind(payload)
            .bind(flags.bits())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Gets a task record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_task(&self, id: i64) -> Result<Option<TaskRecord>> {
        let record = sqlx::query_as::<_, TaskRecord>(r"SELECT * FROM task WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(record)
    }

    /// Lists `(id, locator)` of records tagged for `origin` and not yet fetched.
    ///
    /// This is the fetch stage's work list; already-fetched records are
    /// skipped, which is what makes a resumed run re-download nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(origin = %origin))]
    pub async fn unfetched(&self, origin: TaskFlags) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            r"SELECT id, locator FROM task
              WHERE flags & ? = 0
              AND flags & ? > 0
              ORDER BY id ASC",
        )
        .bind(TaskFlags::FETCHED.bits())
        .bind(origin.bits())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("locator")))
            .collect())
    }

    /// Counts task records whose flags contain every bit of `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(mask = %mask))]
    pub async fn count_tasks_with(&self, mask: TaskFlags) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM task WHERE flags & ? = ?")
            .bind(mask.bits())
            .bind(mask.bits())
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Lists records ready for the processor stage.
    ///
    /// Selected: fetched, not processed, not duplicate, and not tagged
    /// with an intermediate origin (`URL_FETCHER`/`ZIP_FETCHER`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn processable(&self) -> Result<Vec<TaskRecord>> {
        let excluded = TaskFlags::PROCESSED
            | TaskFlags::DUPLICATE
            | TaskFlags::URL_FETCHER
            | TaskFlags::ZIP_FETCHER;

        let records = sqlx::query_as::<_, TaskRecord>(
            r"SELECT * FROM task
              WHERE flags & ? = ?
              AND flags & ? = 0
              ORDER BY id ASC",
        )
        .bind(TaskFlags::FETCHED.bits())
        .bind(TaskFlags::FETCHED.bits())
        .bind(excluded.bits())
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// Lists fetched archive records that have not been expanded yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn unexpanded_archives(&self) -> Result<Vec<TaskRecord>> {
        let wanted = TaskFlags::ZIP_FETCHER | TaskFlags::FETCHED;

        let records = sqlx::query_as::<_, TaskRecord>(
            r"SELECT * FROM task
              WHERE flags & ? = ?
              AND flags & ? = 0
              ORDER BY id ASC",
        )
        .bind(wanted.bits())
        .bind(wanted.bits())
        .bind(TaskFlags::PROCESSED.bits())
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// Adds flag bits to a task record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if no record has the given id.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self), fields(flags = %flags))]
    pub async fn add_flags(&self, id: i64, flags: TaskFlags) -> Result<()> {
        let result = sqlx::query(r"UPDATE task SET flags = flags | ? WHERE id = ?")
            .bind(flags.bits())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Marks a task record as processed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if no record has the given id.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_processed(&self, id: i64) -> Result<()> {
        self.add_flags(id, TaskFlags::PROCESSED).await
    }

    /// Finds a stored record whose payload is byte-identical to `payload`.
    ///
    /// Returns the id of the first match. Duplicate records themselves are
    /// excluded since their payload column holds a cross-reference id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self, payload))]
    pub async fn find_identical_payload(&self, payload: &[u8]) -> Result<Option<i64>> {
        let row = sqlx::query(
            r"SELECT id FROM task
              WHERE payload = ? AND flags & ? = 0
              ORDER BY id ASC LIMIT 1",
        )
        .bind(payload)
        .bind(TaskFlags::DUPLICATE.bits())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Inserts an entry and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, definition), fields(headword = %headword))]
    pub async fn insert_entry(
        &self,
        headword: &str,
        definition: &str,
        task_id: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO entry (headword, definition, task_id)
              VALUES (?, ?, ?)
              RETURNING id",
        )
        .bind(headword)
        .bind(definition)
        .bind(task_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(result.get("id"))
    }

    /// Inserts an alternate form for an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self), fields(form = %form))]
    pub async fn insert_alternate(&self, entry_id: i64, form: &str) -> Result<()> {
        sqlx::query(r"INSERT INTO alternate (entry_id, form) VALUES (?, ?)")
            .bind(entry_id)
            .bind(form)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Deletes every entry (and its alternates) derived from a task.
    ///
    /// Used when processing is cancelled mid-record so the `PROCESSED`
    /// flag state stays truthful.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a delete fails.
    #[instrument(skip(self))]
    pub async fn delete_entries_for_task(&self, task_id: i64) -> Result<()> {
        sqlx::query(
            r"DELETE FROM alternate
              WHERE entry_id IN (SELECT id FROM entry WHERE task_id = ?)",
        )
        .bind(task_id)
        .execute(self.db.pool())
        .await?;

        sqlx::query(r"DELETE FROM entry WHERE task_id = ?")
            .bind(task_id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Lists all entries ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn entries(&self) -> Result<Vec<EntryRow>> {
        let rows = sqlx::query_as::<_, EntryRow>(r"SELECT * FROM entry ORDER BY id ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows)
    }

    /// Lists all alternates ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn alternates(&self) -> Result<Vec<AlternateRow>> {
        let rows = sqlx::query_as::<_, AlternateRow>(r"SELECT * FROM alternate ORDER BY id ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows)
    }

    /// Counts entries currently in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn entry_count(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM entry")
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.get("count"))
    }

    /// Sets a metadata key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    #[instrument(skip(self, value), fields(key = %key))]
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"INSERT INTO metadata (key, value) VALUES (?, ?)
              ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Gets a metadata value by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(r"SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// Lists all metadata pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn metadata(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(r"SELECT key, value FROM metadata ORDER BY key ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    /// Wipes all derived state: every task, entry, alternate and metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a delete fails.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        for table in ["alternate", "entry", "task", "metadata"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(self.db.pool())
                .await?;
        }
        Ok(())
    }

    /// Deletes derived entries and clears `PROCESSED`, preserving payloads.
    ///
    /// After this, the expansion and processor stages redo their work
    /// against the already-fetched data.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a statement fails.
    #[instrument(skip(self))]
    pub async fn force_reprocess(&self) -> Result<()> {
        sqlx::query(r"DELETE FROM alternate")
            .execute(self.db.pool())
            .await?;
        sqlx::query(r"DELETE FROM entry")
            .execute(self.db.pool())
            .await?;
        sqlx::query(r"UPDATE task SET flags = flags & ~? WHERE flags & ? > 0")
            .bind(TaskFlags::PROCESSED.bits())
            .bind(TaskFlags::PROCESSED.bits())
            .execute(self.db.pool())
            .await?;

        Ok(())
    }
}
