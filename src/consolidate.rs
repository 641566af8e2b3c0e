//! Dedup/merge engine run after processing.
//!
//! Four ordered passes inside one transaction: prune blank alternates,
//! merge exact duplicates, resolve same-headword ambiguities per the
//! source's policy, then dedup alternates. The transaction makes the
//! whole consolidation atomic; an interrupted run leaves the entries
//! exactly as processing wrote them.

use sqlx::Row;
use tracing::{info, instrument};

use crate::store::{Store, StoreError};

/// How entries sharing a headword but not a definition are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Rename to `headword(1)`, `headword(2)`, ... in id order and
    /// record the bare headword as an alternate of each.
    Enumerate,
    /// Keep the earliest entry and append the other definitions to it
    /// in id order.
    Concatenate,
}

/// Per-pass counts reported after a consolidation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidateStats {
    /// Blank alternates pruned.
    pub blank_alternates: u64,
    /// Entries removed by the exact-duplicate merge.
    pub merged_entries: u64,
    /// Headword groups resolved by the ambiguity pass.
    pub ambiguous_headwords: u64,
    /// Duplicate alternates removed.
    pub duplicate_alternates: u64,
}

/// Runs the consolidation passes over the entry tables.
pub struct Consolidator {
    store: Store,
}

impl Consolidator {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Runs all four passes atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any statement fails; the transaction
    /// rolls back and nothing is changed.
    #[instrument(skip(self), fields(policy = ?policy))]
    pub async fn run(&self, policy: AmbiguityPolicy) -> Result<ConsolidateStats, StoreError> {
        let mut tx = self.store.database().pool().begin().await?;
        let mut stats = ConsolidateStats::default();

        // Pass 1: blank alternates carry no information.
        let result = sqlx::query(r"DELETE FROM alternate WHERE TRIM(form) = ''")
            .execute(&mut *tx)
            .await?;
        stats.blank_alternates = result.rows_affected();

        // Pass 2: exact duplicates collapse onto the highest id.
        sqlx::query(
            r"UPDATE alternate SET entry_id = (
                  SELECT MAX(same.id) FROM entry same
                  JOIN entry own ON own.headword = same.headword
                              AND own.definition = same.definition
                  WHERE own.id = alternate.entry_id
              )",
        )
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(
            r"DELETE FROM entry WHERE id NOT IN (
                  SELECT MAX(id) FROM entry GROUP BY headword, definition
              )",
        )
        .execute(&mut *tx)
        .await?;
        stats.merged_entries = result.rows_affected();

        // Pass 3: same headword, different definitions.
        stats.ambiguous_headwords = resolve_ambiguities(&mut tx, policy).await?;

        // Pass 4: duplicate alternates collapse onto the highest id.
        let result = sqlx::query(
            r"DELETE FROM alternate WHERE id NOT IN (
                  SELECT MAX(id) FROM alternate GROUP BY entry_id, form
              )",
        )
        .execute(&mut *tx)
        .await?;
        stats.duplicate_alternates = result.rows_affected();

        tx.commit().await?;
        info!(
            blank_alternates = stats.blank_alternates,
            merged_entries = stats.merged_entries,
            ambiguous_headwords = stats.ambiguous_headwords,
            duplicate_alternates = stats.duplicate_alternates,
            "consolidation finished"
        );
        Ok(stats)
    }
}

/// Resolves every multi-definition headword group; returns the group count.
async fn resolve_ambiguities(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    policy: AmbiguityPolicy,
) -> Result<u64, StoreError> {
    let rows = sqlx::query(
        r"SELECT id, headword, definition FROM entry
          WHERE headword IN (
              SELECT headword FROM entry GROUP BY headword HAVING COUNT(*) > 1
          )
          ORDER BY headword ASC, id ASC",
    )
    .fetch_all(&mut **tx)
    .await?;

    let mut groups: Vec<(String, Vec<(i64, String)>)> = Vec::new();
    for row in rows {
        let id: i64 = row.get("id");
        let headword: String = row.get("headword");
        let definition: String = row.get("definition");
        match groups.last_mut() {
            Some((current, members)) if *current == headword => {
                members.push((id, definition));
            }
            _ => groups.push((headword, vec![(id, definition)])),
        }
    }

    for (headword, members) in &groups {
        match policy {
            AmbiguityPolicy::Enumerate => {
                for (ordinal, (id, _)) in members.iter().enumerate() {
                    let renamed = format!("{headword}({})", ordinal + 1);
                    sqlx::query(r"UPDATE entry SET headword = ? WHERE id = ?")
                        .bind(&renamed)
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                    sqlx::query(r"INSERT INTO alternate (entry_id, form) VALUES (?, ?)")
                        .bind(id)
                        .bind(headword)
                        .execute(&mut **tx)
                        .await?;
                }
            }
            AmbiguityPolicy::Concatenate => {
                let (keeper_id, _) = members[0];
                let combined = members
                    .iter()
                    .map(|(_, definition)| definition.as_str())
                    .collect::<String>();
                sqlx::query(r"UPDATE entry SET definition = ? WHERE id = ?")
                    .bind(&combined)
                    .bind(keeper_id)
                    .execute(&mut **tx)
                    .await?;
                for (loser_id, _) in &members[1..] {
                    sqlx::query(r"UPDATE alternate SET entry_id = ? WHERE entry_id = ?")
                        .bind(keeper_id)
                        .bind(loser_id)
                        .execute(&mut **tx)
                        .await?;
                    sqlx::query(r"DELETE FROM entry WHERE id = ?")
                        .bind(loser_id)
                        .execute(&mut **tx)
                        .await?;
                }
            }
        }
    }

    Ok(groups.len() as u64)
}
