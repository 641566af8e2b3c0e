//! Row types for the task, entry and alternate tables.

use std::fmt;

use sqlx::FromRow;

use super::flags::TaskFlags;

/// A single task record in the pipeline state store.
///
/// One fetchable unit (URL, word lookup, archive or extracted file)
/// tracked through the fetch → process lifecycle by its flags.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRecord {
    /// Unique identifier.
    pub id: i64,
    /// URI or logical key identifying the unit.
    pub locator: String,
    /// Raw payload bytes, a file path, or a cross-reference id.
    pub payload: Option<Vec<u8>>,
    /// Packed stage flags (accessed through `flags()`).
    #[sqlx(rename = "flags")]
    pub flag_bits: i64,
}

impl TaskRecord {
    /// Returns the typed view of the packed flags column.
    #[must_use]
    pub fn flags(&self) -> TaskFlags {
        TaskFlags::from_bits(self.flag_bits)
    }

    /// Returns the payload interpreted as UTF-8 text, lossily.
    ///
    /// Used for file-path payloads and text documents; binary payloads
    /// should access `payload` directly.
    #[must_use]
    pub fn payload_text(&self) -> Option<String> {
        self.payload
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskRecord {{ id: {}, locator: {}, flags: {} }}",
            self.id,
            self.locator,
            self.flags()
        )
    }
}

/// A headword/definition pair produced by the processor.
#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    /// Unique identifier.
    pub id: i64,
    /// The headword under which the entry is indexed.
    pub headword: String,
    /// Definition body (may embed `xref://` cross-references).
    pub definition: String,
    /// The task record the entry was extracted from.
    pub task_id: i64,
}

/// An alternate form bound to an entry.
#[derive(Debug, Clone, FromRow)]
pub struct AlternateRow {
    /// Unique identifier.
    pub id: i64,
    /// The entry this form belongs to.
    pub entry_id: i64,
    /// The alternate spelling or cross-reference form.
    pub form: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(flags: TaskFlags, payload: Option<&[u8]>) -> TaskRecord {
        TaskRecord {
            id: 7,
            locator: "https://example.com/a".to_string(),
            payload: payload.map(<[u8]>::to_vec),
            flag_bits: flags.bits(),
        }
    }

    #[test]
    fn test_task_record_flags_accessor() {
        let rec = record(TaskFlags::RAW_FETCHER | TaskFlags::FETCHED, None);
        assert!(rec.flags().is_fetched());
        assert!(rec.flags().contains(TaskFlags::RAW_FETCHER));
    }

    #[test]
    fn test_task_record_payload_text() {
        let rec = record(TaskFlags::ZIP_FETCHER, Some(b"zip/0_1"));
        assert_eq!(rec.payload_text().as_deref(), Some("zip/0_1"));

        let rec = record(TaskFlags::EMPTY, None);
        assert!(rec.payload_text().is_none());
    }

    #[test]
    fn test_task_record_display_names_flags() {
        let rec = record(TaskFlags::FILE, None);
        let display = rec.to_string();
        assert!(display.contains("example.com"));
        assert!(display.contains("file"));
    }
}
