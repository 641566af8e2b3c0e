//! Export boundary: the consolidated glossary handed to a writer.
//!
//! Writing an actual dictionary format is someone else's job; this
//! module only collects the finished entries in a stable order and
//! offers the `xref://` pseudo-scheme used for cross-references inside
//! definition bodies.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::instrument;

use crate::store::{Store, StoreError};

/// One finished glossary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlossaryEntry {
    /// The headword.
    pub headword: String,
    /// The definition body, possibly embedding `xref://` links.
    pub definition: String,
    /// Alternate forms resolving to this entry.
    pub alternates: Vec<String>,
}

/// The consolidated glossary: metadata plus entries in entry-id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Glossary {
    /// Dictionary metadata pairs (book name and friends).
    pub metadata: Vec<(String, String)>,
    /// Entries in insertion order.
    pub entries: Vec<GlossaryEntry>,
}

impl Glossary {
    /// Collects the glossary from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a query fails.
    #[instrument(skip(store))]
    pub async fn collect(store: &Store) -> Result<Self, StoreError> {
        let metadata = store.metadata().await?;
        let rows = store.entries().await?;
        let alternates = store.alternates().await?;

        let mut entries: Vec<(i64, GlossaryEntry)> = rows
            .into_iter()
            .map(|row| {
                (
                    row.id,
                    GlossaryEntry {
                        headword: row.headword,
                        definition: row.definition,
                        alternates: Vec::new(),
                    },
                )
            })
            .collect();

        for alternate in alternates {
            if let Some((_, entry)) = entries.iter_mut().find(|(id, _)| *id == alternate.entry_id)
            {
                entry.alternates.push(alternate.form);
            }
        }

        Ok(Self {
            metadata,
            entries: entries.into_iter().map(|(_, entry)| entry).collect(),
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The `xref://` pseudo-scheme for in-definition cross-references.
pub mod xref {
    use super::{LazyLock, Regex};

    /// Scheme prefix of a cross-reference link.
    pub const SCHEME: &str = "xref://";

    static XREF_LINK: LazyLock<Regex> = LazyLock::new(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r#"xref://([^\s"'<>]+)"#).unwrap()
    });

    /// Builds a cross-reference link to another headword.
    #[must_use]
    pub fn link(headword: &str) -> String {
        format!("{SCHEME}{}", urlencoding::encode(headword))
    }

    /// Extracts the decoded targets of every cross-reference in a
    /// definition body.
    #[must_use]
    pub fn targets(definition: &str) -> Vec<String> {
        XREF_LINK
            .captures_iter(definition)
            .filter_map(|captures| captures.get(1))
            .map(|target| {
                urlencoding::decode(target.as_str())
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| target.as_str().to_string())
            })
            .collect()
    }
}
