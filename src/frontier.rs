//! Locator sources consumed by the fetch stage.
//!
//! A frontier expands into the ordered list of locators a fetch stage
//! seeds into the task table. The `block` index groups locators that a
//! plugin's next-block signal skips together: for the alphanumeric
//! frontier each alphabet letter is one block, so "no more pages for
//! this letter" jumps to the next letter.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while expanding a frontier.
#[derive(Debug, Error)]
pub enum FrontierError {
    /// The word-list file could not be read. This is fatal at startup.
    #[error("cannot read word list {path}: {source}")]
    WordList {
        /// The missing or unreadable file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// One expanded locator with its skip-block index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// The locator text (URL template already substituted).
    pub text: String,
    /// Index of the block this locator belongs to.
    pub block: usize,
}

/// A source of locators for one fetch stage.
#[derive(Debug, Clone)]
pub enum Frontier {
    /// A fixed, explicit list. Every locator is its own block.
    Fixed(Vec<String>),
    /// A word list file substituted into a URL template.
    ///
    /// Each line is trimmed, percent-encoded and substituted for the
    /// `{word}` placeholder. Every word is its own block.
    WordList {
        /// Path of the word list file, one word per line.
        path: PathBuf,
        /// URL template containing `{word}`.
        pattern: String,
    },
    /// The cartesian product of an alphabet and a bounded page range.
    ///
    /// `{alpha}`/`{ALPHA}` substitute the lower/upper-cased letter and
    /// `{num}` the page number. All pages of one letter share a block.
    Alphanum {
        /// URL template containing `{alpha}`, `{ALPHA}` and/or `{num}`.
        pattern: String,
        /// Alphabet symbols, one block each.
        alphabet: Vec<String>,
        /// Inclusive page range substituted for `{num}`.
        first_page: u32,
        /// Last page, inclusive.
        last_page: u32,
    },
    /// Archive locators for the archive fetch mode.
    Archive(Vec<String>),
}

impl Frontier {
    /// Returns a frontier with no locators at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::Fixed(Vec::new())
    }

    /// Expands the frontier into its ordered locator list.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::WordList`] when the word list file
    /// cannot be read.
    #[instrument(skip(self))]
    pub fn expand(&self) -> Result<Vec<Locator>, FrontierError> {
        let locators = match self {
            Self::Fixed(list) | Self::Archive(list) => list
                .iter()
                .enumerate()
                .map(|(block, text)| Locator {
                    text: text.clone(),
                    block,
                })
                .collect(),
            Self::WordList { path, pattern } => {
                let raw = std::fs::read(path).map_err(|source| FrontierError::WordList {
                    path: path.clone(),
                    source,
                })?;
                let text = String::from_utf8_lossy(&raw);
                text.lines()
                    .map(str::trim)
                    .filter(|word| !word.is_empty())
                    .enumerate()
                    .map(|(block, word)| Locator {
                        text: pattern.replace("{word}", &urlencoding::encode(word)),
                        block,
                    })
                    .collect()
            }
            Self::Alphanum {
                pattern,
                alphabet,
                first_page,
                last_page,
            } => {
                let mut locators = Vec::new();
                for (block, symbol) in alphabet.iter().enumerate() {
                    for page in *first_page..=*last_page {
                        let text = pattern
                            .replace("{alpha}", &symbol.to_lowercase())
                            .replace("{ALPHA}", &symbol.to_uppercase())
                            .replace("{num}", &page.to_string());
                        locators.push(Locator { text, block });
                    }
                }
                locators
            }
        };

        debug!(count = locators.len(), "frontier expanded");
        Ok(locators)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fixed_frontier_preserves_order_and_blocks() {
        let frontier = Frontier::Fixed(vec!["a".to_string(), "b".to_string()]);
        let locators = frontier.expand().unwrap();
        assert_eq!(locators.len(), 2);
        assert_eq!(locators[0], Locator { text: "a".to_string(), block: 0 });
        assert_eq!(locators[1], Locator { text: "b".to_string(), block: 1 });
    }

    #[test]
    fn test_word_list_frontier_encodes_and_substitutes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "  zeal  ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "straße").unwrap();

        let frontier = Frontier::WordList {
            path,
            pattern: "https://example.com/define?q={word}".to_string(),
        };
        let locators = frontier.expand().unwrap();
        assert_eq!(locators.len(), 2);
        assert_eq!(locators[0].text, "https://example.com/define?q=zeal");
        assert_eq!(
            locators[1].text,
            "https://example.com/define?q=stra%C3%9Fe"
        );
    }

    #[test]
    fn test_word_list_frontier_missing_file_is_fatal() {
        let frontier = Frontier::WordList {
            path: PathBuf::from("/nonexistent/words.txt"),
            pattern: "{word}".to_string(),
        };
        assert!(matches!(
            frontier.expand(),
            Err(FrontierError::WordList { .. })
        ));
    }

    #[test]
    fn test_alphanum_frontier_blocks_per_letter() {
        let frontier = Frontier::Alphanum {
            pattern: "https://example.com/{ALPHA}/{alpha}-{num}.html".to_string(),
            alphabet: vec!["a".to_string(), "b".to_string()],
            first_page: 1,
            last_page: 2,
        };
        let locators = frontier.expand().unwrap();
        assert_eq!(locators.len(), 4);
        assert_eq!(locators[0].text, "https://example.com/A/a-1.html");
        assert_eq!(locators[0].block, 0);
        assert_eq!(locators[1].text, "https://example.com/A/a-2.html");
        assert_eq!(locators[1].block, 0);
        assert_eq!(locators[2].text, "https://example.com/B/b-1.html");
        assert_eq!(locators[2].block, 1);
    }

    #[test]
    fn test_empty_frontier_expands_to_nothing() {
        assert!(Frontier::empty().expand().unwrap().is_empty());
    }
}
