//! Source plugin contract and startup registry.
//!
//! A plugin describes one dictionary source: where its documents live
//! (frontiers per fetch mode), how locators become HTTP requests, how
//! fetched bodies are filtered, and how payloads break down into
//! headword/definition entries. The pipeline stays generic; everything
//! source-specific lives behind this trait.

mod dictfile;

pub use dictfile::DictFilePlugin;

use thiserror::Error;

use crate::consolidate::AmbiguityPolicy;
use crate::fetch::{DEFAULT_WORKER_COUNT, FetchMode, FetchRequest};
use crate::frontier::Frontier;

/// Errors raised by plugin callbacks and the registry.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// No plugin is registered under the requested name.
    #[error("unknown plugin: {name}")]
    UnknownPlugin {
        /// The requested name.
        name: String,
    },

    /// A plugin option was missing or malformed.
    #[error("invalid plugin option: {message}")]
    InvalidOption {
        /// What was wrong.
        message: String,
    },

    /// Extraction failed on a fetched document.
    #[error("extraction failed: {message}")]
    Extraction {
        /// What went wrong.
        message: String,
    },
}

impl PluginError {
    pub(crate) fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }
}

/// What the plugin decided about one fetched body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Keep these bytes as the record's payload.
    Keep(Vec<u8>),
    /// Nothing useful here; record the locator as fetched with no payload.
    Discard,
    /// This locator's block is exhausted; skip its remaining locators.
    NextBlock,
}

/// Per-source tuning knobs carried alongside the extraction callbacks.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    /// Number of concurrent fetch workers.
    pub worker_count: usize,
    /// Optional pause between requests per worker, in milliseconds.
    pub pause_ms: Option<u64>,
    /// Treat HTTP 403/404 as a missing document instead of retrying.
    pub missing_as_empty: bool,
    /// Detect byte-identical payloads and store cross-references.
    pub dedup_payloads: bool,
    /// How consolidation resolves same-headword conflicts.
    pub ambiguity: AmbiguityPolicy,
    /// Whether the consolidation stage runs at all.
    pub consolidate: bool,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            pause_ms: None,
            missing_as_empty: false,
            dedup_payloads: false,
            ambiguity: AmbiguityPolicy::Enumerate,
            consolidate: true,
        }
    }
}

/// One dictionary source.
///
/// Callbacks are synchronous and must be cheap; anything slow belongs
/// in the fetch stage. Default implementations cover the common case so
/// a minimal plugin only supplies a frontier and the entry extraction.
pub trait Plugin: Send + Sync {
    /// Registry name of the plugin.
    fn name(&self) -> &str;

    /// Dictionary metadata (book name and friends) recorded at startup.
    fn metadata(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// The source's tuning knobs.
    fn policy(&self) -> SourcePolicy {
        SourcePolicy::default()
    }

    /// The locator source for one fetch mode. An empty frontier means
    /// the mode has nothing of its own to seed (it may still pick up
    /// records produced by an earlier mode).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the frontier cannot be described.
    fn frontier(&self, mode: FetchMode) -> Result<Frontier, PluginError>;

    /// Turns a locator into an HTTP request.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the locator is malformed for this source.
    fn parse_locator(&self, locator: &str) -> Result<FetchRequest, PluginError> {
        Ok(FetchRequest::get(locator))
    }

    /// Filters one fetched body before storage.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the body cannot be examined.
    fn filter_payload(&self, _locator: &str, data: Vec<u8>) -> Result<FilterOutcome, PluginError> {
        Ok(FilterOutcome::Keep(data))
    }

    /// Extracts child locators from a discovery-mode body.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the body cannot be parsed.
    fn discover(&self, _locator: &str, _data: &[u8]) -> Result<Vec<String>, PluginError> {
        Ok(Vec::new())
    }

    /// Splits one payload into candidate entry segments.
    ///
    /// The default treats the whole payload as a single candidate.
    fn segments(&self, payload: &str) -> Vec<String> {
        vec![payload.to_string()]
    }

    /// Extracts the headword from a candidate segment. `None` or a
    /// blank result discards the candidate silently.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the segment cannot be parsed.
    fn headword(&self, segment: &str) -> Result<Option<String>, PluginError>;

    /// Extracts alternate forms for the candidate. When empty, the
    /// processor applies its parenthesized-suffix heuristic.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the segment cannot be parsed.
    fn alternates(&self, _segment: &str, _headword: &str) -> Result<Vec<String>, PluginError> {
        Ok(Vec::new())
    }

    /// Extracts the definition body from a candidate segment. `None` or
    /// a blank result discards the candidate silently.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the segment cannot be parsed.
    fn definition(&self, segment: &str) -> Result<Option<String>, PluginError>;

    /// Whether an archive entry should be extracted as a data file.
    fn archive_include(&self, _entry_name: &str) -> bool {
        false
    }

    /// Whether an archive entry is a resource to copy alongside the data.
    fn archive_resource(&self, _entry_name: &str) -> bool {
        false
    }

    /// Supplies the payload for a memory-tagged record, keyed by locator.
    fn memory_payload(&self, _locator: &str) -> Option<String> {
        None
    }
}

/// Wraps a plugin with command-line policy overrides.
///
/// Everything delegates to the inner plugin except [`Plugin::policy`],
/// where the overrides win.
pub struct PolicyOverride {
    inner: Box<dyn Plugin>,
    worker_count: Option<usize>,
    skip_consolidation: bool,
}

impl PolicyOverride {
    /// Wraps `inner` with the given overrides.
    #[must_use]
    pub fn new(
        inner: Box<dyn Plugin>,
        worker_count: Option<usize>,
        skip_consolidation: bool,
    ) -> Self {
        Self {
            inner,
            worker_count,
            skip_consolidation,
        }
    }
}

impl Plugin for PolicyOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn metadata(&self) -> Vec<(String, String)> {
        self.inner.metadata()
    }

    fn policy(&self) -> SourcePolicy {
        let mut policy = self.inner.policy();
        if let Some(workers) = self.worker_count {
            policy.worker_count = workers.max(1);
        }
        if self.skip_consolidation {
            policy.consolidate = false;
        }
        policy
    }

    fn frontier(&self, mode: FetchMode) -> Result<Frontier, PluginError> {
        self.inner.frontier(mode)
    }

    fn parse_locator(&self, locator: &str) -> Result<FetchRequest, PluginError> {
        self.inner.parse_locator(locator)
    }

    fn filter_payload(&self, locator: &str, data: Vec<u8>) -> Result<FilterOutcome, PluginError> {
        self.inner.filter_payload(locator, data)
    }

    fn discover(&self, locator: &str, data: &[u8]) -> Result<Vec<String>, PluginError> {
        self.inner.discover(locator, data)
    }

    fn segments(&self, payload: &str) -> Vec<String> {
        self.inner.segments(payload)
    }

    fn headword(&self, segment: &str) -> Result<Option<String>, PluginError> {
        self.inner.headword(segment)
    }

    fn alternates(&self, segment: &str, headword: &str) -> Result<Vec<String>, PluginError> {
        self.inner.alternates(segment, headword)
    }

    fn definition(&self, segment: &str) -> Result<Option<String>, PluginError> {
        self.inner.definition(segment)
    }

    fn archive_include(&self, entry_name: &str) -> bool {
        self.inner.archive_include(entry_name)
    }

    fn archive_resource(&self, entry_name: &str) -> bool {
        self.inner.archive_resource(entry_name)
    }

    fn memory_payload(&self, locator: &str) -> Option<String> {
        self.inner.memory_payload(locator)
    }
}

/// Startup-time plugin registry.
pub mod registry {
    use super::{DictFilePlugin, Plugin, PluginError};

    type Factory = fn(&[String]) -> Result<Box<dyn Plugin>, PluginError>;

    const PLUGINS: &[(&str, Factory)] = &[("dictfile", |options| {
        Ok(Box::new(DictFilePlugin::from_options(options)?))
    })];

    /// Instantiates the named plugin with its option list.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] for an unregistered name,
    /// or the factory's own error for bad options.
    pub fn create(name: &str, options: &[String]) -> Result<Box<dyn Plugin>, PluginError> {
        PLUGINS
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, factory)| factory(options))
            .unwrap_or_else(|| {
                Err(PluginError::UnknownPlugin {
                    name: name.to_string(),
                })
            })
    }

    /// Lists the registered plugin names.
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        PLUGINS.iter().map(|(name, _)| *name).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_knows_dictfile() {
        assert!(registry::names().contains(&"dictfile"));
    }

    #[test]
    fn test_registry_unknown_plugin_errors() {
        let result = registry::create("no-such-source", &[]);
        assert!(matches!(
            result,
            Err(PluginError::UnknownPlugin { name }) if name == "no-such-source"
        ));
    }

    #[test]
    fn test_registry_creates_dictfile_with_options() {
        let options = vec!["url=https://example.com/dict.txt".to_string()];
        let plugin = registry::create("dictfile", &options).unwrap();
        assert_eq!(plugin.name(), "dictfile");
    }

    #[test]
    fn test_policy_override_adjusts_workers_and_consolidation() {
        let inner = registry::create(
            "dictfile",
            &["url=https://example.com/d.txt".to_string()],
        )
        .unwrap();
        let wrapped = PolicyOverride::new(inner, Some(4), true);

        let policy = wrapped.policy();
        assert_eq!(policy.worker_count, 4);
        assert!(!policy.consolidate);
        assert_eq!(wrapped.name(), "dictfile");
    }

    #[test]
    fn test_source_policy_defaults() {
        let policy = SourcePolicy::default();
        assert_eq!(policy.worker_count, DEFAULT_WORKER_COUNT);
        assert!(policy.pause_ms.is_none());
        assert!(!policy.missing_as_empty);
        assert!(!policy.dedup_payloads);
        assert!(policy.consolidate);
    }
}
