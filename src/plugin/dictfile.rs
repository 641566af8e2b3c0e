//! Reference plugin for delimiter-separated dictionary files.
//!
//! Covers the common "one big downloadable file" source family: a plain
//! text file with one entry per line, headword and definition separated
//! by a delimiter, optionally shipped inside a zip archive.

use super::{Plugin, PluginError, SourcePolicy};
use crate::fetch::FetchMode;
use crate::frontier::Frontier;

/// Plugin for tab- or delimiter-separated dictionary files.
///
/// Options (passed as `key=value` pairs):
/// - `url=...` (required) — where the file lives;
/// - `name=...` — dictionary title recorded as metadata;
/// - `sep=...` — field delimiter, default tab;
/// - `zip=...` — the URL points at a zip archive; extract entries whose
///   name ends with this suffix.
#[derive(Debug, Clone)]
pub struct DictFilePlugin {
    url: String,
    title: String,
    separator: String,
    zip_entry_suffix: Option<String>,
}

impl DictFilePlugin {
    /// Builds the plugin from its option list.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidOption`] when `url=` is missing or
    /// an option does not parse as `key=value`.
    pub fn from_options(options: &[String]) -> Result<Self, PluginError> {
        let mut url = None;
        let mut title = "Dictionary file".to_string();
        let mut separator = "\t".to_string();
        let mut zip_entry_suffix = None;

        for option in options {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| PluginError::invalid_option(format!("expected key=value: {option}")))?;
            match key {
                "url" => url = Some(value.to_string()),
                "name" => title = value.to_string(),
                "sep" => separator = value.to_string(),
                "zip" => zip_entry_suffix = Some(value.to_string()),
                other => {
                    return Err(PluginError::invalid_option(format!(
                        "unknown option: {other}"
                    )));
                }
            }
        }

        let url = url.ok_or_else(|| PluginError::invalid_option("url= is required"))?;
        Ok(Self {
            url,
            title,
            separator,
            zip_entry_suffix,
        })
    }

    fn is_zipped(&self) -> bool {
        self.zip_entry_suffix.is_some()
    }
}

impl Plugin for DictFilePlugin {
    fn name(&self) -> &str {
        "dictfile"
    }

    fn metadata(&self) -> Vec<(String, String)> {
        vec![("bookname".to_string(), self.title.clone())]
    }

    fn policy(&self) -> SourcePolicy {
        SourcePolicy {
            // One file, one worker; concurrency buys nothing here.
            worker_count: 1,
            ..SourcePolicy::default()
        }
    }

    fn frontier(&self, mode: FetchMode) -> Result<Frontier, PluginError> {
        let frontier = match mode {
            FetchMode::Raw if !self.is_zipped() => Frontier::Fixed(vec![self.url.clone()]),
            FetchMode::Archive if self.is_zipped() => Frontier::Archive(vec![self.url.clone()]),
            _ => Frontier::empty(),
        };
        Ok(frontier)
    }

    fn segments(&self, payload: &str) -> Vec<String> {
        payload
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    fn headword(&self, segment: &str) -> Result<Option<String>, PluginError> {
        Ok(segment
            .split_once(self.separator.as_str())
            .map(|(head, _)| head.trim().to_string()))
    }

    fn definition(&self, segment: &str) -> Result<Option<String>, PluginError> {
        Ok(segment
            .split_once(self.separator.as_str())
            .map(|(_, rest)| {
                rest.split(self.separator.as_str())
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ")
            }))
    }

    fn archive_include(&self, entry_name: &str) -> bool {
        self.zip_entry_suffix
            .as_deref()
            .is_some_and(|suffix| entry_name.ends_with(suffix))
    }
}
