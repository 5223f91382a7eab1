//! Record adaptation strategies.
//!
//! The engine accepts bibliographic data either as CSL-JSON (read directly)
//! or as a BibTeX database converted from it. Both strategies sit behind
//! [`RecordAdapter`]; [`AdapterKind`] selects one from configuration.

use std::fmt;
use std::str::FromStr;

use citecompat_error::Result;
use serde::{Deserialize, Serialize};

use crate::record::{BibEntry, CslItem, backfill_ids};

/// Data produced by an adapter for one fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedData {
    /// Serialized data file content.
    pub content: String,
    /// Record keys in input order, after id backfill.
    pub keys: Vec<String>,
}

/// Converts fixture input records into a form the engine reads.
pub trait RecordAdapter {
    /// Extension of the data file written for the engine.
    fn file_extension(&self) -> &'static str;

    /// Engine entry point that initializes from this data format.
    fn init_function(&self) -> &'static str;

    /// Adapt `items`, backfilling missing ids.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapted data cannot be serialized.
    fn adapt(&self, items: &[CslItem]) -> Result<AdaptedData>;
}

/// Pass-through CSL-JSON with id backfill.
#[derive(Debug, Clone, Copy, Default)]
pub struct CslJsonAdapter;

impl RecordAdapter for CslJsonAdapter {
    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn init_function(&self) -> &'static str {
        "init-csl-json"
    }

    fn adapt(&self, items: &[CslItem]) -> Result<AdaptedData> {
        let items = backfill_ids(items);
        let content = serde_json::to_string_pretty(&items)?;
        Ok(AdaptedData {
            content,
            keys: record_keys(&items),
        })
    }
}

/// Legacy conversion into BibTeX entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct BibtexAdapter;

impl RecordAdapter for BibtexAdapter {
    fn file_extension(&self) -> &'static str {
        "bib"
    }

    fn init_function(&self) -> &'static str {
        "init-csl"
    }

    fn adapt(&self, items: &[CslItem]) -> Result<AdaptedData> {
        let items = backfill_ids(items);
        let content = items
            .iter()
            .map(|item| BibEntry::from_csl(item).render())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(AdaptedData {
            content,
            keys: record_keys(&items),
        })
    }
}

fn record_keys(items: &[CslItem]) -> Vec<String> {
    items.iter().filter_map(CslItem::id_text).collect()
}

/// Configured adapter strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    #[default]
    CslJson,
    Bibtex,
}

impl AdapterKind {
    #[must_use]
    pub fn adapter(self) -> &'static dyn RecordAdapter {
        match self {
            Self::CslJson => &CslJsonAdapter,
            Self::Bibtex => &BibtexAdapter,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CslJson => "csl-json",
            Self::Bibtex => "bibtex",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csl-json" | "json" => Ok(Self::CslJson),
            "bibtex" | "bib" => Ok(Self::Bibtex),
            other => Err(format!("unknown adapter '{other}' (expected csl-json or bibtex)")),
        }
    }
}
