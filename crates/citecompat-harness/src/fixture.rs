//! citeproc-js fixture parsing.
//!
//! A fixture is UTF-8 text made of named sections delimited by symmetric,
//! name-qualified markers:
//!
//! ```text
//! >>===== MODE =====>>
//! citation
//! <<===== MODE =====<<
//! ```
//!
//! [`scan_sections`] is an explicit scanner over that grammar and reports the
//! byte offset of malformed or unterminated markers. [`parse_fixture`] applies
//! the corpus contract on top of it: a file lacking MODE, RESULT, CSL or INPUT,
//! or whose structured sections do not decode, is not a fixture and yields
//! `None` rather than an error.

use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;

use citecompat_error::{CompatError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::record::CslItem;

const OPEN_PREFIX: &str = ">>===== ";
const OPEN_SUFFIX: &str = " =====>>";
const CLOSE_PREFIX: &str = "<<===== ";
const CLOSE_SUFFIX: &str = " =====<<";

pub const SECTION_MODE: &str = "MODE";
pub const SECTION_RESULT: &str = "RESULT";
pub const SECTION_CSL: &str = "CSL";
pub const SECTION_INPUT: &str = "INPUT";
pub const SECTION_CITATION_ITEMS: &str = "CITATION-ITEMS";
pub const SECTION_CITATIONS: &str = "CITATIONS";
pub const SECTION_ABBREVIATIONS: &str = "ABBREVIATIONS";

/// Rendering mode declared by a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixtureMode {
    Citation,
    Bibliography,
    BibliographyNosort,
}

impl FixtureMode {
    /// Parse the trimmed body of a MODE section.
    ///
    /// # Errors
    ///
    /// Returns [`CompatError::UnknownMode`] for any other value.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "citation" => Ok(Self::Citation),
            "bibliography" => Ok(Self::Bibliography),
            "bibliography-nosort" => Ok(Self::BibliographyNosort),
            other => Err(CompatError::UnknownMode {
                mode: other.to_owned(),
            }),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Citation => "citation",
            Self::Bibliography => "bibliography",
            Self::BibliographyNosort => "bibliography-nosort",
        }
    }
}

impl fmt::Display for FixtureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named section located by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub name: &'a str,
    /// Section content with surrounding whitespace trimmed.
    pub body: &'a str,
    /// Byte span from the opening marker through the closing marker.
    pub span: Range<usize>,
}

/// A parsed citeproc-js fixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fixture {
    pub name: String,
    pub mode: FixtureMode,
    pub expected_result: String,
    pub style: String,
    pub input: Vec<CslItem>,
    pub citation_items: Option<Vec<Vec<Value>>>,
    pub citations: Option<Value>,
    pub abbreviations: Option<Map<String, Value>>,
}

/// Scan every section in `text`, in document order.
///
/// The body of a section is the shortest span that ends at the first closing
/// marker carrying the same name. Text outside sections is ignored.
///
/// # Errors
///
/// Returns [`CompatError::MalformedMarker`] when an opening marker line has
/// no terminator or an empty name, and [`CompatError::UnterminatedSection`]
/// when no matching closing marker follows an opening marker.
pub fn scan_sections(text: &str) -> Result<Vec<Section<'_>>> {
    let mut sections = Vec::new();
    let mut cursor = 0;

    while let Some(relative) = text[cursor..].find(OPEN_PREFIX) {
        let start = cursor + relative;
        let name_start = start + OPEN_PREFIX.len();
        let line_end = text[name_start..]
            .find('\n')
            .map_or(text.len(), |idx| name_start + idx);

        let Some(name_len) = text[name_start..line_end].find(OPEN_SUFFIX) else {
            return Err(CompatError::MalformedMarker {
                offset: start,
                detail: format!("opening marker is missing '{}'", OPEN_SUFFIX.trim()),
            });
        };
        let name = &text[name_start..name_start + name_len];
        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            return Err(CompatError::MalformedMarker {
                offset: start,
                detail: format!("invalid section name {name:?}"),
            });
        }

        let body_start = name_start + name_len + OPEN_SUFFIX.len();
        let closer = format!("{CLOSE_PREFIX}{name}{CLOSE_SUFFIX}");
        let Some(body_len) = text[body_start..].find(&closer) else {
            return Err(CompatError::UnterminatedSection {
                name: name.to_owned(),
                offset: start,
            });
        };
        let body_end = body_start + body_len;
        let end = body_end + closer.len();

        sections.push(Section {
            name,
            body: text[body_start..body_end].trim(),
            span: start..end,
        });
        cursor = end;
    }

    Ok(sections)
}

/// Parse fixture text, reporting why it is not a usable fixture.
///
/// # Errors
///
/// Returns a parse-family [`CompatError`] (see
/// [`CompatError::is_parse_error`]) describing the first problem found.
pub fn try_parse_fixture(name: &str, text: &str) -> Result<Fixture> {
    let sections = scan_sections(text)?;

    let mode = required(&sections, SECTION_MODE)?;
    let expected_result = required(&sections, SECTION_RESULT)?;
    let style = required(&sections, SECTION_CSL)?;
    let input = required(&sections, SECTION_INPUT)?;

    let mode = FixtureMode::parse(mode)?;
    let input: Vec<CslItem> = decode_section(SECTION_INPUT, input)?;

    let citation_items = optional(&sections, SECTION_CITATION_ITEMS)
        .map(|raw| decode_section::<Vec<Vec<Value>>>(SECTION_CITATION_ITEMS, raw))
        .transpose()?;
    let citations = optional(&sections, SECTION_CITATIONS)
        .map(|raw| decode_section::<Value>(SECTION_CITATIONS, raw))
        .transpose()?;
    let abbreviations = optional(&sections, SECTION_ABBREVIATIONS)
        .map(|raw| decode_section::<Map<String, Value>>(SECTION_ABBREVIATIONS, raw))
        .transpose()?;

    Ok(Fixture {
        name: name.to_owned(),
        mode,
        expected_result: expected_result.to_owned(),
        style: style.to_owned(),
        input,
        citation_items,
        citations,
        abbreviations,
    })
}

/// Parse fixture text; anything that is not a complete fixture yields `None`.
#[must_use]
pub fn parse_fixture(name: &str, text: &str) -> Option<Fixture> {
    match try_parse_fixture(name, text) {
        Ok(fixture) => Some(fixture),
        Err(error) => {
            debug!(target: "citecompat", fixture = name, %error, "fixture excluded from corpus");
            None
        }
    }
}

/// Read and parse a fixture file. The fixture name is the file stem.
#[must_use]
pub fn load_fixture(path: &Path) -> Option<Fixture> {
    let name = path.file_stem()?.to_string_lossy().into_owned();
    match fs::read_to_string(path) {
        Ok(text) => parse_fixture(&name, &text),
        Err(error) => {
            debug!(
                target: "citecompat",
                path = %path.display(),
                %error,
                "fixture file unreadable"
            );
            None
        }
    }
}

fn optional<'a>(sections: &[Section<'a>], name: &str) -> Option<&'a str> {
    sections
        .iter()
        .find(|section| section.name == name)
        .map(|section| section.body)
        .filter(|body| !body.is_empty())
}

fn required<'a>(sections: &[Section<'a>], name: &str) -> Result<&'a str> {
    optional(sections, name).ok_or_else(|| CompatError::missing_section(name))
}

fn decode_section<T: DeserializeOwned>(section: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|error| CompatError::invalid_section(section, error.to_string()))
}
