use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for the fixture compatibility harness.
///
/// Variants are grouped the way the pipeline contains them: fixture parse
/// failures exclude a fixture from the corpus, execution failures become
/// `error` verdicts, and only corpus/config failures abort a run.
#[derive(Error, Debug)]
pub enum CompatError {
    // === Fixture Parse Errors ===
    /// An opening marker line is missing its `=====>>` terminator.
    #[error("malformed section marker at offset {offset}: {detail}")]
    MalformedMarker { offset: usize, detail: String },

    /// An opening marker has no matching closing marker with the same name.
    #[error("section {name} opened at offset {offset} is never closed")]
    UnterminatedSection { name: String, offset: usize },

    /// A required section is absent or empty.
    #[error("missing required section: {name}")]
    MissingSection { name: String },

    /// The MODE section names a mode the harness does not know.
    #[error("unknown fixture mode: '{mode}'")]
    UnknownMode { mode: String },

    /// A structured section did not decode into the expected shape.
    #[error("invalid {section} section: {detail}")]
    InvalidSectionData { section: String, detail: String },

    // === Corpus Errors ===
    /// The fixture corpus directory does not exist.
    #[error("fixtures directory not found: '{path}'")]
    CorpusNotFound { path: PathBuf },

    // === Configuration Errors ===
    /// A configuration file could not be read or parsed.
    #[error("invalid configuration '{path}': {detail}")]
    Config { path: PathBuf, detail: String },

    // === Execution Errors ===
    /// The external engine could not be started.
    #[error("failed to spawn '{program}': {detail}")]
    Spawn { program: String, detail: String },

    /// A verdict was resolved a second time.
    #[error("verdict for fixture {fixture} is already resolved")]
    AlreadyResolved { fixture: String },

    // === I/O and Serialization ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("internal error: {0}")]
    Internal(String),
}

impl CompatError {
    /// Whether the error belongs to a single fixture and must not abort the batch.
    pub const fn is_fixture_local(&self) -> bool {
        !matches!(self, Self::CorpusNotFound { .. } | Self::Config { .. })
    }

    /// Whether the error means a fixture file is not a usable fixture.
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMarker { .. }
                | Self::UnterminatedSection { .. }
                | Self::MissingSection { .. }
                | Self::UnknownMode { .. }
                | Self::InvalidSectionData { .. }
        )
    }

    /// Process exit code used by the CLI when this error ends a run.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            _ => 1,
        }
    }

    pub fn missing_section(name: impl Into<String>) -> Self {
        Self::MissingSection { name: name.into() }
    }

    pub fn invalid_section(section: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidSectionData {
            section: section.into(),
            detail: detail.into(),
        }
    }

    pub fn config(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn spawn(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            detail: detail.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CompatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_missing_section() {
        let err = CompatError::missing_section("MODE");
        assert_eq!(err.to_string(), "missing required section: MODE");
    }

    #[test]
    fn error_display_unterminated() {
        let err = CompatError::UnterminatedSection {
            name: "CSL".to_owned(),
            offset: 42,
        };
        assert_eq!(
            err.to_string(),
            "section CSL opened at offset 42 is never closed"
        );
    }

    #[test]
    fn parse_errors_are_fixture_local() {
        let err = CompatError::invalid_section("INPUT", "expected array");
        assert!(err.is_parse_error());
        assert!(err.is_fixture_local());
    }

    #[test]
    fn corpus_and_config_errors_are_fatal() {
        let corpus = CompatError::CorpusNotFound {
            path: PathBuf::from("/nope"),
        };
        assert!(!corpus.is_fixture_local());
        assert_eq!(corpus.exit_code(), 1);

        let config = CompatError::config("citecompat.toml", "bad key");
        assert!(!config.is_fixture_local());
        assert_eq!(config.exit_code(), 2);
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CompatError = io.into();
        assert!(matches!(err, CompatError::Io(_)));
        assert!(err.is_fixture_local());
        assert!(!err.is_parse_error());
    }

    #[test]
    fn spawn_error_display() {
        let err = CompatError::spawn("typst", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "failed to spawn 'typst': No such file or directory"
        );
    }
}
