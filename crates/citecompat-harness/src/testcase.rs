//! Test-case generation: the minimal engine program for one fixture.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use citecompat_error::Result;
use serde_json::Value;

use crate::adapter::{AdaptedData, RecordAdapter};
use crate::fixture::Fixture;
use crate::record::scalar_text;
use crate::style::PreparedStyle;

/// Default import path of the engine library, relative to the project root.
pub const DEFAULT_LIBRARY_IMPORT: &str = "/lib.typ";
/// Entry point rendering the references list.
pub const BIBLIOGRAPHY_FUNCTION: &str = "csl-bibliography";

/// Files written for one fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseArtifacts {
    pub data_path: PathBuf,
    pub style_path: PathBuf,
    pub program_path: PathBuf,
    /// Where the engine is asked to write its output.
    pub output_path: PathBuf,
}

/// Inputs for [`render_program`].
#[derive(Debug, Clone, Copy)]
pub struct ProgramSpec<'a> {
    pub fixture_name: &'a str,
    pub library_import: &'a str,
    pub init_function: &'a str,
    /// Project-root-relative path of the data file.
    pub data_path: &'a str,
    /// Project-root-relative path of the style file.
    pub style_path: &'a str,
    pub keys: &'a [String],
    pub has_bibliography: bool,
}

/// Ordered citation keys for a fixture.
///
/// Explicit CITATION-ITEMS clusters are flattened in cluster order, then in
/// order within each cluster; cites without an `id` are ignored. Without
/// clusters every record key is cited in input order.
#[must_use]
pub fn citation_keys(fixture: &Fixture, record_keys: &[String]) -> Vec<String> {
    match fixture.citation_items.as_deref() {
        Some(clusters) if !clusters.is_empty() => clusters
            .iter()
            .flatten()
            .filter_map(cite_id)
            .collect(),
        _ => record_keys.to_vec(),
    }
}

/// Render the engine program text.
#[must_use]
pub fn render_program(program: &ProgramSpec<'_>) -> String {
    let mut out = String::with_capacity(512);
    let _ = writeln!(out, "// Auto-generated test for: {}", program.fixture_name);
    let _ = writeln!(
        out,
        "#import \"{}\": {BIBLIOGRAPHY_FUNCTION}, {}",
        program.library_import, program.init_function
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "#set page(width: auto, height: auto, margin: 1em)");
    let _ = writeln!(out);
    let _ = writeln!(out, "#show: {}.with(", program.init_function);
    let _ = writeln!(out, "  read(\"/{}\"),", program.data_path);
    let _ = writeln!(out, "  read(\"/{}\"),", program.style_path);
    let _ = writeln!(out, ")");
    let _ = writeln!(out);

    let citations = program
        .keys
        .iter()
        .map(|key| format!("@{key}"))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(out, "{citations}");
    let _ = writeln!(out);
    if program.has_bibliography {
        let _ = writeln!(out, "#{BIBLIOGRAPHY_FUNCTION}()");
    }
    out
}

/// Write data, style, and program files for `fixture` into `scratch_dir`.
///
/// # Errors
///
/// Returns an I/O error when the scratch directory or a file cannot be
/// written.
pub fn write_test_case(
    fixture: &Fixture,
    adapter: &dyn RecordAdapter,
    adapted: &AdaptedData,
    style: &PreparedStyle,
    project_root: &Path,
    scratch_dir: &Path,
    library_import: &str,
) -> Result<TestCaseArtifacts> {
    fs::create_dir_all(scratch_dir)?;

    let data_path = scratch_dir.join(format!("{}.{}", fixture.name, adapter.file_extension()));
    let style_path = scratch_dir.join(format!("{}.csl", fixture.name));
    let program_path = scratch_dir.join(format!("{}.typ", fixture.name));
    let output_path = scratch_dir.join(format!("{}.pdf", fixture.name));

    fs::write(&data_path, &adapted.content)?;
    fs::write(&style_path, &style.text)?;

    let keys = citation_keys(fixture, &adapted.keys);
    let data_rel = project_relative(project_root, &data_path);
    let style_rel = project_relative(project_root, &style_path);
    let program = render_program(&ProgramSpec {
        fixture_name: &fixture.name,
        library_import,
        init_function: adapter.init_function(),
        data_path: &data_rel,
        style_path: &style_rel,
        keys: &keys,
        has_bibliography: style.has_bibliography,
    });
    fs::write(&program_path, program)?;

    Ok(TestCaseArtifacts {
        data_path,
        style_path,
        program_path,
        output_path,
    })
}

/// `path` relative to `root` with `/` separators. Paths outside `root` are
/// returned unchanged.
#[must_use]
pub fn project_relative(root: &Path, path: &Path) -> String {
    let Ok(relative) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Id of one cite object inside a CITATION-ITEMS cluster.
#[must_use]
pub fn cite_id(cite: &Value) -> Option<String> {
    cite.get("id").and_then(scalar_text)
}
