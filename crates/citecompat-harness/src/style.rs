//! CSL style preprocessing.

use tracing::debug;

use crate::fixture::{Fixture, FixtureMode};
use crate::skip_policy::CompatPolicy;

const STYLE_CLOSE_TAG: &str = "</style>";

/// Single-field references list spliced into citation-only styles.
pub const MINIMAL_BIBLIOGRAPHY: &str = r#"
  <bibliography>
    <layout>
      <text variable="title"/>
    </layout>
  </bibliography>
"#;

/// Markers of CSL-M, the dialect extension of CSL the engine only partly
/// supports.
pub const DIALECT_MARKERS: &[&str] = &[
    "1.1mlz1",
    "<institution",
    "<conditions",
    "<alternative",
    "<layout locale=",
];

/// Style text ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStyle {
    pub text: String,
    pub has_bibliography: bool,
    /// Whether [`MINIMAL_BIBLIOGRAPHY`] was injected.
    pub shimmed: bool,
}

/// Whether the style defines a references list.
#[must_use]
pub fn has_bibliography(style: &str) -> bool {
    style.contains("<bibliography")
}

/// Whether the style uses CSL-M dialect markup.
#[must_use]
pub fn uses_dialect_extensions(style: &str) -> bool {
    DIALECT_MARKERS.iter().any(|marker| style.contains(marker))
}

/// Splice [`MINIMAL_BIBLIOGRAPHY`] before the last `</style>`.
///
/// A style without a closing tag is returned unchanged.
#[must_use]
pub fn inject_minimal_bibliography(style: &str) -> String {
    let Some(close) = style.rfind(STYLE_CLOSE_TAG) else {
        return style.to_owned();
    };
    let mut out = String::with_capacity(style.len() + MINIMAL_BIBLIOGRAPHY.len());
    out.push_str(&style[..close]);
    out.push_str(MINIMAL_BIBLIOGRAPHY);
    out.push_str(&style[close..]);
    out
}

/// Prepare the fixture's style under `policy`.
///
/// `Shim` gives citation-mode fixtures without a references list a minimal
/// one so they can still be rendered end to end. `Strict` never touches the
/// text; the skip policy excludes those fixtures instead.
#[must_use]
pub fn prepare_style(fixture: &Fixture, policy: CompatPolicy) -> PreparedStyle {
    let needs_shim = policy == CompatPolicy::Shim
        && fixture.mode == FixtureMode::Citation
        && !has_bibliography(&fixture.style);

    let text = if needs_shim {
        inject_minimal_bibliography(&fixture.style)
    } else {
        fixture.style.clone()
    };
    let has_bibliography = has_bibliography(&text);
    let shimmed = needs_shim && has_bibliography;
    if needs_shim && !shimmed {
        debug!(
            target: "citecompat",
            fixture = %fixture.name,
            "style has no closing tag; bibliography shim not applied"
        );
    }

    PreparedStyle {
        text,
        has_bibliography,
        shimmed,
    }
}
