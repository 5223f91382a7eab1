//! Skip policy: fixtures known to exercise unsupported features.
//!
//! Rules are evaluated in a fixed order before any artifact is generated; the
//! first matching rule names the skip reason.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fixture::{Fixture, FixtureMode};
use crate::style::{has_bibliography, uses_dialect_extensions};

/// Compatibility policy applied to the corpus.
///
/// `Shim` runs nosort and CSL-M fixtures as-is and injects a minimal
/// bibliography into citation-only styles. `Strict` skips all three instead
/// and leaves style text untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatPolicy {
    #[default]
    Shim,
    Strict,
}

impl CompatPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shim => "shim",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for CompatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "shim" | "a" => Ok(Self::Shim),
            "strict" | "b" => Ok(Self::Strict),
            other => Err(format!("unknown policy '{other}' (expected shim or strict)")),
        }
    }
}

/// Why a fixture was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Abbreviations,
    NosortMode,
    DialectExtensions,
    CitationOnly,
}

impl SkipReason {
    /// Human-readable reason shown in the report.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Abbreviations => "Uses abbreviations (not supported)",
            Self::NosortMode => "Uses nosort mode (not supported)",
            Self::DialectExtensions => "Uses dialect extensions (not supported)",
            Self::CitationOnly => "Citation-only test (no bibliography in CSL)",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// One named predicate in the skip chain.
#[derive(Clone, Copy)]
pub struct SkipRule {
    pub reason: SkipReason,
    /// Policies under which the rule is active.
    pub policies: &'static [CompatPolicy],
    pub matches: fn(&Fixture) -> bool,
}

impl fmt::Debug for SkipRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipRule")
            .field("reason", &self.reason)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

const ALL_POLICIES: &[CompatPolicy] = &[CompatPolicy::Shim, CompatPolicy::Strict];
const STRICT_ONLY: &[CompatPolicy] = &[CompatPolicy::Strict];

/// The skip chain, in priority order.
pub const SKIP_RULES: &[SkipRule] = &[
    SkipRule {
        reason: SkipReason::Abbreviations,
        policies: ALL_POLICIES,
        matches: |fixture| fixture.abbreviations.is_some(),
    },
    SkipRule {
        reason: SkipReason::NosortMode,
        policies: STRICT_ONLY,
        matches: |fixture| fixture.mode == FixtureMode::BibliographyNosort,
    },
    SkipRule {
        reason: SkipReason::DialectExtensions,
        policies: STRICT_ONLY,
        matches: |fixture| uses_dialect_extensions(&fixture.style),
    },
    SkipRule {
        reason: SkipReason::CitationOnly,
        policies: STRICT_ONLY,
        matches: |fixture| fixture.mode == FixtureMode::Citation && !has_bibliography(&fixture.style),
    },
];

/// Evaluate the skip chain; `None` means the fixture should run.
#[must_use]
pub fn evaluate_skip_policy(fixture: &Fixture, policy: CompatPolicy) -> Option<SkipReason> {
    SKIP_RULES
        .iter()
        .filter(|rule| rule.policies.contains(&policy))
        .find(|rule| (rule.matches)(fixture))
        .map(|rule| rule.reason)
}
