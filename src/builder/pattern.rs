//! # Path and Pattern Parsing
//!
//! The two accept-grammars of copy operations (`@<alias>/<pattern>` and
//! `@artifact/<path>`) plus double-star glob matching for patterns and
//! exclude lists.

use glob::{MatchOptions, Pattern};

use super::BuildError;

/// Prefix every destination reference must carry
pub const ARTIFACT_PREFIX: &str = "@artifact/";

/// Parse a source reference of the form `@<alias>/<pattern>`.
///
/// Splits on the first `/`; the pattern may be empty (bare directory) and
/// may itself contain separators.
pub fn parse_source_ref(from: &str) -> Result<(&str, &str), BuildError> {
    let rest = from
        .strip_prefix('@')
        .ok_or_else(|| BuildError::InvalidSourceRef(from.to_string()))?;
    rest.split_once('/')
        .ok_or_else(|| BuildError::InvalidSourceRef(from.to_string()))
}

/// Parse a destination reference of the form `@artifact/<path>`.
///
/// The returned path is relative to the staging root; it may be empty
/// (the root itself) and may end with `/`.
pub fn parse_artifact_ref(to: &str) -> Result<&str, BuildError> {
    to.strip_prefix(ARTIFACT_PREFIX)
        .ok_or_else(|| BuildError::InvalidArtifactRef(to.to_string()))
}

/// Whether a pattern contains glob metacharacters
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', ']'])
}

/// Whether a pattern asks for recursive contents (`<dir>/**` or bare `**`)
pub fn has_recursive_suffix(pattern: &str) -> bool {
    pattern == "**" || pattern.ends_with("/**")
}

/// Directory prefix stripped from matches of a recursive-contents pattern.
///
/// `config/**` strips `config/`; bare `**` strips nothing.
pub fn recursive_prefix(pattern: &str) -> Option<&str> {
    if pattern == "**" {
        Some("")
    } else {
        pattern.strip_suffix("/**")
    }
}

/// Whether a filename names a gzipped tarball (`.tar.gz` / `.tgz`, case-insensitive)
pub fn is_tarball(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        // `*` must not cross directory separators; `**` still does
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Compile a glob pattern, surfacing invalid syntax as a build error
pub fn compile(pattern: &str) -> Result<Pattern, BuildError> {
    Pattern::new(pattern).map_err(|e| BuildError::InvalidPattern {
        pattern: pattern.to_string(),
        detail: e.to_string(),
    })
}

/// Match a relative path against a compiled pattern with double-star semantics
pub fn matches_path(pattern: &Pattern, rel: &str) -> bool {
    pattern.matches_with(rel, match_options())
}

/// A validated list of exclude patterns.
///
/// A pattern without a separator also matches against the basename alone,
/// keeping `*.md`-style rules intuitive for nested files.
#[derive(Debug, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Validate and compile the exclude list of a copy operation
    pub fn parse(excludes: Option<&[String]>) -> Result<Self, BuildError> {
        let patterns = excludes
            .unwrap_or_default()
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether a path relative to the matched root is excluded
    pub fn is_excluded(&self, rel: &str) -> bool {
        let basename = rel.rsplit('/').next().unwrap_or(rel);
        self.patterns.iter().any(|p| {
            matches_path(p, rel)
                || (!p.as_str().contains('/') && matches_path(p, basename))
        })
    }

}
