//! # Validation
//!
//! Validates ArtifactGenerator specs before any work happens. Failures
//! here are terminal: the object is stalled until its spec changes.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::ReconcilerError;
use crate::crd::ArtifactGenerator;

/// Alias charset: lowercase alphanumerics, `-` and `_`, no leading or
/// trailing hyphen
static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-_a-z0-9]*[a-z0-9])?$").expect("alias regex is valid")
});

/// DNS-1123 label for output artifact names
static DNS1123_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("name regex is valid"));

/// Validate a generator spec
///
/// Rejects duplicate source aliases, duplicate artifact names,
/// `revision`/`originRevision` references to unknown aliases, and, when
/// lockdown is enabled, cross-namespace source references.
pub fn validate(
    generator: &ArtifactGenerator,
    no_cross_namespace_refs: bool,
) -> Result<(), ReconcilerError> {
    let own_namespace = generator.metadata.namespace.as_deref().unwrap_or("default");

    let mut aliases = HashSet::new();
    for source in &generator.spec.sources {
        if !ALIAS_RE.is_match(&source.alias) {
            return Err(ReconcilerError::ValidationFailed(format!(
                "invalid source alias '{}': must match [a-z0-9]([-_a-z0-9]*[a-z0-9])?",
                source.alias
            )));
        }
        if !aliases.insert(source.alias.as_str()) {
            return Err(ReconcilerError::ValidationFailed(format!(
                "duplicate source alias '{}'",
                source.alias
            )));
        }
        if no_cross_namespace_refs {
            if let Some(ns) = source.namespace.as_deref() {
                if !ns.is_empty() && ns != own_namespace {
                    return Err(ReconcilerError::AccessDenied(format!(
                        "cross-namespace reference to {}/{}/{} is not allowed",
                        source.kind, ns, source.name
                    )));
                }
            }
        }
    }

    let mut names = HashSet::new();
    for output in &generator.spec.output_artifacts {
        if !DNS1123_RE.is_match(&output.name) || output.name.len() > 63 {
            return Err(ReconcilerError::ValidationFailed(format!(
                "invalid output artifact name '{}': must be a DNS-1123 label",
                output.name
            )));
        }
        if !names.insert(output.name.as_str()) {
            return Err(ReconcilerError::ValidationFailed(format!(
                "duplicate output artifact name '{}'",
                output.name
            )));
        }
        for (field, reference) in [
            ("revision", output.revision.as_deref()),
            ("originRevision", output.origin_revision.as_deref()),
        ] {
            if let Some(reference) = reference {
                let alias = parse_alias_ref(reference).ok_or_else(|| {
                    ReconcilerError::ValidationFailed(format!(
                        "invalid {field} reference '{reference}': expected '@<alias>'"
                    ))
                })?;
                if !aliases.contains(alias) {
                    return Err(ReconcilerError::ValidationFailed(format!(
                        "{field} alias '{alias}' not found in sources"
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Parse an `@<alias>` reference used by `revision` / `originRevision`
pub fn parse_alias_ref(reference: &str) -> Option<&str> {
    reference
        .strip_prefix('@')
        .filter(|alias| !alias.is_empty() && !alias.contains('/'))
}
