//! # Source Observation and Fetching
//!
//! Reads the `status.artifact` of every referenced source object,
//! fingerprints the observed set, and downloads the source tarballs into
//! the reconciliation workspace.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use kube::api::{Api, DynamicObject};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Reconciler, ReconcilerError};
use crate::builder::symlink;
use crate::crd::{ArtifactGenerator, SourceReference};

/// The observed artifact of one referenced source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedSource {
    /// Content digest advertised by the source
    pub digest: String,
    /// Human-readable revision advertised by the source
    pub revision: String,
    /// Origin revision, when the source records one
    pub origin_revision: Option<String>,
    /// Download URL of the source tarball
    pub url: String,
}

/// Fetch the status of each referenced source object and collect its
/// artifact, keyed by the generator-local alias
pub async fn observe_sources(
    client: &Client,
    generator: &ArtifactGenerator,
) -> Result<BTreeMap<String, ObservedSource>, ReconcilerError> {
    let mut observed = BTreeMap::new();
    for source in &generator.spec.sources {
        let observed_source = observe_source(client, generator, source).await?;
        observed.insert(source.alias.clone(), observed_source);
    }
    Ok(observed)
}

async fn observe_source(
    client: &Client,
    generator: &ArtifactGenerator,
    source: &SourceReference,
) -> Result<ObservedSource, ReconcilerError> {
    let namespace = generator.source_namespace(source);
    let gvk = GroupVersionKind {
        group: source.kind.group().to_string(),
        version: source.kind.version().to_string(),
        kind: source.kind.kind().to_string(),
    };
    let ar = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &namespace, &ar);

    let object = api.get(&source.name).await.map_err(|e| match &e {
        kube::Error::Api(ae) if ae.code == 404 => ReconcilerError::SourceFetchFailed(format!(
            "source {}/{}/{} not found",
            source.kind, namespace, source.name
        )),
        kube::Error::Api(ae) if ae.code == 403 => ReconcilerError::AccessDenied(format!(
            "cannot get source {}/{}/{}: {}",
            source.kind, namespace, source.name, ae.message
        )),
        _ => ReconcilerError::SourceFetchFailed(format!(
            "failed to get source {}/{}/{}: {e}",
            source.kind, namespace, source.name
        )),
    })?;

    let artifact = object
        .data
        .get("status")
        .and_then(|s| s.get("artifact"))
        .ok_or_else(|| {
            ReconcilerError::SourceFetchFailed(format!(
                "source '{}' ({}/{}/{}) is not ready: no artifact advertised",
                source.alias, source.kind, namespace, source.name
            ))
        })?;

    let field = |key: &str| -> Result<String, ReconcilerError> {
        artifact
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ReconcilerError::SourceFetchFailed(format!(
                    "source '{}' artifact has no {key}",
                    source.alias
                ))
            })
    };

    Ok(ObservedSource {
        digest: field("digest")?,
        revision: field("revision")?,
        origin_revision: artifact
            .get("metadata")
            .and_then(|m| m.get("originRevision"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        url: field("url")?,
    })
}

/// Fingerprint of the observed source set.
///
/// `sha256:` over the sorted `"<alias>=[digest=<d>,revision=<r>,url=<u>]"`
/// entries joined with `|`; stable under any iteration order.
pub fn observed_sources_digest(observed: &BTreeMap<String, ObservedSource>) -> String {
    let mut entries: Vec<String> = observed
        .iter()
        .map(|(alias, src)| {
            format!(
                "{alias}=[digest={},revision={},url={}]",
                src.digest, src.revision, src.url
            )
        })
        .collect();
    entries.sort();
    let joined = entries.join("|");
    format!("sha256:{:x}", Sha256::digest(joined.as_bytes()))
}

/// Download every observed source into `<workspace>/sources/<alias>/` and
/// materialize its in-tree symlinks
pub async fn fetch_sources(
    ctx: &Reconciler,
    observed: &BTreeMap<String, ObservedSource>,
    workspace: &Path,
) -> Result<HashMap<String, PathBuf>, ReconcilerError> {
    let mut dirs = HashMap::new();
    for (alias, source) in observed {
        let dir = workspace.join("sources").join(alias);
        debug!(alias, url = source.url.as_str(), "fetching source artifact");
        ctx.fetcher.fetch(&source.url, &source.digest, &dir).await?;
        symlink::materialize_symlinks(&dir).map_err(|e| {
            ReconcilerError::SourceFetchFailed(format!(
                "failed to resolve symlinks in source '{alias}': {e}"
            ))
        })?;
        dirs.insert(alias.clone(), dir);
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(digest: &str, revision: &str, url: &str) -> ObservedSource {
        ObservedSource {
            digest: digest.to_string(),
            revision: revision.to_string(),
            origin_revision: None,
            url: url.to_string(),
        }
    }

    #[test]
    fn test_digest_is_order_independent() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_string(), observed("d1", "r1", "u1"));
        forward.insert("b".to_string(), observed("d2", "r2", "u2"));

        let mut reverse = BTreeMap::new();
        reverse.insert("b".to_string(), observed("d2", "r2", "u2"));
        reverse.insert("a".to_string(), observed("d1", "r1", "u1"));

        assert_eq!(
            observed_sources_digest(&forward),
            observed_sources_digest(&reverse)
        );
    }

    #[test]
    fn test_digest_changes_with_any_field() {
        let mut base = BTreeMap::new();
        base.insert("a".to_string(), observed("d1", "r1", "u1"));
        let digest = observed_sources_digest(&base);

        for changed in [
            observed("d2", "r1", "u1"),
            observed("d1", "r2", "u1"),
            observed("d1", "r1", "u2"),
        ] {
            let mut map = BTreeMap::new();
            map.insert("a".to_string(), changed);
            assert_ne!(digest, observed_sources_digest(&map));
        }
    }

    #[test]
    fn test_digest_has_sha256_prefix() {
        let digest = observed_sources_digest(&BTreeMap::new());
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
    }
}
