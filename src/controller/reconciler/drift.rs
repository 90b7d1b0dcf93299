//! # Drift Detection
//!
//! Compares the generator's desired state against the observed world.
//! Seven reasons are evaluated in order and the first match wins; no match
//! means the reconciliation can return early without touching storage or
//! the cluster.

use std::collections::BTreeSet;

use tracing::warn;

use crate::crd::{ArtifactGenerator, ExternalArtifact};
use crate::storage::Storage;

/// Why a generator needs to be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftReason {
    /// The Ready condition is currently False
    NotReady,
    /// The spec generation moved past the one Ready observed
    GenerationChanged,
    /// The observed-sources digest no longer matches status
    SourcesChanged,
    /// Inventory size differs from the declared output artifacts
    ArtifactsChanged,
    /// An inventory entry's tarball is gone from storage
    ArtifactMissing(String),
    /// An inventory entry's tarball failed the integrity check
    ArtifactCorrupted(String),
    /// The downstream ExternalArtifact set diverged from inventory
    ExternalArtifactsChanged,
}

impl std::fmt::Display for DriftReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftReason::NotReady => write!(f, "NotReady"),
            DriftReason::GenerationChanged => write!(f, "GenerationChanged"),
            DriftReason::SourcesChanged => write!(f, "SourcesChanged"),
            DriftReason::ArtifactsChanged => write!(f, "ArtifactsChanged"),
            DriftReason::ArtifactMissing(path) => write!(f, "ArtifactMissing({path})"),
            DriftReason::ArtifactCorrupted(path) => write!(f, "ArtifactCorrupted({path})"),
            DriftReason::ExternalArtifactsChanged => write!(f, "ExternalArtifactsChanged"),
        }
    }
}

/// Evaluate the drift reasons in order against the generator's status,
/// the freshly computed observed-sources digest, the artifact store, and
/// the downstream objects currently selected by the generator's UID label
pub fn detect_drift(
    generator: &ArtifactGenerator,
    observed_digest: &str,
    storage: &Storage,
    external_artifacts: &[ExternalArtifact],
) -> Option<DriftReason> {
    let status = generator.status.clone().unwrap_or_default();

    if status.is_not_ready() {
        return Some(DriftReason::NotReady);
    }

    if generator.metadata.generation != status.ready_generation() {
        return Some(DriftReason::GenerationChanged);
    }

    if status.observed_sources_digest.as_deref() != Some(observed_digest) {
        return Some(DriftReason::SourcesChanged);
    }

    if status.inventory.len() != generator.spec.output_artifacts.len() {
        return Some(DriftReason::ArtifactsChanged);
    }

    for entry in &status.inventory {
        let mut artifact = storage.new_artifact_for(
            "ExternalArtifact",
            &entry.namespace,
            &entry.name,
            &entry.filename,
        );
        artifact.digest = entry.digest.clone();

        if !storage.artifact_exist(&artifact) {
            return Some(DriftReason::ArtifactMissing(artifact.path));
        }
        match storage.verify_artifact(&artifact) {
            Ok(true) => {}
            Ok(false) => {
                // a corrupted file is removed so the rebuild starts clean
                if let Err(e) = storage.remove(&artifact) {
                    warn!("failed to remove corrupted artifact {}: {e}", artifact.path);
                }
                return Some(DriftReason::ArtifactCorrupted(artifact.path));
            }
            Err(e) => {
                warn!("integrity check failed for {}: {e}", artifact.path);
                return Some(DriftReason::ArtifactMissing(artifact.path));
            }
        }
    }

    let inventory_set: BTreeSet<(String, String)> = status
        .inventory
        .iter()
        .map(|entry| (entry.name.clone(), entry.digest.clone()))
        .collect();
    let downstream_set: BTreeSet<(String, String)> = external_artifacts
        .iter()
        .filter_map(|ea| {
            let name = ea.metadata.name.clone()?;
            let digest = ea
                .status
                .as_ref()
                .and_then(|s| s.artifact.as_ref())
                .map(|a| a.digest.clone())?;
            Some((name, digest))
        })
        .collect();

    if external_artifacts.len() != status.inventory.len() || inventory_set != downstream_set {
        return Some(DriftReason::ExternalArtifactsChanged);
    }

    None
}
