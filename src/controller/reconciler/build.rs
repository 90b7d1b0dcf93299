//! # Per-Output Build
//!
//! Stages one output artifact in the workspace, hashes the result, and
//! archives it into the store under the per-artifact lock.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::sources::ObservedSource;
use super::validation::parse_alias_ref;
use super::{Reconciler, ReconcilerError};
use crate::builder::{self, hash};
use crate::crd::{Artifact, ArtifactGenerator, OutputArtifact};

/// Build one output artifact: apply its copy operations into a staging
/// root, compute the content digest and the name-salted storage filename,
/// and archive the tree into the store
pub async fn build_output_artifact(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
    output: &OutputArtifact,
    source_dirs: &HashMap<String, PathBuf>,
    observed: &BTreeMap<String, ObservedSource>,
    workspace: &Path,
) -> Result<Artifact, ReconcilerError> {
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let staging = workspace.join("artifacts").join(&output.name);

    // File assembly is synchronous; run it off the reactor
    let operations = output.copy.clone();
    let sources = source_dirs.clone();
    let name = output.name.clone();
    let staging_for_task = staging.clone();
    let (digest, salted) = tokio::task::spawn_blocking(move || {
        builder::apply_copy_operations(&operations, &sources, &staging_for_task)?;
        let digest = hash::hash_directory(&staging_for_task)?;
        let salted = hash::hash_directory_salted(&staging_for_task, &name)?;
        Ok::<_, crate::builder::BuildError>((digest, salted))
    })
    .await
    .map_err(|e| ReconcilerError::ReconciliationFailed(format!("build task failed: {e}")))??;

    let mut artifact = ctx.storage.new_artifact_for(
        "ExternalArtifact",
        namespace,
        &output.name,
        &format!("{salted}.tar.gz"),
    );
    artifact.digest = format!("sha256:{digest}");
    artifact.revision = resolve_revision(output, observed, &artifact.digest);

    if let Some(origin) = resolve_origin_revision(output, observed) {
        artifact
            .metadata
            .get_or_insert_with(Default::default)
            .insert("originRevision".to_string(), origin);
    }

    // Exclusive per-artifact write; the guard releases on every exit path
    let _guard = ctx.storage.lock(&artifact).await;
    ctx.storage.mkdir_all(&artifact)?;
    if ctx.storage.artifact_exist(&artifact) {
        debug!(path = artifact.path.as_str(), "artifact already stored");
    } else {
        ctx.storage.archive(&artifact, &staging)?;
        info!(
            path = artifact.path.as_str(),
            revision = artifact.revision.as_str(),
            "archived artifact"
        );
    }

    Ok(artifact)
}

/// The output's revision: a pinned source revision copied verbatim, or
/// `latest@<digest>`
fn resolve_revision(
    output: &OutputArtifact,
    observed: &BTreeMap<String, ObservedSource>,
    digest: &str,
) -> String {
    output
        .revision
        .as_deref()
        .and_then(parse_alias_ref)
        .and_then(|alias| observed.get(alias))
        .map(|src| src.revision.clone())
        .unwrap_or_else(|| format!("latest@{digest}"))
}

/// The output's origin revision: the pinned source's own origin revision,
/// falling back to its revision
fn resolve_origin_revision(
    output: &OutputArtifact,
    observed: &BTreeMap<String, ObservedSource>,
) -> Option<String> {
    let alias = output.origin_revision.as_deref().and_then(parse_alias_ref)?;
    let src = observed.get(alias)?;
    Some(
        src.origin_revision
            .clone()
            .unwrap_or_else(|| src.revision.clone()),
    )
}
