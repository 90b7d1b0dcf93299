//! # Finalizer and Garbage Collection
//!
//! Finalizer lifecycle on the generator, purge of downstream artifacts on
//! deletion or orphaning, and retention GC of superseded artifact
//! versions in storage.

use kube::api::{Api, Patch, PatchParams};
use tracing::{info, warn};

use super::{Reconciler, ReconcilerError};
use crate::constants::{CONTROLLER_NAME, FINALIZER};
use crate::crd::{ArtifactGenerator, ExternalArtifact, InventoryEntry};

/// Whether the generator carries the controller finalizer
pub fn has_finalizer(generator: &ArtifactGenerator) -> bool {
    generator
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER))
}

/// Add the controller finalizer to the generator
pub async fn add_finalizer(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
) -> Result<(), ReconcilerError> {
    let mut finalizers = generator.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());
    patch_finalizers(ctx, generator, finalizers).await
}

/// Remove the controller finalizer, releasing the generator for deletion
pub async fn remove_finalizer(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
) -> Result<(), ReconcilerError> {
    let finalizers: Vec<String> = generator
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != FINALIZER)
        .collect();
    patch_finalizers(ctx, generator, finalizers).await
}

async fn patch_finalizers(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
    finalizers: Vec<String>,
) -> Result<(), ReconcilerError> {
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let name = generator.metadata.name.as_deref().unwrap_or("unknown");
    let api: Api<ArtifactGenerator> = Api::namespaced(ctx.client.clone(), namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        name,
        &PatchParams::apply(CONTROLLER_NAME),
        &Patch::Merge(patch),
    )
    .await
    .map_err(|e| {
        ReconcilerError::ReconciliationFailed(format!(
            "failed to patch finalizers of {namespace}/{name}: {e}"
        ))
    })?;
    Ok(())
}

/// Purge one downstream reference: its storage files and its cluster
/// object.
///
/// Errors are logged but never block the caller; storage GC eventually
/// catches stragglers.
pub async fn finalize_entry(ctx: &Reconciler, entry: &InventoryEntry) {
    let artifact = ctx.storage.new_artifact_for(
        "ExternalArtifact",
        &entry.namespace,
        &entry.name,
        &entry.filename,
    );
    match ctx.storage.remove_all(&artifact) {
        Ok(dir) => info!("removed storage directory {dir}"),
        Err(e) => warn!(
            "failed to remove storage for {}/{}: {e}",
            entry.namespace, entry.name
        ),
    }

    let api: Api<ExternalArtifact> = Api::namespaced(ctx.client.clone(), &entry.namespace);
    match api.delete(&entry.name, &Default::default()).await {
        Ok(_) => info!(
            "deleted ExternalArtifact {}/{}",
            entry.namespace, entry.name
        ),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {}
        Err(e) => warn!(
            "failed to delete ExternalArtifact {}/{}: {e}",
            entry.namespace, entry.name
        ),
    }
}

/// Delete every inventory member from storage and cluster, then release
/// the finalizer
pub async fn finalize_generator(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
) -> Result<(), ReconcilerError> {
    let inventory = generator
        .status
        .as_ref()
        .map(|s| s.inventory.clone())
        .unwrap_or_default();

    info!(
        "finalizing {}/{}: purging {} downstream artifact(s)",
        generator.metadata.namespace.as_deref().unwrap_or("default"),
        generator.metadata.name.as_deref().unwrap_or("unknown"),
        inventory.len()
    );
    for entry in &inventory {
        finalize_entry(ctx, entry).await;
    }

    remove_finalizer(ctx, generator).await
}

/// Drop superseded versions of a current artifact older than the grace
/// window
pub fn retention_gc(ctx: &Reconciler, entry: &InventoryEntry) {
    let artifact = ctx.storage.new_artifact_for(
        "ExternalArtifact",
        &entry.namespace,
        &entry.name,
        &entry.filename,
    );
    match ctx.storage.garbage_collect(&artifact, ctx.config.gc_grace) {
        Ok(removed) if !removed.is_empty() => {
            info!(
                "garbage collected {} superseded version(s) of {}/{}",
                removed.len(),
                entry.namespace,
                entry.name
            );
        }
        Ok(_) => {}
        Err(e) => warn!(
            "garbage collection failed for {}/{}: {e}",
            entry.namespace, entry.name
        ),
    }
}
