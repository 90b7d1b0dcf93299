//! # Downstream Publishing
//!
//! Creates or updates the ExternalArtifact object for each built output
//! via server-side apply with the controller as field owner, then applies
//! the artifact record on its status subresource.

use kube::api::{Api, ListParams, Patch, PatchParams};
use tracing::debug;

use super::{Reconciler, ReconcilerError};
use crate::constants::{CONTROLLER_NAME, GENERATOR_UID_LABEL, MANAGED_BY_LABEL};
use crate::crd::status::{CONDITION_READY, REASON_SUCCEEDED};
use crate::crd::{Artifact, ArtifactGenerator, ExternalArtifact, InventoryEntry};

/// Apply the ExternalArtifact for one output artifact and return its
/// inventory reference
pub async fn publish_external_artifact(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
    output_name: &str,
    artifact: &Artifact,
) -> Result<InventoryEntry, ReconcilerError> {
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let generator_name = generator.metadata.name.as_deref().unwrap_or("unknown");
    let uid = generator.metadata.uid.as_deref().unwrap_or_default();
    let api: Api<ExternalArtifact> = Api::namespaced(ctx.client.clone(), namespace);

    let apply = serde_json::json!({
        "apiVersion": "source.extensions.fluxcd.io/v1",
        "kind": "ExternalArtifact",
        "metadata": {
            "name": output_name,
            "namespace": namespace,
            "labels": {
                MANAGED_BY_LABEL: CONTROLLER_NAME,
                GENERATOR_UID_LABEL: uid,
            },
        },
        "spec": {
            "sourceRef": {
                "kind": "ArtifactGenerator",
                "name": generator_name,
                "namespace": namespace,
            },
        },
    });

    let params = PatchParams::apply(CONTROLLER_NAME).force();
    api.patch(output_name, &params, &Patch::Apply(&apply))
        .await
        .map_err(|e| {
            ReconcilerError::ReconciliationFailed(format!(
                "failed to apply ExternalArtifact {namespace}/{output_name}: {e}"
            ))
        })?;

    let status_apply = serde_json::json!({
        "apiVersion": "source.extensions.fluxcd.io/v1",
        "kind": "ExternalArtifact",
        "status": {
            "artifact": artifact,
            "conditions": [{
                "type": CONDITION_READY,
                "status": "True",
                "reason": REASON_SUCCEEDED,
                "message": format!("artifact available at revision {}", artifact.revision),
                "lastTransitionTime": chrono::Utc::now().to_rfc3339(),
            }],
        },
    });

    api.patch_status(output_name, &params, &Patch::Apply(&status_apply))
        .await
        .map_err(|e| {
            ReconcilerError::ReconciliationFailed(format!(
                "failed to apply status of ExternalArtifact {namespace}/{output_name}: {e}"
            ))
        })?;

    debug!(
        name = output_name,
        namespace,
        digest = artifact.digest.as_str(),
        "published ExternalArtifact"
    );

    Ok(InventoryEntry {
        namespace: namespace.to_string(),
        name: output_name.to_string(),
        digest: artifact.digest.clone(),
        filename: artifact.filename().to_string(),
    })
}

/// List the ExternalArtifacts currently carrying this generator's UID label
pub async fn list_owned_external_artifacts(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
) -> Result<Vec<ExternalArtifact>, ReconcilerError> {
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let uid = generator.metadata.uid.as_deref().unwrap_or_default();
    let api: Api<ExternalArtifact> = Api::namespaced(ctx.client.clone(), namespace);

    let params = ListParams::default().labels(&format!("{GENERATOR_UID_LABEL}={uid}"));
    let list = api.list(&params).await.map_err(|e| {
        ReconcilerError::ReconciliationFailed(format!(
            "failed to list ExternalArtifacts in {namespace}: {e}"
        ))
    })?;
    Ok(list.items)
}
