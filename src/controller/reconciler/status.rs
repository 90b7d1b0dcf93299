//! # Status Management
//!
//! Condition summarization and status patching for ArtifactGenerator
//! resources. Patches only go out when something actually changed, so
//! steady-state reconciles do not generate watch events.

use kube::api::{Api, Patch, PatchParams};
use tracing::debug;

use super::{Reconciler, ReconcilerError};
use crate::constants::CONTROLLER_NAME;
use crate::crd::status::{
    Condition, CONDITION_READY, CONDITION_RECONCILING, CONDITION_STALLED, REASON_PROGRESSING,
    REASON_PROGRESSING_WITH_RETRY, REASON_RECONCILIATION_DISABLED, REASON_SUCCEEDED,
};
use crate::crd::{ArtifactGenerator, ArtifactGeneratorStatus};

/// Mark a reconciliation in flight: `Reconciling=True`, `Ready=Unknown`.
///
/// `Reconciling.reason` is promoted to `ProgressingWithRetry` when the
/// previous reconciliation left the object not ready, distinguishing
/// fresh work from retries.
pub fn mark_progressing(status: &mut ArtifactGeneratorStatus, generation: Option<i64>) {
    let reason = if status.is_not_ready() {
        REASON_PROGRESSING_WITH_RETRY
    } else {
        REASON_PROGRESSING
    };
    status.set_condition(Condition::new(
        CONDITION_RECONCILING,
        "True",
        reason,
        "reconciliation in progress",
        generation,
    ));
    status.set_condition(Condition::new(
        CONDITION_READY,
        "Unknown",
        REASON_PROGRESSING,
        "reconciliation in progress",
        generation,
    ));
    status.remove_condition(CONDITION_STALLED);
}

/// Mark success: `Ready=True`, `Reconciling` and `Stalled` cleared
pub fn mark_ready(status: &mut ArtifactGeneratorStatus, generation: Option<i64>, message: &str) {
    status.set_condition(Condition::new(
        CONDITION_READY,
        "True",
        REASON_SUCCEEDED,
        message,
        generation,
    ));
    status.remove_condition(CONDITION_RECONCILING);
    status.remove_condition(CONDITION_STALLED);
}

/// Mark a recoverable failure: `Ready=False` with the error's reason
pub fn mark_not_ready(
    status: &mut ArtifactGeneratorStatus,
    generation: Option<i64>,
    reason: &str,
    message: &str,
) {
    status.set_condition(Condition::new(
        CONDITION_READY,
        "False",
        reason,
        message,
        generation,
    ));
}

/// Mark a terminal failure: `Ready=False`, `Stalled=True`, `Reconciling`
/// cleared
pub fn mark_stalled(
    status: &mut ArtifactGeneratorStatus,
    generation: Option<i64>,
    reason: &str,
    message: &str,
) {
    status.set_condition(Condition::new(
        CONDITION_READY,
        "False",
        reason,
        message,
        generation,
    ));
    status.set_condition(Condition::new(
        CONDITION_STALLED,
        "True",
        reason,
        message,
        generation,
    ));
    status.remove_condition(CONDITION_RECONCILING);
}

/// Mark reconciliation paused by annotation: `Ready=True` with the
/// disabled reason
pub fn mark_disabled(status: &mut ArtifactGeneratorStatus, generation: Option<i64>) {
    status.set_condition(Condition::new(
        CONDITION_READY,
        "True",
        REASON_RECONCILIATION_DISABLED,
        "reconciliation is disabled by annotation",
        generation,
    ));
    status.remove_condition(CONDITION_RECONCILING);
    status.remove_condition(CONDITION_STALLED);
}

/// Echo the reconcile-request annotation onto the status
pub fn echo_reconcile_request(status: &mut ArtifactGeneratorStatus, generator: &ArtifactGenerator) {
    if let Some(requested_at) = generator.reconcile_request() {
        status.last_handled_reconcile_at = Some(requested_at.to_string());
    }
}

/// Patch the generator's status subresource, skipping no-op updates
pub async fn patch_status(
    ctx: &Reconciler,
    generator: &ArtifactGenerator,
    status: &ArtifactGeneratorStatus,
) -> Result<(), ReconcilerError> {
    let unchanged = generator
        .status
        .as_ref()
        .is_some_and(|current| statuses_equal(current, status));
    if unchanged {
        debug!("skipping status update - nothing changed");
        return Ok(());
    }

    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let name = generator.metadata.name.as_deref().unwrap_or("unknown");
    let api: Api<ArtifactGenerator> = Api::namespaced(ctx.client.clone(), namespace);

    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        name,
        &PatchParams::apply(CONTROLLER_NAME),
        &Patch::Merge(patch),
    )
    .await
    .map_err(|e| {
        ReconcilerError::ReconciliationFailed(format!(
            "failed to patch status of {namespace}/{name}: {e}"
        ))
    })?;
    Ok(())
}

/// Status equality ignoring condition transition timestamps
fn statuses_equal(a: &ArtifactGeneratorStatus, b: &ArtifactGeneratorStatus) -> bool {
    if a.observed_sources_digest != b.observed_sources_digest
        || a.inventory != b.inventory
        || a.last_handled_reconcile_at != b.last_handled_reconcile_at
        || a.conditions.len() != b.conditions.len()
    {
        return false;
    }
    a.conditions.iter().all(|ca| {
        b.conditions.iter().any(|cb| {
            ca.r#type == cb.r#type
                && ca.status == cb.status
                && ca.reason == cb.reason
                && ca.message == cb.message
                && ca.observed_generation == cb.observed_generation
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::status::REASON_BUILD_FAILED;

    #[test]
    fn test_progressing_promotes_to_retry_after_failure() {
        let mut status = ArtifactGeneratorStatus::default();
        mark_progressing(&mut status, Some(1));
        assert_eq!(
            status
                .condition(CONDITION_RECONCILING)
                .and_then(|c| c.reason.as_deref()),
            Some(REASON_PROGRESSING)
        );

        mark_not_ready(&mut status, Some(1), REASON_BUILD_FAILED, "boom");
        mark_progressing(&mut status, Some(1));
        assert_eq!(
            status
                .condition(CONDITION_RECONCILING)
                .and_then(|c| c.reason.as_deref()),
            Some(REASON_PROGRESSING_WITH_RETRY)
        );
    }

    #[test]
    fn test_ready_clears_reconciling_and_stalled() {
        let mut status = ArtifactGeneratorStatus::default();
        mark_stalled(&mut status, Some(1), "ValidationFailed", "dup alias");
        assert!(status.condition(CONDITION_STALLED).is_some());

        mark_ready(&mut status, Some(2), "built 2 artifacts");
        assert!(status.is_ready());
        assert!(status.condition(CONDITION_STALLED).is_none());
        assert!(status.condition(CONDITION_RECONCILING).is_none());
    }

    #[test]
    fn test_stalled_clears_reconciling() {
        let mut status = ArtifactGeneratorStatus::default();
        mark_progressing(&mut status, Some(1));
        mark_stalled(&mut status, Some(1), "ValidationFailed", "dup alias");
        assert!(status.condition(CONDITION_RECONCILING).is_none());
        assert!(status.is_not_ready());
    }
}
