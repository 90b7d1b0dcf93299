//! # Status Types
//!
//! Status of the ArtifactGenerator resource plus condition bookkeeping
//! helpers used by the reconciler.

use serde::{Deserialize, Serialize};

/// Condition type for overall readiness
pub const CONDITION_READY: &str = "Ready";
/// Condition type set while a reconciliation is in flight
pub const CONDITION_RECONCILING: &str = "Reconciling";
/// Condition type marking a terminal validation failure
pub const CONDITION_STALLED: &str = "Stalled";

/// Reason: reconciliation finished successfully
pub const REASON_SUCCEEDED: &str = "Succeeded";
/// Reason: a fresh reconciliation is in progress
pub const REASON_PROGRESSING: &str = "Progressing";
/// Reason: a reconciliation is retrying after a failure
pub const REASON_PROGRESSING_WITH_RETRY: &str = "ProgressingWithRetry";
/// Reason: spec validation failed (terminal)
pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";
/// Reason: a cross-namespace reference was denied (terminal)
pub const REASON_ACCESS_DENIED: &str = "AccessDenied";
/// Reason: a source object is missing, not ready, or failed to download
pub const REASON_SOURCE_FETCH_FAILED: &str = "SourceFetchFailed";
/// Reason: a copy operation failed
pub const REASON_BUILD_FAILED: &str = "BuildFailed";
/// Reason: storage or cluster patching failed after a successful build
pub const REASON_RECONCILIATION_FAILED: &str = "ReconciliationFailed";
/// Reason: reconciliation is paused by annotation
pub const REASON_RECONCILIATION_DISABLED: &str = "ReconciliationDisabled";

/// Status of the ArtifactGenerator resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactGeneratorStatus {
    /// Stable fingerprint of the observed source set; the cheap proof that
    /// nothing upstream changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_sources_digest: Option<String>,
    /// Downstream artifacts published by the last successful reconciliation
    #[serde(default)]
    pub inventory: Vec<InventoryEntry>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Echo of the last handled reconcile-request annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_reconcile_at: Option<String>,
}

/// One successfully published downstream artifact
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    /// Namespace of the ExternalArtifact
    pub namespace: String,
    /// Name of the ExternalArtifact
    pub name: String,
    /// Content digest of the published artifact
    pub digest: String,
    /// Storage filename of the published tarball
    pub filename: String,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Generation the condition was observed at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Last transition time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Build a condition stamped with the current time
    pub fn new(
        r#type: &str,
        status: &str,
        reason: &str,
        message: &str,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: r#type.to_string(),
            status: status.to_string(),
            observed_generation,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }
}

impl ArtifactGeneratorStatus {
    /// Look up a condition by type
    pub fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    /// Whether the Ready condition currently holds
    pub fn is_ready(&self) -> bool {
        self.condition(CONDITION_READY)
            .is_some_and(|c| c.status == "True")
    }

    /// Whether the Ready condition is explicitly False
    pub fn is_not_ready(&self) -> bool {
        self.condition(CONDITION_READY)
            .is_some_and(|c| c.status == "False")
    }

    /// Generation the Ready condition was last observed at
    pub fn ready_generation(&self) -> Option<i64> {
        self.condition(CONDITION_READY)
            .and_then(|c| c.observed_generation)
    }

    /// Replace a condition in place, keeping the previous transition time
    /// when the status value did not flip
    pub fn set_condition(&mut self, condition: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            let transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                condition.last_transition_time.clone()
            };
            *existing = Condition {
                last_transition_time: transition_time,
                ..condition
            };
        } else {
            self.conditions.push(condition);
        }
    }

    /// Drop a condition by type
    pub fn remove_condition(&mut self, r#type: &str) {
        self.conditions.retain(|c| c.r#type != r#type);
    }
}
