//! # Reconciler
//!
//! The level-triggered control loop for ArtifactGenerator resources:
//! validation, source observation, drift detection, artifact builds,
//! downstream publishing, inventory bookkeeping, and garbage collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::Client;
use kube_runtime::events::{Recorder, Reporter};
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::constants::CONTROLLER_NAME;
use crate::controller::watch::{RevisionTracker, SourceIndex};
use crate::fetch::{ArtifactFetcher, FetchError};
use crate::storage::{Storage, StorageError};

pub mod build;
pub mod drift;
pub mod finalize;
pub mod publish;
pub mod reconcile;
pub mod sources;
pub mod status;
pub mod validation;

pub use drift::DriftReason;
pub use reconcile::reconcile;
pub use sources::ObservedSource;

/// Reconciliation errors.
///
/// The variant names double as the `reason` strings surfaced on the
/// generator's conditions, which makes them part of the observable
/// contract.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Spec validation failed; terminal until the spec changes
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Cross-namespace reference denied under lockdown, or RBAC refused a read
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A source object is missing, not ready, or failed to download
    #[error("source fetch failed: {0}")]
    SourceFetchFailed(String),

    /// A copy operation failed
    #[error("build failed: {0}")]
    BuildFailed(#[from] crate::builder::BuildError),

    /// Storage or cluster patching failed after a successful build
    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),
}

impl ReconcilerError {
    /// Condition reason string for this error
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::ValidationFailed(_) => crate::crd::status::REASON_VALIDATION_FAILED,
            ReconcilerError::AccessDenied(_) => crate::crd::status::REASON_ACCESS_DENIED,
            ReconcilerError::SourceFetchFailed(_) => crate::crd::status::REASON_SOURCE_FETCH_FAILED,
            ReconcilerError::BuildFailed(_) => crate::crd::status::REASON_BUILD_FAILED,
            ReconcilerError::ReconciliationFailed(_) => {
                crate::crd::status::REASON_RECONCILIATION_FAILED
            }
        }
    }

    /// Terminal errors stall the object instead of re-queueing it
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconcilerError::ValidationFailed(_) | ReconcilerError::AccessDenied(_)
        )
    }
}

impl From<StorageError> for ReconcilerError {
    fn from(e: StorageError) -> Self {
        ReconcilerError::ReconciliationFailed(e.to_string())
    }
}

impl From<FetchError> for ReconcilerError {
    fn from(e: FetchError) -> Self {
        ReconcilerError::SourceFetchFailed(e.to_string())
    }
}

/// Shared reconciler context handed to every reconciliation
pub struct Reconciler {
    /// Kubernetes client
    pub client: Client,
    /// Local artifact store, shared across all generators
    pub storage: Arc<Storage>,
    /// Source tarball fetcher
    pub fetcher: ArtifactFetcher,
    /// Controller configuration
    pub config: ControllerConfig,
    /// Event recorder for warning events
    pub recorder: Recorder,
    /// Index from source key to referencing generators
    pub source_index: SourceIndex,
    /// Last-seen revision per source, the watch change predicate
    pub revision_tracker: RevisionTracker,
    /// Per-resource consecutive error counts driving retry backoff
    pub error_counts: Mutex<HashMap<String, u32>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Build the reconciler context
    pub fn new(client: Client, config: ControllerConfig) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(&config.storage_root, &config.storage_hostname)?);
        let fetcher = ArtifactFetcher::new(config.fetch_timeout, config.fetch_retries)?;
        let reporter = Reporter {
            controller: CONTROLLER_NAME.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Ok(Self {
            client,
            storage,
            fetcher,
            config,
            recorder,
            source_index: SourceIndex::default(),
            revision_tracker: RevisionTracker::default(),
            error_counts: Mutex::new(HashMap::new()),
        })
    }

    /// Record a reconciliation failure for a resource, returning the new
    /// consecutive error count
    pub fn record_error(&self, key: &str) -> u32 {
        let mut counts = self.error_counts.lock().expect("error count table poisoned");
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset the consecutive error count after a successful reconciliation
    pub fn clear_errors(&self, key: &str) {
        let mut counts = self.error_counts.lock().expect("error count table poisoned");
        counts.remove(key);
    }
}
