//! # Constants
//!
//! Compiled defaults and the label/annotation vocabulary shared across the
//! controller. Values can be overridden through environment variables, see
//! [`crate::config`].

/// Name of the controller, used as field manager and managed-by label value
pub const CONTROLLER_NAME: &str = "artifact-generator-controller";

/// API group of the ArtifactGenerator and ExternalArtifact CRDs
pub const API_GROUP: &str = "source.extensions.fluxcd.io";

/// Finalizer added to every ArtifactGenerator the controller has seen
pub const FINALIZER: &str = "finalizers.source.extensions.fluxcd.io";

/// Label carrying the owning generator's UID on downstream ExternalArtifacts
pub const GENERATOR_UID_LABEL: &str = "source.extensions.fluxcd.io/generator-uid";

/// Standard Kubernetes managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Annotation that pauses (`Disabled`) or resumes (`Enabled`) reconciliation
pub const RECONCILE_ANNOTATION: &str = "source.extensions.fluxcd.io/reconcile";

/// Value of [`RECONCILE_ANNOTATION`] that pauses reconciliation
pub const RECONCILE_DISABLED: &str = "Disabled";

/// Annotation requesting an immediate reconcile, echoed back on
/// `status.lastHandledReconcileAt`
pub const RECONCILE_REQUEST_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";

/// Ignore file consulted when archiving a staged artifact tree
pub const SOURCE_IGNORE_FILE: &str = ".sourceignore";

/// Default per-object reconcile interval when the spec does not set one
pub const DEFAULT_INTERVAL: &str = "10m";

/// Requeue delay when a referenced source is missing or not ready (seconds)
pub const DEFAULT_DEPENDENCY_REQUEUE_SECS: u64 = 30;

/// Grace window for storage garbage collection (seconds)
pub const DEFAULT_GC_GRACE_SECS: u64 = 300;

/// Download attempts per source before the reconciliation fails
pub const DEFAULT_FETCH_RETRIES: usize = 3;

/// HTTP timeout for a single artifact download (seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Default artifact storage root on the controller filesystem
pub const DEFAULT_STORAGE_ROOT: &str = "/data";

/// Default advertised host in artifact URLs
pub const DEFAULT_STORAGE_HOSTNAME: &str = "localhost:9090";

/// HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind before giving up (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 30;

/// Poll interval while waiting for the HTTP server to bind (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 100;
