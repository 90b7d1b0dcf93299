//! # Error Policy
//!
//! Maps reconciliation errors to requeue behavior. Terminal errors stall
//! the object until its spec changes; missing dependencies requeue on a
//! fixed interval; everything else backs off per resource on a Fibonacci
//! schedule so one failing generator cannot starve the worker pool.

use std::sync::Arc;
use std::time::Duration;

use kube_runtime::controller::Action;
use tracing::{error, info, warn};

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::ArtifactGenerator;

/// Decide the requeue action after a failed reconciliation
pub fn error_policy(
    generator: Arc<ArtifactGenerator>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = generator.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    error!(name, namespace, "reconciliation error: {error}");

    if error.is_terminal() {
        // Stalled objects are not re-queued; a spec change re-enters
        warn!(name, namespace, "terminal error, waiting for spec change");
        return Action::await_change();
    }

    if matches!(error, ReconcilerError::SourceFetchFailed(_)) {
        return Action::requeue(ctx.config.dependency_requeue);
    }

    let error_count = ctx.record_error(&format!("{namespace}/{name}"));
    let backoff = fibonacci_backoff(error_count);
    info!(
        name,
        namespace,
        error_count,
        "retrying with backoff of {}s",
        backoff.as_secs()
    );
    Action::requeue(backoff)
}

/// Progressive backoff on the Fibonacci sequence, in minutes, capped at
/// ten: 1m -> 1m -> 2m -> 3m -> 5m -> 8m -> 10m
pub fn fibonacci_backoff(error_count: u32) -> Duration {
    let backoff_minutes = match error_count {
        0 | 1 | 2 => 1,
        3 => 2,
        4 => 3,
        5 => 5,
        6 => 8,
        _ => 10,
    };
    Duration::from_secs(backoff_minutes * 60)
}
