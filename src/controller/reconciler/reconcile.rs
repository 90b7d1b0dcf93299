//! # Reconcile
//!
//! The level-triggered state machine for ArtifactGenerator resources.
//! Every significant transition re-reads the live object and writes back
//! through the API server; retries are new invocations whose inputs are
//! the current cluster state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use kube_runtime::controller::Action;
use kube_runtime::events::{Event, EventType};
use kube::Resource;
use tracing::{debug, info, warn};

use super::{build, drift, finalize, publish, sources, status, validation};
use super::{Reconciler, ReconcilerError};
use crate::crd::ArtifactGenerator;
use crate::observability::metrics;

/// Reconcile one ArtifactGenerator
pub async fn reconcile(
    generator: Arc<ArtifactGenerator>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations_total();

    let name = generator.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let generation = generator.metadata.generation;
    info!(name, namespace, "reconciling ArtifactGenerator");

    let result = reconcile_inner(&generator, &ctx).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(_) => ctx.clear_errors(&format!("{namespace}/{name}")),
        Err(e) => {
            metrics::increment_reconciliation_errors(e.reason());
            let mut current = generator.status.clone().unwrap_or_default();
            if e.is_terminal() {
                status::mark_stalled(&mut current, generation, e.reason(), &e.to_string());
            } else {
                status::mark_not_ready(&mut current, generation, e.reason(), &e.to_string());
            }
            status::echo_reconcile_request(&mut current, &generator);
            if let Err(patch_err) = status::patch_status(&ctx, &generator, &current).await {
                warn!(name, namespace, "failed to surface error on status: {patch_err}");
            }
        }
    }

    result
}

async fn reconcile_inner(
    generator: &Arc<ArtifactGenerator>,
    ctx: &Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = generator.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = generator.metadata.namespace.as_deref().unwrap_or("default");
    let generation = generator.metadata.generation;

    // Finalizing: purge downstream artifacts and release the finalizer
    if generator.metadata.deletion_timestamp.is_some() {
        ctx.source_index.remove_generator(namespace, name);
        if finalize::has_finalizer(generator) {
            finalize::finalize_generator(ctx, generator).await?;
        }
        return Ok(Action::await_change());
    }

    // Keep the source index in step with the spec
    ctx.source_index.update_generator(generator);

    // Initializing: first sight of the object
    if !finalize::has_finalizer(generator) {
        finalize::add_finalizer(ctx, generator).await?;
        let mut current = generator.status.clone().unwrap_or_default();
        if generator.reconciliation_disabled() {
            status::mark_disabled(&mut current, generation);
        } else {
            status::mark_progressing(&mut current, generation);
        }
        status::patch_status(ctx, generator, &current).await?;
        return Ok(Action::requeue(Duration::from_millis(1)));
    }

    // Disabled: annotation pauses the object until it changes again
    if generator.reconciliation_disabled() {
        warn!(name, namespace, "reconciliation is disabled by annotation");
        let event = Event {
            type_: EventType::Warning,
            reason: "ReconciliationDisabled".to_string(),
            note: Some("reconciliation is disabled by annotation".to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = ctx
            .recorder
            .publish(&event, &generator.object_ref(&()))
            .await
        {
            warn!(name, namespace, "failed to publish event: {e}");
        }
        return Ok(Action::await_change());
    }

    // Validation gate; failures are terminal until the spec changes
    validation::validate(generator, ctx.config.no_cross_namespace_refs)?;

    // Observe sources and fingerprint the set
    let observed = sources::observe_sources(&ctx.client, generator).await?;
    let observed_digest = sources::observed_sources_digest(&observed);

    // Drift detection
    let external_artifacts = publish::list_owned_external_artifacts(ctx, generator).await?;
    let drift_reason = drift::detect_drift(
        generator,
        &observed_digest,
        &ctx.storage,
        &external_artifacts,
    );

    let Some(drift_reason) = drift_reason else {
        debug!(name, namespace, "no drift detected, requeueing");
        metrics::increment_no_drift_total();
        // Still echo a pending reconcile request so callers see it handled
        let mut current = generator.status.clone().unwrap_or_default();
        status::echo_reconcile_request(&mut current, generator);
        status::patch_status(ctx, generator, &current).await?;
        return Ok(Action::requeue(jittered(generator.interval())));
    };
    info!(name, namespace, reason = %drift_reason, "drift detected, rebuilding");

    // Surface progress before the heavy lifting starts
    let mut current = generator.status.clone().unwrap_or_default();
    status::mark_progressing(&mut current, generation);
    status::echo_reconcile_request(&mut current, generator);
    status::patch_status(ctx, generator, &current).await?;

    // Per-reconciliation workspace, destroyed on every exit path when the
    // guard drops. Symlinked temp roots (macOS /tmp) are canonicalized so
    // escape checks compare like with like.
    let workspace_guard = tempfile::tempdir()
        .map_err(|e| ReconcilerError::ReconciliationFailed(format!("workspace: {e}")))?;
    let workspace = workspace_guard
        .path()
        .canonicalize()
        .map_err(|e| ReconcilerError::ReconciliationFailed(format!("workspace: {e}")))?;

    let source_dirs = sources::fetch_sources(ctx, &observed, &workspace).await?;
    metrics::increment_source_fetches_total();

    // Build and publish every output artifact in spec order
    let mut inventory = Vec::with_capacity(generator.spec.output_artifacts.len());
    for output in &generator.spec.output_artifacts {
        let artifact = build::build_output_artifact(
            ctx,
            generator,
            output,
            &source_dirs,
            &observed,
            &workspace,
        )
        .await?;
        metrics::increment_artifacts_built_total();
        let entry = publish::publish_external_artifact(ctx, generator, &output.name, &artifact)
            .await?;
        inventory.push(entry);
    }

    // Orphans: previous inventory members no longer declared by the spec.
    // New artifacts are already published, so downstream readers never see
    // a gap.
    let current_refs: HashSet<(String, String)> = inventory
        .iter()
        .map(|entry| (entry.namespace.clone(), entry.name.clone()))
        .collect();
    let previous_inventory = generator
        .status
        .as_ref()
        .map(|s| s.inventory.clone())
        .unwrap_or_default();
    for orphan in previous_inventory
        .iter()
        .filter(|entry| !current_refs.contains(&(entry.namespace.clone(), entry.name.clone())))
    {
        info!(
            name = orphan.name.as_str(),
            namespace = orphan.namespace.as_str(),
            "finalizing orphaned artifact"
        );
        finalize::finalize_entry(ctx, orphan).await;
    }

    // Retention GC for every current artifact
    for entry in &inventory {
        finalize::retention_gc(ctx, entry);
    }

    let mut current = generator.status.clone().unwrap_or_default();
    let message = format!("built {} artifact(s)", inventory.len());
    current.inventory = inventory;
    current.observed_sources_digest = Some(observed_digest);
    status::mark_ready(&mut current, generation, &message);
    status::echo_reconcile_request(&mut current, generator);
    status::patch_status(ctx, generator, &current).await?;

    info!(name, namespace, "✅ {message}");
    Ok(Action::requeue(jittered(generator.interval())))
}

/// Spread requeues of identically-configured generators over a tenth of
/// the interval
fn jittered(interval: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let window_ms = (interval.as_millis() as u64 / 10).max(1);
    interval + Duration::from_millis(nanos % window_ms)
}
