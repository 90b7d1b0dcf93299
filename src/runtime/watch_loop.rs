//! # Watch Loop
//!
//! Runs the controller: a bounded pool of workers over a keyed work
//! queue, at most one concurrent reconciliation per generator. The queue
//! serializes duplicate requests for the same key.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use tracing::{debug, warn};

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::watch;
use crate::crd::ArtifactGenerator;
use crate::runtime::error_policy::error_policy;

/// Run the controller until its watch streams end
pub async fn run_watch_loop(
    generators: Api<ArtifactGenerator>,
    reconciler: Arc<Reconciler>,
) -> Result<()> {
    let controller = watch::build_controller(&reconciler, generators);

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => {
                    debug!(name = %object.name, namespace = ?object.namespace, "reconciled");
                }
                Err(e) => warn!("controller stream error: {e}"),
            }
        })
        .await;

    Ok(())
}
