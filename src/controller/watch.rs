//! # Watch and Dispatch
//!
//! Translates source revision changes into per-generator reconcile
//! requests. A cache index keyed by `<kind>/<namespace>/<name>` maps every
//! source object to the generators referencing it; a revision tracker
//! implements the change predicate (fire only when the object advertises
//! an artifact the index has not seen at that revision).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use kube::api::{Api, DynamicObject};
use kube::core::{ApiResource, GroupVersionKind};
use kube_runtime::controller::Controller;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tracing::debug;

use super::reconciler::Reconciler;
use crate::crd::{ArtifactGenerator, ExternalArtifact, SourceKind};

/// Index from source key to the generators referencing that source
#[derive(Debug, Default)]
pub struct SourceIndex {
    entries: RwLock<HashMap<String, HashSet<(String, String)>>>,
}

impl SourceIndex {
    /// Index key of a source object
    pub fn key(kind: &str, namespace: &str, name: &str) -> String {
        format!("{kind}/{namespace}/{name}")
    }

    /// Re-index a generator: drop its old entries, insert its current
    /// source references (empty namespaces default to the generator's own)
    pub fn update_generator(&self, generator: &ArtifactGenerator) {
        let Some(name) = generator.metadata.name.clone() else {
            return;
        };
        let namespace = generator
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let id = (namespace, name);

        let mut entries = self.entries.write().expect("source index poisoned");
        entries.retain(|_, generators| {
            generators.remove(&id);
            !generators.is_empty()
        });
        for source in &generator.spec.sources {
            let key = Self::key(
                source.kind.kind(),
                &generator.source_namespace(source),
                &source.name,
            );
            entries.entry(key).or_default().insert(id.clone());
        }
    }

    /// Drop every entry of a generator
    pub fn remove_generator(&self, namespace: &str, name: &str) {
        let id = (namespace.to_string(), name.to_string());
        let mut entries = self.entries.write().expect("source index poisoned");
        entries.retain(|_, generators| {
            generators.remove(&id);
            !generators.is_empty()
        });
    }

    /// Generators referencing the source behind `key`
    pub fn generators_for(&self, key: &str) -> Vec<(String, String)> {
        self.entries
            .read()
            .expect("source index poisoned")
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Last-seen artifact revision per source key.
///
/// The change predicate: an update fires only when the object has an
/// artifact and the previous observation either had none or advertised a
/// different revision.
#[derive(Debug, Default)]
pub struct RevisionTracker {
    seen: Mutex<HashMap<String, String>>,
}

impl RevisionTracker {
    /// Record the observed revision; `true` when it differs from the last
    /// observation
    pub fn changed(&self, key: &str, revision: Option<&str>) -> bool {
        let Some(revision) = revision else {
            // no artifact yet, nothing to dispatch
            return false;
        };
        let mut seen = self.seen.lock().expect("revision tracker poisoned");
        match seen.insert(key.to_string(), revision.to_string()) {
            Some(previous) => previous != revision,
            None => true,
        }
    }
}

/// Artifact revision advertised by a dynamic source object
fn dynamic_revision(obj: &DynamicObject) -> Option<&str> {
    obj.data
        .get("status")
        .and_then(|s| s.get("artifact"))
        .and_then(|a| a.get("revision"))
        .and_then(|r| r.as_str())
}

/// Build the controller: the generator watch plus one watch per source
/// kind, each dispatching through the index
pub fn build_controller(
    ctx: &Arc<Reconciler>,
    generators: Api<ArtifactGenerator>,
) -> Controller<ArtifactGenerator> {
    let mut controller = Controller::new(generators, watcher::Config::default());

    for kind in [
        SourceKind::GitRepository,
        SourceKind::OciRepository,
        SourceKind::Bucket,
        SourceKind::HelmChart,
    ] {
        let gvk = GroupVersionKind {
            group: kind.group().to_string(),
            version: kind.version().to_string(),
            kind: kind.kind().to_string(),
        };
        let ar = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(ctx.client.clone(), &ar);
        let mapper_ctx = Arc::clone(ctx);
        controller = controller.watches_with(
            api,
            ar,
            watcher::Config::default(),
            move |obj: DynamicObject| {
                dispatch(
                    &mapper_ctx,
                    kind.kind(),
                    obj.metadata.namespace.as_deref(),
                    obj.metadata.name.as_deref(),
                    dynamic_revision(&obj),
                )
            },
        );
    }

    // ExternalArtifacts are both a source kind and this controller's own
    // output; the revision predicate keeps self-induced updates quiet
    let api: Api<ExternalArtifact> = Api::all(ctx.client.clone());
    let mapper_ctx = Arc::clone(ctx);
    controller = controller.watches(
        api,
        watcher::Config::default(),
        move |obj: ExternalArtifact| {
            let revision = obj
                .status
                .as_ref()
                .and_then(|s| s.artifact.as_ref())
                .map(|a| a.revision.clone());
            dispatch(
                &mapper_ctx,
                "ExternalArtifact",
                obj.metadata.namespace.as_deref(),
                obj.metadata.name.as_deref(),
                revision.as_deref(),
            )
        },
    );

    controller
}

fn dispatch(
    ctx: &Reconciler,
    kind: &str,
    namespace: Option<&str>,
    name: Option<&str>,
    revision: Option<&str>,
) -> Vec<ObjectRef<ArtifactGenerator>> {
    let (Some(namespace), Some(name)) = (namespace, name) else {
        return Vec::new();
    };
    let key = SourceIndex::key(kind, namespace, name);
    if !ctx.revision_tracker.changed(&key, revision) {
        return Vec::new();
    }
    let generators = ctx.source_index.generators_for(&key);
    if !generators.is_empty() {
        debug!(
            source = key.as_str(),
            count = generators.len(),
            "source revision change, dispatching"
        );
    }
    generators
        .into_iter()
        .map(|(gen_ns, gen_name)| ObjectRef::new(&gen_name).within(&gen_ns))
        .collect()
}
