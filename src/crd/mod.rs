//! # Custom Resource Definitions
//!
//! CRD types for the Artifact Generator Controller.
//!
//! This module contains the ArtifactGenerator custom resource, whose spec
//! describes how to compose one or more output artifacts from upstream
//! FluxCD source artifacts, and the downstream ExternalArtifact resource
//! the controller publishes for each output.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub mod external_artifact;
pub mod status;

pub use external_artifact::{Artifact, ExternalArtifact, ExternalArtifactSpec, ObjectRef};
pub use status::{ArtifactGeneratorStatus, Condition, InventoryEntry};

/// ArtifactGenerator Custom Resource Definition
///
/// Declares a set of aliased upstream sources and a list of output
/// artifacts, each assembled from the sources by ordered copy operations.
///
/// # Example
///
/// ```yaml
/// apiVersion: source.extensions.fluxcd.io/v1
/// kind: ArtifactGenerator
/// metadata:
///   name: app-bundle
///   namespace: apps
/// spec:
///   sources:
///     - alias: repo
///       kind: GitRepository
///       name: app-repo
///   outputArtifacts:
///     - name: app-manifests
///       copy:
///         - from: "@repo/deploy/**"
///           to: "@artifact/"
///           exclude:
///             - "*.md"
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ArtifactGenerator",
    group = "source.extensions.fluxcd.io",
    version = "v1",
    namespaced,
    status = "ArtifactGeneratorStatus",
    shortname = "ag",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Status", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactGeneratorSpec {
    /// Upstream sources, each addressed by a generator-local alias.
    /// Aliases are unique per generator and restricted to `[a-z0-9_-]`
    /// with no leading or trailing hyphen.
    pub sources: Vec<SourceReference>,
    /// Output artifacts composed from the sources
    pub output_artifacts: Vec<OutputArtifact>,
    /// Interval at which the generator is re-evaluated for drift
    /// Format: Kubernetes duration string (e.g., "1m", "10m", "1h")
    #[serde(default = "default_interval")]
    pub interval: String,
}

/// Reference to an upstream source object exposing an artifact
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    /// Generator-local alias used by copy operations (`@<alias>/...`)
    pub alias: String,
    /// Kind of the referenced source object
    pub kind: SourceKind,
    /// Name of the referenced source object
    pub name: String,
    /// Namespace of the referenced source object.
    /// Defaults to the generator's own namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Source kinds a generator may reference.
///
/// All five expose the same minimal capability: a `status.artifact` with
/// `{url, digest, revision}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SourceKind {
    GitRepository,
    #[serde(rename = "OCIRepository")]
    OciRepository,
    Bucket,
    HelmChart,
    ExternalArtifact,
}

impl SourceKind {
    /// API group of the source kind
    pub fn group(&self) -> &'static str {
        match self {
            SourceKind::ExternalArtifact => crate::constants::API_GROUP,
            _ => "source.toolkit.fluxcd.io",
        }
    }

    /// Served API version of the source kind
    pub fn version(&self) -> &'static str {
        match self {
            SourceKind::OciRepository => "v1beta2",
            _ => "v1",
        }
    }

    /// Kind string as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            SourceKind::GitRepository => "GitRepository",
            SourceKind::OciRepository => "OCIRepository",
            SourceKind::Bucket => "Bucket",
            SourceKind::HelmChart => "HelmChart",
            SourceKind::ExternalArtifact => "ExternalArtifact",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// One output artifact composed by ordered copy operations
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    /// Name of the downstream ExternalArtifact (DNS-1123, unique per generator)
    pub name: String,
    /// Optional `@alias` whose revision is copied verbatim onto the output.
    /// When unset the output revision is `latest@<digest>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Optional `@alias` whose origin revision is recorded in the output's
    /// metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_revision: Option<String>,
    /// Copy operations applied in order into the staging root
    pub copy: Vec<CopyOperation>,
}

/// A single `cp`-like file operation from a source into the staging root
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CopyOperation {
    /// Source reference: `@<alias>/<pattern>`
    pub from: String,
    /// Destination reference: `@artifact/<path>`
    pub to: String,
    /// Glob patterns excluded from the copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
    /// How matched files are placed at the destination
    #[serde(default)]
    pub strategy: CopyStrategy,
}

/// Placement strategy for matched files
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum CopyStrategy {
    /// Replace whatever is already staged at the destination
    #[default]
    Overwrite,
    /// Deep-merge YAML documents with the staged destination file
    Merge,
    /// Unpack `.tar.gz` / `.tgz` matches into the destination directory
    Extract,
}

fn default_interval() -> String {
    crate::constants::DEFAULT_INTERVAL.to_string()
}

impl ArtifactGenerator {
    /// Interval at which the object wants to be re-evaluated
    pub fn interval(&self) -> std::time::Duration {
        crate::config::parse_kubernetes_duration(&self.spec.interval)
            .unwrap_or(std::time::Duration::from_secs(600))
    }

    /// Whether reconciliation is paused via the reconcile annotation
    pub fn reconciliation_disabled(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|ann| ann.get(crate::constants::RECONCILE_ANNOTATION))
            .is_some_and(|v| v == crate::constants::RECONCILE_DISABLED)
    }

    /// Value of the reconcile-request annotation, if present
    pub fn reconcile_request(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|ann| ann.get(crate::constants::RECONCILE_REQUEST_ANNOTATION))
            .map(String::as_str)
    }

    /// Namespace a source reference resolves to, defaulting to the generator's own
    pub fn source_namespace(&self, source: &SourceReference) -> String {
        source
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| self.metadata.namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }
}
