//! # ExternalArtifact
//!
//! The downstream resource published for every output artifact. Other
//! controllers consume it exactly like any FluxCD source: by reading
//! `status.artifact`.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::crd::status::Condition;

/// ExternalArtifact Custom Resource Definition
///
/// Exposes an externally-produced, content-addressed artifact. The
/// generator controller owns instances it creates via the generator-UID
/// label; their sole observable content is the source reference back to
/// the generator and the artifact record in status.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ExternalArtifact",
    group = "source.extensions.fluxcd.io",
    version = "v1",
    namespaced,
    status = "ExternalArtifactStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Revision", "type":"string", "jsonPath":".status.artifact.revision"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExternalArtifactSpec {
    /// Reference to the object that produces this artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<ObjectRef>,
}

/// Namespaced reference to a Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Kind of the referent
    pub kind: String,
    /// Name of the referent
    pub name: String,
    /// Namespace of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Status of an ExternalArtifact resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalArtifactStatus {
    /// The last artifact published for this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A content-addressed artifact in the local store
///
/// `path` is relative to the storage root; `url` is the address downstream
/// consumers download the tarball from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Path of the tarball relative to the storage root
    pub path: String,
    /// Download URL of the tarball
    pub url: String,
    /// Content digest of the staged tree, `sha256:<hex>`
    pub digest: String,
    /// Human-readable revision, `latest@<digest>` unless pinned to a source
    pub revision: String,
    /// Free-form metadata; `originRevision` is set when the generator pins one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Artifact {
    /// Filename component of the artifact path
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
