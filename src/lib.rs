//! # Artifact Generator Controller
//!
//! A Kubernetes controller that composes and decomposes content-addressed
//! artifacts from upstream FluxCD artifact sources.
//!
//! ## Overview
//!
//! The controller watches ArtifactGenerator resources and, for each:
//!
//! 1. **Observes sources** - Reads the `status.artifact` of the referenced
//!    GitRepository, OCIRepository, Bucket, HelmChart, or ExternalArtifact
//!    objects
//! 2. **Detects drift** - Compares the observed source set, the inventory,
//!    the artifact store, and the downstream objects against the spec
//! 3. **Fetches sources** - Downloads, digest-verifies, and unpacks each
//!    source tarball into a per-reconciliation workspace
//! 4. **Builds artifacts** - Applies the `cp`-like copy operations with
//!    `Overwrite`/`Merge`/`Extract` strategies into a staging root
//! 5. **Publishes** - Archives each staged tree as a content-addressed
//!    tarball and exposes it as an ExternalArtifact
//! 6. **Garbage collects** - Finalizes orphaned outputs and prunes
//!    superseded artifact versions
//!
//! ## Features
//!
//! - **Deterministic builds**: the same sources and spec always produce
//!   the same digest and storage filename
//! - **Multi-namespace**: watches ArtifactGenerator resources across all
//!   namespaces, with an optional same-namespace lockdown
//! - **Prometheus metrics**: exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

pub mod builder;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod fetch;
pub mod observability;
pub mod runtime;
pub mod storage;

pub use crd::{ArtifactGenerator, ArtifactGeneratorSpec, ExternalArtifact};
