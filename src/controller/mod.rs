//! # Controller
//!
//! Reconciliation logic and watch wiring for ArtifactGenerator resources.

pub mod reconciler;
pub mod watch;
