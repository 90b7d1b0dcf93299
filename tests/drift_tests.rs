//! # Drift Detection Tests
//!
//! The seven drift reasons, their evaluation order, and the no-drift
//! early-exit condition, exercised against a real local store.

use artifact_generator_controller::builder::hash;
use artifact_generator_controller::controller::reconciler::drift::{detect_drift, DriftReason};
use artifact_generator_controller::crd::status::{
    Condition, CONDITION_READY, REASON_BUILD_FAILED, REASON_SUCCEEDED,
};
use artifact_generator_controller::crd::{
    Artifact, ArtifactGenerator, ArtifactGeneratorSpec, ArtifactGeneratorStatus, CopyOperation,
    ExternalArtifact, ExternalArtifactSpec, InventoryEntry, OutputArtifact, SourceKind,
    SourceReference,
};
use artifact_generator_controller::storage::Storage;

const DIGEST: &str = "sha256:d1";

fn generator(outputs: usize) -> ArtifactGenerator {
    let output_artifacts = (0..outputs)
        .map(|i| OutputArtifact {
            name: format!("bundle-{i}"),
            revision: None,
            origin_revision: None,
            copy: vec![CopyOperation {
                from: "@src/**".to_string(),
                to: "@artifact/".to_string(),
                exclude: None,
                strategy: Default::default(),
            }],
        })
        .collect();
    let mut generator = ArtifactGenerator::new(
        "gen",
        ArtifactGeneratorSpec {
            sources: vec![SourceReference {
                alias: "src".to_string(),
                kind: SourceKind::GitRepository,
                name: "repo".to_string(),
                namespace: None,
            }],
            output_artifacts,
            interval: "10m".to_string(),
        },
    );
    generator.metadata.namespace = Some("apps".to_string());
    generator.metadata.generation = Some(1);
    generator
}

fn ready_status(observed_digest: &str, inventory: Vec<InventoryEntry>) -> ArtifactGeneratorStatus {
    let mut status = ArtifactGeneratorStatus {
        observed_sources_digest: Some(observed_digest.to_string()),
        inventory,
        ..Default::default()
    };
    status.set_condition(Condition::new(
        CONDITION_READY,
        "True",
        REASON_SUCCEEDED,
        "ok",
        Some(1),
    ));
    status
}

fn downstream(name: &str, digest: &str) -> ExternalArtifact {
    let mut ea = ExternalArtifact::new(name, ExternalArtifactSpec { source_ref: None });
    ea.metadata.namespace = Some("apps".to_string());
    ea.status = Some(artifact_generator_controller::crd::external_artifact::ExternalArtifactStatus {
        artifact: Some(Artifact {
            path: format!("ExternalArtifact/apps/{name}/x.tar.gz"),
            url: String::new(),
            digest: digest.to_string(),
            revision: format!("latest@{digest}"),
            metadata: None,
        }),
        conditions: vec![],
    });
    ea
}

fn test_storage() -> (tempfile::TempDir, Storage) {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Storage::new(tmp.path(), "host").unwrap();
    (tmp, storage)
}

/// Publish a real artifact for `name` and return its inventory entry
fn publish(storage: &Storage, name: &str) -> InventoryEntry {
    let staged = tempfile::tempdir().unwrap();
    std::fs::write(staged.path().join("app.yaml"), format!("name: {name}")).unwrap();
    let digest = hash::hash_directory(staged.path()).unwrap();
    let salted = hash::hash_directory_salted(staged.path(), name).unwrap();
    let mut artifact =
        storage.new_artifact_for("ExternalArtifact", "apps", name, &format!("{salted}.tar.gz"));
    artifact.digest = format!("sha256:{digest}");
    storage.mkdir_all(&artifact).unwrap();
    storage.archive(&artifact, staged.path()).unwrap();
    InventoryEntry {
        namespace: "apps".to_string(),
        name: name.to_string(),
        digest: artifact.digest.clone(),
        filename: artifact.filename().to_string(),
    }
}

#[test]
fn test_not_ready_wins_first() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(1);
    let mut status = ready_status(DIGEST, vec![]);
    status.set_condition(Condition::new(
        CONDITION_READY,
        "False",
        REASON_BUILD_FAILED,
        "boom",
        Some(1),
    ));
    gen.status = Some(status);

    assert_eq!(
        detect_drift(&gen, DIGEST, &storage, &[]),
        Some(DriftReason::NotReady)
    );
}

#[test]
fn test_generation_change_detected() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(0);
    gen.status = Some(ready_status(DIGEST, vec![]));
    gen.metadata.generation = Some(2);

    assert_eq!(
        detect_drift(&gen, DIGEST, &storage, &[]),
        Some(DriftReason::GenerationChanged)
    );
}

#[test]
fn test_source_bump_reports_sources_changed() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(0);
    gen.status = Some(ready_status("sha256:d1", vec![]));

    assert_eq!(
        detect_drift(&gen, "sha256:d2", &storage, &[]),
        Some(DriftReason::SourcesChanged)
    );
}

#[test]
fn test_inventory_size_mismatch() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(2);
    gen.status = Some(ready_status(DIGEST, vec![]));

    assert_eq!(
        detect_drift(&gen, DIGEST, &storage, &[]),
        Some(DriftReason::ArtifactsChanged)
    );
}

#[test]
fn test_missing_artifact_detected() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(1);
    let entry = InventoryEntry {
        namespace: "apps".to_string(),
        name: "bundle-0".to_string(),
        digest: "sha256:gone".to_string(),
        filename: "gone.tar.gz".to_string(),
    };
    gen.status = Some(ready_status(DIGEST, vec![entry]));

    assert!(matches!(
        detect_drift(&gen, DIGEST, &storage, &[]),
        Some(DriftReason::ArtifactMissing(_))
    ));
}

#[test]
fn test_corrupted_artifact_detected_and_removed() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(1);
    let entry = publish(&storage, "bundle-0");
    let downstream_objects = vec![downstream("bundle-0", &entry.digest)];

    // Corrupt the stored tarball in place
    let mut artifact =
        storage.new_artifact_for("ExternalArtifact", "apps", "bundle-0", &entry.filename);
    artifact.digest = entry.digest.clone();
    std::fs::write(storage.artifact_path(&artifact), b"junk").unwrap();
    gen.status = Some(ready_status(DIGEST, vec![entry]));

    assert!(matches!(
        detect_drift(&gen, DIGEST, &storage, &downstream_objects),
        Some(DriftReason::ArtifactCorrupted(_))
    ));
    // the corrupted file was removed so the rebuild starts clean
    assert!(!storage.artifact_exist(&artifact));
}

#[test]
fn test_downstream_divergence_detected() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(1);
    let entry = publish(&storage, "bundle-0");
    gen.status = Some(ready_status(DIGEST, vec![entry.clone()]));

    // no downstream objects at all
    assert_eq!(
        detect_drift(&gen, DIGEST, &storage, &[]),
        Some(DriftReason::ExternalArtifactsChanged)
    );

    // downstream object with a stale digest
    let stale = vec![downstream("bundle-0", "sha256:stale")];
    assert_eq!(
        detect_drift(&gen, DIGEST, &storage, &stale),
        Some(DriftReason::ExternalArtifactsChanged)
    );
}

#[test]
fn test_consistent_state_reports_no_drift() {
    let (_tmp, storage) = test_storage();
    let mut gen = generator(1);
    let entry = publish(&storage, "bundle-0");
    let downstream_objects = vec![downstream("bundle-0", &entry.digest)];
    gen.status = Some(ready_status(DIGEST, vec![entry]));

    assert_eq!(
        detect_drift(&gen, DIGEST, &storage, &downstream_objects),
        None
    );
}
