//! # Storage Integration Tests
//!
//! The digest/filename laws of the artifact writer and the storage facade
//! surface: archive, existence, integrity verification, removal, and
//! retention garbage collection.

use std::path::Path;
use std::time::Duration;

use artifact_generator_controller::builder::hash;
use artifact_generator_controller::crd::Artifact;
use artifact_generator_controller::storage::Storage;

fn stage(files: &[(&str, &str)]) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    for (rel, content) in files {
        let path = tmp.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    tmp
}

fn publish(storage: &Storage, name: &str, staged: &Path) -> Artifact {
    let digest = hash::hash_directory(staged).unwrap();
    let salted = hash::hash_directory_salted(staged, name).unwrap();
    let mut artifact = storage.new_artifact_for(
        "ExternalArtifact",
        "apps",
        name,
        &format!("{salted}.tar.gz"),
    );
    artifact.digest = format!("sha256:{digest}");
    artifact.revision = format!("latest@{}", artifact.digest);
    storage.mkdir_all(&artifact).unwrap();
    storage.archive(&artifact, staged).unwrap();
    artifact
}

#[test]
fn test_reproducible_digest_and_filename() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path(), "host").unwrap();

    let staged = stage(&[("config.yaml", "apiVersion: v1"), ("sub/x.yaml", "x")]);
    let first = publish(&storage, "bundle", staged.path());

    let staged_again = stage(&[("config.yaml", "apiVersion: v1"), ("sub/x.yaml", "x")]);
    let second = publish(&storage, "bundle", staged_again.path());

    assert_eq!(first.digest, second.digest);
    assert_eq!(first.path, second.path);
    assert!(first.revision.starts_with("latest@"));
}

#[test]
fn test_name_salting_splits_filenames_not_digests() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path(), "host").unwrap();

    let staged = stage(&[("config.yaml", "same bytes")]);
    let a = publish(&storage, "artifact-a", staged.path());
    let b = publish(&storage, "artifact-b", staged.path());

    assert_eq!(a.digest, b.digest);
    assert_ne!(a.filename(), b.filename());
}

#[test]
fn test_content_change_moves_digest_and_filename() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path(), "host").unwrap();

    let staged = stage(&[("config.yaml", "one")]);
    let first = publish(&storage, "bundle", staged.path());

    let changed = stage(&[("config.yaml", "two")]);
    let second = publish(&storage, "bundle", changed.path());

    assert_ne!(first.digest, second.digest);
    assert_ne!(first.filename(), second.filename());
}

#[test]
fn test_verify_artifact_detects_corruption() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path(), "host").unwrap();

    let staged = stage(&[("config.yaml", "good")]);
    let artifact = publish(&storage, "bundle", staged.path());
    assert!(storage.artifact_exist(&artifact));
    assert!(storage.verify_artifact(&artifact).unwrap());

    // Truncate the stored tarball
    std::fs::write(storage.artifact_path(&artifact), b"garbage").unwrap();
    assert!(!storage.verify_artifact(&artifact).unwrap());
}

#[test]
fn test_remove_and_remove_all() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path(), "host").unwrap();

    let staged = stage(&[("a", "a")]);
    let artifact = publish(&storage, "bundle", staged.path());

    storage.remove(&artifact).unwrap();
    assert!(!storage.artifact_exist(&artifact));
    // absence tolerated
    storage.remove(&artifact).unwrap();

    let artifact = publish(&storage, "bundle", staged.path());
    storage.remove_all(&artifact).unwrap();
    assert!(!storage.artifact_path(&artifact).parent().unwrap().exists());
}

#[test]
fn test_garbage_collect_prunes_old_versions_only() {
    let root = tempfile::tempdir().unwrap();
    let storage = Storage::new(root.path(), "host").unwrap();

    let staged = stage(&[("a", "current")]);
    let artifact = publish(&storage, "bundle", staged.path());

    // A superseded version sitting next to the current one
    let stale = storage
        .artifact_path(&artifact)
        .with_file_name("0000deadbeef.tar.gz");
    std::fs::write(&stale, b"old").unwrap();

    // Inside the grace window nothing is pruned
    let removed = storage
        .garbage_collect(&artifact, Duration::from_secs(3600))
        .unwrap();
    assert!(removed.is_empty());
    assert!(stale.exists());

    // With a zero grace window the stale file goes, the current one stays
    let removed = storage
        .garbage_collect(&artifact, Duration::from_secs(0))
        .unwrap();
    assert_eq!(removed, vec!["0000deadbeef.tar.gz".to_string()]);
    assert!(!stale.exists());
    assert!(storage.artifact_exist(&artifact));
}
