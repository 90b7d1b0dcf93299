//! # Builder Integration Tests
//!
//! End-to-end scenarios for the copy-operation engine: direct copies,
//! globs, overwrite ordering, recursive-prefix stripping, YAML merge,
//! tarball extraction, and the error surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use artifact_generator_controller::builder::{
    apply_copy_operations, pattern, tarball, BuildError,
};
use artifact_generator_controller::crd::{CopyOperation, CopyStrategy};

struct Fixture {
    _dirs: Vec<tempfile::TempDir>,
    sources: HashMap<String, PathBuf>,
    staging_dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            _dirs: Vec::new(),
            sources: HashMap::new(),
            staging_dir: tempfile::tempdir().unwrap(),
        }
    }

    fn source(mut self, alias: &str, files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        self.sources.insert(alias.to_string(), dir.path().to_path_buf());
        self._dirs.push(dir);
        self
    }

    fn staging(&self) -> &Path {
        self.staging_dir.path()
    }

    fn run(&self, ops: &[CopyOperation]) -> Result<(), BuildError> {
        apply_copy_operations(ops, &self.sources, self.staging())
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.staging().join(rel))
            .unwrap_or_else(|e| panic!("missing staged file {rel}: {e}"))
    }

    fn exists(&self, rel: &str) -> bool {
        self.staging().join(rel).exists()
    }
}

fn op(from: &str, to: &str) -> CopyOperation {
    CopyOperation {
        from: from.to_string(),
        to: to.to_string(),
        exclude: None,
        strategy: CopyStrategy::Overwrite,
    }
}

fn op_strategy(from: &str, to: &str, strategy: CopyStrategy) -> CopyOperation {
    CopyOperation {
        strategy,
        ..op(from, to)
    }
}

fn op_exclude(from: &str, to: &str, exclude: &[&str]) -> CopyOperation {
    CopyOperation {
        exclude: Some(exclude.iter().map(|s| s.to_string()).collect()),
        ..op(from, to)
    }
}

#[test]
fn test_single_file_copy_to_artifact_root() {
    let fx = Fixture::new().source(
        "src",
        &[("config.yaml", "apiVersion: v1\nkind: ConfigMap")],
    );
    fx.run(&[op("@src/config.yaml", "@artifact/")]).unwrap();
    assert_eq!(fx.read("config.yaml"), "apiVersion: v1\nkind: ConfigMap");
}

#[test]
fn test_single_file_copy_renamed_destination() {
    let fx = Fixture::new().source("src", &[("config.yaml", "data")]);
    fx.run(&[op("@src/config.yaml", "@artifact/renamed.yaml")])
        .unwrap();
    assert_eq!(fx.read("renamed.yaml"), "data");
    assert!(!fx.exists("config.yaml"));
}

#[test]
fn test_single_file_into_existing_staged_directory() {
    // Destination names an already-staged directory: the file lands inside
    // it under its own basename even without a trailing slash
    let fx = Fixture::new().source(
        "src",
        &[("manifests/a.yaml", "a"), ("extra.yaml", "e")],
    );
    fx.run(&[
        op("@src/manifests", "@artifact/"),
        op("@src/extra.yaml", "@artifact/manifests"),
    ])
    .unwrap();
    assert_eq!(fx.read("manifests/a.yaml"), "a");
    assert_eq!(fx.read("manifests/extra.yaml"), "e");
}

#[test]
fn test_glob_into_directory() {
    let fx = Fixture::new().source(
        "src",
        &[
            ("deployment.yaml", "apiVersion: v1"),
            ("service.yaml", "apiVersion: v1"),
            ("configmap.yaml", "apiVersion: v1"),
        ],
    );
    fx.run(&[op("@src/*.yaml", "@artifact/manifests/")]).unwrap();
    for name in ["deployment.yaml", "service.yaml", "configmap.yaml"] {
        assert_eq!(fx.read(&format!("manifests/{name}")), "apiVersion: v1");
    }
}

#[test]
fn test_overwrite_ordering_across_operations() {
    let fx = Fixture::new()
        .source(
            "s1",
            &[("config/app.yaml", "A1"), ("config/database.yaml", "D1")],
        )
        .source(
            "s2",
            &[("config/app.yaml", "A2"), ("config/network.yaml", "N2")],
        );
    fx.run(&[op("@s1/**", "@artifact/"), op("@s2/**", "@artifact/")])
        .unwrap();
    assert_eq!(fx.read("config/app.yaml"), "A2");
    assert_eq!(fx.read("config/database.yaml"), "D1");
    assert_eq!(fx.read("config/network.yaml"), "N2");
}

#[test]
fn test_recursive_pattern_strips_directory_prefix() {
    let fx = Fixture::new().source(
        "src",
        &[
            ("config/app.yaml", "app"),
            ("config/subdir/db.yaml", "db"),
        ],
    );
    fx.run(&[op("@src/config/**", "@artifact/dest/")]).unwrap();
    assert_eq!(fx.read("dest/app.yaml"), "app");
    assert_eq!(fx.read("dest/subdir/db.yaml"), "db");
    assert!(!fx.exists("dest/config"));
}

#[test]
fn test_bare_directory_source_copies_contents() {
    let fx = Fixture::new().source("a", &[("x.yaml", "x"), ("sub/y.yaml", "y")]);
    fx.run(&[op("@a/", "@artifact/")]).unwrap();
    assert_eq!(fx.read("x.yaml"), "x");
    assert_eq!(fx.read("sub/y.yaml"), "y");
    // contents, not an `a/` subdirectory
    assert!(!fx.exists("a"));
}

#[test]
fn test_named_directory_source_copies_as_subdirectory() {
    let fx = Fixture::new().source("a", &[("config/x.yaml", "x")]);
    fx.run(&[op("@a/config", "@artifact/etc/")]).unwrap();
    assert_eq!(fx.read("etc/config/x.yaml"), "x");
}

#[test]
fn test_yaml_merge_strategy() {
    let fx = Fixture::new()
        .source(
            "base",
            &[(
                "values.yaml",
                "replicas: 3\nports: [80, 443]\nlabels:\n  env: dev\n  keep: me\n",
            )],
        )
        .source(
            "overlay",
            &[(
                "values.yaml",
                "replicas: 5\nports: [8080]\nlabels:\n  env: prod\nenv: production\n",
            )],
        );
    fx.run(&[
        op("@base/values.yaml", "@artifact/"),
        op_strategy("@overlay/values.yaml", "@artifact/", CopyStrategy::Merge),
    ])
    .unwrap();

    let merged: serde_yaml::Value = serde_yaml::from_str(&fx.read("values.yaml")).unwrap();
    let expected: serde_yaml::Value = serde_yaml::from_str(
        "replicas: 5\nports: [8080]\nlabels:\n  env: prod\n  keep: me\nenv: production\n",
    )
    .unwrap();
    assert_eq!(merged, expected);
}

#[test]
fn test_merge_without_existing_destination_copies() {
    let fx = Fixture::new().source("src", &[("values.yaml", "a: 1\n")]);
    fx.run(&[op_strategy("@src/values.yaml", "@artifact/", CopyStrategy::Merge)])
        .unwrap();
    assert_eq!(fx.read("values.yaml"), "a: 1\n");
}

#[test]
fn test_extract_strategy_unpacks_tarballs_and_skips_others() {
    // Build two source tarballs plus a decoy text file
    let chart_a = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(chart_a.path().join("chart")).unwrap();
    std::fs::write(chart_a.path().join("chart/Chart.yaml"), "name: a").unwrap();
    let chart_b = tempfile::tempdir().unwrap();
    std::fs::write(chart_b.path().join("values.yaml"), "b: true").unwrap();

    let src = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(src.path().join("releases/v1")).unwrap();
    tarball::archive_dir(chart_a.path(), &src.path().join("releases/v1/a.tgz")).unwrap();
    tarball::archive_dir(chart_b.path(), &src.path().join("releases/v1/b.tar.gz")).unwrap();
    std::fs::write(src.path().join("releases/v1/README.txt"), "not a tarball").unwrap();

    let mut fx = Fixture::new();
    fx.sources.insert("src".to_string(), src.path().to_path_buf());

    fx.run(&[op_strategy(
        "@src/releases/**/*",
        "@artifact/",
        CopyStrategy::Extract,
    )])
    .unwrap();

    assert_eq!(fx.read("chart/Chart.yaml"), "name: a");
    assert_eq!(fx.read("values.yaml"), "b: true");
    // the non-tarball match is silently skipped
    assert!(!fx.exists("README.txt"));
}

#[test]
fn test_extract_single_non_tarball_fails() {
    let fx = Fixture::new().source("src", &[("README.txt", "text")]);
    let err = fx
        .run(&[op_strategy("@src/README.txt", "@artifact/", CopyStrategy::Extract)])
        .unwrap_err();
    assert!(err.to_string().contains("not a tar.gz archive"));
}

#[test]
fn test_extract_directory_fails() {
    let fx = Fixture::new().source("src", &[("dir/file", "x")]);
    let err = fx
        .run(&[op_strategy("@src/dir", "@artifact/", CopyStrategy::Extract)])
        .unwrap_err();
    assert!(err.to_string().contains("cannot extract directory"));
}

#[test]
fn test_excludes_filter_matches() {
    let fx = Fixture::new().source(
        "src",
        &[
            ("app.yaml", "a"),
            ("README.md", "r"),
            ("docs/guide.md", "g"),
        ],
    );
    fx.run(&[op_exclude("@src/**", "@artifact/", &["*.md"])])
        .unwrap();
    assert!(fx.exists("app.yaml"));
    assert!(!fx.exists("README.md"));
    assert!(!fx.exists("docs/guide.md"));
}

#[test]
fn test_excluded_single_file_is_silently_skipped() {
    let fx = Fixture::new().source("src", &[("secret.env", "k=v")]);
    fx.run(&[op_exclude("@src/secret.env", "@artifact/", &["*.env"])])
        .unwrap();
    assert!(!fx.exists("secret.env"));
}

#[test]
fn test_invalid_glob_is_a_syntax_error() {
    let fx = Fixture::new().source("src", &[("a.yaml", "a")]);
    let err = fx.run(&[op("@src/[", "@artifact/")]).unwrap_err();
    assert!(err.to_string().contains("syntax error in pattern"));
}

#[test]
fn test_glob_matching_nothing_fails() {
    let fx = Fixture::new().source("src", &[("a.yaml", "a")]);
    let err = fx.run(&[op("@src/*.json", "@artifact/")]).unwrap_err();
    assert!(err.to_string().contains("no files match pattern"));
}

#[test]
fn test_unknown_alias_fails() {
    let fx = Fixture::new().source("src", &[("a.yaml", "a")]);
    let err = fx.run(&[op("@missing/a.yaml", "@artifact/")]).unwrap_err();
    assert!(err.to_string().contains("source alias 'missing' not found"));
}

#[test]
fn test_all_matches_excluded_fails() {
    let fx = Fixture::new().source("src", &[("a.md", "a"), ("b.md", "b")]);
    let err = fx
        .run(&[op_exclude("@src/*.md", "@artifact/", &["*.md"])])
        .unwrap_err();
    assert!(err.to_string().contains("were excluded"));
}

#[test]
fn test_errors_are_wrapped_with_operation_context() {
    let fx = Fixture::new().source("src", &[("a.yaml", "a")]);
    let err = fx.run(&[op("@src/*.json", "@artifact/out/")]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("@src/*.json"));
    assert!(message.contains("@artifact/out/"));
}

#[test]
fn test_destination_traversal_is_refused() {
    let fx = Fixture::new().source("src", &[("a.yaml", "a")]);
    assert!(fx.run(&[op("@src/a.yaml", "@artifact/../escape")]).is_err());
}

#[test]
fn test_glob_directory_match_copies_recursively() {
    let fx = Fixture::new().source(
        "src",
        &[("config-prod/app.yaml", "p"), ("config-dev/app.yaml", "d")],
    );
    fx.run(&[op("@src/config-*", "@artifact/")]).unwrap();
    assert_eq!(fx.read("config-prod/app.yaml"), "p");
    assert_eq!(fx.read("config-dev/app.yaml"), "d");
}

#[test]
fn test_is_tarball_drives_extract_dispatch_only() {
    // Overwrite strategy must copy tarballs as files, not unpack them
    let inner = tempfile::tempdir().unwrap();
    std::fs::write(inner.path().join("x"), "x").unwrap();
    let src = tempfile::tempdir().unwrap();
    tarball::archive_dir(inner.path(), &src.path().join("bundle.tgz")).unwrap();

    let mut fx = Fixture::new();
    fx.sources.insert("src".to_string(), src.path().to_path_buf());
    fx.run(&[op("@src/bundle.tgz", "@artifact/")]).unwrap();

    assert!(fx.exists("bundle.tgz"));
    assert!(!fx.exists("x"));
    assert!(pattern::is_tarball("bundle.tgz"));
}
