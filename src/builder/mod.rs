//! # Artifact Builder
//!
//! The file-assembly engine. Interprets the ordered copy operations of an
//! output artifact over rooted source directories with `cp`-like
//! semantics, the `Overwrite`/`Merge`/`Extract` strategies, and exclude
//! patterns, depositing the result in a staging root ready for hashing
//! and archival.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod hash;
pub mod merge;
pub mod pattern;
pub mod rootfs;
pub mod symlink;
pub mod tarball;

use crate::crd::{CopyOperation, CopyStrategy};
use pattern::ExcludeSet;
use rootfs::{base_name, copy_tree, join_rel, RootDir};

/// Errors surfaced by the builder; message texts are part of the
/// observable contract surfaced on the generator's conditions
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid source reference '{0}': expected '@<alias>/<pattern>'")]
    InvalidSourceRef(String),

    #[error("invalid destination reference '{0}': expected '@artifact/<path>'")]
    InvalidArtifactRef(String),

    #[error("syntax error in pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    #[error("source alias '{0}' not found")]
    UnknownAlias(String),

    #[error("source path '{0}' not found")]
    SourceNotFound(String),

    #[error("no files match pattern '{0}'")]
    NoMatches(String),

    #[error("all files matching pattern '{0}' were excluded")]
    AllExcluded(String),

    #[error("path '{0}' escapes the root")]
    PathEscape(String),

    #[error("cannot extract directory '{0}'")]
    ExtractDirectory(String),

    #[error("source file '{0}' is not a tar.gz archive")]
    NotATarball(String),

    #[error("cannot unmarshal '{path}': {detail}")]
    Unmarshal { path: String, detail: String },

    #[error("failed to extract '{path}': {detail}")]
    ExtractFailed { path: String, detail: String },

    #[error("filename '{0}' contains a newline")]
    NewlineInFilename(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("copy operation '{from}' -> '{to}': {source}")]
    Operation {
        from: String,
        to: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Apply the ordered copy operations of one output artifact.
///
/// `sources` maps generator-local aliases to fetched source directories;
/// `staging` is created if needed. Later operations overwrite or merge
/// earlier results; any failure is wrapped with the triggering
/// `from`/`to` pair.
pub fn apply_copy_operations(
    operations: &[CopyOperation],
    sources: &HashMap<String, PathBuf>,
    staging: &Path,
) -> Result<(), BuildError> {
    let staging_root = RootDir::create(staging)?;
    for op in operations {
        apply_operation(op, sources, &staging_root).map_err(|e| BuildError::Operation {
            from: op.from.clone(),
            to: op.to.clone(),
            source: Box::new(e),
        })?;
    }
    Ok(())
}

fn apply_operation(
    op: &CopyOperation,
    sources: &HashMap<String, PathBuf>,
    staging: &RootDir,
) -> Result<(), BuildError> {
    let (alias, pat) = pattern::parse_source_ref(&op.from)?;
    let src_path = sources
        .get(alias)
        .ok_or_else(|| BuildError::UnknownAlias(alias.to_string()))?;
    let src_root = RootDir::open(src_path)?;

    let dest_raw = pattern::parse_artifact_ref(&op.to)?;
    let dest_is_dirlike = dest_raw.is_empty() || dest_raw.ends_with('/');
    let dest_rel = dest_raw.trim_end_matches('/');
    staging.resolve(dest_rel)?;

    let excludes = ExcludeSet::parse(op.exclude.as_deref())?;

    if pattern::is_glob(pat) {
        copy_glob(&src_root, pat, staging, dest_rel, op.strategy, &excludes)
    } else {
        copy_direct(
            &src_root,
            pat,
            staging,
            dest_rel,
            dest_is_dirlike,
            op.strategy,
            &excludes,
        )
    }
}

/// Direct (non-glob) reference: a single file or directory
fn copy_direct(
    src_root: &RootDir,
    pat: &str,
    staging: &RootDir,
    dest_rel: &str,
    dest_is_dirlike: bool,
    strategy: CopyStrategy,
    excludes: &ExcludeSet,
) -> Result<(), BuildError> {
    let meta = src_root
        .symlink_metadata(pat)?
        .ok_or_else(|| BuildError::SourceNotFound(pat.to_string()))?;
    if meta.file_type().is_symlink() {
        // unresolved (escaping) symlinks are never copied
        return Err(BuildError::SourceNotFound(pat.to_string()));
    }

    if meta.is_dir() {
        if strategy == CopyStrategy::Extract {
            return Err(BuildError::ExtractDirectory(pat.to_string()));
        }
        // A bare-directory source ("@a/") copies the directory's contents;
        // a named directory is copied as a subdirectory of the destination
        let target_rel = if pat.is_empty() {
            dest_rel.to_string()
        } else {
            join_rel(dest_rel, base_name(pat))
        };
        return copy_tree(src_root, pat, staging, &target_rel, excludes);
    }

    // Excluded single-file sources are skipped, not an error
    if excludes.is_excluded(pat) {
        return Ok(());
    }

    let src_abs = src_root.resolve(pat)?;

    if strategy == CopyStrategy::Extract {
        if !pattern::is_tarball(pat) {
            return Err(BuildError::NotATarball(pat.to_string()));
        }
        let dest_abs = staging.create_dir_all(dest_rel)?;
        return tarball::extract(&src_abs, &dest_abs);
    }

    // A trailing `/` on the destination, or an already-staged directory at
    // the destination, forces directory-like placement
    let target_rel = if dest_is_dirlike || staging.is_dir(dest_rel) {
        join_rel(dest_rel, base_name(pat))
    } else {
        dest_rel.to_string()
    };

    place_file(&src_abs, staging, &target_rel, strategy)
}

/// Glob reference: enumerate matches inside the source root
fn copy_glob(
    src_root: &RootDir,
    pat: &str,
    staging: &RootDir,
    dest_rel: &str,
    strategy: CopyStrategy,
    excludes: &ExcludeSet,
) -> Result<(), BuildError> {
    let compiled = pattern::compile(pat)?;
    let recursive_prefix = pattern::recursive_prefix(pat);

    let mut matched = Vec::new();
    for (rel, is_dir) in src_root.walk("")? {
        // `dir/**` asks for the directory's files; directory entries are
        // recreated implicitly from the file paths
        if recursive_prefix.is_some() && is_dir {
            continue;
        }
        if pattern::matches_path(&compiled, &rel) {
            matched.push((rel, is_dir));
        }
    }
    if matched.is_empty() {
        return Err(BuildError::NoMatches(pat.to_string()));
    }

    let surviving: Vec<(String, String, bool)> = matched
        .into_iter()
        .map(|(rel, is_dir)| {
            let placed = match recursive_prefix {
                Some("") => rel.clone(),
                Some(prefix) => rel
                    .strip_prefix(&format!("{prefix}/"))
                    .unwrap_or(&rel)
                    .to_string(),
                None => rel.clone(),
            };
            (rel, placed, is_dir)
        })
        .filter(|(_, placed, _)| !excludes.is_excluded(placed))
        .collect();
    if surviving.is_empty() {
        return Err(BuildError::AllExcluded(pat.to_string()));
    }

    for (rel, placed, is_dir) in surviving {
        if strategy == CopyStrategy::Extract {
            if !is_dir && pattern::is_tarball(&rel) {
                let src_abs = src_root.resolve(&rel)?;
                let dest_abs = staging.create_dir_all(dest_rel)?;
                tarball::extract(&src_abs, &dest_abs)?;
            }
            // non-tarball glob matches are skipped silently
            continue;
        }

        let target_rel = join_rel(dest_rel, &placed);
        if is_dir {
            copy_tree(src_root, &rel, staging, &target_rel, excludes)?;
        } else {
            let src_abs = src_root.resolve(&rel)?;
            place_file(&src_abs, staging, &target_rel, strategy)?;
        }
    }
    Ok(())
}

/// Copy or merge a single file into the staging root
fn place_file(
    src_abs: &Path,
    staging: &RootDir,
    target_rel: &str,
    strategy: CopyStrategy,
) -> Result<(), BuildError> {
    if strategy == CopyStrategy::Merge {
        let existing = staging
            .symlink_metadata(target_rel)?
            .is_some_and(|m| m.is_file());
        if existing {
            let dest_abs = staging.resolve(target_rel)?;
            return merge::merge_files(&dest_abs, src_abs);
        }
    }
    staging.copy_file_in(src_abs, target_rel)
}
