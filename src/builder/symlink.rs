//! # Symlink Resolution
//!
//! Pre-pass over a fetched source tree that replaces in-tree symlinks with
//! materialized copies of their referents. Links that resolve outside the
//! root, links to missing targets, and cyclic or self-referential links
//! are left in place; the rooted copy layer skips whatever remains.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::BuildError;

/// Upper bound on materialization passes; chained links shorten each pass
/// and cycles never resolve, so the loop always terminates
const MAX_PASSES: usize = 16;

/// Replace every in-tree symlink under `root` with a copy of its referent
pub fn materialize_symlinks(root: &Path) -> Result<(), BuildError> {
    let canonical_root = root
        .canonicalize()
        .map_err(|e| BuildError::io(root, e))?;

    for _ in 0..MAX_PASSES {
        let links = collect_symlinks(&canonical_root)?;
        if links.is_empty() {
            return Ok(());
        }

        let mut replaced = 0usize;
        for link in links {
            let Some(target) = resolve_in_tree(&canonical_root, &link) else {
                continue;
            };
            // Replacing a link with an ancestor of itself would copy the
            // tree into itself; leave such links alone
            if link.starts_with(&target) {
                continue;
            }

            fs::remove_file(&link).map_err(|e| BuildError::io(&link, e))?;
            let meta = fs::symlink_metadata(&target).map_err(|e| BuildError::io(&target, e))?;
            if meta.is_dir() {
                copy_dir_verbatim(&target, &link)?;
            } else {
                fs::copy(&target, &link).map_err(|e| BuildError::io(&link, e))?;
            }
            replaced += 1;
        }

        if replaced == 0 {
            return Ok(());
        }
    }
    Ok(())
}

fn collect_symlinks(root: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut links = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry =
            entry.map_err(|e| BuildError::io(root, std::io::Error::other(e.to_string())))?;
        if entry.file_type().is_symlink() {
            links.push(entry.into_path());
        }
    }
    Ok(links)
}

/// Fully resolve a link chain; `None` when the target is missing, cyclic,
/// or lies outside the root
fn resolve_in_tree(root: &Path, link: &Path) -> Option<PathBuf> {
    // canonicalize follows the whole chain and fails on loops and
    // dangling targets
    let target = fs::canonicalize(link).ok()?;
    if !target.starts_with(root) || target == link {
        return None;
    }
    Some(target)
}

/// Copy a directory tree preserving nested symlinks verbatim; later passes
/// decide whether those resolve in-tree
fn copy_dir_verbatim(src: &Path, dest: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dest).map_err(|e| BuildError::io(dest, e))?;
    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry =
            entry.map_err(|e| BuildError::io(src, std::io::Error::other(e.to_string())))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| BuildError::io(entry.path(), std::io::Error::other(e.to_string())))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| BuildError::io(&target, e))?;
        } else if file_type.is_symlink() {
            let referent = fs::read_link(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&referent, &target)
                .map_err(|e| BuildError::io(&target, e))?;
            #[cfg(not(unix))]
            let _ = referent;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| BuildError::io(&target, e))?;
        }
    }
    Ok(())
}
