//! # Rooted Filesystem Operations
//!
//! Every read and write the builder performs is scoped to a root
//! directory. Absolute paths and `..` traversal are refused, and symlinks
//! are never followed, so a hostile source tree cannot reach outside its
//! own root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::pattern::ExcludeSet;
use super::BuildError;

/// A directory handle that rejects paths escaping the root
#[derive(Debug)]
pub struct RootDir {
    root: PathBuf,
}

impl RootDir {
    /// Open an existing directory as a root
    pub fn open(path: &Path) -> Result<Self, BuildError> {
        let meta = fs::metadata(path).map_err(|e| BuildError::io(path, e))?;
        if !meta.is_dir() {
            return Err(BuildError::io(path, std::io::Error::other("not a directory")));
        }
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Create the directory (recursively, idempotent) and open it as a root
    pub fn create(path: &Path) -> Result<Self, BuildError> {
        fs::create_dir_all(path).map_err(|e| BuildError::io(path, e))?;
        Self::open(path)
    }

    /// Absolute path of the root
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the root.
    ///
    /// The empty string resolves to the root itself. Absolute paths and any
    /// `..` component are refused.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, BuildError> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            return Err(BuildError::PathEscape(rel.to_string()));
        }
        for component in rel_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(BuildError::PathEscape(rel.to_string())),
            }
        }
        Ok(self.root.join(rel_path))
    }

    /// Metadata of an entry without following symlinks; `None` when absent
    pub fn symlink_metadata(&self, rel: &str) -> Result<Option<fs::Metadata>, BuildError> {
        let path = self.resolve(rel)?;
        match fs::symlink_metadata(&path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BuildError::io(&path, e)),
        }
    }

    /// Whether an entry exists and is a directory (symlinks excluded)
    pub fn is_dir(&self, rel: &str) -> bool {
        self.symlink_metadata(rel)
            .ok()
            .flatten()
            .is_some_and(|m| m.is_dir())
    }

    /// Recursively create a directory inside the root, idempotent on exists
    pub fn create_dir_all(&self, rel: &str) -> Result<PathBuf, BuildError> {
        let path = self.resolve(rel)?;
        fs::create_dir_all(&path).map_err(|e| BuildError::io(&path, e))?;
        Ok(path)
    }

    /// Copy a regular file into the root, creating parent directories.
    ///
    /// Permission bits are preserved from the source.
    pub fn copy_file_in(&self, src: &Path, rel: &str) -> Result<(), BuildError> {
        let dest = self.resolve(rel)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        // An existing directory at the destination would make fs::copy fail
        // with a confusing error; the engine is expected to have redirected
        // the file into the directory before getting here.
        fs::copy(src, &dest).map_err(|e| BuildError::io(&dest, e))?;
        Ok(())
    }

    /// Walk the tree below a relative directory, yielding `(rel, is_dir)`
    /// pairs sorted by path. Symlinks are skipped.
    pub fn walk(&self, rel: &str) -> Result<Vec<(String, bool)>, BuildError> {
        let base = self.resolve(rel)?;
        let mut entries = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false).min_depth(1) {
            let entry = entry.map_err(|e| {
                BuildError::io(&base, std::io::Error::other(e.to_string()))
            })?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                continue;
            }
            let rel_path = entry
                .path()
                .strip_prefix(&base)
                .map_err(|e| BuildError::io(entry.path(), std::io::Error::other(e.to_string())))?;
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");
            if rel_str == "." || rel_str == ".." {
                continue;
            }
            entries.push((rel_str, file_type.is_dir()));
        }
        entries.sort();
        Ok(entries)
    }
}

/// Copy a directory tree into a destination root, honoring excludes.
///
/// `excludes` apply to paths relative to `src_rel` (the matched root), with
/// the basename convenience for separator-less patterns. Symlinks in the
/// source are skipped.
pub fn copy_tree(
    src_root: &RootDir,
    src_rel: &str,
    dst_root: &RootDir,
    dst_rel: &str,
    excludes: &ExcludeSet,
) -> Result<(), BuildError> {
    dst_root.create_dir_all(dst_rel)?;
    for (rel, is_dir) in src_root.walk(src_rel)? {
        if excludes.is_excluded(&rel) {
            continue;
        }
        let target_rel = join_rel(dst_rel, &rel);
        if is_dir {
            dst_root.create_dir_all(&target_rel)?;
        } else {
            let src_path = src_root.resolve(&join_rel(src_rel, &rel))?;
            dst_root.copy_file_in(&src_path, &target_rel)?;
        }
    }
    Ok(())
}

/// Join two relative path fragments with `/`, tolerating empty sides
pub fn join_rel(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rest}")
    }
}

/// Basename of a relative path
pub fn base_name(rel: &str) -> &str {
    rel.trim_end_matches('/').rsplit('/').next().unwrap_or(rel)
}
