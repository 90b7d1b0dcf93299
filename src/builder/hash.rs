//! # Directory Hashing
//!
//! Reproducible content digest of a staged tree: every file is checksummed,
//! the sorted `"<checksum>  <path>\n"` lines are fed through an outer
//! checksum, and the outer hex output is the digest. A name-salted variant
//! keys the storage filename so that identical trees published under two
//! artifact names land on distinct files.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::BuildError;

/// Hash the tree below `root` without a salt.
///
/// This is the artifact's content digest: equal trees hash equal no matter
/// what the artifact is called.
pub fn hash_directory(root: &Path) -> Result<String, BuildError> {
    hash_tree(root, None)
}

/// Hash the tree below `root`, salted with the artifact name.
///
/// Used for the storage filename so two artifacts with identical contents
/// never collide on disk.
pub fn hash_directory_salted(root: &Path, name: &str) -> Result<String, BuildError> {
    hash_tree(root, Some(name))
}

fn hash_tree(root: &Path, salt: Option<&str>) -> Result<String, BuildError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| BuildError::io(root, std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BuildError::io(entry.path(), std::io::Error::other(e.to_string())))?
            .to_string_lossy()
            .replace('\\', "/");
        if rel.contains('\n') {
            return Err(BuildError::NewlineInFilename(rel));
        }
        files.push((rel, entry.into_path()));
    }
    files.sort();

    let mut outer = Sha256::new();
    if let Some(salt) = salt {
        outer.update(salt.as_bytes());
        outer.update(b"\n");
    }
    for (rel, path) in files {
        let checksum = hash_file(&path)?;
        outer.update(format!("{checksum}  {rel}\n").as_bytes());
    }
    Ok(format!("{:x}", outer.finalize()))
}

fn hash_file(path: &Path) -> Result<String, BuildError> {
    let mut file = std::fs::File::open(path).map_err(|e| BuildError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| BuildError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(files: &[(&str, &str)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = tmp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        tmp
    }

    #[test]
    fn test_hash_is_reproducible() {
        let a = stage(&[("x.yaml", "one"), ("sub/y.yaml", "two")]);
        let b = stage(&[("sub/y.yaml", "two"), ("x.yaml", "one")]);
        assert_eq!(
            hash_directory(a.path()).unwrap(),
            hash_directory(b.path()).unwrap()
        );
    }

    #[test]
    fn test_hash_sensitive_to_content_rename_and_membership() {
        let base = stage(&[("x.yaml", "one"), ("y.yaml", "two")]);
        let digest = hash_directory(base.path()).unwrap();

        let changed = stage(&[("x.yaml", "ONE"), ("y.yaml", "two")]);
        assert_ne!(digest, hash_directory(changed.path()).unwrap());

        let renamed = stage(&[("z.yaml", "one"), ("y.yaml", "two")]);
        assert_ne!(digest, hash_directory(renamed.path()).unwrap());

        let extra = stage(&[("x.yaml", "one"), ("y.yaml", "two"), ("w.yaml", "three")]);
        assert_ne!(digest, hash_directory(extra.path()).unwrap());

        let fewer = stage(&[("x.yaml", "one")]);
        assert_ne!(digest, hash_directory(fewer.path()).unwrap());
    }

    #[test]
    fn test_salt_changes_filename_hash_but_not_digest() {
        let tree = stage(&[("x.yaml", "one")]);
        let digest = hash_directory(tree.path()).unwrap();
        let file_a = hash_directory_salted(tree.path(), "artifact-a").unwrap();
        let file_b = hash_directory_salted(tree.path(), "artifact-b").unwrap();

        assert_ne!(file_a, file_b);
        assert_ne!(file_a, digest);
        // The unsalted digest is untouched by the name
        assert_eq!(digest, hash_directory(tree.path()).unwrap());
    }

    #[test]
    fn test_newline_in_filename_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad\nname"), "x").unwrap();
        assert!(hash_directory(tmp.path()).is_err());
    }
}
