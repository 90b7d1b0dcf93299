//! # Tarball Extraction and Archival
//!
//! Gunzip+untar with path-traversal protection, and the deterministic
//! archive writer used to publish staged trees. Files are inserted in the
//! same sorted order the dir hash visits them, with zeroed timestamps and
//! ownership, so archiving the same tree twice produces the same bytes.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, EntryType, Header};
use walkdir::WalkDir;

use super::pattern::ExcludeSet;
use super::BuildError;
use crate::constants::SOURCE_IGNORE_FILE;

/// Extract a gzipped tarball into a destination directory.
///
/// Entries that would land outside the destination (absolute paths or `..`
/// traversal) are refused by the unpacker.
pub fn extract(tarball: &Path, dest: &Path) -> Result<(), BuildError> {
    std::fs::create_dir_all(dest).map_err(|e| BuildError::io(dest, e))?;

    let file = File::open(tarball).map_err(|e| BuildError::io(tarball, e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_overwrite(true);

    for entry in archive.entries().map_err(|e| extract_err(tarball, &e))? {
        let mut entry = entry.map_err(|e| extract_err(tarball, &e))?;
        // unpack_in refuses paths escaping dest and returns false for
        // entries it skips instead of erroring
        entry
            .unpack_in(dest)
            .map_err(|e| extract_err(tarball, &e))?;
    }
    Ok(())
}

fn extract_err(tarball: &Path, e: &std::io::Error) -> BuildError {
    BuildError::ExtractFailed {
        path: tarball.display().to_string(),
        detail: e.to_string(),
    }
}

/// Archive a directory tree as a gzipped tarball.
///
/// A `.sourceignore` file at the tree root, if present, holds glob
/// patterns (one per line, `#` comments) whose matches are left out of the
/// archive. Symlinks are skipped.
pub fn archive_dir(src: &Path, dest: &Path) -> Result<(), BuildError> {
    let ignore = load_ignore_patterns(src)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry =
            entry.map_err(|e| BuildError::io(src, std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| BuildError::io(entry.path(), std::io::Error::other(e.to_string())))?
            .to_string_lossy()
            .replace('\\', "/");
        if ignore.is_excluded(&rel) {
            continue;
        }
        files.push((rel, entry.into_path()));
    }
    files.sort();

    let out = File::create(dest).map_err(|e| BuildError::io(dest, e))?;
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut builder = Builder::new(encoder);

    for (rel, path) in files {
        let meta = std::fs::metadata(&path).map_err(|e| BuildError::io(&path, e))?;
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(meta.len());
        header.set_mode(file_mode(&meta));
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        let mut file = File::open(&path).map_err(|e| BuildError::io(&path, e))?;
        builder
            .append_data(&mut header, &rel, &mut file)
            .map_err(|e| BuildError::io(&path, e))?;
    }

    let encoder = builder.into_inner().map_err(|e| BuildError::io(dest, e))?;
    let writer = encoder.finish().map_err(|e| BuildError::io(dest, e))?;
    writer
        .into_inner()
        .map_err(|e| BuildError::io(dest, e.into_error()))?;
    Ok(())
}

fn load_ignore_patterns(src: &Path) -> Result<ExcludeSet, BuildError> {
    let ignore_path = src.join(SOURCE_IGNORE_FILE);
    if !ignore_path.is_file() {
        return Ok(ExcludeSet::default());
    }
    let raw = std::fs::read_to_string(&ignore_path).map_err(|e| BuildError::io(&ignore_path, e))?;
    let patterns: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches('/').to_string())
        .collect();
    ExcludeSet::parse(Some(&patterns))
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> u32 {
    0o644
}
