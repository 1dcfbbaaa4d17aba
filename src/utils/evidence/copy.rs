use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::constants::{ARCHIVE_EXTENSION, DEFAULT_BUFFER_SIZE};
use crate::models::SealedEvidence;
use crate::utils::evidence::EvidenceWriter;

/// A directory copy that stopped at the first file it could not copy.
///
/// `copied` holds the evidence sealed before the failure; those files stay
/// on disk and still need to be documented.
#[derive(Debug, Error)]
#[error("{error:#} ({count} files copied before the failure)", count = .copied.len())]
pub struct PartialCopy {
    pub copied: Vec<SealedEvidence>,
    pub error: anyhow::Error,
}

fn destination_for(file_name: &std::ffi::OsStr, dest_dir: &Path, compress: bool) -> PathBuf {
    let mut name = file_name.to_os_string();
    if compress {
        name.push(".");
        name.push(ARCHIVE_EXTENSION);
    }
    dest_dir.join(name)
}

fn mark_read_only(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)
}

/// Copy one file into `dest_dir` through an evidence writer.
///
/// The copy keeps the source file name (plus `.zip` when compressed) and
/// is made read-only once sealed.
pub fn copy_file(source: &Path, dest_dir: &Path, compress: bool) -> Result<SealedEvidence> {
    let file_name = source
        .file_name()
        .with_context(|| format!("Source has no file name: {}", source.display()))?;
    let destination = destination_for(file_name, dest_dir, compress);

    let input = File::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?;
    let mut reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, input);
    let mut writer = EvidenceWriter::create(&destination, compress)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    io::copy(&mut reader, &mut writer)
        .with_context(|| format!("Failed to copy {}", source.display()))?;
    let sealed = writer
        .close()
        .with_context(|| format!("Failed to seal {}", destination.display()))?;

    if let Err(e) = mark_read_only(&destination) {
        warn!("Could not mark {} read-only: {}", destination.display(), e);
    }
    debug!("Copied {} -> {}", source.display(), destination.display());
    Ok(sealed)
}

/// Copy a directory tree into `case_dir`, preserving relative structure.
///
/// Files land under `case_dir/<source dir name>/...`. `is_cancelled` is
/// polled before every file; when it returns true the copies made so far
/// are returned. The first entry that cannot be read or written ends the
/// copy with a [`PartialCopy`].
pub fn copy_directory(
    source: &Path,
    case_dir: &Path,
    compress: bool,
    is_cancelled: &dyn Fn() -> bool,
) -> std::result::Result<Vec<SealedEvidence>, PartialCopy> {
    let mut sealed = Vec::new();
    match copy_tree(source, case_dir, compress, is_cancelled, &mut sealed) {
        Ok(()) => Ok(sealed),
        Err(error) => Err(PartialCopy { copied: sealed, error }),
    }
}

fn copy_tree(
    source: &Path,
    case_dir: &Path,
    compress: bool,
    is_cancelled: &dyn Fn() -> bool,
    sealed: &mut Vec<SealedEvidence>,
) -> Result<()> {
    let root_name = source
        .file_name()
        .with_context(|| format!("Source has no directory name: {}", source.display()))?;
    let target_root = case_dir.join(root_name);
    fs::create_dir_all(&target_root)
        .with_context(|| format!("Failed to create {}", target_root.display()))?;

    for entry in WalkDir::new(source).follow_links(false) {
        if is_cancelled() {
            debug!("Directory copy of {} cancelled", source.display());
            break;
        }
        let entry = entry.with_context(|| format!("Failed to read entry under {}", source.display()))?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = target_root.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            let parent = target.parent().unwrap_or(&target_root);
            sealed.push(copy_file(entry.path(), parent, compress)?);
        } else {
            debug!("Skipping special file {}", entry.path().display());
        }
    }

    Ok(())
}
