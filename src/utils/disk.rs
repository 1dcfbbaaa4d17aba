use std::path::{Path, PathBuf};

use log::debug;
use sysinfo::{DiskExt, System, SystemExt};

/// Walk up from `path` to the closest ancestor that exists.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if let Ok(resolved) = candidate.canonicalize() {
            return Some(resolved);
        }
        current = candidate.parent();
    }
    None
}

/// Pick the mount point that contains `path`, preferring the longest match.
fn best_mount<'a>(path: &Path, mounts: impl Iterator<Item = (&'a Path, u64)>) -> Option<u64> {
    mounts
        .filter(|(mount_point, _)| path.starts_with(mount_point))
        .max_by_key(|(mount_point, _)| mount_point.as_os_str().len())
        .map(|(_, available)| available)
}

/// Free space in bytes on the volume holding `path`.
///
/// `path` does not need to exist yet; the nearest existing ancestor decides
/// the volume. Returns `None` when no mounted disk matches.
pub fn available_space(path: &Path) -> Option<u64> {
    let resolved = existing_ancestor(path)?;

    let mut system = System::new();
    system.refresh_disks_list();

    let available = best_mount(
        &resolved,
        system
            .disks()
            .iter()
            .map(|disk| (disk.mount_point(), disk.available_space())),
    );
    debug!("Available space for {}: {:?}", resolved.display(), available);
    available
}
