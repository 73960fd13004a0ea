//! Bytes-in-use accounting under the shared root.
//!
//! Measurement and the fit check are separate steps, so two writers can both
//! pass against the same snapshot. `ShareService::upload` closes that window
//! with its upload lock; callers using these functions directly do not get
//! that protection.

use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::common::config::SymlinkPolicy;

/// Sums the sizes of all regular files reachable under `root`.
///
/// Entries that vanish or cannot be read are skipped rather than failing the
/// walk. With [`SymlinkPolicy::Follow`] only links whose target stays under
/// `root` are traversed, and walkdir's ancestor check breaks loops (the
/// looping entry surfaces as an error and is skipped). A file reachable
/// through several links is counted once per path.
pub fn used_bytes(root: &Path, symlinks: SymlinkPolicy) -> u64 {
    let follow = symlinks == SymlinkPolicy::Follow;
    let Ok(canonical_root) = std::fs::canonicalize(root) else {
        return 0;
    };
    let mut total: u64 = 0;

    let walker = WalkDir::new(&canonical_root)
        .follow_links(follow)
        .into_iter()
        .filter_entry(|entry| !follow || link_stays_inside(entry, &canonical_root));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("Skipping unreadable entry during quota walk: {}", err);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        // file might have been deleted between listing and stat
        match entry.metadata() {
            Ok(meta) => total = total.saturating_add(meta.len()),
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), "Skipping file: {}", err);
            }
        }
    }

    total
}

// Prunes links (and everything below them) whose target leaves the root
fn link_stays_inside(entry: &DirEntry, canonical_root: &Path) -> bool {
    if !entry.path_is_symlink() {
        return true;
    }
    match std::fs::canonicalize(entry.path()) {
        Ok(target) if target.starts_with(canonical_root) => true,
        _ => {
            tracing::debug!(path = %entry.path().display(), "Not counting symlink that leaves the root");
            false
        }
    }
}

/// Pure fit rule: `used + candidate <= reserved`, overflow never fits.
pub fn fits(used: u64, reserved: u64, candidate: u64) -> bool {
    used.checked_add(candidate)
        .is_some_and(|total| total <= reserved)
}

/// Whether writing `candidate` more bytes keeps `root` within `reserved`.
pub fn would_fit(root: &Path, reserved: u64, candidate: u64, symlinks: SymlinkPolicy) -> bool {
    fits(used_bytes(root, symlinks), reserved, candidate)
}

/// Async wrapper that runs the walk on the blocking pool.
pub async fn used_bytes_async(root: &Path, symlinks: SymlinkPolicy) -> anyhow::Result<u64> {
    let root = root.to_path_buf();
    let used = tokio::task::spawn_blocking(move || used_bytes(&root, symlinks)).await?;
    Ok(used)
}
