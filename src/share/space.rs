//! Filesystem free-space capability.

use anyhow::{anyhow, Result};
use std::path::Path;
use sysinfo::Disks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub free: u64,
    pub total: u64,
}

pub trait SpaceProbe: Send + Sync {
    fn free_space(&self, path: &Path) -> Result<DiskSpace>;
}

/// Queries mounted disks through sysinfo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SpaceProbe for SystemSpaceProbe {
    fn free_space(&self, path: &Path) -> Result<DiskSpace> {
        let disks = Disks::new_with_refreshed_list();

        // Convert relative paths to absolute before matching against mount points
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut best: Option<(usize, DiskSpace)> = None;

        // Find disk with longest matching mount point (most specific)
        for disk in disks.list() {
            let mount_point = disk.mount_point();
            if !absolute.starts_with(mount_point) {
                continue;
            }
            let depth = mount_point.components().count();
            if best.map_or(true, |(best_depth, _)| depth > best_depth) {
                best = Some((
                    depth,
                    DiskSpace {
                        free: disk.available_space(),
                        total: disk.total_space(),
                    },
                ));
            }
        }

        best.map(|(_, space)| space)
            .ok_or_else(|| anyhow!("Cannot determine available disk space for {}", path.display()))
    }
}
