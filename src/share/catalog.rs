//! Directory listings with kind classification, breadcrumbs and usage summary.

use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::common::config::SymlinkPolicy;
use crate::share::quota;
use crate::utils::security::{self, join_components, PathValidationError, ResolvedPath};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    InvalidPath(#[from] PathValidationError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Coarse content class used by clients to pick an icon or previewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Folder,
    Image,
    Video,
    Audio,
    Pdf,
    Text,
    Unknown,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico", "tif", "tiff", "heic", "avif",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "wmv", "flv", "m4v", "mpeg", "mpg",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "opus"];
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "json", "xml", "yaml", "yml", "toml", "log", "ini", "cfg", "html", "htm",
    "css", "js", "ts", "rs", "py", "sh", "c", "h", "cpp", "java", "go", "sql",
];

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

impl FileKind {
    /// Classifies a file by extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = extension_lowercase(path) else {
            return FileKind::Unknown;
        };
        let ext = ext.as_str();

        if IMAGE_EXTENSIONS.contains(&ext) {
            FileKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            FileKind::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            FileKind::Audio
        } else if ext == "pdf" {
            FileKind::Pdf
        } else if TEXT_EXTENSIONS.contains(&ext) {
            FileKind::Text
        } else {
            FileKind::Unknown
        }
    }
}

/// MIME type used for download/preview responses.
pub fn content_type_for(path: &Path) -> &'static str {
    match extension_lowercase(path).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("avif") => "image/avif",
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg" | "opus") => "audio/ogg",
        Some("m4a" | "aac") => "audio/aac",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    /// `/`-separated path relative to the shared root.
    pub path: String,
    pub is_dir: bool,
    /// 0 for directories.
    pub size: u64,
    /// Unix seconds, 0 when the platform cannot report it.
    pub modified: u64,
    pub kind: FileKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageSummary {
    pub used: u64,
    pub total: u64,
    pub percent: f64,
}

impl StorageSummary {
    pub fn new(used: u64, reserved: u64) -> Self {
        let percent = if reserved == 0 {
            if used > 0 {
                100.0
            } else {
                0.0
            }
        } else {
            (used as f64 / reserved as f64 * 100.0).min(100.0)
        };

        Self {
            used,
            total: reserved,
            percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub path: String,
    pub items: Vec<CatalogEntry>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub storage: StorageSummary,
}

/// Directories first, then byte-wise by name.
pub fn compare_entries(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name))
}

/// One crumb per component, each carrying the cumulative path from root.
pub fn breadcrumbs(relative: &Path) -> Vec<Breadcrumb> {
    let mut crumbs = Vec::new();
    let mut cumulative = PathBuf::new();

    for component in relative.components() {
        cumulative.push(component);
        crumbs.push(Breadcrumb {
            name: component.as_os_str().to_string_lossy().into_owned(),
            path: join_components(&cumulative),
        });
    }

    crumbs
}

fn unix_seconds(time: std::io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// None means "skip": unreadable metadata, broken links, or links the policy excludes
async fn build_entry(
    entry: &tokio::fs::DirEntry,
    parent: &ResolvedPath,
    canonical_root: &Path,
    symlinks: SymlinkPolicy,
) -> Option<CatalogEntry> {
    let file_type = entry.file_type().await.ok()?;

    let metadata = if file_type.is_symlink() {
        if symlinks == SymlinkPolicy::Reject {
            return None;
        }
        let target = tokio::fs::canonicalize(entry.path()).await.ok()?;
        if !target.starts_with(canonical_root) {
            tracing::debug!(path = %entry.path().display(), "Hiding symlink that leaves the root");
            return None;
        }
        tokio::fs::metadata(&target).await.ok()?
    } else {
        entry.metadata().await.ok()?
    };

    let name = entry.file_name().to_string_lossy().into_owned();
    let relative = parent.relative.join(&name);
    let is_dir = metadata.is_dir();

    Some(CatalogEntry {
        kind: if is_dir {
            FileKind::Folder
        } else {
            FileKind::from_path(Path::new(&name))
        },
        path: join_components(&relative),
        size: if is_dir { 0 } else { metadata.len() },
        modified: unix_seconds(metadata.modified()),
        is_dir,
        name,
    })
}

/// Lists the immediate children of `relative` under `root`.
pub async fn list(
    root: &Path,
    relative: &str,
    reserved: u64,
    symlinks: SymlinkPolicy,
) -> Result<Listing, CatalogError> {
    let resolved = security::resolve_within(root, relative, symlinks)?;

    let is_dir = tokio::fs::metadata(&resolved.absolute)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(CatalogError::NotFound("Folder not found".to_string()));
    }

    let canonical_root = tokio::fs::canonicalize(root).await?;
    let mut reader = tokio::fs::read_dir(&resolved.absolute).await?;
    let mut items = Vec::new();

    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => {
                if let Some(item) = build_entry(&entry, &resolved, &canonical_root, symlinks).await {
                    items.push(item);
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("Directory scan stopped early: {}", err);
                break;
            }
        }
    }

    items.sort_by(compare_entries);

    let used = quota::used_bytes_async(&canonical_root, symlinks).await?;

    Ok(Listing {
        path: resolved.relative_str(),
        breadcrumbs: breadcrumbs(&resolved.relative),
        storage: StorageSummary::new(used, reserved),
        items,
    })
}

/// Resolves `relative` to an existing regular file under `root`.
pub async fn locate_file(
    root: &Path,
    relative: &str,
    symlinks: SymlinkPolicy,
) -> Result<(ResolvedPath, std::fs::Metadata), CatalogError> {
    let resolved = security::resolve_within(root, relative, symlinks)?;

    match tokio::fs::metadata(&resolved.absolute).await {
        Ok(meta) if meta.is_file() => Ok((resolved, meta)),
        _ => Err(CatalogError::NotFound("File not found".to_string())),
    }
}
