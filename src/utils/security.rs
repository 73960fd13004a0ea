//! Client path validation and containment under the shared root.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::common::config::SymlinkPolicy;

// "%25252e" style nesting beyond this many rounds is rejected outright
const MAX_DECODE_ROUNDS: usize = 3;

//===============
// Path Handling
//===============
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathValidationError {
    #[error("Path contains parent directory (..)")]
    ContainsParentDir,
    #[error("Path is absolute")]
    AbsolutePath,
    #[error("Path contains invalid component")]
    InvalidComponent,
    #[error("Path contains null byte")]
    NullByte,
    #[error("Path is empty")]
    Empty,
    #[error("Path resolves outside the shared root")]
    OutsideRoot,
    #[error("Path traverses a symbolic link")]
    SymlinkTraversal,
    #[error("Shared root is unavailable: {0}")]
    RootUnavailable(String),
}

/// A client path that passed containment, in both absolute and root-relative form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub absolute: PathBuf,
    pub relative: PathBuf,
}

impl ResolvedPath {
    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// Relative path joined with `/` regardless of platform.
    pub fn relative_str(&self) -> String {
        join_components(&self.relative)
    }
}

pub fn join_components(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_drive(path: &[u8]) -> bool {
    path.len() >= 2 && path[0].is_ascii_alphabetic() && path[1] == b':'
}

// Decode until stable so double-encoded forms surface; never used as the name itself
fn decoded_forms(component: &str) -> Result<Vec<u8>, PathValidationError> {
    let mut current = component.as_bytes().to_vec();
    for _ in 0..=MAX_DECODE_ROUNDS {
        let next = urlencoding::decode_binary(&current).into_owned();
        if next == current {
            return Ok(current);
        }
        current = next;
    }
    Err(PathValidationError::InvalidComponent)
}

// A literal component is only accepted if no decoding of it is special.
fn check_component(component: &str) -> Result<(), PathValidationError> {
    if !component.contains('%') {
        return Ok(());
    }

    let decoded = decoded_forms(component)?;
    if decoded.contains(&0) {
        return Err(PathValidationError::NullByte);
    }
    match decoded.as_slice() {
        b".." => Err(PathValidationError::ContainsParentDir),
        b"." => Err(PathValidationError::InvalidComponent),
        bytes if bytes.contains(&b'/') || bytes.contains(&b'\\') => {
            Err(PathValidationError::InvalidComponent)
        }
        bytes if looks_like_drive(bytes) => Err(PathValidationError::AbsolutePath),
        _ => Ok(()),
    }
}

/// Normalizes a client-supplied relative path into plain `Normal` components.
///
/// The input is used as given: callers pass names already decoded once by
/// the route layer, so `report%41.txt` names that exact file. Components
/// whose percent-decoding would be `..`, `.`, a separator or NUL are
/// rejected. `\` is treated as a separator, so on unix a file literally
/// named `a\b` cannot be addressed. `.` and empty segments are dropped,
/// so `""` normalizes to the root.
pub fn normalize_relative(raw: &str) -> Result<PathBuf, PathValidationError> {
    // rust uses C-style APIs so \0 can end str early
    if raw.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    let unified = raw.replace('\\', "/");
    if looks_like_drive(unified.as_bytes()) {
        return Err(PathValidationError::AbsolutePath);
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => {
                check_component(&part.to_string_lossy())?;
                normalized.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir => return Err(PathValidationError::ContainsParentDir),
            Component::RootDir => return Err(PathValidationError::AbsolutePath),
            Component::Prefix(_) => return Err(PathValidationError::InvalidComponent), // Windows
        }
    }

    Ok(normalized)
}

/// Validates an upload file name: exactly one plain path component.
pub fn validate_upload_name(name: &str) -> Result<(), PathValidationError> {
    if name.is_empty() {
        return Err(PathValidationError::Empty);
    }
    if name.contains('\0') {
        return Err(PathValidationError::NullByte);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(PathValidationError::InvalidComponent);
    }

    match name {
        "." => Err(PathValidationError::InvalidComponent),
        ".." => Err(PathValidationError::ContainsParentDir),
        _ if looks_like_drive(name.as_bytes()) => Err(PathValidationError::AbsolutePath),
        _ => check_component(name),
    }
}

// Canonicalize the deepest existing ancestor and re-attach the missing tail,
// so containment is decided before existence.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, PathValidationError> {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match std::fs::canonicalize(&existing) {
            Ok(mut canonical) => {
                for part in missing.iter().rev() {
                    canonical.push(part);
                }
                return Ok(canonical);
            }
            Err(err) => match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => return Err(PathValidationError::RootUnavailable(err.to_string())),
            },
        }
    }
}

/// Resolves `relative` against `root` and rejects anything outside it.
///
/// The containment check runs on the canonical form (symlinks and `..`
/// resolved), never on the raw string. Paths that do not exist yet are still
/// checked, so containment failures win over not-found.
pub fn resolve_within(
    root: &Path,
    relative: &str,
    symlinks: SymlinkPolicy,
) -> Result<ResolvedPath, PathValidationError> {
    let relative = normalize_relative(relative)?;

    let canonical_root = std::fs::canonicalize(root)
        .map_err(|e| PathValidationError::RootUnavailable(e.to_string()))?;

    let lexical = canonical_root.join(&relative);
    let absolute = canonicalize_existing_prefix(&lexical)?;

    // Path::starts_with compares whole components: "/srv/share2" is not under "/srv/share"
    if !absolute.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot);
    }

    if symlinks == SymlinkPolicy::Reject && absolute != lexical {
        return Err(PathValidationError::SymlinkTraversal);
    }

    Ok(ResolvedPath { absolute, relative })
}
