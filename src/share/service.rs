//! The share session: one configured folder, its quota, its credential and
//! the public URL it is reachable under.
//!
//! `ShareService` is owned by the router state and never global. Readers
//! clone the current `Arc<ActiveShare>`; setup swaps it in one step.

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::config::{AppConfig, SymlinkPolicy};
use crate::common::AppError;
use crate::share::catalog::{self, Listing};
use crate::share::credentials::{BcryptHasher, CredentialHasher};
use crate::share::quota;
use crate::share::space::{SpaceProbe, SystemSpaceProbe};
use crate::transport::local::local_url;
use crate::transport::tunnel::map_start_error;
use crate::transport::{SystemLauncher, TunnelManager, TunnelProvider, TunnelState};
use crate::utils::security::{self, join_components};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Per-service settings that do not change between setups.
#[derive(Debug, Clone)]
pub struct ShareOptions {
    /// Port the HTTP server is bound to; tunnels forward here.
    pub local_port: u16,
    pub preferred_name: Option<String>,
    pub symlinks: SymlinkPolicy,
    pub min_password_len: usize,
}

impl ShareOptions {
    pub fn from_config(config: &AppConfig, local_port: u16) -> Self {
        Self {
            local_port,
            preferred_name: config.tunnel.subdomain.clone(),
            symlinks: config.share.symlinks,
            min_password_len: config.share.min_password_len,
        }
    }
}

/// Snapshot of a configured share. Replaced wholesale by each setup.
#[derive(Debug)]
pub struct ActiveShare {
    root: PathBuf,
    reserved_bytes: u64,
    credential_hash: String,
    public_url: String,
}

impl ActiveShare {
    /// Canonical absolute path of the shared folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupOutcome {
    pub public_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// A resolved file ready to be streamed by the route layer.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub content_type: &'static str,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    /// `/`-separated location relative to the root.
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareStatus {
    pub configured: bool,
    pub url: Option<String>,
    /// `None` for the local-only transport.
    pub tunnel: Option<TunnelState>,
}

pub struct ShareService {
    options: ShareOptions,
    tunnel: Option<TunnelManager>,
    credentials: Arc<dyn CredentialHasher>,
    space: Arc<dyn SpaceProbe>,
    session: RwLock<Option<Arc<ActiveShare>>>,
    // serializes measure + check + rename so concurrent uploads cannot overshoot the quota
    upload_lock: Mutex<()>,
}

impl ShareService {
    /// Without a tunnel manager the public URL is the loopback address.
    pub fn new(
        options: ShareOptions,
        tunnel: Option<TunnelManager>,
        credentials: Arc<dyn CredentialHasher>,
        space: Arc<dyn SpaceProbe>,
    ) -> Self {
        Self {
            options,
            tunnel,
            credentials,
            space,
            session: RwLock::new(None),
            upload_lock: Mutex::new(()),
        }
    }

    /// Service backed by the real process launcher, bcrypt and sysinfo.
    pub fn from_config(config: &AppConfig, local_port: u16) -> Self {
        let tunnel = TunnelProvider::for_transport(
            config.tunnel.provider,
            config.tunnel.program.as_deref(),
        )
        .map(|provider| TunnelManager::new(provider, Arc::new(SystemLauncher), &config.tunnel));

        Self::new(
            ShareOptions::from_config(config, local_port),
            tunnel,
            Arc::new(BcryptHasher::default()),
            Arc::new(SystemSpaceProbe),
        )
    }

    pub fn options(&self) -> &ShareOptions {
        &self.options
    }

    /// Current share, or `NotConfigured` before the first setup.
    pub fn current(&self) -> Result<Arc<ActiveShare>, AppError> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(AppError::NotConfigured)
    }

    /// Configures (or reconfigures) the share and returns its public URL.
    ///
    /// A live tunnel is reused, so repeated setups keep the same URL.
    pub async fn setup(
        &self,
        folder: &str,
        reserved_gb: f64,
        password: &str,
    ) -> Result<SetupOutcome, AppError> {
        if !reserved_gb.is_finite() || reserved_gb <= 0.0 {
            return Err(AppError::BadRequest(
                "Reserved space must be greater than 0 GB".to_string(),
            ));
        }
        if password.chars().count() < self.options.min_password_len {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters",
                self.options.min_password_len
            )));
        }

        let root = resolve_folder(folder).await?;
        let reserved_bytes = gb_to_bytes(reserved_gb);

        let probe = Arc::clone(&self.space);
        let probe_root = root.clone();
        let space = tokio::task::spawn_blocking(move || probe.free_space(&probe_root))
            .await
            .context("Free space query task failed")??;
        if reserved_bytes > space.free {
            return Err(AppError::InsufficientSpace {
                available: space.free,
                requested: reserved_bytes,
            });
        }

        let hasher = Arc::clone(&self.credentials);
        let plaintext = password.to_string();
        let credential_hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .context("Password hashing task failed")??;

        let public_url = self.acquire_url().await?;

        let share = Arc::new(ActiveShare {
            root,
            reserved_bytes,
            credential_hash,
            public_url: public_url.clone(),
        });
        info!(
            root = %share.root.display(),
            reserved_bytes,
            "Share configured at {}", public_url
        );
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(share);

        Ok(SetupOutcome { public_url })
    }

    async fn acquire_url(&self) -> Result<String, AppError> {
        let Some(manager) = &self.tunnel else {
            return Ok(local_url(self.options.local_port));
        };

        manager
            .start(self.options.local_port, self.options.preferred_name.as_deref())
            .await
            .map(|info| info.public_url)
            .map_err(|err| AppError::TunnelUnavailable(map_start_error(manager.provider(), &err)))
    }

    /// Checks a password against the current share's credential.
    ///
    /// `NotConfigured` takes precedence over `Unauthorized`.
    pub async fn authenticate(&self, password: &str) -> Result<Arc<ActiveShare>, AppError> {
        let share = self.current()?;

        let hasher = Arc::clone(&self.credentials);
        let candidate = password.to_string();
        let checked = Arc::clone(&share);
        let verified =
            tokio::task::spawn_blocking(move || hasher.verify(&candidate, &checked.credential_hash))
                .await
                .context("Credential check task failed")?;

        if verified {
            Ok(share)
        } else {
            Err(AppError::Unauthorized)
        }
    }

    pub async fn list_files(&self, share: &ActiveShare, relative: &str) -> Result<Listing, AppError> {
        let listing =
            catalog::list(&share.root, relative, share.reserved_bytes, self.options.symlinks)
                .await?;
        Ok(listing)
    }

    pub async fn download(
        &self,
        share: &ActiveShare,
        relative: &str,
    ) -> Result<FileDownload, AppError> {
        self.open_file(share, relative, Disposition::Attachment).await
    }

    /// Same as [`download`](Self::download) but meant for inline display.
    pub async fn preview(&self, share: &ActiveShare, relative: &str) -> Result<FileDownload, AppError> {
        self.open_file(share, relative, Disposition::Inline).await
    }

    async fn open_file(
        &self,
        share: &ActiveShare,
        relative: &str,
        disposition: Disposition,
    ) -> Result<FileDownload, AppError> {
        let (resolved, metadata) =
            catalog::locate_file(&share.root, relative, self.options.symlinks).await?;

        let file_name = resolved
            .absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());

        Ok(FileDownload {
            content_type: catalog::content_type_for(&resolved.absolute),
            path: resolved.absolute,
            file_name,
            size: metadata.len(),
            disposition,
        })
    }

    /// Stores `data` as `directory/filename`, replacing an existing file.
    ///
    /// The quota check counts the replaced file's current size.
    pub async fn upload(
        &self,
        share: &ActiveShare,
        directory: Option<&str>,
        filename: &str,
        data: Bytes,
    ) -> Result<UploadOutcome, AppError> {
        let symlinks = self.options.symlinks;
        security::validate_upload_name(filename)?;

        let dir = security::resolve_within(&share.root, directory.unwrap_or(""), symlinks)?;
        let dir_exists = tokio::fs::metadata(&dir.absolute)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !dir_exists {
            return Err(AppError::NotFound("Folder not found".to_string()));
        }

        let target = dir.absolute.join(filename);
        if let Ok(meta) = tokio::fs::symlink_metadata(&target).await {
            if meta.file_type().is_symlink() && symlinks == SymlinkPolicy::Reject {
                debug!(path = %target.display(), "Refusing to replace symlink");
                return Err(AppError::InvalidPath);
            }
            let is_dir = tokio::fs::metadata(&target)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if is_dir {
                return Err(AppError::Conflict(format!(
                    "A folder named '{filename}' already exists"
                )));
            }
        }

        let requested = data.len() as u64;
        let _guard = self.upload_lock.lock().await;

        let used = quota::used_bytes_async(&share.root, symlinks).await?;
        if !quota::fits(used, share.reserved_bytes, requested) {
            return Err(AppError::QuotaExceeded {
                used,
                reserved: share.reserved_bytes,
                requested,
            });
        }

        let temp = dir.absolute.join(format!(".{}.upload", Uuid::new_v4()));
        if let Err(err) = write_then_rename(&temp, &target, &data).await {
            if let Err(cleanup_err) = tokio::fs::remove_file(&temp).await {
                debug!("Temporary upload already gone: {}", cleanup_err);
            }
            return Err(err.into());
        }

        let path = join_components(&dir.relative.join(filename));
        info!(bytes = requested, "Stored upload {}", path);

        Ok(UploadOutcome {
            filename: filename.to_string(),
            path,
            size: requested,
        })
    }

    /// Configuration flag, public URL and tunnel state.
    pub fn status(&self) -> ShareStatus {
        let current = self.current().ok();

        let tunnel = self.tunnel.as_ref().map(|manager| {
            manager.refresh_state();
            manager.state()
        });

        ShareStatus {
            configured: current.is_some(),
            url: current.map(|share| share.public_url.clone()),
            tunnel,
        }
    }

    /// Tears down the share and stops the tunnel publisher.
    pub async fn shutdown(&self) {
        self.session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(manager) = &self.tunnel {
            manager.stop().await;
        }
    }
}

/// `floor(gb × 1024³)`; `as` saturates at `u64::MAX`.
pub fn gb_to_bytes(gb: f64) -> u64 {
    (gb * BYTES_PER_GB).floor() as u64
}

fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\"))
    };

    match (rest, directories::BaseDirs::new()) {
        (Some(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => PathBuf::from(raw),
    }
}

async fn resolve_folder(raw: &str) -> Result<PathBuf, AppError> {
    if raw.is_empty() || raw.contains('\0') {
        return Err(AppError::InvalidPath);
    }

    let path = expand_home(raw);
    let is_dir = tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(AppError::NotAFolder);
    }

    let canonical = tokio::fs::canonicalize(&path)
        .await
        .with_context(|| format!("Failed to resolve shared folder {}", path.display()))?;
    Ok(canonical)
}

async fn write_then_rename(temp: &Path, target: &Path, data: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(temp, data)
        .await
        .context("Failed to write upload to temporary file")?;
    tokio::fs::rename(temp, target)
        .await
        .context("Failed to move upload into place")?;
    Ok(())
}
