#![allow(dead_code)]

pub mod config_test_utils;
pub mod share_http;

use async_trait::async_trait;
use foldershare::common::config::{AppConfig, SymlinkPolicy, Transport, TunnelSettings};
use foldershare::share::credentials::BcryptHasher;
use foldershare::share::space::{DiskSpace, SpaceProbe};
use foldershare::share::{ShareOptions, ShareService};
use foldershare::transport::process::{OutputLine, SpawnedProcess};
use foldershare::transport::{
    ProcessLauncher, TunnelError, TunnelManager, TunnelProcess, TunnelProvider,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const LOCAL_PORT: u16 = 8123;

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

pub fn write_file(root: &Path, relative: &str, len: usize) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, vec![b'x'; len]).expect("write file");
}

//=================
// Tunnel doubles
//=================

/// What a fake publisher does after being spawned.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emits the lines, then keeps running.
    Publish(Vec<String>),
    /// Emits the lines, then exits.
    Exit(Vec<String>),
    /// Emits nothing and never exits on its own.
    Silent,
}

#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub program: String,
    pub args: Vec<String>,
    pub alive: Arc<AtomicBool>,
}

/// Launcher that replays scripts in order. Falls back to `Silent` when empty.
pub struct FakeLauncher {
    scripts: Mutex<VecDeque<Script>>,
    spawned: Mutex<Vec<SpawnRecord>>,
    ignore_terminate: bool,
}

impl FakeLauncher {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            spawned: Mutex::new(Vec::new()),
            ignore_terminate: false,
        })
    }

    /// Processes that only die to `kill`.
    pub fn stubborn(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            spawned: Mutex::new(Vec::new()),
            ignore_terminate: true,
        })
    }

    pub fn spawned(&self) -> Vec<SpawnRecord> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn live_count(&self) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Simulates the most recent publisher dying on its own.
    pub fn crash_latest(&self) {
        if let Some(record) = self.spawned.lock().unwrap().last() {
            record.alive.store(false, Ordering::SeqCst);
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess, TunnelError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Silent);

        let (sender, receiver) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));

        let keep_sender = match script {
            Script::Publish(lines) => {
                for line in lines {
                    sender.try_send(OutputLine::stdout(line)).unwrap();
                }
                Some(sender)
            }
            Script::Exit(lines) => {
                for line in lines {
                    sender.try_send(OutputLine::stderr(line)).unwrap();
                }
                alive.store(false, Ordering::SeqCst);
                None
            }
            Script::Silent => Some(sender),
        };

        self.spawned.lock().unwrap().push(SpawnRecord {
            program: program.to_string(),
            args: args.to_vec(),
            alive: Arc::clone(&alive),
        });

        Ok(SpawnedProcess {
            process: Box::new(FakeProcess {
                alive,
                ignore_terminate: self.ignore_terminate,
                _output: keep_sender,
            }),
            output: receiver,
        })
    }
}

pub struct FakeProcess {
    alive: Arc<AtomicBool>,
    ignore_terminate: bool,
    // keeps the output channel open while the process "runs"
    _output: Option<mpsc::Sender<OutputLine>>,
}

#[async_trait]
impl TunnelProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn has_exited(&mut self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        if !self.ignore_terminate {
            self.alive.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self, timeout: Duration) -> std::io::Result<bool> {
        if self.alive.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout).await;
        }
        Ok(!self.alive.load(Ordering::SeqCst))
    }
}

pub fn fast_tunnel_settings() -> TunnelSettings {
    TunnelSettings {
        url_timeout_secs: 1,
        shutdown_grace_secs: 1,
        ..TunnelSettings::default()
    }
}

pub fn localtunnel_manager(launcher: Arc<FakeLauncher>) -> TunnelManager {
    let provider = TunnelProvider::for_transport(Transport::Localtunnel, None).unwrap();
    TunnelManager::new(provider, launcher, &fast_tunnel_settings())
}

pub fn publish(url: &str) -> Script {
    Script::Publish(vec![
        "connecting...".to_string(),
        format!("your url is: {url}"),
    ])
}

//=================
// Share doubles
//=================

pub struct FakeSpace {
    pub free: u64,
}

impl SpaceProbe for FakeSpace {
    fn free_space(&self, _path: &Path) -> anyhow::Result<DiskSpace> {
        Ok(DiskSpace {
            free: self.free,
            total: self.free,
        })
    }
}

pub fn share_options(symlinks: SymlinkPolicy, preferred_name: Option<&str>) -> ShareOptions {
    let mut config = AppConfig::default();
    config.share.symlinks = symlinks;
    config.tunnel.subdomain = preferred_name.map(str::to_string);
    ShareOptions::from_config(&config, LOCAL_PORT)
}

/// Local-transport service with unlimited free space.
pub fn local_service(symlinks: SymlinkPolicy) -> ShareService {
    ShareService::new(
        share_options(symlinks, None),
        None,
        Arc::new(BcryptHasher::new(4)),
        Arc::new(FakeSpace { free: u64::MAX }),
    )
}

pub fn local_service_with_space(free: u64) -> ShareService {
    ShareService::new(
        share_options(SymlinkPolicy::Reject, None),
        None,
        Arc::new(BcryptHasher::new(4)),
        Arc::new(FakeSpace { free }),
    )
}

pub fn tunnel_service(launcher: Arc<FakeLauncher>, preferred_name: Option<&str>) -> ShareService {
    ShareService::new(
        share_options(SymlinkPolicy::Reject, preferred_name),
        Some(localtunnel_manager(launcher)),
        Arc::new(BcryptHasher::new(4)),
        Arc::new(FakeSpace { free: u64::MAX }),
    )
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 temp path")
}
