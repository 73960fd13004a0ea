//! Lifecycle of the single tunnel publisher process.
//!
//! `start` and `stop` serialize on the handle mutex, so at most one publisher
//! is ever live. Every failure path reaps the process it spawned.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::process::{OutputLine, ProcessLauncher, SpawnedProcess, TunnelProcess};
use super::provider::TunnelProvider;
use crate::common::config::TunnelSettings;

const TUNNEL_POLL_INTERVAL: Duration = Duration::from_millis(200);
// output still buffered in the pipes when the exit is observed
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);
const TRANSCRIPT_LINES: usize = 50;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("{0} binary not found")]
    BinaryMissing(String),
    #[error("failed to spawn tunnel process: {0}")]
    Spawn(String),
    #[error("requested tunnel name '{0}' is not available")]
    NameTaken(String),
    #[error("tunnel process exited before a URL became available: {detail}")]
    ProcessExited { detail: String },
    #[error("timed out after {0:?} waiting for tunnel URL")]
    UrlTimeout(Duration),
}

/// Actionable message for a failed start, shown to whoever ran setup.
pub fn map_start_error(provider: &TunnelProvider, err: &TunnelError) -> String {
    let install = match provider {
        TunnelProvider::Localtunnel { .. } => "Install localtunnel:\n  npm install -g localtunnel",
        TunnelProvider::Cloudflare { .. } => {
            "Install cloudflared:\n  \
             https://developers.cloudflare.com/cloudflare-one/connections/connect-networks/downloads/"
        }
    };

    match err {
        TunnelError::BinaryMissing(program) => format!(
            "Failed to start {} tunnel: '{program}' was not found.\n\n{install}\n\n\
             Or set tunnel.program, or use a different tunnel provider.",
            provider.label()
        ),
        TunnelError::Spawn(msg) => format!(
            "Failed to start {} tunnel: {msg}\n\nOr use a different tunnel provider.",
            provider.label()
        ),
        TunnelError::NameTaken(name) => format!(
            "The tunnel name '{name}' is not available.\n\n\
             Pick another tunnel.subdomain, or leave it unset."
        ),
        TunnelError::ProcessExited { detail } => format!(
            "{} exited before the tunnel URL became available: {detail}\n\n\
             Try again, or use a different tunnel provider.",
            provider.program()
        ),
        TunnelError::UrlTimeout(timeout) => format!(
            "Timed out after {}s waiting for the tunnel URL.\n\n\
             This may indicate a network issue or a provider outage.\n\
             Check your internet connection and firewall settings, then try again.",
            timeout.as_secs()
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelState {
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInfo {
    pub public_url: String,
    pub requested_name: Option<String>,
    pub effective_name: Option<String>,
    /// True when an already running publisher was returned.
    pub reused: bool,
}

/// Result of scanning publisher output for the public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(String),
    /// The process ended first; carries the tail of its output.
    Exited(Vec<String>),
    TimedOut,
}

struct TunnelHandle {
    process: Box<dyn TunnelProcess>,
    public_url: String,
    requested_name: Option<String>,
    effective_name: Option<String>,
    drain: JoinHandle<()>,
}

impl TunnelHandle {
    fn info(&self, reused: bool) -> TunnelInfo {
        TunnelInfo {
            public_url: self.public_url.clone(),
            requested_name: self.requested_name.clone(),
            effective_name: self.effective_name.clone(),
            reused,
        }
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

fn push_transcript(transcript: &mut Vec<String>, text: String) {
    if transcript.len() == TRANSCRIPT_LINES {
        transcript.remove(0);
    }
    transcript.push(text);
}

/// Reads output lines until a provider URL appears, the process exits, or
/// `timeout` elapses.
pub async fn discover_url(
    process: &mut dyn TunnelProcess,
    output: &mut mpsc::Receiver<OutputLine>,
    provider: &TunnelProvider,
    timeout: Duration,
) -> ScanOutcome {
    let deadline = Instant::now() + timeout;
    let mut poll = tokio::time::interval(TUNNEL_POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut transcript = Vec::new();
    let mut output_open = true;

    loop {
        tokio::select! {
            biased;

            _ = tokio::time::sleep_until(deadline) => return ScanOutcome::TimedOut,

            line = output.recv(), if output_open => match line {
                Some(line) => {
                    debug!(stream = ?line.stream, "{}: {}", provider.label(), line.text);
                    if let Some(url) = provider.match_url(&line.text) {
                        return ScanOutcome::Found(url);
                    }
                    push_transcript(&mut transcript, line.text);
                }
                None => output_open = false,
            },

            _ = poll.tick() => {
                if process.has_exited() {
                    // collect what the forwarders still hold; URLs from a dead process are useless
                    let _ = tokio::time::timeout(EXIT_DRAIN_GRACE, async {
                        while let Some(line) = output.recv().await {
                            push_transcript(&mut transcript, line.text);
                        }
                    })
                    .await;
                    return ScanOutcome::Exited(transcript);
                }
            }
        }
    }
}

/// Graceful stop, bounded wait, then force kill.
async fn reap(process: &mut dyn TunnelProcess, grace: Duration) {
    if process.has_exited() {
        return;
    }

    if let Err(err) = process.terminate().await {
        // failed signal often means the process is already dead
        warn!("Failed to send graceful signal to tunnel process: {}", err);
    }

    match process.wait(grace).await {
        Ok(true) => return,
        Ok(false) => warn!(
            "Tunnel process did not exit after {}s, killing it",
            grace.as_secs()
        ),
        Err(err) => warn!("Failed to wait for tunnel process: {}", err),
    }

    if let Err(err) = process.kill().await {
        warn!("Failed to kill tunnel process: {}", err);
    }
}

// Keeps the pipes empty for the publisher's lifetime
async fn drain_output(mut output: mpsc::Receiver<OutputLine>, provider: &'static str) {
    while let Some(line) = output.recv().await {
        let lowercase_line = line.text.to_lowercase();
        if lowercase_line.contains("error") || lowercase_line.contains("fatal") {
            error!("{} output: {}", provider, line.text);
        } else {
            debug!("{} output: {}", provider, line.text);
        }
    }
    debug!("{} output closed", provider);
}

/// Owns at most one publisher process and its discovered URL.
pub struct TunnelManager {
    provider: TunnelProvider,
    launcher: Arc<dyn ProcessLauncher>,
    url_timeout: Duration,
    shutdown_grace: Duration,
    handle: Mutex<Option<TunnelHandle>>,
    state: std::sync::Mutex<TunnelState>,
}

impl TunnelManager {
    pub fn new(
        provider: TunnelProvider,
        launcher: Arc<dyn ProcessLauncher>,
        settings: &TunnelSettings,
    ) -> Self {
        Self {
            provider,
            launcher,
            url_timeout: settings.url_timeout(),
            shutdown_grace: settings.shutdown_grace(),
            handle: Mutex::new(None),
            state: std::sync::Mutex::new(TunnelState::Idle),
        }
    }

    pub fn provider(&self) -> &TunnelProvider {
        &self.provider
    }

    pub fn state(&self) -> TunnelState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: TunnelState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!("Tunnel state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    // Drops a handle whose process died on its own
    fn clear_crashed(&self, slot: &mut Option<TunnelHandle>) {
        if let Some(handle) = slot.take() {
            warn!("Tunnel process for {} exited unexpectedly", handle.public_url);
            self.set_state(TunnelState::Crashed);
        }
        self.set_state(TunnelState::Idle);
    }

    /// Returns the live tunnel, or spawns one and waits for its URL.
    ///
    /// If the provider refuses `preferred_name`, one retry runs without a name.
    #[tracing::instrument(skip(self), fields(provider = self.provider.label()))]
    pub async fn start(
        &self,
        local_port: u16,
        preferred_name: Option<&str>,
    ) -> Result<TunnelInfo, TunnelError> {
        let mut slot = self.handle.lock().await;

        if let Some(handle) = slot.as_mut() {
            if !handle.process.has_exited() {
                debug!("Reusing live tunnel at {}", handle.public_url);
                return Ok(handle.info(true));
            }
            self.clear_crashed(&mut slot);
        }

        self.set_state(TunnelState::Starting);

        let result = match self.attempt(local_port, preferred_name).await {
            Err(TunnelError::NameTaken(name)) => {
                warn!(
                    "Tunnel name '{}' is not available, retrying with a provider-assigned name",
                    name
                );
                self.attempt(local_port, None).await
            }
            other => other,
        };

        match result {
            Ok(mut handle) => {
                handle.requested_name = preferred_name.map(str::to_string);
                let info = handle.info(false);
                info!("Tunnel established at {}", info.public_url);
                *slot = Some(handle);
                self.set_state(TunnelState::Running);
                Ok(info)
            }
            Err(err) => {
                warn!("Tunnel startup failed: {}", err);
                self.set_state(TunnelState::Idle);
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        local_port: u16,
        name: Option<&str>,
    ) -> Result<TunnelHandle, TunnelError> {
        let args = self.provider.args(local_port, name);
        let SpawnedProcess {
            mut process,
            mut output,
        } = self.launcher.spawn(self.provider.program(), &args)?;

        let outcome =
            discover_url(process.as_mut(), &mut output, &self.provider, self.url_timeout).await;

        match outcome {
            ScanOutcome::Found(url) => {
                let effective_name = self.provider.effective_name(&url);
                let drain = tokio::spawn(drain_output(output, self.provider.label()));
                Ok(TunnelHandle {
                    process,
                    public_url: url,
                    requested_name: name.map(str::to_string),
                    effective_name,
                    drain,
                })
            }
            ScanOutcome::Exited(transcript) => {
                reap(process.as_mut(), self.shutdown_grace).await;
                if let Some(name) = name {
                    if self.provider.is_name_taken(&transcript) {
                        return Err(TunnelError::NameTaken(name.to_string()));
                    }
                }
                let detail = transcript
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "no output".to_string());
                Err(TunnelError::ProcessExited { detail })
            }
            ScanOutcome::TimedOut => {
                reap(process.as_mut(), self.shutdown_grace).await;
                Err(TunnelError::UrlTimeout(self.url_timeout))
            }
        }
    }

    /// Stops the publisher. The handle is cleared even if the process resists.
    pub async fn stop(&self) {
        let mut slot = self.handle.lock().await;
        let Some(mut handle) = slot.take() else {
            return;
        };

        self.set_state(TunnelState::Stopping);
        info!("Stopping tunnel at {}", handle.public_url);
        reap(handle.process.as_mut(), self.shutdown_grace).await;
        drop(handle);
        self.set_state(TunnelState::Idle);
    }

    /// True iff a publisher is owned and still running.
    pub async fn is_healthy(&self) -> bool {
        let mut slot = self.handle.lock().await;
        let alive = match slot.as_mut() {
            Some(handle) => !handle.process.has_exited(),
            None => return false,
        };
        if !alive {
            self.clear_crashed(&mut slot);
        }
        alive
    }

    /// Non-blocking variant of [`is_healthy`](Self::is_healthy) for status
    /// reporting; does nothing while a start or stop holds the handle.
    pub fn refresh_state(&self) {
        if let Ok(mut slot) = self.handle.try_lock() {
            let crashed = slot
                .as_mut()
                .is_some_and(|handle| handle.process.has_exited());
            if crashed {
                self.clear_crashed(&mut slot);
            }
        }
    }

    /// URL of the live publisher, if any.
    pub async fn public_url(&self) -> Option<String> {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.public_url.clone())
    }
}
