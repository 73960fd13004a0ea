//! Subprocess capability used to run tunnel publishers.
//!
//! stdout and stderr are merged into one line channel. The system launcher
//! spawns with `kill_on_drop`, so dropping a process handle terminates it.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::tunnel::TunnelError;

const OUTPUT_BUFFER_LINES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// Handle to a running publisher process.
#[async_trait]
pub trait TunnelProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit poll.
    fn has_exited(&mut self) -> bool;

    /// Graceful stop request (SIGTERM on unix).
    async fn terminate(&mut self) -> std::io::Result<()>;

    async fn kill(&mut self) -> std::io::Result<()>;

    /// Waits up to `timeout`; returns whether the process exited.
    async fn wait(&mut self, timeout: Duration) -> std::io::Result<bool>;
}

pub struct SpawnedProcess {
    pub process: Box<dyn TunnelProcess>,
    pub output: mpsc::Receiver<OutputLine>,
}

pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess, TunnelError>;
}

/// Launches real OS processes through `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess, TunnelError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    TunnelError::BinaryMissing(program.to_string())
                } else {
                    TunnelError::Spawn(err.to_string())
                }
            })?;

        debug!(pid = ?child.id(), program, "Spawned tunnel process");

        let (sender, receiver) = mpsc::channel(OUTPUT_BUFFER_LINES);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, OutputStream::Stdout, sender.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, OutputStream::Stderr, sender));
        }

        Ok(SpawnedProcess {
            process: Box::new(SystemProcess { child }),
            output: receiver,
        })
    }
}

// ends when the pipe closes or the receiver is gone
async fn forward_lines<R>(reader: R, stream: OutputStream, sender: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(text)) = lines.next_line().await {
        if sender.send(OutputLine { stream, text }).await.is_err() {
            break;
        }
    }
}

struct SystemProcess {
    child: Child,
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // None once the child has been reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

#[async_trait]
impl TunnelProcess for SystemProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Tunnel process exited with status: {}", status);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!("Failed to poll tunnel process, treating as exited: {}", err);
                true
            }
        }
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        request_stop(&mut self.child)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    async fn wait(&mut self, timeout: Duration) -> std::io::Result<bool> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("Tunnel process exited with status: {}", status);
                Ok(true)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(false),
        }
    }
}
