//! Publishing the local server: listener setup and tunnel publishers.

pub mod local;
pub mod process;
pub mod provider;
pub mod tunnel;

pub use process::{ProcessLauncher, SystemLauncher, TunnelProcess};
pub use provider::TunnelProvider;
pub use tunnel::{TunnelError, TunnelInfo, TunnelManager, TunnelState};
