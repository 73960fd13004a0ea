pub mod config;
pub mod config_commands;
pub mod errors;

pub use config::{AppConfig, SymlinkPolicy, Transport};
pub use errors::AppError;
