pub mod common;
pub mod output;
pub mod server;
pub mod share;
pub mod transport;
pub mod utils;
