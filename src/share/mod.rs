//! The shared folder: catalog, quota, credentials and the session tying them together.

pub mod catalog;
pub mod credentials;
pub mod quota;
pub mod service;
pub mod space;

pub use service::{ActiveShare, FileDownload, ShareOptions, ShareService, ShareStatus};
