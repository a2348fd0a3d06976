// src/fetch/mod.rs
pub mod download;
pub mod period;
pub mod session;

pub use download::{save_download, DownloadWatcher};
pub use period::ReportPeriod;
pub use session::PortalSession;
