//! Services used by the work queue: fetching files and labelling rows.

pub mod download;
pub mod placeholder;

pub use download::{build_file_url, DownloadError, Downloader};
pub use placeholder::{StatusPlaceholder, WorkerIdentity};
