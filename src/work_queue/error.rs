//! Work queue error types.

use thiserror::Error;

use crate::repository::StoreError;
use crate::services::DownloadError;

#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("Database error: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to claim {target} id={id}: {source}")]
    Claim {
        target: String,
        id: String,
        #[source]
        source: StoreError,
    },
    #[error("Claim on {row} lost {attempts} times in a row; its id may not match as text")]
    ClaimStuck { row: String, attempts: usize },
    #[error("Download client error: {0}")]
    Client(#[from] DownloadError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
