//! Remote file processing
//!
//! - [`RemoteFileBackend`]: upload / get / delete against the remote file service
//! - [`RemoteFileJob`]: the PENDING -> PROCESSING -> ACTIVE|FAILED state machine
//!   for one uploaded video, including polling and guaranteed release

mod job;

pub use job::RemoteFileJob;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{RemoteFileReference, RemoteFileState};

#[derive(Debug, thiserror::Error)]
pub enum RemoteFileError {
    #[error("Video upload failed: {0}")]
    Upload(String),

    #[error("Failed to poll remote file state: {0}")]
    Poll(String),

    #[error("Failed to delete remote file: {0}")]
    Delete(String),

    #[error("Video processing failed with state: {observed_state}")]
    Failed { observed_state: RemoteFileState },

    #[error("Video processing did not finish within {}s", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("Remote file moved from {from} to {to}")]
    UnexpectedTransition {
        from: RemoteFileState,
        to: RemoteFileState,
    },

    #[error("Waiting for remote processing was cancelled")]
    Cancelled,
}

/// The remote service's file-processing subsystem.
#[async_trait]
pub trait RemoteFileBackend: Send + Sync {
    /// Upload raw bytes. The returned reference carries whatever state the
    /// service reports right away.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFileReference, RemoteFileError>;

    /// Fetch the current state of a previously uploaded file.
    async fn get(&self, remote_id: &str) -> Result<RemoteFileReference, RemoteFileError>;

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteFileError>;
}
