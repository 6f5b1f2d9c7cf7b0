//! Remote file types: RemoteFileState, RemoteFileReference, ReadyFile

use serde::{Deserialize, Serialize};

/// Processing state of a video uploaded to the remote file service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFileState {
    Pending,
    Processing,
    Active,
    Failed,
}

impl RemoteFileState {
    /// ACTIVE and FAILED never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RemoteFileState::Active | RemoteFileState::Failed)
    }

    /// Whether `self -> next` is a legal move of the state machine.
    ///
    /// PENDING may only start processing, PROCESSING only moves forward,
    /// terminal states only repeat. A file uploaded already ACTIVE never
    /// goes through this check.
    pub fn can_transition_to(self, next: RemoteFileState) -> bool {
        use RemoteFileState::{Active, Failed, Pending, Processing};
        match (self, next) {
            (Pending, Pending | Processing) => true,
            (Pending, Active | Failed) => false,
            (Processing, Processing | Active | Failed) => true,
            (Processing, Pending) => false,
            (Active, Active) | (Failed, Failed) => true,
            (Active | Failed, _) => false,
        }
    }
}

impl std::fmt::Display for RemoteFileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFileState::Pending => write!(f, "PENDING"),
            RemoteFileState::Processing => write!(f, "PROCESSING"),
            RemoteFileState::Active => write!(f, "ACTIVE"),
            RemoteFileState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Handle to a video held by the remote file service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileReference {
    /// Opaque resource name, e.g. `files/abc123`
    pub remote_id: String,
    /// URI the reasoning service uses to address the file
    pub uri: String,
    pub mime_type: String,
    pub state: RemoteFileState,
}

/// A remote file that has reached ACTIVE.
///
/// Only the file job can construct one, so any reference handed to the
/// reasoning service is guaranteed ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFile(RemoteFileReference);

impl ReadyFile {
    pub(crate) fn from_active(reference: &RemoteFileReference) -> Option<Self> {
        (reference.state == RemoteFileState::Active).then(|| Self(reference.clone()))
    }

    pub fn reference(&self) -> &RemoteFileReference {
        &self.0
    }

    pub fn uri(&self) -> &str {
        &self.0.uri
    }

    pub fn mime_type(&self) -> &str {
        &self.0.mime_type
    }
}
