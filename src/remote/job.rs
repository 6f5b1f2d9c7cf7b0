//! Remote file job: one uploaded video from upload to deletion.
//!
//! ```text
//! submit ──► PENDING ──► PROCESSING ──► ACTIVE  ──► ReadyFile
//!               │             │
//!               └─────────────┴──────► FAILED
//! ```
//!
//! Terminal states are sticky. `release()` deletes the remote resource and
//! may run only once; a job dropped without release schedules the delete on
//! the current runtime instead.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{RemoteFileBackend, RemoteFileError};
use crate::types::{ReadyFile, RemoteFileReference, RemoteFileState};

pub struct RemoteFileJob {
    backend: Arc<dyn RemoteFileBackend>,
    reference: RemoteFileReference,
    released: bool,
}

impl RemoteFileJob {
    /// Upload `bytes` and start tracking the resulting remote file.
    pub async fn submit(
        backend: Arc<dyn RemoteFileBackend>,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<Self, RemoteFileError> {
        let size = bytes.len();
        let reference = backend.upload(bytes, mime_type, display_name).await?;
        info!(
            remote_id = %reference.remote_id,
            state = %reference.state,
            bytes = size,
            mime_type,
            "Video uploaded to remote file service"
        );
        Ok(Self {
            backend,
            reference,
            released: false,
        })
    }

    pub fn state(&self) -> RemoteFileState {
        self.reference.state
    }

    pub fn reference(&self) -> &RemoteFileReference {
        &self.reference
    }

    /// Refresh the state from the backend.
    ///
    /// Once ACTIVE or FAILED the backend is no longer consulted.
    pub async fn poll(&mut self) -> Result<RemoteFileState, RemoteFileError> {
        let current = self.reference.state;
        if current.is_terminal() {
            return Ok(current);
        }

        let latest = self.backend.get(&self.reference.remote_id).await?;
        if !current.can_transition_to(latest.state) {
            return Err(RemoteFileError::UnexpectedTransition {
                from: current,
                to: latest.state,
            });
        }
        if latest.state != current {
            debug!(
                remote_id = %self.reference.remote_id,
                from = %current,
                to = %latest.state,
                "Remote file state changed"
            );
        }

        self.reference.state = latest.state;
        if !latest.uri.is_empty() {
            self.reference.uri = latest.uri;
        }
        if !latest.mime_type.is_empty() {
            self.reference.mime_type = latest.mime_type;
        }
        Ok(self.reference.state)
    }

    /// Poll every `poll_interval` until the file is ACTIVE.
    ///
    /// Fails with `Failed` on FAILED, `Timeout` once `timeout` has elapsed,
    /// or `Cancelled` as soon as `cancel` fires. The job is not released
    /// on any of these paths; that stays with the caller.
    pub async fn await_ready(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ReadyFile, RemoteFileError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;

        loop {
            match self.reference.state {
                RemoteFileState::Active => {
                    info!(
                        remote_id = %self.reference.remote_id,
                        polls,
                        waited_secs = started.elapsed().as_secs(),
                        "Remote file is ready"
                    );
                    return ReadyFile::from_active(&self.reference).ok_or(
                        RemoteFileError::Failed {
                            observed_state: self.reference.state,
                        },
                    );
                }
                RemoteFileState::Failed => {
                    warn!(remote_id = %self.reference.remote_id, polls, "Remote processing failed");
                    return Err(RemoteFileError::Failed {
                        observed_state: RemoteFileState::Failed,
                    });
                }
                RemoteFileState::Pending | RemoteFileState::Processing => {}
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    remote_id = %self.reference.remote_id,
                    state = %self.reference.state,
                    polls,
                    "Timed out waiting for remote processing"
                );
                return Err(RemoteFileError::Timeout {
                    waited: now - started,
                });
            }

            let wake = (now + poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteFileError::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteFileError::Cancelled),
                polled = self.poll() => { polled?; }
            }
            polls += 1;
        }
    }

    /// Delete the remote file. Consumes the job, so it can only happen once.
    pub async fn release(mut self) -> Result<(), RemoteFileError> {
        self.released = true;
        let result = self.backend.delete(&self.reference.remote_id).await;
        match &result {
            Ok(()) => info!(remote_id = %self.reference.remote_id, "Remote file deleted"),
            Err(e) => warn!(remote_id = %self.reference.remote_id, error = %e, "Remote file delete failed"),
        }
        result
    }
}

impl Drop for RemoteFileJob {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let remote_id = self.reference.remote_id.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(remote_id = %remote_id, "Remote file job dropped outside a runtime; file not deleted");
            return;
        };

        warn!(remote_id = %remote_id, "Remote file job dropped unreleased; deleting in background");
        let backend = Arc::clone(&self.backend);
        handle.spawn(async move {
            if let Err(e) = backend.delete(&remote_id).await {
                warn!(remote_id = %remote_id, error = %e, "Background remote file delete failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend whose `get` replays a script of states; the last one repeats.
    struct ScriptedBackend {
        initial: RemoteFileState,
        script: Mutex<VecDeque<RemoteFileState>>,
        gets: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(initial: RemoteFileState, script: &[RemoteFileState]) -> Arc<Self> {
            Arc::new(Self {
                initial,
                script: Mutex::new(script.iter().copied().collect()),
                gets: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
            })
        }

        fn reference(state: RemoteFileState) -> RemoteFileReference {
            RemoteFileReference {
                remote_id: "files/test-1".to_string(),
                uri: "https://files.invalid/files/test-1".to_string(),
                mime_type: "video/mp4".to_string(),
                state,
            }
        }
    }

    #[async_trait]
    impl RemoteFileBackend for ScriptedBackend {
        async fn upload(
            &self,
            _bytes: Vec<u8>,
            _mime_type: &str,
            _display_name: &str,
        ) -> Result<RemoteFileReference, RemoteFileError> {
            Ok(Self::reference(self.initial))
        }

        async fn get(&self, _remote_id: &str) -> Result<RemoteFileReference, RemoteFileError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let state = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            };
            Ok(Self::reference(state))
        }

        async fn delete(&self, _remote_id: &str) -> Result<(), RemoteFileError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    const INTERVAL: Duration = Duration::from_secs(10);
    const TIMEOUT: Duration = Duration::from_secs(600);

    async fn submit(backend: &Arc<ScriptedBackend>) -> RemoteFileJob {
        RemoteFileJob::submit(backend.clone(), vec![0u8; 16], "video/mp4", "clip.mp4")
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_active_upload_is_ready_without_polling() {
        let backend = ScriptedBackend::new(RemoteFileState::Active, &[RemoteFileState::Active]);
        let mut job = submit(&backend).await;
        let ready = job
            .await_ready(INTERVAL, TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ready.mime_type(), "video/mp4");
        assert_eq!(backend.gets.load(Ordering::SeqCst), 0);
        job.release().await.unwrap();
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_then_active_polls_at_interval() {
        let backend = ScriptedBackend::new(
            RemoteFileState::Processing,
            &[
                RemoteFileState::Processing,
                RemoteFileState::Processing,
                RemoteFileState::Active,
            ],
        );
        let mut job = submit(&backend).await;
        let started = Instant::now();
        job.await_ready(INTERVAL, TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(backend.gets.load(Ordering::SeqCst), 3);
        job.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forever_processing_times_out_at_deadline() {
        let backend = ScriptedBackend::new(RemoteFileState::Processing, &[RemoteFileState::Processing]);
        let mut job = submit(&backend).await;
        let started = Instant::now();
        let err = job
            .await_ready(INTERVAL, TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            RemoteFileError::Timeout { waited } => assert_eq!(waited, TIMEOUT),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(started.elapsed(), TIMEOUT);
        job.release().await.unwrap();
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_state_reports_observed_state() {
        let backend = ScriptedBackend::new(
            RemoteFileState::Processing,
            &[RemoteFileState::Processing, RemoteFileState::Failed],
        );
        let mut job = submit(&backend).await;
        let err = job
            .await_ready(INTERVAL, TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Video processing failed with state: FAILED");
        job.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_is_sticky() {
        let backend = ScriptedBackend::new(
            RemoteFileState::Processing,
            &[RemoteFileState::Failed, RemoteFileState::Active],
        );
        let mut job = submit(&backend).await;
        assert_eq!(job.poll().await.unwrap(), RemoteFileState::Failed);
        assert_eq!(job.poll().await.unwrap(), RemoteFileState::Failed);
        assert_eq!(backend.gets.load(Ordering::SeqCst), 1);
        job.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_backward_transition_is_rejected() {
        let backend = ScriptedBackend::new(RemoteFileState::Processing, &[RemoteFileState::Pending]);
        let mut job = submit(&backend).await;
        let err = job.poll().await.unwrap_err();
        assert!(matches!(
            err,
            RemoteFileError::UnexpectedTransition {
                from: RemoteFileState::Processing,
                to: RemoteFileState::Pending
            }
        ));
        assert_eq!(job.state(), RemoteFileState::Processing);
        job.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_cannot_skip_processing() {
        let backend = ScriptedBackend::new(RemoteFileState::Pending, &[RemoteFileState::Active]);
        let mut job = submit(&backend).await;
        let err = job
            .await_ready(INTERVAL, TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RemoteFileError::UnexpectedTransition {
                from: RemoteFileState::Pending,
                to: RemoteFileState::Active
            }
        ));
        assert_eq!(job.state(), RemoteFileState::Pending);
        job.release().await.unwrap();
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_processing_then_active() {
        let backend = ScriptedBackend::new(
            RemoteFileState::Pending,
            &[RemoteFileState::Processing, RemoteFileState::Active],
        );
        let mut job = submit(&backend).await;
        job.await_ready(INTERVAL, TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(job.state(), RemoteFileState::Active);
        assert_eq!(backend.gets.load(Ordering::SeqCst), 2);
        job.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let backend = ScriptedBackend::new(RemoteFileState::Processing, &[RemoteFileState::Processing]);
        let mut job = submit(&backend).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let err = job.await_ready(INTERVAL, TIMEOUT, &cancel).await.unwrap_err();
        assert!(matches!(err, RemoteFileError::Cancelled));
        assert_eq!(started.elapsed(), Duration::from_secs(25));
        job.release().await.unwrap();
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_without_release_deletes_in_background() {
        let backend = ScriptedBackend::new(RemoteFileState::Processing, &[RemoteFileState::Processing]);
        let job = submit(&backend).await;
        drop(job);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }
}
