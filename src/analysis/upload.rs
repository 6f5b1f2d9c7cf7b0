//! Upload staging
//!
//! Each uploaded video is written to `<upload_dir>/<uuid-v4>-<sanitized name>`
//! so concurrent requests never collide. A [`StagedVideo`] owns its file and
//! removes it on drop if it was not removed explicitly.

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fallback content type when the extension says nothing useful.
const DEFAULT_VIDEO_MIME: &str = "video/mp4";
const MAX_NAME_LEN: usize = 100;

/// Directory where request videos live while they are being analyzed.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a unique path and open it for writing.
    ///
    /// The returned guard already owns the path, so a failed or abandoned
    /// write still cleans up.
    pub async fn create(&self, original_name: &str) -> io::Result<(StagedVideo, tokio::fs::File)> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let safe = sanitize_filename(original_name);
        let path = self.dir.join(format!("{}-{}", Uuid::new_v4(), safe));
        let file = tokio::fs::File::create(&path).await?;
        debug!(path = %path.display(), "Staging upload");

        let video = StagedVideo {
            path,
            mime_type: guess_video_mime(&safe),
            original_name: safe,
            removed: false,
        };
        Ok((video, file))
    }

    /// Stage an in-memory buffer.
    pub async fn stage(&self, original_name: &str, bytes: &[u8]) -> io::Result<StagedVideo> {
        let (video, mut file) = self.create(original_name).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(video)
    }
}

/// A video on local disk for the lifetime of one analysis.
#[derive(Debug)]
pub struct StagedVideo {
    path: PathBuf,
    original_name: String,
    mime_type: String,
    removed: bool,
}

impl StagedVideo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Client filename after sanitizing.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Delete the file now. A file that is already gone is not an error.
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed staged upload");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedVideo {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged upload on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload"),
        }
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`,
/// leading dots are stripped and the result is capped in length.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');

    // Keep the extension when truncating; it drives the MIME guess.
    let capped = if trimmed.len() > MAX_NAME_LEN {
        match trimmed.rfind('.') {
            Some(dot) if trimmed.len() - dot <= 10 => {
                let ext = &trimmed[dot..];
                format!("{}{}", &trimmed[..MAX_NAME_LEN - ext.len()], ext)
            }
            _ => trimmed[..MAX_NAME_LEN].to_string(),
        }
    } else {
        trimmed.to_string()
    };

    if capped.is_empty() {
        "video".to_string()
    } else {
        capped
    }
}

/// Video content type from the file extension.
fn guess_video_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .iter()
        .find(|m| m.type_() == mime_guess::mime::VIDEO)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_VIDEO_MIME.to_string())
}
