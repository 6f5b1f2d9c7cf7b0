//! Video decoding seam.
//!
//! - [`VideoDecoder`] opens a staged file and yields a [`FrameSource`]
//! - [`FrameSource`] is a blocking, forward-only cursor over decoded RGB frames
//! - [`FfmpegDecoder`] is the production implementation (ffprobe + ffmpeg pipes)
//!
//! Decoding is synchronous. Callers on the async runtime run it inside
//! `tokio::task::spawn_blocking`.

mod ffmpeg;

pub use ffmpeg::FfmpegDecoder;

use image::RgbImage;
use std::path::{Path, PathBuf};

/// One decoded frame, RGB order.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Zero-based position in the decoded stream
    pub index: u64,
    pub image: RgbImage,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unreadable video file {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("No video stream in {}", .0.display())]
    NoVideoStream(PathBuf),

    #[error("Video stream read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Forward-only cursor over decoded frames. Dropping it releases the decoder.
pub trait FrameSource: Send {
    /// Decode and return the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError>;

    /// Advance past the next frame without materialising it.
    /// Returns `false` at end of stream.
    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        Ok(self.next_frame()?.is_some())
    }
}

pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, DecodeError>;
}
