//! ffmpeg-backed decoder.
//!
//! `ffprobe` reports the display geometry of the first video stream, then a
//! long-lived `ffmpeg` child writes `rgb24` raw frames to its stdout, which
//! is read one fixed-size frame at a time.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use super::{DecodeError, FrameSource, VideoDecoder, VideoFrame};
use crate::config::SamplingConfig;

/// Decoder that shells out to the ffmpeg toolchain.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    fn probe(&self, path: &Path) -> Result<Geometry, DecodeError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height:stream_side_data=rotation:stream_tags=rotate",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DecodeError::Spawn {
                program: self.ffprobe.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(DecodeError::Unreadable {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout, path)
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, DecodeError> {
        let geometry = self.probe(path)?;
        debug!(
            path = %path.display(),
            width = geometry.width,
            height = geometry.height,
            "Opening video stream"
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-nostdin", "-v", "error", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                program: self.ffmpeg.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DecodeError::Unreadable {
            path: path.to_path_buf(),
            reason: "ffmpeg stdout was not captured".to_string(),
        })?;

        // Drained on a side thread so a chatty stderr cannot block the frame pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let frame_len = geometry.width as usize * geometry.height as usize * 3;
        Ok(Box::new(FfmpegFrames {
            path: path.to_path_buf(),
            child,
            stdout,
            stderr,
            width: geometry.width,
            height: geometry.height,
            scratch: vec![0u8; frame_len],
            next_index: 0,
            finished: false,
        }))
    }
}

// ============================================================================
// Probe Parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

/// Display geometry of the first video stream.
///
/// ffmpeg auto-rotates on decode, so a 90/270 degree rotation swaps the
/// dimensions of the frames it writes.
fn parse_probe_output(json: &[u8], path: &Path) -> Result<Geometry, DecodeError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| DecodeError::Unreadable {
            path: path.to_path_buf(),
            reason: format!("unparseable ffprobe output: {e}"),
        })?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DecodeError::NoVideoStream(path.to_path_buf()))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(DecodeError::NoVideoStream(path.to_path_buf()));
    };
    if width == 0 || height == 0 {
        return Err(DecodeError::NoVideoStream(path.to_path_buf()));
    }

    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|s| s.rotation)
        .or_else(|| stream.tags.get("rotate").and_then(|r| r.parse::<f64>().ok()))
        .unwrap_or(0.0);

    let quarter_turns = (rotation / 90.0).round() as i64;
    if quarter_turns.rem_euclid(2) == 1 {
        Ok(Geometry {
            width: height,
            height: width,
        })
    } else {
        Ok(Geometry { width, height })
    }
}

// ============================================================================
// Frame Pipe
// ============================================================================

struct FfmpegFrames {
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    scratch: Vec<u8>,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrames {
    /// Read up to one frame into `buf`; returns the bytes filled.
    fn read_into(stdout: &mut ChildStdout, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Read(e)),
            }
        }
        Ok(filled)
    }

    fn advance(&mut self, keep: bool) -> Result<Option<Vec<u8>>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        let frame_len = self.scratch.len();
        let mut owned = if keep { vec![0u8; frame_len] } else { Vec::new() };
        let buf: &mut [u8] = if keep { &mut owned } else { &mut self.scratch };

        let filled = Self::read_into(&mut self.stdout, buf)?;
        if filled == frame_len {
            self.next_index += 1;
            return Ok(Some(owned));
        }

        if filled > 0 {
            warn!(
                path = %self.path.display(),
                bytes = filled,
                "Discarding truncated trailing frame"
            );
        }
        self.finish()?;
        Ok(None)
    }

    /// Reap the child. A failure before the first frame means the file was unreadable.
    fn finish(&mut self) -> Result<(), DecodeError> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        if self.next_index == 0 {
            return Err(DecodeError::Unreadable {
                path: self.path.clone(),
                reason: stderr.trim().to_string(),
            });
        }
        warn!(
            path = %self.path.display(),
            frames = self.next_index,
            %status,
            stderr = %stderr.trim(),
            "ffmpeg exited with an error after decoding frames"
        );
        Ok(())
    }
}

impl FrameSource for FfmpegFrames {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError> {
        let index = self.next_index;
        let Some(bytes) = self.advance(true)? else {
            return Ok(None);
        };
        let image = image::RgbImage::from_raw(self.width, self.height, bytes).ok_or_else(|| {
            DecodeError::Unreadable {
                path: self.path.clone(),
                reason: "frame buffer does not match probed geometry".to_string(),
            }
        })?;
        Ok(Some(VideoFrame { index, image }))
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        Ok(self.advance(false)?.is_some())
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait();
        if let Some(h) = self.stderr.take() {
            let _ = h.join();
        }
    }
}
