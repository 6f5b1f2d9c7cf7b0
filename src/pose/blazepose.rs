//! BlazePose full-body landmark model on ONNX Runtime.
//!
//! Input: `[1, 256, 256, 3]` float RGB in 0..1, letterboxed with black bars.
//! Outputs used:
//! - 195 floats: 39 points x (x, y, z, visibility logit, presence logit) in
//!   input pixels; the first 33 are the body keypoints
//! - 1 float: pose-presence logit
//!
//! Other model heads (heatmap, segmentation, world landmarks) are ignored.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::PathBuf;
use tracing::info;

use super::{PoseDetection, PoseError, PoseEstimator, PoseModel};
use crate::config::SamplingConfig;
use crate::types::{Landmark, BLAZEPOSE_KEYPOINT_COUNT};

const INPUT_SIZE: u32 = 256;
const MODEL_POINTS: usize = 39;
const VALUES_PER_POINT: usize = 5;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn load_err(e: impl std::fmt::Display) -> PoseError {
    PoseError::ModelLoad(e.to_string())
}

fn inference_err(e: impl std::fmt::Display) -> PoseError {
    PoseError::Inference(e.to_string())
}

// ============================================================================
// Model Factory
// ============================================================================

#[derive(Debug, Clone)]
pub struct BlazePoseModel {
    model_path: PathBuf,
    intra_threads: usize,
}

impl BlazePoseModel {
    pub fn new(model_path: impl Into<PathBuf>, intra_threads: usize) -> Self {
        Self {
            model_path: model_path.into(),
            intra_threads: intra_threads.max(1),
        }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(&config.model_path, config.intra_threads)
    }
}

impl PoseModel for BlazePoseModel {
    fn load(&self) -> Result<Box<dyn PoseEstimator>, PoseError> {
        if !self.model_path.exists() {
            return Err(PoseError::Unavailable(format!(
                "model file {} not found",
                self.model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(self.intra_threads)
            .map_err(load_err)?
            .commit_from_file(&self.model_path)
            .map_err(load_err)?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| PoseError::ModelLoad("model has no inputs".to_string()))?;
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        info!(
            path = %self.model_path.display(),
            input = %input_name,
            outputs = output_names.len(),
            "Pose model session loaded"
        );

        Ok(Box::new(BlazePoseEstimator {
            session,
            input_name,
            output_names,
        }))
    }
}

// ============================================================================
// Letterbox
// ============================================================================

/// Mapping from the square model input back to the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    frame_w: f32,
    frame_h: f32,
}

impl Letterbox {
    /// Input-pixel coordinates to normalized frame coordinates.
    fn to_frame(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        (
            (x - self.pad_x) / self.scale / self.frame_w,
            (y - self.pad_y) / self.scale / self.frame_h,
            z / self.scale / self.frame_w,
        )
    }
}

/// Resize preserving aspect ratio, center on a black square, scale to 0..1 NHWC.
fn letterbox(frame: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (w, h) = frame.dimensions();
    let side = INPUT_SIZE as f32;
    let scale = (side / w as f32).min(side / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let pad_x = (INPUT_SIZE - new_w) / 2;
    let pad_y = (INPUT_SIZE - new_h) / 2;

    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);
    let mut input = Array4::<f32>::zeros((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (row, col) = ((y + pad_y) as usize, (x + pad_x) as usize);
        for c in 0..3 {
            input[[0, row, col, c]] = f32::from(pixel[c]) / 255.0;
        }
    }

    (
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            frame_w: w as f32,
            frame_h: h as f32,
        },
    )
}

/// Decode the 195-float landmark head into 33 normalized body keypoints.
fn decode_landmarks(raw: &[f32], letterbox: &Letterbox) -> Vec<Landmark> {
    raw.chunks_exact(VALUES_PER_POINT)
        .take(BLAZEPOSE_KEYPOINT_COUNT)
        .map(|p| {
            let (x, y, z) = letterbox.to_frame(p[0], p[1], p[2]);
            Landmark::new(x, y, z, sigmoid(p[3]))
        })
        .collect()
}

// ============================================================================
// Estimator
// ============================================================================

struct BlazePoseEstimator {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
}

impl PoseEstimator for BlazePoseEstimator {
    fn estimate(&mut self, frame: &RgbImage) -> Result<Option<PoseDetection>, PoseError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }

        let (input, letterbox) = letterbox(frame);
        let tensor = TensorRef::from_array_view(input.view()).map_err(inference_err)?;
        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => tensor])
            .map_err(inference_err)?;

        let mut raw_landmarks: Option<Vec<f32>> = None;
        let mut presence_logit: Option<f32> = None;
        for name in &self.output_names {
            let array = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .map_err(inference_err)?;
            match array.len() {
                n if n == MODEL_POINTS * VALUES_PER_POINT => {
                    raw_landmarks = Some(array.iter().copied().collect());
                }
                1 => presence_logit = array.iter().next().copied(),
                _ => {}
            }
        }

        let raw = raw_landmarks.ok_or_else(|| PoseError::ShapeMismatch {
            expected: format!("an output with {} values", MODEL_POINTS * VALUES_PER_POINT),
            got: format!("{} outputs without one", self.output_names.len()),
        })?;
        let presence = presence_logit.map(sigmoid).ok_or_else(|| PoseError::ShapeMismatch {
            expected: "a scalar pose-presence output".to_string(),
            got: format!("{} outputs without one", self.output_names.len()),
        })?;

        Ok(Some(PoseDetection {
            presence,
            landmarks: decode_landmarks(&raw, &letterbox),
        }))
    }
}
