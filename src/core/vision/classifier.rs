use std::fmt;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use super::cropper::FrameCropper;
use super::error::VisionError;
use super::frame::Frame;
use super::inference::{
    InferenceBackend, InferenceEngine, OnnxBackend, ProbabilityVector,
};
use super::preprocess::TensorPreprocessor;
use crate::core::config::PipelineConfig;

/// Digit value reported when no class clears the confidence threshold.
pub const NO_DIGIT: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub digit: Option<u8>,
    pub confidence: f32,
}

impl ClassificationResult {
    pub fn none() -> Self {
        Self {
            digit: None,
            confidence: 0.0,
        }
    }

    /// Apply the confidence gate to a probability vector.
    pub fn from_probabilities(probabilities: &ProbabilityVector, threshold: f32) -> Self {
        let (index, confidence) = probabilities.argmax();
        let digit = if confidence > threshold {
            Some(index as u8)
        } else {
            None
        };
        Self { digit, confidence }
    }

    /// Digit as an integer, [`NO_DIGIT`] when nothing was confident enough.
    pub fn predicted_digit(&self) -> i32 {
        self.digit.map(i32::from).unwrap_or(NO_DIGIT)
    }
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prediction: {}", self.predicted_digit())
    }
}

/// 数字分类器：裁剪 → 预处理 → 推理 → 置信度门限
pub struct DigitClassifier {
    cropper: FrameCropper,
    preprocessor: TensorPreprocessor,
    engine: InferenceEngine,
    crop_percent: f32,
    threshold: f32,
    last_result: ClassificationResult,
}

impl DigitClassifier {
    pub fn new(
        config: &PipelineConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<Self, VisionError> {
        let preprocessor = TensorPreprocessor::new(config.tensor.clone())?;
        let engine = InferenceEngine::new(backend, config.tensor.input_shape())
            .with_slow_threshold(Duration::from_millis(config.slow_inference_warn_ms));

        Ok(Self {
            cropper: FrameCropper::new(),
            preprocessor,
            engine,
            crop_percent: config.crop_percent,
            threshold: config.threshold,
            last_result: ClassificationResult::none(),
        })
    }

    /// Build with the ONNX model at `config.model_path`.
    pub fn load(config: &PipelineConfig) -> Result<Self, VisionError> {
        let backend = OnnxBackend::from_file(&config.model_path, config.tensor.input_shape())?;
        Self::new(config, Box::new(backend))
    }

    /// Classify the digit in the center of `frame`.
    ///
    /// An unusable frame with nothing cropped before returns the previous
    /// result unchanged. Engine errors are returned to the caller.
    pub fn classify(&mut self, frame: &Frame) -> Result<ClassificationResult, VisionError> {
        let cropped = match self.cropper.crop(frame, self.crop_percent) {
            Some(cropped) => cropped,
            None => {
                debug!("No crop available, keeping {}", self.last_result);
                return Ok(self.last_result);
            }
        };

        let tensor = self.preprocessor.to_tensor(cropped)?;
        self.engine.schedule(&tensor)?;
        let probabilities = self.engine.peek_output()?;

        let result = ClassificationResult::from_probabilities(probabilities, self.threshold);
        debug!(
            "Frame #{}: {} ({:.3})",
            frame.frame_number, result, result.confidence
        );

        self.last_result = result;
        Ok(result)
    }

    pub fn last_result(&self) -> ClassificationResult {
        self.last_result
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut InferenceEngine {
        &mut self.engine
    }

    pub fn dispose(&mut self) {
        self.engine.dispose();
        self.cropper.reset();
        self.last_result = ClassificationResult::none();
    }
}
