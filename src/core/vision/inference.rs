//! Inference Engine - ONNX Runtime Integration
//!
//! The engine owns one backend (the compiled model plus its execution
//! resources) and appends a softmax stage to whatever raw scores the backend
//! produces. At most one scheduled tensor is outstanding at a time.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;
use serde::Serialize;

use super::error::VisionError;
use super::preprocess::InputTensor;

/// Digits 0-9.
pub const NUM_CLASSES: usize = 10;

/// Class probabilities after the softmax stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbabilityVector([f32; NUM_CLASSES]);

impl ProbabilityVector {
    pub fn new(probabilities: [f32; NUM_CLASSES]) -> Self {
        Self(probabilities)
    }

    /// Numerically stable softmax over raw class scores.
    pub fn softmax(logits: &[f32]) -> Result<Self, VisionError> {
        if logits.len() != NUM_CLASSES {
            return Err(VisionError::ShapeMismatch {
                expected: format!("{} class scores", NUM_CLASSES),
                actual: format!("{} values", logits.len()),
            });
        }

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut out = [0.0f32; NUM_CLASSES];
        let mut sum = 0.0f32;
        for (dst, &logit) in out.iter_mut().zip(logits) {
            *dst = (logit - max).exp();
            sum += *dst;
        }
        if sum > 0.0 {
            out.iter_mut().for_each(|p| *p /= sum);
        }

        Ok(Self(out))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Index and value of the highest score; the lowest index wins ties.
    pub fn argmax(&self) -> (usize, f32) {
        let mut best = 0;
        for i in 1..NUM_CLASSES {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        (best, self.0[best])
    }
}

/// 推理后端（ONNX Runtime、固定输出等）
pub trait InferenceBackend {
    fn name(&self) -> &str;

    /// Forward pass returning raw class scores.
    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>, VisionError>;

    /// Release execution resources ahead of drop.
    fn release(&mut self) -> Result<(), VisionError> {
        Ok(())
    }
}

/// ONNX Runtime session holding the digit model
pub struct OnnxBackend {
    session: Session,
    output_name: String,
    model_name: String,
}

impl OnnxBackend {
    /// Load a model whose first input must accept `input_shape` (`[1, H, W, C]`).
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        input_shape: [usize; 4],
    ) -> Result<Self, VisionError> {
        let path = path.as_ref();
        info!("🔧 Loading ONNX model from: {}", path.display());

        if !path.exists() {
            error!("❌ Model not found: {}", path.display());
            return Err(VisionError::ModelNotFound(path.display().to_string()));
        }

        let session = Self::builder()?.commit_from_file(path).map_err(|e| {
            error!("❌ Failed to load model: {}", e);
            VisionError::ModelLoad(format!("Failed to load model: {}", e))
        })?;

        Self::from_session(session, path.display().to_string(), input_shape)
    }

    pub fn from_bytes(model_bytes: &[u8], input_shape: [usize; 4]) -> Result<Self, VisionError> {
        info!("🔧 Loading ONNX model from memory ({} bytes)", model_bytes.len());

        let session = Self::builder()?.commit_from_memory(model_bytes).map_err(|e| {
            error!("❌ Failed to load model from memory: {}", e);
            VisionError::ModelLoad(format!("Load from memory error: {}", e))
        })?;

        Self::from_session(session, "<memory>".to_string(), input_shape)
    }

    fn builder() -> Result<SessionBuilder, VisionError> {
        let num_threads = num_cpus::get().min(4);
        debug!("Using {} threads for ONNX Runtime", num_threads);

        Session::builder()
            .map_err(|e| VisionError::ModelLoad(format!("Session builder error: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::ModelLoad(format!("Optimization error: {}", e)))?
            .with_intra_threads(num_threads)
            .map_err(|e| VisionError::ModelLoad(format!("Thread config error: {}", e)))
    }

    fn from_session(
        session: Session,
        model_name: String,
        input_shape: [usize; 4],
    ) -> Result<Self, VisionError> {
        let input = session
            .inputs
            .first()
            .ok_or_else(|| VisionError::ModelLoad("model declares no inputs".to_string()))?;
        let declared: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.iter().copied().collect())
            .ok_or_else(|| {
                VisionError::ModelLoad(format!("input '{}' is not a tensor", input.name))
            })?;
        check_input_dims(&declared, input_shape).map_err(|e| {
            error!("❌ Model input '{}' rejected: {}", input.name, e);
            e
        })?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| VisionError::ModelLoad("model declares no outputs".to_string()))?;

        info!("✅ ONNX model loaded: {} (output '{}')", model_name, output_name);
        Ok(Self {
            session,
            output_name,
            model_name,
        })
    }
}

/// Compare a model's declared input dims with the configured `[1, H, W, C]`.
/// Negative (dynamic) dims match any size.
pub fn check_input_dims(declared: &[i64], expected: [usize; 4]) -> Result<(), VisionError> {
    let matches = declared.len() == expected.len()
        && declared
            .iter()
            .zip(expected.iter())
            .all(|(&dim, &want)| dim < 0 || dim as usize == want);

    if matches {
        Ok(())
    } else {
        Err(VisionError::ShapeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", declared),
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn run(&mut self, input: &InputTensor) -> Result<Vec<f32>, VisionError> {
        let input_tensor = Value::from_array(input.data.clone())
            .map_err(|e| VisionError::Backend(format!("Tensor error: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| VisionError::Backend(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| VisionError::Backend(format!("Missing output '{}'", self.output_name)))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Backend(format!("Extract error: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl Drop for OnnxBackend {
    fn drop(&mut self) {
        info!("🗑️ OnnxBackend: releasing session for {}", self.model_name);
    }
}

/// Backend that always returns the same raw scores.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    scores: Vec<f32>,
    runs: u64,
}

impl StaticBackend {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores, runs: 0 }
    }

    /// Scores whose softmax reproduces `probabilities` (when they sum to 1).
    pub fn from_probabilities(probabilities: &[f32]) -> Self {
        Self::new(probabilities.iter().map(|p| p.max(1e-12).ln()).collect())
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }
}

impl InferenceBackend for StaticBackend {
    fn name(&self) -> &str {
        "static"
    }

    fn run(&mut self, _input: &InputTensor) -> Result<Vec<f32>, VisionError> {
        self.runs += 1;
        Ok(self.scores.clone())
    }
}

/// Engine status for host UI
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub backend: String,
    pub disposed: bool,
    pub inference_count: u64,
    pub avg_latency_ms: f32,
}

pub struct InferenceEngine {
    backend: Option<Box<dyn InferenceBackend>>,
    input_shape: [usize; 4],
    output: Option<ProbabilityVector>,
    inference_count: u64,
    total_latency: Duration,
    slow_threshold: Duration,
}

impl InferenceEngine {
    /// Wrap a backend that accepts tensors of `input_shape` (`[1, H, W, C]`).
    pub fn new(backend: Box<dyn InferenceBackend>, input_shape: [usize; 4]) -> Self {
        info!(
            "🔧 InferenceEngine: {} with input {:?} (+softmax)",
            backend.name(),
            input_shape
        );
        Self {
            backend: Some(backend),
            input_shape,
            output: None,
            inference_count: 0,
            total_latency: Duration::ZERO,
            slow_threshold: Duration::from_millis(250),
        }
    }

    pub fn load<P: AsRef<Path>>(model_path: P, input_shape: [usize; 4]) -> Result<Self, VisionError> {
        let backend = OnnxBackend::from_file(model_path, input_shape)?;
        Ok(Self::new(Box::new(backend), input_shape))
    }

    /// Inference slower than this is logged as a warning.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Run one forward pass. Replaces any output not yet read.
    pub fn schedule(&mut self, tensor: &InputTensor) -> Result<(), VisionError> {
        self.output = None;
        let backend = self.backend.as_mut().ok_or(VisionError::Disposed)?;

        if tensor.shape() != &self.input_shape[..] {
            error!(
                "❌ Input tensor {:?} does not match model input {:?}",
                tensor.shape(),
                self.input_shape
            );
            return Err(VisionError::ShapeMismatch {
                expected: format!("{:?}", self.input_shape),
                actual: format!("{:?}", tensor.shape()),
            });
        }

        let start = Instant::now();
        let raw = backend.run(tensor)?;
        let elapsed = start.elapsed();

        self.inference_count += 1;
        self.total_latency += elapsed;
        if elapsed > self.slow_threshold {
            warn!(
                "🐢 Inference took {:.1}ms (threshold {}ms)",
                elapsed.as_secs_f32() * 1000.0,
                self.slow_threshold.as_millis()
            );
        }

        let probabilities = ProbabilityVector::softmax(&raw).map_err(|e| {
            error!("❌ Model output does not match digit classes: {}", e);
            e
        })?;
        debug!("Inference #{}: {:?}", self.inference_count, probabilities.as_slice());

        self.output = Some(probabilities);
        Ok(())
    }

    /// Output of the last scheduled tensor.
    pub fn peek_output(&self) -> Result<&ProbabilityVector, VisionError> {
        if self.backend.is_none() {
            return Err(VisionError::Disposed);
        }
        self.output.as_ref().ok_or(VisionError::NothingScheduled)
    }

    /// Swap in a new backend, releasing the current one first.
    pub fn reload(&mut self, backend: Box<dyn InferenceBackend>) {
        self.dispose();
        info!("🔄 InferenceEngine: reloaded with {}", backend.name());
        self.backend = Some(backend);
    }

    pub fn dispose(&mut self) {
        self.output = None;
        if let Some(mut backend) = self.backend.take() {
            let name = backend.name().to_string();
            info!("🗑️ InferenceEngine: releasing {}", name);
            if let Err(e) = backend.release() {
                warn!("⚠️ Failed to release backend {}: {}", name, e);
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    pub fn status(&self) -> EngineStatus {
        let avg_latency_ms = if self.inference_count > 0 {
            self.total_latency.as_secs_f32() * 1000.0 / self.inference_count as f32
        } else {
            0.0
        };

        EngineStatus {
            backend: self
                .backend
                .as_ref()
                .map(|b| b.name().to_string())
                .unwrap_or_else(|| "None".to_string()),
            disposed: self.is_disposed(),
            inference_count: self.inference_count,
            avg_latency_ms,
        }
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use std::cell::Cell;
    use std::rc::Rc;

    const SHAPE: [usize; 4] = [1, 28, 28, 1];

    fn tensor() -> InputTensor {
        InputTensor {
            data: Array4::zeros((1, 28, 28, 1)),
        }
    }

    struct TrackedBackend {
        released: Rc<Cell<u32>>,
        fail_release: bool,
    }

    impl InferenceBackend for TrackedBackend {
        fn name(&self) -> &str {
            "tracked"
        }

        fn run(&mut self, _input: &InputTensor) -> Result<Vec<f32>, VisionError> {
            Ok(vec![0.0; NUM_CLASSES])
        }

        fn release(&mut self) -> Result<(), VisionError> {
            self.released.set(self.released.get() + 1);
            if self.fail_release {
                Err(VisionError::Backend("device lost".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn tracked(fail_release: bool) -> (Box<dyn InferenceBackend>, Rc<Cell<u32>>) {
        let released = Rc::new(Cell::new(0));
        let backend = TrackedBackend {
            released: released.clone(),
            fail_release,
        };
        (Box::new(backend), released)
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let logits = [1.0, 2.0, 3.0, 0.5, -1.0, 0.0, 4.0, 2.5, 1.5, -3.0];
        let probs = ProbabilityVector::softmax(&logits).unwrap();

        let sum: f32 = probs.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.as_slice().iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(probs.argmax().0, 6);
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let mut logits = [1000.0f32; NUM_CLASSES];
        logits[3] = 1010.0;
        let probs = ProbabilityVector::softmax(&logits).unwrap();

        assert!(probs.as_slice().iter().all(|p| p.is_finite()));
        assert_eq!(probs.argmax().0, 3);
    }

    #[test]
    fn test_softmax_wrong_length() {
        let err = ProbabilityVector::softmax(&[0.1; 5]).unwrap_err();
        assert!(matches!(err, VisionError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_argmax_first_index_wins_ties() {
        let mut p = [0.0f32; NUM_CLASSES];
        p[2] = 0.4;
        p[5] = 0.4;
        assert_eq!(ProbabilityVector::new(p).argmax(), (2, 0.4));
        assert_eq!(ProbabilityVector::new([0.1; NUM_CLASSES]).argmax().0, 0);
    }

    #[test]
    fn test_static_backend_roundtrips_probabilities() {
        let p = [0.005, 0.005, 0.005, 0.005, 0.01, 0.01, 0.01, 0.94, 0.005, 0.005];
        let mut engine = InferenceEngine::new(Box::new(StaticBackend::from_probabilities(&p)), SHAPE);

        engine.schedule(&tensor()).unwrap();
        let out = engine.peek_output().unwrap();
        for (got, want) in out.as_slice().iter().zip(p.iter()) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn test_peek_before_schedule() {
        let engine = InferenceEngine::new(Box::new(StaticBackend::new(vec![0.0; 10])), SHAPE);
        assert!(matches!(engine.peek_output(), Err(VisionError::NothingScheduled)));
    }

    #[test]
    fn test_input_shape_mismatch() {
        let mut engine = InferenceEngine::new(Box::new(StaticBackend::new(vec![0.0; 10])), SHAPE);
        let wrong = InputTensor {
            data: Array4::zeros((1, 32, 32, 1)),
        };

        let err = engine.schedule(&wrong).unwrap_err();
        assert!(matches!(err, VisionError::ShapeMismatch { .. }));
        assert!(engine.peek_output().is_err());
    }

    #[test]
    fn test_output_shape_mismatch() {
        let mut engine = InferenceEngine::new(Box::new(StaticBackend::new(vec![0.0; 12])), SHAPE);
        let err = engine.schedule(&tensor()).unwrap_err();
        assert!(matches!(err, VisionError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_dispose_then_use_fails_cleanly() {
        let (backend, released) = tracked(false);
        let mut engine = InferenceEngine::new(backend, SHAPE);
        engine.schedule(&tensor()).unwrap();

        engine.dispose();
        assert_eq!(released.get(), 1);
        assert!(engine.is_disposed());
        assert!(matches!(engine.schedule(&tensor()), Err(VisionError::Disposed)));
        assert!(matches!(engine.peek_output(), Err(VisionError::Disposed)));

        engine.dispose();
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_drop_releases_backend() {
        let (backend, released) = tracked(false);
        {
            let _engine = InferenceEngine::new(backend, SHAPE);
        }
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_release_failure_does_not_block() {
        let (backend, released) = tracked(true);
        let mut engine = InferenceEngine::new(backend, SHAPE);
        engine.dispose();

        assert_eq!(released.get(), 1);
        assert!(engine.is_disposed());
    }

    #[test]
    fn test_reload_releases_previous() {
        let (first, first_released) = tracked(false);
        let (second, second_released) = tracked(false);
        let mut engine = InferenceEngine::new(first, SHAPE);

        engine.reload(second);
        assert_eq!(first_released.get(), 1);
        assert_eq!(second_released.get(), 0);
        assert!(engine.schedule(&tensor()).is_ok());
    }

    #[test]
    fn test_status_tracks_inferences() {
        let mut engine = InferenceEngine::new(Box::new(StaticBackend::new(vec![0.0; 10])), SHAPE);
        engine.schedule(&tensor()).unwrap();
        engine.schedule(&tensor()).unwrap();

        let status = engine.status();
        assert_eq!(status.inference_count, 2);
        assert_eq!(status.backend, "static");
        assert!(!status.disposed);
    }

    #[test]
    fn test_input_dims_accept_nhwc() {
        assert!(check_input_dims(&[1, 28, 28, 1], SHAPE).is_ok());
        assert!(check_input_dims(&[-1, 28, 28, 1], SHAPE).is_ok());
    }

    #[test]
    fn test_input_dims_reject_nchw() {
        let err = check_input_dims(&[1, 1, 28, 28], SHAPE).unwrap_err();
        assert!(matches!(err, VisionError::ShapeMismatch { .. }));
        assert!(check_input_dims(&[1, 784], SHAPE).is_err());
        assert!(check_input_dims(&[1, 28, 28, 3], SHAPE).is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let err = InferenceEngine::load("/nonexistent/mnist.onnx", SHAPE).err().unwrap();
        assert!(matches!(err, VisionError::ModelNotFound(_)));
    }
}
