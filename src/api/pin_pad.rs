//! 数字密码输入会话
//!
//! Host-facing facade: the host calls [`DigitPinSession::tick`] once per
//! rendered frame and forwards button presses as [`InputEvent`]s.
//!
//! ```ignore
//! let mut session = DigitPinSession::open(PipelineConfig::from_file("pin.json5")?)?;
//! loop {
//!     session.tick(&camera)?;
//!     if commit_pressed { session.handle(InputEvent::Commit)?; }
//!     if check_pressed { session.handle(InputEvent::Validate)?; }
//! }
//! ```

use log::{debug, error, info};
use serde::Serialize;
use thiserror::Error;

use crate::core::config::{ConfigError, PinConfig, PipelineConfig};
use crate::core::pin::{PinEntryStateMachine, PinError, PinValidationResult};
use crate::core::vision::{
    ClassificationResult, DigitClassifier, EngineStatus, FrameSource, InferenceBackend,
    VisionError,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Pin(#[from] PinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Status serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Discrete host input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Write the current prediction into the next PIN slot.
    Commit,
    /// Check the entered PIN.
    Validate,
    /// Clear the PIN buffer and the last verdict.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Written { slot: usize, digit: u8 },
    NoConfidentDigit,
    BufferFull,
    Validated(PinValidationResult),
    Reset,
}

/// 会话状态快照（宿主调试界面用）
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub prediction: i32,
    pub confidence: f32,
    pub slots: Vec<String>,
    pub verdict: Option<PinValidationResult>,
    pub engine: EngineStatus,
}

pub struct DigitPinSession {
    classifier: DigitClassifier,
    pin: PinEntryStateMachine,
    pin_config: PinConfig,
    current: ClassificationResult,
}

impl DigitPinSession {
    pub fn new(
        config: PipelineConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let classifier = DigitClassifier::new(&config, backend)?;
        Self::assemble(config, classifier)
    }

    /// Create a session around the ONNX model at `config.model_path`.
    pub fn open(config: PipelineConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let classifier = DigitClassifier::load(&config)?;
        Self::assemble(config, classifier)
    }

    fn assemble(config: PipelineConfig, classifier: DigitClassifier) -> Result<Self, SessionError> {
        let pin = PinEntryStateMachine::new(&config.pin.reference_code)?;
        info!(
            "🎬 DigitPinSession: created (crop {:.2}, threshold {:.2})",
            config.crop_percent, config.threshold
        );

        Ok(Self {
            classifier,
            pin,
            pin_config: config.pin,
            current: ClassificationResult::none(),
        })
    }

    /// One pipeline pass on the source's current frame.
    ///
    /// Without a frame the previous prediction is kept. A model whose
    /// output does not fit the pipeline shuts the session down; later ticks
    /// fail with `Disposed`.
    pub fn tick(&mut self, source: &dyn FrameSource) -> Result<ClassificationResult, SessionError> {
        match source.current_frame() {
            Some(frame) => match self.classifier.classify(frame) {
                Ok(result) => self.current = result,
                Err(e @ VisionError::ShapeMismatch { .. }) => {
                    error!("❌ Model does not fit the pipeline, disabling: {}", e);
                    self.shutdown();
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            },
            None => {
                debug!("No camera frame yet, keeping {}", self.current);
            }
        }
        Ok(self.current)
    }

    /// A full buffer is an outcome, not an error; any other PIN error is
    /// returned.
    pub fn handle(&mut self, event: InputEvent) -> Result<SessionOutcome, SessionError> {
        match event {
            InputEvent::Commit => self.commit(),
            InputEvent::Validate => Ok(SessionOutcome::Validated(self.pin.validate())),
            InputEvent::Reset => {
                self.pin.reset();
                Ok(SessionOutcome::Reset)
            }
        }
    }

    fn commit(&mut self) -> Result<SessionOutcome, SessionError> {
        let digit = match self.current.digit {
            Some(digit) => digit,
            None => {
                debug!("Commit ignored, no confident digit");
                return Ok(SessionOutcome::NoConfidentDigit);
            }
        };

        match self.pin.write_digit(i32::from(digit)) {
            Ok(slot) => Ok(SessionOutcome::Written { slot, digit }),
            Err(PinError::BufferFull) => Ok(SessionOutcome::BufferFull),
            Err(e) => Err(e.into()),
        }
    }

    pub fn current(&self) -> ClassificationResult {
        self.current
    }

    pub fn pin(&self) -> &PinEntryStateMachine {
        &self.pin
    }

    /// Debug overlay text, e.g. `prediction: 7`.
    pub fn prediction_text(&self) -> String {
        self.current.to_string()
    }

    /// `correct` / `incorrect` after a validation, `None` before one.
    pub fn verdict_text(&self) -> Option<String> {
        self.pin.verdict().map(|v| v.to_string())
    }

    pub fn slot_texts(&self) -> Vec<String> {
        self.pin
            .slot_texts(&self.pin_config.placeholder, self.pin_config.mask_char)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            prediction: self.current.predicted_digit(),
            confidence: self.current.confidence,
            slots: self.slot_texts(),
            verdict: self.pin.verdict(),
            engine: self.classifier.engine().status(),
        }
    }

    pub fn status_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string(&self.status())?)
    }

    /// Release the inference engine. Later ticks fail with `Disposed`.
    pub fn shutdown(&mut self) {
        self.classifier.dispose();
        self.current = ClassificationResult::none();
    }
}

impl Drop for DigitPinSession {
    fn drop(&mut self) {
        info!("🗑️ DigitPinSession: released");
    }
}
