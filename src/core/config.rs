//! 流水线配置
//!
//! Loaded from JSON5 so hand-edited config files may carry comments.

use std::path::Path;

use log::info;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::core::pin::PIN_LENGTH;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] json5::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TensorConfig {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    /// Map intensity `v` to `1 - v` (for models trained on light strokes on dark).
    pub invert: bool,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            width: 28,
            height: 28,
            channels: 1,
            invert: false,
        }
    }
}

impl TensorConfig {
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, self.channels as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub reference_code: String,
    /// Text shown for a slot that holds no digit.
    pub placeholder: String,
    /// Shown instead of the digit for filled slots, when set.
    pub mask_char: Option<char>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            reference_code: "1234".to_string(),
            placeholder: "-".to_string(),
            mask_char: None,
        }
    }
}

impl PinConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pattern = Regex::new(&format!(r"^[0-9]{{{}}}$", PIN_LENGTH))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if !pattern.is_match(&self.reference_code) {
            return Err(ConfigError::Invalid(format!(
                "reference code must be {} digits",
                PIN_LENGTH
            )));
        }
        if self.placeholder.is_empty() {
            return Err(ConfigError::Invalid("placeholder must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model_path: String,
    /// Side of the centered square crop, as a fraction of frame width.
    pub crop_percent: f32,
    /// Predictions at or below this probability are reported as no digit.
    pub threshold: f32,
    pub tensor: TensorConfig,
    pub pin: PinConfig,
    pub slow_inference_warn_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: "models/mnist.onnx".to_string(),
            crop_percent: 0.5,
            threshold: 0.9,
            tensor: TensorConfig::default(),
            pin: PinConfig::default(),
            slow_inference_warn_ms: 250,
        }
    }
}

impl PipelineConfig {
    /// Digit held close to the headset camera.
    pub fn for_close_range() -> Self {
        Self {
            crop_percent: 0.35,
            ..Default::default()
        }
    }

    /// Digit further away, filling less of the frame.
    pub fn for_far_range() -> Self {
        Self {
            crop_percent: 0.7,
            ..Default::default()
        }
    }

    pub fn from_json5_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("📄 Loading pipeline config from: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.crop_percent > 0.0 && self.crop_percent <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "crop_percent must be in (0, 1], got {}",
                self.crop_percent
            )));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid(format!(
                "threshold must be in [0, 1), got {}",
                self.threshold
            )));
        }
        if self.tensor.width == 0 || self.tensor.height == 0 {
            return Err(ConfigError::Invalid("tensor size must be non-zero".to_string()));
        }
        if !matches!(self.tensor.channels, 1 | 3 | 4) {
            return Err(ConfigError::Invalid(format!(
                "tensor channels must be 1, 3 or 4, got {}",
                self.tensor.channels
            )));
        }
        self.pin.validate()
    }
}
