use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use ndarray::Array4;

use super::cropper::CroppedFrame;
use super::error::VisionError;
use crate::core::config::TensorConfig;

/// 分类器输入张量，形状 `[1, H, W, C]`，取值 `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub data: Array4<f32>,
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

pub struct TensorPreprocessor {
    config: TensorConfig,
}

impl TensorPreprocessor {
    pub fn new(config: TensorConfig) -> Result<Self, VisionError> {
        if config.width == 0 || config.height == 0 {
            return Err(VisionError::InvalidTensorConfig(format!(
                "tensor size must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        if !matches!(config.channels, 1 | 3 | 4) {
            return Err(VisionError::InvalidTensorConfig(format!(
                "unsupported channel count {}",
                config.channels
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &TensorConfig {
        &self.config
    }

    /// Bilinear resize to the target size, then channel reduction.
    pub fn to_tensor(&self, cropped: &CroppedFrame) -> Result<InputTensor, VisionError> {
        let source: ImageBuffer<Rgba<u8>, &[u8]> =
            ImageBuffer::from_raw(cropped.side, cropped.side, cropped.pixels()).ok_or_else(
                || VisionError::ShapeMismatch {
                    expected: format!("{} RGBA bytes", cropped.byte_len()),
                    actual: format!("{} bytes", cropped.data.len()),
                },
            )?;

        let (w, h, c) = (self.config.width, self.config.height, self.config.channels);
        let resized = imageops::resize(&source, w, h, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, h as usize, w as usize, c as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let values = pixel.0;
            for ch in 0..c as usize {
                let raw = if c == 1 {
                    luma(values[0], values[1], values[2])
                } else {
                    values[ch] as f32 / 255.0
                };
                let value = if self.config.invert { 1.0 - raw } else { raw };
                tensor[[0, y as usize, x as usize, ch]] = value;
            }
        }

        Ok(InputTensor { data: tensor })
    }
}

fn luma(r: u8, g: u8, b: u8) -> f32 {
    (r as f32 * 0.299 + g as f32 * 0.587 + b as f32 * 0.114) / 255.0
}
