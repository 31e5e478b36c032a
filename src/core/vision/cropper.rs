//! 中心方形裁剪
//!
//! Cuts a centered square out of the camera frame. The output is always
//! stored top row first, whatever the source row order is, so the
//! classifier sees the same orientation on every frame.

use log::debug;

use super::frame::{Frame, RowOrder, FRAME_CHANNELS};

/// 裁剪结果（方形 RGBA，行 0 为图像顶部）
#[derive(Debug, Clone, Default)]
pub struct CroppedFrame {
    pub side: u32,
    pub data: Vec<u8>,
    /// Frame number of the source frame this crop came from.
    pub source_frame: u64,
}

impl CroppedFrame {
    pub fn width(&self) -> u32 {
        self.side
    }

    pub fn height(&self) -> u32 {
        self.side
    }

    pub fn byte_len(&self) -> usize {
        self.side as usize * self.side as usize * FRAME_CHANNELS
    }

    /// Pixel bytes for the current geometry (the backing buffer may be longer).
    pub fn pixels(&self) -> &[u8] {
        &self.data[..self.byte_len()]
    }
}

/// 裁剪区域（源图像的视觉坐标）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub start_x: u32,
    pub start_y: u32,
    pub side: u32,
}

impl CropRegion {
    /// Centered square of side `floor(width * crop_percent)`, multiplied in
    /// `f32` so presets like 0.35 and 0.7 land on whole pixels.
    ///
    /// The side is clamped to the shorter frame edge: a crop wider than the
    /// frame is tall cannot be read out of the source. When
    /// `width * crop_percent > height` the side is therefore `height`, not
    /// `floor(width * crop_percent)`.
    pub fn centered(width: u32, height: u32, crop_percent: f32) -> Self {
        let requested = (width as f32 * crop_percent).floor() as u32;
        let side = requested.min(width).min(height);

        Self {
            start_x: (width - side) / 2,
            start_y: (height - side) / 2,
            side,
        }
    }
}

pub struct FrameCropper {
    cropped: CroppedFrame,
    has_crop: bool,
    reallocations: u64,
}

impl FrameCropper {
    pub fn new() -> Self {
        Self {
            cropped: CroppedFrame::default(),
            has_crop: false,
            reallocations: 0,
        }
    }

    /// Crop `frame` into the internal buffer.
    ///
    /// An unusable frame (camera not ready, empty crop) leaves the previous
    /// crop in place and returns it, or `None` if nothing was cropped yet.
    pub fn crop(&mut self, frame: &Frame, crop_percent: f32) -> Option<&CroppedFrame> {
        if !frame.is_valid() {
            debug!(
                "Frame #{} not usable ({}x{}, {} bytes), keeping previous crop",
                frame.frame_number,
                frame.width,
                frame.height,
                frame.data.len()
            );
            return self.last();
        }

        let region = CropRegion::centered(frame.width, frame.height, crop_percent);
        if region.side == 0 {
            debug!("Crop of {} at {:.2} is empty, keeping previous crop", frame.width, crop_percent);
            return self.last();
        }

        self.ensure_capacity(region.side);
        self.copy_region(frame, region);
        self.cropped.source_frame = frame.frame_number;
        self.has_crop = true;

        Some(&self.cropped)
    }

    pub fn last(&self) -> Option<&CroppedFrame> {
        if self.has_crop {
            Some(&self.cropped)
        } else {
            None
        }
    }

    /// Capacity of the reusable pixel buffer, in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.cropped.data.len()
    }

    /// How many times the pixel buffer had to grow.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    pub fn reset(&mut self) {
        self.has_crop = false;
    }

    fn ensure_capacity(&mut self, side: u32) {
        let required = side as usize * side as usize * FRAME_CHANNELS;
        if self.cropped.data.len() < required {
            debug!("Growing crop buffer to {}x{}", side, side);
            self.cropped.data.resize(required, 0);
            self.reallocations += 1;
        }
        self.cropped.side = side;
    }

    fn copy_region(&mut self, frame: &Frame, region: CropRegion) {
        let row_bytes = region.side as usize * FRAME_CHANNELS;
        let x_offset = region.start_x as usize * FRAME_CHANNELS;

        for out_row in 0..region.side {
            let visual_row = region.start_y + out_row;
            let buffer_row = match frame.row_order {
                RowOrder::TopDown => visual_row,
                RowOrder::BottomUp => frame.height - 1 - visual_row,
            };

            let src = &frame.buffer_row(buffer_row)[x_offset..x_offset + row_bytes];
            let dst_start = out_row as usize * row_bytes;
            self.cropped.data[dst_start..dst_start + row_bytes].copy_from_slice(src);
        }
    }
}

impl Default for FrameCropper {
    fn default() -> Self {
        Self::new()
    }
}
