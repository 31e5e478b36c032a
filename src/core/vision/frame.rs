use std::path::Path;

use log::{debug, info};

use super::error::VisionError;

/// Bytes per pixel of every frame handed to the pipeline (RGBA8).
pub const FRAME_CHANNELS: usize = 4;

/// 像素行在缓冲区中的排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Row 0 is the top of the visual image.
    #[default]
    TopDown,
    /// Row 0 is the bottom of the visual image (GPU read-back convention).
    BottomUp,
}

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub row_order: RowOrder,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            row_order: RowOrder::TopDown,
            frame_number,
        }
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// A frame is usable once it has non-zero dimensions and a buffer
    /// large enough for them.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= self.pixel_count() * FRAME_CHANNELS
    }

    /// Byte slice of one buffer row (not a visual row, see [`RowOrder`]).
    pub fn buffer_row(&self, row: u32) -> &[u8] {
        let stride = self.width as usize * FRAME_CHANNELS;
        let start = row as usize * stride;
        &self.data[start..start + stride]
    }
}

/// 相机帧来源（由宿主实现）
pub trait FrameSource {
    /// Latest frame, or `None` while the camera has not produced one yet.
    fn current_frame(&self) -> Option<&Frame>;
}

/// Holds whatever frame the host pushed last.
#[derive(Debug, Default)]
pub struct LatestFrameSource {
    frame: Option<Frame>,
}

impl LatestFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    pub fn clear(&mut self) {
        self.frame = None;
    }
}

impl FrameSource for LatestFrameSource {
    fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}

/// 静态图片帧来源，用于启动自检和离线调试
#[derive(Debug, Clone)]
pub struct StillImageSource {
    frame: Frame,
}

impl StillImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VisionError> {
        let path = path.as_ref();
        info!("🖼️ Loading still image from: {}", path.display());

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Still image decoded: {}x{}", width, height);

        Ok(Self {
            frame: Frame::new(width, height, rgba.into_raw(), 0),
        })
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillImageSource {
    fn current_frame(&self) -> Option<&Frame> {
        Some(&self.frame)
    }
}
