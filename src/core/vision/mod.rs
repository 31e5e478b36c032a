//! 数字识别视觉流水线
//!
//! 每帧流程：
//! 1. 中心方形裁剪 - 统一输出行序，复用像素缓冲
//! 2. 张量预处理 - 缩放到 28x28 并转灰度
//! 3. 推理 - 模型原始输出后接 softmax
//! 4. 置信度门限 - 低于门限返回 -1

pub mod classifier;
pub mod cropper;
pub mod error;
pub mod frame;
pub mod inference;
pub mod preprocess;

pub use classifier::{ClassificationResult, DigitClassifier, NO_DIGIT};
pub use cropper::{CropRegion, CroppedFrame, FrameCropper};
pub use error::VisionError;
pub use frame::{Frame, FrameSource, LatestFrameSource, RowOrder, StillImageSource};
pub use inference::{
    EngineStatus, InferenceBackend, InferenceEngine, OnnxBackend, ProbabilityVector,
    StaticBackend, NUM_CLASSES,
};
pub use preprocess::{InputTensor, TensorPreprocessor};
