use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error("Inference backend error: {0}")]
    Backend(String),
    #[error("Inference engine already disposed")]
    Disposed,
    #[error("No tensor scheduled")]
    NothingScheduled,
    #[error("Invalid tensor config: {0}")]
    InvalidTensorConfig(String),
}
