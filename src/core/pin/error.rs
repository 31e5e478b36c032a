use thiserror::Error;

#[derive(Debug, Error)]
pub enum PinError {
    #[error("PIN buffer is full")]
    BufferFull,
    #[error("Invalid reference code: {0}")]
    InvalidReference(String),
}
