//! Error types for the sampling pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type SamplerResult<T> = Result<T, SamplerError>;

#[derive(Debug, Error)]
pub enum SamplerError {
    /// Model file missing on disk
    #[error("model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Session / delegate setup failed
    #[error("classifier initialization failed: {0}")]
    ClassifierInit(String),

    /// A single inference call failed
    #[error("inference failed: {0}")]
    Inference(String),

    /// Frame could not be decoded into RGB
    #[error("frame decode failed: {0}")]
    FrameDecode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
