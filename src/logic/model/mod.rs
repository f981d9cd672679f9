//! Model Module - Image classification backends
//!
//! The sampler only sees the `ClassifierFactory` / `Classifier` seam.
//! ONNX Runtime is the production backend; tests plug in fakes.

pub mod inference;
pub mod labels;
pub mod onnx;
pub mod preprocess;
pub mod threshold;

// Re-export common types
pub use inference::{Category, Classifications, Classifier, ClassifierFactory};
pub use labels::Labels;
pub use onnx::{OnnxClassifier, OnnxClassifierFactory};
pub use threshold::ScoreFilter;
