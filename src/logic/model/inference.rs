//! Inference seam
//!
//! The sampler never talks to a runtime directly. It asks a
//! `ClassifierFactory` for a handle built from a config snapshot and calls
//! `Classifier::classify` on it, one frame at a time.

use std::sync::Arc;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::logic::config::{Delegate, SessionConfig};
use crate::logic::error::SamplerResult;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// One scored label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

/// Categories produced by one output head, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Classifications {
    pub head_index: usize,
    pub categories: Vec<Category>,
}

// ============================================================================
// TRAITS
// ============================================================================

/// A built classifier. Invoked strictly one frame at a time.
pub trait Classifier: Send + Sync {
    /// Classify an already-rotated frame
    fn classify(&self, image: &RgbImage) -> SamplerResult<Vec<Classifications>>;
}

/// Builds classifiers from a configuration snapshot
pub trait ClassifierFactory: Send + Sync {
    /// Whether `delegate` can run on this machine
    fn delegate_supported(&self, delegate: Delegate) -> bool;

    /// Build a classifier. Called on the blocking pool.
    fn build(&self, config: &SessionConfig) -> SamplerResult<Arc<dyn Classifier>>;
}
