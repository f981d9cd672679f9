//! ONNX Runtime backend
//!
//! Session per classifier. The delegate picks the execution provider:
//! CPU is the default, GPU maps to CUDA, NPU maps to NNAPI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use image::RgbImage;
use parking_lot::Mutex;
use ort::execution_providers::{
    CUDAExecutionProvider, ExecutionProvider, NNAPIExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

use crate::logic::config::{Delegate, SessionConfig};
use crate::logic::error::{SamplerError, SamplerResult};
use super::inference::{Classifications, Classifier, ClassifierFactory};
use super::labels::Labels;
use super::preprocess::{self, Normalization};
use super::threshold::ScoreFilter;

/// Label file looked up next to the models
pub const LABELS_FILE: &str = "labels.txt";

// ============================================================================
// FACTORY
// ============================================================================

pub struct OnnxClassifierFactory {
    model_dir: PathBuf,
    normalization: Normalization,
}

impl OnnxClassifierFactory {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            normalization: Normalization::default(),
        }
    }

    pub fn model_path(&self, config: &SessionConfig) -> PathBuf {
        self.model_dir.join(config.model.file_name())
    }

    fn labels_for(&self, config: &SessionConfig) -> Labels {
        // Per-model labels win over the shared file
        let specific = self.model_dir.join(format!("{}.labels.txt", config.model.stem()));
        let path = if specific.exists() { specific } else { self.model_dir.join(LABELS_FILE) };
        let labels = Labels::load(&path).unwrap_or_else(|e| {
            log::warn!("Failed to read labels {:?}: {}", path, e);
            Labels::default()
        });
        if !labels.is_empty() {
            log::debug!("{} labels from {:?}", labels.len(), path);
        }
        labels
    }
}

impl ClassifierFactory for OnnxClassifierFactory {
    fn delegate_supported(&self, delegate: Delegate) -> bool {
        let available = match delegate {
            Delegate::Cpu => return true,
            Delegate::Gpu => CUDAExecutionProvider::default().is_available(),
            Delegate::Npu => NNAPIExecutionProvider::default().is_available(),
        };
        available.unwrap_or_else(|e| {
            log::debug!("{} availability check failed: {}", delegate, e);
            false
        })
    }

    fn build(&self, config: &SessionConfig) -> SamplerResult<Arc<dyn Classifier>> {
        let path = self.model_path(config);
        let session = load_session(&path, config)?;

        log::info!(
            "Classifier ready: {} on {} ({} threads)",
            config.model,
            config.delegate,
            config.num_threads
        );

        Ok(Arc::new(OnnxClassifier {
            session: Mutex::new(session),
            labels: self.labels_for(config),
            filter: ScoreFilter::new(config.threshold, config.max_results),
            input_size: config.model.input_size(),
            normalization: self.normalization,
        }))
    }
}

fn load_session(path: &Path, config: &SessionConfig) -> SamplerResult<Session> {
    log::info!("Loading ONNX model from: {:?}", path);

    if !path.exists() {
        return Err(SamplerError::ModelNotFound(path.to_path_buf()));
    }

    let mut builder = Session::builder()
        .map_err(|e| SamplerError::ClassifierInit(format!("session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| SamplerError::ClassifierInit(format!("optimization: {}", e)))?
        .with_intra_threads(config.num_threads)
        .map_err(|e| SamplerError::ClassifierInit(format!("threads: {}", e)))?;

    builder = match config.delegate {
        Delegate::Cpu => builder,
        Delegate::Gpu => builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| SamplerError::ClassifierInit(format!("GPU delegate: {}", e)))?,
        Delegate::Npu => builder
            .with_execution_providers([NNAPIExecutionProvider::default().build()])
            .map_err(|e| SamplerError::ClassifierInit(format!("NPU delegate: {}", e)))?,
    };

    builder
        .commit_from_file(path)
        .map_err(|e| SamplerError::ClassifierInit(format!("load model: {}", e)))
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct OnnxClassifier {
    // Session::run needs &mut
    session: Mutex<Session>,
    labels: Labels,
    filter: ScoreFilter,
    input_size: u32,
    normalization: Normalization,
}

impl Classifier for OnnxClassifier {
    fn classify(&self, image: &RgbImage) -> SamplerResult<Vec<Classifications>> {
        let input = preprocess::to_tensor(image, self.input_size, self.normalization);

        let mut session = self.session.lock();

        let output_name = session.outputs.first()
            .map(|o| o.name.clone())
            .ok_or_else(|| SamplerError::Inference("No output defined".to_string()))?;

        let input_tensor = Value::from_array(input)
            .map_err(|e| SamplerError::Inference(format!("Tensor error: {}", e)))?;

        let outputs = session.run(ort::inputs![input_tensor])
            .map_err(|e| SamplerError::Inference(format!("Run failed: {}", e)))?;

        let output = outputs.get(&output_name)
            .ok_or_else(|| SamplerError::Inference("No output".to_string()))?;

        let (_, scores) = output.try_extract_tensor::<f32>()
            .map_err(|e| SamplerError::Inference(format!("Extract error: {}", e)))?;

        Ok(vec![Classifications {
            head_index: 0,
            categories: self.filter.apply(scores, &self.labels),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cpu_always_supported() {
        let factory = OnnxClassifierFactory::new(".");
        assert!(factory.delegate_supported(Delegate::Cpu));
    }

    #[test]
    fn test_model_path_follows_choice() {
        let factory = OnnxClassifierFactory::new("/models");
        let config = SessionConfig {
            model: crate::logic::config::ModelChoice::EfficientNetLite0,
            ..Default::default()
        };
        assert_eq!(factory.model_path(&config), PathBuf::from("/models/efficientnet-lite0.onnx"));
    }

    #[test]
    fn test_missing_model_is_reported() {
        let dir = tempdir().unwrap();
        let factory = OnnxClassifierFactory::new(dir.path());
        match factory.build(&SessionConfig::default()) {
            Err(SamplerError::ModelNotFound(path)) => {
                assert!(path.ends_with("mobilenetv1.onnx"));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("build should fail without a model file"),
        }
    }
}
