//! Sampler Pool
//!
//! Several indexed samplers fed by one shared latest-frame slot. Each
//! sampler keeps its own configuration, classifier and statistics.

use std::sync::Arc;
use serde::Serialize;

use super::config::SessionConfig;
use super::events::ResultSink;
use super::frames::LatestFrameSlot;
use super::model::ClassifierFactory;
use super::sampler::ThrottledSampler;
use super::stats::StatsSnapshot;

/// Per-sampler status line
#[derive(Debug, Clone, Serialize)]
pub struct SamplerStatus {
    pub index: usize,
    pub running: bool,
    pub model: String,
    pub delegate: &'static str,
    pub classifier_ready: bool,
    pub stats: StatsSnapshot,
}

pub struct SamplerPool {
    slot: Arc<LatestFrameSlot>,
    samplers: Vec<Arc<ThrottledSampler>>,
}

impl SamplerPool {
    /// `sink_for(index)` decides where each sampler publishes
    pub fn new(
        instances: usize,
        config: SessionConfig,
        factory: Arc<dyn ClassifierFactory>,
        mut sink_for: impl FnMut(usize) -> Option<Arc<dyn ResultSink>>,
    ) -> Self {
        let slot = Arc::new(LatestFrameSlot::new());
        let samplers = (0..instances.max(1))
            .map(|index| {
                Arc::new(ThrottledSampler::new(
                    index,
                    config.clone(),
                    factory.clone(),
                    slot.clone(),
                    sink_for(index),
                ))
            })
            .collect();

        Self { slot, samplers }
    }

    pub fn slot(&self) -> Arc<LatestFrameSlot> {
        self.slot.clone()
    }

    pub fn samplers(&self) -> &[Arc<ThrottledSampler>] {
        &self.samplers
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn start_all(&self) {
        for sampler in &self.samplers {
            sampler.start();
        }
    }

    pub fn pause_all(&self) {
        for sampler in &self.samplers {
            sampler.pause();
        }
    }

    /// Force every sampler to rebuild from its current configuration
    pub fn clear_all(&self) {
        for sampler in &self.samplers {
            sampler.clear_classifier();
        }
    }

    pub fn status(&self) -> Vec<SamplerStatus> {
        self.samplers
            .iter()
            .map(|s| SamplerStatus {
                index: s.index(),
                running: s.is_running(),
                model: s.current_model_name(),
                delegate: s.current_delegate_name(),
                classifier_ready: s.has_classifier(),
                stats: s.stats(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use image::RgbImage;
    use parking_lot::Mutex;
    use crate::logic::config::Delegate;
    use crate::logic::error::SamplerResult;
    use crate::logic::frames::Frame;
    use crate::logic::model::{Classifications, Classifier};

    struct CountingClassifier(Arc<Mutex<usize>>);

    impl Classifier for CountingClassifier {
        fn classify(&self, _image: &RgbImage) -> SamplerResult<Vec<Classifications>> {
            *self.0.lock() += 1;
            Ok(vec![Classifications::default()])
        }
    }

    struct CountingFactory(Arc<Mutex<usize>>);

    impl ClassifierFactory for CountingFactory {
        fn delegate_supported(&self, _delegate: Delegate) -> bool {
            true
        }

        fn build(&self, _config: &SessionConfig) -> SamplerResult<Arc<dyn Classifier>> {
            Ok(Arc::new(CountingClassifier(self.0.clone())))
        }
    }

    fn pool(instances: usize, calls: Arc<Mutex<usize>>) -> SamplerPool {
        let config = SessionConfig {
            task_period: Duration::from_millis(5),
            ..Default::default()
        };
        SamplerPool::new(instances, config, Arc::new(CountingFactory(calls)), |_| None)
    }

    #[test]
    fn test_indices() {
        let pool = pool(3, Arc::new(Mutex::new(0)));
        assert_eq!(pool.len(), 3);
        let indices: Vec<usize> = pool.samplers().iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_at_least_one_sampler() {
        let pool = pool(0, Arc::new(Mutex::new(0)));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_every_sampler_sees_the_shared_frame() {
        let calls = Arc::new(Mutex::new(0));
        let pool = pool(2, calls.clone());

        pool.slot().publish(Frame::new(RgbImage::new(2, 2), 0));
        pool.start_all();
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.pause_all();

        // Each sampler took the one published frame exactly once
        assert_eq!(*calls.lock(), 2);
        let status = pool.status();
        assert!(status.iter().all(|s| s.stats.execution_count == 1 && !s.running && s.classifier_ready));
    }

    #[tokio::test]
    async fn test_clear_all_drops_classifiers() {
        let pool = pool(2, Arc::new(Mutex::new(0)));
        for sampler in pool.samplers() {
            sampler.process_frame(&Frame::new(RgbImage::new(1, 1), 0)).await;
            assert!(sampler.has_classifier());
        }
        pool.clear_all();
        assert!(pool.status().iter().all(|s| !s.classifier_ready));
    }
}
