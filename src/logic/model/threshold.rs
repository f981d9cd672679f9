//! Score post-processing
//!
//! Turns a raw output vector into ranked categories, honouring the session's
//! score threshold and result cap.

use super::inference::Category;
use super::labels::Labels;

/// Threshold + cap applied to every head
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreFilter {
    pub threshold: f32,
    pub max_results: usize,
}

impl ScoreFilter {
    pub fn new(threshold: f32, max_results: usize) -> Self {
        Self { threshold, max_results }
    }

    /// Rank scores, drop those under the threshold, keep the top `max_results`
    pub fn apply(&self, scores: &[f32], labels: &Labels) -> Vec<Category> {
        let probs = to_probabilities(scores);

        let mut ranked: Vec<(usize, f32)> = probs
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s >= self.threshold)
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(self.max_results);

        ranked
            .into_iter()
            .map(|(index, score)| Category {
                index,
                label: labels.get(index),
                score,
            })
            .collect()
    }
}

/// Pass probabilities through, softmax anything that looks like logits
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    let sum: f32 = scores.iter().sum();
    if in_range && sum <= 1.0 + 1e-3 {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum::<f32>().max(1e-12);
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Labels {
        Labels::from_lines(["cat", "dog", "bird", "fish"])
    }

    #[test]
    fn test_filter_threshold_and_cap() {
        let filter = ScoreFilter::new(0.1, 2);
        let categories = filter.apply(&[0.05, 0.6, 0.25, 0.1], &labels());

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].label, "dog");
        assert_eq!(categories[1].label, "bird");
    }

    #[test]
    fn test_filter_everything_below_threshold() {
        let filter = ScoreFilter::new(0.9, 3);
        assert!(filter.apply(&[0.2, 0.3, 0.4, 0.1], &labels()).is_empty());
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let probs = to_probabilities(&[2.0, 1.0, 0.1]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_probabilities_pass_through() {
        assert_eq!(to_probabilities(&[0.7, 0.2, 0.1]), vec![0.7, 0.2, 0.1]);
    }
}
