//! Linear softmax classifier.
//!
//! A fixed `[features, classes]` weight matrix, a numerically stable softmax
//! and first-occurrence argmax. Weight initialization is pluggable through
//! [`WeightInit`] so a real model backend can replace the random matrix
//! without touching callers.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("dimension mismatch: model expects {expected} features, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("classifier needs at least one class label")]
    EmptyLabels,

    #[error("weight matrix is {found:?}, expected {expected:?}")]
    WeightShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Strategy producing a `[feature_count, num_classes]` weight matrix.
pub trait WeightInit: Send + Sync {
    fn init(&self, feature_count: usize, num_classes: usize) -> Result<Array2<f32>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Standard-normal weights from a seeded generator.
///
/// The same seed always yields the same matrix.
#[derive(Debug, Clone, Copy)]
pub struct SeededNormal {
    seed: u64,
}

impl SeededNormal {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl WeightInit for SeededNormal {
    fn init(&self, feature_count: usize, num_classes: usize) -> Result<Array2<f32>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(Array2::from_shape_simple_fn(
            (feature_count, num_classes),
            || rng.sample::<f32, _>(StandardNormal),
        ))
    }

    fn describe(&self) -> String {
        format!("seeded normal (seed={})", self.seed)
    }
}

/// An explicit weight matrix.
#[derive(Debug, Clone)]
pub struct FixedWeights {
    weights: Array2<f32>,
}

impl FixedWeights {
    pub fn new(weights: Array2<f32>) -> Self {
        Self { weights }
    }
}

impl WeightInit for FixedWeights {
    fn init(&self, feature_count: usize, num_classes: usize) -> Result<Array2<f32>> {
        if self.weights.dim() != (feature_count, num_classes) {
            return Err(ClassifierError::WeightShape {
                expected: (feature_count, num_classes),
                found: self.weights.dim(),
            });
        }
        Ok(self.weights.clone())
    }

    fn describe(&self) -> String {
        let (rows, cols) = self.weights.dim();
        format!("fixed {}x{} matrix", rows, cols)
    }
}

/// Output of [`Classifier::predict`], one entry per batch row.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// `[rows, classes]`, each row sums to 1
    pub probabilities: Array2<f32>,
    pub predicted_class: Vec<String>,
    pub confidence: Vec<f32>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.predicted_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted_class.is_empty()
    }
}

/// Immutable linear classifier. Safe to share across threads without locking.
///
/// Logits and softmax run in `f64` so any finite FP32 input stays finite;
/// only the final probabilities are narrowed to `f32`.
#[derive(Debug, Clone)]
pub struct Classifier {
    labels: Vec<String>,
    weights: Array2<f64>,
}

impl Classifier {
    /// Build from labels and a `[features, labels.len()]` weight matrix.
    pub fn new(labels: Vec<String>, weights: Array2<f32>) -> Result<Self> {
        if labels.is_empty() {
            return Err(ClassifierError::EmptyLabels);
        }
        if weights.ncols() != labels.len() {
            return Err(ClassifierError::WeightShape {
                expected: (weights.nrows(), labels.len()),
                found: weights.dim(),
            });
        }
        Ok(Self {
            labels,
            weights: weights.mapv(f64::from),
        })
    }

    /// Build by asking `init` for the weight matrix.
    pub fn initialize(
        labels: Vec<String>,
        feature_count: usize,
        init: &dyn WeightInit,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(ClassifierError::EmptyLabels);
        }
        let weights = init.init(feature_count, labels.len())?;
        Self::new(labels, weights)
    }

    pub fn feature_count(&self) -> usize {
        self.weights.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Classify a `[rows, features]` batch.
    pub fn predict(&self, batch: ArrayView2<'_, f32>) -> Result<Prediction> {
        if batch.ncols() != self.feature_count() {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.feature_count(),
                found: batch.ncols(),
            });
        }

        let mut logits = batch.mapv(f64::from).dot(&self.weights);
        for row in logits.axis_iter_mut(Axis(0)) {
            softmax_in_place(row);
        }
        let probabilities = logits.mapv(|p| p as f32);

        let mut predicted_class = Vec::with_capacity(probabilities.nrows());
        let mut confidence = Vec::with_capacity(probabilities.nrows());
        for row in probabilities.rows() {
            let (index, p) = argmax(row);
            predicted_class.push(self.labels[index].clone());
            confidence.push(p);
        }

        Ok(Prediction {
            probabilities,
            predicted_class,
            confidence,
        })
    }
}

/// Softmax over one row of logits. The row max is subtracted first so
/// `exp` never overflows.
pub fn softmax_in_place(mut row: ArrayViewMut1<'_, f64>) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    row.mapv_inplace(|x| (x - max).exp());
    let sum = row.sum();
    row.mapv_inplace(|x| x / sum);
}

/// Index and value of the largest element; ties go to the lowest index.
pub fn argmax(row: ArrayView1<'_, f32>) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, &v) in row.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn iris_labels() -> Vec<String> {
        ["setosa", "versicolor", "virginica"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn seeded() -> Classifier {
        Classifier::initialize(iris_labels(), 4, &SeededNormal::new(42)).unwrap()
    }

    #[test]
    fn probabilities_sum_to_one() {
        let prediction = seeded().predict(array![[5.1f32, 3.5, 1.4, 0.2]].view()).unwrap();
        let sum: f32 = prediction.probabilities.row(0).sum();
        assert!((sum - 1.0).abs() < 1e-3, "sum was {}", sum);
        assert_eq!(prediction.probabilities.shape(), &[1, 3]);
    }

    #[test]
    fn batch_yields_one_prediction_per_row() {
        let batch = array![
            [5.1f32, 3.5, 1.4, 0.2],
            [6.7, 3.1, 4.7, 1.5],
            [6.3, 3.3, 6.0, 2.5]
        ];
        let prediction = seeded().predict(batch.view()).unwrap();
        assert_eq!(prediction.probabilities.nrows(), 3);
        assert_eq!(prediction.len(), 3);
        assert_eq!(prediction.confidence.len(), 3);
    }

    #[test]
    fn predicted_class_matches_argmax() {
        let classifier = seeded();
        let batch = array![[5.1f32, 3.5, 1.4, 0.2], [-2.0, 7.5, 0.3, 9.0]];
        let prediction = classifier.predict(batch.view()).unwrap();
        for (n, label) in prediction.predicted_class.iter().enumerate() {
            let index = classifier.labels().iter().position(|l| l == label).unwrap();
            let (expected, p) = argmax(prediction.probabilities.row(n));
            assert_eq!(index, expected);
            assert_eq!(prediction.confidence[n], p);
        }
    }

    #[test]
    fn large_logits_do_not_overflow() {
        let weights = array![[1000.0f32, 0.0], [0.0, 1000.0]];
        let classifier = Classifier::new(vec!["a".into(), "b".into()], weights).unwrap();
        let prediction = classifier.predict(array![[90.0f32, 89.0]].view()).unwrap();
        assert!(prediction.probabilities.iter().all(|p| p.is_finite()));
        assert_eq!(prediction.predicted_class, vec!["a"]);
    }

    #[test]
    fn fp32_extremes_stay_finite() {
        let weights = array![
            [10.0f32, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, -1.0]
        ];
        let classifier = Classifier::new(iris_labels(), weights).unwrap();
        assert_eq!(classifier.num_classes(), 3);

        let batch = array![[3.0e38f32, 0.0, 0.0, f32::MAX], [f32::MIN, 0.0, 0.0, 0.0]];
        let prediction = classifier.predict(batch.view()).unwrap();
        assert!(prediction.probabilities.iter().all(|p| p.is_finite()));
        assert_eq!(prediction.predicted_class, vec!["setosa", "versicolor"]);
        for row in prediction.probabilities.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let weights = Array2::zeros((4, 3));
        let classifier = Classifier::initialize(iris_labels(), 4, &FixedWeights::new(weights))
            .unwrap();
        let prediction = classifier.predict(array![[1.0f32, 2.0, 3.0, 4.0]].view()).unwrap();
        assert_eq!(prediction.predicted_class, vec!["setosa"]);
        assert!((prediction.confidence[0] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn wrong_feature_count_is_dimension_mismatch() {
        let err = seeded().predict(array![[1.0f32, 2.0, 3.0]].view()).unwrap_err();
        assert_eq!(
            err,
            ClassifierError::DimensionMismatch {
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn seeded_weights_are_deterministic() {
        let a = SeededNormal::new(7).init(4, 3).unwrap();
        let b = SeededNormal::new(7).init(4, 3).unwrap();
        let c = SeededNormal::new(8).init(4, 3).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fixed_weights_must_match_model_shape() {
        let init = FixedWeights::new(Array2::zeros((3, 3)));
        let err = Classifier::initialize(iris_labels(), 4, &init).unwrap_err();
        assert!(matches!(err, ClassifierError::WeightShape { .. }));
    }

    #[test]
    fn empty_labels_rejected() {
        let err = Classifier::new(vec![], Array2::zeros((4, 0))).unwrap_err();
        assert_eq!(err, ClassifierError::EmptyLabels);
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let mut a = Array1::from(vec![1.0f64, 2.0, 3.0]);
        let mut b = Array1::from(vec![101.0f64, 102.0, 103.0]);
        softmax_in_place(a.view_mut());
        softmax_in_place(b.view_mut());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
