//! Model identity and the set-once loaded classifier.

use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;
use v2serve_core::{Classifier, ClassifierError, ModelMetadata, WeightInit};

use crate::config::ModelConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("model '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("failed to load model: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Static description of the served model, known before weights exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub class_labels: Vec<String>,
    pub feature_count: usize,
}

impl ModelInfo {
    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata::for_classifier(
            &self.name,
            &self.version,
            self.feature_count,
            self.class_labels.len(),
        )
    }
}

impl From<&ModelConfig> for ModelInfo {
    fn from(config: &ModelConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
            class_labels: config.class_labels.clone(),
            feature_count: config.feature_count,
        }
    }
}

/// Holds the classifier once it has been initialized.
///
/// Empty means not ready. Loading happens at most once and cannot be
/// undone; readers never take a lock.
#[derive(Debug)]
pub struct ModelSlot {
    info: ModelInfo,
    classifier: OnceLock<Classifier>,
}

impl ModelSlot {
    pub fn new(info: ModelInfo) -> Self {
        Self {
            info,
            classifier: OnceLock::new(),
        }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.get().is_some()
    }

    pub fn classifier(&self) -> Option<&Classifier> {
        self.classifier.get()
    }

    /// Build the classifier with `init` and publish it.
    pub fn load(&self, init: &dyn WeightInit) -> Result<(), ModelError> {
        if self.is_loaded() {
            return Err(ModelError::AlreadyLoaded(self.info.name.clone()));
        }

        info!(
            "Loading model '{}' {} with {} weights",
            self.info.name,
            self.info.version,
            init.describe()
        );
        let classifier = Classifier::initialize(
            self.info.class_labels.clone(),
            self.info.feature_count,
            init,
        )?;

        self.classifier
            .set(classifier)
            .map_err(|_| ModelError::AlreadyLoaded(self.info.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2serve_core::{FixedWeights, SeededNormal};

    fn slot() -> ModelSlot {
        ModelSlot::new(ModelInfo::from(&ModelConfig::default()))
    }

    #[test]
    fn starts_not_loaded() {
        let slot = slot();
        assert!(!slot.is_loaded());
        assert!(slot.classifier().is_none());
    }

    #[test]
    fn load_publishes_classifier_once() {
        let slot = slot();
        slot.load(&SeededNormal::new(1)).unwrap();
        assert!(slot.is_loaded());
        assert_eq!(slot.classifier().unwrap().feature_count(), 4);

        let err = slot.load(&SeededNormal::new(2)).unwrap_err();
        assert_eq!(err, ModelError::AlreadyLoaded("iris-classifier".to_string()));
    }

    #[test]
    fn failed_load_leaves_slot_empty() {
        let slot = slot();
        let bad = FixedWeights::new(ndarray::Array2::zeros((2, 2)));
        assert!(matches!(slot.load(&bad), Err(ModelError::Classifier(_))));
        assert!(!slot.is_loaded());
    }

    #[test]
    fn metadata_reflects_model_shape() {
        let meta = slot().info().metadata();
        assert_eq!(meta.name, "iris-classifier");
        assert_eq!(meta.inputs[0].shape, vec![-1, 4]);
        assert_eq!(meta.outputs[0].shape, vec![-1, 3]);
    }
}
