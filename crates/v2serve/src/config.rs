//! Server and model configuration.

use std::net::SocketAddr;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL_NAME: &str = "iris-classifier";
pub const DEFAULT_MODEL_VERSION: &str = "v1.0.0";
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CLASS_LABELS: [&str; 3] = ["setosa", "versicolor", "virginica"];
pub const DEFAULT_FEATURE_COUNT: usize = 4;

/// Served model configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model name reported in responses, metadata and metric labels
    pub name: String,
    /// Model version reported in responses and metadata
    pub version: String,
    /// Seed for the random weight matrix
    pub seed: u64,
    /// Output class labels, in logit order
    pub class_labels: Vec<String>,
    /// Number of input features per row
    pub feature_count: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            version: DEFAULT_MODEL_VERSION.to_string(),
            seed: DEFAULT_SEED,
            class_labels: DEFAULT_CLASS_LABELS.iter().map(|s| s.to_string()).collect(),
            feature_count: DEFAULT_FEATURE_COUNT,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Listen address
    pub address: SocketAddr,
    pub model: ModelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            model: ModelConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.name.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".to_string()));
        }
        if model.version.trim().is_empty() {
            return Err(Error::Config("model version must not be empty".to_string()));
        }
        if model.class_labels.is_empty() {
            return Err(Error::Config("at least one class label is required".to_string()));
        }
        if model.feature_count == 0 {
            return Err(Error::Config("feature count must be positive".to_string()));
        }
        Ok(())
    }
}
