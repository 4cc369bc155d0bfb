//! # v2serve
//!
//! KServe V2-style inference server for a fixed-weight softmax classifier.
//!
//! ## Module Structure
//!
//! - `config` - server and model configuration
//! - `error` - startup error types
//! - `http` - axum router and handlers
//! - `metrics` - Prometheus registry and inference instruments
//! - `model` - model identity and the set-once classifier slot
//! - `server` - listener binding and graceful shutdown
//! - `service` - the inference pipeline
//! - `tracing` - logging setup

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod model;
pub mod server;
pub mod service;
pub mod tracing;

pub use config::{ModelConfig, ServerConfig};
pub use error::{Error, Result};
pub use metrics::{InferenceMetrics, Registry};
pub use model::{ModelInfo, ModelSlot};
pub use server::ModelServer;
pub use service::{InferError, InferenceService};
