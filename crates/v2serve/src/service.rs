//! Inference request handling.
//!
//! [`InferenceService`] owns the model slot and the metric handles and runs
//! the decode → classify → encode pipeline. Every failure comes back as an
//! [`InferError`]; nothing here panics out to the caller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use v2serve_core::protocol::{PREDICTED_CLASS, PROBABILITIES};
use v2serve_core::{
    tensor, Classifier, ClassifierError, Datatype, DecodeError, InferenceRequest,
    InferenceResponse, ModelMetadata, OutputData, OutputTensor, Prediction, WeightInit,
};

use crate::metrics::{InferenceMetrics, MetricsError, Registry, RequestStatus};
use crate::model::{ModelError, ModelInfo, ModelSlot};

#[derive(Error, Debug)]
pub enum InferError {
    #[error("model '{model}' is not ready")]
    NotReady { model: String },

    #[error("invalid request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Classify(#[from] ClassifierError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl InferError {
    /// Malformed or mismatched input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InferError::Body(_) | InferError::Decode(_) | InferError::Classify(_)
        )
    }

    /// Message returned to the client. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            InferError::Internal(_) => "internal inference error".to_string(),
            other => other.to_string(),
        }
    }
}

/// The single-model inference service shared by all HTTP handlers.
#[derive(Debug)]
pub struct InferenceService {
    model: ModelSlot,
    metrics: InferenceMetrics,
}

impl InferenceService {
    /// Register metrics and start in the not-ready state.
    pub fn new(info: ModelInfo, registry: Arc<Registry>) -> Result<Self, MetricsError> {
        let metrics = InferenceMetrics::register(registry)?;
        metrics.set_model_loaded(&info.name, false);
        Ok(Self {
            model: ModelSlot::new(info),
            metrics,
        })
    }

    /// Initialize weights and flip to ready.
    pub fn load_model(&self, init: &dyn WeightInit) -> Result<(), ModelError> {
        self.model.load(init)?;
        let name = &self.model.info().name;
        self.metrics.set_model_loaded(name, true);
        info!("Model '{}' loaded OK", name);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_loaded()
    }

    pub fn model(&self) -> &ModelInfo {
        self.model.info()
    }

    pub fn metadata(&self) -> ModelMetadata {
        self.model.info().metadata()
    }

    pub fn metrics(&self) -> &InferenceMetrics {
        &self.metrics
    }

    /// Handle a raw JSON request body.
    ///
    /// Readiness is checked before the body is parsed; a body that does not
    /// parse counts as a failed request.
    pub fn infer_json(&self, body: &[u8]) -> Result<InferenceResponse, InferError> {
        let classifier = self.ready_classifier()?;
        let _active = self.metrics.track_active();

        let outcome = serde_json::from_slice::<InferenceRequest>(body)
            .map_err(InferError::from)
            .and_then(|request| self.run(classifier, &request));
        self.record(&outcome);
        outcome
    }

    /// Handle an already-parsed request.
    pub fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferError> {
        let classifier = self.ready_classifier()?;
        let _active = self.metrics.track_active();

        let outcome = self.run(classifier, request);
        self.record(&outcome);
        outcome
    }

    fn ready_classifier(&self) -> Result<&Classifier, InferError> {
        self.model.classifier().ok_or_else(|| InferError::NotReady {
            model: self.model.info().name.clone(),
        })
    }

    fn run(
        &self,
        classifier: &Classifier,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferError> {
        let info = self.model.info();
        let started = Instant::now();

        let batch = tensor::decode_request(request, classifier.feature_count())?;
        debug!("Decoded batch of {} rows", batch.nrows());

        let prediction = isolate_panic(|| classifier.predict(batch.view()))?;

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_latency(&info.name, elapsed);

        info!(
            "Inference OK | class={:?} | latency={:.1}ms",
            prediction.predicted_class,
            elapsed * 1000.0
        );

        Ok(encode_response(request.id.clone(), info, prediction))
    }

    fn record(&self, outcome: &Result<InferenceResponse, InferError>) {
        let model = &self.model.info().name;
        match outcome {
            Ok(_) => self
                .metrics
                .increment_request_count(model, RequestStatus::Success),
            Err(e) => {
                self.metrics
                    .increment_request_count(model, RequestStatus::Error);
                if e.is_client_error() {
                    warn!("Inference rejected: {}", e);
                } else {
                    error!("Inference error: {}", e);
                }
            }
        }
    }
}

fn encode_response(
    id: Option<String>,
    info: &ModelInfo,
    prediction: Prediction,
) -> InferenceResponse {
    let (rows, classes) = prediction.probabilities.dim();
    let probabilities = prediction
        .probabilities
        .rows()
        .into_iter()
        .map(|row| row.to_vec())
        .collect();

    InferenceResponse {
        id,
        model_name: info.name.clone(),
        model_version: info.version.clone(),
        outputs: vec![
            OutputTensor {
                name: PROBABILITIES.to_string(),
                shape: vec![rows, classes],
                datatype: Datatype::Fp32,
                data: OutputData::Rows(probabilities),
            },
            OutputTensor {
                name: PREDICTED_CLASS.to_string(),
                shape: vec![rows],
                datatype: Datatype::Bytes,
                data: OutputData::Strings(prediction.predicted_class),
            },
        ],
    }
}

/// Run classifier work, turning a panic into [`InferError::Internal`].
fn isolate_panic<T>(
    work: impl FnOnce() -> Result<T, ClassifierError>,
) -> Result<T, InferError> {
    panic::catch_unwind(AssertUnwindSafe(work))
        .map_err(|payload| {
            InferError::Internal(format!("classifier panicked: {}", panic_message(&*payload)))
        })?
        .map_err(InferError::from)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    }
}
