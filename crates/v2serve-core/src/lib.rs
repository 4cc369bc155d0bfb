//! # v2serve core
//!
//! Framework-free pieces of the inference path:
//! - **protocol**: KServe V2 request, response and metadata schemas
//! - **tensor**: decoding wire tensors into `[rows, features]` buffers
//! - **classifier**: fixed-weight linear classifier with softmax
//!
//! Nothing here does I/O or holds shared mutable state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use v2serve_core::{tensor, Classifier, SeededNormal};
//!
//! let classifier = Classifier::initialize(labels, 4, &SeededNormal::new(42))?;
//! let batch = tensor::decode_request(&request, classifier.feature_count())?;
//! let prediction = classifier.predict(batch.view())?;
//! ```

pub mod classifier;
pub mod protocol;
pub mod tensor;

pub use classifier::{
    Classifier, ClassifierError, FixedWeights, Prediction, SeededNormal, WeightInit,
};
pub use protocol::{
    Datatype, ErrorResponse, InferenceRequest, InferenceResponse, ModelMetadata, NamedTensor,
    OutputData, OutputTensor, TensorMetadata,
};
pub use tensor::DecodeError;
