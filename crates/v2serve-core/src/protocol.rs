//! KServe V2 request/response schemas.
//!
//! Pure data shapes shared by the inference handler and the metadata
//! endpoint. Structural validation of tensor payloads lives in
//! [`crate::tensor`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tensor element type, as named by the V2 protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Datatype {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Fp16,
    #[default]
    Fp32,
    Fp64,
    Bytes,
}

impl Datatype {
    /// Whether elements of this type decode into a numeric buffer.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Datatype::Bool | Datatype::Bytes)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Datatype::Bool => "BOOL",
            Datatype::Uint8 => "UINT8",
            Datatype::Uint16 => "UINT16",
            Datatype::Uint32 => "UINT32",
            Datatype::Uint64 => "UINT64",
            Datatype::Int8 => "INT8",
            Datatype::Int16 => "INT16",
            Datatype::Int32 => "INT32",
            Datatype::Int64 => "INT64",
            Datatype::Fp16 => "FP16",
            Datatype::Fp32 => "FP32",
            Datatype::Fp64 => "FP64",
            Datatype::Bytes => "BYTES",
        }
    }
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An input tensor as it arrives on the wire.
///
/// `shape` may contain `-1` for an unconstrained dimension. `data` is either
/// a flat sequence or nested to the declared shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<i64>,
    #[serde(default)]
    pub datatype: Datatype,
    pub data: Vec<Value>,
}

/// Body of `POST /v2/models/{name}/infer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub inputs: Vec<NamedTensor>,
}

/// Payload of an output tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputData {
    /// Row-major numeric rows, one per batch entry
    Rows(Vec<Vec<f32>>),
    /// One string per batch entry
    Strings(Vec<String>),
}

/// An output tensor in an inference response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub datatype: Datatype,
    pub data: OutputData,
}

/// Body returned by a successful inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub id: Option<String>,
    pub model_name: String,
    pub model_version: String,
    pub outputs: Vec<OutputTensor>,
}

/// Name, type and shape of a model input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub name: String,
    pub datatype: Datatype,
    pub shape: Vec<i64>,
}

/// Body of `GET /v2/models/{name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub versions: Vec<String>,
    pub platform: String,
    pub inputs: Vec<TensorMetadata>,
    pub outputs: Vec<TensorMetadata>,
}

/// Input tensor name advertised in model metadata.
pub const INPUT_NAME: &str = "input";
/// Output carrying the `[batch, classes]` probability matrix.
pub const PROBABILITIES: &str = "probabilities";
/// Output carrying one class label per batch row.
pub const PREDICTED_CLASS: &str = "predicted_class";
/// Platform string reported in model metadata.
pub const PLATFORM: &str = "rust";

impl ModelMetadata {
    /// Static metadata for a classifier with `feature_count` inputs and
    /// `num_classes` outputs. The batch dimension is reported as `-1`.
    pub fn for_classifier(
        name: &str,
        version: &str,
        feature_count: usize,
        num_classes: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            versions: vec![version.to_string()],
            platform: PLATFORM.to_string(),
            inputs: vec![TensorMetadata {
                name: INPUT_NAME.to_string(),
                datatype: Datatype::Fp32,
                shape: vec![-1, feature_count as i64],
            }],
            outputs: vec![
                TensorMetadata {
                    name: PROBABILITIES.to_string(),
                    datatype: Datatype::Fp32,
                    shape: vec![-1, num_classes as i64],
                },
                TensorMetadata {
                    name: PREDICTED_CLASS.to_string(),
                    datatype: Datatype::Bytes,
                    shape: vec![-1],
                },
            ],
        }
    }
}

/// Error body, `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
