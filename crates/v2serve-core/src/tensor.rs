//! Tensor decoding.
//!
//! Turns a wire [`NamedTensor`] into a row-major `[rows, features]` buffer.
//! Flat payloads are reshaped by the model's feature count; nested payloads
//! must be rectangular and agree with the declared shape.

use ndarray::Array2;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{InferenceRequest, NamedTensor};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("request has no inputs")]
    NoInputs,

    #[error("tensor '{name}': {reason}")]
    Shape { name: String, reason: String },

    #[error("tensor '{name}': {reason}")]
    Type { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

fn shape_error(name: &str, reason: impl Into<String>) -> DecodeError {
    DecodeError::Shape {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn type_error(name: &str, reason: impl Into<String>) -> DecodeError {
    DecodeError::Type {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Decode the first input of a request.
pub fn decode_request(request: &InferenceRequest, feature_count: usize) -> Result<Array2<f32>> {
    let tensor = request.inputs.first().ok_or(DecodeError::NoInputs)?;
    decode(tensor, feature_count)
}

/// Decode a tensor into a `[rows, feature_count]` buffer.
///
/// A one-dimensional payload of exactly `feature_count` elements becomes a
/// single-row batch.
pub fn decode(tensor: &NamedTensor, feature_count: usize) -> Result<Array2<f32>> {
    let name = tensor.name.as_str();

    if !tensor.datatype.is_numeric() {
        return Err(type_error(
            name,
            format!("datatype {} is not numeric", tensor.datatype),
        ));
    }

    let flat = flatten(name, &tensor.data)?;
    let count = flat.values.len();

    if feature_count == 0 || count == 0 || count % feature_count != 0 {
        return Err(shape_error(
            name,
            format!(
                "{} elements is not a positive multiple of {} features",
                count, feature_count
            ),
        ));
    }

    check_declared_shape(name, &tensor.shape, count)?;

    if flat.dims.len() > 1 {
        check_nested_dims(name, &tensor.shape, &flat.dims)?;
        let inner = flat.dims[flat.dims.len() - 1];
        if inner != feature_count {
            return Err(shape_error(
                name,
                format!(
                    "innermost dimension {} does not match {} features",
                    inner, feature_count
                ),
            ));
        }
    }

    let rows = count / feature_count;
    Array2::from_shape_vec((rows, feature_count), flat.values)
        .map_err(|e| shape_error(name, e.to_string()))
}

/// Element count and structure of a payload.
struct Flattened {
    dims: Vec<usize>,
    values: Vec<f32>,
}

fn flatten(name: &str, data: &[Value]) -> Result<Flattened> {
    let dims = probe_dims(data);
    // `dims` is only a guess until `walk` has seen every sibling.
    let mut values = Vec::new();
    walk(name, data, &dims, 0, &mut values)?;
    Ok(Flattened { dims, values })
}

/// Dimensions implied by following the first element at each depth.
fn probe_dims(data: &[Value]) -> Vec<usize> {
    let mut dims = vec![data.len()];
    let mut current = data.first();
    while let Some(Value::Array(inner)) = current {
        dims.push(inner.len());
        current = inner.first();
    }
    dims
}

fn walk(
    name: &str,
    items: &[Value],
    dims: &[usize],
    depth: usize,
    out: &mut Vec<f32>,
) -> Result<()> {
    if items.len() != dims[depth] {
        return Err(shape_error(
            name,
            format!(
                "ragged data at depth {}: expected {} elements, found {}",
                depth,
                dims[depth],
                items.len()
            ),
        ));
    }

    let leaf = depth + 1 == dims.len();
    for item in items {
        match item {
            Value::Array(inner) if !leaf => walk(name, inner, dims, depth + 1, out)?,
            Value::Array(_) => {
                return Err(shape_error(
                    name,
                    format!("unexpected nested array at depth {}", depth),
                ))
            }
            _ if !leaf => {
                return Err(shape_error(
                    name,
                    format!("expected a nested array at depth {}", depth),
                ))
            }
            scalar => out.push(to_f32(name, scalar, out.len())?),
        }
    }
    Ok(())
}

fn to_f32(name: &str, value: &Value, index: usize) -> Result<f32> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    let Some(number) = number else {
        return Err(type_error(
            name,
            format!("element {} is {}, expected a number", index, kind(value)),
        ));
    };

    let v = number as f32;
    if !v.is_finite() {
        return Err(type_error(
            name,
            format!("element {} ({}) is out of FP32 range", index, number),
        ));
    }
    Ok(v)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A fully specified shape must account for every element.
fn check_declared_shape(name: &str, shape: &[i64], count: usize) -> Result<()> {
    if let Some(bad) = shape.iter().find(|&&d| d < -1) {
        return Err(shape_error(name, format!("invalid dimension {} in shape", bad)));
    }

    let known = shape
        .iter()
        .filter(|&&d| d >= 0)
        .try_fold(1usize, |acc, &d| acc.checked_mul(usize::try_from(d).ok()?))
        .ok_or_else(|| shape_error(name, format!("shape {:?} is too large", shape)))?;
    let wildcard = shape.contains(&-1);

    let consistent = if wildcard {
        known > 0 && count % known == 0
    } else {
        known == count
    };
    if !consistent {
        return Err(shape_error(
            name,
            format!("shape {:?} does not match {} data elements", shape, count),
        ));
    }
    Ok(())
}

fn check_nested_dims(name: &str, shape: &[i64], dims: &[usize]) -> Result<()> {
    let matches = shape.len() == dims.len()
        && shape
            .iter()
            .zip(dims)
            .all(|(&declared, &actual)| declared == -1 || declared as usize == actual);
    if !matches {
        return Err(shape_error(
            name,
            format!("nested data has shape {:?}, declared {:?}", dims, shape),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Datatype;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tensor(shape: &[i64], data: Value) -> NamedTensor {
        NamedTensor {
            name: "input".to_string(),
            shape: shape.to_vec(),
            datatype: Datatype::Fp32,
            data: serde_json::from_value(data).unwrap(),
        }
    }

    #[test]
    fn single_row_is_promoted_to_batch() {
        let batch = decode(&tensor(&[4], json!([5.1, 3.5, 1.4, 0.2])), 4).unwrap();
        assert_eq!(batch.shape(), &[1, 4]);
        assert_eq!(batch[[0, 1]], 3.5);
    }

    #[test]
    fn flat_data_is_reshaped_row_major() {
        let batch = decode(&tensor(&[2, 4], json!([1, 2, 3, 4, 5, 6, 7, 8])), 4).unwrap();
        assert_eq!(batch.shape(), &[2, 4]);
        assert_eq!(batch.row(1).to_vec(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn nested_data_passes_through() {
        let data = json!([
            [5.1, 3.5, 1.4, 0.2],
            [6.7, 3.1, 4.7, 1.5],
            [6.3, 3.3, 6.0, 2.5]
        ]);
        let batch = decode(&tensor(&[3, 4], data), 4).unwrap();
        assert_eq!(batch.shape(), &[3, 4]);
        assert_eq!(batch[[2, 2]], 6.0);
    }

    #[test]
    fn wildcard_batch_dimension_accepted() {
        let batch = decode(&tensor(&[-1, 4], json!([[1, 2, 3, 4], [5, 6, 7, 8]])), 4).unwrap();
        assert_eq!(batch.nrows(), 2);
    }

    #[test]
    fn count_not_multiple_of_features_is_shape_error() {
        let err = decode(&tensor(&[5], json!([1, 2, 3, 4, 5])), 4).unwrap_err();
        assert!(matches!(err, DecodeError::Shape { .. }), "got {:?}", err);
    }

    #[test]
    fn empty_data_is_shape_error() {
        let err = decode(&tensor(&[0, 4], json!([])), 4).unwrap_err();
        assert!(matches!(err, DecodeError::Shape { .. }));
    }

    #[test]
    fn declared_shape_must_match_count() {
        let err = decode(&tensor(&[3, 4], json!([1, 2, 3, 4, 5, 6, 7, 8])), 4).unwrap_err();
        assert!(err.to_string().contains("does not match 8 data elements"));
    }

    #[test]
    fn ragged_nested_data_is_shape_error() {
        let err = decode(&tensor(&[2, 4], json!([[1, 2, 3, 4], [5, 6, 7]])), 4).unwrap_err();
        assert!(matches!(err, DecodeError::Shape { .. }));
    }

    #[test]
    fn nested_inner_dimension_must_match_features() {
        let err = decode(&tensor(&[1, 8], json!([[1, 2, 3, 4, 5, 6, 7, 8]])), 4).unwrap_err();
        assert!(err.to_string().contains("innermost dimension 8"));
    }

    #[test]
    fn string_element_is_type_error() {
        let err = decode(&tensor(&[4], json!([1.0, "x", 2.0, 3.0])), 4).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Type {
                name: "input".to_string(),
                reason: "element 1 is a string, expected a number".to_string(),
            }
        );
    }

    #[test]
    fn bytes_datatype_is_type_error() {
        let mut t = tensor(&[4], json!([1, 2, 3, 4]));
        t.datatype = Datatype::Bytes;
        let err = decode(&t, 4).unwrap_err();
        assert!(matches!(err, DecodeError::Type { .. }));
    }

    #[test]
    fn out_of_range_value_is_type_error() {
        let err = decode(&tensor(&[4], json!([1e300, 0, 0, 0])), 4).unwrap_err();
        assert!(matches!(err, DecodeError::Type { .. }));
    }

    #[test]
    fn ragged_deep_nesting_is_rejected_without_preallocating() {
        // First element nests four levels deep; its siblings are scalars.
        let mut level = json!([1, 2, 3, 4]);
        for _ in 0..4 {
            let mut items = vec![level];
            items.extend((0..999).map(|i| json!(i)));
            level = Value::Array(items);
        }
        let err = decode(&tensor(&[-1, 4], level), 4).unwrap_err();
        assert!(err.to_string().contains("expected a nested array"), "got {}", err);
    }

    #[test]
    fn overflowing_declared_shape_is_shape_error() {
        let err = decode(&tensor(&[1 << 40, 1 << 40, 4], json!([1, 2, 3, 4])), 4).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Shape {
                name: "input".to_string(),
                reason: "shape [1099511627776, 1099511627776, 4] is too large".to_string(),
            }
        );
    }

    #[test]
    fn request_without_inputs_is_rejected() {
        let request = InferenceRequest {
            id: None,
            inputs: vec![],
        };
        assert_eq!(decode_request(&request, 4).unwrap_err(), DecodeError::NoInputs);
    }
}
