//! Typed access to the raw request parameter map.
//!
//! Every accessor returns `Ok(None)` for an absent (or `null`) key and a
//! [`PointCloudError::Validation`] naming the key when the value has the
//! wrong shape.

use pointcloud::{PointCloudError, PointCloudResult};
use serde_json::{Map, Value};

/// The `params` object of a node request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    map: Map<String, Value>,
}

impl RequestParams {
    pub fn new(map: Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    /// The first key of `required` that is absent, in declaration order.
    pub fn first_missing(&self, required: &[&'static str]) -> Option<&'static str> {
        required.iter().copied().find(|key| self.get(key).is_none())
    }

    pub fn str(&self, key: &str) -> PointCloudResult<Option<&str>> {
        self.get(key)
            .map(|v| v.as_str().ok_or_else(|| wrong_type(key, "a string")))
            .transpose()
    }

    pub fn require_str(&self, key: &str) -> PointCloudResult<&str> {
        self.str(key)?.ok_or_else(|| missing(key))
    }

    pub fn f64(&self, key: &str) -> PointCloudResult<Option<f64>> {
        self.get(key)
            .map(|v| v.as_f64().ok_or_else(|| wrong_type(key, "a number")))
            .transpose()
    }

    pub fn require_f64(&self, key: &str) -> PointCloudResult<f64> {
        self.f64(key)?.ok_or_else(|| missing(key))
    }

    pub fn u64(&self, key: &str) -> PointCloudResult<Option<u64>> {
        self.get(key)
            .map(|v| v.as_u64().ok_or_else(|| wrong_type(key, "a non-negative integer")))
            .transpose()
    }

    pub fn require_u64(&self, key: &str) -> PointCloudResult<u64> {
        self.u64(key)?.ok_or_else(|| missing(key))
    }

    pub fn usize(&self, key: &str) -> PointCloudResult<Option<usize>> {
        self.u64(key)?
            .map(|n| usize::try_from(n).map_err(|_| wrong_type(key, "an integer within range")))
            .transpose()
    }

    pub fn bool(&self, key: &str) -> PointCloudResult<Option<bool>> {
        self.get(key)
            .map(|v| v.as_bool().ok_or_else(|| wrong_type(key, "a boolean")))
            .transpose()
    }

    pub fn object(&self, key: &str) -> PointCloudResult<Option<&Map<String, Value>>> {
        self.get(key)
            .map(|v| v.as_object().ok_or_else(|| wrong_type(key, "an object")))
            .transpose()
    }

    /// A three-element numeric array such as an offset or rotation angles.
    pub fn vec3(&self, key: &str) -> PointCloudResult<Option<[f64; 3]>> {
        self.get(key)
            .map(|v| row3(v).ok_or_else(|| wrong_type(key, "an array of three numbers")))
            .transpose()
    }

    pub fn require_vec3(&self, key: &str) -> PointCloudResult<[f64; 3]> {
        self.vec3(key)?.ok_or_else(|| missing(key))
    }

    /// An N×3 numeric array.
    pub fn point_array(&self, key: &str) -> PointCloudResult<Option<Vec<[f64; 3]>>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let rows = value.as_array().ok_or_else(|| not_n_by_3(key, "value is not an array"))?;
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                row3(row).ok_or_else(|| not_n_by_3(key, &format!("row {i} is not three numbers")))
            })
            .collect::<PointCloudResult<Vec<_>>>()
            .map(Some)
    }
}

fn row3(value: &Value) -> Option<[f64; 3]> {
    match value.as_array()?.as_slice() {
        [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
        _ => None,
    }
}

fn missing(key: &str) -> PointCloudError {
    PointCloudError::validation(format!("Missing required parameter: {key}"))
}

fn wrong_type(key: &str, expected: &str) -> PointCloudError {
    PointCloudError::validation(format!("Parameter '{key}' must be {expected}"))
}

fn not_n_by_3(key: &str, detail: &str) -> PointCloudError {
    PointCloudError::validation_with(
        format!("Parameter '{key}' must be an N×3 array of numbers: {detail}"),
        vec![format!("Pass '{key}' as [[x, y, z], ...]")],
    )
}
