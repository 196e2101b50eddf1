//! Response array elements.
//!
//! Mutating endpoints answer with a JSON array; each element is either
//! `{"success": {<path>: <value>}}` or `{"error": {...}}`.

use serde_json::{Map, Value};

use crate::error::ApiError;

/// Result of one named field (or one whole operation) of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Success { path: String, value: Value },
    Failure(ApiError),
}

impl FieldOutcome {
    pub fn success(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldOutcome::Success {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FieldOutcome::Success { .. })
    }

    pub fn to_item(&self) -> Value {
        match self {
            FieldOutcome::Success { path, value } => {
                let mut state = Map::new();
                state.insert(path.clone(), value.clone());
                let mut item = Map::new();
                item.insert("success".to_string(), Value::Object(state));
                Value::Object(item)
            }
            FieldOutcome::Failure(err) => err.to_item(),
        }
    }
}

impl From<ApiError> for FieldOutcome {
    fn from(err: ApiError) -> Self {
        FieldOutcome::Failure(err)
    }
}

/// Renders outcomes as the response array.
pub fn to_items(outcomes: &[FieldOutcome]) -> Value {
    Value::Array(outcomes.iter().map(FieldOutcome::to_item).collect())
}
