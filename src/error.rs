use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::schema::{ComparisonMethod, FieldType};
use crate::value::FieldValue;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid schema at `{path}`: {message}")]
pub struct SchemaValidationError {
    pub path: String,
    pub message: String,
}

impl SchemaValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{method} cannot compare `{path}`: {detail}")]
pub struct ComparatorIncompatibleError {
    pub path: String,
    pub method: ComparisonMethod,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend call timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("backend call failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeCoercionWarning {
    pub path: String,
    pub target_type: FieldType,
    pub original: FieldValue,
}

impl fmt::Display for TypeCoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not coerce `{}` to {}; kept original {} value {}",
            self.path,
            self.target_type,
            self.original.kind(),
            self.original
        )
    }
}
