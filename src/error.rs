//! Error type shared by streams, pipelines, puppets and the property accessor.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// An operation was appended to a pipeline that already has its terminal operation.
    #[error("only one terminal operation allowed; \"{0}\" has already been set")]
    IllegalPipelineState(&'static str),

    /// A recorded method call was replayed against a target that does not expose it.
    #[error("method {type_name}::{method} does not exist")]
    NoSuchMethod { type_name: String, method: String },

    #[error("operation not supported: {0}")]
    UnsupportedOperation(&'static str),

    #[error("property \"{0}\" cannot be read")]
    PropertyUnreadable(String),

    #[error("{operation}: expected {expected}, found {found}")]
    TypeMismatch {
        operation: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("{0}: all elements should be iterable")]
    NotIterable(&'static str),

    #[error("no value present")]
    NoValue,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Failure reported by a user supplied callback.
    #[error("{0}")]
    Callback(String),
}

impl StreamError {
    pub fn type_mismatch(
        operation: &'static str,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        StreamError::TypeMismatch {
            operation,
            expected,
            found: found.into(),
        }
    }

    pub fn callback(message: impl Into<String>) -> Self {
        StreamError::Callback(message.into())
    }
}
