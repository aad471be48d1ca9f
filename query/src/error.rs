//! Error types for the query layer.

use quarry_engine::{DecodeError, Error as EngineError, PropertyId};
use thiserror::Error;

/// All possible errors from building, running and rebinding queries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// A condition names an entity or property the schema cannot serve.
    #[error("schema error: {0}")]
    Schema(String),

    /// The builder was already built or closed.
    #[error("invalid builder state: {0}")]
    BuilderState(&'static str),

    #[error("query has {0} conditions, at most {max} are supported", max = u16::MAX)]
    TooManyConditions(usize),

    #[error("parameter mismatch on property {property}: {detail}")]
    TypeMismatch { property: PropertyId, detail: String },

    #[error("engine error: {0}")]
    Engine(#[source] EngineError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("query is closed")]
    Closed,
}

impl From<EngineError> for QueryError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Decode(e) => QueryError::Decode(e),
            other => QueryError::Engine(other),
        }
    }
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
