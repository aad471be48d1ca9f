//! Error types for the Quarry engine.

use crate::{EntityId, ObjectId, PropertyId};
use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Schema errors
    #[error("entity not found: {0}")]
    UnknownEntity(EntityId),

    #[error("property {property} not found on entity {entity}")]
    UnknownProperty {
        entity: EntityId,
        property: PropertyId,
    },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    // Query compilation errors
    #[error("invalid query plan: {0}")]
    InvalidPlan(String),

    #[error("operand mismatch for property {property}: expected {expected}, got {got}")]
    OperandMismatch {
        property: PropertyId,
        expected: String,
        got: String,
    },

    // Handle errors
    #[error("handle not found: {0}")]
    HandleNotFound(u64),

    #[error("handle {0} is not a {1} handle")]
    WrongHandleKind(u64, &'static str),

    #[error("handle limit reached: at most {max} handles may be open")]
    HandleLimit { max: usize },

    // Write errors
    #[error("record carries id {actual}, expected {expected}")]
    IdMismatch {
        expected: ObjectId,
        actual: ObjectId,
    },

    #[error("unique constraint violated on property {property} by object {id}")]
    UniqueViolation { property: PropertyId, id: ObjectId },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure to read a record against the current schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("record has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("property {0} is not part of the schema")]
    UnknownProperty(PropertyId),

    #[error("property {property} stored as type {stored}, schema declares {declared}")]
    TypeMismatch {
        property: PropertyId,
        stored: u8,
        declared: u8,
    },

    #[error("property {0} appears more than once")]
    DuplicateProperty(PropertyId),

    #[error("transient property {0} must not be persisted")]
    TransientProperty(PropertyId),

    #[error("property {0} holds invalid UTF-8")]
    InvalidUtf8(PropertyId),

    #[error("missing required property {0}")]
    MissingProperty(PropertyId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
