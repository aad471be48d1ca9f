//! # Quarry Engine
//!
//! An embedded, schema-driven record engine used by the Quarry query layer.
//!
//! The engine keeps encoded records per entity, validates every write
//! against an explicit schema and executes compiled condition plans. It is
//! deliberately small: everything lives in memory and each read sees a
//! consistent view of the store for its whole duration.
//!
//! ## Core Concepts
//!
//! ### Schema
//!
//! A [`Model`] lists [`EntitySchema`]s, each made of [`PropertyDef`]s with a
//! stable numeric id, a semantic [`PropertyType`], an [`IndexKind`] and
//! flags (identity, unique, nullable, transient). Models are built in code or
//! loaded with [`Model::from_json`].
//!
//! ### Records
//!
//! Objects are stored as binary property tables written by a
//! [`RecordWriter`] and read back through a [`RecordReader`], which rejects
//! anything the schema does not describe. Types implementing [`Entity`]
//! provide the encode and decode routines.
//!
//! ### Handles
//!
//! Query builders and compiled queries are engine-side resources referred
//! to by [`Handle`]s. Their number is capped by [`EngineConfig`]; every
//! handle must be released exactly once.
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry_engine::{
//!     Engine, EngineConfig, EntitySchema, Model, PropertyDef, PropertyType,
//! };
//!
//! let model = Model::new().with_entity(EntitySchema::new(
//!     1,
//!     "Event",
//!     vec![
//!         PropertyDef::identity(1, "id"),
//!         PropertyDef::new(2, "device", PropertyType::String),
//!     ],
//! ));
//!
//! let engine = Engine::open(model, EngineConfig::default()).unwrap();
//! let builder = engine.open_builder(1).unwrap();
//! assert_eq!(engine.open_handles(), 1);
//! engine.release(builder);
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod entity_box;
pub mod error;
pub mod schema;
pub mod store;
pub mod value;
pub mod wire;

// Re-export main types at crate root
pub use codec::{encode_entity, Entity, RecordReader, RecordWriter};
pub use config::{ConfigError, DebugFlags, EngineConfig};
pub use engine::{fold_case, Engine, Handle};
pub use entity_box::EntityBox;
pub use error::{DecodeError, Error};
pub use schema::{
    EntitySchema, IndexKind, Model, PropertyDef, PropertyFlags, PropertyType, TypeFamily,
};
pub use value::PropertyValue;
pub use wire::{Operand, OperandKind, Operator};

/// Type aliases for clarity
pub type EntityId = u32;
pub type PropertyId = u16;
pub type ObjectId = u64;
