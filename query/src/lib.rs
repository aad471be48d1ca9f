//! # Quarry
//!
//! Typed queries over the Quarry embedded engine.
//!
//! A [`QueryBuilder`] collects a conjunction of typed conditions over the
//! properties of one entity, checking each against the entity schema. Building
//! compiles the conditions into the engine's plan format and yields a
//! [`Query`], which can be executed repeatedly and have its operands rebound
//! without being rebuilt. Results come back as typed entities through the
//! [`Materializer`] or as raw records.
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry::{
//!     DecodeError, Engine, EngineConfig, Entity, EntityBox, EntitySchema, Model, ObjectId,
//!     PropertyDef, PropertyType, QueryBuilder, RecordReader, RecordWriter,
//! };
//!
//! #[derive(Debug, Default)]
//! struct Event {
//!     id: ObjectId,
//!     device: String,
//! }
//!
//! impl Entity for Event {
//!     const ENTITY_ID: u32 = 1;
//!
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new(1, "Event", vec![
//!             PropertyDef::identity(1, "id"),
//!             PropertyDef::new(2, "device", PropertyType::String),
//!         ])
//!     }
//!
//!     fn id(&self) -> ObjectId { self.id }
//!     fn set_id(&mut self, id: ObjectId) { self.id = id }
//!
//!     fn encode(&self, record: &mut RecordWriter) {
//!         record.put_id(1, self.id);
//!         record.put_string(2, &self.device);
//!     }
//!
//!     fn decode(record: &RecordReader<'_>) -> Result<Self, DecodeError> {
//!         Ok(Event { id: record.id()?, device: record.string(2)?.unwrap_or_default() })
//!     }
//! }
//!
//! let engine = Engine::open(Model::new().with_entity(Event::schema()), EngineConfig::default())?;
//! let events = EntityBox::<Event>::new(&engine)?;
//! events.put(&mut Event { device: "device 1".into(), ..Event::default() })?;
//! events.put(&mut Event { device: "device 2".into(), ..Event::default() })?;
//!
//! let mut builder = QueryBuilder::<Event>::new(&engine)?;
//! builder.string_eq(2, "DEVICE 2", false);
//! let mut query = builder.build_and_close()?;
//! assert_eq!(query.find()?[0].device, "device 2");
//!
//! query.set_param_string(2, "device 1")?;
//! assert_eq!(query.find()?[0].id, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod condition;
pub mod error;
pub mod materialize;
pub mod query;

pub use builder::QueryBuilder;
pub use condition::{Condition, ConditionTree};
pub use error::{QueryError, Result};
pub use materialize::Materializer;
pub use query::{ParamSlot, Query};

// Engine types needed to describe entities and open an engine.
pub use quarry_engine::{
    DebugFlags, DecodeError, Engine, EngineConfig, Entity, EntityBox, EntityId, EntitySchema,
    Error as EngineError, IndexKind, Model, ObjectId, Operand, Operator, PropertyDef, PropertyId,
    PropertyType, RecordReader, RecordWriter,
};
