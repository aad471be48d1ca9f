//! Turning raw query results into typed entities.

use quarry_engine::{DecodeError, Entity, EntitySchema, RecordReader};
use std::marker::PhantomData;

/// Decodes raw records of entity `E` against its registered schema.
///
/// Materialization is all-or-nothing: one undecodable record fails the whole
/// batch and no partial result is returned.
#[derive(Debug)]
pub struct Materializer<E: Entity> {
    schema: EntitySchema,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Materializer<E> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Materializer<E> {
    pub fn new(schema: EntitySchema) -> Self {
        Self {
            schema,
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Decode a single record.
    pub fn materialize_one(&self, bytes: &[u8]) -> Result<E, DecodeError> {
        let record = RecordReader::parse(bytes, &self.schema)?;
        E::decode(&record)
    }

    /// Decode every record, preserving order.
    pub fn materialize(&self, records: &[Vec<u8>]) -> Result<Vec<E>, DecodeError> {
        records
            .iter()
            .enumerate()
            .map(|(position, bytes)| {
                self.materialize_one(bytes).inspect_err(|err| {
                    tracing::warn!(
                        entity = %self.schema.name,
                        position,
                        error = %err,
                        "record could not be materialized"
                    );
                })
            })
            .collect()
    }
}
