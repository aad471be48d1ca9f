//! Store - the in-memory record container.
//!
//! The Store holds the encoded records of every entity, keyed by object id,
//! and enforces the schema on write: records must parse against their entity
//! schema and must not collide on unique properties.

use crate::{
    codec::RecordReader,
    error::Result,
    schema::{EntitySchema, Model},
    EntityId, Error, ObjectId,
};
use std::collections::{BTreeMap, HashMap};

/// Records of one entity, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: BTreeMap<ObjectId, Vec<u8>>,
    last_id: ObjectId,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by ID.
    pub fn get(&self, id: ObjectId) -> Option<&[u8]> {
        self.records.get(&id).map(Vec::as_slice)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.contains_key(&id)
    }

    /// All records in ascending id order.
    pub fn records(&self) -> impl Iterator<Item = (ObjectId, &[u8])> {
        self.records.iter().map(|(id, bytes)| (*id, bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// All collections of a model.
#[derive(Debug, Clone)]
pub struct Store {
    model: Model,
    collections: HashMap<EntityId, Collection>,
}

impl Store {
    /// Create an empty store for a validated model.
    pub fn new(model: Model) -> Self {
        let collections = model
            .entities
            .iter()
            .map(|e| (e.id, Collection::new()))
            .collect();
        Self { model, collections }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Get a collection by entity id.
    pub fn collection(&self, entity: EntityId) -> Result<&Collection> {
        self.collections
            .get(&entity)
            .ok_or(Error::UnknownEntity(entity))
    }

    fn parts_mut(&mut self, entity: EntityId) -> Result<(&EntitySchema, &mut Collection)> {
        let schema = self
            .model
            .entity(entity)
            .ok_or(Error::UnknownEntity(entity))?;
        let collection = self
            .collections
            .get_mut(&entity)
            .ok_or(Error::UnknownEntity(entity))?;
        Ok((schema, collection))
    }

    /// The next free id of an entity. It is only claimed once a record is
    /// stored under it, so a rejected put leaves the sequence untouched.
    pub fn next_id(&self, entity: EntityId) -> Result<ObjectId> {
        Ok(self.collection(entity)?.last_id + 1)
    }

    /// Insert or replace a record.
    ///
    /// The record must parse against the entity schema, carry `id` as its
    /// identity and keep every unique property distinct from other objects.
    pub fn put(&mut self, entity: EntityId, id: ObjectId, record: Vec<u8>) -> Result<()> {
        let (schema, collection) = self.parts_mut(entity)?;
        let reader = RecordReader::parse(&record, schema)?;
        let stored_id = reader.id()?;
        if stored_id != id {
            return Err(Error::IdMismatch {
                expected: id,
                actual: stored_id,
            });
        }

        for unique in schema.persisted().filter(|p| p.flags.unique && !p.is_id()) {
            let Some(value) = reader.value(unique.id) else {
                continue;
            };
            for (other_id, other) in collection.records() {
                if other_id == id {
                    continue;
                }
                let other = RecordReader::parse(other, schema)?;
                if other.value(unique.id) == Some(value) {
                    return Err(Error::UniqueViolation {
                        property: unique.id,
                        id: other_id,
                    });
                }
            }
        }

        collection.last_id = collection.last_id.max(id);
        collection.records.insert(id, record);
        Ok(())
    }

    /// Get a record by entity and id.
    pub fn get(&self, entity: EntityId, id: ObjectId) -> Result<Option<&[u8]>> {
        Ok(self.collection(entity)?.get(id))
    }

    /// Remove a record, returning whether it existed.
    pub fn remove(&mut self, entity: EntityId, id: ObjectId) -> Result<bool> {
        let (_, collection) = self.parts_mut(entity)?;
        Ok(collection.records.remove(&id).is_some())
    }

    /// Remove every record of an entity, returning how many were removed.
    pub fn remove_all(&mut self, entity: EntityId) -> Result<usize> {
        let (_, collection) = self.parts_mut(entity)?;
        let removed = collection.records.len();
        collection.records.clear();
        Ok(removed)
    }

    pub fn count(&self, entity: EntityId) -> Result<usize> {
        Ok(self.collection(entity)?.len())
    }
}
