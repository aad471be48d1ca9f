//! Typed CRUD access to the objects of one entity.

use crate::{
    codec::{encode_entity, Entity, RecordReader},
    engine::Engine,
    error::Result,
    Error, ObjectId,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// Box of all stored objects of entity `E`.
#[derive(Debug)]
pub struct EntityBox<E: Entity> {
    engine: Arc<Engine>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityBox<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityBox<E> {
    /// Open a box; fails if the engine does not know `E`.
    pub fn new(engine: &Arc<Engine>) -> Result<Self> {
        engine.entity_schema(E::ENTITY_ID)?;
        Ok(Self {
            engine: Arc::clone(engine),
            _entity: PhantomData,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Insert or update an object.
    ///
    /// An object with id 0 gets the next free id assigned, both in the store
    /// and on `object` itself.
    pub fn put(&self, object: &mut E) -> Result<ObjectId> {
        let mut store = self.engine.write_store();
        let original = object.id();
        let id = match original {
            0 => store.next_id(E::ENTITY_ID)?,
            id => id,
        };
        object.set_id(id);

        if let Err(err) = store.put(E::ENTITY_ID, id, encode_entity(object)) {
            object.set_id(original);
            tracing::warn!(entity = E::ENTITY_ID, id, error = %err, "put rejected");
            return Err(err);
        }
        Ok(id)
    }

    /// Put several objects; stops at the first failure.
    pub fn put_many(&self, objects: &mut [E]) -> Result<Vec<ObjectId>> {
        objects.iter_mut().map(|o| self.put(o)).collect()
    }

    /// Get an object by id.
    pub fn get(&self, id: ObjectId) -> Result<Option<E>> {
        let store = self.engine.read_store();
        let schema = store
            .model()
            .entity(E::ENTITY_ID)
            .ok_or(Error::UnknownEntity(E::ENTITY_ID))?;
        match store.get(E::ENTITY_ID, id)? {
            Some(bytes) => {
                let record = RecordReader::parse(bytes, schema)?;
                Ok(Some(E::decode(&record)?))
            }
            None => Ok(None),
        }
    }

    /// All objects in id order.
    pub fn get_all(&self) -> Result<Vec<E>> {
        let store = self.engine.read_store();
        let schema = store
            .model()
            .entity(E::ENTITY_ID)
            .ok_or(Error::UnknownEntity(E::ENTITY_ID))?;
        store
            .collection(E::ENTITY_ID)?
            .records()
            .map(|(_, bytes)| -> Result<E> {
                let record = RecordReader::parse(bytes, schema)?;
                Ok(E::decode(&record)?)
            })
            .collect()
    }

    /// Remove an object, returning whether it existed.
    pub fn remove(&self, id: ObjectId) -> Result<bool> {
        self.engine.write_store().remove(E::ENTITY_ID, id)
    }

    /// Remove all objects, returning how many were removed.
    pub fn remove_all(&self) -> Result<usize> {
        let removed = self.engine.write_store().remove_all(E::ENTITY_ID)?;
        tracing::debug!(entity = E::ENTITY_ID, removed, "removed all objects");
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        self.engine.read_store().count(E::ENTITY_ID)
    }
}
