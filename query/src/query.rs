//! Compiled queries: execution and parameter rebinding.

use crate::{
    condition::{Condition, ConditionTree},
    error::{QueryError, Result},
    materialize::Materializer,
};
use quarry_engine::{Engine, Entity, Handle, Operand, PropertyId};
use std::sync::Arc;

/// Addresses one condition of a query for rebinding.
///
/// `occurrence` counts the conditions on `property` in the order they were
/// added, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamSlot {
    pub property: PropertyId,
    pub occurrence: usize,
}

impl ParamSlot {
    pub fn new(property: PropertyId, occurrence: usize) -> Self {
        Self {
            property,
            occurrence,
        }
    }
}

impl From<PropertyId> for ParamSlot {
    fn from(property: PropertyId) -> Self {
        Self::new(property, 0)
    }
}

/// A compiled query over entity `E`.
///
/// Holds one engine query handle until [`close`](Self::close) or drop.
/// Rebinding takes `&mut self`; share a query between threads only behind
/// a lock.
#[derive(Debug)]
pub struct Query<E: Entity> {
    engine: Arc<Engine>,
    handle: Option<Handle>,
    tree: ConditionTree,
    materializer: Materializer<E>,
}

impl<E: Entity> Query<E> {
    pub(crate) fn new(
        engine: Arc<Engine>,
        handle: Handle,
        tree: ConditionTree,
        materializer: Materializer<E>,
    ) -> Self {
        Self {
            engine,
            handle: Some(handle),
            tree,
            materializer,
        }
    }

    fn handle(&self) -> Result<Handle> {
        self.handle.ok_or(QueryError::Closed)
    }

    /// Conditions with their currently bound operands.
    pub fn conditions(&self) -> &[Condition] {
        self.tree.conditions()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// All matching objects in ascending id order.
    pub fn find(&self) -> Result<Vec<E>> {
        let records = self.engine.execute(self.handle()?)?;
        Ok(self.materializer.materialize(&records)?)
    }

    /// Raw records of all matching objects in ascending id order.
    pub fn find_bytes(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.engine.execute(self.handle()?)?)
    }

    /// The matching object with the lowest id.
    pub fn find_first(&self) -> Result<Option<E>> {
        let records = self.engine.execute(self.handle()?)?;
        match records.first() {
            Some(bytes) => Ok(Some(self.materializer.materialize_one(bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of matching objects.
    pub fn count(&self) -> Result<usize> {
        Ok(self.engine.count(self.handle()?)?)
    }

    pub fn set_param_int(&mut self, property: PropertyId, value: i64) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::Int(value))
    }

    pub fn set_param_int_at(&mut self, slot: ParamSlot, value: i64) -> Result<()> {
        self.bind(slot, Operand::Int(value))
    }

    pub fn set_param_int_range(&mut self, property: PropertyId, lo: i64, hi: i64) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::IntRange(lo, hi))
    }

    pub fn set_param_int_range_at(&mut self, slot: ParamSlot, lo: i64, hi: i64) -> Result<()> {
        self.bind(slot, Operand::IntRange(lo, hi))
    }

    pub fn set_param_double(&mut self, property: PropertyId, value: f64) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::Double(value))
    }

    pub fn set_param_double_at(&mut self, slot: ParamSlot, value: f64) -> Result<()> {
        self.bind(slot, Operand::Double(value))
    }

    pub fn set_param_double_range(&mut self, property: PropertyId, lo: f64, hi: f64) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::DoubleRange(lo, hi))
    }

    pub fn set_param_double_range_at(&mut self, slot: ParamSlot, lo: f64, hi: f64) -> Result<()> {
        self.bind(slot, Operand::DoubleRange(lo, hi))
    }

    pub fn set_param_string(&mut self, property: PropertyId, value: &str) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::String(value.into()))
    }

    pub fn set_param_string_at(&mut self, slot: ParamSlot, value: &str) -> Result<()> {
        self.bind(slot, Operand::String(value.into()))
    }

    pub fn set_param_bytes(&mut self, property: PropertyId, value: &[u8]) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::Bytes(value.to_vec()))
    }

    pub fn set_param_bytes_at(&mut self, slot: ParamSlot, value: &[u8]) -> Result<()> {
        self.bind(slot, Operand::Bytes(value.to_vec()))
    }

    pub fn set_param_int32s(&mut self, property: PropertyId, values: &[i32]) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::Int32Set(values.to_vec()))
    }

    pub fn set_param_int32s_at(&mut self, slot: ParamSlot, values: &[i32]) -> Result<()> {
        self.bind(slot, Operand::Int32Set(values.to_vec()))
    }

    pub fn set_param_int64s(&mut self, property: PropertyId, values: &[i64]) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::Int64Set(values.to_vec()))
    }

    pub fn set_param_int64s_at(&mut self, slot: ParamSlot, values: &[i64]) -> Result<()> {
        self.bind(slot, Operand::Int64Set(values.to_vec()))
    }

    pub fn set_param_strings(&mut self, property: PropertyId, values: &[&str]) -> Result<()> {
        let slot = self.sole_slot(property)?;
        self.bind(slot, Operand::StringSet(values.iter().map(|v| v.to_string()).collect()))
    }

    pub fn set_param_strings_at(&mut self, slot: ParamSlot, values: &[&str]) -> Result<()> {
        self.bind(slot, Operand::StringSet(values.iter().map(|v| v.to_string()).collect()))
    }

    /// The only condition on `property`; anything else is ambiguous.
    fn sole_slot(&self, property: PropertyId) -> Result<ParamSlot> {
        match self.tree.occurrences(property) {
            1 => Ok(ParamSlot::new(property, 0)),
            0 => Err(QueryError::TypeMismatch {
                property,
                detail: "no condition references this property".into(),
            }),
            n => Err(QueryError::TypeMismatch {
                property,
                detail: format!("{n} conditions reference this property, pick one by slot"),
            }),
        }
    }

    fn bind(&mut self, slot: ParamSlot, operand: Operand) -> Result<()> {
        let handle = self.handle()?;
        let index = self
            .tree
            .position(slot.property, slot.occurrence)
            .ok_or_else(|| QueryError::TypeMismatch {
                property: slot.property,
                detail: format!("query has no occurrence {} of this property", slot.occurrence),
            })?;

        let current = self.tree.conditions()[index].operand.kind();
        if current != operand.kind() {
            return Err(QueryError::TypeMismatch {
                property: slot.property,
                detail: format!("condition takes {current}, got {}", operand.kind()),
            });
        }

        self.engine.set_param(handle, index, &operand.to_bytes())?;
        tracing::debug!(query = %handle, property = slot.property, index, "parameter rebound");
        self.tree.set_operand(index, operand);
        Ok(())
    }

    /// Release the query handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.release(handle);
        }
    }
}

impl<E: Entity> Drop for Query<E> {
    fn drop(&mut self) {
        self.close();
    }
}
