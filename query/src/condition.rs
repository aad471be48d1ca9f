//! Conditions, the condition tree and its plan encoding.
//!
//! A [`ConditionTree`] is an ordered conjunction of [`Condition`]s over one
//! entity. It is encoded into the engine's plan frame when a query is built:
//!
//! ```text
//! u8 version | u32 entity | u16 count | count x (u8 op | u16 property | u8 flags | operand)
//! ```

use crate::error::{QueryError, Result};
use quarry_engine::{
    wire::{Writer, FLAG_CASE_SENSITIVE, FLAG_OR_EQUAL, PLAN_VERSION},
    EntityId, EntitySchema, Operand, Operator, PropertyDef, PropertyId, PropertyType, TypeFamily,
};

/// One typed predicate on a property.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub property: PropertyId,
    pub operator: Operator,
    pub operand: Operand,
    pub case_sensitive: bool,
    pub or_equal: bool,
}

impl Condition {
    pub fn new(property: PropertyId, operator: Operator, operand: Operand) -> Self {
        Self {
            property,
            operator,
            operand,
            case_sensitive: true,
            or_equal: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn or_equal(mut self, or_equal: bool) -> Self {
        self.or_equal = or_equal;
        self
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.case_sensitive {
            flags |= FLAG_CASE_SENSITIVE;
        }
        if self.or_equal {
            flags |= FLAG_OR_EQUAL;
        }
        flags
    }

    fn encode(&self, w: &mut Writer) {
        w.put_u8(self.operator.code());
        w.put_u16(self.property);
        w.put_u8(self.flags());
        self.operand.encode(w);
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let eq = if self.or_equal { "=" } else { "" };
        write!(f, "prop{} {}{}", self.property, self.operator, eq)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

/// Ordered conjunction of conditions for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionTree {
    entity: EntityId,
    conditions: Vec<Condition>,
}

impl ConditionTree {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            conditions: Vec::new(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Number of conditions referencing `property`.
    pub fn occurrences(&self, property: PropertyId) -> usize {
        self.conditions
            .iter()
            .filter(|c| c.property == property)
            .count()
    }

    /// Index of the `occurrence`-th condition on `property`, counted in
    /// insertion order from zero.
    pub fn position(&self, property: PropertyId, occurrence: usize) -> Option<usize> {
        self.conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.property == property)
            .nth(occurrence)
            .map(|(index, _)| index)
    }

    pub(crate) fn set_operand(&mut self, index: usize, operand: Operand) {
        if let Some(condition) = self.conditions.get_mut(index) {
            condition.operand = operand;
        }
    }

    /// Encode the tree as an engine plan frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.conditions.len())
            .map_err(|_| QueryError::TooManyConditions(self.conditions.len()))?;
        let mut w = Writer::new();
        w.put_u8(PLAN_VERSION);
        w.put_u32(self.entity);
        w.put_u16(count);
        for condition in &self.conditions {
            condition.encode(&mut w);
        }
        Ok(w.into_bytes())
    }
}

impl std::fmt::Display for ConditionTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("TRUE");
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{condition}")?;
        }
        Ok(())
    }
}

/// Property types a builder method is defined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Accepts {
    Any,
    Integer,
    /// Byte, Short, Char and Int: operands fit in 32 bits.
    NarrowInteger,
    /// Long, Date and Relation.
    WideInteger,
    Float,
    String,
    Bytes,
}

impl Accepts {
    fn admits(self, ty: PropertyType) -> bool {
        match self {
            Accepts::Any => true,
            Accepts::Integer => ty.family() == TypeFamily::Integer,
            Accepts::NarrowInteger => ty.is_narrow_integer(),
            Accepts::WideInteger => ty.is_wide_integer(),
            Accepts::Float => ty.family() == TypeFamily::Float,
            Accepts::String => ty.family() == TypeFamily::String,
            Accepts::Bytes => ty.family() == TypeFamily::Bytes,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Accepts::Any => "any",
            Accepts::Integer => "integer",
            Accepts::NarrowInteger => "32-bit integer",
            Accepts::WideInteger => "64-bit integer",
            Accepts::Float => "floating point",
            Accepts::String => "string",
            Accepts::Bytes => "byte vector",
        }
    }
}

/// Look up a queryable property and check it belongs to the wanted family.
pub(crate) fn resolve(
    schema: &EntitySchema,
    property: PropertyId,
    accepts: Accepts,
) -> Result<&PropertyDef> {
    let def = schema.property(property).ok_or_else(|| {
        QueryError::Schema(format!(
            "property {property} not found on entity {}",
            schema.name
        ))
    })?;
    if def.is_transient() {
        return Err(QueryError::Schema(format!(
            "property {} of {} is transient and cannot be queried",
            def.name, schema.name
        )));
    }
    if !accepts.admits(def.property_type) {
        return Err(QueryError::Schema(format!(
            "property {} of {} is {}, not a {} property",
            def.name,
            schema.name,
            def.property_type,
            accepts.describe()
        )));
    }
    Ok(def)
}
