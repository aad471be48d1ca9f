//! Schema registry: entity and property descriptors.
//!
//! Entities are described explicitly, either in code through the builder
//! methods below or from a JSON model description. The registry is validated
//! once when the engine is opened and is read-only afterwards.

use crate::{error::Result, EntityId, Error, PropertyId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Semantic property types. The numeric codes are stable and appear both in
/// the JSON model and in stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PropertyType {
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    String,
    /// Milliseconds since the Unix epoch
    Date,
    /// Identifier of an object of the relation target entity
    Relation,
    ByteVector,
}

/// Groups of property types that share comparison semantics and operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Float,
    String,
    Bytes,
}

impl PropertyType {
    /// Stable numeric code of this type.
    pub fn code(self) -> u8 {
        match self {
            PropertyType::Bool => 1,
            PropertyType::Byte => 2,
            PropertyType::Short => 3,
            PropertyType::Char => 4,
            PropertyType::Int => 5,
            PropertyType::Long => 6,
            PropertyType::Float => 7,
            PropertyType::Double => 8,
            PropertyType::String => 9,
            PropertyType::Date => 10,
            PropertyType::Relation => 11,
            PropertyType::ByteVector => 23,
        }
    }

    /// Look up a type by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => PropertyType::Bool,
            2 => PropertyType::Byte,
            3 => PropertyType::Short,
            4 => PropertyType::Char,
            5 => PropertyType::Int,
            6 => PropertyType::Long,
            7 => PropertyType::Float,
            8 => PropertyType::Double,
            9 => PropertyType::String,
            10 => PropertyType::Date,
            11 => PropertyType::Relation,
            23 => PropertyType::ByteVector,
            _ => return None,
        })
    }

    pub fn family(self) -> TypeFamily {
        match self {
            PropertyType::Float | PropertyType::Double => TypeFamily::Float,
            PropertyType::String => TypeFamily::String,
            PropertyType::ByteVector => TypeFamily::Bytes,
            _ => TypeFamily::Integer,
        }
    }

    /// Integer types whose values always fit in 32 bits.
    pub fn is_narrow_integer(self) -> bool {
        matches!(
            self,
            PropertyType::Byte | PropertyType::Short | PropertyType::Char | PropertyType::Int
        )
    }

    /// Integer types stored with 64 bits.
    pub fn is_wide_integer(self) -> bool {
        matches!(
            self,
            PropertyType::Long | PropertyType::Date | PropertyType::Relation
        )
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PropertyType::Bool => "Bool",
            PropertyType::Byte => "Byte",
            PropertyType::Short => "Short",
            PropertyType::Char => "Char",
            PropertyType::Int => "Int",
            PropertyType::Long => "Long",
            PropertyType::Float => "Float",
            PropertyType::Double => "Double",
            PropertyType::String => "String",
            PropertyType::Date => "Date",
            PropertyType::Relation => "Relation",
            PropertyType::ByteVector => "ByteVector",
        };
        f.write_str(name)
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        PropertyType::from_code(code).ok_or_else(|| format!("unknown property type code {code}"))
    }
}

impl From<PropertyType> for u8 {
    fn from(ty: PropertyType) -> u8 {
        ty.code()
    }
}

/// Index kind declared on a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    None,
    Hash,
    Hash64,
}

/// Boolean markers on a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyFlags {
    /// The identity property of the entity
    pub id: bool,
    pub unique: bool,
    /// Values may be absent, distinct from zero or empty. Descriptive only:
    /// writes do not require other properties to be present, and presence
    /// conditions accept any persisted property.
    pub nullable: bool,
    /// Never persisted, never queryable
    pub transient: bool,
}

/// Definition of a property of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub id: PropertyId,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub index: IndexKind,
    #[serde(default)]
    pub flags: PropertyFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_target: Option<EntityId>,
}

impl PropertyDef {
    /// Create a plain property definition.
    pub fn new(id: PropertyId, name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id,
            name: name.into(),
            property_type,
            index: IndexKind::None,
            flags: PropertyFlags::default(),
            relation_target: None,
        }
    }

    /// Create the identity property (always a Long).
    pub fn identity(id: PropertyId, name: impl Into<String>) -> Self {
        let mut def = Self::new(id, name, PropertyType::Long);
        def.flags.id = true;
        def
    }

    /// Create a relation property pointing at `target`.
    pub fn relation(id: PropertyId, name: impl Into<String>, target: EntityId) -> Self {
        let mut def = Self::new(id, name, PropertyType::Relation);
        def.relation_target = Some(target);
        def
    }

    pub fn indexed(mut self, index: IndexKind) -> Self {
        self.index = index;
        self
    }

    pub fn unique(mut self) -> Self {
        self.flags.unique = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.flags.nullable = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.flags.transient = true;
        self
    }

    pub fn is_id(&self) -> bool {
        self.flags.id
    }

    pub fn is_transient(&self) -> bool {
        self.flags.transient
    }
}

/// Schema of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    pub id: EntityId,
    pub name: String,
    pub properties: Vec<PropertyDef>,
}

impl EntitySchema {
    /// Create a new entity schema.
    pub fn new(id: EntityId, name: impl Into<String>, properties: Vec<PropertyDef>) -> Self {
        Self {
            id,
            name: name.into(),
            properties,
        }
    }

    /// Get a property by id, transient ones included.
    pub fn property(&self, id: PropertyId) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// The identity property.
    pub fn id_property(&self) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.is_id())
    }

    /// Properties that are written to storage.
    pub fn persisted(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| !p.is_transient())
    }

    fn validate(&self, model: &Model) -> Result<()> {
        let mut seen = HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.id) {
                return Err(invalid(format!(
                    "entity {} declares property {} twice",
                    self.name, property.id
                )));
            }
            if property.property_type == PropertyType::Relation {
                let target = property.relation_target.ok_or_else(|| {
                    invalid(format!(
                        "relation {}.{} has no target entity",
                        self.name, property.name
                    ))
                })?;
                if model.entity(target).is_none() {
                    return Err(invalid(format!(
                        "relation {}.{} targets unknown entity {}",
                        self.name, property.name, target
                    )));
                }
            }
        }

        let ids: Vec<_> = self.properties.iter().filter(|p| p.is_id()).collect();
        match ids.as_slice() {
            [id] if id.property_type != PropertyType::Long => Err(invalid(format!(
                "identity property of {} must be Long, got {}",
                self.name, id.property_type
            ))),
            [id] if id.is_transient() => Err(invalid(format!(
                "identity property of {} cannot be transient",
                self.name
            ))),
            [_] => Ok(()),
            [] => Err(invalid(format!("entity {} has no identity property", self.name))),
            _ => Err(invalid(format!(
                "entity {} has more than one identity property",
                self.name
            ))),
        }
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidModel(message)
}

/// The full set of entities known to an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub entities: Vec<EntitySchema>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to add an entity.
    pub fn with_entity(mut self, entity: EntitySchema) -> Self {
        self.entities.push(entity);
        self
    }

    /// Load a model from its JSON description.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Model =
            serde_json::from_str(json).map_err(|e| invalid(format!("parse error: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    /// Get an entity schema by id.
    pub fn entity(&self, id: EntityId) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Check structural invariants of every entity.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.id) {
                return Err(invalid(format!("entity id {} declared twice", entity.id)));
            }
            entity.validate(self)?;
        }
        Ok(())
    }
}
