//! Binary record codec and the entity contract.
//!
//! A record is a property table:
//!
//! ```text
//! u16 count | count x (u16 property | u8 type code | payload)
//! ```
//!
//! Absent properties are simply not written. Records are always read
//! against an [`EntitySchema`], so a record written under a different schema
//! fails loudly instead of producing garbage.

use crate::{
    error::DecodeError,
    schema::{EntitySchema, PropertyType},
    value::PropertyValue,
    wire::{Reader, Writer},
    EntityId, ObjectId, PropertyId,
};

/// A typed record structure stored by the engine.
///
/// Implementations are what a schema code generator would emit: an explicit
/// descriptor plus encode and decode routines.
pub trait Entity: Sized {
    /// Identifier of the entity in the model.
    const ENTITY_ID: EntityId;

    /// The schema descriptor of this entity.
    fn schema() -> EntitySchema;

    /// Identity of this object; 0 means not yet stored.
    fn id(&self) -> ObjectId;

    fn set_id(&mut self, id: ObjectId);

    /// Write all persisted fields.
    fn encode(&self, record: &mut RecordWriter);

    /// Rebuild an object from a validated record. Transient fields get
    /// their default value.
    fn decode(record: &RecordReader<'_>) -> Result<Self, DecodeError>;
}

/// Builds one record.
#[derive(Debug, Default)]
pub struct RecordWriter {
    count: u16,
    body: Writer,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, property: PropertyId, ty: PropertyType) -> &mut Writer {
        self.count += 1;
        self.body.put_u16(property);
        self.body.put_u8(ty.code());
        &mut self.body
    }

    pub fn put_bool(&mut self, property: PropertyId, v: bool) {
        self.entry(property, PropertyType::Bool).put_u8(v as u8);
    }

    pub fn put_byte(&mut self, property: PropertyId, v: i8) {
        self.entry(property, PropertyType::Byte).put_u8(v as u8);
    }

    pub fn put_short(&mut self, property: PropertyId, v: i16) {
        self.entry(property, PropertyType::Short).put_i16(v);
    }

    pub fn put_char(&mut self, property: PropertyId, v: u16) {
        self.entry(property, PropertyType::Char).put_u16(v);
    }

    pub fn put_int(&mut self, property: PropertyId, v: i32) {
        self.entry(property, PropertyType::Int).put_i32(v);
    }

    pub fn put_long(&mut self, property: PropertyId, v: i64) {
        self.entry(property, PropertyType::Long).put_i64(v);
    }

    pub fn put_float(&mut self, property: PropertyId, v: f32) {
        self.entry(property, PropertyType::Float).put_f32(v);
    }

    pub fn put_double(&mut self, property: PropertyId, v: f64) {
        self.entry(property, PropertyType::Double).put_f64(v);
    }

    pub fn put_string(&mut self, property: PropertyId, v: &str) {
        self.entry(property, PropertyType::String).put_str(v);
    }

    pub fn put_date(&mut self, property: PropertyId, v: i64) {
        self.entry(property, PropertyType::Date).put_i64(v);
    }

    pub fn put_relation(&mut self, property: PropertyId, v: ObjectId) {
        self.entry(property, PropertyType::Relation).put_u64(v);
    }

    pub fn put_bytes(&mut self, property: PropertyId, v: &[u8]) {
        self.entry(property, PropertyType::ByteVector).put_bytes(v);
    }

    /// Identity shortcut; the identity property is always a Long.
    pub fn put_id(&mut self, property: PropertyId, id: ObjectId) {
        self.put_long(property, id as i64);
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Writer::new();
        out.put_u16(self.count);
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body.into_bytes());
        bytes
    }
}

/// Encode an entity into its record bytes.
pub fn encode_entity<E: Entity>(entity: &E) -> Vec<u8> {
    let mut record = RecordWriter::new();
    entity.encode(&mut record);
    record.finish()
}

/// A record parsed and validated against a schema.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    schema: &'a EntitySchema,
    values: Vec<(PropertyId, PropertyValue<'a>)>,
}

impl<'a> RecordReader<'a> {
    /// Parse `bytes`, rejecting anything the schema does not describe.
    pub fn parse(bytes: &'a [u8], schema: &'a EntitySchema) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let count = r.u16()?;
        let mut values: Vec<(PropertyId, PropertyValue<'a>)> = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let id = r.u16()?;
            let code = r.u8()?;
            let def = schema
                .property(id)
                .ok_or(DecodeError::UnknownProperty(id))?;
            if def.is_transient() {
                return Err(DecodeError::TransientProperty(id));
            }
            if def.property_type.code() != code {
                return Err(DecodeError::TypeMismatch {
                    property: id,
                    stored: code,
                    declared: def.property_type.code(),
                });
            }
            if values.iter().any(|(seen, _)| *seen == id) {
                return Err(DecodeError::DuplicateProperty(id));
            }
            let value = read_value(&mut r, id, def.property_type)?;
            values.push((id, value));
        }
        r.finish()?;

        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &'a EntitySchema {
        self.schema
    }

    /// Value of a property, `None` when absent.
    pub fn value(&self, property: PropertyId) -> Option<PropertyValue<'a>> {
        self.values
            .iter()
            .find(|(id, _)| *id == property)
            .map(|(_, v)| *v)
    }

    pub fn is_null(&self, property: PropertyId) -> bool {
        self.value(property).is_none()
    }

    /// The object identity; a record without one is malformed.
    pub fn id(&self) -> Result<ObjectId, DecodeError> {
        let def = self
            .schema
            .id_property()
            .ok_or(DecodeError::MissingProperty(0))?;
        match self.long(def.id)? {
            Some(id) => Ok(id as ObjectId),
            None => Err(DecodeError::MissingProperty(def.id)),
        }
    }

    pub fn bool(&self, property: PropertyId) -> Result<Option<bool>, DecodeError> {
        self.typed(property, PropertyType::Bool, |v| match v {
            PropertyValue::Bool(b) => Some(b),
            _ => None,
        })
    }

    pub fn byte(&self, property: PropertyId) -> Result<Option<i8>, DecodeError> {
        self.typed(property, PropertyType::Byte, |v| match v {
            PropertyValue::Byte(b) => Some(b),
            _ => None,
        })
    }

    pub fn short(&self, property: PropertyId) -> Result<Option<i16>, DecodeError> {
        self.typed(property, PropertyType::Short, |v| match v {
            PropertyValue::Short(s) => Some(s),
            _ => None,
        })
    }

    pub fn char(&self, property: PropertyId) -> Result<Option<u16>, DecodeError> {
        self.typed(property, PropertyType::Char, |v| match v {
            PropertyValue::Char(c) => Some(c),
            _ => None,
        })
    }

    pub fn int(&self, property: PropertyId) -> Result<Option<i32>, DecodeError> {
        self.typed(property, PropertyType::Int, |v| match v {
            PropertyValue::Int(i) => Some(i),
            _ => None,
        })
    }

    pub fn long(&self, property: PropertyId) -> Result<Option<i64>, DecodeError> {
        self.typed(property, PropertyType::Long, |v| match v {
            PropertyValue::Long(l) => Some(l),
            _ => None,
        })
    }

    pub fn float(&self, property: PropertyId) -> Result<Option<f32>, DecodeError> {
        self.typed(property, PropertyType::Float, |v| match v {
            PropertyValue::Float(f) => Some(f),
            _ => None,
        })
    }

    pub fn double(&self, property: PropertyId) -> Result<Option<f64>, DecodeError> {
        self.typed(property, PropertyType::Double, |v| match v {
            PropertyValue::Double(d) => Some(d),
            _ => None,
        })
    }

    pub fn string(&self, property: PropertyId) -> Result<Option<String>, DecodeError> {
        self.typed(property, PropertyType::String, |v| match v {
            PropertyValue::String(s) => Some(s.to_owned()),
            _ => None,
        })
    }

    pub fn date(&self, property: PropertyId) -> Result<Option<i64>, DecodeError> {
        self.typed(property, PropertyType::Date, |v| match v {
            PropertyValue::Date(d) => Some(d),
            _ => None,
        })
    }

    pub fn relation(&self, property: PropertyId) -> Result<Option<ObjectId>, DecodeError> {
        self.typed(property, PropertyType::Relation, |v| match v {
            PropertyValue::Relation(r) => Some(r),
            _ => None,
        })
    }

    pub fn bytes(&self, property: PropertyId) -> Result<Option<Vec<u8>>, DecodeError> {
        self.typed(property, PropertyType::ByteVector, |v| match v {
            PropertyValue::Bytes(b) => Some(b.to_vec()),
            _ => None,
        })
    }

    fn typed<T>(
        &self,
        property: PropertyId,
        requested: PropertyType,
        extract: impl FnOnce(PropertyValue<'a>) -> Option<T>,
    ) -> Result<Option<T>, DecodeError> {
        let def = self
            .schema
            .property(property)
            .ok_or(DecodeError::UnknownProperty(property))?;
        if def.property_type != requested {
            return Err(DecodeError::TypeMismatch {
                property,
                stored: def.property_type.code(),
                declared: requested.code(),
            });
        }
        Ok(self.value(property).and_then(extract))
    }
}

fn read_value<'a>(
    r: &mut Reader<'a>,
    property: PropertyId,
    ty: PropertyType,
) -> Result<PropertyValue<'a>, DecodeError> {
    Ok(match ty {
        PropertyType::Bool => PropertyValue::Bool(r.u8()? != 0),
        PropertyType::Byte => PropertyValue::Byte(r.i8()?),
        PropertyType::Short => PropertyValue::Short(r.i16()?),
        PropertyType::Char => PropertyValue::Char(r.u16()?),
        PropertyType::Int => PropertyValue::Int(r.i32()?),
        PropertyType::Long => PropertyValue::Long(r.i64()?),
        PropertyType::Float => PropertyValue::Float(r.f32()?),
        PropertyType::Double => PropertyValue::Double(r.f64()?),
        PropertyType::String => {
            let raw = r.bytes()?;
            PropertyValue::String(
                std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(property))?,
            )
        }
        PropertyType::Date => PropertyValue::Date(r.i64()?),
        PropertyType::Relation => PropertyValue::Relation(r.u64()?),
        PropertyType::ByteVector => PropertyValue::Bytes(r.bytes()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertyDef;

    fn note_schema() -> EntitySchema {
        EntitySchema::new(
            1,
            "Note",
            vec![
                PropertyDef::identity(1, "id"),
                PropertyDef::new(2, "title", PropertyType::String),
                PropertyDef::new(3, "pinned", PropertyType::Bool),
                PropertyDef::new(4, "blob", PropertyType::ByteVector).nullable(),
                PropertyDef::new(5, "cache", PropertyType::String).transient(),
            ],
        )
    }

    #[test]
    fn parse_written_record() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 7);
        w.put_string(2, "hello");
        w.put_bool(3, true);
        let bytes = w.finish();

        let record = RecordReader::parse(&bytes, &schema).unwrap();
        assert_eq!(record.id().unwrap(), 7);
        assert_eq!(record.string(2).unwrap().as_deref(), Some("hello"));
        assert_eq!(record.bool(3).unwrap(), Some(true));
        assert_eq!(record.bytes(4).unwrap(), None);
        assert!(record.is_null(4));
    }

    #[test]
    fn unknown_property_is_rejected() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 1);
        w.put_long(9, 5);
        let bytes = w.finish();

        let err = RecordReader::parse(&bytes, &schema).unwrap_err();
        assert_eq!(err, DecodeError::UnknownProperty(9));
    }

    #[test]
    fn stored_type_must_match_schema() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 1);
        w.put_long(2, 5);
        let bytes = w.finish();

        let err = RecordReader::parse(&bytes, &schema).unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { property: 2, .. }));
    }

    #[test]
    fn transient_property_is_never_stored() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 1);
        w.put_string(5, "cached");
        let bytes = w.finish();

        let err = RecordReader::parse(&bytes, &schema).unwrap_err();
        assert_eq!(err, DecodeError::TransientProperty(5));
    }

    #[test]
    fn truncated_record() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 1);
        w.put_string(2, "hello");
        let mut bytes = w.finish();
        bytes.truncate(bytes.len() - 2);

        assert!(matches!(
            RecordReader::parse(&bytes, &schema),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn duplicate_property() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 1);
        w.put_id(1, 2);
        let bytes = w.finish();

        assert_eq!(
            RecordReader::parse(&bytes, &schema).unwrap_err(),
            DecodeError::DuplicateProperty(1)
        );
    }

    #[test]
    fn typed_getter_checks_schema_type() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_id(1, 1);
        let bytes = w.finish();

        let record = RecordReader::parse(&bytes, &schema).unwrap();
        assert!(record.long(2).is_err());
    }

    #[test]
    fn missing_identity() {
        let schema = note_schema();
        let mut w = RecordWriter::new();
        w.put_string(2, "orphan");
        let bytes = w.finish();

        let record = RecordReader::parse(&bytes, &schema).unwrap();
        assert_eq!(record.id(), Err(DecodeError::MissingProperty(1)));
    }
}
