//! Property values as read from stored records.

use crate::schema::PropertyType;

/// A single property value borrowed from a record buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(&'a str),
    Date(i64),
    Relation(u64),
    Bytes(&'a [u8]),
}

impl<'a> PropertyValue<'a> {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Bool(_) => PropertyType::Bool,
            PropertyValue::Byte(_) => PropertyType::Byte,
            PropertyValue::Short(_) => PropertyType::Short,
            PropertyValue::Char(_) => PropertyType::Char,
            PropertyValue::Int(_) => PropertyType::Int,
            PropertyValue::Long(_) => PropertyType::Long,
            PropertyValue::Float(_) => PropertyType::Float,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Date(_) => PropertyType::Date,
            PropertyValue::Relation(_) => PropertyType::Relation,
            PropertyValue::Bytes(_) => PropertyType::ByteVector,
        }
    }

    /// Integer view of integer-family values.
    ///
    /// Relation ids above `i64::MAX` wrap; identifiers are assigned from 1
    /// upwards and never get there.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            PropertyValue::Bool(v) => Some(v as i64),
            PropertyValue::Byte(v) => Some(v as i64),
            PropertyValue::Short(v) => Some(v as i64),
            PropertyValue::Char(v) => Some(v as i64),
            PropertyValue::Int(v) => Some(v as i64),
            PropertyValue::Long(v) | PropertyValue::Date(v) => Some(v),
            PropertyValue::Relation(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            PropertyValue::Float(v) => Some(v as f64),
            PropertyValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            PropertyValue::Bytes(v) => Some(v),
            _ => None,
        }
    }
}
