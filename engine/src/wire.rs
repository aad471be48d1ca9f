//! Binary primitives shared by the record format and the condition plan.
//!
//! All integers are little-endian. Variable-length payloads carry a `u32`
//! length prefix. A compiled condition plan looks like:
//!
//! ```text
//! u8 version | u32 entity | u16 count | count x condition
//! condition: u8 operator | u16 property | u8 flags | operand
//! operand:   u8 kind | payload
//! ```

use crate::{error::DecodeError, EntityId, PropertyId};

/// Version byte leading every condition plan.
pub const PLAN_VERSION: u8 = 1;

/// Condition flag: string comparison honours case.
pub const FLAG_CASE_SENSITIVE: u8 = 0b01;
/// Condition flag: ordering comparison includes equality.
pub const FLAG_OR_EQUAL: u8 = 0b10;

/// Append-only encoder.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed byte payload.
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    pub fn put_str(&mut self, v: &str) {
        self.put_bytes(v.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, DecodeError> {
            let raw = self.take(std::mem::size_of::<$ty>())?;
            let mut bytes = [0u8; std::mem::size_of::<$ty>()];
            bytes.copy_from_slice(raw);
            Ok(<$ty>::from_le_bytes(bytes))
        }
    };
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Borrow the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    read_le!(u8, u8);
    read_le!(u16, u16);
    read_le!(u32, u32);
    read_le!(i8, i8);
    read_le!(i16, i16);
    read_le!(i32, i32);
    read_le!(i64, i64);
    read_le!(u64, u64);
    read_le!(f32, f32);
    read_le!(f64, f64);

    /// Length-prefixed byte payload.
    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail if anything is left unread.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// Comparison operators understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operator {
    Eq = 1,
    NotEq = 2,
    Less = 3,
    Greater = 4,
    Between = 5,
    Contains = 6,
    StartsWith = 7,
    EndsWith = 8,
    In = 9,
    NotIn = 10,
    IsNull = 11,
    NotNull = 12,
}

impl Operator {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Operator::Eq,
            2 => Operator::NotEq,
            3 => Operator::Less,
            4 => Operator::Greater,
            5 => Operator::Between,
            6 => Operator::Contains,
            7 => Operator::StartsWith,
            8 => Operator::EndsWith,
            9 => Operator::In,
            10 => Operator::NotIn,
            11 => Operator::IsNull,
            12 => Operator::NotNull,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Between => "between",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts with",
            Operator::EndsWith => "ends with",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::IsNull => "is null",
            Operator::NotNull => "is not null",
        };
        f.write_str(name)
    }
}

/// Shape of an operand, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandKind {
    None = 0,
    Int = 1,
    IntRange = 2,
    Double = 3,
    DoubleRange = 4,
    String = 5,
    Bytes = 6,
    Int32Set = 7,
    Int64Set = 8,
    StringSet = 9,
}

impl std::fmt::Display for OperandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Typed operand of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i64),
    IntRange(i64, i64),
    Double(f64),
    DoubleRange(f64, f64),
    String(String),
    Bytes(Vec<u8>),
    Int32Set(Vec<i32>),
    Int64Set(Vec<i64>),
    StringSet(Vec<String>),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Int(_) => OperandKind::Int,
            Operand::IntRange(..) => OperandKind::IntRange,
            Operand::Double(_) => OperandKind::Double,
            Operand::DoubleRange(..) => OperandKind::DoubleRange,
            Operand::String(_) => OperandKind::String,
            Operand::Bytes(_) => OperandKind::Bytes,
            Operand::Int32Set(_) => OperandKind::Int32Set,
            Operand::Int64Set(_) => OperandKind::Int64Set,
            Operand::StringSet(_) => OperandKind::StringSet,
        }
    }

    pub fn encode(&self, w: &mut Writer) {
        w.put_u8(self.kind() as u8);
        match self {
            Operand::None => {}
            Operand::Int(v) => w.put_i64(*v),
            Operand::IntRange(lo, hi) => {
                w.put_i64(*lo);
                w.put_i64(*hi);
            }
            Operand::Double(v) => w.put_f64(*v),
            Operand::DoubleRange(lo, hi) => {
                w.put_f64(*lo);
                w.put_f64(*hi);
            }
            Operand::String(v) => w.put_str(v),
            Operand::Bytes(v) => w.put_bytes(v),
            Operand::Int32Set(values) => {
                w.put_u32(values.len() as u32);
                values.iter().for_each(|v| w.put_i32(*v));
            }
            Operand::Int64Set(values) => {
                w.put_u32(values.len() as u32);
                values.iter().for_each(|v| w.put_i64(*v));
            }
            Operand::StringSet(values) => {
                w.put_u32(values.len() as u32);
                values.iter().for_each(|v| w.put_str(v));
            }
        }
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let kind = r.u8()?;
        Ok(match kind {
            0 => Operand::None,
            1 => Operand::Int(r.i64()?),
            2 => Operand::IntRange(r.i64()?, r.i64()?),
            3 => Operand::Double(r.f64()?),
            4 => Operand::DoubleRange(r.f64()?, r.f64()?),
            5 => Operand::String(read_string(r)?),
            6 => Operand::Bytes(r.bytes()?.to_vec()),
            7 => {
                let count = r.u32()?;
                Operand::Int32Set((0..count).map(|_| r.i32()).collect::<Result<_, _>>()?)
            }
            8 => {
                let count = r.u32()?;
                Operand::Int64Set((0..count).map(|_| r.i64()).collect::<Result<_, _>>()?)
            }
            9 => {
                let count = r.u32()?;
                Operand::StringSet(
                    (0..count)
                        .map(|_| read_string(r))
                        .collect::<Result<_, _>>()?,
                )
            }
            other => return Err(WireError::UnknownOperandKind(other)),
        })
    }

    /// Standalone encoding, as used for parameter rebinding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::String(v.to_owned())
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int(v) => write!(f, "{v}"),
            Operand::IntRange(lo, hi) => write!(f, "{lo}..={hi}"),
            Operand::Double(v) => write!(f, "{v}"),
            Operand::DoubleRange(lo, hi) => write!(f, "{lo}..={hi}"),
            Operand::String(v) => write!(f, "{v:?}"),
            Operand::Bytes(v) => write!(f, "{} bytes", v.len()),
            Operand::Int32Set(v) => write!(f, "{v:?}"),
            Operand::Int64Set(v) => write!(f, "{v:?}"),
            Operand::StringSet(v) => write!(f, "{v:?}"),
        }
    }
}

fn read_string(r: &mut Reader<'_>) -> Result<String, WireError> {
    let raw = r.bytes()?;
    String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
}

/// One decoded condition of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionFrame {
    pub operator: Operator,
    pub property: PropertyId,
    pub flags: u8,
    pub operand: Operand,
}

impl ConditionFrame {
    pub fn case_sensitive(&self) -> bool {
        self.flags & FLAG_CASE_SENSITIVE != 0
    }

    pub fn or_equal(&self) -> bool {
        self.flags & FLAG_OR_EQUAL != 0
    }
}

/// Errors raised while parsing plans and operands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unsupported plan version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown operator code {0}")]
    UnknownOperator(u8),

    #[error("unknown operand kind {0}")]
    UnknownOperandKind(u8),

    #[error("string operand is not valid UTF-8")]
    InvalidUtf8,
}

/// Parse a complete plan into its entity and condition frames.
pub fn decode_plan(plan: &[u8]) -> Result<(EntityId, Vec<ConditionFrame>), WireError> {
    let mut r = Reader::new(plan);
    let version = r.u8()?;
    if version != PLAN_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let entity = r.u32()?;
    let count = r.u16()?;

    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let code = r.u8()?;
        let operator = Operator::from_code(code).ok_or(WireError::UnknownOperator(code))?;
        let property = r.u16()?;
        let flags = r.u8()?;
        let operand = Operand::decode(&mut r)?;
        frames.push(ConditionFrame {
            operator,
            property,
            flags,
            operand,
        });
    }
    r.finish()?;
    Ok((entity, frames))
}
