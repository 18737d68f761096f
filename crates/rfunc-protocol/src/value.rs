//! Runtime values and their self-describing binary encoding.
//!
//! Every value on the wire looks the same from the outside:
//!
//! ```text
//! ┌──────────┬──────────────────┬───────────────────────┐
//! │ tag: u8  │ payload_len: i32 │ payload (len bytes)   │
//! └──────────┴──────────────────┴───────────────────────┘
//! ```
//!
//! Numbers are big-endian two's complement (integers) or IEEE 754 bit
//! patterns (floats). Strings are UTF-8. Booleans are a single byte.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Byte written for `true`. Decoding treats any other byte as `false`.
const BOOL_TRUE: u8 = 0xFF;
const BOOL_FALSE: u8 = 0x00;

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// The closed set of primitive kinds a [`Value`] can hold.
///
/// The numeric tags are a durable wire contract: they must never be
/// reassigned, or old peers would decode garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
}

impl ValueType {
    /// Every value type, in tag order.
    pub const ALL: [ValueType; 8] = [
        ValueType::Int8,
        ValueType::Int16,
        ValueType::Int32,
        ValueType::Int64,
        ValueType::Float32,
        ValueType::Float64,
        ValueType::Bool,
        ValueType::String,
    ];

    /// The one-byte tag used on the wire.
    pub const fn tag(self) -> u8 {
        match self {
            ValueType::Int8 => 0x01,
            ValueType::Int16 => 0x02,
            ValueType::Int32 => 0x03,
            ValueType::Int64 => 0x04,
            ValueType::Float32 => 0x05,
            ValueType::Float64 => 0x06,
            ValueType::Bool => 0x07,
            ValueType::String => 0x81,
        }
    }

    /// Looks up a value type by its wire tag.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnsupportedType`] for any tag outside the
    /// closed set.
    pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|vt| vt.tag() == tag)
            .ok_or(ProtocolError::UnsupportedType(tag))
    }

    /// The canonical lowercase name used in argument specification text.
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Bool => "bool",
            ValueType::String => "string",
        }
    }

    /// Looks up a value type by its canonical name. Case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|vt| vt.name() == name)
    }

    /// Payload width for fixed-width types, `None` for strings.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::Int8 | ValueType::Bool => Some(1),
            ValueType::Int16 => Some(2),
            ValueType::Int32 | ValueType::Float32 => Some(4),
            ValueType::Int64 | ValueType::Float64 => Some(8),
            ValueType::String => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            ProtocolError::Parse(format!("cannot parse '{s}' as a value type"))
        })
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single immutable runtime value: one payload of one [`ValueType`].
///
/// Arguments and return values of remote methods are all `Value`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl Value {
    /// Size of the tag plus the length prefix.
    pub const HEADER_LEN: usize = 5;

    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int8(_) => ValueType::Int8,
            Value::Int16(_) => ValueType::Int16,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Float32(_) => ValueType::Float32,
            Value::Float64(_) => ValueType::Float64,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            other => other.value_type().fixed_width().unwrap_or_default(),
        }
    }

    /// Total number of bytes [`encode`](Self::encode) writes.
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.payload_len()
    }

    /// Appends the wire encoding of this value to `buf`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidArgument`] if a string payload is
    /// too long for the 32-bit signed length prefix.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), ProtocolError> {
        let len = i32::try_from(self.payload_len()).map_err(|_| {
            ProtocolError::InvalidArgument(format!(
                "value payload of {} bytes exceeds the length prefix",
                self.payload_len()
            ))
        })?;

        buf.put_u8(self.value_type().tag());
        buf.put_i32(len);
        match self {
            Value::Int8(v) => buf.put_i8(*v),
            Value::Int16(v) => buf.put_i16(*v),
            Value::Int32(v) => buf.put_i32(*v),
            Value::Int64(v) => buf.put_i64(*v),
            Value::Float32(v) => buf.put_f32(*v),
            Value::Float64(v) => buf.put_f64(*v),
            Value::Bool(v) => buf.put_u8(if *v { BOOL_TRUE } else { BOOL_FALSE }),
            Value::String(s) => buf.put_slice(s.as_bytes()),
        }
        Ok(())
    }

    /// Encodes this value into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Reads exactly one value from the front of `buf`.
    ///
    /// # Errors
    /// - [`ProtocolError::UnsupportedType`] for an unknown tag.
    /// - [`ProtocolError::Malformed`] for truncated input, a negative
    ///   length, a length that does not match a fixed-width type, or a
    ///   string payload that is not UTF-8.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        if buf.remaining() < Self::HEADER_LEN {
            return Err(ProtocolError::truncated(
                "value header",
                Self::HEADER_LEN,
                buf.remaining(),
            ));
        }

        let value_type = ValueType::from_tag(buf.get_u8())?;
        let raw_len = buf.get_i32();
        let len = usize::try_from(raw_len).map_err(|_| {
            ProtocolError::Malformed(format!("negative value length {raw_len}"))
        })?;

        if buf.remaining() < len {
            return Err(ProtocolError::truncated(
                "value payload",
                len,
                buf.remaining(),
            ));
        }

        if let Some(width) = value_type.fixed_width() {
            if len != width {
                return Err(ProtocolError::Malformed(format!(
                    "{value_type} payload must be {width} bytes, got {len}"
                )));
            }
        }

        let value = match value_type {
            ValueType::Int8 => Value::Int8(buf.get_i8()),
            ValueType::Int16 => Value::Int16(buf.get_i16()),
            ValueType::Int32 => Value::Int32(buf.get_i32()),
            ValueType::Int64 => Value::Int64(buf.get_i64()),
            ValueType::Float32 => Value::Float32(buf.get_f32()),
            ValueType::Float64 => Value::Float64(buf.get_f64()),
            ValueType::Bool => Value::Bool(buf.get_u8() == BOOL_TRUE),
            ValueType::String => {
                let raw = buf.copy_to_bytes(len);
                let s = std::str::from_utf8(&raw).map_err(|e| {
                    ProtocolError::Malformed(format!("string value is not UTF-8: {e}"))
                })?;
                Value::String(s.to_owned())
            }
        };
        Ok(value)
    }

    /// Decodes a buffer that must hold exactly one value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = bytes;
        let value = Self::decode(&mut buf)?;
        if buf.has_remaining() {
            return Err(ProtocolError::Malformed(format!(
                "{} trailing bytes after value",
                buf.remaining()
            )));
        }
        Ok(value)
    }

    /// Returns the payload if this is an `int32`.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the payload if this is an `int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the payload if this is a `bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the payload if this is a `string`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Renders the bare payload. This is also how values are passed as
/// command-line arguments to external programs.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    String => String,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
