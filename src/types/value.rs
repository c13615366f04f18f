//! Runtime values and typed extraction

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::{ProtocolError, Result};

/// Runtime value held by decoded record fields and device properties.
///
/// Equality is value equality; it decides whether a property changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
    Text(String),
    /// Vendor enumeration with its raw code and lowercase state name
    Enum { raw: i64, name: Cow<'static, str> },
}

impl Value {
    /// Integer view of integer, bool and enum values.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Bool(b) => Some(*b as i128),
            Value::UInt8(v) => Some(*v as i128),
            Value::UInt16(v) => Some(*v as i128),
            Value::UInt32(v) => Some(*v as i128),
            Value::UInt64(v) => Some(*v as i128),
            Value::Int8(v) => Some(*v as i128),
            Value::Int16(v) => Some(*v as i128),
            Value::Int32(v) => Some(*v as i128),
            Value::Int64(v) => Some(*v as i128),
            Value::Enum { raw, .. } => Some(*raw as i128),
            Value::Float32(_)
            | Value::Float64(_)
            | Value::Bytes(_)
            | Value::Text(_) => None,
        }
    }

    /// Value equality across integer widths.
    ///
    /// Plain integers compare numerically, so `UInt8(90)` matches
    /// `UInt64(90)`. Bools, enums and everything else use `==`.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.plain_integer(), other.plain_integer()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    fn plain_integer(&self) -> Option<i128> {
        match self {
            Value::Bool(_) | Value::Enum { .. } => None,
            other => other.as_i128(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    /// Numeric view of any integer or float value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Bool values as-is, integers as `!= 0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Enum { .. } => None,
            other => other.as_i128().map(|v| v != 0),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            Value::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Short type name used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::UInt8(_) => "u8",
            Value::UInt16(_) => "u16",
            Value::UInt32(_) => "u32",
            Value::UInt64(_) => "u64",
            Value::Int8(_) => "i8",
            Value::Int16(_) => "i16",
            Value::Int32(_) => "i32",
            Value::Int64(_) => "i64",
            Value::Float32(_) => "f32",
            Value::Float64(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Enum { .. } => "enum",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Text(text) => f.write_str(text),
            Value::Enum { name, .. } => f.write_str(name),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Vec<u8> => Bytes,
    String => Text,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// Trait for types that can be read out of a [`Value`].
///
/// Integer targets accept any integer-like value that fits; floats accept
/// any numeric value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn conversion_error(value: &Value, target: &str) -> ProtocolError {
    ProtocolError::TypeConversion {
        details: format!("Cannot convert {} value {} to {}", value.type_name(), value, target),
    }
}

macro_rules! from_value_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    value
                        .as_i128()
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| conversion_error(value, stringify!($ty)))
                }
            }
        )*
    };
}

from_value_int!(u8, u16, u32, u64, i8, i16, i32, i64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| conversion_error(value, "f64"))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().map(|v| v as f32).ok_or_else(|| conversion_error(value, "f32"))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| conversion_error(value, "bool"))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| conversion_error(value, "bytes"))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_str().map(str::to_string).ok_or_else(|| conversion_error(value, "text"))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}
