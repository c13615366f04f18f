//! Primitive field type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Value;
use crate::{ProtocolError, Result};

/// Primitive types a record field may be declared with.
///
/// Multi-byte values are always little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    /// Fixed-length byte array, copied verbatim
    Bytes(usize),
}

impl FieldType {
    /// Returns the width in bytes of this field type.
    pub const fn size(&self) -> usize {
        match self {
            FieldType::UInt8 | FieldType::Int8 => 1,
            FieldType::UInt16 | FieldType::Int16 => 2,
            FieldType::UInt32 | FieldType::Int32 | FieldType::Float32 => 4,
            FieldType::UInt64 | FieldType::Int64 => 8,
            FieldType::Bytes(len) => *len,
        }
    }

    /// Interpret a slice of exactly `self.size()` bytes.
    ///
    /// Callers slice the payload; a wrong length here is a programming error
    /// and is reported rather than panicking.
    pub fn read(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.len() != self.size() {
            return Err(ProtocolError::TypeConversion {
                details: format!("{} expects {} bytes, got {}", self, self.size(), bytes.len()),
            });
        }

        let value = match self {
            FieldType::UInt8 => Value::UInt8(bytes[0]),
            FieldType::Int8 => Value::Int8(bytes[0] as i8),
            FieldType::UInt16 => Value::UInt16(u16::from_le_bytes([bytes[0], bytes[1]])),
            FieldType::Int16 => Value::Int16(i16::from_le_bytes([bytes[0], bytes[1]])),
            FieldType::UInt32 => {
                Value::UInt32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::Int32 => {
                Value::Int32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::Float32 => {
                Value::Float32(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldType::UInt64 => Value::UInt64(u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldType::Int64 => Value::Int64(i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            FieldType::Bytes(_) => Value::Bytes(bytes.to_vec()),
        };

        Ok(value)
    }

    /// Append the wire form of `value` to `out`.
    ///
    /// Integer values are range-checked against the declared width; byte
    /// arrays shorter than the declared length are zero padded.
    pub fn write(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        let out_of_range = || ProtocolError::TypeConversion {
            details: format!("{:?} does not fit {}", value, self),
        };
        let int = || value.as_i128().ok_or_else(out_of_range);

        match self {
            FieldType::Float32 => {
                let float = match value {
                    Value::Float32(v) => *v,
                    other => other.as_f64().ok_or_else(out_of_range)? as f32,
                };
                out.extend_from_slice(&float.to_le_bytes());
            }
            FieldType::Bytes(len) => {
                let bytes = value.as_bytes().ok_or_else(out_of_range)?;
                if bytes.len() > *len {
                    return Err(out_of_range());
                }
                out.extend_from_slice(bytes);
                out.resize(out.len() + (len - bytes.len()), 0);
            }
            FieldType::UInt8 => out.push(u8::try_from(int()?).map_err(|_| out_of_range())?),
            FieldType::Int8 => out.push(i8::try_from(int()?).map_err(|_| out_of_range())? as u8),
            FieldType::UInt16 => out.extend_from_slice(
                &u16::try_from(int()?).map_err(|_| out_of_range())?.to_le_bytes(),
            ),
            FieldType::Int16 => out.extend_from_slice(
                &i16::try_from(int()?).map_err(|_| out_of_range())?.to_le_bytes(),
            ),
            FieldType::UInt32 => out.extend_from_slice(
                &u32::try_from(int()?).map_err(|_| out_of_range())?.to_le_bytes(),
            ),
            FieldType::Int32 => out.extend_from_slice(
                &i32::try_from(int()?).map_err(|_| out_of_range())?.to_le_bytes(),
            ),
            FieldType::UInt64 => out.extend_from_slice(
                &u64::try_from(int()?).map_err(|_| out_of_range())?.to_le_bytes(),
            ),
            FieldType::Int64 => out.extend_from_slice(
                &i64::try_from(int()?).map_err(|_| out_of_range())?.to_le_bytes(),
            ),
        }

        Ok(())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::UInt8 => f.write_str("u8"),
            FieldType::UInt16 => f.write_str("u16"),
            FieldType::UInt32 => f.write_str("u32"),
            FieldType::UInt64 => f.write_str("u64"),
            FieldType::Int8 => f.write_str("i8"),
            FieldType::Int16 => f.write_str("i16"),
            FieldType::Int32 => f.write_str("i32"),
            FieldType::Int64 => f.write_str("i64"),
            FieldType::Float32 => f.write_str("f32"),
            FieldType::Bytes(len) => write!(f, "bytes[{}]", len),
        }
    }
}

/// Accepts Rust-style names (`u16`, `bytes[4]`) and struct format codes (`H`, `4s`).
impl FromStr for FieldType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s {
            "u8" | "B" => Some(FieldType::UInt8),
            "u16" | "H" => Some(FieldType::UInt16),
            "u32" | "I" | "L" => Some(FieldType::UInt32),
            "u64" | "Q" => Some(FieldType::UInt64),
            "i8" | "b" => Some(FieldType::Int8),
            "i16" | "h" => Some(FieldType::Int16),
            "i32" | "i" | "l" => Some(FieldType::Int32),
            "i64" | "q" => Some(FieldType::Int64),
            "f32" | "f" => Some(FieldType::Float32),
            _ => s
                .strip_prefix("bytes[")
                .and_then(|rest| rest.strip_suffix(']'))
                .or_else(|| s.strip_suffix('s'))
                .and_then(|len| len.parse::<usize>().ok())
                .filter(|len| *len > 0)
                .map(FieldType::Bytes),
        };

        parsed.ok_or_else(|| ProtocolError::TypeConversion {
            details: format!("Unknown field type '{}'", s),
        })
    }
}

impl TryFrom<String> for FieldType {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}
