//! Core types for packets, record fields and property values.
//!
//! ## Architecture
//!
//! - [`Packet`] is one routed frame with its payload already de-obfuscated
//! - [`FieldType`] describes a fixed-width primitive with its byte size
//! - [`Value`] holds decoded field values and projected property values
//! - [`FromValue`] provides typed reads out of a [`Value`]
//! - [`RecordKey`] names a kind of decoded record
//! - [`IntFieldEnum`] maps vendor integer codes to named states
//!
//! ## Usage Example
//!
//! ```rust
//! use ef_ble_protocol::types::{FieldType, FromValue, Value};
//!
//! let watts = FieldType::Int16.read(&[0xE8, 0x03]).unwrap();
//! assert_eq!(watts, Value::Int16(1000));
//! assert_eq!(u32::from_value(&watts).unwrap(), 1000);
//!
//! let parsed: FieldType = "4s".parse().unwrap();
//! assert_eq!(parsed, FieldType::Bytes(4));
//! ```

mod field_type;
mod int_enum;
mod packet;
mod record_key;
mod value;

pub use field_type::FieldType;
pub use int_enum::IntFieldEnum;
pub use packet::{DEFAULT_DEVICE_ROUTE, DEFAULT_PRODUCT_ID, Packet, Route};
pub use record_key::RecordKey;
pub use value::{FromValue, Value};
