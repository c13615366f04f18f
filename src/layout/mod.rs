//! Fixed-layout record decoding.
//!
//! A [`FieldLayout`] lists typed fields whose offsets follow from declaration
//! order. Applying it to a payload yields a [`DecodedRecord`]; payloads that
//! end early leave the uncovered trailing fields absent instead of failing.
//!
//! ```rust
//! use std::sync::Arc;
//! use ef_ble_protocol::layout::FieldLayout;
//! use ef_ble_protocol::types::{FieldType, Value};
//!
//! let layout = Arc::new(
//!     FieldLayout::builder("battery")
//!         .field("soc", FieldType::UInt16)
//!         .field("watts", FieldType::Int16)
//!         .build()
//!         .unwrap(),
//! );
//!
//! let record = layout.decode(&[0x64, 0x00, 0xE8, 0x03]);
//! assert_eq!(record.get("soc"), Some(&Value::UInt16(100)));
//! assert_eq!(record.get("watts"), Some(&Value::Int16(1000)));
//! ```

mod decoder;
mod field_layout;
mod record;
mod registry;
mod tagged;

pub use field_layout::{FieldLayout, FieldLayoutBuilder, FieldSpec};
pub use record::DecodedRecord;
pub use registry::{LayoutRegistry, RecordSchema};
pub use tagged::TaggedSchema;
