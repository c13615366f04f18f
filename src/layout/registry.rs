//! Record key to layout bindings

use std::collections::HashMap;
use std::sync::Arc;

use super::{DecodedRecord, FieldLayout, TaggedSchema};
use crate::types::RecordKey;
use crate::{ProtocolError, Result};

/// How a record's payload is laid out.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSchema {
    Fixed(Arc<FieldLayout>),
    Tagged(Arc<TaggedSchema>),
}

impl RecordSchema {
    /// Field list of the record, as decoded.
    pub fn layout(&self) -> &Arc<FieldLayout> {
        match self {
            RecordSchema::Fixed(layout) => layout,
            RecordSchema::Tagged(schema) => schema.layout(),
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.layout().has_field(field)
    }

    pub fn decode(&self, payload: &[u8]) -> DecodedRecord {
        match self {
            RecordSchema::Fixed(layout) => layout.decode(payload),
            RecordSchema::Tagged(schema) => schema.decode(payload),
        }
    }
}

impl From<FieldLayout> for RecordSchema {
    fn from(layout: FieldLayout) -> Self {
        RecordSchema::Fixed(Arc::new(layout))
    }
}

impl From<Arc<FieldLayout>> for RecordSchema {
    fn from(layout: Arc<FieldLayout>) -> Self {
        RecordSchema::Fixed(layout)
    }
}

impl From<TaggedSchema> for RecordSchema {
    fn from(schema: TaggedSchema) -> Self {
        RecordSchema::Tagged(Arc::new(schema))
    }
}

/// Named record kinds known to a device.
///
/// Several keys may share one schema, e.g. a primary and a secondary battery
/// pack reporting the same heartbeat.
///
/// ```rust
/// use ef_ble_protocol::layout::{FieldLayout, LayoutRegistry};
/// use ef_ble_protocol::types::FieldType;
///
/// let pack = FieldLayout::builder("bms").field("soc", FieldType::UInt8).build().unwrap();
/// let mut registry = LayoutRegistry::new();
/// registry.register("bms_main", pack);
/// registry.alias("bms_slave", "bms_main").unwrap();
///
/// let slave = registry.decode("bms_slave", &[42]).unwrap();
/// assert_eq!(slave.get_as::<u8>("soc"), Some(42));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    records: HashMap<RecordKey, RecordSchema>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to a schema, replacing any earlier binding.
    pub fn register(&mut self, key: impl Into<RecordKey>, schema: impl Into<RecordSchema>) {
        self.records.insert(key.into(), schema.into());
    }

    /// Bind `key` to the schema already registered under `existing`.
    pub fn alias(&mut self, key: impl Into<RecordKey>, existing: &str) -> Result<()> {
        let schema = self.lookup(existing)?.clone();
        self.records.insert(key.into(), schema);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RecordSchema> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> + '_ {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Result<&RecordSchema> {
        self.records
            .get(key)
            .ok_or_else(|| ProtocolError::UnknownRecord { record: key.to_string() })
    }

    pub fn decode(&self, key: &str, payload: &[u8]) -> Result<DecodedRecord> {
        Ok(self.lookup(key)?.decode(payload))
    }
}
