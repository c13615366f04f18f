//! Records carried as varint tagged fields

use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use super::{DecodedRecord, FieldLayout, FieldSpec};
use crate::codec::{decode_tagged_fields, encode_tagged_fields};
use crate::types::{FieldType, Value};
use crate::{ProtocolError, Result};

/// Field-number to name table for a tagged-field payload.
///
/// Decoded records expose the named varint entries as `u64` values. Every
/// field is optional since a payload carries only the entries it chose to
/// send.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedSchema {
    layout: Arc<FieldLayout>,
    numbers: Vec<u32>,
    by_number: HashMap<u32, usize>,
}

impl TaggedSchema {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let name = name.into();
        let mut numbers = Vec::new();
        let mut by_number = HashMap::new();
        let mut specs = Vec::new();

        for (number, field) in fields {
            if by_number.insert(number, numbers.len()).is_some() {
                return Err(ProtocolError::InvalidLayout {
                    layout: name,
                    reason: format!("duplicate field number {}", number),
                });
            }
            numbers.push(number);
            specs.push(FieldSpec::optional(field, FieldType::UInt64));
        }

        let layout = Arc::new(FieldLayout::new(name, specs)?);
        Ok(Self { layout, numbers, by_number })
    }

    pub fn name(&self) -> &str {
        self.layout.name()
    }

    /// Field list as a layout of optional `u64` fields.
    pub fn layout(&self) -> &Arc<FieldLayout> {
        &self.layout
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.layout.has_field(field)
    }

    pub fn field_number(&self, field: &str) -> Option<u32> {
        self.layout.index_of(field).map(|index| self.numbers[index])
    }

    /// Decode the named entries of a tagged payload; unnamed entries are dropped.
    pub fn decode(&self, payload: &[u8]) -> DecodedRecord {
        let mut values = vec![None; self.layout.len()];
        for (number, value) in decode_tagged_fields(payload) {
            match self.by_number.get(&number) {
                Some(&index) => values[index] = Some(Value::UInt64(value)),
                None => trace!(schema = self.name(), number, value, "Skipping unnamed tagged field"),
            }
        }
        DecodedRecord::new(Arc::clone(&self.layout), values, payload.len())
    }

    /// Encode named values as tagged entries, in the order given.
    pub fn encode<'a, I>(&self, values: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let entries = values
            .into_iter()
            .map(|(field, value)| {
                self.field_number(field)
                    .map(|number| (number, value))
                    .ok_or_else(|| ProtocolError::field_not_found(self.name(), field))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(encode_tagged_fields(entries))
    }
}
