//! Decoded record values

use std::sync::Arc;

use super::FieldLayout;
use crate::types::{FromValue, Value};
use crate::{ProtocolError, Result};

/// Result of applying a [`FieldLayout`] to one payload.
///
/// Values are stored in layout order; a field is `None` when the payload
/// ended before it. Records are never mutated after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    layout: Arc<FieldLayout>,
    values: Vec<Option<Value>>,
    payload_len: usize,
}

impl DecodedRecord {
    pub(crate) fn new(layout: Arc<FieldLayout>, values: Vec<Option<Value>>, payload_len: usize) -> Self {
        debug_assert_eq!(layout.len(), values.len());
        Self { layout, values, payload_len }
    }

    pub fn layout(&self) -> &Arc<FieldLayout> {
        &self.layout
    }

    /// Name of the layout this record was decoded with.
    pub fn layout_name(&self) -> &str {
        self.layout.name()
    }

    /// Length of the payload the record was decoded from.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Value of a present field. Unknown and absent fields both yield `None`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.layout.index_of(field).and_then(|index| self.values[index].as_ref())
    }

    /// Typed read of a present field.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Option<T> {
        self.get(field).and_then(|value| T::from_value(value).ok())
    }

    /// Typed read that distinguishes a missing field from a conversion failure.
    pub fn require<T: FromValue>(&self, field: &str) -> Result<T> {
        let value = self
            .get(field)
            .ok_or_else(|| ProtocolError::field_not_found(self.layout.name(), field))?;
        T::from_value(value)
    }

    pub fn is_present(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    /// Names of fields the payload did not cover, in layout order.
    pub fn absent_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.iter().filter(|(_, value)| value.is_none()).map(|(name, _)| name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> + '_ {
        self.layout
            .fields()
            .iter()
            .zip(self.values.iter())
            .map(|(spec, value)| (spec.name.as_str(), value.as_ref()))
    }

    /// Fail with [`ProtocolError::LayoutLengthMismatch`] for the first absent
    /// required field.
    pub fn ensure_complete(&self) -> Result<()> {
        let missing = self
            .layout
            .iter()
            .zip(self.values.iter())
            .find(|((spec, _), value)| !spec.optional && value.is_none());

        match missing {
            Some(((spec, offset), _)) => Err(ProtocolError::LayoutLengthMismatch {
                layout: self.layout.name().to_string(),
                field: spec.name.clone(),
                offset,
                needed: offset + spec.field_type.size(),
                actual: self.payload_len,
            }),
            None => Ok(()),
        }
    }
}
