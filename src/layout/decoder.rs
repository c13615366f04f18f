//! Payload decoding and encoding against a [`FieldLayout`]

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{DecodedRecord, FieldLayout};
use crate::types::Value;
use crate::{ProtocolError, Result};

impl FieldLayout {
    /// Decode a payload into a record.
    ///
    /// Decoding stops at the first field the payload does not fully cover;
    /// that field and every later one are reported absent. Bytes past the
    /// layout width are ignored.
    pub fn decode(self: &Arc<Self>, payload: &[u8]) -> DecodedRecord {
        let mut values = Vec::with_capacity(self.len());

        for (spec, offset) in self.iter() {
            let end = offset + spec.field_type.size();
            let Some(bytes) = payload.get(offset..end) else {
                break;
            };
            // slice length always matches the declared width
            match spec.field_type.read(bytes) {
                Ok(value) => {
                    trace!(layout = self.name(), field = %spec.name, offset, %value, "Decoded field");
                    values.push(Some(value));
                }
                Err(_) => break,
            }
        }

        if values.len() < self.len() {
            debug!(
                layout = self.name(),
                payload_len = payload.len(),
                width = self.width(),
                absent = self.len() - values.len(),
                "Payload truncated, trailing fields absent"
            );
        }
        values.resize(self.len(), None);

        DecodedRecord::new(Arc::clone(self), values, payload.len())
    }

    /// Decode a payload, failing when a required field is not covered.
    pub fn decode_strict(self: &Arc<Self>, payload: &[u8]) -> Result<DecodedRecord> {
        let record = self.decode(payload);
        record.ensure_complete()?;
        Ok(record)
    }

    /// Write named values into a payload in layout order.
    ///
    /// Every required field must be supplied. Optional fields may be left
    /// out from the end; the payload stops at the first one missing.
    pub fn encode<'a, I>(&self, values: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut values: HashMap<&str, Value> = values.into_iter().collect();
        let mut out = Vec::with_capacity(self.width());
        let mut truncated_at: Option<&str> = None;

        for spec in self.fields() {
            match (values.remove(spec.name.as_str()), truncated_at) {
                (Some(_), Some(missing)) => {
                    return Err(ProtocolError::InvalidLayout {
                        layout: self.name().to_string(),
                        reason: format!(
                            "field '{}' supplied after absent optional field '{}'",
                            spec.name, missing
                        ),
                    });
                }
                (Some(value), None) => spec.field_type.write(&value, &mut out)?,
                (None, _) if spec.optional => {
                    truncated_at.get_or_insert(spec.name.as_str());
                }
                (None, _) => return Err(ProtocolError::field_not_found(self.name(), &spec.name)),
            }
        }

        if let Some(unknown) = values.keys().next() {
            return Err(ProtocolError::field_not_found(self.name(), *unknown));
        }

        Ok(out)
    }
}
