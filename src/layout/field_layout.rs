//! Declarative fixed-width record layouts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::FieldType;
use crate::{ProtocolError, Result};

/// One named field of a [`FieldLayout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Older firmware may omit this field from the end of the payload
    #[serde(default)]
    pub optional: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, optional: false }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, optional: true }
    }
}

/// Ordered, immutable field list for one message kind.
///
/// Offsets are implied by declaration order. Optional fields may only appear
/// after every required field, so a truncated payload can only drop optional
/// trailing data.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    name: String,
    fields: Vec<FieldSpec>,
    offsets: Vec<usize>,
    index: HashMap<String, usize>,
    width: usize,
    required_width: usize,
}

impl FieldLayout {
    /// Build a layout, validating field names and widths.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| ProtocolError::InvalidLayout { layout: name.clone(), reason };

        let mut offsets = Vec::with_capacity(fields.len());
        let mut index = HashMap::with_capacity(fields.len());
        let mut width = 0usize;
        let mut required_width = 0usize;
        let mut seen_optional: Option<&str> = None;

        for (position, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(invalid(format!("field #{} has an empty name", position)));
            }
            if field.field_type.size() == 0 {
                return Err(invalid(format!("field '{}' has zero width", field.name)));
            }
            if index.insert(field.name.clone(), position).is_some() {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            match (field.optional, seen_optional) {
                (true, None) => seen_optional = Some(&field.name),
                (false, Some(optional)) => {
                    return Err(invalid(format!(
                        "required field '{}' follows optional field '{}'",
                        field.name, optional
                    )));
                }
                _ => {}
            }

            offsets.push(width);
            width += field.field_type.size();
            if !field.optional {
                required_width = width;
            }
        }

        Ok(Self { name, fields, offsets, index, width, required_width })
    }

    pub fn builder(name: impl Into<String>) -> FieldLayoutBuilder {
        FieldLayoutBuilder { name: name.into(), fields: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Total payload width when every field is present.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Payload width covering every required field.
    pub fn required_width(&self) -> usize {
        self.required_width
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn field(&self, field: &str) -> Option<&FieldSpec> {
        self.index_of(field).map(|index| &self.fields[index])
    }

    pub fn offset_of(&self, field: &str) -> Option<usize> {
        self.index_of(field).map(|index| self.offsets[index])
    }

    /// Fields paired with their byte offsets, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldSpec, usize)> + '_ {
        self.fields.iter().zip(self.offsets.iter().copied())
    }
}

/// Incremental [`FieldLayout`] construction.
///
/// ```rust
/// use ef_ble_protocol::layout::FieldLayout;
/// use ef_ble_protocol::types::FieldType;
///
/// let layout = FieldLayout::builder("battery")
///     .field("soc", FieldType::UInt16)
///     .field("watts", FieldType::Int16)
///     .optional("cycles", FieldType::UInt32)
///     .build()
///     .unwrap();
///
/// assert_eq!(layout.width(), 8);
/// assert_eq!(layout.required_width(), 4);
/// assert_eq!(layout.offset_of("watts"), Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct FieldLayoutBuilder {
    name: String,
    fields: Vec<FieldSpec>,
}

impl FieldLayoutBuilder {
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec::new(name, field_type));
        self
    }

    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec::optional(name, field_type));
        self
    }

    /// Skip `len` bytes of reserved or undocumented data.
    pub fn reserved(self, name: impl Into<String>, len: usize) -> Self {
        self.field(name, FieldType::Bytes(len))
    }

    pub fn build(self) -> Result<FieldLayout> {
        FieldLayout::new(self.name, self.fields)
    }
}
