//! Mapping and derived-property declarations

use std::fmt;
use std::sync::Arc;

use super::{DeviceState, Transform};
use crate::layout::DecodedRecord;
use crate::types::{RecordKey, Value};

pub(crate) type RecordFn = dyn Fn(&DecodedRecord) -> Option<Value> + Send + Sync;
pub(crate) type DerivedFn = dyn Fn(&DeviceState) -> Option<Value> + Send + Sync;

/// Where a mapped property reads its value from.
#[derive(Clone)]
pub enum MappingSource {
    /// One field of the record, optionally transformed.
    Field { field: String, transform: Option<Transform> },
    /// A value computed from the whole record; `None` leaves the property as is.
    Record(Arc<RecordFn>),
}

impl fmt::Debug for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSource::Field { field, transform } => f
                .debug_struct("Field")
                .field("field", field)
                .field("transform", transform)
                .finish(),
            MappingSource::Record(_) => f.write_str("Record(..)"),
        }
    }
}

/// Binds one device property to a decoded record.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub property: String,
    pub record: RecordKey,
    pub source: MappingSource,
}

impl FieldMapping {
    /// Resolve the property value from a record of the matching kind.
    ///
    /// Absent fields yield `None`, leaving the stored property untouched.
    pub fn resolve(&self, record: &DecodedRecord) -> Option<Value> {
        match &self.source {
            MappingSource::Field { field, transform } => {
                let raw = record.get(field)?;
                Some(match transform {
                    Some(transform) => transform.apply(raw),
                    None => raw.clone(),
                })
            }
            MappingSource::Record(compute) => compute(record),
        }
    }
}

/// A property computed from other properties after direct mappings ran.
#[derive(Clone)]
pub struct DerivedProperty {
    pub name: String,
    /// Recomputed whenever one of these changed in the current cycle
    pub dependencies: Vec<String>,
    pub(crate) compute: Arc<DerivedFn>,
}

impl DerivedProperty {
    pub fn is_triggered(&self, state: &DeviceState) -> bool {
        self.dependencies.iter().any(|dependency| state.was_updated(dependency))
    }

    pub fn compute(&self, state: &DeviceState) -> Option<Value> {
        (self.compute)(state)
    }
}

impl fmt::Debug for DerivedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedProperty")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
