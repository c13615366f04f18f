//! Mapping table evaluation and cycle bookkeeping

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use super::mapping::{DerivedProperty, FieldMapping, MappingSource};
use super::{ChangeSink, DeviceState, PropertyChange, Transform};
use crate::layout::{DecodedRecord, FieldLayout, LayoutRegistry};
use crate::types::{FromValue, RecordKey, Value};
use crate::{ProtocolError, Result};

/// Projects decoded records onto named device properties.
///
/// Mappings and derived properties are registered once when the device is
/// built. Each notification then runs one cycle:
///
/// 1. [`reset_updated`](Self::reset_updated)
/// 2. one or more [`update_from_bytes`](Self::update_from_bytes) /
///    [`update_from_record`](Self::update_from_record) calls
/// 3. [`finish_cycle`](Self::finish_cycle) to recompute derived properties
/// 4. [`updated_fields`](Self::updated_fields) / [`dispatch`](Self::dispatch)
///
/// ```rust
/// use std::sync::Arc;
/// use ef_ble_protocol::layout::FieldLayout;
/// use ef_ble_protocol::projection::{FieldProjection, Transform};
/// use ef_ble_protocol::types::{FieldType, Value};
///
/// let layout = Arc::new(
///     FieldLayout::builder("battery")
///         .field("soc", FieldType::UInt16)
///         .field("watts", FieldType::Int16)
///         .build()
///         .unwrap(),
/// );
///
/// let mut projection = FieldProjection::new();
/// projection.register_mapping("battery_level", "battery", "soc", None);
/// projection.register_mapping("output_power", "battery", "watts", Some(Transform::divide(10.0)));
///
/// projection.reset_updated();
/// projection.update_from_bytes("battery", &layout, &[0x64, 0x00, 0xE8, 0x03]);
/// assert_eq!(projection.get("output_power"), Some(&Value::Float64(100.0)));
/// assert_eq!(projection.updated_fields().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldProjection {
    mappings: Vec<FieldMapping>,
    by_record: HashMap<RecordKey, Vec<usize>>,
    derived: Vec<DerivedProperty>,
    state: DeviceState,
}

impl FieldProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `property` to `field` of records of kind `record`.
    pub fn register_mapping(
        &mut self,
        property: impl Into<String>,
        record: impl Into<RecordKey>,
        field: impl Into<String>,
        transform: Option<Transform>,
    ) -> &mut Self {
        self.push_mapping(FieldMapping {
            property: property.into(),
            record: record.into(),
            source: MappingSource::Field { field: field.into(), transform },
        })
    }

    /// Bind `property` to a value computed from the whole record.
    pub fn register_computed<F>(
        &mut self,
        property: impl Into<String>,
        record: impl Into<RecordKey>,
        compute: F,
    ) -> &mut Self
    where
        F: Fn(&DecodedRecord) -> Option<Value> + Send + Sync + 'static,
    {
        self.push_mapping(FieldMapping {
            property: property.into(),
            record: record.into(),
            source: MappingSource::Record(Arc::new(compute)),
        })
    }

    /// Declare a property recomputed after direct mappings whenever one of
    /// `dependencies` changed this cycle.
    ///
    /// Derived properties run in registration order and may depend on
    /// earlier derived properties.
    pub fn register_derived<I, S, F>(
        &mut self,
        name: impl Into<String>,
        dependencies: I,
        compute: F,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&DeviceState) -> Option<Value> + Send + Sync + 'static,
    {
        self.derived.push(DerivedProperty {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            compute: Arc::new(compute),
        });
        self
    }

    fn push_mapping(&mut self, mapping: FieldMapping) -> &mut Self {
        self.by_record.entry(mapping.record.clone()).or_default().push(self.mappings.len());
        self.mappings.push(mapping);
        self
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn derived(&self) -> &[DerivedProperty] {
        &self.derived
    }

    /// Whether any mapping reads records of kind `record`.
    pub fn handles(&self, record: &str) -> bool {
        self.by_record.contains_key(record)
    }

    /// Start a new cycle.
    pub fn reset_updated(&mut self) {
        self.state.reset_updated();
    }

    /// Decode `payload` and apply every mapping for `record`.
    pub fn update_from_bytes(
        &mut self,
        record: &str,
        layout: &Arc<FieldLayout>,
        payload: &[u8],
    ) -> DecodedRecord {
        let decoded = layout.decode(payload);
        self.update_from_record(record, &decoded);
        decoded
    }

    /// Apply every mapping for `record`, returning how many properties changed.
    pub fn update_from_record(&mut self, record: &str, decoded: &DecodedRecord) -> usize {
        let Some(indices) = self.by_record.get(record) else {
            trace!(record, "No mappings for record");
            return 0;
        };

        let mut changed = 0;
        for &index in indices {
            let mapping = &self.mappings[index];
            if let Some(value) = mapping.resolve(decoded)
                && self.state.set(&mapping.property, value)
            {
                changed += 1;
            }
        }

        debug!(record, layout = decoded.layout_name(), changed, "Applied record mappings");
        changed
    }

    /// Store a value computed by device logic; returns whether it changed.
    pub fn set_property(&mut self, property: &str, value: impl Into<Value>) -> bool {
        self.state.set(property, value.into())
    }

    /// Recompute derived properties whose dependencies changed this cycle.
    pub fn finish_cycle(&mut self) {
        for derived in &self.derived {
            if !derived.is_triggered(&self.state) {
                continue;
            }
            if let Some(value) = derived.compute(&self.state) {
                let changed = self.state.set(&derived.name, value);
                trace!(property = %derived.name, changed, "Recomputed derived property");
            }
        }
    }

    pub fn updated_fields(&self) -> &BTreeSet<String> {
        self.state.updated_fields()
    }

    /// Changed properties of this cycle with their new values.
    pub fn changes(&self) -> Vec<PropertyChange> {
        let mut changes = Vec::new();
        self.dispatch(&mut changes);
        changes
    }

    /// Notify `sink` once per property changed this cycle, in name order.
    pub fn dispatch<S: ChangeSink + ?Sized>(&self, sink: &mut S) {
        for property in self.state.updated_fields() {
            if let Some(value) = self.state.get(property) {
                sink.property_changed(property, value);
            }
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.state.get(property)
    }

    pub fn get_as<T: FromValue>(&self, property: &str) -> Option<T> {
        self.state.get_as(property)
    }

    /// Check every mapping and derived dependency against known records.
    pub fn validate(&self, registry: &LayoutRegistry) -> Result<()> {
        let mut known: HashSet<&str> = HashSet::new();

        for mapping in &self.mappings {
            let schema = registry.lookup(mapping.record.as_str())?;
            if let MappingSource::Field { field, .. } = &mapping.source
                && !schema.has_field(field)
            {
                return Err(ProtocolError::field_not_found(mapping.record.as_str(), field));
            }
            known.insert(&mapping.property);
        }

        for derived in &self.derived {
            if let Some(missing) =
                derived.dependencies.iter().find(|dependency| !known.contains(dependency.as_str()))
            {
                return Err(ProtocolError::config_error(
                    format!("derived property '{}'", derived.name),
                    format!("depends on unknown property '{}'", missing),
                ));
            }
            known.insert(&derived.name);
        }

        Ok(())
    }
}
