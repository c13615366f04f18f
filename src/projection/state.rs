//! Per-device property store with change tracking

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{FromValue, Value};

/// Current property values plus the names changed in the running cycle.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    values: HashMap<String, Value>,
    updated: BTreeSet<String>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn get_as<T: FromValue>(&self, property: &str) -> Option<T> {
        self.get(property).and_then(|value| T::from_value(value).ok())
    }

    pub fn contains(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    /// Store a value, returning whether it changed.
    ///
    /// Writing the value a property already holds is not a change, even when
    /// it arrives with a different integer width. A changed property joins
    /// the updated set for this cycle.
    pub fn set(&mut self, property: &str, value: Value) -> bool {
        if self.values.get(property).is_some_and(|current| current.same_as(&value)) {
            return false;
        }
        self.values.insert(property.to_string(), value);
        self.updated.insert(property.to_string());
        true
    }

    pub fn reset_updated(&mut self) {
        self.updated.clear();
    }

    pub fn updated_fields(&self) -> &BTreeSet<String> {
        &self.updated
    }

    pub fn was_updated(&self, property: &str) -> bool {
        self.updated.contains(property)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sorted copy of every property value.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.iter().map(|(name, value)| (name.clone(), value.clone())).collect()
    }
}
