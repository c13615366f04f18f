//! Change dispatch

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// One property that changed during a cycle, with its new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    pub value: Value,
}

/// Receiver for per-property change notifications.
///
/// Implemented for closures taking `(&str, &Value)` and for
/// `Vec<PropertyChange>`, which records every call.
pub trait ChangeSink {
    fn property_changed(&mut self, property: &str, value: &Value);
}

impl<F> ChangeSink for F
where
    F: FnMut(&str, &Value),
{
    fn property_changed(&mut self, property: &str, value: &Value) {
        self(property, value)
    }
}

impl ChangeSink for Vec<PropertyChange> {
    fn property_changed(&mut self, property: &str, value: &Value) {
        self.push(PropertyChange { property: property.to_string(), value: value.clone() });
    }
}
