//! Pure value transforms applied by field mappings

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{IntFieldEnum, Value};

/// Decimal places beyond this are below `f64` precision.
const MAX_ROUND_DECIMALS: i32 = 17;

type TransformFn = dyn Fn(&Value) -> Value + Send + Sync;

/// A pure `raw -> property` conversion.
///
/// Transforms never fail: an input of the wrong kind passes through
/// unchanged so a misconfigured mapping shows up as an odd value, not a
/// dropped notification.
#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl Transform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, value: &Value) -> Value {
        (self.0)(value)
    }

    /// Run `next` on the output of this transform.
    pub fn then(self, next: Transform) -> Self {
        Self::new(move |value| next.apply(&self.apply(value)))
    }

    /// Multiply a numeric value, producing a float.
    pub fn scale(factor: f64) -> Self {
        Self::numeric(move |v| v * factor)
    }

    /// Divide a numeric value, producing a float.
    pub fn divide(divisor: f64) -> Self {
        Self::numeric(move |v| v / divisor)
    }

    /// Round a numeric value to `decimals` places.
    ///
    /// Places past what an `f64` can represent leave the value unchanged.
    pub fn round(decimals: u32) -> Self {
        let places = i32::try_from(decimals).map_or(MAX_ROUND_DECIMALS, |d| d.min(MAX_ROUND_DECIMALS));
        let factor = 10f64.powi(places);
        Self::numeric(move |v| {
            let scaled = v * factor;
            if scaled.is_finite() { scaled.round() / factor } else { v }
        })
    }

    /// `true` when the raw integer equals `target`.
    pub fn equals(target: i64) -> Self {
        Self::integer_test(move |raw| raw == target)
    }

    /// `true` when the raw integer is one of `targets`.
    pub fn one_of(targets: impl IntoIterator<Item = i64>) -> Self {
        let targets: Vec<i64> = targets.into_iter().collect();
        Self::integer_test(move |raw| targets.contains(&raw))
    }

    /// Map the raw integer to a variant of `E`, falling back to `Unknown`.
    pub fn int_enum<E: IntFieldEnum>() -> Self {
        Self::new(|value| match value.as_i64() {
            Some(raw) => E::from_raw(raw).to_value(),
            None => value.clone(),
        })
    }

    /// Map raw integers to names from a table; unlisted codes become `unknown`.
    pub fn named(table: BTreeMap<i64, String>) -> Self {
        Self::new(move |value| match value.as_i64() {
            Some(raw) => {
                let name = table.get(&raw).cloned().unwrap_or_else(|| "unknown".to_string());
                Value::Enum { raw, name: Cow::Owned(name) }
            }
            None => value.clone(),
        })
    }

    fn numeric(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::new(move |value| match value.as_f64() {
            Some(v) => Value::Float64(f(v)),
            None => value.clone(),
        })
    }

    fn integer_test(f: impl Fn(i64) -> bool + Send + Sync + 'static) -> Self {
        Self::new(move |value| match value.as_i64() {
            Some(raw) => Value::Bool(f(raw)),
            None => value.clone(),
        })
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}
