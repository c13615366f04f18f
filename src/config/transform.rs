//! Declarative transforms for profile mappings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::projection::Transform;

/// One step of a mapping transform, written as a single-key YAML map
/// (profiles read it through `serde_yaml_ng::with::singleton_map_recursive`).
///
/// ```yaml
/// transform:
///   - divide: 1000
///   - round: 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformSpec {
    Scale(f64),
    Divide(f64),
    Round(u32),
    Equals(i64),
    OneOf(Vec<i64>),
    /// Raw code to lowercase state name
    Enum(BTreeMap<i64, String>),
}

impl TransformSpec {
    pub fn build(&self) -> Transform {
        match self {
            TransformSpec::Scale(factor) => Transform::scale(*factor),
            TransformSpec::Divide(divisor) => Transform::divide(*divisor),
            TransformSpec::Round(decimals) => Transform::round(*decimals),
            TransformSpec::Equals(target) => Transform::equals(*target),
            TransformSpec::OneOf(targets) => Transform::one_of(targets.iter().copied()),
            TransformSpec::Enum(table) => Transform::named(table.clone()),
        }
    }

    /// Chain steps in order; an empty chain is no transform.
    pub fn chain(steps: &[TransformSpec]) -> Option<Transform> {
        steps.iter().map(TransformSpec::build).reduce(Transform::then)
    }
}
