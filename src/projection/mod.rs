//! Reactive property layer.
//!
//! [`FieldProjection`] turns decoded records into device-level properties.
//! It keeps the current value of every property and the set of properties
//! whose value actually changed during the running cycle. Writing a value a
//! property already holds is not a change.

mod mapping;
mod projector;
mod sink;
mod state;
mod transform;

pub use mapping::{DerivedProperty, FieldMapping, MappingSource};
pub use projector::FieldProjection;
pub use sink::{ChangeSink, PropertyChange};
pub use state::DeviceState;
pub use transform::Transform;
