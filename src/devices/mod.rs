//! Reference adapters for supported device families.
//!
//! Each adapter is plain data wired into the generic layers: layouts
//! registered in a [`LayoutRegistry`](crate::layout::LayoutRegistry), routes
//! in a [`RecordRouter`](crate::routing::RecordRouter), and mappings plus
//! derived properties in a [`FieldProjection`](crate::projection::FieldProjection).
//! Command encoders read the projected state where the device protocol
//! depends on it.

pub mod delta2;
pub mod wave2;

pub use delta2::{Delta2, Delta2Command, Pd100ReadAction};
pub use wave2::{DrainMode, FanGear, MainMode, PowerMode, SubMode, Wave2, Wave2Command, WaterLevel};
