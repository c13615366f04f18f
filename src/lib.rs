//! Protocol core for EcoFlow-style BLE power stations and appliances.
//!
//! The crate turns raw BLE notifications into named, change-tracked device
//! properties and turns typed commands back into frames.
//!
//! # Layers
//!
//! - **Codec**: frame parsing and serialization with CRC-8/CRC-16 checks,
//!   XOR payload obfuscation, and the varint tagged-field codec
//! - **Layout**: fixed-offset little-endian record decoding with tolerant
//!   handling of short payloads
//! - **Projection**: per-device property table with mappings, transforms,
//!   derived properties and per-cycle change tracking
//! - **Devices**: adapters wiring layouts, routes and commands for one device
//!   family, either in code or from a YAML profile
//! - **Session**: a tokio task that owns one adapter and serializes cycles
//!
//! # Example
//!
//! ```rust
//! use ef_ble_protocol::adapter::{DeviceAdapter, run_cycle};
//! use ef_ble_protocol::codec::PacketCodec;
//! use ef_ble_protocol::devices::{Wave2, Wave2Command};
//! use ef_ble_protocol::types::Packet;
//!
//! # fn main() -> ef_ble_protocol::Result<()> {
//! let mut wave = Wave2::new()?;
//!
//! // A heartbeat that ends after the mode fields still updates them
//! let heartbeat = Packet::new(0x42, 0x21, 0x42, 0x50, vec![0, 2, 18, 1], 2).with_seq(9);
//! let frame = PacketCodec::new(true).serialize(&heartbeat)?;
//!
//! let report = run_cycle(&mut wave, &frame)?;
//! assert!(report.changed("main_mode"));
//! assert_eq!(wave.projection().get_as::<u8>("target_temperature"), Some(18));
//!
//! let packets = wave.encode_command(&Wave2Command::SetTemperature(20))?;
//! assert_eq!(packets[0].payload, vec![20]);
//! # Ok(())
//! # }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire and record layers
pub mod codec;
pub mod layout;
pub mod projection;
pub mod routing;

// Device integration
pub mod adapter;
pub mod config;
pub mod devices;
pub mod session;

// Core exports
pub use error::*;

// Main API exports
pub use adapter::{CycleReport, DeviceAdapter, encode_frames, run_cycle};
pub use codec::PacketCodec;
pub use config::{DeviceProfile, ProfileDevice, SessionConfig};
pub use layout::{DecodedRecord, FieldLayout, LayoutRegistry};
pub use projection::{ChangeSink, FieldProjection, PropertyChange};
pub use session::DeviceSession;
pub use types::{FieldType, Packet, Value};
