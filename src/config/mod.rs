//! Configuration: YAML device profiles and session settings.
//!
//! A [`DeviceProfile`] declares a whole device family as data: codec
//! settings, record layouts (fixed or tagged), property mappings, routes and
//! commands. Loading validates every cross reference up front, so a profile
//! that loads always builds a working [`ProfileDevice`].
//!
//! ```rust
//! use ef_ble_protocol::config::DeviceProfile;
//!
//! let profile = DeviceProfile::from_yaml(
//!     r#"
//! name: Demo
//! codec: { xor: true }
//! layouts:
//!   - name: battery
//!     fields:
//!       - { name: soc, type: H }
//!       - { name: watts, type: h }
//! mappings:
//!   - { property: battery_level, record: battery, field: soc }
//! routes:
//!   - { src: 0x02, cmd_set: 0x20, cmd_id: 0x02, record: battery }
//! "#,
//! )
//! .unwrap();
//! assert_eq!(profile.layouts[0].fields.len(), 2);
//! ```

mod device;
mod profile;
mod session;
mod transform;

pub use device::{ProfileCommand, ProfileDevice};
pub use profile::{
    CommandSpec, DeviceProfile, LayoutSpec, MappingSpec, PayloadSpec, RouteSpec, TaggedSpec,
};
pub use session::SessionConfig;
pub use transform::TransformSpec;
