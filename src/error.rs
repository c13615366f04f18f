//! Error types for frame, record and projection processing.
//!
//! Every error implements `std::error::Error` and carries structured context
//! (offsets, expected/actual values, layout and field names).
//!
//! ## Error Categories
//!
//! - **Frame Errors**: prefix, version, length or checksum problems with one notification
//! - **Record Errors**: payloads that do not cover a layout, malformed varints
//! - **Mapping Errors**: mappings or routes that reference unknown records or fields
//! - **Configuration Errors**: device profiles that fail to parse or validate
//! - **Session Errors**: transport failures and closed sessions
//!
//! ## Propagation
//!
//! Frame-level errors reject a single notification. The device state is left
//! untouched and the caller keeps listening:
//!
//! ```rust
//! use ef_ble_protocol::{ChecksumRegion, ProtocolError};
//!
//! let error = ProtocolError::ChecksumMismatch {
//!     region: ChecksumRegion::Frame,
//!     expected: 0x1234,
//!     actual: 0x4321,
//! };
//! assert!(error.is_frame_level());
//! assert!(error.is_recoverable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Which checksum of a frame failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumRegion {
    /// CRC-8 over the first four header bytes
    Header,
    /// CRC-16 over the whole transmitted frame
    Frame,
}

impl fmt::Display for ChecksumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumRegion::Header => f.write_str("header"),
            ChecksumRegion::Frame => f.write_str("frame"),
        }
    }
}

/// Main error type for protocol operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("Frame too short: need {needed} bytes, got {actual}")]
    FrameTooShort { needed: usize, actual: usize },

    #[error("Invalid frame prefix {found:#04x}")]
    InvalidPrefix { found: u8 },

    #[error("Unknown frame version {version:#04x}")]
    UnknownVersion { version: u8 },

    #[error("Version {version:#04x} headers cannot carry sub-device route {dsrc}/{ddst}")]
    UnsupportedDeviceRoute { version: u8, dsrc: u8, ddst: u8 },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("{region} checksum mismatch: expected {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch { region: ChecksumRegion, expected: u16, actual: u16 },

    #[error(
        "Payload for layout '{layout}' too short at field '{field}' (offset {offset}): need {needed} bytes, got {actual}"
    )]
    LayoutLengthMismatch { layout: String, field: String, offset: usize, needed: usize, actual: usize },

    #[error("Varint truncated at offset {offset}")]
    VarintTruncated { offset: usize },

    #[error("Field '{field}' not found in record '{record}'")]
    FieldNotFound { record: String, field: String },

    #[error("No layout registered for record '{record}'")]
    UnknownRecord { record: String },

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("Invalid layout '{layout}': {reason}")]
    InvalidLayout { layout: String, reason: String },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Command '{command}' rejected: {reason}")]
    CommandRejected { command: String, reason: String },

    #[error("Device session closed")]
    SessionClosed,
}

impl ProtocolError {
    /// Returns whether this error rejects a single notification only.
    ///
    /// The caller drops the frame and keeps listening; device state is untouched.
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooShort { .. }
                | ProtocolError::InvalidPrefix { .. }
                | ProtocolError::UnknownVersion { .. }
                | ProtocolError::ChecksumMismatch { .. }
        )
    }

    /// Returns whether processing can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProtocolError::FrameTooShort { .. } => true,
            ProtocolError::InvalidPrefix { .. } => true,
            ProtocolError::UnknownVersion { .. } => true,
            ProtocolError::ChecksumMismatch { .. } => true,
            ProtocolError::PayloadTooLarge { .. } => false,
            ProtocolError::UnsupportedDeviceRoute { .. } => false,
            ProtocolError::LayoutLengthMismatch { .. } => true,
            ProtocolError::VarintTruncated { .. } => true,
            ProtocolError::Transport { .. } => true,
            ProtocolError::CommandRejected { .. } => true,
            ProtocolError::FieldNotFound { .. } => false,
            ProtocolError::UnknownRecord { .. } => false,
            ProtocolError::TypeConversion { .. } => false,
            ProtocolError::InvalidLayout { .. } => false,
            ProtocolError::Config { .. } => false,
            ProtocolError::SessionClosed => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ProtocolError::FrameTooShort { .. } => vec![
                "Drop the notification and wait for the next one",
                "Check that the transport reassembles fragmented notifications",
            ],
            ProtocolError::InvalidPrefix { .. } => vec![
                "Check that the notification comes from the data characteristic",
                "Check whether the device uses an encrypted session framing",
            ],
            ProtocolError::UnknownVersion { .. } => vec![
                "Check the device firmware generation",
                "Register the header layout for this version",
            ],
            ProtocolError::ChecksumMismatch { .. } => vec![
                "Drop the notification and keep listening",
                "Verify the XOR setting for this device family",
            ],
            ProtocolError::UnsupportedDeviceRoute { .. } => vec![
                "Use an extended header version for sub-device commands",
                "Leave the device route at its default for legacy headers",
            ],
            ProtocolError::PayloadTooLarge { .. } => vec![
                "Split the command into several packets",
                "Check the payload builder for runaway output",
            ],
            ProtocolError::LayoutLengthMismatch { .. } => vec![
                "Mark the trailing fields optional for older firmware",
                "Verify the routing triple selects the right layout",
            ],
            ProtocolError::VarintTruncated { .. } => vec![
                "Drop the payload and wait for the next notification",
                "Check that the payload is tagged-field encoded",
            ],
            ProtocolError::FieldNotFound { .. } => vec![
                "Check field name spelling in the mapping",
                "Verify the record layout declares the field",
            ],
            ProtocolError::UnknownRecord { .. } => vec![
                "Register the layout before mapping or routing to it",
                "Check record key spelling in the device profile",
            ],
            ProtocolError::TypeConversion { .. } => vec![
                "Check the declared field type in the layout",
                "Use a transform that converts to the property type",
            ],
            ProtocolError::InvalidLayout { .. } => vec![
                "Remove duplicate field names",
                "Give byte array fields a non-zero length",
            ],
            ProtocolError::Config { .. } => vec![
                "Validate the device profile YAML",
                "Check that every mapping and route names a declared record",
            ],
            ProtocolError::Transport { .. } => vec![
                "Reconnect the transport",
                "Check that the device is in range and powered",
            ],
            ProtocolError::CommandRejected { .. } => vec![
                "Check the argument against the device's reported limits",
                "Wait for the device to report its current state",
            ],
            ProtocolError::SessionClosed => vec!["Spawn a new device session"],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        ProtocolError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ProtocolError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for rejected commands.
    pub fn command_rejected(command: impl Into<String>, reason: impl Into<String>) -> Self {
        ProtocolError::CommandRejected { command: command.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        ProtocolError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for missing record fields.
    pub fn field_not_found(record: impl Into<String>, field: impl Into<String>) -> Self {
        ProtocolError::FieldNotFound { record: record.into(), field: field.into() }
    }
}

impl From<serde_yaml_ng::Error> for ProtocolError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ProtocolError::Config { context: "device profile".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_format_correctly_with_arbitrary_context(
            layout in "\\w+",
            field in "\\w+",
            offset in 0usize..0x1000usize,
            version in any::<u8>(),
            expected in any::<u16>(),
            actual in any::<u16>(),
            details in ".*"
          ) {
            let length_error = ProtocolError::LayoutLengthMismatch {
              layout: layout.clone(),
              field: field.clone(),
              offset,
              needed: offset + 2,
              actual: offset,
            };
            let version_error = ProtocolError::UnknownVersion { version };
            let checksum_error = ProtocolError::ChecksumMismatch {
              region: ChecksumRegion::Frame,
              expected,
              actual,
            };
            let conversion_error = ProtocolError::TypeConversion { details: details.clone() };

            let length_msg = length_error.to_string();
            prop_assert!(length_msg.contains(&layout));
            prop_assert!(length_msg.contains(&field));
            prop_assert!(length_msg.contains(&offset.to_string()));

            let version_msg = version_error.to_string();
            let version_hex = format!("{:#04x}", version);
            prop_assert!(version_msg.contains(&version_hex));

            let checksum_msg = checksum_error.to_string();
            let expected_hex = format!("{:#06x}", expected);
            let actual_hex = format!("{:#06x}", actual);
            prop_assert!(checksum_msg.contains(&expected_hex));
            prop_assert!(checksum_msg.contains(&actual_hex));

            prop_assert!(conversion_error.to_string().contains(&details));
          }

          #[test]
          fn transport_source_chain_is_preserved(base_message in ".*") {
            let source: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            let error = ProtocolError::transport_failed_with_source("write failed", source);

            let chained = std::error::Error::source(&error);
            prop_assert!(chained.is_some());
            prop_assert_eq!(chained.map(|s| s.to_string()), Some(base_message));
          }
        }
    }

    #[test]
    fn frame_level_classification() {
        assert!(ProtocolError::FrameTooShort { needed: 18, actual: 3 }.is_frame_level());
        assert!(ProtocolError::InvalidPrefix { found: 0x5A }.is_frame_level());
        assert!(ProtocolError::UnknownVersion { version: 9 }.is_frame_level());
        assert!(!ProtocolError::VarintTruncated { offset: 4 }.is_frame_level());
        assert!(!ProtocolError::SessionClosed.is_frame_level());
    }

    #[test]
    fn recovery_methods_work() {
        let field_error = ProtocolError::field_not_found("bms_main", "soc");
        let transport_error = ProtocolError::transport_failed("link lost");

        assert!(!field_error.is_recoverable());
        assert!(transport_error.is_recoverable());

        for suggestion in field_error.recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
        assert!(!transport_error.recovery_suggestions().is_empty());
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ProtocolError>();

        let error = ProtocolError::command_rejected("set_limit", "out of range");
        let _: &dyn std::error::Error = &error;
        assert!(error.to_string().contains("set_limit"));
    }

    #[test]
    fn yaml_errors_convert_to_config() {
        let err = serde_yaml_ng::from_str::<u32>("not: a number").unwrap_err();
        let converted: ProtocolError = err.into();
        assert!(matches!(converted, ProtocolError::Config { .. }));
    }
}
