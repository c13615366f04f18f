//! Wire codecs: frame parsing/serialization, checksums and tagged varints.
//!
//! ```rust
//! use ef_ble_protocol::codec::PacketCodec;
//! use ef_ble_protocol::types::Packet;
//!
//! let codec = PacketCodec::new(true);
//! let command = Packet::new(0x21, 0x03, 0x20, 0x31, vec![80], 2).with_seq(7);
//! let raw = codec.serialize(&command).unwrap();
//! assert_eq!(codec.parse(&raw).unwrap(), command);
//! ```

mod checksum;
mod frame;
mod varint;

pub use checksum::{frame_checksum, header_checksum};
pub use frame::{FRAME_CRC_LEN, FRAME_PREFIX, HeaderLayout, PacketCodec};
pub use varint::{
    WireType, decode_tagged_fields, decode_varint, encode_tagged_field, encode_tagged_fields,
    encode_varint, write_tagged_field, write_varint,
};
