//! Frame parsing and serialization.
//!
//! A frame is a little-endian header guarded by a CRC-8, the (optionally
//! XOR-obfuscated) payload and a trailing CRC-16 over everything before it.
//! The header width depends on the version byte.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::checksum::{frame_checksum, header_checksum};
use crate::types::{DEFAULT_DEVICE_ROUTE, Packet};
use crate::{ChecksumRegion, ProtocolError, Result};

/// First byte of every frame.
pub const FRAME_PREFIX: u8 = 0xAA;

/// Width of the trailing frame checksum.
pub const FRAME_CRC_LEN: usize = 2;

const LENGTH_OFFSET: usize = 2;
const HEADER_CRC_OFFSET: usize = 4;
const PRODUCT_ID_OFFSET: usize = 5;
const SEQ_OFFSET: usize = 6;
const RESERVED_OFFSET: usize = 10;
const ROUTE_OFFSET: usize = 12;

/// Header variants selected by the version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// Version 2: no sub-device routing bytes.
    Legacy,
    /// Versions 3, 4 and 0x13: `dsrc`/`ddst` follow `src`/`dst`.
    Extended,
}

impl HeaderLayout {
    pub fn for_version(version: u8) -> Result<Self> {
        match version {
            2 => Ok(HeaderLayout::Legacy),
            3 | 4 | 0x13 => Ok(HeaderLayout::Extended),
            _ => Err(ProtocolError::UnknownVersion { version }),
        }
    }

    /// Header width in bytes, up to and including `cmd_id`.
    pub const fn header_len(&self) -> usize {
        match self {
            HeaderLayout::Legacy => 16,
            HeaderLayout::Extended => 18,
        }
    }

    const fn cmd_offset(&self) -> usize {
        self.header_len() - 2
    }
}

/// Parser and serializer for one device family's framing.
///
/// The only family-specific knob is whether payloads are XOR-obfuscated with
/// the low byte of the sequence number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketCodec {
    #[serde(default)]
    pub xor: bool,
}

impl PacketCodec {
    pub const fn new(xor: bool) -> Self {
        Self { xor }
    }

    /// Parse one inbound notification.
    ///
    /// Bytes after the frame checksum are ignored.
    pub fn parse(&self, raw: &[u8]) -> Result<Packet> {
        trace!(len = raw.len(), "Parsing frame");
        let minimum = HeaderLayout::Legacy.header_len() + FRAME_CRC_LEN;

        if raw.len() < 2 {
            return Err(ProtocolError::FrameTooShort { needed: minimum, actual: raw.len() });
        }
        if raw[0] != FRAME_PREFIX {
            return Err(ProtocolError::InvalidPrefix { found: raw[0] });
        }

        let version = raw[1];
        let layout = HeaderLayout::for_version(version)?;
        let header_len = layout.header_len();
        if raw.len() < header_len + FRAME_CRC_LEN {
            return Err(ProtocolError::FrameTooShort {
                needed: header_len + FRAME_CRC_LEN,
                actual: raw.len(),
            });
        }

        let declared_header_crc = raw[HEADER_CRC_OFFSET];
        let computed_header_crc = header_checksum(&raw[..HEADER_CRC_OFFSET]);
        if declared_header_crc != computed_header_crc {
            return Err(ProtocolError::ChecksumMismatch {
                region: ChecksumRegion::Header,
                expected: u16::from(declared_header_crc),
                actual: u16::from(computed_header_crc),
            });
        }

        let payload_len = usize::from(read_u16(raw, LENGTH_OFFSET));
        let body_end = header_len + payload_len;
        if raw.len() < body_end + FRAME_CRC_LEN {
            return Err(ProtocolError::FrameTooShort {
                needed: body_end + FRAME_CRC_LEN,
                actual: raw.len(),
            });
        }

        let declared_crc = read_u16(raw, body_end);
        let computed_crc = frame_checksum(&raw[..body_end]);
        if declared_crc != computed_crc {
            return Err(ProtocolError::ChecksumMismatch {
                region: ChecksumRegion::Frame,
                expected: declared_crc,
                actual: computed_crc,
            });
        }

        let (dsrc, ddst) = match layout {
            HeaderLayout::Legacy => DEFAULT_DEVICE_ROUTE,
            HeaderLayout::Extended => (raw[ROUTE_OFFSET + 2], raw[ROUTE_OFFSET + 3]),
        };
        let cmd_offset = layout.cmd_offset();

        let mut packet = Packet {
            version,
            src: raw[ROUTE_OFFSET],
            dst: raw[ROUTE_OFFSET + 1],
            dsrc,
            ddst,
            cmd_set: raw[cmd_offset],
            cmd_id: raw[cmd_offset + 1],
            seq: read_u32(raw, SEQ_OFFSET),
            product_id: raw[PRODUCT_ID_OFFSET],
            reserved: [raw[RESERVED_OFFSET], raw[RESERVED_OFFSET + 1]],
            payload: raw[header_len..body_end].to_vec(),
        };
        self.apply_xor(packet.xor_key(), &mut packet.payload);

        if raw.len() > body_end + FRAME_CRC_LEN {
            trace!(padding = raw.len() - body_end - FRAME_CRC_LEN, "Ignoring trailing bytes");
        }
        debug!(
            version,
            src = packet.src,
            dst = packet.dst,
            cmd_set = packet.cmd_set,
            cmd_id = packet.cmd_id,
            payload_len,
            "Parsed frame"
        );

        Ok(packet)
    }

    /// Serialize an outbound packet.
    ///
    /// Legacy headers do not transmit `dsrc`/`ddst`, so a legacy packet with
    /// any route other than [`DEFAULT_DEVICE_ROUTE`] is rejected.
    pub fn serialize(&self, packet: &Packet) -> Result<Vec<u8>> {
        let layout = HeaderLayout::for_version(packet.version)?;
        if layout == HeaderLayout::Legacy && (packet.dsrc, packet.ddst) != DEFAULT_DEVICE_ROUTE {
            return Err(ProtocolError::UnsupportedDeviceRoute {
                version: packet.version,
                dsrc: packet.dsrc,
                ddst: packet.ddst,
            });
        }
        let payload_len = u16::try_from(packet.payload.len()).map_err(|_| {
            ProtocolError::PayloadTooLarge {
                size: packet.payload.len(),
                max: usize::from(u16::MAX),
            }
        })?;

        let mut out = Vec::with_capacity(layout.header_len() + packet.payload.len() + FRAME_CRC_LEN);
        out.push(FRAME_PREFIX);
        out.push(packet.version);
        out.extend_from_slice(&payload_len.to_le_bytes());
        out.push(header_checksum(&out));
        out.push(packet.product_id);
        out.extend_from_slice(&packet.seq.to_le_bytes());
        out.extend_from_slice(&packet.reserved);
        out.push(packet.src);
        out.push(packet.dst);
        if layout == HeaderLayout::Extended {
            out.push(packet.dsrc);
            out.push(packet.ddst);
        }
        out.push(packet.cmd_set);
        out.push(packet.cmd_id);

        let payload_start = out.len();
        out.extend_from_slice(&packet.payload);
        self.apply_xor(packet.xor_key(), &mut out[payload_start..]);

        let crc = frame_checksum(&out);
        out.extend_from_slice(&crc.to_le_bytes());

        trace!(
            version = packet.version,
            dst = packet.dst,
            cmd_set = packet.cmd_set,
            cmd_id = packet.cmd_id,
            len = out.len(),
            "Serialized frame"
        );
        Ok(out)
    }

    fn apply_xor(&self, key: u8, payload: &mut [u8]) {
        if self.xor && key != 0 {
            payload.iter_mut().for_each(|byte| *byte ^= key);
        }
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}
