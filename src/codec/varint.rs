//! Unsigned LEB128 varints and tagged field/value pairs.
//!
//! Tagged entries follow the protobuf wire convention: a varint key
//! `(field_number << 3) | wire_type` followed by the value. Only varint
//! values are surfaced; other wire types are skipped.

use std::collections::BTreeMap;
use tracing::trace;

use crate::{ProtocolError, Result};

const CONTINUATION: u8 = 0x80;
const GROUP_MASK: u8 = 0x7F;

/// Wire type carried in the low three bits of a tag key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    pub fn from_key(key: u64) -> Option<Self> {
        match key & 0x07 {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Encode `value` as an unsigned LEB128 varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    write_varint(value, &mut out);
    out
}

/// Append the varint encoding of `value` to `out`.
pub fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let group = (value as u8) & GROUP_MASK;
        value >>= 7;
        if value == 0 {
            out.push(group);
            return;
        }
        out.push(group | CONTINUATION);
    }
}

/// Decode a varint starting at `start`, returning `(value, next_index)`.
///
/// Fails with [`ProtocolError::VarintTruncated`] when the buffer ends before
/// a byte with the continuation bit clear.
pub fn decode_varint(buffer: &[u8], start: usize) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut index = start;

    while let Some(&byte) = buffer.get(index) {
        index += 1;
        if shift < u64::BITS {
            value |= u64::from(byte & GROUP_MASK) << shift;
        }
        if byte & CONTINUATION == 0 {
            return Ok((value, index));
        }
        shift += 7;
    }

    Err(ProtocolError::VarintTruncated { offset: start })
}

/// Encode one varint-typed tagged entry.
pub fn encode_tagged_field(field_number: u32, value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    write_tagged_field(field_number, value, &mut out);
    out
}

pub fn write_tagged_field(field_number: u32, value: u64, out: &mut Vec<u8>) {
    write_varint(u64::from(field_number) << 3, out);
    write_varint(value, out);
}

/// Concatenate one tagged entry per `(field_number, value)` pair, in order.
pub fn encode_tagged_fields<I>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = (u32, u64)>,
{
    let mut out = Vec::new();
    for (field_number, value) in entries {
        write_tagged_field(field_number, value, &mut out);
    }
    out
}

/// Scan a tagged payload and collect its varint entries.
///
/// Fixed and length-delimited entries are skipped. An unknown wire type
/// or a truncated trailing entry stops the scan and keeps what was read.
pub fn decode_tagged_fields(payload: &[u8]) -> BTreeMap<u32, u64> {
    let mut values = BTreeMap::new();
    let mut index = 0;

    while index < payload.len() {
        let Ok((key, next)) = decode_varint(payload, index) else {
            trace!(offset = index, "Tagged scan stopped at truncated key");
            break;
        };
        index = next;
        let field_number = (key >> 3) as u32;

        match WireType::from_key(key) {
            Some(WireType::Varint) => match decode_varint(payload, index) {
                Ok((value, next)) => {
                    values.insert(field_number, value);
                    index = next;
                }
                Err(_) => {
                    trace!(field_number, "Tagged scan stopped at truncated value");
                    break;
                }
            },
            Some(WireType::Fixed64) => index += 8,
            Some(WireType::Fixed32) => index += 4,
            Some(WireType::LengthDelimited) => match decode_varint(payload, index) {
                Ok((size, next)) => index = next.saturating_add(size as usize),
                Err(_) => break,
            },
            None => {
                trace!(field_number, key, "Tagged scan stopped at unknown wire type");
                break;
            }
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_varint_round_trip(value in any::<u64>()) {
            let encoded = encode_varint(value);
            prop_assert_eq!(decode_varint(&encoded, 0).unwrap(), (value, encoded.len()));
            prop_assert!(encoded.len() <= 10);
            for byte in &encoded[..encoded.len() - 1] {
                prop_assert!(byte & CONTINUATION != 0);
            }
        }

        #[test]
        fn prop_tagged_field_round_trip(field_number in 1u32..(1 << 28), value in any::<u64>()) {
            let decoded = decode_tagged_fields(&encode_tagged_field(field_number, value));
            prop_assert_eq!(decoded.get(&field_number), Some(&value));
        }

        #[test]
        fn prop_varint_decodes_at_offset(prefix in prop::collection::vec(any::<u8>(), 0..8), value in any::<u64>()) {
            let mut buffer = prefix.clone();
            write_varint(value, &mut buffer);
            let (decoded, next) = decode_varint(&buffer, prefix.len()).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(next, buffer.len());
        }
    }

    #[test]
    fn encodes_reference_values() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(1), vec![0x01]);
        assert_eq!(encode_varint(127), vec![0x7F]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint(300), vec![0xAC, 0x02]);
        assert_eq!(decode_varint(&[0xAC, 0x02], 0).unwrap(), (300, 2));
    }

    #[test]
    fn truncated_varint_is_reported() {
        let result = decode_varint(&[0xAC], 0);
        assert!(matches!(result, Err(ProtocolError::VarintTruncated { offset: 0 })));
        assert!(decode_varint(&[], 0).is_err());
    }

    #[test]
    fn single_tagged_entry() {
        let encoded = encode_tagged_field(1, 41);
        assert_eq!(encoded, vec![0x08, 0x29]);
        assert_eq!(decode_tagged_fields(&encoded), BTreeMap::from([(1, 41)]));
    }

    #[test]
    fn config_read_action_list() {
        let payload = encode_tagged_fields([(1, 41), (1, 144)]);
        assert_eq!(payload, vec![0x08, 0x29, 0x08, 0x90, 0x01]);
        // repeated field numbers keep the last value
        assert_eq!(decode_tagged_fields(&payload).get(&1), Some(&144));
    }

    #[test]
    fn skips_non_varint_wire_types() {
        let mut payload = Vec::new();
        write_varint((2 << 3) | 1, &mut payload);
        payload.extend_from_slice(&[0xFF; 8]);
        write_varint((3 << 3) | 5, &mut payload);
        payload.extend_from_slice(&[0xFF; 4]);
        write_varint((4 << 3) | 2, &mut payload);
        write_varint(3, &mut payload);
        payload.extend_from_slice(b"abc");
        write_tagged_field(461, 20, &mut payload);

        assert_eq!(decode_tagged_fields(&payload), BTreeMap::from([(461, 20)]));
    }

    #[test]
    fn unknown_wire_type_stops_scan() {
        let mut payload = encode_tagged_field(7, 1);
        write_varint((9 << 3) | 3, &mut payload);
        write_tagged_field(8, 5, &mut payload);

        assert_eq!(decode_tagged_fields(&payload), BTreeMap::from([(7, 1)]));
    }

    #[test]
    fn truncated_trailing_entry_keeps_prefix() {
        let mut payload = encode_tagged_field(270, 100);
        payload.extend_from_slice(&[0xF8, 0x10, 0x80]);
        assert_eq!(decode_tagged_fields(&payload), BTreeMap::from([(270, 100)]));
    }
}
