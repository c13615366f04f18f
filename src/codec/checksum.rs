//! Frame checksums

use crc::{CRC_8_SMBUS, CRC_16_ARC, Crc};

const HEADER_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);
const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC-8/SMBUS (poly 0x07, init 0) protecting the first header bytes.
pub fn header_checksum(bytes: &[u8]) -> u8 {
    HEADER_CRC.checksum(bytes)
}

/// CRC-16/ARC (reflected poly 0x8005, init 0) over the transmitted frame.
pub fn frame_checksum(bytes: &[u8]) -> u16 {
    FRAME_CRC.checksum(bytes)
}
