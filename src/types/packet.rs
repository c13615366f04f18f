//! Routed packet types

use std::fmt;

/// Default product id byte written into outbound headers.
pub const DEFAULT_PRODUCT_ID: u8 = 0x0D;

/// Sub-device route implied by legacy headers, which do not carry one.
pub const DEFAULT_DEVICE_ROUTE: (u8, u8) = (1, 1);

/// One routed, length-bounded unit of notification or command data.
///
/// Inbound packets come from [`PacketCodec::parse`](crate::codec::PacketCodec::parse)
/// with the payload already de-obfuscated. Outbound packets are built with
/// [`Packet::new`] and handed to
/// [`PacketCodec::serialize`](crate::codec::PacketCodec::serialize).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Header layout version
    pub version: u8,
    pub src: u8,
    pub dst: u8,
    /// Sub-device source, only carried by extended headers. Legacy packets
    /// always hold the first half of [`DEFAULT_DEVICE_ROUTE`].
    pub dsrc: u8,
    /// Sub-device destination, only carried by extended headers. Legacy
    /// packets always hold the second half of [`DEFAULT_DEVICE_ROUTE`].
    pub ddst: u8,
    pub cmd_set: u8,
    pub cmd_id: u8,
    /// Sequence number; its low byte is the XOR key
    pub seq: u32,
    pub product_id: u8,
    /// Header bytes 10 and 11, zero on outbound packets
    pub reserved: [u8; 2],
    /// Clear payload bytes
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create an outbound packet with default routing extras.
    pub fn new(
        src: u8,
        dst: u8,
        cmd_set: u8,
        cmd_id: u8,
        payload: impl Into<Vec<u8>>,
        version: u8,
    ) -> Self {
        let (dsrc, ddst) = DEFAULT_DEVICE_ROUTE;
        Self {
            version,
            src,
            dst,
            dsrc,
            ddst,
            cmd_set,
            cmd_id,
            seq: 0,
            product_id: DEFAULT_PRODUCT_ID,
            reserved: [0, 0],
            payload: payload.into(),
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_product_id(mut self, product_id: u8) -> Self {
        self.product_id = product_id;
        self
    }

    /// Set the sub-device route carried by extended headers.
    pub fn with_device_route(mut self, dsrc: u8, ddst: u8) -> Self {
        self.dsrc = dsrc;
        self.ddst = ddst;
        self
    }

    /// The routing triple device adapters dispatch on.
    pub fn route(&self) -> Route {
        Route { src: self.src, cmd_set: self.cmd_set, cmd_id: self.cmd_id }
    }

    /// XOR key derived from the sequence number.
    pub fn xor_key(&self) -> u8 {
        (self.seq & 0xFF) as u8
    }
}

/// `(src, cmd_set, cmd_id)` routing triple of an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub src: u8,
    pub cmd_set: u8,
    pub cmd_id: u8,
}

impl Route {
    pub const fn new(src: u8, cmd_set: u8, cmd_id: u8) -> Self {
        Self { src, cmd_set, cmd_id }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src={:#04x} cmd_set={:#04x} cmd_id={:#04x}", self.src, self.cmd_set, self.cmd_id)
    }
}
