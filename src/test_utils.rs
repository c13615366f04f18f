//! Frame and payload builders shared by unit tests, integration tests and benches.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;

use crate::codec::PacketCodec;
use crate::layout::{FieldLayout, FieldSpec};
use crate::types::{FieldType, Packet, Value};

/// Builds raw notification frames the way a device would send them.
///
/// Defaults: destination `0x21` (the app), header version 2, sequence 0,
/// XOR obfuscation enabled.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    packet: Packet,
    codec: PacketCodec,
}

impl FrameBuilder {
    pub fn new(src: u8, cmd_set: u8, cmd_id: u8) -> Self {
        Self { packet: Packet::new(src, 0x21, cmd_set, cmd_id, Vec::new(), 2), codec: PacketCodec::new(true) }
    }

    pub fn dst(mut self, dst: u8) -> Self {
        self.packet.dst = dst;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.packet.version = version;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.packet.seq = seq;
        self
    }

    pub fn xor(mut self, enabled: bool) -> Self {
        self.codec = PacketCodec::new(enabled);
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.packet.payload = payload.into();
        self
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Serialize the frame.
    ///
    /// # Panics
    /// Panics when the packet cannot be framed (unknown version, oversized payload).
    pub fn build(&self) -> Vec<u8> {
        self.codec.serialize(&self.packet).expect("test frame must serialize")
    }
}

/// Encode named values with `layout`.
///
/// # Panics
/// Panics when a value does not fit its field.
pub fn layout_payload<'a, I>(layout: &FieldLayout, values: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    layout.encode(values).expect("test payload must encode")
}

/// A battery heartbeat layout with every field type represented.
pub fn battery_layout() -> Arc<FieldLayout> {
    let fields = vec![
        FieldSpec::new("soc", FieldType::UInt8),
        FieldSpec::new("temp", FieldType::Int8),
        FieldSpec::new("vol", FieldType::UInt32),
        FieldSpec::new("amp", FieldType::Int32),
        FieldSpec::new("design_cap", FieldType::UInt32),
        FieldSpec::new("remain_cap", FieldType::UInt32),
        FieldSpec::new("f32_show_soc", FieldType::Float32),
        FieldSpec::new("sys_ver", FieldType::Bytes(4)),
        FieldSpec::new("cycles", FieldType::UInt16),
        FieldSpec::optional("accu_chg_energy", FieldType::UInt64),
    ];
    Arc::new(FieldLayout::new("battery", fields).expect("battery layout is valid"))
}

/// A full payload for [`battery_layout`].
pub fn battery_payload(soc: u8, show_soc: f32) -> Vec<u8> {
    layout_payload(
        &battery_layout(),
        [
            ("soc", Value::UInt8(soc)),
            ("temp", Value::Int8(24)),
            ("vol", Value::UInt32(52_140)),
            ("amp", Value::Int32(-1_250)),
            ("design_cap", Value::UInt32(40_000)),
            ("remain_cap", Value::UInt32(u32::from(soc) * 400)),
            ("f32_show_soc", Value::Float32(show_soc)),
            ("sys_ver", Value::Bytes(vec![1, 2, 0, 7])),
            ("cycles", Value::UInt16(112)),
            ("accu_chg_energy", Value::UInt64(987_654)),
        ],
    )
}
