//! Device adapters and the per-notification cycle

use serde::Serialize;
use std::fmt;
use tracing::{debug, trace};

use crate::Result;
use crate::codec::PacketCodec;
use crate::projection::{ChangeSink, FieldProjection, PropertyChange};
use crate::types::{Packet, Route};

/// One device family: framing, routing and command encoding.
///
/// The adapter owns its [`FieldProjection`]. [`run_cycle`] drives it once
/// per inbound notification; cycles for one adapter must not overlap.
pub trait DeviceAdapter: Send + 'static {
    /// Typed commands this device accepts.
    type Command: fmt::Debug + Send + 'static;

    /// Human-readable device name used in logs.
    fn name(&self) -> &str;

    fn codec(&self) -> PacketCodec;

    fn projection(&self) -> &FieldProjection;

    fn projection_mut(&mut self) -> &mut FieldProjection;

    /// Apply one parsed packet; returns `false` when the route is not handled.
    ///
    /// Called between `reset_updated` and `finish_cycle`, so device logic may
    /// set extra properties through [`FieldProjection::set_property`].
    fn route(&mut self, packet: &Packet) -> Result<bool>;

    /// Build the packets for one command, reading current state as needed.
    fn encode_command(&self, command: &Self::Command) -> Result<Vec<Packet>>;
}

/// Outcome of one processed notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    #[serde(serialize_with = "serialize_route")]
    pub route: Route,
    /// Whether the adapter recognised the route
    pub processed: bool,
    /// Properties that changed, in name order
    pub changes: Vec<PropertyChange>,
}

impl CycleReport {
    pub fn changed(&self, property: &str) -> bool {
        self.changes.iter().any(|change| change.property == property)
    }

    pub fn dispatch<S: ChangeSink + ?Sized>(&self, sink: &mut S) {
        for change in &self.changes {
            sink.property_changed(&change.property, &change.value);
        }
    }
}

fn serialize_route<S: serde::Serializer>(route: &Route, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(route)
}

/// Process one raw notification.
///
/// Frame-level failures return `Err` before any state is touched: property
/// values and the previous cycle's updated set stay as they were.
pub fn run_cycle<A>(adapter: &mut A, raw: &[u8]) -> Result<CycleReport>
where
    A: DeviceAdapter + ?Sized,
{
    let packet = adapter.codec().parse(raw)?;

    adapter.projection_mut().reset_updated();
    let processed = adapter.route(&packet)?;
    adapter.projection_mut().finish_cycle();

    let changes = adapter.projection().changes();
    if processed {
        debug!(device = adapter.name(), route = %packet.route(), changed = changes.len(), "Cycle complete");
    } else {
        trace!(device = adapter.name(), route = %packet.route(), "Ignored packet");
    }

    Ok(CycleReport { route: packet.route(), processed, changes })
}

/// Encode and serialize one command into frames ready for the transport.
pub fn encode_frames<A>(adapter: &A, command: &A::Command) -> Result<Vec<Vec<u8>>>
where
    A: DeviceAdapter + ?Sized,
{
    let codec = adapter.codec();
    let packets = adapter.encode_command(command)?;
    debug!(device = adapter.name(), ?command, packets = packets.len(), "Encoded command");
    packets.iter().map(|packet| codec.serialize(packet)).collect()
}
