//! Adapter built from a [`DeviceProfile`](super::DeviceProfile)

use std::collections::HashMap;
use tracing::warn;

use super::{CommandSpec, PayloadSpec};
use crate::adapter::DeviceAdapter;
use crate::codec::{PacketCodec, encode_tagged_field};
use crate::projection::FieldProjection;
use crate::routing::RecordRouter;
use crate::types::Packet;
use crate::{ProtocolError, Result};

/// Invoke a profile command by name with one integer argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCommand {
    pub name: String,
    pub value: i64,
}

impl ProfileCommand {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self { name: name.into(), value }
    }
}

/// A device adapter whose layouts, mappings, routes and commands all come
/// from a YAML profile.
#[derive(Debug, Clone)]
pub struct ProfileDevice {
    name: String,
    codec: PacketCodec,
    version: u8,
    router: RecordRouter,
    projection: FieldProjection,
    commands: HashMap<String, CommandSpec>,
}

impl ProfileDevice {
    pub(crate) fn new(
        name: String,
        codec: PacketCodec,
        version: u8,
        router: RecordRouter,
        projection: FieldProjection,
        commands: Vec<CommandSpec>,
    ) -> Self {
        let commands = commands.into_iter().map(|spec| (spec.name.clone(), spec)).collect();
        Self { name, codec, version, router, projection, commands }
    }

    pub fn router(&self) -> &RecordRouter {
        &self.router
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.commands.keys().map(String::as_str)
    }
}

impl DeviceAdapter for ProfileDevice {
    type Command = ProfileCommand;

    fn name(&self) -> &str {
        &self.name
    }

    fn codec(&self) -> PacketCodec {
        self.codec
    }

    fn projection(&self) -> &FieldProjection {
        &self.projection
    }

    fn projection_mut(&mut self) -> &mut FieldProjection {
        &mut self.projection
    }

    fn route(&mut self, packet: &Packet) -> Result<bool> {
        Ok(self.router.apply(&mut self.projection, packet)?.is_some())
    }

    fn encode_command(&self, command: &ProfileCommand) -> Result<Vec<Packet>> {
        let spec = self
            .commands
            .get(&command.name)
            .ok_or_else(|| ProtocolError::command_rejected(&command.name, "unknown command"))?;

        let value = match spec.range {
            Some((min, max)) => {
                let clamped = command.value.clamp(min, max);
                if clamped != command.value {
                    warn!(command = %spec.name, requested = command.value, clamped, "Clamped command argument");
                }
                clamped
            }
            None => command.value,
        };

        let out_of_range = || ProtocolError::command_rejected(&spec.name, format!("{} does not fit the payload", value));
        let payload = match spec.payload {
            PayloadSpec::Byte => vec![u8::try_from(value).map_err(|_| out_of_range())?],
            PayloadSpec::U16 => u16::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
            PayloadSpec::Tagged(field) => {
                encode_tagged_field(field, u64::try_from(value).map_err(|_| out_of_range())?)
            }
        };

        let version = spec.version.unwrap_or(self.version);
        Ok(vec![Packet::new(spec.src, spec.dst, spec.cmd_set, spec.cmd_id, payload, version)])
    }
}
