//! Wave 2 portable air conditioner

use tracing::debug;

use crate::adapter::DeviceAdapter;
use crate::codec::PacketCodec;
use crate::int_field_enum;
use crate::layout::{FieldLayout, LayoutRegistry};
use crate::projection::{DeviceState, FieldProjection, Transform};
use crate::routing::{RecordRouter, RoutePattern};
use crate::types::{FieldType, IntFieldEnum, Packet, Value};
use crate::{ProtocolError, Result};

const APP: u8 = 0x21;
const UNIT: u8 = 0x42;
const PACKET_VERSION: u8 = 2;

const CMD_MAIN_MODE: u8 = 0x51;
const CMD_SUB_MODE: u8 = 0x52;
const CMD_TEMPERATURE: u8 = 0x58;
const CMD_DRAIN: u8 = 0x59;
const CMD_POWER_MODE: u8 = 0x5B;
const CMD_AMBIENT_LIGHT: u8 = 0x5C;
const CMD_FAN: u8 = 0x5E;

int_field_enum! {
    pub enum FanGear {
        Low = 0 => "low",
        Medium = 1 => "medium",
        High = 2 => "high",
    }
}

int_field_enum! {
    pub enum MainMode {
        Cold = 0 => "cold",
        Warm = 1 => "warm",
        Fan = 2 => "fan",
    }
}

int_field_enum! {
    pub enum SubMode {
        Max = 0 => "max",
        Night = 1 => "night",
        Eco = 2 => "eco",
        Normal = 3 => "normal",
    }
}

int_field_enum! {
    pub enum PowerMode {
        Init = 0 => "init",
        On = 1 => "on",
        Standby = 2 => "standby",
        Off = 3 => "off",
    }
}

int_field_enum! {
    pub enum WaterLevel {
        Low = 0 => "low",
        Medium = 1 => "medium",
        High = 2 => "high",
    }
}

int_field_enum! {
    pub enum DrainMode {
        External = 0 => "external",
        DrainFree = 1 => "drain_free",
    }
}

impl DrainMode {
    /// Decode the drain mode from the raw water-handling flag.
    ///
    /// In cooling mode flags 1 and 3 mean drain-free; otherwise only 3 does.
    pub fn from_wte(main_mode: MainMode, wte_fth_en: i64) -> Self {
        let drain_free = match main_mode {
            MainMode::Cold => matches!(wte_fth_en, 1 | 3),
            _ => wte_fth_en == 3,
        };
        if drain_free { DrainMode::DrainFree } else { DrainMode::External }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave2Command {
    EnableAmbientLight(bool),
    EnableAutomaticDrain(bool),
    SetDrainMode(DrainMode),
    SetFanSpeed(FanGear),
    /// Also turns drain-free operation off when leaving cooling mode
    SetMainMode(MainMode),
    SetPowerMode(PowerMode),
    SetTemperature(u8),
    SetSubMode(SubMode),
}

/// Wave 2 adapter: one air-conditioner heartbeat and single-byte commands.
#[derive(Debug, Clone)]
pub struct Wave2 {
    router: RecordRouter,
    projection: FieldProjection,
}

impl Wave2 {
    pub fn new() -> Result<Self> {
        let mut registry = LayoutRegistry::new();
        registry.register("kt210_sac", heartbeat_layout()?);

        let projection = build_projection();
        projection.validate(&registry)?;

        let mut router = RecordRouter::new(registry);
        router.route(RoutePattern::new(UNIT, UNIT, 0x50), "kt210_sac")?;

        Ok(Self { router, projection })
    }

    pub fn main_mode(&self) -> Option<MainMode> {
        self.projection.get("main_mode").and_then(MainMode::from_value)
    }

    pub fn drain_mode(&self) -> Option<DrainMode> {
        self.projection.get("drain_mode").and_then(DrainMode::from_value)
    }

    pub fn automatic_drain(&self) -> Option<bool> {
        self.projection.get_as("automatic_drain")
    }

    fn packet(cmd_id: u8, value: u8) -> Packet {
        Packet::new(APP, UNIT, UNIT, cmd_id, vec![value], PACKET_VERSION)
    }

    fn enum_byte<E: IntFieldEnum>(command: &Wave2Command, value: E) -> Result<u8> {
        if value == E::unknown() {
            return Err(ProtocolError::command_rejected(format!("{:?}", command), "unknown state"));
        }
        Ok(value.to_byte())
    }

    fn drain_payload(&self, mode: DrainMode) -> u8 {
        if self.automatic_drain() != Some(true) {
            if mode == DrainMode::External { 2 } else { 3 }
        } else if self.main_mode() != Some(MainMode::Cold) {
            1
        } else if mode == DrainMode::External {
            0
        } else {
            1
        }
    }
}

impl DeviceAdapter for Wave2 {
    type Command = Wave2Command;

    fn name(&self) -> &str {
        "Wave 2"
    }

    fn codec(&self) -> PacketCodec {
        PacketCodec::new(true)
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

    fn encode_command(&self, command: &Wave2Command) -> Result<Vec<Packet>> {
        let packets = match *command {
            Wave2Command::EnableAmbientLight(enabled) => {
                vec![Self::packet(CMD_AMBIENT_LIGHT, if enabled { 0x01 } else { 0x02 })]
            }
            Wave2Command::EnableAutomaticDrain(enabled) => {
                let mode = self.drain_mode().filter(|mode| *mode != DrainMode::Unknown);
                let mode = mode.unwrap_or(DrainMode::External);
                let flag = if enabled { 0 } else { 0b10 };
                vec![Self::packet(CMD_DRAIN, flag | mode.to_byte())]
            }
            Wave2Command::SetDrainMode(mode) => {
                Self::enum_byte(command, mode)?;
                vec![Self::packet(CMD_DRAIN, self.drain_payload(mode))]
            }
            Wave2Command::SetFanSpeed(gear) => vec![Self::packet(CMD_FAN, Self::enum_byte(command, gear)?)],
            Wave2Command::SetMainMode(mode) => {
                let mut packets = vec![Self::packet(CMD_MAIN_MODE, Self::enum_byte(command, mode)?)];
                let leaves_drain_free = self.automatic_drain() == Some(true)
                    && self.drain_mode() != Some(DrainMode::External)
                    && mode != MainMode::Cold;
                if leaves_drain_free {
                    debug!(?mode, "Switching drain to external for non-cooling mode");
                    packets.push(Self::packet(CMD_DRAIN, 1));
                }
                packets
            }
            Wave2Command::SetPowerMode(mode) => {
                vec![Self::packet(CMD_POWER_MODE, Self::enum_byte(command, mode)?)]
            }
            Wave2Command::SetTemperature(celsius) => vec![Self::packet(CMD_TEMPERATURE, celsius)],
            Wave2Command::SetSubMode(mode) => vec![Self::packet(CMD_SUB_MODE, Self::enum_byte(command, mode)?)],
        };
        Ok(packets)
    }
}

fn build_projection() -> FieldProjection {
    let mut projection = FieldProjection::new();
    projection
        .register_mapping("battery_level", "kt210_sac", "bat_soc", None)
        .register_mapping("ambient_temperature", "kt210_sac", "env_temp", Some(Transform::round(2)))
        .register_mapping("outlet_temperature", "kt210_sac", "outlet_temp", Some(Transform::round(2)))
        .register_mapping("main_mode", "kt210_sac", "mode", Some(Transform::int_enum::<MainMode>()))
        .register_mapping("sub_mode", "kt210_sac", "sub_mode", Some(Transform::int_enum::<SubMode>()))
        .register_mapping("fan_speed", "kt210_sac", "fan_value", Some(Transform::int_enum::<FanGear>()))
        .register_mapping("power_battery", "kt210_sac", "bat_pwr_watt", None)
        .register_mapping("power_psdr", "kt210_sac", "psdr_pwr_watt", None)
        .register_mapping("power_mppt", "kt210_sac", "mptt_pwr_watt", None)
        .register_mapping("automatic_drain", "kt210_sac", "wte_fth_en", Some(Transform::one_of([0, 1])))
        .register_mapping("wte_fth_en", "kt210_sac", "wte_fth_en", None)
        .register_mapping("water_level", "kt210_sac", "water_value", Some(Transform::int_enum::<WaterLevel>()))
        .register_mapping("ambient_light", "kt210_sac", "rgb_state", Some(Transform::equals(1)))
        .register_mapping("target_temperature", "kt210_sac", "set_temp", None)
        .register_mapping("power_mode", "kt210_sac", "power_mode", Some(Transform::int_enum::<PowerMode>()))
        .register_derived("drain_mode", ["main_mode", "wte_fth_en"], derive_drain_mode);
    projection
}

fn derive_drain_mode(state: &DeviceState) -> Option<Value> {
    let main_mode = state.get("main_mode").and_then(MainMode::from_value)?;
    let wte_fth_en = state.get_as::<i64>("wte_fth_en")?;
    Some(DrainMode::from_wte(main_mode, wte_fth_en).to_value())
}

fn heartbeat_layout() -> Result<FieldLayout> {
    FieldLayout::builder("kt210_sac")
        .field("mode", FieldType::UInt8)
        .field("sub_mode", FieldType::UInt8)
        .field("set_temp", FieldType::UInt8)
        .field("fan_value", FieldType::UInt8)
        .field("env_temp", FieldType::Float32)
        .field("temp_sys", FieldType::UInt8)
        .field("display_idle_time", FieldType::UInt16)
        .field("display_idle_mode", FieldType::UInt8)
        .field("time_en", FieldType::UInt8)
        .field("time_set_val", FieldType::UInt16)
        .field("time_remain_val", FieldType::UInt16)
        .field("beep_enable", FieldType::UInt8)
        .field("err_code", FieldType::UInt32)
        .reserved("name", 32)
        .field("ref_en", FieldType::UInt8)
        .field("bms_pid", FieldType::UInt16)
        .field("wte_fth_en", FieldType::UInt8)
        .field("temp_display", FieldType::UInt8)
        .field("power_mode", FieldType::UInt8)
        .field("power_src", FieldType::UInt8)
        .field("psdr_mode_running", FieldType::UInt8)
        .field("water_value", FieldType::UInt8)
        .field("rgb_state", FieldType::UInt8)
        .field("outlet_temp", FieldType::Float32)
        .field("bat_soc", FieldType::UInt8)
        .field("bat_pwr_watt", FieldType::Int16)
        .field("psdr_pwr_watt", FieldType::Int16)
        .field("mptt_pwr_watt", FieldType::Int16)
        .optional("bat_chg_status", FieldType::UInt8)
        .optional("bat_temp", FieldType::Int8)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{CycleReport, run_cycle};
    use crate::test_utils::{FrameBuilder, layout_payload};

    #[derive(Clone, Copy)]
    struct Heartbeat {
        mode: u8,
        wte_fth_en: u8,
        env_temp: f32,
        fan: u8,
    }

    impl Default for Heartbeat {
        fn default() -> Self {
            Self { mode: 0, wte_fth_en: 1, env_temp: 27.456, fan: 1 }
        }
    }

    fn heartbeat(beat: Heartbeat) -> Vec<u8> {
        let layout = heartbeat_layout().unwrap();
        let values = layout.fields().iter().filter(|spec| !spec.optional).map(|spec| {
            let value = match spec.name.as_str() {
                "mode" => Value::UInt8(beat.mode),
                "wte_fth_en" => Value::UInt8(beat.wte_fth_en),
                "env_temp" => Value::Float32(beat.env_temp),
                "outlet_temp" => Value::Float32(12.0),
                "fan_value" => Value::UInt8(beat.fan),
                "set_temp" => Value::UInt8(18),
                "bat_soc" => Value::UInt8(66),
                "bat_pwr_watt" => Value::Int16(-320),
                "rgb_state" => Value::UInt8(1),
                _ => match spec.field_type {
                    FieldType::Bytes(len) => Value::Bytes(vec![0; len]),
                    _ => Value::UInt8(0),
                },
            };
            (spec.name.as_str(), value)
        });
        layout_payload(&layout, values.collect::<Vec<_>>())
    }

    fn cycle(device: &mut Wave2, beat: Heartbeat) -> CycleReport {
        let frame = FrameBuilder::new(UNIT, UNIT, 0x50).seq(7).payload(heartbeat(beat)).build();
        run_cycle(device, &frame).unwrap()
    }

    #[test]
    fn heartbeat_projects_enums_and_derived_drain_mode() {
        let mut device = Wave2::new().unwrap();
        let report = cycle(&mut device, Heartbeat::default());

        assert!(report.processed);
        assert_eq!(device.main_mode(), Some(MainMode::Cold));
        assert_eq!(device.projection().get("fan_speed").and_then(Value::as_str), Some("medium"));
        assert_eq!(device.projection().get_as::<f64>("ambient_temperature"), Some(27.46));
        assert_eq!(device.projection().get_as::<bool>("ambient_light"), Some(true));
        assert_eq!(device.automatic_drain(), Some(true));
        assert_eq!(device.drain_mode(), Some(DrainMode::DrainFree));
        assert!(report.changed("drain_mode"));

        // Warm mode with flag 1 is external drain
        let report = cycle(&mut device, Heartbeat { mode: 1, ..Heartbeat::default() });
        assert_eq!(device.drain_mode(), Some(DrainMode::External));
        assert!(report.changed("drain_mode"));
        assert!(!report.changed("ambient_temperature"));
    }

    #[test]
    fn unknown_codes_project_to_unknown_state() {
        let mut device = Wave2::new().unwrap();
        cycle(&mut device, Heartbeat { fan: 9, ..Heartbeat::default() });

        let fan = device.projection().get("fan_speed").unwrap();
        assert_eq!(fan.as_str(), Some("unknown"));
        assert_eq!(FanGear::from_value(fan), Some(FanGear::Unknown));
    }

    #[test]
    fn drain_mode_from_wte_table() {
        assert_eq!(DrainMode::from_wte(MainMode::Cold, 1), DrainMode::DrainFree);
        assert_eq!(DrainMode::from_wte(MainMode::Cold, 3), DrainMode::DrainFree);
        assert_eq!(DrainMode::from_wte(MainMode::Cold, 2), DrainMode::External);
        assert_eq!(DrainMode::from_wte(MainMode::Warm, 1), DrainMode::External);
        assert_eq!(DrainMode::from_wte(MainMode::Fan, 3), DrainMode::DrainFree);
    }

    #[test]
    fn main_mode_change_adds_drain_follow_up() {
        let mut device = Wave2::new().unwrap();
        cycle(&mut device, Heartbeat::default());

        let packets = device.encode_command(&Wave2Command::SetMainMode(MainMode::Warm)).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!((packets[0].cmd_id, packets[0].payload.as_slice()), (0x51, &[1u8][..]));
        assert_eq!((packets[1].cmd_id, packets[1].payload.as_slice()), (0x59, &[1u8][..]));

        let packets = device.encode_command(&Wave2Command::SetMainMode(MainMode::Cold)).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn drain_commands_follow_current_state() {
        let mut device = Wave2::new().unwrap();

        // nothing reported yet: automatic drain counts as off
        let packets = device.encode_command(&Wave2Command::SetDrainMode(DrainMode::External)).unwrap();
        assert_eq!(packets[0].payload, vec![2]);
        let packets = device.encode_command(&Wave2Command::EnableAutomaticDrain(false)).unwrap();
        assert_eq!(packets[0].payload, vec![0b10]);

        cycle(&mut device, Heartbeat::default());
        let packets = device.encode_command(&Wave2Command::SetDrainMode(DrainMode::External)).unwrap();
        assert_eq!(packets[0].payload, vec![0]);
        let packets = device.encode_command(&Wave2Command::EnableAutomaticDrain(true)).unwrap();
        assert_eq!(packets[0].payload, vec![1]);

        cycle(&mut device, Heartbeat { mode: 2, ..Heartbeat::default() });
        let packets = device.encode_command(&Wave2Command::SetDrainMode(DrainMode::DrainFree)).unwrap();
        assert_eq!(packets[0].payload, vec![1]);
    }

    #[test]
    fn simple_commands_encode_one_byte() {
        let device = Wave2::new().unwrap();

        let light = &device.encode_command(&Wave2Command::EnableAmbientLight(false)).unwrap()[0];
        assert_eq!((light.dst, light.cmd_set, light.cmd_id, light.payload.as_slice()), (0x42, 0x42, 0x5C, &[2u8][..]));

        let fan = &device.encode_command(&Wave2Command::SetFanSpeed(FanGear::High)).unwrap()[0];
        assert_eq!((fan.cmd_id, fan.payload.as_slice()), (0x5E, &[2u8][..]));

        let temp = &device.encode_command(&Wave2Command::SetTemperature(21)).unwrap()[0];
        assert_eq!((temp.cmd_id, temp.payload.as_slice()), (0x58, &[21u8][..]));

        let power = &device.encode_command(&Wave2Command::SetPowerMode(PowerMode::Standby)).unwrap()[0];
        assert_eq!((power.cmd_id, power.payload.as_slice(), power.version), (0x5B, &[2u8][..], 2));

        let sub = &device.encode_command(&Wave2Command::SetSubMode(SubMode::Night)).unwrap()[0];
        assert_eq!(sub.cmd_id, 0x52);

        assert!(matches!(
            device.encode_command(&Wave2Command::SetFanSpeed(FanGear::Unknown)),
            Err(ProtocolError::CommandRejected { .. })
        ));
    }
}
