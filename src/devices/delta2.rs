//! Delta 2 portable power station

use tracing::{debug, warn};

use crate::adapter::DeviceAdapter;
use crate::codec::{PacketCodec, encode_tagged_field, encode_tagged_fields};
use crate::layout::{DecodedRecord, FieldLayout, LayoutRegistry, TaggedSchema};
use crate::projection::{DeviceState, FieldProjection, Transform};
use crate::routing::{RecordRouter, RoutePattern};
use crate::types::{FieldType, Packet, Value};
use crate::Result;

const APP: u8 = 0x21;
const PACKET_VERSION: u8 = 2;
const PD100_VERSION: u8 = 0x13;

const PD100_CFG_BACKUP_REVERSE_SOC: u32 = 102;
const PD100_CONFIG_READ_ACTION: u32 = 1;

/// Product type reported by kits whose 12 V output sits on the secondary MPPT.
const PRODUCT_TYPE_EXTRA_BATTERY_DC: u8 = 82;

pub const CHARGE_LIMIT_MAX_RANGE: (u8, u8) = (50, 100);
pub const CHARGE_LIMIT_MIN_RANGE: (u8, u8) = (0, 30);

/// Config sections the PD100 controller reports on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pd100ReadAction {
    Display,
    Backup,
}

impl Pd100ReadAction {
    pub fn code(self) -> u64 {
        match self {
            Pd100ReadAction::Display => 41,
            Pd100ReadAction::Backup => 144,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta2Command {
    /// Clamped to [`CHARGE_LIMIT_MAX_RANGE`]
    SetChargeLimitMax(u8),
    /// Clamped to [`CHARGE_LIMIT_MIN_RANGE`]
    SetChargeLimitMin(u8),
    /// Clamped to the charge limits the device last reported
    SetEnergyBackupLevel(u8),
    EnableUsbPorts(bool),
    EnableDc12vPort(bool),
    EnableAcPorts(bool),
    ReadPd100Config(Vec<Pd100ReadAction>),
}

/// Delta 2 adapter: PD, EMS, BMS, inverter and MPPT heartbeats plus PD100
/// config responses.
#[derive(Debug, Clone)]
pub struct Delta2 {
    router: RecordRouter,
    projection: FieldProjection,
    serial: Option<String>,
}

impl Delta2 {
    pub fn new() -> Result<Self> {
        let mut registry = LayoutRegistry::new();
        registry.register("pd", pd_layout()?);
        registry.register("ems", ems_layout()?);
        registry.register("bms_main", bms_layout()?);
        registry.alias("bms_slave", "bms_main")?;
        registry.register("inv", inv_layout()?);
        registry.register("mppt", mppt_layout()?);
        registry.register("kit_detail", kit_entry_layout()?);
        registry.register("pd100", pd100_schema()?);

        let projection = build_projection();
        projection.validate(&registry)?;

        let mut router = RecordRouter::new(registry);
        router
            .route(RoutePattern::new(0x02, 0x20, 0x02), "pd")?
            .route(RoutePattern::new(0x03, 0x03, 0x0E), "kit_detail")?
            .route(RoutePattern::new(0x03, 0x20, 0x02), "ems")?
            .route(RoutePattern::new(0x03, 0x20, 0x32), "bms_main")?
            .route(RoutePattern::new(0x06, 0x20, 0x32), "bms_slave")?
            .route(RoutePattern::any_cmd_set(0x04, 0x02), "inv")?
            .route(RoutePattern::new(0x05, 0x20, 0x02), "mppt")?
            .route(RoutePattern::new(0x02, 0xFE, 0x15), "pd100")?;

        Ok(Self { router, projection, serial: None })
    }

    /// Serial number used to pick this unit's entry out of kit detail reports.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn router(&self) -> &RecordRouter {
        &self.router
    }

    fn dc_12v_dst(&self) -> u8 {
        match self.projection.get_as::<u8>("product_type") {
            Some(PRODUCT_TYPE_EXTRA_BATTERY_DC) => 0x07,
            _ => 0x05,
        }
    }

    /// Kit detail reports list every attached kit. The entry whose serial
    /// matches this unit wins, else the first one.
    fn apply_kit_detail(&mut self, payload: &[u8]) -> Result<()> {
        let Some((&count, entries)) = payload.split_first() else {
            return Ok(());
        };
        let schema = self.router.registry().lookup("kit_detail")?;
        let kits: Vec<_> = entries
            .chunks(schema.layout().width())
            .take(usize::from(count))
            .map(|entry| schema.decode(entry))
            .collect();

        let serial = self.serial.as_deref().map(str::as_bytes);
        let kit = kits
            .iter()
            .find(|kit| {
                let sn = kit.get("sn").and_then(Value::as_bytes).map(trim_nul);
                serial.is_some() && sn == serial
            })
            .or_else(|| kits.first());

        if let Some(product_type) = kit.and_then(|kit| kit.get("product_type")) {
            debug!(kits = kits.len(), product_type = %product_type, "Kit detail received");
            self.projection.set_property("product_type", product_type.clone());
        }
        Ok(())
    }

    fn energy_backup_bounds(&self) -> (u8, u8) {
        let min = self.projection.get_as::<u8>("battery_charge_limit_min").unwrap_or(0);
        let max = self.projection.get_as::<u8>("battery_charge_limit_max").unwrap_or(100);
        if min <= max { (min, max) } else { (0, 100) }
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

fn clamp(command: &str, value: u8, (min, max): (u8, u8)) -> u8 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(command, requested = value, clamped, "Clamped command argument");
    }
    clamped
}

impl DeviceAdapter for Delta2 {
    type Command = Delta2Command;

    fn name(&self) -> &str {
        "Delta 2"
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
        if self.router.record_for(packet).is_some_and(|record| record.as_str() == "kit_detail") {
            self.apply_kit_detail(&packet.payload)?;
            return Ok(true);
        }
        Ok(self.router.apply(&mut self.projection, packet)?.is_some())
    }

    fn encode_command(&self, command: &Delta2Command) -> Result<Vec<Packet>> {
        let packet = match command {
            Delta2Command::SetChargeLimitMax(limit) => {
                let limit = clamp("charge_limit_max", *limit, CHARGE_LIMIT_MAX_RANGE);
                Packet::new(APP, 0x03, 0x20, 0x31, vec![limit], PACKET_VERSION)
            }
            Delta2Command::SetChargeLimitMin(limit) => {
                let limit = clamp("charge_limit_min", *limit, CHARGE_LIMIT_MIN_RANGE);
                Packet::new(APP, 0x03, 0x20, 0x33, vec![limit], PACKET_VERSION)
            }
            Delta2Command::SetEnergyBackupLevel(level) => {
                let level = clamp("energy_backup_level", *level, self.energy_backup_bounds());
                let payload = encode_tagged_field(PD100_CFG_BACKUP_REVERSE_SOC, u64::from(level));
                Packet::new(APP, 0x02, 0xFE, 0x11, payload, PD100_VERSION)
            }
            Delta2Command::EnableUsbPorts(enabled) => {
                Packet::new(APP, 0x02, 0x20, 0x22, vec![u8::from(*enabled)], PACKET_VERSION)
            }
            Delta2Command::EnableDc12vPort(enabled) => {
                Packet::new(APP, self.dc_12v_dst(), 0x20, 0x51, vec![u8::from(*enabled)], PACKET_VERSION)
            }
            Delta2Command::EnableAcPorts(enabled) => {
                let payload = vec![u8::from(*enabled), 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
                Packet::new(APP, 0x05, 0x20, 0x42, payload, PACKET_VERSION)
            }
            Delta2Command::ReadPd100Config(actions) => {
                let payload =
                    encode_tagged_fields(actions.iter().map(|action| (PD100_CONFIG_READ_ACTION, action.code())));
                Packet::new(APP, 0x02, 0xFE, 0x11, payload, PD100_VERSION)
            }
        };
        Ok(vec![packet])
    }
}

fn build_projection() -> FieldProjection {
    let is_one = || Some(Transform::equals(1));
    let millis = || Some(Transform::divide(1000.0).then(Transform::round(2)));

    let mut projection = FieldProjection::new();
    projection
        .register_mapping("ac_output_power", "inv", "output_watts", None)
        .register_mapping("ac_input_power", "pd", "ac_input_watts", None)
        .register_mapping("plugged_in_ac", "pd", "ac_charge_flag", is_one())
        .register_computed("battery_level_main", "bms_main", pack_soc)
        .register_computed("battery_level_slave", "bms_slave", pack_soc)
        .register_mapping("master_design_cap", "bms_main", "design_cap", None)
        .register_mapping("master_remain_cap", "bms_main", "remain_cap", None)
        .register_mapping("slave_design_cap", "bms_slave", "design_cap", None)
        .register_mapping("slave_remain_cap", "bms_slave", "remain_cap", None)
        .register_mapping("input_power", "pd", "watts_in_sum", None)
        .register_mapping("output_power", "pd", "watts_out_sum", None)
        .register_mapping("usbc_output_power", "pd", "typec1_watts", None)
        .register_mapping("usba_output_power", "pd", "usb1_watt", None)
        .register_mapping("usb_ports", "pd", "dc_out_state", is_one())
        .register_mapping("battery_charge_limit_min", "ems", "min_dsg_soc", None)
        .register_mapping("battery_charge_limit_max", "ems", "max_charge_soc", None)
        .register_mapping("cell_temperature", "pd", "car_temp", None)
        .register_mapping("dc_12v_port", "pd", "car_state", is_one())
        .register_mapping("dc_output_power", "pd", "dc_pv_output_watts", None)
        .register_mapping("dc12v_output_voltage", "mppt", "car_out_vol", millis())
        .register_mapping("dc12v_output_current", "mppt", "car_out_amp", millis())
        .register_mapping("ac_ports", "pd", "cfg_ac_enabled", is_one())
        .register_mapping("energy_backup_battery_level", "pd", "bp_power_soc", None)
        .register_mapping("energy_backup", "pd100", "energy_backup_en", is_one())
        .register_mapping("energy_backup_battery_level", "pd100", "backup_reverse_soc", None)
        .register_mapping("ac_charging_speed", "pd100", "acp_chg_pow_max", None)
        .register_mapping("max_ac_charging_power", "pd100", "acp_chg_pow_hal_max", None)
        .register_mapping("battery_charge_limit_max", "pd100", "cms_max_chg_soc", None)
        .register_mapping("battery_charge_limit_min", "pd100", "cms_min_dsg_soc", None)
        .register_derived(
            "battery_level",
            [
                "master_design_cap",
                "master_remain_cap",
                "slave_design_cap",
                "slave_remain_cap",
                "battery_level_main",
                "battery_level_slave",
            ],
            combined_battery_level,
        );
    projection
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pack state of charge: the precise reading while charging, else the integer SoC.
fn pack_soc(record: &DecodedRecord) -> Option<Value> {
    let input = record.get_as::<u32>("input_watts").unwrap_or(0);
    let output = record.get_as::<u32>("output_watts").unwrap_or(0);
    let precise = record.get_as::<f64>("f32_show_soc").map(round2);

    let soc = match (input > output, precise, record.get_as::<f64>("soc")) {
        (true, Some(precise), _) => precise,
        (_, _, Some(soc)) => soc,
        (_, precise, None) => precise?,
    };
    Some(Value::Float64(soc))
}

/// Capacity-weighted level over both packs, falling back to pack SoC.
fn combined_battery_level(state: &DeviceState) -> Option<Value> {
    let cap = |property| state.get_as::<f64>(property).unwrap_or(0.0);
    let design = cap("master_design_cap") + cap("slave_design_cap");
    let remain = cap("master_remain_cap") + cap("slave_remain_cap");

    let level = if design > 0.0 {
        round2(remain / design * 100.0)
    } else {
        match (state.get_as::<f64>("battery_level_main"), state.get_as::<f64>("battery_level_slave")) {
            (Some(main), Some(slave)) => round2((main + slave) / 2.0),
            (Some(main), None) => main,
            (None, Some(slave)) => slave,
            (None, None) => return None,
        }
    };
    Some(Value::Float64(level))
}

fn pd_layout() -> Result<FieldLayout> {
    FieldLayout::builder("pd_heart")
        .field("model", FieldType::UInt8)
        .reserved("error_code", 4)
        .reserved("sys_ver", 4)
        .reserved("wifi_ver", 4)
        .field("wifi_auto_recovery", FieldType::UInt8)
        .field("soc", FieldType::UInt8)
        .field("watts_out_sum", FieldType::UInt16)
        .field("watts_in_sum", FieldType::UInt16)
        .field("remain_time", FieldType::Int32)
        .field("quiet_mode", FieldType::UInt8)
        .field("dc_out_state", FieldType::UInt8)
        .field("usb1_watt", FieldType::UInt8)
        .field("usb2_watt", FieldType::UInt8)
        .field("qc_usb1_watt", FieldType::UInt8)
        .field("qc_usb2_watt", FieldType::UInt8)
        .field("typec1_watts", FieldType::UInt8)
        .field("typec2_watts", FieldType::UInt8)
        .field("typec1_temp", FieldType::UInt8)
        .field("typec2_temp", FieldType::UInt8)
        .field("car_state", FieldType::UInt8)
        .field("car_watts", FieldType::UInt8)
        .field("car_temp", FieldType::UInt8)
        .field("standby_min", FieldType::UInt16)
        .field("lcd_off_sec", FieldType::UInt16)
        .field("lcd_brightness", FieldType::UInt8)
        .field("chg_power_dc", FieldType::UInt32)
        .field("chg_sun_power", FieldType::UInt32)
        .field("chg_power_ac", FieldType::UInt32)
        .field("dsg_power_dc", FieldType::UInt32)
        .field("dsg_power_ac", FieldType::UInt32)
        .field("usb_used_time", FieldType::UInt32)
        .field("usb_qc_used_time", FieldType::UInt32)
        .field("type_c_used_time", FieldType::UInt32)
        .field("car_used_time", FieldType::UInt32)
        .field("inv_used_time", FieldType::UInt32)
        .field("dc_in_used_time", FieldType::UInt32)
        .field("mppt_used_time", FieldType::UInt32)
        .optional("ac_input_watts", FieldType::UInt16)
        .optional("ac_charge_flag", FieldType::UInt8)
        .optional("dc_pv_output_watts", FieldType::UInt16)
        .optional("cfg_ac_enabled", FieldType::UInt8)
        .optional("bp_power_soc", FieldType::UInt8)
        .build()
}

fn ems_layout() -> Result<FieldLayout> {
    FieldLayout::builder("ems_heart")
        .field("chg_state", FieldType::UInt8)
        .field("chg_cmd", FieldType::UInt8)
        .field("dsg_cmd", FieldType::UInt8)
        .field("chg_vol", FieldType::UInt32)
        .field("chg_amp", FieldType::UInt32)
        .field("fan_level", FieldType::UInt8)
        .field("max_charge_soc", FieldType::UInt8)
        .field("bms_model", FieldType::UInt8)
        .field("lcd_show_soc", FieldType::UInt8)
        .field("open_ups_flag", FieldType::UInt8)
        .field("bms_warning_state", FieldType::UInt8)
        .field("chg_remain_time", FieldType::UInt32)
        .field("dsg_remain_time", FieldType::UInt32)
        .field("ems_is_normal_flag", FieldType::UInt8)
        .field("f32_lcd_show_soc", FieldType::Float32)
        .reserved("bms_is_connt", 3)
        .field("max_available_num", FieldType::UInt8)
        .field("open_bms_idx", FieldType::UInt8)
        .field("para_vol_min", FieldType::UInt32)
        .field("para_vol_max", FieldType::UInt32)
        .field("min_dsg_soc", FieldType::UInt8)
        .optional("min_open_oil_eb_soc", FieldType::UInt8)
        .optional("max_close_oil_eb_soc", FieldType::UInt8)
        .build()
}

/// Shared by the main pack and the extra battery; the trailing fields only
/// appear on the main pack.
fn bms_layout() -> Result<FieldLayout> {
    FieldLayout::builder("bms_heart")
        .field("num", FieldType::UInt8)
        .field("type", FieldType::UInt8)
        .field("cell_id", FieldType::UInt8)
        .field("err_code", FieldType::UInt32)
        .field("sys_ver", FieldType::UInt32)
        .field("soc", FieldType::UInt8)
        .field("vol", FieldType::UInt32)
        .field("amp", FieldType::Int32)
        .field("temp", FieldType::Int8)
        .field("open_bms_idx", FieldType::UInt8)
        .field("design_cap", FieldType::UInt32)
        .field("remain_cap", FieldType::UInt32)
        .field("full_cap", FieldType::UInt32)
        .field("cycles", FieldType::UInt32)
        .field("soh", FieldType::UInt8)
        .field("max_cell_vol", FieldType::UInt16)
        .field("min_cell_vol", FieldType::UInt16)
        .field("max_cell_temp", FieldType::Int8)
        .field("min_cell_temp", FieldType::Int8)
        .field("max_mos_temp", FieldType::Int8)
        .field("min_mos_temp", FieldType::Int8)
        .field("bms_fault", FieldType::UInt8)
        .field("bq_sys_stat_reg", FieldType::UInt8)
        .field("tag_chg_amp", FieldType::UInt32)
        .field("f32_show_soc", FieldType::Float32)
        .field("input_watts", FieldType::UInt32)
        .field("output_watts", FieldType::UInt32)
        .field("remain_time", FieldType::UInt32)
        .optional("mos_state", FieldType::UInt8)
        .optional("balance_state", FieldType::UInt32)
        .optional("max_vol_diff", FieldType::UInt8)
        .optional("cell_series_num", FieldType::UInt8)
        .build()
}

fn inv_layout() -> Result<FieldLayout> {
    FieldLayout::builder("inv_heart")
        .reserved("err_code", 4)
        .reserved("sys_ver", 4)
        .field("charger_type", FieldType::UInt8)
        .field("input_watts", FieldType::UInt16)
        .field("output_watts", FieldType::UInt16)
        .build()
}

fn mppt_layout() -> Result<FieldLayout> {
    FieldLayout::builder("mppt_heart")
        .field("fault_code", FieldType::UInt32)
        .reserved("sw_ver", 4)
        .field("in_vol", FieldType::UInt32)
        .field("in_amp", FieldType::UInt32)
        .field("in_watts", FieldType::UInt16)
        .field("out_vol", FieldType::UInt32)
        .field("out_amp", FieldType::UInt32)
        .field("out_watts", FieldType::UInt16)
        .field("mppt_temp", FieldType::Int16)
        .field("xt60_chg_type", FieldType::UInt8)
        .field("cfg_chg_type", FieldType::UInt8)
        .field("chg_type", FieldType::UInt8)
        .field("chg_state", FieldType::UInt8)
        .field("dcdc_12v_vol", FieldType::UInt32)
        .field("dcdc_12v_amp", FieldType::UInt32)
        .field("dcdc_12v_watts", FieldType::UInt16)
        .field("car_out_vol", FieldType::UInt32)
        .field("car_out_amp", FieldType::UInt32)
        .field("car_out_watts", FieldType::UInt16)
        .field("car_temp", FieldType::Int16)
        .field("car_state", FieldType::UInt8)
        .optional("dc24v_temp", FieldType::Int16)
        .optional("dc24v_state", FieldType::UInt8)
        .optional("chg_pause_flag", FieldType::UInt8)
        .optional("cfg_dc_chg_current", FieldType::UInt32)
        .build()
}

/// One entry of the accessory detail report, which is a kit count followed
/// by that many entries.
fn kit_entry_layout() -> Result<FieldLayout> {
    FieldLayout::builder("kit_detail")
        .reserved("sn", 16)
        .field("product_type", FieldType::UInt8)
        .field("product_detail", FieldType::UInt8)
        .optional("procedure_state", FieldType::UInt8)
        .optional("app_version", FieldType::UInt32)
        .optional("loader_version", FieldType::UInt32)
        .build()
}

fn pd100_schema() -> Result<TaggedSchema> {
    TaggedSchema::new(
        "pd100",
        [
            (7, "energy_backup_en"),
            (107, "acp_chg_pow_max"),
            (108, "acp_chg_pow_hal_max"),
            (270, "cms_max_chg_soc"),
            (271, "cms_min_dsg_soc"),
            (461, "backup_reverse_soc"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;
    use crate::adapter::run_cycle;
    use crate::test_utils::{FrameBuilder, layout_payload};

    /// Required fields of `layout`, zeroed except for `overrides`.
    fn heartbeat(layout: &FieldLayout, overrides: &[(&str, Value)]) -> Vec<u8> {
        let values: Vec<(&str, Value)> = layout
            .fields()
            .iter()
            .filter(|spec| !spec.optional)
            .map(|spec| {
                let value = overrides
                    .iter()
                    .find(|(name, _)| *name == spec.name)
                    .map_or_else(|| zero(spec.field_type), |(_, value)| value.clone());
                (spec.name.as_str(), value)
            })
            .collect();
        layout_payload(layout, values)
    }

    fn bms_payload(soc: u8, show_soc: f32, design: u32, remain: u32, input: u32, output: u32) -> Vec<u8> {
        heartbeat(
            &bms_layout().unwrap(),
            &[
                ("soc", Value::UInt8(soc)),
                ("f32_show_soc", Value::Float32(show_soc)),
                ("design_cap", Value::UInt32(design)),
                ("remain_cap", Value::UInt32(remain)),
                ("input_watts", Value::UInt32(input)),
                ("output_watts", Value::UInt32(output)),
            ],
        )
    }

    fn kit_entry(sn: &str, product_type: u8) -> Vec<u8> {
        let mut entry = sn.as_bytes().to_vec();
        entry.resize(16, 0);
        entry.extend_from_slice(&[product_type, 0, 1]);
        entry.extend_from_slice(&[0; 8]);
        entry
    }

    fn zero(field_type: FieldType) -> Value {
        match field_type {
            FieldType::Bytes(len) => Value::Bytes(vec![0; len]),
            FieldType::Float32 => Value::Float32(0.0),
            _ => Value::UInt8(0),
        }
    }

    fn cycle(device: &mut Delta2, src: u8, cmd_set: u8, cmd_id: u8, payload: Vec<u8>) -> crate::adapter::CycleReport {
        let frame = FrameBuilder::new(src, cmd_set, cmd_id).seq(0x0102_0304).payload(payload).build();
        run_cycle(device, &frame).unwrap()
    }

    #[test]
    fn layouts_build_and_validate() {
        let device = Delta2::new().unwrap();
        assert_eq!(device.router().routes().len(), 8);
        assert_eq!(inv_layout().unwrap().width(), 13);
        assert!(device.router().registry().contains("bms_slave"));
    }

    #[test]
    fn inverter_heartbeat_maps_ac_output() {
        let mut device = Delta2::new().unwrap();
        let mut payload = vec![0; 9];
        payload.extend_from_slice(&120u16.to_le_bytes());
        payload.extend_from_slice(&450u16.to_le_bytes());

        // inverter route accepts any command set
        let report = cycle(&mut device, 0x04, 0x11, 0x02, payload);
        assert!(report.processed);
        assert_eq!(device.projection().get_as::<u16>("ac_output_power"), Some(450));
    }

    #[test]
    fn pack_soc_prefers_precise_reading_while_charging() {
        let mut device = Delta2::new().unwrap();

        cycle(&mut device, 0x03, 0x20, 0x32, bms_payload(80, 80.456, 0, 0, 300, 10));
        assert_eq!(device.projection().get_as::<f64>("battery_level_main"), Some(80.46));

        cycle(&mut device, 0x03, 0x20, 0x32, bms_payload(80, 80.456, 0, 0, 0, 200));
        assert_eq!(device.projection().get_as::<f64>("battery_level_main"), Some(80.0));
        // no capacity reported: combined level falls back to the main pack
        assert_eq!(device.projection().get_as::<f64>("battery_level"), Some(80.0));
    }

    #[test]
    fn combined_level_uses_capacity_of_both_packs() {
        let mut device = Delta2::new().unwrap();

        cycle(&mut device, 0x03, 0x20, 0x32, bms_payload(50, 50.0, 40_000, 20_000, 0, 0));
        assert_eq!(device.projection().get_as::<f64>("battery_level"), Some(50.0));

        let report = cycle(&mut device, 0x06, 0x20, 0x32, bms_payload(100, 100.0, 40_000, 40_000, 0, 0));
        assert!(report.changed("battery_level_slave"));
        assert!(report.changed("battery_level"));
        assert_eq!(device.projection().get_as::<f64>("battery_level"), Some(75.0));
        assert_eq!(device.projection().get_as::<u32>("slave_design_cap"), Some(40_000));
    }

    #[test]
    fn pd100_config_response_updates_shared_properties() {
        let mut device = Delta2::new().unwrap();
        let payload = encode_tagged_fields([(7, 1), (461, 30), (270, 90), (271, 10), (999, 5)]);

        let report = cycle(&mut device, 0x02, 0xFE, 0x15, payload);
        assert!(report.changed("energy_backup"));
        assert_eq!(device.projection().get_as::<bool>("energy_backup"), Some(true));
        assert_eq!(device.projection().get_as::<u64>("energy_backup_battery_level"), Some(30));
        assert_eq!(device.projection().get_as::<u8>("battery_charge_limit_max"), Some(90));

        // backup level is clamped to the reported charge limits
        let packets = device.encode_command(&Delta2Command::SetEnergyBackupLevel(95)).unwrap();
        assert_eq!(packets[0].payload, encode_tagged_field(102, 90));
        assert_eq!(packets[0].version, 0x13);
    }

    #[test]
    fn charge_limits_from_ems_and_pd100_compare_by_value() {
        let mut device = Delta2::new().unwrap();
        let ems = heartbeat(
            &ems_layout().unwrap(),
            &[("max_charge_soc", Value::UInt8(90)), ("min_dsg_soc", Value::UInt8(10))],
        );

        let report = cycle(&mut device, 0x02, 0xFE, 0x15, encode_tagged_fields([(270, 90), (271, 10)]));
        assert!(report.changed("battery_charge_limit_max"));
        assert!(report.changed("battery_charge_limit_min"));

        // same limits again, now as u8 heartbeat fields instead of u64 varints
        let report = cycle(&mut device, 0x03, 0x20, 0x02, ems);
        assert!(report.processed);
        assert!(!report.changed("battery_charge_limit_max"));
        assert!(!report.changed("battery_charge_limit_min"));

        let report = cycle(&mut device, 0x02, 0xFE, 0x15, encode_tagged_fields([(270, 90), (271, 15)]));
        assert!(!report.changed("battery_charge_limit_max"));
        assert!(report.changed("battery_charge_limit_min"));
        assert_eq!(device.projection().get_as::<u8>("battery_charge_limit_min"), Some(15));
    }

    #[test]
    fn energy_backup_level_from_pd_and_pd100_compare_by_value() {
        let mut device = Delta2::new().unwrap();
        let mut pd = heartbeat(&pd_layout().unwrap(), &[]);
        // optional trailing fields up to bp_power_soc
        pd.extend_from_slice(&[0, 0, 0, 0, 0, 0, 40]);

        let report = cycle(&mut device, 0x02, 0x20, 0x02, pd);
        assert!(report.changed("energy_backup_battery_level"));

        let report = cycle(&mut device, 0x02, 0xFE, 0x15, encode_tagged_fields([(461, 40)]));
        assert!(report.processed);
        assert!(!report.changed("energy_backup_battery_level"));
    }

    #[test]
    fn kit_detail_picks_entry_by_serial() {
        let mut payload = vec![2];
        payload.extend(kit_entry("R331ZEB4ZE000001", 70));
        payload.extend(kit_entry("R331ZEB4ZE000002", PRODUCT_TYPE_EXTRA_BATTERY_DC));

        let mut device = Delta2::new().unwrap().with_serial("R331ZEB4ZE000002");
        let report = cycle(&mut device, 0x03, 0x03, 0x0E, payload.clone());
        assert!(report.changed("product_type"));
        assert_eq!(device.projection().get_as::<u8>("product_type"), Some(PRODUCT_TYPE_EXTRA_BATTERY_DC));

        // unknown serial falls back to the first kit
        let mut device = Delta2::new().unwrap().with_serial("R331ZEB4ZE999999");
        cycle(&mut device, 0x03, 0x03, 0x0E, payload.clone());
        assert_eq!(device.projection().get_as::<u8>("product_type"), Some(70));

        let mut device = Delta2::new().unwrap();
        cycle(&mut device, 0x03, 0x03, 0x0E, payload);
        assert_eq!(device.projection().get_as::<u8>("product_type"), Some(70));

        let report = cycle(&mut device, 0x03, 0x03, 0x0E, vec![0]);
        assert!(report.processed);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn charge_limit_commands_clamp() {
        let device = Delta2::new().unwrap();

        let packets = device.encode_command(&Delta2Command::SetChargeLimitMax(30)).unwrap();
        assert_eq!(packets[0].payload, vec![50]);
        assert_eq!((packets[0].dst, packets[0].cmd_set, packets[0].cmd_id), (0x03, 0x20, 0x31));

        let packets = device.encode_command(&Delta2Command::SetChargeLimitMin(45)).unwrap();
        assert_eq!(packets[0].payload, vec![30]);
        assert_eq!(packets[0].cmd_id, 0x33);
    }

    #[test]
    fn dc_port_destination_follows_product_type() {
        let mut device = Delta2::new().unwrap();
        let command = Delta2Command::EnableDc12vPort(true);
        assert_eq!(device.encode_command(&command).unwrap()[0].dst, 0x05);

        let mut kit = vec![1];
        kit.extend_from_slice(&[0; 16]);
        kit.extend_from_slice(&[PRODUCT_TYPE_EXTRA_BATTERY_DC, 0]);
        cycle(&mut device, 0x03, 0x03, 0x0E, kit);

        let packet = &device.encode_command(&command).unwrap()[0];
        assert_eq!((packet.dst, packet.cmd_id, packet.payload.as_slice()), (0x07, 0x51, &[1u8][..]));
    }

    #[test]
    fn port_toggles_and_config_reads_encode() {
        let device = Delta2::new().unwrap();

        let ac = &device.encode_command(&Delta2Command::EnableAcPorts(false)).unwrap()[0];
        assert_eq!(ac.payload, vec![0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let usb = &device.encode_command(&Delta2Command::EnableUsbPorts(true)).unwrap()[0];
        assert_eq!((usb.dst, usb.cmd_id, usb.payload.as_slice()), (0x02, 0x22, &[1u8][..]));

        let read = Delta2Command::ReadPd100Config(vec![Pd100ReadAction::Display, Pd100ReadAction::Backup]);
        let packet = &device.encode_command(&read).unwrap()[0];
        assert_eq!(packet.payload, vec![0x08, 41, 0x08, 0x90, 0x01]);
    }

    #[test]
    fn corrupted_frames_leave_state_untouched() {
        let mut device = Delta2::new().unwrap();
        cycle(&mut device, 0x03, 0x20, 0x32, bms_payload(60, 60.0, 0, 0, 0, 0));
        let before = device.projection().state().snapshot();

        let mut frame = FrameBuilder::new(0x03, 0x20, 0x32).payload(bms_payload(10, 10.0, 0, 0, 0, 0)).build();
        frame[20] ^= 0x40;
        let error = run_cycle(&mut device, &frame).unwrap_err();
        assert!(matches!(error, ProtocolError::ChecksumMismatch { .. }));
        assert_eq!(device.projection().state().snapshot(), before);
    }
}
