use crate::error::ParseError;
use crate::pylontech::response::Response;
use crate::sensor::{sensor, BaseState, HasSensors, Kind, Sensor};

use serde::Serialize;

const COLUMNS: usize = 28;

/// Aggregate readings of the whole rack, from `pwr`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmsReading {
    pub average_temperature: f64,
    pub dc_voltage: f64,
    pub battery_voltage: f64,
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    pub cell_temperature_low: f64,
    pub cell_temperature_high: f64,
    pub cell_voltage_low: f64,
    pub cell_voltage_high: f64,
    pub unit_temperature_low: f64,
    pub unit_temperature_high: f64,
    pub unit_voltage_low: f64,
    pub unit_voltage_high: f64,
    pub base_state: BaseState,
    pub voltage_state: String,
    pub current_state: String,
    pub temperature_state: String,
    pub charge_ah_percent: u8,
    pub charge_ah: f64,
    pub charge_wh_percent: u8,
    pub charge_wh: f64,
    pub cell_voltage_state: String,
    pub cell_temperature_state: String,
    pub unit_voltage_state: String,
    pub unit_temperature_state: String,
    pub error_code: String,
}

impl BmsReading {
    pub fn parse(response: &Response) -> Result<Self, ParseError> {
        let fields = response.fields();
        let rows = response.rows();
        let row = rows.first().ok_or(ParseError::NoRecords {
            command: response.command(),
        })?;
        row.require(COLUMNS)?;

        // columns 17 (total Ah), 20 (total Wh) and 21-22 (timestamp) are not published
        Ok(Self {
            average_temperature: fields.milli(&["average temp", "avg temp"], "average_temperature")?,
            dc_voltage: fields.milli(&["dc volt"], "dc_voltage")?,
            battery_voltage: fields.milli(&["bat volt"], "battery_voltage")?,
            voltage: row.milli(0, "voltage")?,
            current: row.milli(1, "current")?,
            temperature: row.milli(2, "temperature")?,
            cell_temperature_low: row.milli(3, "cell_temperature_low")?,
            cell_temperature_high: row.milli(4, "cell_temperature_high")?,
            cell_voltage_low: row.milli(5, "cell_voltage_low")?,
            cell_voltage_high: row.milli(6, "cell_voltage_high")?,
            unit_temperature_low: row.milli(7, "unit_temperature_low")?,
            unit_temperature_high: row.milli(8, "unit_temperature_high")?,
            unit_voltage_low: row.milli(9, "unit_voltage_low")?,
            unit_voltage_high: row.milli(10, "unit_voltage_high")?,
            base_state: BaseState::from(row.text(11, "base_state")?.as_str()),
            voltage_state: row.text(12, "voltage_state")?,
            current_state: row.text(13, "current_state")?,
            temperature_state: row.text(14, "temperature_state")?,
            charge_ah_percent: row.percent(15, "charge_ah_percent")?,
            charge_ah: row.milli(16, "charge_ah")?,
            charge_wh_percent: row.percent(18, "charge_wh_percent")?,
            charge_wh: row.scaled(19, "charge_wh", 1.0)?,
            cell_voltage_state: row.text(23, "cell_voltage_state")?,
            cell_temperature_state: row.text(24, "cell_temperature_state")?,
            unit_voltage_state: row.text(25, "unit_voltage_state")?,
            unit_temperature_state: row.text(26, "unit_temperature_state")?,
            error_code: row.text(27, "error_code")?,
        })
    }
}

impl HasSensors for BmsReading {
    fn sensors() -> &'static [Sensor] {
        use Kind::*;

        const SENSORS: &[Sensor] = &[
            sensor("average_temperature", "Average temperature", Temperature),
            sensor("dc_voltage", "DC voltage", Voltage),
            sensor("battery_voltage", "Bat voltage", Voltage),
            sensor("voltage", "Voltage", Voltage),
            sensor("current", "Current", Current),
            sensor("temperature", "Temperature", Temperature),
            sensor("cell_temperature_low", "Lowest cell temperature", Temperature),
            sensor("cell_temperature_high", "Highest cell temperature", Temperature),
            sensor("cell_voltage_low", "Lowest cell voltage", Voltage),
            sensor("cell_voltage_high", "Highest cell voltage", Voltage),
            sensor("unit_temperature_low", "Lowest unit temperature", Temperature),
            sensor("unit_temperature_high", "Highest unit temperature", Temperature),
            sensor("unit_voltage_low", "Lowest unit voltage", Voltage),
            sensor("unit_voltage_high", "Highest unit voltage", Voltage),
            sensor("base_state", "Basic state", Text),
            sensor("voltage_state", "Voltage state", Text),
            sensor("current_state", "Current state", Text),
            sensor("temperature_state", "Temperature state", Text),
            sensor("charge_ah_percent", "Charge Ah %", Percent),
            sensor("charge_ah", "Charge Ah", ChargeAh),
            sensor("charge_wh_percent", "Charge Wh %", Percent),
            sensor("charge_wh", "Charge Wh", EnergyWh),
            sensor("cell_voltage_state", "Cell voltage state", Text),
            sensor("cell_temperature_state", "Cell temperature state", Text),
            sensor("unit_voltage_state", "Unit voltage state", Text),
            sensor("unit_temperature_state", "Unit temperature state", Text),
            sensor("error_code", "Error code", Text),
        ];

        SENSORS
    }
}
