use crate::error::ParseError;
use crate::pylontech::response::Response;
use crate::reconcile::physical_position;
use crate::sensor::{sensor, BaseState, HasSensors, Kind, Sensor};

use serde::Serialize;
use std::collections::BTreeSet;

const COLUMNS: usize = 16;

/// One battery module, from a row of `unit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReading {
    /// Index printed by the console, 1 is the bottom unit.
    pub reported_index: u16,
    /// 1 is the topmost unit, first in chain after the BMS.
    pub position: u16,
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    pub cell_temperature_low: f64,
    pub cell_temperature_high: f64,
    pub cell_voltage_low: f64,
    pub cell_voltage_high: f64,
    pub base_state: BaseState,
    pub voltage_state: String,
    pub temperature_state: String,
    pub charge_ah_percent: u8,
    pub charge_ah: f64,
    pub charge_wh_percent: u8,
    pub charge_wh: f64,
}

impl UnitReading {
    /// Parses every unit row and returns them topmost first.
    pub fn parse_all(response: &Response) -> Result<Vec<Self>, ParseError> {
        let rows = response.rows();
        if rows.is_empty() {
            return Err(ParseError::NoRecords {
                command: response.command(),
            });
        }

        let count = rows.len();
        let mut seen = BTreeSet::new();
        let mut units = Vec::with_capacity(count);

        for row in rows {
            row.require(COLUMNS)?;

            let index = row.int(0, "index")?;
            let position = usize::try_from(index)
                .ok()
                .and_then(|i| physical_position(count, i))
                .ok_or(ParseError::UnitIndexOutOfRange { index, count })?;
            if !seen.insert(index) {
                return Err(ParseError::DuplicateUnitIndex(index));
            }

            // column 13 (total Ah) and 16+ (total Wh, timestamp) are not published
            units.push(Self {
                reported_index: index as u16,
                position: position as u16,
                voltage: row.milli(1, "voltage")?,
                current: row.milli(2, "current")?,
                temperature: row.milli(3, "temperature")?,
                cell_temperature_low: row.milli(4, "cell_temperature_low")?,
                cell_temperature_high: row.milli(5, "cell_temperature_high")?,
                cell_voltage_low: row.milli(6, "cell_voltage_low")?,
                cell_voltage_high: row.milli(7, "cell_voltage_high")?,
                base_state: BaseState::from(row.text(8, "base_state")?.as_str()),
                voltage_state: row.text(9, "voltage_state")?,
                temperature_state: row.text(10, "temperature_state")?,
                charge_ah_percent: row.percent(11, "charge_ah_percent")?,
                charge_ah: row.milli(12, "charge_ah")?,
                charge_wh_percent: row.percent(14, "charge_wh_percent")?,
                charge_wh: row.scaled(15, "charge_wh", 1.0)?,
            });
        }

        units.sort_by_key(|u| u.position);
        Ok(units)
    }
}

impl HasSensors for UnitReading {
    fn sensors() -> &'static [Sensor] {
        use Kind::*;

        const SENSORS: &[Sensor] = &[
            sensor("position", "Position", Position),
            sensor("voltage", "Voltage", Voltage),
            sensor("current", "Current", Current),
            sensor("temperature", "Temperature", Temperature),
            sensor("cell_temperature_low", "Lowest cell temperature", Temperature),
            sensor("cell_temperature_high", "Highest cell temperature", Temperature),
            sensor("cell_voltage_low", "Lowest cell voltage", Voltage),
            sensor("cell_voltage_high", "Highest cell voltage", Voltage),
            sensor("base_state", "Basic state", Text),
            sensor("voltage_state", "Voltage state", Text),
            sensor("temperature_state", "Temperature state", Text),
            sensor("charge_ah_percent", "Charge Ah %", Percent),
            sensor("charge_ah", "Charge Ah", ChargeAh),
            sensor("charge_wh_percent", "Charge Wh %", Percent),
            sensor("charge_wh", "Charge Wh", EnergyWh),
        ];

        SENSORS
    }
}
