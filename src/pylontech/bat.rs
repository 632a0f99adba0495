use crate::error::ParseError;
use crate::pylontech::response::Response;
use crate::reconcile::{cell_position, physical_position};
use crate::sensor::{sensor, BaseState, HasSensors, Kind, Sensor};

use serde::Serialize;

const COLUMNS: usize = 11;

/// Header block of `bat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatterySummary {
    pub average_temperature: f64,
    pub charge_current: f64,
    pub discharge_current: f64,
    pub state: BaseState,
    pub voltage: f64,
}

/// One cell, from a row of `bat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellReading {
    /// Battery column as printed by the console.
    pub reported_index: i64,
    /// Physical position of the owning unit, topmost first.
    pub unit_position: u16,
    /// Position within the owning unit, topmost first.
    pub position: u16,
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    pub voltage_state: String,
    pub temperature_state: String,
    pub charge_ah_percent: u8,
    pub charge_ah: f64,
    pub charge_wh_percent: u8,
    pub charge_wh: f64,
    pub balancing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryReading {
    pub summary: BatterySummary,
    pub cells_per_unit: usize,
    pub cells: Vec<CellReading>,
}

impl BatteryReading {
    /// `bat` lists every cell of the rack, bottom unit first and bottom cell
    /// first within a unit. `units` is the unit count from `unit` when known,
    /// otherwise the rows are split by `default_cells_per_unit`.
    pub fn parse(
        response: &Response,
        units: Option<usize>,
        default_cells_per_unit: usize,
    ) -> Result<Self, ParseError> {
        let fields = response.fields();
        let summary = BatterySummary {
            average_temperature: fields.milli(&["average temp", "avg temp"], "average_temperature")?,
            charge_current: fields.milli(&["charge curr"], "charge_current")?,
            discharge_current: fields.milli(&["dischg curr", "discharge curr"], "discharge_current")?,
            state: BaseState::from(fields.require(&["bat state", "state"], "state")?),
            // reported in 0.1 V steps
            voltage: fields.scaled(&["bat volt"], "voltage", 10.0)?,
        };

        let rows = response.rows();
        if rows.is_empty() {
            return Err(ParseError::NoRecords {
                command: response.command(),
            });
        }

        let total = rows.len();
        let (unit_count, cells_per_unit) = match units {
            Some(n) if n > 0 && total % n == 0 => (n, total / n),
            Some(n) => return Err(ParseError::CellCountMismatch { cells: total, units: n }),
            None if default_cells_per_unit > 0 && total % default_cells_per_unit == 0 => {
                (total / default_cells_per_unit, default_cells_per_unit)
            }
            None => {
                return Err(ParseError::CellCountMismatch {
                    cells: total,
                    units: total / default_cells_per_unit.max(1),
                })
            }
        };

        let mut cells = Vec::with_capacity(total);
        for (k, row) in rows.iter().enumerate() {
            row.require(COLUMNS)?;

            let group = k / cells_per_unit;
            let within = k % cells_per_unit;

            // both are in range by construction of unit_count and cells_per_unit
            let unit_position = physical_position(unit_count, group + 1).unwrap_or(0);
            let position = cell_position(cells_per_unit, within).unwrap_or(0);

            cells.push(CellReading {
                reported_index: row.int(0, "index")?,
                unit_position: unit_position as u16,
                position: position as u16,
                voltage: row.milli(1, "voltage")?,
                current: row.milli(2, "current")?,
                temperature: row.milli(3, "temperature")?,
                voltage_state: row.text(4, "voltage_state")?,
                temperature_state: row.text(5, "temperature_state")?,
                charge_ah_percent: row.percent(6, "charge_ah_percent")?,
                charge_ah: row.milli(7, "charge_ah")?,
                charge_wh_percent: row.percent(8, "charge_wh_percent")?,
                charge_wh: row.milli(9, "charge_wh")?,
                balancing: row.flag(10, "balancing")?,
            });
        }

        cells.sort_by_key(|c| (c.unit_position, c.position));

        Ok(Self {
            summary,
            cells_per_unit,
            cells,
        })
    }

    pub fn unit_count(&self) -> usize {
        self.cells.len() / self.cells_per_unit.max(1)
    }
}

impl HasSensors for BatterySummary {
    fn sensors() -> &'static [Sensor] {
        use Kind::*;

        const SENSORS: &[Sensor] = &[
            sensor("average_temperature", "Battery average temperature", Temperature),
            sensor("charge_current", "Charge current", Current),
            sensor("discharge_current", "Discharge current", Current),
            sensor("state", "Battery state", Text),
            sensor("voltage", "Battery voltage", Voltage),
        ];

        SENSORS
    }
}

impl HasSensors for CellReading {
    fn sensors() -> &'static [Sensor] {
        use Kind::*;

        const SENSORS: &[Sensor] = &[
            sensor("voltage", "Cell voltage", Voltage),
            sensor("current", "Cell current", Current),
            sensor("temperature", "Cell temperature", Temperature),
            sensor("voltage_state", "Cell voltage state", Text),
            sensor("temperature_state", "Cell temperature state", Text),
            sensor("charge_ah_percent", "Cell charge Ah %", Percent),
            sensor("charge_ah", "Cell charge Ah", ChargeAh),
            sensor("charge_wh_percent", "Cell charge Wh %", Percent),
            sensor("charge_wh", "Cell charge Wh", EnergyWh),
            sensor("balancing", "Cell balance", Flag),
        ];

        SENSORS
    }
}
