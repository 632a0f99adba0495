use crate::error::ParseError;
use crate::pylontech::field;
use crate::pylontech::response::Response;

use serde::Serialize;

/// Identification of the BMS and its battery modules, from `info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub device_address: Option<i64>,
    pub manufacturer: Option<String>,
    pub device_name: Option<String>,
    pub board_version: Option<String>,
    pub hard_version: Option<String>,
    pub main_soft_version: Option<String>,
    pub soft_version: Option<String>,
    pub boot_version: Option<String>,
    pub comm_version: Option<String>,
    pub release_date: Option<String>,
    pub barcode: Option<String>,
    pub pcba_barcode: Option<String>,
    pub module_barcode: String,
    pub power_supply_barcode: Option<String>,
    pub device_test_time: Option<String>,
    pub specification: Option<String>,
    pub cell_number: Option<i64>,
    pub max_discharge_current: Option<f64>,
    pub max_charge_current: Option<f64>,
    pub shut_circuit: Option<String>,
    pub relay_feedback: Option<String>,
    pub new_board: Option<String>,
    /// Module barcodes of the BMUs in console order, bottom unit first
    /// like the rows of `unit`.
    pub modules: Vec<String>,
    pub pcbas: Vec<String>,
}

impl SystemInfo {
    pub fn parse(response: &Response) -> Result<Self, ParseError> {
        let command = response.command();
        let fields = response.fields();

        let text = |label: &str| {
            fields
                .get(label)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let int = |label: &str, name: &'static str| -> Result<Option<i64>, ParseError> {
            text(label)
                .map(|v| {
                    field::number(&v, "").ok_or(ParseError::InvalidValue {
                        command,
                        field: name,
                        value: v.clone(),
                    })
                })
                .transpose()
        };
        let amps = |label: &str, name: &'static str| -> Result<Option<f64>, ParseError> {
            text(label)
                .map(|v| {
                    field::number(&v, "mA")
                        .map(|ma| ma as f64 / 1000.0)
                        .ok_or(ParseError::InvalidValue {
                            command,
                            field: name,
                            value: v.clone(),
                        })
                })
                .transpose()
        };

        let module_barcode = text("module barcode").ok_or(ParseError::MissingField {
            command,
            field: "module_barcode",
        })?;

        let barcodes = |label: &str| {
            fields
                .all(label)
                .into_iter()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        Ok(Self {
            device_address: int("device address", "device_address")?,
            manufacturer: text("manufacturer"),
            device_name: text("device name"),
            board_version: text("board version"),
            hard_version: text("hard version"),
            main_soft_version: text("main soft version"),
            soft_version: text("soft version"),
            boot_version: text("boot version"),
            comm_version: text("comm version"),
            release_date: text("release date"),
            barcode: text("barcode"),
            pcba_barcode: text("pcba barcode"),
            module_barcode,
            power_supply_barcode: text("powersupply barcode"),
            device_test_time: text("device test time"),
            specification: text("specification"),
            cell_number: int("cell number", "cell_number")?,
            max_discharge_current: amps("max dischg curr", "max_discharge_current")?,
            max_charge_current: amps("max charge curr", "max_charge_current")?,
            shut_circuit: text("shut circuit"),
            relay_feedback: text("relay feedback"),
            new_board: text("new board"),
            modules: barcodes("module"),
            pcbas: barcodes("pcba"),
        })
    }

    /// Module barcode of the unit at a physical position (1 is topmost).
    pub fn module_at(&self, position: u16) -> Option<&str> {
        let count = self.modules.len();
        let reported = crate::reconcile::physical_position(count, usize::from(position))?;
        self.modules.get(reported - 1).map(String::as_str)
    }

    pub fn sw_version(&self) -> Option<String> {
        match (&self.main_soft_version, &self.soft_version) {
            (Some(main), Some(soft)) => Some(format!("{} / {}", main, soft)),
            (Some(v), None) | (None, Some(v)) => Some(v.clone()),
            (None, None) => None,
        }
    }
}
