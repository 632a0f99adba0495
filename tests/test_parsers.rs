mod common;
use common::*;

use pylontech_bridge::prelude::*;
use pylontech_bridge::pylontech::{BatteryReading, BmsReading, Response, SystemInfo, UnitReading};
use pylontech_bridge::sensor::BaseState;

fn response(command: Command, raw: Vec<String>) -> Response {
    Response::new(command, raw).unwrap()
}

#[test]
fn pwr_happy_path() {
    common_setup();

    let bms = BmsReading::parse(&response(Command::Pwr, Factory::pwr())).unwrap();

    assert_eq!(bms.average_temperature, 23.466);
    assert_eq!(bms.dc_voltage, 0.0);
    assert_eq!(bms.battery_voltage, 158.614);
    assert_eq!(bms.voltage, 158.614);
    assert_eq!(bms.current, -2.15);
    assert_eq!(bms.temperature, 23.5);
    assert_eq!(bms.cell_voltage_low, 3.296);
    assert_eq!(bms.cell_voltage_high, 3.312);
    assert_eq!(bms.unit_voltage_high, 52.89);
    assert_eq!(bms.base_state, BaseState::Discharge);
    assert_eq!(bms.current_state, "Normal");
    assert_eq!(bms.charge_ah_percent, 88);
    assert_eq!(bms.charge_ah, 32.56);
    assert_eq!(bms.charge_wh_percent, 88);
    assert_eq!(bms.charge_wh, 5168.0);
    assert_eq!(bms.unit_temperature_state, "Normal");
    assert_eq!(bms.error_code, "0");
}

#[test]
fn pwr_truncated_row() {
    common_setup();

    let mut raw = Factory::pwr();
    let row = raw.iter().position(|l| l.starts_with("158614")).unwrap();
    raw[row] = raw[row].split_whitespace().take(20).collect::<Vec<_>>().join(" ");

    assert_eq!(
        BmsReading::parse(&response(Command::Pwr, raw)),
        Err(ParseError::ShortRow {
            command: Command::Pwr,
            row: 1,
            expected: 28,
            got: 20
        })
    );
}

#[test]
fn pwr_missing_label() {
    common_setup();

    let raw: Vec<String> = Factory::pwr()
        .into_iter()
        .filter(|l| !l.starts_with("DC Voltage"))
        .collect();

    assert_eq!(
        BmsReading::parse(&response(Command::Pwr, raw)),
        Err(ParseError::MissingField {
            command: Command::Pwr,
            field: "dc_voltage"
        })
    );
}

#[test]
fn pwr_without_data_row() {
    common_setup();

    let raw: Vec<String> = Factory::pwr()
        .into_iter()
        .filter(|l| !l.starts_with("158614"))
        .collect();

    assert_eq!(
        BmsReading::parse(&response(Command::Pwr, raw)),
        Err(ParseError::NoRecords {
            command: Command::Pwr
        })
    );
}

#[test]
fn unit_rows_are_returned_topmost_first() {
    common_setup();

    let units = UnitReading::parse_all(&response(Command::Unit, Factory::unit(3))).unwrap();

    assert_eq!(units.len(), 3);
    assert_eq!(
        units.iter().map(|u| (u.position, u.reported_index)).collect::<Vec<_>>(),
        vec![(1, 3), (2, 2), (3, 1)]
    );

    let top = &units[0];
    assert_eq!(top.voltage, 52.863);
    assert_eq!(top.current, -2.15);
    assert_eq!(top.temperature, 23.0);
    assert_eq!(top.base_state, BaseState::Discharge);
    assert_eq!(top.charge_ah_percent, 83);
    assert_eq!(top.charge_ah, 32.56);
    assert_eq!(top.charge_wh, 1722.0);

    let bottom = &units[2];
    assert_eq!(bottom.voltage, 52.861);
    assert_eq!(bottom.temperature, 21.0);
}

#[test]
fn single_unit() {
    common_setup();

    let units = UnitReading::parse_all(&response(Command::Unit, Factory::unit(1))).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].position, 1);
}

#[test]
fn unit_index_out_of_range() {
    common_setup();

    let mut raw = Factory::unit(3);
    let row = raw.iter().position(|l| l.starts_with("3 ")).unwrap();
    raw[row] = raw[row].replacen('3', "4", 1);

    assert_eq!(
        UnitReading::parse_all(&response(Command::Unit, raw)),
        Err(ParseError::UnitIndexOutOfRange { index: 4, count: 3 })
    );
}

#[test]
fn unit_index_reported_twice() {
    common_setup();

    let mut raw = Factory::unit(3);
    let row = raw.iter().position(|l| l.starts_with("3 ")).unwrap();
    raw[row] = raw[row].replacen('3', "2", 1);

    assert_eq!(
        UnitReading::parse_all(&response(Command::Unit, raw)),
        Err(ParseError::DuplicateUnitIndex(2))
    );
}

#[test]
fn unit_garbage_value() {
    common_setup();

    let mut raw = Factory::unit(2);
    let row = raw.iter().position(|l| l.starts_with("1 ")).unwrap();
    raw[row] = raw[row].replace("-2150", "-21x0");

    assert_eq!(
        UnitReading::parse_all(&response(Command::Unit, raw)),
        Err(ParseError::InvalidValue {
            command: Command::Unit,
            field: "current",
            value: "-21x0".to_string()
        })
    );
}

#[test]
fn bat_cells_are_mapped_top_down() {
    common_setup();

    let bat = BatteryReading::parse(&response(Command::Bat, Factory::bat(3, 15)), Some(3), 15).unwrap();

    assert_eq!(bat.cells_per_unit, 15);
    assert_eq!(bat.unit_count(), 3);
    assert_eq!(bat.cells.len(), 45);

    assert_eq!(bat.summary.average_temperature, 23.466);
    assert_eq!(bat.summary.charge_current, 0.0);
    assert_eq!(bat.summary.discharge_current, 2.15);
    assert_eq!(bat.summary.state, BaseState::Discharge);
    assert_eq!(bat.summary.voltage, 158.6);

    // topmost cell of the topmost unit is the last row of the last group
    let first = &bat.cells[0];
    assert_eq!((first.unit_position, first.position), (1, 1));
    assert_eq!(first.voltage, 3.354);
    assert!(!first.balancing);

    // reported cell 0 of the bottom unit is its bottom cell, position 15
    let last = &bat.cells[44];
    assert_eq!((last.unit_position, last.position), (3, 15));
    assert_eq!(last.reported_index, 0);
    assert_eq!(last.voltage, 3.3);
    assert_eq!(last.charge_wh, 108.5);
    assert!(last.balancing);

    let mut pairs: Vec<_> = bat.cells.iter().map(|c| (c.unit_position, c.position)).collect();
    pairs.dedup();
    assert_eq!(pairs.len(), 45);
}

#[test]
fn bat_without_unit_layout_uses_cells_per_unit() {
    common_setup();

    let bat = BatteryReading::parse(&response(Command::Bat, Factory::bat(2, 15)), None, 15).unwrap();

    assert_eq!(bat.unit_count(), 2);
    assert_eq!(bat.cells[0].unit_position, 1);
}

#[test]
fn bat_cells_do_not_split_into_units() {
    common_setup();

    assert_eq!(
        BatteryReading::parse(&response(Command::Bat, Factory::bat(3, 15)), Some(4), 15),
        Err(ParseError::CellCountMismatch { cells: 45, units: 4 })
    );

    let mut raw = Factory::bat(3, 15);
    let last_cell = raw.len() - 3;
    raw.remove(last_cell);

    assert!(matches!(
        BatteryReading::parse(&response(Command::Bat, raw), Some(3), 15),
        Err(ParseError::CellCountMismatch { cells: 44, units: 3 })
    ));
}

#[test]
fn info_happy_path() {
    common_setup();

    let info = SystemInfo::parse(&response(Command::Info, Factory::info(&MODULES))).unwrap();

    assert_eq!(info.device_address, Some(1));
    assert_eq!(info.manufacturer.as_deref(), Some("PYLON"));
    assert_eq!(info.device_name.as_deref(), Some("SC0500A-100S"));
    assert_eq!(info.hard_version.as_deref(), Some("V1.0"));
    assert_eq!(info.sw_version().as_deref(), Some("B69.6 / V2.4"));
    assert_eq!(info.barcode, None);
    assert_eq!(info.module_barcode, "HPTBH02240A00001");
    assert_eq!(info.device_test_time.as_deref(), Some("2022-02-14 10:24:11"));
    assert_eq!(info.cell_number, Some(15));
    assert_eq!(info.max_discharge_current, Some(-100.0));
    assert_eq!(info.max_charge_current, Some(100.0));
    assert_eq!(info.new_board.as_deref(), Some("Enable"));
    assert_eq!(info.modules, MODULES.to_vec());
    assert_eq!(info.pcbas.len(), 3);

    // modules are listed bottom unit first
    assert_eq!(info.module_at(1), Some(MODULES[2]));
    assert_eq!(info.module_at(3), Some(MODULES[0]));
    assert_eq!(info.module_at(4), None);
    assert_eq!(info.module_at(0), None);
}

#[test]
fn info_without_module_barcode() {
    common_setup();

    let raw: Vec<String> = Factory::info(&MODULES)
        .into_iter()
        .filter(|l| !l.starts_with("Module Barcode"))
        .collect();

    assert_eq!(
        SystemInfo::parse(&response(Command::Info, raw)),
        Err(ParseError::MissingField {
            command: Command::Info,
            field: "module_barcode"
        })
    );
}

#[test]
fn echo_of_another_command() {
    common_setup();

    assert_eq!(
        Response::new(Command::Unit, Factory::pwr()),
        Err(ParseError::UnexpectedEcho {
            command: Command::Unit,
            got: Some("pwr".to_string())
        })
    );
}
