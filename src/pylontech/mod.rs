pub mod bat;
pub mod console;
pub mod decoder;
pub mod field;
pub mod info;
pub mod pwr;
pub mod response;
pub mod unit;

pub use bat::{BatteryReading, BatterySummary, CellReading};
pub use info::SystemInfo;
pub use pwr::BmsReading;
pub use response::Response;
pub use unit::UnitReading;
