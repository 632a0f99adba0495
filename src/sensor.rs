//! Sensor catalogue shared by the readings and the Home Assistant adapter.
//!
//! Every `key` must be the serialized name of the matching reading field, the
//! discovery payload reads it back out of the JSON state with a template.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Voltage,
    Current,
    Temperature,
    Percent,
    ChargeAh,
    EnergyWh,
    Text,
    Flag,
    Position,
    Count,
    Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sensor {
    pub key: &'static str,
    pub name: &'static str,
    pub kind: Kind,
}

pub const fn sensor(key: &'static str, name: &'static str, kind: Kind) -> Sensor {
    Sensor { key, name, kind }
}

pub trait HasSensors {
    fn sensors() -> &'static [Sensor];
}

/// Basic state column of `pwr`, `unit` and `bat`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BaseState {
    Charge,
    Discharge,
    Idle,
    Other(String),
}

impl BaseState {
    pub fn as_str(&self) -> &str {
        match self {
            BaseState::Charge => "Charge",
            BaseState::Discharge => "Dischg",
            BaseState::Idle => "Idle",
            BaseState::Other(s) => s,
        }
    }
}

impl From<&str> for BaseState {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "charge" | "charging" => BaseState::Charge,
            "dischg" | "discharge" | "discharging" => BaseState::Discharge,
            "idle" => BaseState::Idle,
            _ => BaseState::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for BaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for BaseState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
