use crate::prelude::*;

use crate::coordinator::snapshot::Health;
use crate::pylontech::{BatterySummary, BmsReading, CellReading, SystemInfo, UnitReading};
use crate::sensor::{HasSensors, Kind, Sensor};

use serde::Serialize;

// Topics {{{
/// State topics of one BMS, relative to the MQTT namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    bms: String,
}

impl Topics {
    pub fn new(bms: &str) -> Self {
        Self {
            bms: sanitise(bms),
        }
    }

    pub fn for_info(info: &SystemInfo) -> Self {
        Self::new(&info.module_barcode)
    }

    pub fn key(&self) -> &str {
        &self.bms
    }

    pub fn bms(&self) -> String {
        format!("{}/bms", self.bms)
    }

    pub fn bat(&self) -> String {
        format!("{}/bat", self.bms)
    }

    pub fn info(&self) -> String {
        format!("{}/info", self.bms)
    }

    pub fn health(&self) -> String {
        format!("{}/health", self.bms)
    }

    pub fn availability(&self) -> String {
        format!("{}/availability", self.bms)
    }

    pub fn unit(&self, id: UnitId) -> String {
        format!("{}/bmu/{}", self.bms, id)
    }

    pub fn cell(&self, id: UnitId, position: u16) -> String {
        format!("{}/bmu/{}/cell/{}", self.bms, id, position)
    }
}

// keep topic and object ids to what Home Assistant accepts
fn sanitise(s: &str) -> String {
    let s: String = s
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if s.is_empty() {
        "bms".to_string()
    } else {
        s
    }
} // }}}

// Discovery payload {{{
#[derive(Debug, Serialize)]
struct Availability {
    topic: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Device {
    identifiers: Vec<String>,
    name: String,
    manufacturer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    via_device: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Entity {
    name: String,
    unique_id: String,
    object_id: String,
    state_topic: String,
    value_template: String,
    availability: Vec<Availability>,
    availability_mode: &'static str,
    device: Device,

    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_display_precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_category: Option<&'static str>,
}

struct Class {
    unit: Option<&'static str>,
    device_class: Option<&'static str>,
    state_class: Option<&'static str>,
    precision: Option<u8>,
    icon: Option<&'static str>,
    category: Option<&'static str>,
}

impl Class {
    fn of(kind: Kind) -> Self {
        let measurement = Some("measurement");
        let battery_icon = Some("mdi:home-battery-outline");

        let (unit, device_class, state_class, precision, icon, category) = match kind {
            Kind::Current => (Some("A"), Some("current"), measurement, None, None, None),
            Kind::Voltage => (Some("V"), Some("voltage"), measurement, Some(2), None, None),
            Kind::ChargeAh => (Some("Ah"), None, measurement, Some(1), battery_icon, None),
            Kind::EnergyWh => (Some("Wh"), Some("energy_storage"), measurement, None, battery_icon, None),
            Kind::Temperature => (Some("°C"), Some("temperature"), measurement, None, None, None),
            Kind::Percent => (Some("%"), Some("battery"), measurement, None, None, None),
            Kind::Text => (None, None, None, None, None, None),
            Kind::Flag => (None, None, None, None, Some("mdi:scale-balance"), None),
            Kind::Position => (None, None, None, None, Some("mdi:format-list-numbered"), Some("diagnostic")),
            Kind::Count => (None, None, measurement, None, Some("mdi:alert-circle-outline"), Some("diagnostic")),
            Kind::Timestamp => (None, Some("timestamp"), None, None, None, Some("diagnostic")),
        };

        Self {
            unit,
            device_class,
            state_class,
            precision,
            icon,
            category,
        }
    }
} // }}}

/// Discovery configuration for one BMS and everything below it.
pub struct Config {
    config: ConfigWrapper,
    topics: Topics,
    device: Device,
}

impl Config {
    pub fn new(config: &ConfigWrapper, info: &SystemInfo) -> Self {
        let topics = Topics::for_info(info);

        let device = Device {
            identifiers: vec![Self::bms_identifier(&topics)],
            name: info
                .device_name
                .clone()
                .map(|n| format!("Pylontech {}", n))
                .unwrap_or_else(|| "Pylontech BMS".to_string()),
            manufacturer: info
                .manufacturer
                .clone()
                .unwrap_or_else(|| "Pylontech".to_string()),
            model: info.device_name.clone(),
            sw_version: info.sw_version(),
            hw_version: info.board_version.clone(),
            serial_number: Some(info.module_barcode.clone()),
            via_device: None,
        };

        Self {
            config: config.clone(),
            topics,
            device,
        }
    }

    fn bms_identifier(topics: &Topics) -> String {
        format!("pylontech_{}", topics.key())
    }

    fn unit_device(&self, id: UnitId, barcode: Option<&str>) -> Device {
        Device {
            identifiers: vec![format!("{}_bmu_{}", Self::bms_identifier(&self.topics), id)],
            name: format!("Pylontech BMU {}", id),
            manufacturer: self.device.manufacturer.clone(),
            model: Some("BMU".to_string()),
            sw_version: None,
            hw_version: None,
            serial_number: barcode.map(str::to_string),
            via_device: Some(Self::bms_identifier(&self.topics)),
        }
    }

    /// Discovery messages for the entities present in `snapshot`.
    pub fn all(&self, snapshot: &Snapshot) -> Result<Vec<mqtt::Message>> {
        let mut r = Vec::new();

        r.extend(self.entities::<Health>(&self.topics.health(), "health", "", &self.device)?);

        if snapshot.bms.is_some() {
            r.extend(self.entities::<BmsReading>(&self.topics.bms(), "bms", "", &self.device)?);
        }

        if snapshot.battery.is_some() {
            r.extend(self.entities::<BatterySummary>(&self.topics.bat(), "bat", "", &self.device)?);
        }

        for (id, barcode, cells) in snapshot.layout() {
            let device = self.unit_device(id, barcode.as_deref());
            r.extend(self.entities::<UnitReading>(
                &self.topics.unit(id),
                &format!("bmu_{}", id),
                &format!("BMU {} ", id),
                &device,
            )?);

            for position in cells {
                r.extend(self.entities::<CellReading>(
                    &self.topics.cell(id, position),
                    &format!("bmu_{}_cell_{}", id, position),
                    &format!("BMU {} cell {} ", id, position),
                    &device,
                )?);
            }
        }

        Ok(r)
    }

    fn entities<T: HasSensors>(
        &self,
        state_topic: &str,
        group: &str,
        label: &str,
        device: &Device,
    ) -> Result<Vec<mqtt::Message>> {
        T::sensors()
            .iter()
            .map(|sensor| self.entity(sensor, state_topic, group, label, device))
            .collect()
    }

    fn entity(
        &self,
        sensor: &Sensor,
        state_topic: &str,
        group: &str,
        label: &str,
        device: &Device,
    ) -> Result<mqtt::Message> {
        let namespace = self.config.mqtt().namespace();
        let bms = self.topics.key();
        let object_id = format!("{}_{}_{}", bms, group, sensor.key);
        let class = Class::of(sensor.kind);

        let value_template = match sensor.kind {
            Kind::Flag => format!("{{{{ 'Y' if value_json.{} else 'N' }}}}", sensor.key),
            _ => format!("{{{{ value_json.{} }}}}", sensor.key),
        };

        let entity = Entity {
            name: format!("{}{}", label, sensor.name),
            unique_id: format!("pylontech_{}", object_id),
            object_id: object_id.clone(),
            state_topic: format!("{}/{}", namespace, state_topic),
            value_template,
            availability: vec![
                Availability {
                    topic: format!("{}/LWT", namespace),
                },
                Availability {
                    topic: format!("{}/{}", namespace, self.topics.availability()),
                },
            ],
            availability_mode: "all",
            device: device.clone(),
            unit_of_measurement: class.unit,
            device_class: class.device_class,
            state_class: class.state_class,
            suggested_display_precision: class.precision,
            icon: class.icon,
            entity_category: class.category,
        };

        Ok(mqtt::Message {
            topic: format!(
                "{}/sensor/{}/{}/config",
                self.config.mqtt().homeassistant().prefix(),
                bms,
                object_id
            ),
            retain: true,
            payload: serde_json::to_string(&entity)?,
        })
    }
}
