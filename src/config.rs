use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub bms: Bms,
    pub mqtt: Mqtt,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Where to persist the unit identity map between restarts
    pub identity_file: Option<String>,
}

// Bms {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Bms {
    pub host: String,
    #[serde(default = "Config::default_bms_port")]
    pub port: u16,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: Duration,

    pub connect_timeout: Option<u64>,
    pub read_timeout: Option<u64>,
    pub use_tcp_keepalive: Option<bool>,
    pub cells_per_unit: Option<usize>,
    pub unavailable_after: Option<u32>,

    #[serde(default = "Config::default_commands")]
    pub commands: Vec<Command>,
}
impl Bms {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.unwrap_or(5))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout.unwrap_or(2))
    }

    pub fn use_tcp_keepalive(&self) -> bool {
        self.use_tcp_keepalive.unwrap_or(true)
    }

    pub fn cells_per_unit(&self) -> usize {
        self.cells_per_unit.unwrap_or(15)
    }

    pub fn unavailable_after(&self) -> u32 {
        self.unavailable_after.unwrap_or(3)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
} // }}}

// HomeAssistant {{{
#[derive(Clone, Debug, Deserialize)]
pub struct HomeAssistant {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_homeassistant_prefix")]
    pub prefix: String,
}

impl HomeAssistant {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    #[serde(default = "Config::default_mqtt_homeassistant")]
    pub homeassistant: HomeAssistant,
}
impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn homeassistant(&self) -> &HomeAssistant {
        &self.homeassistant
    }
} // }}}

#[derive(Clone, Debug)]
pub struct ConfigWrapper {
    config: Arc<Config>,
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        Ok(Self::from_config(Config::new(file)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn bms(&self) -> &Bms {
        &self.config.bms
    }

    pub fn mqtt(&self) -> &Mqtt {
        &self.config.mqtt
    }

    pub fn homeassistant_enabled(&self) -> bool {
        self.config.mqtt.enabled() && self.config.mqtt.homeassistant().enabled()
    }

    pub fn loglevel(&self) -> &str {
        &self.config.loglevel
    }

    pub fn identity_file(&self) -> Option<&str> {
        self.config.identity_file.as_deref()
    }

    pub fn log_summary(&self) {
        self.config.log_summary()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    // called once logging is up, the logger level comes from this very file
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  BMS:");
        info!("    Host: {}", self.bms.host);
        info!("    Port: {}", self.bms.port);
        info!("    Poll Interval: {}s", self.bms.poll_interval.as_secs());
        info!("    Connect Timeout: {}s", self.bms.connect_timeout().as_secs());
        info!("    Read Timeout: {}s", self.bms.read_timeout().as_secs());
        info!("    TCP Keepalive: {}", self.bms.use_tcp_keepalive());
        info!("    Cells Per Unit: {}", self.bms.cells_per_unit());
        info!("    Unavailable After: {} failed polls", self.bms.unavailable_after());
        info!(
            "    Commands: {}",
            self.bms
                .commands
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        info!("  MQTT: {}", if self.mqtt.enabled { "enabled" } else { "disabled" });
        if self.mqtt.enabled {
            info!("    Host: {}", self.mqtt.host);
            info!("    Port: {}", self.mqtt.port);
            info!("    Namespace: {}", self.mqtt.namespace);
            info!(
                "    Home Assistant: {}",
                if self.mqtt.homeassistant.enabled { "enabled" } else { "disabled" }
            );
        }

        info!(
            "  Identity File: {}",
            self.identity_file.as_deref().unwrap_or("(none)")
        );
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.bms.host.is_empty() {
            bail!("bms.host cannot be empty");
        }
        if self.bms.port == 0 {
            bail!("bms.port must be between 1 and 65535");
        }
        if self.bms.poll_interval.is_zero() {
            bail!("bms.poll_interval must be at least 1 second");
        }
        if self.bms.read_timeout == Some(0) || self.bms.connect_timeout == Some(0) {
            bail!("bms timeouts must be at least 1 second");
        }
        if self.bms.cells_per_unit == Some(0) {
            bail!("bms.cells_per_unit must be at least 1");
        }

        let commands = &self.bms.commands;
        if !commands.contains(&Command::Info) {
            bail!("bms.commands must include info, it identifies the BMS");
        }
        if commands.contains(&Command::Bat) && !commands.contains(&Command::Unit) {
            bail!("bms.commands: bat requires unit");
        }

        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                return Err(anyhow!("config.rs:MQTT host cannot be empty"));
            }
            if self.mqtt.namespace.is_empty() {
                return Err(anyhow!("config.rs:MQTT namespace cannot be empty"));
            }
        }

        Ok(())
    }

    fn default_bms_port() -> u16 {
        1234
    }

    fn default_poll_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_commands() -> Vec<Command> {
        Command::ALL.to_vec()
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "pylontech".to_string()
    }

    fn default_mqtt_homeassistant() -> HomeAssistant {
        HomeAssistant {
            enabled: Self::default_enabled(),
            prefix: Self::default_mqtt_homeassistant_prefix(),
        }
    }

    fn default_mqtt_homeassistant_prefix() -> String {
        "homeassistant".to_string()
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
