#![allow(dead_code)]

use pylontech_bridge::prelude::*;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const MODULES: [&str; 3] = ["HPTBH02240A01001", "HPTBH02240A01002", "HPTBH02240A01003"];

fn lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.to_string()).collect()
}

pub struct Factory();
impl Factory {
    pub fn config_yaml() -> String {
        r#"
bms:
  host: 127.0.0.1
  port: 1234
mqtt:
  enabled: false
  host: localhost
"#
        .to_string()
    }

    pub fn config() -> ConfigWrapper {
        Self::config_with("")
    }

    /// Base config with extra top-level yaml appended.
    pub fn config_with(extra: &str) -> ConfigWrapper {
        let yaml = format!("{}{}\n", Self::config_yaml(), extra);
        ConfigWrapper::from_config(Config::from_yaml(&yaml).unwrap())
    }

    pub fn mqtt_config() -> ConfigWrapper {
        let yaml = r#"
bms:
  host: 127.0.0.1
mqtt:
  host: localhost
  namespace: pylontech
"#;
        ConfigWrapper::from_config(Config::from_yaml(yaml).unwrap())
    }

    /// `info` output listing `modules` as BMU barcodes, in console order.
    pub fn info(modules: &[&str]) -> Vec<String> {
        let mut r = lines(
            "info
@
Device address      : 1
Manufacturer        : PYLON
Device name         : SC0500A-100S
Board version       : SC0500AV201
Hard  version       : V1.0
Main Soft version   : B69.6
Soft  version       : V2.4
Boot  version       : V2.0
Comm version        : V2.0
Release Date        : 21-05-18
Barcode             :
PCBA Barcode        : HPTBH02240A00001
Module Barcode      : HPTBH02240A00001
PowerSupply Barcode :
Device Test Time    : 2022-02-14 10:24:11
Specification       : 3.2V/37AH
Cell Number         : 15
Max Dischg Curr     : -100000mA
Max Charge Curr     : 100000mA
Shut Circuit        : Disable
Relay Feedback      : Disable
New Board           : Enable",
        );
        for (n, module) in modules.iter().enumerate() {
            r.push(format!("Module     : {}", module));
            r.push(format!("PCBA       : HP2205111{}", n + 1));
        }
        r.push("Command completed successfully".to_string());
        r.push("$$".to_string());
        r
    }

    pub fn pwr() -> Vec<String> {
        lines(
            "pwr
@
Average temperature : 23466
DC Voltage          : 0
Bat Voltage         : 158614
Volt      Curr      Tempr     Tlow      Thigh     Vlow      Vhigh     Ut_low    Ut_high   Uv_low    Uv_high   Base.St   Volt.St   Curr.St   Temp.St   Coulomb   Ah        Total Ah  Wh%       Wh        Total Wh  Time                  B.V.St    B.T.St    U.V.St    U.T.St    Err Code
158614    -2150     23500     21000     24000     3296      3312      22000     24000     52868     52890     Dischg    Normal    Normal    Normal    88%       32560     37000     88%       5168      5870      2024-05-11 10:23:45   Normal    Normal    Normal    Normal    0
Command completed successfully
$$",
        )
    }

    /// Unit `i` (1 is the bottom unit) has a voltage of 52860 + i mV.
    pub fn unit(count: usize) -> Vec<String> {
        let mut r = lines(
            "unit
@
Unit      Volt      Curr      Tempr     Tlow      Thigh     Vlow      Vhigh     Base.St   Volt.St   Temp.St   Coulomb   Ah        Total Ah  Wh%       Wh        Time",
        );
        for i in 1..=count {
            r.push(format!(
                "{}         {}     -2150     2{}000     21000     23000     3296      3310      Dischg    Normal    Normal    8{}%       32560     37000     88%       1722      2024-05-11 10:23:45",
                i,
                52860 + i,
                i,
                i
            ));
        }
        r.push("Command completed successfully".to_string());
        r.push("$$".to_string());
        r
    }

    /// Cell at row offset `j` of unit group `g` has a voltage of
    /// 3300 + 20 * g + j mV.
    pub fn bat(units: usize, cells: usize) -> Vec<String> {
        let mut r = lines(
            "bat
@
Battery Information
Average Temperature : 23466
Charge Current      : 0mA
Dischg Current      : 2150mA
State               : Dischg
Bat Voltage         : 1586
Battery  Volt     Curr     Tempr    V.State  T.State  Coulomb  Ah       Wh%      Wh       Bal",
        );
        for g in 0..units {
            for j in 0..cells {
                r.push(format!(
                    "{}        {}     -2150    23000    Normal   Normal   88%      32560    88%      108500   {}",
                    j,
                    3300 + 20 * g + j,
                    if j == 0 { "Y" } else { "N" }
                ));
            }
        }
        r.push("Command completed successfully".to_string());
        r.push("$$".to_string());
        r
    }

    /// The bytes the console sends for `lines`, with its mixed line endings
    /// and the trailing prompt.
    pub fn wire(lines: &[String]) -> Vec<u8> {
        let mut r = Vec::new();
        for (n, line) in lines.iter().enumerate() {
            r.extend_from_slice(line.as_bytes());
            r.extend_from_slice(if n % 2 == 0 { b"\r\n" } else { b"\n\r" });
        }
        r.extend_from_slice(b"pylon>");
        r
    }

    pub fn healthy_script(script: &Script) {
        script.reply(Command::Info, Reply::Lines(Self::info(&MODULES)));
        script.reply(Command::Pwr, Reply::Lines(Self::pwr()));
        script.reply(Command::Unit, Reply::Lines(Self::unit(3)));
        script.reply(Command::Bat, Reply::Lines(Self::bat(3, 15)));
    }
}

// ScriptedConsole {{{
#[derive(Clone, Debug)]
pub enum Reply {
    Lines(Vec<String>),
    Timeout,
    Closed,
}

#[derive(Default)]
struct ScriptState {
    replies: HashMap<Command, Reply>,
    refuse_connect: bool,
    sent: Vec<Command>,
    connects: usize,
    disconnects: usize,
}

/// Handle to change what a `ScriptedConsole` answers after it has been
/// handed to a coordinator.
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn reply(&self, command: Command, reply: Reply) {
        self.0.lock().unwrap().replies.insert(command, reply);
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.0.lock().unwrap().refuse_connect = refuse;
    }

    pub fn sent(&self) -> Vec<Command> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.0.lock().unwrap().sent.clear();
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.0.lock().unwrap().disconnects
    }
}

pub struct ScriptedConsole {
    script: Script,
    pending: Option<Command>,
    connected: bool,
}

impl ScriptedConsole {
    pub fn new() -> (Self, Script) {
        let script = Script::default();
        (
            Self {
                script: script.clone(),
                pending: None,
                connected: false,
            },
            script,
        )
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.script.0.lock().unwrap();
        if state.refuse_connect {
            return Err(TransportError::ConnectTimeout {
                addr: "127.0.0.1:1234".to_string(),
                timeout: Duration::from_secs(5),
            });
        }
        state.connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, command: Command) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.script.0.lock().unwrap().sent.push(command);
        self.pending = Some(command);
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Vec<String>, TransportError> {
        let command = self.pending.take().ok_or(TransportError::NotConnected)?;
        let reply = self.script.0.lock().unwrap().replies.get(&command).cloned();

        match reply {
            Some(Reply::Lines(lines)) => Ok(lines),
            Some(Reply::Timeout) | None => Err(TransportError::ReadTimeout(Duration::from_secs(2))),
            Some(Reply::Closed) => {
                self.connected = false;
                Err(TransportError::Closed)
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.script.0.lock().unwrap().disconnects += 1;
        }
        self.connected = false;
    }
} // }}}
