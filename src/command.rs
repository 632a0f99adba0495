use serde::{Deserialize, Serialize};

/// Console commands understood by the BMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Info,
    Pwr,
    Unit,
    Bat,
}

impl Command {
    pub const ALL: [Command; 4] = [Command::Info, Command::Pwr, Command::Unit, Command::Bat];

    pub fn as_str(&self) -> &'static str {
        use Command::*;

        match self {
            Info => "info",
            Pwr => "pwr",
            Unit => "unit",
            Bat => "bat",
        }
    }

    // the console wants a bare CR, LF is echoed back as an empty line
    pub fn to_wire(&self) -> Vec<u8> {
        format!("{}\r", self.as_str()).into_bytes()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
