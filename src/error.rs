use crate::command::Command;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the serial bridge. Aborts the rest of the poll cycle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("failed to send {command}: {source}")]
    Write {
        command: Command,
        #[source]
        source: std::io::Error,
    },

    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    #[error("connection closed by peer")]
    Closed,

    #[error("response exceeds {0} bytes")]
    Overflow(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Console output did not have the shape a command is expected to produce.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{command}: expected echo of the command, got {got:?}")]
    UnexpectedEcho { command: Command, got: Option<String> },

    #[error("{command}: missing '@' marker after echo")]
    MissingMarker { command: Command },

    #[error("{command}: missing field `{field}`")]
    MissingField {
        command: Command,
        field: &'static str,
    },

    #[error("{command}: invalid value {value:?} for `{field}`")]
    InvalidValue {
        command: Command,
        field: &'static str,
        value: String,
    },

    #[error("{command}: row {row} has {got} columns, expected at least {expected}")]
    ShortRow {
        command: Command,
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("{command}: response contains no records")]
    NoRecords { command: Command },

    #[error("unit: index {index} outside 1..={count}")]
    UnitIndexOutOfRange { index: i64, count: usize },

    #[error("unit: index {0} reported twice")]
    DuplicateUnitIndex(i64),

    #[error("bat: {cells} cells cannot be split into {units} units")]
    CellCountMismatch { cells: usize, units: usize },
}

/// Why a single command in a poll cycle failed.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("bat: no unit layout known yet")]
    NoUnitLayout,
}

impl PollError {
    /// Transport failures leave the connection unusable for the rest of the cycle.
    pub fn is_transport(&self) -> bool {
        matches!(self, PollError::Transport(_))
    }
}

/// Two or more units reported the same module barcode. Their identities fall
/// back to positional mapping for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityAmbiguity {
    pub fingerprint: String,
    pub positions: Vec<u16>,
}

impl std::fmt::Display for IdentityAmbiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "barcode {} reported by units at positions {:?}, using positional identity",
            self.fingerprint, self.positions
        )
    }
}
