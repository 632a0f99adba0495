pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use tokio::sync::{broadcast, watch};

pub use crate::channels::Channels;
pub use crate::command::Command;
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator::{self, snapshot::Snapshot, snapshot::SnapshotStore, Coordinator};
pub use crate::error::{IdentityAmbiguity, ParseError, PollError, TransportError};
pub use crate::options::Options;
pub use crate::pylontech::{self, console::Console};
pub use crate::reconcile::{self, IdentityMap, UnitId};
pub use crate::{home_assistant, mqtt, sensor};
