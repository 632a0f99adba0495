use crate::prelude::*;

pub mod snapshot;

use crate::pylontech::{BatteryReading, BmsReading, Response, SystemInfo, UnitReading};
use crate::reconcile::Placement;
use snapshot::{Battery, CellEntry, Stamped, UnitEntry};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Poll,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Connecting,
    Sending(Command),
    Reading(Command),
    Parsing(Command),
}

#[derive(Default)]
pub struct PollStats {
    cycles: u64,
    cycles_failed: u64,
    // per command
    commands_ok: BTreeMap<Command, u64>,
    commands_failed: BTreeMap<Command, u64>,
    // failure causes
    connect_errors: u64,
    transport_errors: u64,
    parse_errors: u64,
    identity_ambiguities: u64,
    // Other stats
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
    last_error: Option<String>,
}

impl PollStats {
    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Cycles: {}", self.cycles);
        info!("  Failed cycles: {}", self.cycles_failed);
        info!("  Commands:");
        for command in Command::ALL {
            info!(
                "    {}: {} ok, {} failed",
                command,
                self.commands_ok.get(&command).unwrap_or(&0),
                self.commands_failed.get(&command).unwrap_or(&0)
            );
        }
        info!("  Errors:");
        info!("    Connect: {}", self.connect_errors);
        info!("    Transport: {}", self.transport_errors);
        info!("    Parse: {}", self.parse_errors);
        info!("    Identity ambiguities: {}", self.identity_ambiguities);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
        if let Some(last_error) = &self.last_error {
            info!("  Last error: {}", last_error);
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn failed(&self, command: Command) -> u64 {
        *self.commands_failed.get(&command).unwrap_or(&0)
    }
}

/// What happened during one poll cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub connect_error: Option<TransportError>,
    pub succeeded: Vec<Command>,
    pub failed: Vec<(Command, PollError)>,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        self.connect_error.is_none() && !self.succeeded.is_empty()
    }

    pub fn error(&self, command: Command) -> Option<&PollError> {
        self.failed
            .iter()
            .find(|(c, _)| *c == command)
            .map(|(_, e)| e)
    }

    fn last_error(&self) -> Option<String> {
        if let Some(e) = &self.connect_error {
            return Some(e.to_string());
        }
        self.failed
            .last()
            .map(|(command, e)| format!("{}: {}", command, e))
    }
}

struct Session<C> {
    console: C,
    identities: IdentityMap,
    cycle: u64,
    state: PollState,
}

impl<C> Session<C> {
    fn transition(&mut self, state: PollState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

pub struct Coordinator<C: Console> {
    config: ConfigWrapper,
    channels: Channels,
    store: SnapshotStore,
    session: Arc<tokio::sync::Mutex<Session<C>>>,
    // taken by start(), subscribed up front so early ticks are queued
    receiver: Mutex<Option<broadcast::Receiver<ChannelData>>>,
    pub stats: Arc<Mutex<PollStats>>,
}

impl<C: Console + 'static> Coordinator<C> {
    pub fn new(config: ConfigWrapper, channels: Channels, store: SnapshotStore, console: C) -> Self {
        let identities = match config.identity_file() {
            Some(file) => IdentityMap::load(&PathBuf::from(file)).unwrap_or_else(|e| {
                warn!("ignoring identity file: {:#}", e);
                IdentityMap::default()
            }),
            None => IdentityMap::default(),
        };

        let receiver = Mutex::new(Some(channels.to_coordinator.subscribe()));

        Self {
            config,
            channels,
            store,
            receiver,
            session: Arc::new(tokio::sync::Mutex::new(Session {
                console,
                identities,
                cycle: 0,
                state: PollState::Idle,
            })),
            stats: Arc::new(Mutex::new(PollStats::default())),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn identities(&self) -> IdentityMap {
        self.session.lock().await.identities.clone()
    }

    pub async fn start(&self) -> Result<()> {
        let mut receiver = self
            .receiver
            .lock()
            .ok()
            .and_then(|mut r| r.take())
            .unwrap_or_else(|| self.channels.to_coordinator.subscribe());

        info!("polling BMS at {}", self.config.bms().addr());

        loop {
            match receiver.recv().await {
                Ok(ChannelData::Poll) => {
                    let shutdown = tokio::select! {
                        outcome = self.poll_once() => {
                            self.log_outcome(&outcome);
                            false
                        }
                        _ = Self::wait_for_shutdown(&mut receiver) => true,
                    };
                    if shutdown {
                        info!("shutdown requested during poll cycle");
                        break;
                    }
                }
                Ok(ChannelData::Shutdown) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(n)) => debug!("skipped {} poll ticks", n),
            }
        }

        self.session.lock().await.console.disconnect().await;

        info!("Received shutdown signal, printing final statistics:");
        if let Ok(stats) = self.stats.lock() {
            stats.print_summary();
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_coordinator.send(ChannelData::Shutdown);
    }

    // ticks that arrive while a cycle runs are dropped
    async fn wait_for_shutdown(receiver: &mut broadcast::Receiver<ChannelData>) {
        loop {
            match receiver.recv().await {
                Ok(ChannelData::Poll) | Err(RecvError::Lagged(_)) => continue,
                Ok(ChannelData::Shutdown) | Err(RecvError::Closed) => return,
            }
        }
    }

    fn log_outcome(&self, outcome: &CycleOutcome) {
        if outcome.is_success() {
            info!(
                "poll cycle {} done: {} ok, {} failed",
                outcome.cycle,
                outcome.succeeded.len(),
                outcome.failed.len()
            );
        } else {
            warn!(
                "poll cycle {} failed: {}",
                outcome.cycle,
                outcome.last_error().unwrap_or_default()
            );
        }
    }

    /// Runs every configured command once, installing a new snapshot after
    /// each one that succeeds.
    pub async fn poll_once(&self) -> CycleOutcome {
        let mut session = self.session.lock().await;
        session.cycle += 1;

        let mut outcome = CycleOutcome {
            cycle: session.cycle,
            ..Default::default()
        };

        session.transition(PollState::Connecting);
        match session.console.connect().await {
            Err(e) => {
                warn!("failed to connect to BMS: {}", e);
                outcome.connect_error = Some(e);
            }
            Ok(()) => {
                // fingerprints are only trusted from this cycle's `info`
                let mut info = None;

                for command in self.config.bms().commands().iter().copied() {
                    match self.run_command(&mut session, command, &mut info).await {
                        Ok(()) => outcome.succeeded.push(command),
                        Err(e) => {
                            warn!("{} failed: {}", command, e);
                            let transport = e.is_transport();
                            outcome.failed.push((command, e));
                            if transport {
                                break;
                            }
                        }
                    }
                }

                session.console.disconnect().await;
            }
        }
        session.transition(PollState::Idle);

        self.finish_cycle(&outcome);

        outcome
    }

    async fn run_command(
        &self,
        session: &mut Session<C>,
        command: Command,
        info: &mut Option<SystemInfo>,
    ) -> Result<(), PollError> {
        let cycle = session.cycle;

        if command == Command::Bat && self.store.latest().unit_count().is_none() {
            return Err(PollError::NoUnitLayout);
        }

        session.transition(PollState::Sending(command));
        session.console.send(command).await?;
        session.transition(PollState::Reading(command));
        let raw = session.console.read_response().await?;
        session.transition(PollState::Parsing(command));

        for line in &raw {
            debug!("{}: {}", command, line);
        }

        let response = Response::new(command, raw)?;
        let mut snapshot = (*self.store.latest()).clone();

        match command {
            Command::Info => {
                let parsed = SystemInfo::parse(&response)?;
                *info = Some(parsed.clone());
                snapshot.info = Some(Stamped::new(cycle, parsed));
            }
            Command::Pwr => {
                snapshot.bms = Some(Stamped::new(cycle, BmsReading::parse(&response)?));
            }
            Command::Unit => {
                let units = UnitReading::parse_all(&response)?;
                let (entries, degraded) = self.resolve_units(session, units, info.as_ref());
                snapshot.units = Some(Stamped::new(cycle, entries));
                snapshot.health.degraded_identity = degraded;
            }
            Command::Bat => {
                let units = snapshot.units.as_ref().ok_or(PollError::NoUnitLayout)?;
                let reading = BatteryReading::parse(
                    &response,
                    Some(units.value.len()),
                    self.config.bms().cells_per_unit(),
                )?;
                let cells = reading
                    .cells
                    .into_iter()
                    .map(|cell| CellEntry {
                        unit_id: units
                            .value
                            .iter()
                            .find(|u| u.reading.position == cell.unit_position)
                            .map(|u| u.id)
                            .unwrap_or(UnitId(cell.unit_position)),
                        reading: cell,
                    })
                    .collect();
                snapshot.battery = Some(Stamped::new(
                    cycle,
                    Battery {
                        summary: reading.summary,
                        cells,
                    },
                ));
            }
        }

        self.store.install(snapshot);

        Ok(())
    }

    fn resolve_units(
        &self,
        session: &mut Session<C>,
        units: Vec<UnitReading>,
        info: Option<&SystemInfo>,
    ) -> (Vec<UnitEntry>, bool) {
        let info = match info {
            Some(info) if info.modules.len() == units.len() => Some(info),
            Some(info) => {
                warn!(
                    "info lists {} modules but unit reports {}, using positional identity",
                    info.modules.len(),
                    units.len()
                );
                None
            }
            None => None,
        };

        let placements: Vec<Placement> = units
            .iter()
            .map(|u| Placement {
                position: u.position,
                fingerprint: info.and_then(|i| i.module_at(u.position)).map(str::to_string),
            })
            .collect();

        let previous = std::mem::take(&mut session.identities);
        let (map, resolution) = reconcile::reconcile(&placements, previous.clone());

        for ambiguity in &resolution.ambiguities {
            warn!("{}", ambiguity);
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.identity_ambiguities += resolution.ambiguities.len() as u64;
        }

        if map != previous {
            if let Some(file) = self.config.identity_file() {
                if let Err(e) = map.save(&PathBuf::from(file)) {
                    warn!("failed to save identities: {:#}", e);
                }
            }
        }
        session.identities = map;

        let entries = units
            .into_iter()
            .zip(placements)
            .zip(resolution.ids)
            .map(|((reading, placement), id)| UnitEntry {
                id,
                barcode: placement.fingerprint,
                reading,
            })
            .collect();

        (entries, resolution.degraded)
    }

    fn finish_cycle(&self, outcome: &CycleOutcome) {
        let mut snapshot = (*self.store.latest()).clone();
        let health = &mut snapshot.health;

        health.cycles = outcome.cycle;
        if outcome.is_success() {
            health.consecutive_failures = 0;
            health.last_success = Some(chrono::Utc::now());
        } else {
            health.consecutive_failures += 1;
        }
        if let Some(e) = outcome.last_error() {
            health.last_error = Some(e);
        }

        self.store.install(snapshot);

        if let Ok(mut stats) = self.stats.lock() {
            stats.cycles += 1;
            if !outcome.is_success() {
                stats.cycles_failed += 1;
            }
            if outcome.connect_error.is_some() {
                stats.connect_errors += 1;
            }
            for command in &outcome.succeeded {
                *stats.commands_ok.entry(*command).or_insert(0) += 1;
            }
            for (command, e) in &outcome.failed {
                *stats.commands_failed.entry(*command).or_insert(0) += 1;
                match e {
                    PollError::Transport(_) => stats.transport_errors += 1,
                    PollError::Parse(_) | PollError::NoUnitLayout => stats.parse_errors += 1,
                }
            }
            if let Some(e) = outcome.last_error() {
                stats.last_error = Some(e);
            }
        }
    }
}
