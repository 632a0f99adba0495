use crate::prelude::*;

use crate::coordinator::snapshot::Health;
use crate::coordinator::PollStats;
use crate::home_assistant::Topics;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;

type Layout = (String, Vec<(UnitId, Option<String>, Vec<u16>)>, bool, bool);

// what has already gone out, so only changes are published
#[derive(Clone, Default)]
pub struct Published {
    layout: Option<Layout>,
    // discovery config topics currently retained on the broker
    discovered: BTreeSet<String>,
    info: Option<DateTime<Utc>>,
    bms: Option<DateTime<Utc>>,
    units: Option<DateTime<Utc>>,
    battery: Option<DateTime<Utc>>,
    health: Option<Health>,
    available: Option<bool>,
}

/// Turns snapshots into MQTT state, availability and discovery messages.
pub struct Publisher {
    config: ConfigWrapper,
    channels: Channels,
    store: SnapshotStore,
    shared_stats: Arc<Mutex<PollStats>>,
}

impl Publisher {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        store: SnapshotStore,
        shared_stats: Arc<Mutex<PollStats>>,
    ) -> Self {
        Self {
            config,
            channels,
            store,
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut snapshots = self.store.subscribe();
        let mut from_mqtt = self.channels.from_mqtt.subscribe();
        let mut shutdown = self.channels.to_coordinator.subscribe();
        let mut published = Published::default();

        // anything installed before we subscribed
        let latest = snapshots.borrow_and_update().clone();
        self.on_snapshot(&latest, &mut published);

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    self.on_snapshot(&snapshot, &mut published);
                }
                message = from_mqtt.recv() => match message {
                    Ok(mqtt::ChannelData::Message(message))
                        if message.is_homeassistant_online(self.config.mqtt().homeassistant().prefix()) =>
                    {
                        info!("Home Assistant came online, republishing discovery");
                        // retained state is kept by the broker, only discovery is resent
                        published.layout = None;
                        self.on_snapshot(&self.store.latest(), &mut published);
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
                message = shutdown.recv() => {
                    if matches!(message, Ok(coordinator::ChannelData::Shutdown) | Err(RecvError::Closed)) {
                        break;
                    }
                }
            }
        }

        debug!("publisher stopped");
        Ok(())
    }

    // failures are logged and retried with the next snapshot
    fn on_snapshot(&self, snapshot: &Arc<Snapshot>, published: &mut Published) {
        if !self.config.mqtt().enabled() {
            if published.health.as_ref().map(|h| h.cycles) != Some(snapshot.health.cycles) {
                self.log_summary(snapshot);
                published.health = Some(snapshot.health.clone());
            }
            return;
        }

        // only commit what actually reached the mqtt task
        let mut next = published.clone();
        let messages = match self.messages(snapshot, &mut next) {
            Ok(messages) => messages,
            Err(e) => {
                error!("failed to build mqtt messages: {:#}", e);
                self.count_error();
                return;
            }
        };
        if messages.is_empty() {
            return;
        }

        if self.send(messages) {
            *published = next;
        }
    }

    fn send(&self, messages: Vec<mqtt::ChannelData>) -> bool {
        let count = messages.len();
        for message in messages {
            if self.channels.to_mqtt.send(message).is_err() {
                warn!("mqtt is not running, holding back {} messages", count);
                self.count_error();
                return false;
            }
        }
        true
    }

    fn count_error(&self) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            stats.mqtt_errors += 1;
        }
    }

    /// Everything that changed since the previous call.
    pub fn messages(&self, snapshot: &Snapshot, published: &mut Published) -> Result<Vec<mqtt::ChannelData>> {
        use mqtt::ChannelData::{Discovery, Message};

        let mut r = Vec::new();

        // entities are keyed by the BMS barcode, nothing can be named before `info`
        let info = match &snapshot.info {
            Some(info) => &info.value,
            None => {
                debug!("no BMS info yet, not publishing");
                return Ok(r);
            }
        };
        let topics = Topics::for_info(info);

        let layout = (
            topics.key().to_string(),
            snapshot.layout(),
            snapshot.bms.is_some(),
            snapshot.battery.is_some(),
        );
        if published.layout.as_ref() != Some(&layout) {
            if self.config.homeassistant_enabled() {
                let ha = home_assistant::Config::new(&self.config, info);
                let discovery = ha.all(snapshot)?;
                let topics: BTreeSet<String> = discovery.iter().map(|m| m.topic.clone()).collect();

                // an empty retained config removes the entity from Home Assistant
                let dropped: Vec<String> = published.discovered.difference(&topics).cloned().collect();
                if !dropped.is_empty() {
                    info!("removing {} discovery entities", dropped.len());
                }
                r.extend(dropped.into_iter().map(|topic| {
                    Discovery(mqtt::Message {
                        topic,
                        retain: true,
                        payload: String::new(),
                    })
                }));

                info!("publishing {} discovery entities", discovery.len());
                r.extend(discovery.into_iter().map(Discovery));
                published.discovered = topics;
            }
            published.layout = Some(layout);
        }

        let available = snapshot.health.consecutive_failures < self.config.bms().unavailable_after();
        if published.available != Some(available) {
            if !available {
                warn!(
                    "{} consecutive failed polls, marking entities unavailable",
                    snapshot.health.consecutive_failures
                );
            }
            r.push(Message(mqtt::Message {
                topic: topics.availability(),
                retain: true,
                payload: if available { "online" } else { "offline" }.to_string(),
            }));
            published.available = Some(available);
        }

        if let Some(info) = fresh(&snapshot.info, &mut published.info) {
            r.push(Message(mqtt::Message::json(topics.info(), info, true)?));
        }

        if let Some(bms) = fresh(&snapshot.bms, &mut published.bms) {
            r.push(Message(mqtt::Message::json(topics.bms(), bms, false)?));
        }

        if let Some(units) = fresh(&snapshot.units, &mut published.units) {
            for unit in units {
                r.push(Message(mqtt::Message::json(topics.unit(unit.id), unit, false)?));
            }
        }

        if let Some(battery) = fresh(&snapshot.battery, &mut published.battery) {
            r.push(Message(mqtt::Message::json(topics.bat(), &battery.summary, false)?));
            for cell in &battery.cells {
                r.push(Message(mqtt::Message::json(
                    topics.cell(cell.unit_id, cell.reading.position),
                    cell,
                    false,
                )?));
            }
        }

        if published.health.as_ref() != Some(&snapshot.health) {
            r.push(Message(mqtt::Message::json(topics.health(), &snapshot.health, true)?));
            published.health = Some(snapshot.health.clone());
        }

        Ok(r)
    }

    fn log_summary(&self, snapshot: &Snapshot) {
        let health = &snapshot.health;
        let bms = snapshot
            .bms
            .as_ref()
            .map(|b| {
                format!(
                    "{:.2} V {:.2} A {}% {}",
                    b.value.voltage, b.value.current, b.value.charge_ah_percent, b.value.base_state
                )
            })
            .unwrap_or_else(|| "no pwr".to_string());
        let cells = snapshot.battery.as_ref().map(|b| b.value.cells.len()).unwrap_or(0);

        info!(
            "cycle {}: {}, {} units, {} cells, {} failed polls",
            health.cycles,
            bms,
            snapshot.unit_count().unwrap_or(0),
            cells,
            health.consecutive_failures
        );
    }
}

// the value when it was read after the last publish
fn fresh<'a, T>(
    value: &'a Option<coordinator::snapshot::Stamped<T>>,
    last: &mut Option<DateTime<Utc>>,
) -> Option<&'a T> {
    let stamped = value.as_ref()?;
    if *last == Some(stamped.at) {
        return None;
    }
    *last = Some(stamped.at);
    Some(&stamped.value)
}
