use crate::pylontech::{BatterySummary, BmsReading, CellReading, SystemInfo, UnitReading};
use crate::reconcile::UnitId;
use crate::sensor::{sensor, HasSensors, Kind, Sensor};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// A value together with when, and in which poll cycle, it was read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub at: DateTime<Utc>,
    pub cycle: u64,
    pub value: T,
}

impl<T> Stamped<T> {
    pub fn new(cycle: u64, value: T) -> Self {
        Self {
            at: Utc::now(),
            cycle,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitEntry {
    pub id: UnitId,
    pub barcode: Option<String>,
    #[serde(flatten)]
    pub reading: UnitReading,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellEntry {
    pub unit_id: UnitId,
    #[serde(flatten)]
    pub reading: CellReading,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Battery {
    pub summary: BatterySummary,
    pub cells: Vec<CellEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Health {
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub degraded_identity: bool,
    pub last_error: Option<String>,
}

impl HasSensors for Health {
    fn sensors() -> &'static [Sensor] {
        const SENSORS: &[Sensor] = &[
            sensor("consecutive_failures", "Failed polls", Kind::Count),
            sensor("last_success", "Last successful poll", Kind::Timestamp),
        ];

        SENSORS
    }
}

/// Everything known about the BMS. Replaced whole, never edited in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub info: Option<Stamped<SystemInfo>>,
    pub bms: Option<Stamped<BmsReading>>,
    pub units: Option<Stamped<Vec<UnitEntry>>>,
    pub battery: Option<Stamped<Battery>>,
    pub health: Health,
}

impl Snapshot {
    /// Resolved unit ids, topmost first.
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units
            .as_ref()
            .map(|u| u.value.iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }

    pub fn unit_count(&self) -> Option<usize> {
        self.units.as_ref().map(|u| u.value.len())
    }

    pub fn cells_of(&self, id: UnitId) -> Vec<&CellEntry> {
        self.battery
            .as_ref()
            .map(|b| b.value.cells.iter().filter(|c| c.unit_id == id).collect())
            .unwrap_or_default()
    }

    /// The entities a snapshot exposes: each unit with its cell positions.
    /// Discovery is republished whenever this changes.
    pub fn layout(&self) -> Vec<(UnitId, Option<String>, Vec<u16>)> {
        self.units
            .as_ref()
            .map(|units| {
                units
                    .value
                    .iter()
                    .map(|u| {
                        let cells = self.cells_of(u.id).iter().map(|c| c.reading.position).collect();
                        (u.id, u.barcode.clone(), cells)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Latest snapshot, readable without locking from any task.
#[derive(Clone)]
pub struct SnapshotStore {
    sender: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.sender.borrow().clone()
    }

    pub fn install(&self, snapshot: Snapshot) {
        self.sender.send_replace(Arc::new(snapshot));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_replaces_and_notifies() {
        let store = SnapshotStore::new();
        let mut rx = store.subscribe();
        let before = store.latest();

        let mut next = Snapshot::default();
        next.health.cycles = 1;
        store.install(next);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().health.cycles, 1);
        assert_eq!(before.health.cycles, 0);
    }
}
