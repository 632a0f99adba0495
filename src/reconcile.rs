//! Mapping between what the console reports and where things physically are.
//!
//! The console numbers units from the bottom of the rack and cells from the
//! bottom of each unit. Entities are keyed top-down instead, and units keep
//! their identity across polls by their module barcode so that swapping two
//! modules moves their history with them.

use crate::error::IdentityAmbiguity;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Top-down position of a unit the console reports as `reported` out of `count`.
pub fn physical_position(count: usize, reported: usize) -> Option<usize> {
    if (1..=count).contains(&reported) {
        Some(count + 1 - reported)
    } else {
        None
    }
}

/// Top-down position of a cell at zero-based row offset `reported` in a unit
/// of `count` cells.
pub fn cell_position(count: usize, reported: usize) -> Option<usize> {
    if reported < count {
        Some(count - reported)
    } else {
        None
    }
}

/// Stable identity of a battery module, used as its entity key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u16);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything remembered between polls to keep unit identity stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMap {
    #[serde(default)]
    pub by_fingerprint: BTreeMap<String, UnitId>,
    #[serde(default)]
    pub by_position: BTreeMap<u16, UnitId>,
}

impl IdentityMap {
    pub fn load(file: &Path) -> Result<Self> {
        if !file.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("error reading {}", file.display()))?;
        serde_json::from_str(&content).with_context(|| format!("error parsing {}", file.display()))
    }

    pub fn save(&self, file: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = file.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("error writing {}", tmp.display()))?;
        std::fs::rename(&tmp, file)
            .with_context(|| format!("error renaming {} to {}", tmp.display(), file.display()))?;
        Ok(())
    }

    fn owner(&self, id: UnitId) -> Option<&str> {
        self.by_fingerprint
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }
}

/// A unit observed this cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub position: u16,
    pub fingerprint: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved id per input placement, in input order.
    pub ids: Vec<UnitId>,
    pub ambiguities: Vec<IdentityAmbiguity>,
    /// At least one unit had to be mapped by position alone.
    pub degraded: bool,
}

/// Assigns a `UnitId` to every placement and returns the updated map.
pub fn reconcile(placements: &[Placement], mut map: IdentityMap) -> (IdentityMap, Resolution) {
    let mut resolution = Resolution {
        ids: Vec::with_capacity(placements.len()),
        ..Default::default()
    };

    // barcodes reported by more than one unit cannot identify any of them
    let mut seen: BTreeMap<&str, Vec<u16>> = BTreeMap::new();
    for p in placements {
        if let Some(fp) = p.fingerprint.as_deref() {
            seen.entry(fp).or_default().push(p.position);
        }
    }
    let ambiguous: BTreeSet<&str> = seen
        .iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|(fp, _)| *fp)
        .collect();
    for fp in &ambiguous {
        resolution.ambiguities.push(IdentityAmbiguity {
            fingerprint: fp.to_string(),
            positions: seen[fp].clone(),
        });
    }

    let fingerprint = |p: &Placement| -> Option<String> {
        p.fingerprint
            .as_deref()
            .filter(|fp| !ambiguous.contains(fp))
            .map(str::to_string)
    };

    let mut assigned: Vec<Option<UnitId>> = vec![None; placements.len()];
    let mut claimed: BTreeSet<UnitId> = BTreeSet::new();

    // known barcodes keep their id wherever they are now
    for (n, p) in placements.iter().enumerate() {
        if let Some(id) = fingerprint(p).and_then(|fp| map.by_fingerprint.get(&fp).copied()) {
            if claimed.insert(id) {
                assigned[n] = Some(id);
            }
        }
    }

    let mut order: Vec<usize> = (0..placements.len()).collect();
    order.sort_by_key(|n| placements[*n].position);

    for n in order {
        if assigned[n].is_some() {
            continue;
        }
        let p = &placements[n];

        let id = match fingerprint(p) {
            Some(fp) => {
                let free = |id: &UnitId, map: &IdentityMap| {
                    !claimed.contains(id) && map.owner(*id).map_or(true, |o| o == fp)
                };
                let preferred = UnitId(p.position);
                let id = if free(&preferred, &map) {
                    preferred
                } else {
                    (1..=u16::MAX)
                        .map(UnitId)
                        .find(|id| free(id, &map))
                        .unwrap_or(preferred)
                };
                map.by_fingerprint.insert(fp, id);
                id
            }
            None => {
                resolution.degraded = true;
                let preferred = map
                    .by_position
                    .get(&p.position)
                    .copied()
                    .unwrap_or(UnitId(p.position));
                if !claimed.contains(&preferred) {
                    preferred
                } else {
                    (1..=u16::MAX)
                        .map(UnitId)
                        .find(|id| !claimed.contains(id))
                        .unwrap_or(preferred)
                }
            }
        };

        claimed.insert(id);
        assigned[n] = Some(id);
    }

    // every slot is filled by the two passes above
    resolution.ids = assigned
        .into_iter()
        .zip(placements)
        .map(|(id, p)| id.unwrap_or(UnitId(p.position)))
        .collect();

    map.by_position = placements
        .iter()
        .zip(&resolution.ids)
        .map(|(p, id)| (p.position, *id))
        .collect();

    (map, resolution)
}
