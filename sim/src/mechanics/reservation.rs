use crate::mechanics::TileIndex;
use crate::{Timestep, VehicleID, VehicleSection};
use geom::{Pt2D, Speed};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every tile-time cell a reservation claims, with per-tile probability of
/// use. Tiles are referenced by (timestep, dense index) only — the layers
/// owning them age out on their own.
pub type TileSet = BTreeMap<Timestep, BTreeMap<TileIndex, f64>>;

/// An ordering token on a road lane: this section of this vehicle crosses
/// the intersection line at tick `t`, moving at `velocity`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledExit {
    pub vehicle: VehicleID,
    pub section: VehicleSection,
    pub t: Timestep,
    pub velocity: Speed,
}

/// A vehicle's claim on a set of tiles across contiguous timesteps.
/// Created uncommitted during `check_request`, filled by the simulator, and
/// immutable once confirmed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub vehicle: VehicleID,
    pub entry_coord: Pt2D,
    pub tiles: TileSet,
    pub lane: map_model::IntersectionLaneID,
    /// FRONT exit while the request is being simulated; promoted to the REAR
    /// exit before confirmation.
    pub its_exit: ScheduledExit,
    /// Earlier reservations in this chain that must succeed for this one to
    /// make sense.
    pub dependencies: Vec<VehicleID>,
    /// The immediate predecessor in the chain, if any.
    pub dependency: Option<VehicleID>,
}

impl Reservation {
    pub fn new(
        vehicle: VehicleID,
        entry_coord: Pt2D,
        lane: map_model::IntersectionLaneID,
        its_exit: ScheduledExit,
    ) -> Reservation {
        Reservation {
            vehicle,
            entry_coord,
            tiles: TileSet::new(),
            lane,
            its_exit,
            dependencies: Vec::new(),
            dependency: None,
        }
    }

    /// The first tick this reservation occupies any tile.
    pub fn entry_timestep(&self) -> Option<Timestep> {
        self.tiles.keys().next().copied()
    }

    pub fn last_timestep(&self) -> Option<Timestep> {
        self.tiles.keys().next_back().copied()
    }

    /// Merge a window of buffer tiles into this reservation's claim.
    pub fn absorb_tiles(&mut self, tiles: TileSet) {
        for (t, cells) in tiles {
            self.tiles.entry(t).or_default().extend(cells);
        }
    }

    /// Drop any chain links pointing at vehicles that didn't make it.
    pub fn sever_dependencies(&mut self, aborted: &[VehicleID]) {
        if let Some(dep) = self.dependency {
            if aborted.contains(&dep) {
                self.dependency = None;
            }
        }
        self.dependencies.retain(|v| !aborted.contains(v));
    }
}
