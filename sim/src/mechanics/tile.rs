use crate::{Timestep, VehicleID};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Dense id of a tile within its layer: `tile_x + tile_y * x_tile_count`.
pub type TileIndex = usize;

/// One (x, y, t) cell of the conflict area. Records the probability that
/// vehicles intend to occupy this position at this time; the goal is keeping
/// two vehicles from ever summing past the rejection threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub hash_id: u64,
    reserved_by: BTreeMap<VehicleID, f64>,
    potentials: BTreeMap<VehicleID, f64>,
    rejection_threshold: f64,
}

impl Tile {
    pub fn new(id: TileIndex, t: Timestep, rejection_threshold: f64) -> Tile {
        assert!(
            (0.0..=1.0).contains(&rejection_threshold),
            "rejection threshold must be within [0, 1]"
        );
        let mut hasher = DefaultHasher::new();
        (id, t).hash(&mut hasher);
        Tile {
            hash_id: hasher.finish(),
            reserved_by: BTreeMap::new(),
            potentials: BTreeMap::new(),
            rejection_threshold,
        }
    }

    /// Can this tile accept a reservation by `vehicle` using it with
    /// probability `p`? Free tiles and tiles the vehicle already holds always
    /// accept; otherwise the summed probability must stay within the
    /// threshold.
    pub fn will_reservation_work(&self, vehicle: VehicleID, p: f64) -> bool {
        if self.reserved_by.is_empty() || self.reserved_by.contains_key(&vehicle) {
            return true;
        }
        self.reserved_total() + p <= self.rejection_threshold
    }

    /// Log a potential reservation onto this tile, pre-confirmation.
    pub fn mark(&mut self, vehicle: VehicleID, p: f64) {
        self.potentials.insert(vehicle, p);
    }

    pub fn remove_mark(&mut self, vehicle: VehicleID) {
        self.potentials.remove(&vehicle);
    }

    pub fn clear_all_marks(&mut self) {
        self.potentials.clear();
    }

    /// Promote a reservation from potential to confirmed. `force` skips the
    /// compatibility check and is only for updating the probability of an
    /// already-confirmed stochastic reservation.
    pub fn confirm_reservation(&mut self, vehicle: VehicleID, p: f64, force: bool) -> Result<()> {
        if !force && !self.will_reservation_work(vehicle, p) {
            bail!("{} is incompatible with this tile", vehicle);
        }
        self.reserved_by.insert(vehicle, p);
        self.potentials.remove(&vehicle);
        Ok(())
    }

    pub fn clear_vehicle(&mut self, vehicle: VehicleID) {
        self.reserved_by.remove(&vehicle);
        self.potentials.remove(&vehicle);
    }

    pub fn reserved_total(&self) -> f64 {
        self.reserved_by.values().sum()
    }

    pub fn is_reserved(&self) -> bool {
        !self.reserved_by.is_empty()
    }

    pub fn reserved_by(&self, vehicle: VehicleID) -> bool {
        self.reserved_by.contains_key(&vehicle)
    }
}

/// All tiles active at one timestep. Dropped from the tiling's window once
/// that timestep passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileLayer {
    pub t: Timestep,
    tiles: Vec<Tile>,
}

impl TileLayer {
    pub fn new(t: Timestep, tile_count: usize, rejection_threshold: f64) -> TileLayer {
        TileLayer {
            t,
            tiles: (0..tile_count)
                .map(|id| Tile::new(id, t, rejection_threshold))
                .collect(),
        }
    }

    pub fn tile(&self, id: TileIndex) -> &Tile {
        &self.tiles[id]
    }

    pub fn tile_mut(&mut self, id: TileIndex) -> &mut Tile {
        &mut self.tiles[id]
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_time() {
        let a = Tile::new(13_827, 1, 0.0);
        let b = Tile::new(13_827, 2, 0.0);
        assert_ne!(a.hash_id, b.hash_id);
        assert_eq!(a.hash_id, Tile::new(13_827, 1, 0.0).hash_id);
    }

    /// Pins the direction of the admission predicate: a strict tile with one
    /// holder rejects everyone else, and the vehicle already holding the tile
    /// is always admitted.
    #[test]
    fn admission_direction() {
        let mut tile = Tile::new(0, 1, 0.0);
        assert!(tile.will_reservation_work(VehicleID(0), 1.0));
        tile.confirm_reservation(VehicleID(0), 1.0, false).unwrap();
        assert!(tile.will_reservation_work(VehicleID(0), 1.0));
        assert!(!tile.will_reservation_work(VehicleID(1), 1.0));
        assert!(!tile.will_reservation_work(VehicleID(1), 0.001));
    }

    #[test]
    fn stochastic_admission() {
        let mut tile = Tile::new(0, 1, 0.5);
        tile.confirm_reservation(VehicleID(0), 0.2, false).unwrap();
        // 0.2 + 0.3 <= 0.5 fits; anything more is over the threshold.
        assert!(tile.will_reservation_work(VehicleID(1), 0.3));
        assert!(!tile.will_reservation_work(VehicleID(1), 0.31));
    }

    #[test]
    fn forced_confirm_bypasses_check() {
        let mut tile = Tile::new(0, 1, 0.0);
        tile.confirm_reservation(VehicleID(0), 1.0, false).unwrap();
        assert!(tile.confirm_reservation(VehicleID(1), 1.0, false).is_err());
        tile.confirm_reservation(VehicleID(0), 0.7, true).unwrap();
        assert_eq!(tile.reserved_total(), 0.7);
    }
}
