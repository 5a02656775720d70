use crate::queue::{RoadLaneState, VehicleProgress};
use crate::{Ctx, Vehicle, VehicleID};
use anyhow::{bail, ensure, Result};
use log::debug;
use map_model::{DestinationID, Map, RoadLaneID};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use std::collections::BTreeMap;

/// Poisson vehicle arrivals: each tick rolls one spawn with probability
/// `vpm / 60 * dt`, picks a destination from the configured mix, and places
/// the vehicle at the upstream end of an incoming lane that routes there and
/// has room. A spawn that doesn't fit waits for the next tick.
pub struct VehicleSpawner {
    rng: XorShiftRng,
    id_counter: usize,
    /// (destination, probability) pairs; probabilities sum to 1.
    destinations: Vec<(DestinationID, f64)>,
    queued_spawn: Option<Vehicle>,
}

impl VehicleSpawner {
    pub fn new(seed: u64, destinations: Vec<(DestinationID, f64)>) -> Result<VehicleSpawner> {
        ensure!(!destinations.is_empty(), "spawner needs destinations");
        let total: f64 = destinations.iter().map(|(_, p)| p).sum();
        ensure!(
            (total - 1.0).abs() < 1e-6,
            "destination probabilities sum to {}, not 1",
            total
        );
        Ok(VehicleSpawner {
            rng: XorShiftRng::seed_from_u64(seed),
            id_counter: 0,
            destinations,
            queued_spawn: None,
        })
    }

    /// Uniform mix over every destination the map knows.
    pub fn uniform(seed: u64, map: &Map) -> Result<VehicleSpawner> {
        let mut dests: Vec<DestinationID> = Vec::new();
        for il in map.all_intersection_lanes() {
            dests.push(il.outgoing.0);
        }
        dests.sort_unstable();
        dests.dedup();
        let p = 1.0 / dests.len() as f64;
        VehicleSpawner::new(seed, dests.into_iter().map(|d| (d, p)).collect())
    }

    fn pick_destination(&mut self) -> DestinationID {
        let roll: f64 = self.rng.gen();
        let mut acc = 0.0;
        for (dest, p) in &self.destinations {
            acc += p;
            if roll < acc {
                return *dest;
            }
        }
        self.destinations.last().unwrap().0
    }

    /// Decides whether to spawn this tick. Returns the new vehicle's id if
    /// one entered the network.
    pub fn step(
        &mut self,
        ctx: &Ctx,
        map: &Map,
        incoming: &mut BTreeMap<RoadLaneID, RoadLaneState>,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
    ) -> Result<Option<VehicleID>> {
        if incoming.is_empty() {
            bail!("spawner has no downstream road lanes");
        }

        let spawn = match self.queued_spawn.take() {
            Some(vehicle) => vehicle,
            None => {
                let p = ctx.settings.vehicles_per_minute / 60.0
                    * ctx.settings.timestep_length.inner_seconds();
                if self.rng.gen::<f64>() >= p {
                    return Ok(None);
                }
                let id = VehicleID(self.id_counter);
                self.id_counter += 1;
                let destination = self.pick_destination();
                Vehicle::new(id, destination)
            }
        };

        // Try the eligible lanes in random order.
        let mut lane_ids: Vec<RoadLaneID> = incoming.keys().copied().collect();
        lane_ids.shuffle(&mut self.rng);
        let mut can_work = false;
        for lane_id in lane_ids {
            let lane = map.get_r(lane_id);
            if map
                .pathfinder()
                .next_movements(lane.end(), spawn.destination)
                .is_empty()
            {
                continue;
            }
            can_work = true;

            let state = incoming.get_mut(&lane_id).unwrap();
            let f = ctx.settings.length_buffer_factor;
            let needed = spawn.length * (1.0 + 2.0 * f);
            if state.queue.free_space(lane.length()) <= needed {
                continue;
            }
            if state.check_entrance_collision(ctx, lane, vehicles, 0, spawn.length, spawn.velocity)
            {
                continue;
            }

            let spacing = (0.5 + f) * spawn.length.inner_meters() / lane.length().inner_meters();
            if 2.0 * spacing > lane.entrance_end {
                // The whole vehicle has to fit inside the entrance region.
                continue;
            }

            let mut vehicle = spawn;
            vehicle.pos = lane.trajectory.position(spacing);
            vehicle.heading = lane.trajectory.heading(spacing);
            let id = vehicle.id;
            state.queue.push_back(
                id,
                VehicleProgress::new(Some(2.0 * spacing), Some(spacing), Some(0.0)),
            );
            vehicles.insert(id, vehicle);
            debug!("{} spawned onto {}", id, lane_id);
            return Ok(Some(id));
        }

        if !can_work {
            bail!("a spawned vehicle has no eligible lanes for its destination");
        }
        // Every eligible lane is full right now; retry next tick.
        self.queued_spawn = Some(spawn);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_must_sum_to_one() {
        assert!(VehicleSpawner::new(1, vec![(0, 0.5), (1, 0.3)]).is_err());
        assert!(VehicleSpawner::new(1, vec![(0, 0.5), (1, 0.5)]).is_ok());
        // Float noise within tolerance is fine.
        assert!(VehicleSpawner::new(1, vec![(0, 0.1); 10]).is_ok());
    }
}
