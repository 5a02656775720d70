use crate::mechanics::{DrivingState, IntersectionManager};
use crate::spawn::VehicleSpawner;
use crate::{Ctx, Settings, Timestep, Vehicle, VehicleID};
use anyhow::Result;
use log::info;
use map_model::{Map, RoadLaneID};
use std::collections::BTreeMap;

/// The whole live world: the map, every vehicle, the lane queues, the
/// spawner, and the reservation manager. Driven by `step`, one tick at a
/// time, in a fixed total order.
pub struct Sim {
    map: Map,
    settings: Settings,
    now: Timestep,

    vehicles: BTreeMap<VehicleID, Vehicle>,
    driving: DrivingState,
    manager: IntersectionManager,
    spawner: VehicleSpawner,

    vehicles_spawned: usize,
    reservations_granted: usize,
    trips_completed: usize,
}

impl Sim {
    pub fn new(map: Map, settings: Settings) -> Result<Sim> {
        let driving = DrivingState::new(&map);
        let manager = IntersectionManager::new(&map, &settings);
        let spawner = VehicleSpawner::uniform(settings.rng_seed, &map)?;
        Ok(Sim {
            map,
            settings,
            now: 0,
            vehicles: BTreeMap::new(),
            driving,
            manager,
            spawner,
            vehicles_spawned: 0,
            reservations_granted: 0,
            trips_completed: 0,
        })
    }

    pub fn now(&self) -> Timestep {
        self.now
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn manager(&self) -> &IntersectionManager {
        &self.manager
    }

    pub fn vehicles(&self) -> &BTreeMap<VehicleID, Vehicle> {
        &self.vehicles
    }

    pub fn driving(&self) -> &DrivingState {
        &self.driving
    }

    pub fn trips_completed(&self) -> usize {
        self.trips_completed
    }

    pub fn reservations_granted(&self) -> usize {
        self.reservations_granted
    }

    pub fn vehicles_spawned(&self) -> usize {
        self.vehicles_spawned
    }

    /// One tick of the world, in the fixed order: roll the tile window,
    /// update speeds, move everything, spawn, then poll each incoming lane
    /// for reservations and commit what fits.
    pub fn step(&mut self) -> Result<()> {
        self.now += 1;
        let ctx = Ctx::new(&self.settings, self.now);

        self.manager.tick(&ctx);
        self.driving.update_speeds(&ctx, &self.map, &mut self.vehicles);
        let events = self.driving.step(&ctx, &self.map, &mut self.vehicles)?;

        for id in events.entered_intersection {
            if self.vehicles[&id].has_reservation {
                self.manager.start_reservation(&ctx, id)?;
            }
        }
        for id in events.exited_intersection {
            if self.manager.active_reservations().contains_key(&id) {
                self.manager.clear_reservation(id, &mut self.vehicles)?;
            } else if let Some(v) = self.vehicles.get_mut(&id) {
                // Vehicles crossing on bare permission have nothing to clear.
                v.permission_to_enter_intersection = false;
            }
        }
        for id in events.finished {
            self.vehicles.remove(&id);
            self.trips_completed += 1;
        }

        if self
            .spawner
            .step(&ctx, &self.map, &mut self.driving.incoming, &mut self.vehicles)?
            .is_some()
        {
            self.vehicles_spawned += 1;
        }

        let lane_ids: Vec<RoadLaneID> = self.driving.incoming.keys().copied().collect();
        for lane_id in lane_ids {
            let lane = self.map.get_r(lane_id);
            let granted = self.manager.check_request(
                &ctx,
                &self.map,
                lane,
                &self.driving.incoming[&lane_id],
                &self.vehicles,
            )?;
            for res in granted {
                let state = self.driving.incoming.get_mut(&lane_id).unwrap();
                self.manager
                    .confirm_reservation(&ctx, res, state, &mut self.vehicles)?;
                self.reservations_granted += 1;
            }
        }

        if self.now % 60 == 0 {
            info!(
                "t={}: {} vehicles on the network, {} reservations granted, {} trips done",
                self.now,
                self.vehicles.len(),
                abstutil::prettyprint_usize(self.reservations_granted),
                abstutil::prettyprint_usize(self.trips_completed)
            );
        }
        Ok(())
    }

    /// Invariants that must hold after every tick; checked by tests.
    pub fn check_invariants(&self) -> Result<()> {
        use anyhow::ensure;

        for layer in self.manager.tiling().layers() {
            for id in 0..layer.len() {
                let tile = layer.tile(id);
                ensure!(
                    tile.reserved_total() <= 1.0 + 1e-9,
                    "tile {} at t={} oversubscribed",
                    id,
                    layer.t
                );
            }
        }
        if let Some(front) = self.manager.tiling().layers().front() {
            ensure!(
                front.t == self.now + 1,
                "tiling window starts at t={}, but now={}",
                front.t,
                self.now
            );
        }
        for (id, vehicle) in &self.vehicles {
            if vehicle.has_reservation {
                let queued = self.manager.queued_reservations().contains_key(id);
                let active = self.manager.active_reservations().contains_key(id);
                ensure!(
                    queued != active,
                    "{} has a reservation flag but {} queued/active entries",
                    id,
                    if queued { "two" } else { "no" }
                );
            }
        }
        Ok(())
    }
}
