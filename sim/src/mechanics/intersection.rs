use crate::mechanics::{RequestSim, Reservation, ScheduledExit, Tiling};
use crate::queue::RoadLaneState;
use crate::{Ctx, Settings, Vehicle, VehicleID, VehicleSection};
use anyhow::{bail, ensure, Result};
use log::debug;
use map_model::{IntersectionLaneID, Map, RoadLane};
use std::collections::BTreeMap;

/// The public façade of the reservation system. Owns the tiling and every
/// reservation's lifecycle: pending requests become confirmed (tiles
/// committed), confirmed become active (the vehicle's front crossed the
/// entry), and active ones are cleared once the rear leaves the conflict
/// area.
pub struct IntersectionManager {
    tiling: Tiling,
    queued_reservations: BTreeMap<VehicleID, Reservation>,
    active_reservations: BTreeMap<VehicleID, Reservation>,
}

impl IntersectionManager {
    pub fn new(map: &Map, settings: &Settings) -> IntersectionManager {
        IntersectionManager {
            tiling: Tiling::for_map(map, settings),
            queued_reservations: BTreeMap::new(),
            active_reservations: BTreeMap::new(),
        }
    }

    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    pub fn tiling_mut(&mut self) -> &mut Tiling {
        &mut self.tiling
    }

    pub fn queued_reservations(&self) -> &BTreeMap<VehicleID, Reservation> {
        &self.queued_reservations
    }

    pub fn active_reservations(&self) -> &BTreeMap<VehicleID, Reservation> {
        &self.active_reservations
    }

    /// Rolls the tiling window forward. Call once per tick, after `now` has
    /// advanced.
    pub fn tick(&mut self, ctx: &Ctx) {
        self.tiling.handle_new_timestep(ctx);
    }

    /// Speculatively roll out the next candidate platoon from this road
    /// lane. Returns reservations that fit; nothing is committed yet.
    pub fn check_request(
        &mut self,
        ctx: &Ctx,
        map: &Map,
        road_lane: &RoadLane,
        state: &RoadLaneState,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
    ) -> Result<Vec<Reservation>> {
        RequestSim::check_request(ctx, map, &mut self.tiling, road_lane, state, vehicles)
    }

    /// Atomically commit a reservation returned by `check_request`: its
    /// tiles go into the live tiling, the vehicle may proceed, and the road
    /// lane's exit chain advances.
    pub fn confirm_reservation(
        &mut self,
        ctx: &Ctx,
        res: Reservation,
        state: &mut RoadLaneState,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
    ) -> Result<()> {
        ensure!(
            res.its_exit.section == VehicleSection::Rear,
            "{}'s reservation was never promoted to a rear exit",
            res.vehicle
        );
        if let Some(entry_t) = res.entry_timestep() {
            ensure!(
                entry_t > ctx.now,
                "{}'s reservation starts at t={}, which already passed",
                res.vehicle,
                entry_t
            );
        }
        ensure!(
            self.tiling.tiles_will_work(res.vehicle, &res.tiles),
            "a tile of {}'s reservation is contested at confirm time",
            res.vehicle
        );
        self.tiling.confirm_tiles(res.vehicle, &res.tiles, false)?;

        let vehicle = match vehicles.get_mut(&res.vehicle) {
            Some(v) => v,
            None => bail!("confirming a reservation for unknown {}", res.vehicle),
        };
        vehicle.has_reservation = true;
        vehicle.permission_to_enter_intersection = true;
        state.latest_scheduled_exit = Some(res.its_exit);
        debug!(
            "{} confirmed through {} over t=[{:?}, {:?}]",
            res.vehicle,
            res.lane,
            res.entry_timestep(),
            res.last_timestep()
        );
        self.queued_reservations.insert(res.vehicle, res);
        Ok(())
    }

    /// The vehicle's front just crossed the entry coord: the manager owns
    /// its kinematics from here. Errors before the scheduled entry timestep
    /// or for a vehicle with no confirmed reservation.
    pub fn start_reservation(&mut self, ctx: &Ctx, vehicle: VehicleID) -> Result<IntersectionLaneID> {
        let res = match self.queued_reservations.get(&vehicle) {
            Some(res) => res,
            None => bail!("{} has no confirmed reservation to start", vehicle),
        };
        if let Some(entry_t) = res.entry_timestep() {
            ensure!(
                ctx.now >= entry_t,
                "{} is starting its reservation at t={}, before its scheduled t={}",
                vehicle,
                ctx.now,
                entry_t
            );
        }
        let res = self.queued_reservations.remove(&vehicle).unwrap();
        let lane = res.lane;
        self.active_reservations.insert(vehicle, res);
        Ok(lane)
    }

    /// The vehicle's rear just crossed the exit coord: release everything it
    /// still holds.
    pub fn clear_reservation(
        &mut self,
        vehicle: VehicleID,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
    ) -> Result<()> {
        let res = match self.active_reservations.remove(&vehicle) {
            Some(res) => res,
            None => bail!("{} has no active reservation to clear", vehicle),
        };
        self.tiling.clear_vehicle_tiles(vehicle, &res.tiles);
        if let Some(v) = vehicles.get_mut(&vehicle) {
            v.has_reservation = false;
            v.permission_to_enter_intersection = false;
        }
        debug!("{} cleared the intersection", vehicle);
        Ok(())
    }

    pub fn debug_vehicle(&self, vehicle: VehicleID) {
        if let Some(res) = self
            .queued_reservations
            .get(&vehicle)
            .or_else(|| self.active_reservations.get(&vehicle))
        {
            println!("{}", abstutil::to_json(res));
        } else {
            println!("{} has no reservation", vehicle);
        }
    }

    /// Convenience for a pre-arranged uncontested crossing, used during
    /// warmup or for a vehicle that was already inside: grant permission and
    /// advance the exit chain without claiming tiles.
    pub fn issue_permission(
        &mut self,
        vehicle: VehicleID,
        state: &mut RoadLaneState,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
        exit: ScheduledExit,
    ) -> Result<()> {
        let v = match vehicles.get_mut(&vehicle) {
            Some(v) => v,
            None => bail!("issuing permission to unknown {}", vehicle),
        };
        v.permission_to_enter_intersection = true;
        state.latest_scheduled_exit = Some(exit);
        Ok(())
    }
}
