use crate::kinematics;
use crate::queue::{LaneQueue, RoadLaneState, VehicleProgress};
use crate::{Ctx, Vehicle, VehicleID, VehicleSection};
use anyhow::Result;
use log::warn;
use map_model::{IntersectionLaneID, Map, RoadLaneID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What moved across a boundary during one live tick. The sim applies these
/// to the manager: entries start reservations, exits clear them.
#[derive(Debug, Default)]
pub struct StepEvents {
    /// Vehicles whose front just crossed into the conflict area.
    pub entered_intersection: Vec<VehicleID>,
    /// Vehicles whose rear just left it.
    pub exited_intersection: Vec<VehicleID>,
    /// Vehicles that drove off the end of an outgoing road lane.
    pub finished: Vec<VehicleID>,
}

/// The dynamic state of every lane in the live world. The request simulator
/// never touches this; it clones what it needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DrivingState {
    pub incoming: BTreeMap<RoadLaneID, RoadLaneState>,
    pub outgoing: BTreeMap<RoadLaneID, RoadLaneState>,
    pub intersection: BTreeMap<IntersectionLaneID, LaneQueue>,
}

impl DrivingState {
    pub fn new(map: &Map) -> DrivingState {
        let mut state = DrivingState::default();
        for lane in map.incoming_road_lanes() {
            state.incoming.insert(lane.id, RoadLaneState::new());
        }
        for il in map.all_intersection_lanes() {
            state.intersection.insert(il.id, LaneQueue::new());
            state
                .outgoing
                .entry(il.outgoing)
                .or_insert_with(RoadLaneState::new);
        }
        state
    }

    /// Total vehicles with any section on any lane.
    pub fn num_vehicles_on_lanes(&self) -> usize {
        let mut ids: Vec<VehicleID> = Vec::new();
        for state in self.incoming.values().chain(self.outgoing.values()) {
            ids.extend(&state.queue.vehicles);
        }
        for queue in self.intersection.values() {
            ids.extend(&queue.vehicles);
        }
        ids.sort();
        ids.dedup();
        ids.len()
    }

    /// Phase one of the tick: pick accelerations and speeds everywhere.
    /// Vehicles inside the conflict area accelerate exactly as their
    /// reservation assumed.
    pub fn update_speeds(
        &mut self,
        ctx: &Ctx,
        map: &Map,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
    ) {
        for (id, state) in &self.incoming {
            state.update_speeds(ctx, map.get_r(*id), vehicles, true);
        }
        for (id, state) in &self.outgoing {
            state.update_speeds(ctx, map.get_r(*id), vehicles, false);
        }
        let dt = ctx.settings.timestep_length;
        for (id, queue) in &self.intersection {
            let il = map.get_i(*id);
            for vehicle_id in &queue.vehicles {
                // Once the front breaks the line, the manager owns the
                // kinematics: exactly the profile the reservation assumed.
                let vehicle = vehicles.get_mut(vehicle_id).unwrap();
                vehicle.acceleration = ctx.settings.min_acceleration;
                vehicle.velocity = kinematics::speed_update(
                    vehicle.velocity,
                    vehicle.acceleration,
                    dt,
                    il.speed_limit,
                );
            }
        }
    }

    /// Phase two: move everything, draining downstream lanes first, and
    /// report the boundary crossings.
    pub fn step(
        &mut self,
        ctx: &Ctx,
        map: &Map,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
    ) -> Result<StepEvents> {
        let mut events = StepEvents::default();

        // Outgoing road lanes: the head drives off the network.
        for (id, state) in self.outgoing.iter_mut() {
            let lane = map.get_r(*id);
            for transfer in state.step_vehicles(ctx, lane, vehicles, false) {
                if transfer.section == VehicleSection::Front {
                    state.queue.remove(transfer.vehicle);
                    events.finished.push(transfer.vehicle);
                }
            }
        }
        for id in &events.finished {
            for queue in self.intersection.values_mut() {
                queue.remove(*id);
            }
        }

        // Intersection lanes: fronts and centers spill onto the outgoing
        // lane; a rear crossing ends the reservation.
        let il_ids: Vec<IntersectionLaneID> = self.intersection.keys().copied().collect();
        for il_id in il_ids {
            let il = map.get_i(il_id);
            let dt = ctx.settings.timestep_length;
            let queue = self.intersection.get_mut(&il_id).unwrap();
            let ids: Vec<VehicleID> = queue.vehicles.clone();
            for id in ids {
                let vehicle = match vehicles.get_mut(&id) {
                    Some(v) => v,
                    None => continue,
                };
                let dist =
                    kinematics::dist_covered_in_tick(vehicle.velocity, vehicle.acceleration, dt);
                let dp = dist / il.length();
                let mut p = queue.progress[&id];
                let orl = self.outgoing.get_mut(&il.outgoing).unwrap();

                if let Some(front) = p.front {
                    let new = front + dp;
                    if new >= 1.0 {
                        p.front = None;
                        let over = (il.length() * (new - 1.0)) / map.get_r(il.outgoing).length();
                        if orl.queue.contains(id) {
                            orl.queue.progress.get_mut(&id).unwrap().front = Some(over);
                        } else {
                            orl.queue
                                .push_back(id, VehicleProgress::new(Some(over), None, None));
                        }
                    } else {
                        p.front = Some(new);
                    }
                }
                if let Some(center) = p.center {
                    let new = center + dp;
                    if new >= 1.0 {
                        p.center = None;
                        let over = (il.length() * (new - 1.0)) / map.get_r(il.outgoing).length();
                        if let Some(op) = orl.queue.progress.get_mut(&id) {
                            op.center = Some(over);
                        }
                        vehicle.pos = map.get_r(il.outgoing).trajectory.position(over);
                        vehicle.heading = map.get_r(il.outgoing).trajectory.heading(over);
                    } else {
                        p.center = Some(new);
                        vehicle.pos = il.trajectory.position(new);
                        vehicle.heading = il.trajectory.heading(new);
                    }
                }
                let mut exited = false;
                if let Some(rear) = p.rear {
                    let new = rear + dp;
                    if new >= 1.0 {
                        exited = true;
                        let over = (il.length() * (new - 1.0)) / map.get_r(il.outgoing).length();
                        if let Some(op) = orl.queue.progress.get_mut(&id) {
                            op.rear = Some(over);
                        }
                    } else {
                        p.rear = Some(new);
                    }
                }

                if exited {
                    queue.remove(id);
                    events.exited_intersection.push(id);
                } else {
                    queue.progress.insert(id, p);
                }
            }
        }

        // Incoming road lanes last: their fronts feed the conflict area.
        let in_ids: Vec<RoadLaneID> = self.incoming.keys().copied().collect();
        for lane_id in in_ids {
            let lane = map.get_r(lane_id);
            let state = self.incoming.get_mut(&lane_id).unwrap();
            let transfers = state.step_vehicles(ctx, lane, vehicles, true);
            for transfer in transfers {
                let id = transfer.vehicle;
                let vehicle = &vehicles[&id];
                let il = match map
                    .pathfinder()
                    .next_movements(lane.end(), vehicle.destination)
                    .first()
                    .and_then(|exit| map.intersection_lane_by_io(lane.end(), *exit))
                {
                    Some(il) => il,
                    None => {
                        warn!("{} crossed the line with nowhere to go", id);
                        continue;
                    }
                };
                let over = transfer.overflow / il.length();
                let queue = self.intersection.get_mut(&il.id).unwrap();
                match transfer.section {
                    VehicleSection::Front => {
                        queue.push_back(id, VehicleProgress::new(Some(over), None, None));
                        queue.lateral_deviation.insert(id, 0.0);
                        events.entered_intersection.push(id);
                    }
                    VehicleSection::Center => {
                        if let Some(p) = queue.progress.get_mut(&id) {
                            p.center = Some(over);
                        }
                    }
                    VehicleSection::Rear => {
                        if let Some(p) = queue.progress.get_mut(&id) {
                            p.rear = Some(over);
                        }
                    }
                }
            }
        }

        Ok(events)
    }
}
