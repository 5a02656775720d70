use crate::kinematics;
use crate::mechanics::{Reservation, ScheduledExit, Tiling};
use crate::queue::{LaneQueue, RoadLaneState, VehicleProgress};
use crate::{Ctx, Timestep, Vehicle, VehicleID, VehicleSection};
use anyhow::{bail, Result};
use log::debug;
use map_model::{IntersectionLane, Map, RoadLane};
use std::collections::BTreeMap;

/// Replays kinematics for a candidate platoon on a disposable copy of the
/// mini-world around one intersection lane: the incoming road lane, the lane
/// itself, and the outgoing road lane. Only clones are ever mutated; the
/// caller commits whatever survives.
pub struct RequestSim<'a> {
    ctx: Ctx<'a>,
    il: &'a IntersectionLane,
    irl: &'a RoadLane,
    orl: &'a RoadLane,

    mock_il: LaneQueue,
    mock_irl: LaneQueue,
    mock_orl: LaneQueue,
    clones: BTreeMap<VehicleID, Vehicle>,

    test_reservations: BTreeMap<VehicleID, Reservation>,
    valid_reservations: Vec<Reservation>,
    spawn_order: Vec<VehicleID>,

    counter: usize,
    end_at: usize,
    t: Timestep,
    last_exit: Option<ScheduledExit>,
    new_exit: Option<ScheduledExit>,
}

impl<'a> RequestSim<'a> {
    /// Simulate the next candidate platoon from `road_lane` and return every
    /// reservation that fits end-to-end in the live tiling, in arrival
    /// order. Nothing is committed; the live world is untouched apart from
    /// the tiling's window lazily extending.
    pub fn check_request(
        ctx: &Ctx<'a>,
        map: &'a Map,
        tiling: &mut Tiling,
        road_lane: &'a RoadLane,
        state: &RoadLaneState,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
    ) -> Result<Vec<Reservation>> {
        let (start, end) = match state.first_without_permission(road_lane, vehicles) {
            Some(pair) => pair,
            None => {
                return Ok(Vec::new());
            }
        };
        let head = state.queue.vehicles[start];
        let exits = map
            .pathfinder()
            .next_movements(road_lane.end(), vehicles[&head].destination);
        let exit_coord = match exits.first() {
            Some(pt) => *pt,
            None => {
                debug!("{} has no route through the intersection", head);
                return Ok(Vec::new());
            }
        };
        let il = match map.intersection_lane_by_io(road_lane.end(), exit_coord) {
            Some(il) => il,
            None => {
                debug!(
                    "no intersection lane from {} to {}",
                    road_lane.end(),
                    exit_coord
                );
                return Ok(Vec::new());
            }
        };
        let orl = map.get_r(il.outgoing);

        let mut new_exit = match state.soonest_exit(ctx, start, road_lane, vehicles, None) {
            Some(exit) => exit,
            None => {
                return Ok(Vec::new());
            }
        };
        // The rollout can only reserve strictly in the future.
        if new_exit.t <= ctx.now {
            new_exit.t = ctx.now + 1;
        }

        let mut sim = RequestSim {
            ctx: *ctx,
            il,
            irl: road_lane,
            orl,
            mock_il: LaneQueue::new(),
            mock_irl: LaneQueue::new(),
            mock_orl: LaneQueue::new(),
            clones: BTreeMap::new(),
            test_reservations: BTreeMap::new(),
            valid_reservations: Vec::new(),
            spawn_order: Vec::new(),
            counter: start,
            end_at: end,
            t: new_exit.t,
            last_exit: None,
            new_exit: Some(new_exit),
        };

        while !sim.mock_il.is_empty() || sim.counter < sim.end_at {
            if sim.mock_step(tiling, state, vehicles)? {
                break;
            }
        }

        // Anything still in flight didn't make it; drop chain links pointing
        // at it from the validated prefix.
        let aborted: Vec<VehicleID> = sim
            .spawn_order
            .iter()
            .copied()
            .filter(|v| !sim.valid_reservations.iter().any(|r| r.vehicle == *v))
            .collect();
        for res in &mut sim.valid_reservations {
            res.sever_dependencies(&aborted);
        }
        Ok(sim.valid_reservations)
    }

    /// One virtual tick. Returns true when the chain is aborted and the
    /// rollout is over.
    fn mock_step(
        &mut self,
        tiling: &mut Tiling,
        state: &RoadLaneState,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
    ) -> Result<bool> {
        self.mock_update_speeds();
        self.mock_outgoing_step()?;
        if self.mock_intersection_step(tiling)? {
            return Ok(true);
        }
        self.mock_incoming_step();

        // Spawn the next candidate once its scheduled entry time arrives.
        if self.new_exit.is_none() && self.counter < self.end_at {
            self.new_exit = match state.soonest_exit(
                &self.ctx,
                self.counter,
                self.irl,
                vehicles,
                self.last_exit.as_ref(),
            ) {
                Some(mut exit) => {
                    if exit.t < self.t {
                        exit.t = self.t;
                    }
                    Some(exit)
                }
                None => {
                    // The candidate can't be scheduled at all; stop here.
                    self.counter = self.end_at;
                    None
                }
            };
        }
        if let Some(exit) = self.new_exit {
            if exit.t <= self.t {
                if self.spawn_next_clone(tiling, vehicles, exit)? {
                    self.counter += 1;
                } else {
                    // The rest of the platoon can't enter this cycle. Stop
                    // spawning, but let the clones already in flight finish
                    // validating.
                    self.counter = self.end_at;
                }
                self.new_exit = None;
            }
        }

        if !self.all_pos_to_tile(tiling)? {
            return Ok(true);
        }
        self.t += 1;
        Ok(false)
    }

    /// Clones in the conflict area accelerate as hard as their reservation
    /// assumed: the guaranteed minimum, up to the lane's limit. This must
    /// match what the live tick does to confirmed vehicles.
    fn mock_update_speeds(&mut self) {
        let dt = self.ctx.settings.timestep_length;
        let accel = self.ctx.settings.min_acceleration;
        for id in &self.mock_il.vehicles {
            let clone = self.clones.get_mut(id).unwrap();
            clone.acceleration = accel;
            clone.velocity =
                kinematics::speed_update(clone.velocity, accel, dt, self.il.speed_limit);
        }
    }

    /// Advance clones already on the outgoing road lane. A clone outrunning
    /// the whole outgoing lane within its reservation's lifetime breaks the
    /// model.
    fn mock_outgoing_step(&mut self) -> Result<()> {
        let dt = self.ctx.settings.timestep_length;
        let ids: Vec<VehicleID> = self.mock_orl.vehicles.clone();
        for id in ids {
            let clone = &self.clones[&id];
            let dist = kinematics::dist_covered_in_tick(clone.velocity, clone.acceleration, dt);
            let dp = dist / self.orl.length();
            let mut p = self.mock_orl.progress[&id];
            if let Some(front) = p.front {
                let new = front + dp;
                if new >= 1.0 {
                    bail!("{} outran the outgoing road lane during a rollout", id);
                }
                p.front = Some(new);
            }
            if let Some(center) = p.center {
                let new = center + dp;
                if new >= 1.0 {
                    bail!("{} outran the outgoing road lane during a rollout", id);
                }
                p.center = Some(new);
                let clone = self.clones.get_mut(&id).unwrap();
                clone.pos = self.orl.trajectory.position(new);
                clone.heading = self.orl.trajectory.heading(new);
            }
            if let Some(rear) = p.rear {
                p.rear = Some(rear + dp);
            }
            self.mock_orl.progress.insert(id, p);
        }
        Ok(())
    }

    /// Advance clones along the intersection lane. Fronts crossing the far
    /// end transfer onto the outgoing lane; a rear crossing it makes the
    /// clone a candidate for validation via its exit buffer. Returns true if
    /// a contested exit buffer aborted the chain.
    fn mock_intersection_step(&mut self, tiling: &mut Tiling) -> Result<bool> {
        let dt = self.ctx.settings.timestep_length;
        let ids: Vec<VehicleID> = self.mock_il.vehicles.clone();
        for id in ids {
            if !self.clones.contains_key(&id) {
                continue;
            }
            let mut clone = self.clones[&id].clone();
            let dist = kinematics::dist_covered_in_tick(clone.velocity, clone.acceleration, dt);
            let dp = dist / self.il.length();
            let mut p = self.mock_il.progress[&id];

            if let Some(front) = p.front {
                let new = front + dp;
                if new >= 1.0 {
                    p.front = None;
                    let overflow = self.il.length() * (new - 1.0);
                    let orl_front = overflow / self.orl.length();
                    if self.mock_orl.contains(id) {
                        let mut op = self.mock_orl.progress[&id];
                        op.front = Some(orl_front);
                        self.mock_orl.progress.insert(id, op);
                    } else {
                        self.mock_orl
                            .push_back(id, VehicleProgress::new(Some(orl_front), None, None));
                    }
                } else {
                    p.front = Some(new);
                }
            }
            if let Some(center) = p.center {
                let new = center + dp;
                if new >= 1.0 {
                    p.center = None;
                    let overflow = self.il.length() * (new - 1.0);
                    let orl_center = overflow / self.orl.length();
                    if let Some(op) = self.mock_orl.progress.get_mut(&id) {
                        op.center = Some(orl_center);
                    }
                    clone.pos = self.orl.trajectory.position(orl_center);
                    clone.heading = self.orl.trajectory.heading(orl_center);
                } else {
                    p.center = Some(new);
                    clone.pos = self.il.trajectory.position(new);
                    clone.heading = self.il.trajectory.heading(new);
                }
            }
            let mut fully_exited = false;
            if let Some(rear) = p.rear {
                let new = rear + dp;
                if new >= 1.0 {
                    fully_exited = true;
                } else {
                    p.rear = Some(new);
                }
            }

            if fully_exited {
                // The clone cleared the conflict area; hold its exit tiles
                // long enough for any follower to stop, or give up on the
                // whole remaining chain.
                match tiling.io_tile_buffer(&self.ctx, self.il, self.t, &clone, false, None)? {
                    Some(buffer) => {
                        let mut res = self.test_reservations.remove(&id).unwrap();
                        res.absorb_tiles(buffer);
                        self.valid_reservations.push(res);
                        self.mock_il.remove(id);
                        self.mock_orl.remove(id);
                        self.clones.remove(&id);
                    }
                    None => {
                        debug!("{}'s exit buffer is contested; aborting chain", id);
                        self.abort_in_flight(tiling);
                        return Ok(true);
                    }
                }
            } else {
                self.mock_il.progress.insert(id, p);
                self.clones.insert(id, clone);
            }
        }
        Ok(false)
    }

    /// Advance clones still straddling the incoming road lane. A rear
    /// clearing it fixes the candidate's REAR scheduled exit, which becomes
    /// the ordering constraint for the next candidate in the queue.
    fn mock_incoming_step(&mut self) {
        let dt = self.ctx.settings.timestep_length;
        let ids: Vec<VehicleID> = self.mock_irl.vehicles.clone();
        for id in ids {
            let mut clone = self.clones[&id].clone();
            let dist = kinematics::dist_covered_in_tick(clone.velocity, clone.acceleration, dt);
            let dp = dist / self.irl.length();
            let mut p = self.mock_irl.progress[&id];

            if let Some(center) = p.center {
                let new = center + dp;
                if new >= 1.0 {
                    p.center = None;
                    let overflow = self.irl.length() * (new - 1.0);
                    let il_center = overflow / self.il.length();
                    if let Some(ip) = self.mock_il.progress.get_mut(&id) {
                        ip.center = Some(il_center);
                    }
                    clone.pos = self.il.trajectory.position(il_center);
                    clone.heading = self.il.trajectory.heading(il_center);
                } else {
                    p.center = Some(new);
                    clone.pos = self.irl.trajectory.position(new);
                    clone.heading = self.irl.trajectory.heading(new);
                }
            }
            let mut cleared = false;
            if let Some(rear) = p.rear {
                let new = rear + dp;
                if new >= 1.0 {
                    cleared = true;
                    let overflow = self.irl.length() * (new - 1.0);
                    let il_rear = overflow / self.il.length();
                    if let Some(ip) = self.mock_il.progress.get_mut(&id) {
                        ip.rear = Some(il_rear);
                    }
                } else {
                    p.rear = Some(new);
                }
            }

            if cleared {
                self.mock_irl.remove(id);
                let exit = ScheduledExit {
                    vehicle: id,
                    section: VehicleSection::Rear,
                    t: self.t,
                    velocity: clone.velocity,
                };
                if let Some(res) = self.test_reservations.get_mut(&id) {
                    res.its_exit = exit;
                }
                self.last_exit = Some(exit);
            } else {
                self.mock_irl.progress.insert(id, p);
            }
            self.clones.insert(id, clone);
        }
    }

    /// Spawn the next candidate's clone at the tail of the incoming lane,
    /// its front just breaking the intersection line. Returns false if its
    /// entry buffer or first footprint is contested.
    fn spawn_next_clone(
        &mut self,
        tiling: &mut Tiling,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
        exit: ScheduledExit,
    ) -> Result<bool> {
        let original = &vehicles[&exit.vehicle];
        let mut clone = original.clone_for_request();
        let f = self.ctx.settings.length_buffer_factor;
        let len = clone.length.inner_meters();
        let irl_len = self.irl.length().inner_meters();
        let p_center = 1.0 - (0.5 + f) * len / irl_len;
        let p_rear = 1.0 - (1.0 + 2.0 * f) * len / irl_len;
        clone.pos = self.irl.trajectory.position(p_center);
        clone.heading = self.irl.trajectory.heading(p_center);
        clone.velocity = exit.velocity;
        clone.acceleration = self.ctx.settings.min_acceleration;

        let mut res = Reservation::new(clone.id, self.il.entry(), self.il.id, exit);
        if let Some(prev) = self.spawn_order.last() {
            res.dependency = Some(*prev);
            res.dependencies = self.spawn_order.clone();
        }

        let buffer = tiling.io_tile_buffer(&self.ctx, self.il, self.t, &clone, true, None)?;
        let footprint = tiling.pos_to_tiles(&self.ctx, self.t, &clone)?;
        match (buffer, footprint) {
            (Some(buffer), Some(footprint)) => {
                res.absorb_tiles(buffer);
                res.tiles.insert(self.t, footprint);
                self.mock_irl.push_back(
                    clone.id,
                    VehicleProgress::new(None, Some(p_center), Some(p_rear)),
                );
                self.mock_il
                    .push_back(clone.id, VehicleProgress::new(Some(0.0), None, None));
                self.mock_il.lateral_deviation.insert(clone.id, 0.0);
                self.spawn_order.push(clone.id);
                self.test_reservations.insert(clone.id, res);
                self.clones.insert(clone.id, clone);
                Ok(true)
            }
            (buffer, footprint) => {
                debug!("{}'s spawn tiles are contested", exit.vehicle);
                if let Some(buffer) = buffer {
                    tiling.remove_marks(clone.id, &buffer);
                }
                if let Some(footprint) = footprint {
                    let mut as_set = crate::mechanics::TileSet::new();
                    as_set.insert(self.t, footprint);
                    tiling.remove_marks(clone.id, &as_set);
                }
                Ok(false)
            }
        }
    }

    /// Record every remaining clone's footprint for this tick. A contested
    /// tile here kills the whole in-flight chain; already-validated
    /// reservations stand, minus their links into the dead chain.
    fn all_pos_to_tile(&mut self, tiling: &mut Tiling) -> Result<bool> {
        let ids: Vec<VehicleID> = self.mock_il.vehicles.clone();
        for id in ids {
            let clone = &self.clones[&id];
            match tiling.pos_to_tiles(&self.ctx, self.t, clone)? {
                Some(covered) => {
                    self.test_reservations
                        .get_mut(&id)
                        .unwrap()
                        .tiles
                        .insert(self.t, covered);
                }
                None => {
                    debug!("{}'s footprint is contested; aborting chain", id);
                    self.abort_in_flight(tiling);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Drop every in-flight reservation, clean its marks out of the tiling,
    /// and sever links to it from the validated prefix.
    fn abort_in_flight(&mut self, tiling: &mut Tiling) {
        let aborted: Vec<VehicleID> = self.test_reservations.keys().copied().collect();
        for (id, res) in &self.test_reservations {
            tiling.remove_marks(*id, &res.tiles);
        }
        for res in &mut self.valid_reservations {
            res.sever_dependencies(&aborted);
        }
        self.test_reservations.clear();
    }
}
