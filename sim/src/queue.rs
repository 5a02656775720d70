use crate::kinematics;
use crate::mechanics::ScheduledExit;
use crate::vehicle::{Vehicle, VehicleID, VehicleSection};
use crate::{Ctx, Timestep, MAX_BRAKING};
use geom::{Distance, Speed};
use map_model::RoadLane;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Proportional progress of each of a vehicle's three sections along one
/// lane. A section not on this lane is None; vehicles straddle lane
/// boundaries while crossing them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleProgress {
    pub front: Option<f64>,
    pub center: Option<f64>,
    pub rear: Option<f64>,
}

impl VehicleProgress {
    pub fn new(front: Option<f64>, center: Option<f64>, rear: Option<f64>) -> VehicleProgress {
        VehicleProgress { front, center, rear }
    }

    pub fn fully_in(&self) -> bool {
        self.front.is_some() && self.center.is_some() && self.rear.is_some()
    }
}

/// A section of a vehicle crossing from one lane to the next, with how far
/// past the boundary it traveled within the tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleTransfer {
    pub vehicle: VehicleID,
    pub section: VehicleSection,
    pub overflow: Distance,
}

/// The dynamic state of one lane: which vehicles are on it, in order of
/// decreasing progress, and where their sections are.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneQueue {
    pub vehicles: Vec<VehicleID>,
    pub progress: BTreeMap<VehicleID, VehicleProgress>,
    /// Stochastic-deviation hook; always zero for now.
    pub lateral_deviation: BTreeMap<VehicleID, f64>,
}

impl LaneQueue {
    pub fn new() -> LaneQueue {
        LaneQueue::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn contains(&self, vehicle: VehicleID) -> bool {
        self.progress.contains_key(&vehicle)
    }

    /// Adds a vehicle at the upstream end of the lane.
    pub fn push_back(&mut self, vehicle: VehicleID, progress: VehicleProgress) {
        self.vehicles.push(vehicle);
        self.progress.insert(vehicle, progress);
    }

    pub fn remove(&mut self, vehicle: VehicleID) {
        self.vehicles.retain(|v| *v != vehicle);
        self.progress.remove(&vehicle);
        self.lateral_deviation.remove(&vehicle);
    }

    /// Distance between the lane's upstream end and the rear of the last
    /// vehicle on it.
    pub fn free_space(&self, lane_length: Distance) -> Distance {
        match self.vehicles.last() {
            Some(last) => {
                let p = &self.progress[last];
                let rear = p.rear.or(p.center).or(p.front).unwrap_or(0.0);
                lane_length * rear.max(0.0)
            }
            None => lane_length,
        }
    }
}

/// A road lane's dynamic state: its queue plus the scheduled-exit chain that
/// orders reservations granted out of it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoadLaneState {
    pub queue: LaneQueue,
    /// The last confirmed REAR exit. A newly granted reservation's entry is
    /// constrained by this.
    pub latest_scheduled_exit: Option<ScheduledExit>,
}

impl RoadLaneState {
    pub fn new() -> RoadLaneState {
        RoadLaneState::default()
    }

    /// The first contiguous run of vehicles in the queue that lack both a
    /// reservation and permission, grouped by shared destination: the next
    /// candidate platoon. Only a vehicle that has reached the approach
    /// region leads a request. Returns [start, end) indices.
    pub fn first_without_permission(
        &self,
        lane: &RoadLane,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
    ) -> Option<(usize, usize)> {
        let start = self
            .queue
            .vehicles
            .iter()
            .position(|id| !vehicles[id].can_enter_intersection())?;
        let head_front = self.queue.progress[&self.queue.vehicles[start]].front?;
        if head_front <= lane.lcregion_end {
            return None;
        }
        let destination = vehicles[&self.queue.vehicles[start]].destination;
        let mut end = start + 1;
        while end < self.queue.vehicles.len() {
            let v = &vehicles[&self.queue.vehicles[end]];
            if v.can_enter_intersection() || v.destination != destination {
                break;
            }
            end += 1;
        }
        Some((start, end))
    }

    /// When could the idx-th vehicle's front earliest cross into the
    /// intersection? Assumes the guaranteed `min_acceleration` capped by the
    /// lane's speed limit, and orders the result after `after`.
    pub fn soonest_exit(
        &self,
        ctx: &Ctx,
        idx: usize,
        lane: &RoadLane,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
        after: Option<&ScheduledExit>,
    ) -> Option<ScheduledExit> {
        let id = *self.queue.vehicles.get(idx)?;
        let progress = self.queue.progress.get(&id)?;
        let front = progress.front?;
        let vehicle = &vehicles[&id];

        let dist = lane.length() * (1.0 - front).max(0.0);
        let (steps, velocity) = kinematics::timesteps_to_cover(
            dist,
            vehicle.velocity,
            ctx.settings.min_acceleration,
            lane.speed_limit,
            ctx.settings.timestep_length,
        );
        let mut t = ctx.now + steps;
        if let Some(prev) = after.or(self.latest_scheduled_exit.as_ref()) {
            t = t.max(prev.t);
        }
        Some(ScheduledExit {
            vehicle: id,
            section: VehicleSection::Front,
            t,
            velocity,
        })
    }

    /// Could a vehicle entering the upstream end of this lane
    /// `steps_forward` ticks from now, moving at `entering_v0`, collide with
    /// the last vehicle already here? Worst case on both sides: the in-lane
    /// vehicle brakes to a stop starting now, and the entering one needs its
    /// full stopping distance plus its buffered length.
    pub fn check_entrance_collision(
        &self,
        ctx: &Ctx,
        lane: &RoadLane,
        vehicles: &BTreeMap<VehicleID, Vehicle>,
        steps_forward: Timestep,
        entering_length: Distance,
        entering_v0: Speed,
    ) -> bool {
        let last = match self.queue.vehicles.last() {
            Some(id) => *id,
            None => return false,
        };
        let p = &self.queue.progress[&last];
        let rear = match p.rear.or(p.center).or(p.front) {
            Some(r) => r,
            None => return false,
        };
        let in_lane = &vehicles[&last];

        let horizon = ctx.settings.timestep_length * (steps_forward as f64);
        let in_lane_travel = kinematics::stopping_distance(in_lane.velocity, in_lane.max_braking)
            .min(in_lane.velocity * horizon);
        let gap = lane.length() * rear + in_lane_travel;

        let f = ctx.settings.length_buffer_factor;
        let needed = entering_length * (1.0 + 2.0 * f)
            + kinematics::stopping_distance(entering_v0, MAX_BRAKING);
        needed >= gap
    }

    /// Per-tick acceleration and speed updates for every vehicle fully on
    /// this lane. With `stop_at_end`, the head stops for the intersection
    /// line unless it may enter; everyone else follows the vehicle ahead,
    /// worst case. Lanes draining the intersection let their head run free.
    pub fn update_speeds(
        &self,
        ctx: &Ctx,
        lane: &RoadLane,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
        stop_at_end: bool,
    ) {
        let dt = ctx.settings.timestep_length;
        let mut preceding_rear: Option<f64> = None;
        for id in &self.queue.vehicles {
            let progress = self.queue.progress[id];
            let front = match progress.front {
                Some(f) => f,
                None => {
                    // This vehicle's front already entered the intersection;
                    // the manager owns its kinematics now.
                    preceding_rear = progress.rear;
                    continue;
                }
            };

            let vehicle = vehicles.get_mut(id).unwrap();
            if vehicle.has_reservation {
                if stop_at_end {
                    // Approaching with a confirmed reservation: replay
                    // exactly the profile the reservation assumed, so the
                    // front breaks the line on the scheduled tick.
                    vehicle.acceleration = ctx.settings.min_acceleration;
                    vehicle.velocity = kinematics::speed_update(
                        vehicle.velocity,
                        vehicle.acceleration,
                        dt,
                        lane.speed_limit,
                    );
                }
                // Otherwise it's still clearing the intersection and the
                // manager drives it.
                preceding_rear = progress.rear;
                continue;
            }
            let gap_to_line = lane.length() * (1.0 - front).max(0.0);
            let accel = match preceding_rear {
                None => {
                    if !stop_at_end || vehicle.can_enter_intersection() {
                        kinematics::accel_update_uncontested(
                            vehicle.velocity,
                            lane.speed_limit,
                            vehicle.max_accel,
                            vehicle.max_braking,
                        )
                    } else {
                        kinematics::accel_update_following(
                            vehicle.velocity,
                            gap_to_line,
                            dt,
                            lane.speed_limit,
                            vehicle.max_accel,
                            vehicle.max_braking,
                        )
                    }
                }
                Some(rear) => {
                    let gap_to_leader = lane.length() * (rear - front).max(0.0);
                    let a_follow = kinematics::accel_update_following(
                        vehicle.velocity,
                        gap_to_leader,
                        dt,
                        lane.speed_limit,
                        vehicle.max_accel,
                        vehicle.max_braking,
                    );
                    if !stop_at_end || vehicle.can_enter_intersection() {
                        a_follow
                    } else {
                        let a_line = kinematics::accel_update_following(
                            vehicle.velocity,
                            gap_to_line,
                            dt,
                            lane.speed_limit,
                            vehicle.max_accel,
                            vehicle.max_braking,
                        );
                        a_follow.min(a_line)
                    }
                }
            };
            vehicle.acceleration = accel;
            vehicle.velocity =
                kinematics::speed_update(vehicle.velocity, accel, dt, lane.speed_limit);
            preceding_rear = progress.rear;
        }
    }

    /// Advances every vehicle on this lane one tick and reports sections
    /// crossing the downstream boundary. With `stop_at_end`, fronts only
    /// cross when the vehicle may enter the intersection; otherwise they pin
    /// at the line.
    pub fn step_vehicles(
        &mut self,
        ctx: &Ctx,
        lane: &RoadLane,
        vehicles: &mut BTreeMap<VehicleID, Vehicle>,
        stop_at_end: bool,
    ) -> Vec<VehicleTransfer> {
        let dt = ctx.settings.timestep_length;
        let mut transfers = Vec::new();
        let ids: Vec<VehicleID> = self.queue.vehicles.clone();
        for id in ids {
            let vehicle = vehicles.get_mut(&id).unwrap();
            let dist = kinematics::dist_covered_in_tick(vehicle.velocity, vehicle.acceleration, dt);
            let dp = dist / lane.length();
            let mut progress = self.queue.progress[&id];

            if let Some(front) = progress.front {
                let new = front + dp;
                if new >= 1.0 {
                    if !stop_at_end || vehicle.can_enter_intersection() {
                        progress.front = None;
                        transfers.push(VehicleTransfer {
                            vehicle: id,
                            section: VehicleSection::Front,
                            overflow: lane.length() * (new - 1.0),
                        });
                    } else {
                        // Discrete overshoot at the line; hold in place.
                        log::debug!("{} pinned at the intersection line", id);
                        vehicle.velocity = Speed::ZERO;
                        continue;
                    }
                } else {
                    progress.front = Some(new);
                }
            }
            if let Some(center) = progress.center {
                let new = center + dp;
                if new >= 1.0 {
                    progress.center = None;
                    transfers.push(VehicleTransfer {
                        vehicle: id,
                        section: VehicleSection::Center,
                        overflow: lane.length() * (new - 1.0),
                    });
                } else {
                    progress.center = Some(new);
                    vehicle.pos = lane.trajectory.position(new);
                    vehicle.heading = lane.trajectory.heading(new);
                }
            }
            if let Some(rear) = progress.rear {
                let new = rear + dp;
                if new >= 1.0 {
                    transfers.push(VehicleTransfer {
                        vehicle: id,
                        section: VehicleSection::Rear,
                        overflow: lane.length() * (new - 1.0),
                    });
                    self.queue.remove(id);
                    continue;
                } else {
                    progress.rear = Some(new);
                }
            }
            self.queue.progress.insert(id, progress);
        }
        transfers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_space() {
        let mut q = LaneQueue::new();
        assert_eq!(q.free_space(Distance::meters(50.0)), Distance::meters(50.0));
        q.push_back(
            VehicleID(0),
            VehicleProgress::new(Some(0.9), Some(0.8), Some(0.7)),
        );
        q.push_back(
            VehicleID(1),
            VehicleProgress::new(Some(0.3), Some(0.2), Some(0.1)),
        );
        assert_eq!(q.free_space(Distance::meters(50.0)), Distance::meters(5.0));
    }

    #[test]
    fn remove_keeps_order() {
        let mut q = LaneQueue::new();
        for i in 0..3 {
            q.push_back(
                VehicleID(i),
                VehicleProgress::new(Some(0.5), Some(0.4), Some(0.3)),
            );
        }
        q.remove(VehicleID(1));
        assert_eq!(q.vehicles, vec![VehicleID(0), VehicleID(2)]);
        assert!(!q.contains(VehicleID(1)));
    }
}
