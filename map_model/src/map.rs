use crate::{
    IntersectionLane, IntersectionLaneID, LinkError, Pathfinder, RoadLane, RoadLaneID, Trajectory,
};
use anyhow::Result;
use geom::{Distance, HashablePt2D, Pt2D, Speed};
use log::{info, warn};
use std::collections::BTreeMap;

/// One intersection, the road lanes feeding and draining it, and the routing
/// between them. All linkage is validated here, before the simulation clock
/// ever starts.
#[derive(Clone, Debug)]
pub struct Map {
    road_lanes: Vec<RoadLane>,
    intersection_lanes: Vec<IntersectionLane>,
    incoming_by_coord: BTreeMap<HashablePt2D, RoadLaneID>,
    outgoing_by_coord: BTreeMap<HashablePt2D, RoadLaneID>,
    lane_by_io: BTreeMap<(HashablePt2D, HashablePt2D), IntersectionLaneID>,
    pathfinder: Pathfinder,
}

/// Input to Map::new: which incoming road connects to which outgoing one.
#[derive(Clone, Debug)]
pub struct Connection {
    pub incoming: usize,
    pub outgoing: usize,
}

impl Map {
    pub fn new(
        incoming: Vec<(Trajectory, Speed)>,
        outgoing: Vec<(Trajectory, Speed)>,
        connections: Vec<Connection>,
        intersection_speed_limit: Speed,
    ) -> Result<Map> {
        let n_in = incoming.len();
        let mut road_lanes = Vec::new();
        for (trajectory, speed_limit) in incoming.into_iter().chain(outgoing) {
            let id = RoadLaneID(road_lanes.len());
            road_lanes.push(RoadLane::new(
                id,
                trajectory,
                speed_limit,
                Distance::meters(5.0),
                Distance::meters(40.0),
            ));
        }

        let mut incoming_by_coord = BTreeMap::new();
        let mut outgoing_by_coord = BTreeMap::new();
        for (i, lane) in road_lanes.iter().enumerate() {
            if i < n_in {
                incoming_by_coord.insert(lane.end().to_hashable(), lane.id);
            } else {
                outgoing_by_coord.insert(lane.start().to_hashable(), lane.id);
            }
        }

        let pairs: Vec<(usize, usize)> = connections.iter().map(|c| (c.incoming, c.outgoing)).collect();
        if abstutil::contains_duplicates(&pairs) {
            warn!("the same connection is wired twice");
            return Err(LinkError("the same connection is wired twice".to_string()).into());
        }

        let mut intersection_lanes = Vec::new();
        let mut lane_by_io = BTreeMap::new();
        let mut pathfinder = Pathfinder::new();
        for c in connections {
            if c.incoming >= n_in {
                warn!(
                    "connection names incoming road {}, but there are only {}",
                    c.incoming, n_in
                );
                return Err(LinkError(format!(
                    "connection names incoming road {}, but there are only {}",
                    c.incoming, n_in
                ))
                .into());
            }
            let out_idx = n_in + c.outgoing;
            if out_idx >= road_lanes.len() {
                warn!(
                    "connection names outgoing road {}, but there are only {}",
                    c.outgoing,
                    road_lanes.len() - n_in
                );
                return Err(LinkError(format!(
                    "connection names outgoing road {}, but there are only {}",
                    c.outgoing,
                    road_lanes.len() - n_in
                ))
                .into());
            }
            let id = IntersectionLaneID(intersection_lanes.len());
            let il = match IntersectionLane::connect(
                id,
                &road_lanes[c.incoming],
                &road_lanes[out_idx],
                intersection_speed_limit,
            ) {
                Ok(il) => il,
                Err(err) => {
                    warn!("{}", err);
                    return Err(err.into());
                }
            };
            pathfinder.add_edge(il.entry(), il.exit(), il.length().inner_meters());
            // Destinations are identified by the outgoing road lane's id.
            pathfinder.add_destination(out_idx, il.exit());
            lane_by_io.insert((il.entry().to_hashable(), il.exit().to_hashable()), id);
            intersection_lanes.push(il);
        }

        // Every incoming road must reach the intersection somehow.
        for lane in &road_lanes[..n_in] {
            let end = lane.end().to_hashable();
            if !lane_by_io.keys().any(|(entry, _)| *entry == end) {
                warn!("{} doesn't reach the intersection", lane.id);
                return Err(LinkError(format!("{} doesn't reach the intersection", lane.id)).into());
            }
        }

        info!(
            "map wired: {} road lanes, {} intersection lanes",
            road_lanes.len(),
            intersection_lanes.len()
        );
        Ok(Map {
            road_lanes,
            intersection_lanes,
            incoming_by_coord,
            outgoing_by_coord,
            lane_by_io,
            pathfinder,
        })
    }

    pub fn get_r(&self, id: RoadLaneID) -> &RoadLane {
        &self.road_lanes[id.0]
    }

    pub fn get_i(&self, id: IntersectionLaneID) -> &IntersectionLane {
        &self.intersection_lanes[id.0]
    }

    pub fn all_intersection_lanes(&self) -> &Vec<IntersectionLane> {
        &self.intersection_lanes
    }

    pub fn incoming_road_lanes(&self) -> Vec<&RoadLane> {
        self.incoming_by_coord
            .values()
            .map(|id| self.get_r(*id))
            .collect()
    }

    pub fn incoming_road_lane_by_coord(&self, entry: Pt2D) -> Option<&RoadLane> {
        self.incoming_by_coord
            .get(&entry.to_hashable())
            .map(|id| self.get_r(*id))
    }

    pub fn outgoing_road_lane_by_coord(&self, exit: Pt2D) -> Option<&RoadLane> {
        self.outgoing_by_coord
            .get(&exit.to_hashable())
            .map(|id| self.get_r(*id))
    }

    pub fn intersection_lane_by_io(&self, entry: Pt2D, exit: Pt2D) -> Option<&IntersectionLane> {
        self.lane_by_io
            .get(&(entry.to_hashable(), exit.to_hashable()))
            .map(|id| self.get_i(*id))
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    pub fn pathfinder_mut(&mut self) -> &mut Pathfinder {
        &mut self.pathfinder
    }

    /// The bounding box of the conflict area, spanned by every entry and exit
    /// coord.
    pub fn conflict_bounds(&self) -> (Pt2D, Pt2D) {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for il in &self.intersection_lanes {
            for pt in [il.entry(), il.exit()] {
                min_x = min_x.min(pt.x());
                min_y = min_y.min(pt.y());
                max_x = max_x.max(pt.x());
                max_y = max_y.max(pt.y());
            }
        }
        (Pt2D::new(min_x, min_y), Pt2D::new(max_x, max_y))
    }
}
