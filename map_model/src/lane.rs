use crate::{DegenerateConnector, Trajectory};
use geom::{Distance, Pt2D, Speed};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoadLaneID(pub usize);

impl fmt::Display for RoadLaneID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RoadLane #{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntersectionLaneID(pub usize);

impl fmt::Display for IntersectionLaneID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IntersectionLane #{}", self.0)
    }
}

/// A lane feeding or draining the intersection. Divided into three regions,
/// working backwards from the intersection: the approach, the lane-changing
/// region, and the entrance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadLane {
    pub id: RoadLaneID,
    pub trajectory: Trajectory,
    pub speed_limit: Speed,
    /// Proportional progress where the lane-changing region ends and the
    /// approach region begins.
    pub lcregion_end: f64,
    /// Proportional progress where the entrance region ends.
    pub entrance_end: f64,
}

impl RoadLane {
    pub fn new(
        id: RoadLaneID,
        trajectory: Trajectory,
        speed_limit: Speed,
        len_entrance_region: Distance,
        len_approach_region: Distance,
    ) -> RoadLane {
        let length = trajectory.length();
        let entrance_end = (len_entrance_region / length).clamp(0.0, 1.0);
        let lcregion_end = (1.0 - len_approach_region / length).clamp(entrance_end, 1.0);
        RoadLane {
            id,
            trajectory,
            speed_limit,
            lcregion_end,
            entrance_end,
        }
    }

    pub fn start(&self) -> Pt2D {
        self.trajectory.start()
    }

    pub fn end(&self) -> Pt2D {
        self.trajectory.end()
    }

    pub fn length(&self) -> Distance {
        self.trajectory.length()
    }
}

/// A trajectory crossing the conflict area, from the end of one road lane to
/// the start of another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntersectionLane {
    pub id: IntersectionLaneID,
    pub trajectory: Trajectory,
    pub incoming: RoadLaneID,
    pub outgoing: RoadLaneID,
    pub speed_limit: Speed,
}

impl IntersectionLane {
    pub fn connect(
        id: IntersectionLaneID,
        incoming: &RoadLane,
        outgoing: &RoadLane,
        speed_limit: Speed,
    ) -> Result<IntersectionLane, DegenerateConnector> {
        let trajectory = Trajectory::connector(
            incoming.end(),
            incoming.trajectory.heading(1.0),
            outgoing.start(),
            outgoing.trajectory.heading(0.0),
        )?;
        Ok(IntersectionLane {
            id,
            trajectory,
            incoming: incoming.id,
            outgoing: outgoing.id,
            speed_limit,
        })
    }

    /// Where vehicles enter the conflict area.
    pub fn entry(&self) -> Pt2D {
        self.trajectory.start()
    }

    /// Where vehicles leave it.
    pub fn exit(&self) -> Pt2D {
        self.trajectory.end()
    }

    pub fn length(&self) -> Distance {
        self.trajectory.length()
    }
}
