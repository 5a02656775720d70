//! The static description of an intersection and the roads feeding it:
//! trajectories, lanes, their wiring, and routing between them. Everything
//! here is immutable once constructed; dynamic state lives in the sim crate.

mod lane;
mod map;
mod pathfinder;
mod trajectory;

pub use crate::lane::{IntersectionLane, IntersectionLaneID, RoadLane, RoadLaneID};
pub use crate::map::{Connection, Map};
pub use crate::pathfinder::{DestinationID, Pathfinder};
pub use crate::trajectory::{DegenerateConnector, Trajectory};

use std::fmt;

/// Raised when a road doesn't find an upstream or downstream object at wiring
/// time.
#[derive(Debug)]
pub struct LinkError(pub String);

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "linkage error: {}", self.0)
    }
}

impl std::error::Error for LinkError {}
