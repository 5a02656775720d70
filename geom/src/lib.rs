mod angle;
mod distance;
mod duration;
mod pt;
mod speed;

pub use crate::angle::Angle;
pub use crate::distance::Distance;
pub use crate::duration::Duration;
pub use crate::pt::{HashablePt2D, Pt2D};
pub use crate::speed::{Acceleration, Speed};

// Below this, two distances are considered equal.
pub const EPSILON_DIST: Distance = Distance::const_meters(0.000_1);
