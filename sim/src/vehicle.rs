use crate::{MAX_ACCEL, MAX_BRAKING, VEHICLE_LENGTH, VEHICLE_WIDTH};
use geom::{Acceleration, Angle, Distance, Pt2D, Speed};
use map_model::DestinationID;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleID(pub usize);

impl fmt::Display for VehicleID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Vehicle #{}", self.0)
    }
}

/// A vehicle is modeled as three collinear points along its heading, spaced
/// at half-length intervals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VehicleSection {
    Front,
    Center,
    Rear,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleID,

    pub pos: Pt2D,
    pub heading: Angle,
    pub velocity: Speed,
    pub acceleration: Acceleration,

    pub length: Distance,
    pub width: Distance,
    pub max_accel: Acceleration,
    pub max_braking: Acceleration,

    pub destination: DestinationID,

    pub has_reservation: bool,
    pub permission_to_enter_intersection: bool,
}

impl Vehicle {
    pub fn new(id: VehicleID, destination: DestinationID) -> Vehicle {
        Vehicle {
            id,
            pos: Pt2D::new(0.0, 0.0),
            heading: Angle::ZERO,
            velocity: Speed::ZERO,
            acceleration: Acceleration::ZERO,
            length: VEHICLE_LENGTH,
            width: VEHICLE_WIDTH,
            max_accel: MAX_ACCEL,
            max_braking: MAX_BRAKING,
            destination,
            has_reservation: false,
            permission_to_enter_intersection: false,
        }
    }

    /// A deep copy for use inside a speculative rollout only. The original is
    /// never mutated during `check_request`.
    pub fn clone_for_request(&self) -> Vehicle {
        self.clone()
    }

    pub fn can_enter_intersection(&self) -> bool {
        self.has_reservation || self.permission_to_enter_intersection
    }

    /// The rectangle this vehicle stamps onto the conflict area: half-length
    /// and half-width both inflated by the buffer factor. Corners run
    /// front-left, front-right, rear-right, rear-left.
    pub fn footprint(&self, length_buffer_factor: f64) -> [Pt2D; 4] {
        let half_len = (0.5 + length_buffer_factor) * self.length.inner_meters();
        let half_wid = (0.5 + length_buffer_factor) * self.width.inner_meters();
        let (ux, uy) = (self.heading.cos(), self.heading.sin());
        let (nx, ny) = (-uy, ux);
        let c = self.pos;
        [
            Pt2D::new(
                c.x() + half_len * ux + half_wid * nx,
                c.y() + half_len * uy + half_wid * ny,
            ),
            Pt2D::new(
                c.x() + half_len * ux - half_wid * nx,
                c.y() + half_len * uy - half_wid * ny,
            ),
            Pt2D::new(
                c.x() - half_len * ux - half_wid * nx,
                c.y() - half_len * uy - half_wid * ny,
            ),
            Pt2D::new(
                c.x() - half_len * ux + half_wid * nx,
                c.y() - half_len * uy + half_wid * ny,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_axis_aligned() {
        let mut v = Vehicle::new(VehicleID(0), 0);
        v.pos = Pt2D::new(10.0, 10.0);
        let corners = v.footprint(0.25);
        // length 3, width 2, buffered by 25%: spans 4.5 x 3.
        assert!((corners[0].x() - 12.25).abs() < 1e-9);
        assert!((corners[0].y() - 11.5).abs() < 1e-9);
        assert!((corners[2].x() - 7.75).abs() < 1e-9);
        assert!((corners[2].y() - 8.5).abs() < 1e-9);
    }

    #[test]
    fn clone_for_request_is_deep() {
        let v = Vehicle::new(VehicleID(3), 1);
        let mut clone = v.clone_for_request();
        clone.velocity = Speed::meters_per_second(5.0);
        assert_eq!(v.velocity, Speed::ZERO);
        assert_eq!(clone.id, v.id);
    }
}
