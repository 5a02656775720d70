use crate::{Angle, Distance};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in 2D space, in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pt2D {
    x: f64,
    y: f64,
}

impl Pt2D {
    pub fn new(x: f64, y: f64) -> Pt2D {
        if !x.is_finite() || !y.is_finite() {
            panic!("Bad Pt2D {}, {}", x, y);
        }
        Pt2D { x, y }
    }

    pub fn x(self) -> f64 {
        self.x
    }

    pub fn y(self) -> f64 {
        self.y
    }

    pub fn dist_to(self, to: Pt2D) -> Distance {
        Distance::meters(((self.x - to.x).powi(2) + (self.y - to.y).powi(2)).sqrt())
    }

    /// The point at `dist` away along `angle`.
    pub fn project_away(self, dist: Distance, angle: Angle) -> Pt2D {
        Pt2D::new(
            self.x + dist.inner_meters() * angle.cos(),
            self.y + dist.inner_meters() * angle.sin(),
        )
    }

    pub fn to_hashable(self) -> HashablePt2D {
        HashablePt2D {
            x: NotNan::new(self.x).unwrap(),
            y: NotNan::new(self.y).unwrap(),
        }
    }
}

impl fmt::Display for Pt2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pt2D({}, {})", self.x, self.y)
    }
}

/// This represents world space, NOT LonLat. Points are bit-equal, so this is
/// safe to key maps by; lane endpoints are identified this way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashablePt2D {
    x: NotNan<f64>,
    y: NotNan<f64>,
}

impl HashablePt2D {
    pub fn to_pt2d(self) -> Pt2D {
        Pt2D::new(self.x.into_inner(), self.y.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashable_round_trip() {
        let pt = Pt2D::new(3.7, -2.2);
        assert_eq!(pt, pt.to_hashable().to_pt2d());
    }

    #[test]
    fn project_away_east() {
        let pt = Pt2D::new(1.0, 1.0).project_away(Distance::meters(2.0), Angle::new_rads(0.0));
        assert!((pt.x() - 3.0).abs() < 1e-9);
        assert!((pt.y() - 1.0).abs() < 1e-9);
    }
}
