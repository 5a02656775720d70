use serde::{Deserialize, Serialize};
use std::fmt;

/// An angle in radians, counter-clockwise from the positive x axis.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    pub fn new_rads(rads: f64) -> Angle {
        Angle(rads)
    }

    pub fn normalized_radians(self) -> f64 {
        self.0.rem_euclid(2.0 * std::f64::consts::PI)
    }

    pub fn inner_radians(self) -> f64 {
        self.0
    }

    pub fn cos(self) -> f64 {
        self.0.cos()
    }

    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    pub fn tan(self) -> f64 {
        self.0.tan()
    }

    /// True if the two headings point along the same line, in either
    /// direction.
    pub fn parallel_to(self, other: Angle) -> bool {
        let diff = (self.normalized_radians() - other.normalized_radians())
            .rem_euclid(std::f64::consts::PI);
        diff < 1e-9 || (std::f64::consts::PI - diff) < 1e-9
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Angle({} rads)", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn parallel() {
        assert!(Angle::new_rads(0.0).parallel_to(Angle::new_rads(PI)));
        assert!(Angle::new_rads(1.1).parallel_to(Angle::new_rads(1.1 + PI)));
        assert!(!Angle::new_rads(0.0).parallel_to(Angle::new_rads(PI / 2.0)));
    }
}
