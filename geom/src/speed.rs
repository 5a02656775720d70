use crate::{Distance, Duration};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops;

/// A speed in meters per second. Can be negative.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Speed(f64);

impl Speed {
    pub const ZERO: Speed = Speed::const_meters_per_second(0.0);

    pub fn meters_per_second(value: f64) -> Speed {
        if !value.is_finite() {
            panic!("Bad Speed {}", value);
        }
        Speed(value)
    }

    pub const fn const_meters_per_second(value: f64) -> Speed {
        Speed(value)
    }

    pub fn inner_meters_per_second(self) -> f64 {
        self.0
    }

    pub fn min(self, other: Speed) -> Speed {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl Eq for Speed {}

#[allow(clippy::derive_ord_xor_partial_ord)]
impl Ord for Speed {
    fn cmp(&self, other: &Speed) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl ops::Add for Speed {
    type Output = Speed;

    fn add(self, other: Speed) -> Speed {
        Speed(self.0 + other.0)
    }
}

impl ops::Mul<Duration> for Speed {
    type Output = Distance;

    fn mul(self, t: Duration) -> Distance {
        Distance::meters(self.0 * t.inner_seconds())
    }
}

impl ops::Div<Acceleration> for Speed {
    type Output = Duration;

    fn div(self, a: Acceleration) -> Duration {
        if a == Acceleration::ZERO {
            panic!("Can't divide {} / 0 mps^2", self);
        }
        Duration::seconds(self.0 / a.inner_meters_per_second_squared())
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}mps", self.0)
    }
}

/// An acceleration in meters per second squared. Negative is braking.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Acceleration(f64);

impl Acceleration {
    pub const ZERO: Acceleration = Acceleration::const_meters_per_second_squared(0.0);

    pub fn meters_per_second_squared(value: f64) -> Acceleration {
        if !value.is_finite() {
            panic!("Bad Acceleration {}", value);
        }
        Acceleration(value)
    }

    pub const fn const_meters_per_second_squared(value: f64) -> Acceleration {
        Acceleration(value)
    }

    pub fn inner_meters_per_second_squared(self) -> f64 {
        self.0
    }
}

impl Eq for Acceleration {}

#[allow(clippy::derive_ord_xor_partial_ord)]
impl Ord for Acceleration {
    fn cmp(&self, other: &Acceleration) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl ops::Mul<Duration> for Acceleration {
    type Output = Speed;

    fn mul(self, t: Duration) -> Speed {
        Speed::meters_per_second(self.0 * t.inner_seconds())
    }
}

impl fmt::Display for Acceleration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}mps^2", self.0)
    }
}
