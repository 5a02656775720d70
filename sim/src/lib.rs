//! The simulation core: vehicles progressing along lanes under discrete
//! ticks, and the reservation-based manager deciding who may cross the
//! conflict area.

mod kinematics;
mod mechanics;
mod queue;
mod sim;
mod spawn;
mod vehicle;

pub use crate::mechanics::{
    DrivingState, IntersectionManager, Reservation, ScheduledExit, Tile, TileIndex, TileLayer,
    TileSet, Tiling,
};
pub use crate::queue::{LaneQueue, RoadLaneState, VehicleProgress};
pub use crate::sim::Sim;
pub use crate::spawn::VehicleSpawner;
pub use crate::vehicle::{Vehicle, VehicleID, VehicleSection};

use geom::{Acceleration, Distance, Duration, Speed};
use serde::{Deserialize, Serialize};

/// Discrete simulation time, in ticks since the start of the run.
pub type Timestep = u64;

pub const VEHICLE_LENGTH: Distance = Distance::const_meters(3.0);
pub const VEHICLE_WIDTH: Distance = Distance::const_meters(2.0);
pub const MAX_ACCEL: Acceleration = Acceleration::const_meters_per_second_squared(3.0);
pub const MAX_BRAKING: Acceleration = Acceleration::const_meters_per_second_squared(-2.7);

/// Every tunable the core consumes. Threaded through explicitly as part of
/// [`Ctx`]; there is no global state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// World units per tile side.
    pub tile_width: f64,
    /// Per-tile cap on cumulative reservation probability. 0 is strict:
    /// one vehicle per tile, full stop.
    pub rejection_threshold: f64,
    /// Fractional halo added around each vehicle's footprint.
    pub length_buffer_factor: f64,
    /// The acceleration every vehicle is guaranteed to manage; reservations
    /// assume it.
    pub min_acceleration: Acceleration,
    pub timestep_length: Duration,
    pub speed_limit: Speed,
    /// Poisson arrival rate for the spawner.
    pub vehicles_per_minute: f64,
    pub rng_seed: u64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            tile_width: 1.0,
            rejection_threshold: 0.0,
            length_buffer_factor: 0.25,
            min_acceleration: Acceleration::const_meters_per_second_squared(1.875),
            timestep_length: Duration::const_seconds(1.0),
            speed_limit: Speed::const_meters_per_second(30.0),
            vehicles_per_minute: 30.0,
            rng_seed: 42,
        }
    }
}

/// The explicit simulation context: settings plus the current tick.
#[derive(Clone, Copy)]
pub struct Ctx<'a> {
    pub settings: &'a Settings,
    pub now: Timestep,
}

impl<'a> Ctx<'a> {
    pub fn new(settings: &'a Settings, now: Timestep) -> Ctx<'a> {
        Ctx { settings, now }
    }
}
