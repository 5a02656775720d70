//! Runs the intersection simulation from the command line, without any UI:
//! wire up a four-leg intersection, let the spawner feed it, and report
//! throughput at the end.

use anyhow::Result;
use geom::{Acceleration, Duration, Pt2D, Speed};
use log::info;
use map_model::{Connection, Map, Trajectory};
use sim::{Settings, Sim};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "headless", about = "Simulates a reservation-managed intersection")]
struct Flags {
    /// How many ticks to simulate
    #[structopt(long, default_value = "600")]
    ticks: u64,

    /// Poisson arrival rate, in vehicles per minute
    #[structopt(long, default_value = "30.0")]
    vehicles_per_minute: f64,

    /// World units per tile side
    #[structopt(long, default_value = "1.0")]
    tile_width: f64,

    /// Per-tile cap on cumulative reservation probability
    #[structopt(long, default_value = "0.0")]
    rejection_threshold: f64,

    /// Fractional halo around each vehicle's footprint
    #[structopt(long, default_value = "0.25")]
    length_buffer_factor: f64,

    /// Guaranteed acceleration reservations assume, in m/s^2
    #[structopt(long, default_value = "1.875")]
    min_acceleration: f64,

    /// Seconds per tick
    #[structopt(long, default_value = "1.0")]
    timestep_length: f64,

    /// Speed limit everywhere, in m/s
    #[structopt(long, default_value = "30.0")]
    speed_limit: f64,

    /// Seed for the spawner's RNG
    #[structopt(long, default_value = "42")]
    rng_seed: u64,
}

fn main() -> Result<()> {
    abstutil::logger::setup();
    let flags = Flags::from_args();

    let settings = Settings {
        tile_width: flags.tile_width,
        rejection_threshold: flags.rejection_threshold,
        length_buffer_factor: flags.length_buffer_factor,
        min_acceleration: Acceleration::meters_per_second_squared(flags.min_acceleration),
        timestep_length: Duration::seconds(flags.timestep_length),
        speed_limit: Speed::meters_per_second(flags.speed_limit),
        vehicles_per_minute: flags.vehicles_per_minute,
        rng_seed: flags.rng_seed,
    };

    let map = four_leg_map(settings.speed_limit)?;
    let mut sim = Sim::new(map, settings)?;
    info!("simulating {} ticks", flags.ticks);
    for _ in 0..flags.ticks {
        sim.step()?;
    }

    println!(
        "after {} ticks: {} vehicles spawned, {} reservations granted, {} trips completed, {} \
         still on the network",
        sim.now(),
        sim.vehicles_spawned(),
        sim.reservations_granted(),
        sim.trips_completed(),
        sim.vehicles().len()
    );
    Ok(())
}

/// A four-leg intersection: traffic arrives from the west and the north,
/// leaves to the east and the south, with straight-through and turning
/// movements for each.
fn four_leg_map(speed_limit: Speed) -> Result<Map> {
    let straight = |a: Pt2D, b: Pt2D| {
        Trajectory::new(
            a,
            Pt2D::new((a.x() + b.x()) / 2.0, (a.y() + b.y()) / 2.0),
            b,
        )
    };

    let incoming = vec![
        // From the west, heading east.
        (
            straight(Pt2D::new(-80.0, 8.0), Pt2D::new(0.0, 8.0)),
            speed_limit,
        ),
        // From the north, heading south.
        (
            straight(Pt2D::new(12.0, 100.0), Pt2D::new(12.0, 20.0)),
            speed_limit,
        ),
    ];
    let outgoing = vec![
        // To the east.
        (
            straight(Pt2D::new(20.0, 8.0), Pt2D::new(100.0, 8.0)),
            speed_limit,
        ),
        // To the south.
        (
            straight(Pt2D::new(12.0, 0.0), Pt2D::new(12.0, -80.0)),
            speed_limit,
        ),
    ];
    let connections = vec![
        Connection {
            incoming: 0,
            outgoing: 0,
        },
        Connection {
            incoming: 0,
            outgoing: 1,
        },
        Connection {
            incoming: 1,
            outgoing: 0,
        },
        Connection {
            incoming: 1,
            outgoing: 1,
        },
    ];
    Map::new(incoming, outgoing, connections, speed_limit)
}
