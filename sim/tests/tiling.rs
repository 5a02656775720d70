//! Scenario tests for the tiling's public API: footprints, io buffers, the
//! rolling window, and the reservation round trip.

use geom::{Angle, Pt2D, Speed};
use map_model::{Connection, Map, Trajectory};
use sim::{Ctx, Settings, Tiling, Vehicle, VehicleID};

fn straight(a: Pt2D, b: Pt2D) -> Trajectory {
    Trajectory::new(
        a,
        Pt2D::new((a.x() + b.x()) / 2.0, (a.y() + b.y()) / 2.0),
        b,
    )
}

/// One incoming lane from the north, one outgoing to the east, joined by a
/// single turn across the conflict area.
fn turn_map() -> Map {
    let speed_limit = Speed::meters_per_second(30.0);
    Map::new(
        vec![(
            straight(Pt2D::new(50.0, 250.0), Pt2D::new(50.0, 200.0)),
            speed_limit,
        )],
        vec![(
            straight(Pt2D::new(100.0, 100.0), Pt2D::new(150.0, 100.0)),
            speed_limit,
        )],
        vec![Connection {
            incoming: 0,
            outgoing: 0,
        }],
        speed_limit,
    )
    .unwrap()
}

fn big_tiling() -> Tiling {
    Tiling::new(
        Pt2D::new(0.0, 0.0),
        Pt2D::new(100.0, 200.0),
        Vec::new(),
        1.0,
        0.0,
    )
}

#[test]
fn diagonal_footprint_exact() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let mut tiling = big_tiling();

    let mut vehicle = Vehicle::new(VehicleID(0), 0);
    vehicle.pos = Pt2D::new(50.1, 100.5);
    vehicle.heading = Angle::new_rads(1.1);

    let tiles = tiling.pos_to_tiles(&ctx, 3, &vehicle).unwrap().unwrap();

    let x_mins = [50, 48, 47, 48, 48, 49, 49];
    let x_maxes = [50, 51, 51, 52, 52, 52, 50];
    let mut count = 0;
    for (i, y) in (97..97 + 7).enumerate() {
        for x in x_mins[i]..=x_maxes[i] {
            let id = tiling.tile_loc_to_id((x, y));
            assert_eq!(tiles.get(&id), Some(&1.0), "missing tile ({}, {})", x, y);
            count += 1;
        }
    }
    assert_eq!(tiles.len(), count);
    // Layers for t=1..=3 were created lazily.
    assert_eq!(tiling.layers().len(), 3);
}

#[test]
fn footprint_tangent_to_extent() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let mut tiling = big_tiling();

    // The buffered footprint's top edge lies exactly on y=0: only the edge
    // row is touched.
    let mut vehicle = Vehicle::new(VehicleID(0), 0);
    vehicle.pos = Pt2D::new(50.0, -1.5);
    vehicle.heading = Angle::new_rads(0.0);

    let tiles = tiling.pos_to_tiles(&ctx, 1, &vehicle).unwrap().unwrap();
    assert_eq!(tiles.len(), 6);
    for x in 47..=52 {
        assert!(tiles.contains_key(&tiling.tile_loc_to_id((x, 0))));
    }
}

#[test]
fn pos_to_tiles_validates_time() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 1);
    let mut tiling = big_tiling();
    let vehicle = Vehicle::new(VehicleID(0), 0);

    assert!(tiling.pos_to_tiles(&ctx, 0, &vehicle).is_err());
    assert!(tiling.pos_to_tiles(&ctx, 1, &vehicle).is_err());
    assert!(tiling.pos_to_tiles(&ctx, 2, &vehicle).is_ok());
}

#[test]
fn footprint_rejected_when_contested() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let mut tiling = big_tiling();

    let mut vehicle = Vehicle::new(VehicleID(0), 0);
    vehicle.pos = Pt2D::new(5.5, 5.5);
    let covered = tiling.pos_to_tiles(&ctx, 2, &vehicle).unwrap().unwrap();
    let contested = *covered.keys().next().unwrap();

    // Someone else confirms one of those cells.
    let mut tiles = sim::TileSet::new();
    tiles.insert(2, vec![(contested, 1.0)].into_iter().collect());
    tiling.confirm_tiles(VehicleID(1), &tiles, false).unwrap();

    assert!(tiling.pos_to_tiles(&ctx, 2, &vehicle).unwrap().is_none());
    // The holder itself is always admitted to its own tiles.
    let mut holder = vehicle.clone();
    holder.id = VehicleID(1);
    assert!(tiling.pos_to_tiles(&ctx, 2, &holder).unwrap().is_some());
    // Clearing the competitor restores admission.
    tiling.clear_vehicle_tiles(VehicleID(1), &tiles);
    assert!(tiling.pos_to_tiles(&ctx, 2, &vehicle).unwrap().is_some());
}

#[test]
fn io_buffer_windows() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let map = turn_map();
    let il = &map.all_intersection_lanes()[0];
    let mut tiling = Tiling::for_map(&map, &settings);
    let vehicle = Vehicle::new(VehicleID(0), 0);

    // Buffering at or before now is a programming error.
    assert!(tiling
        .io_tile_buffer(&ctx, il, 0, &vehicle, true, None)
        .is_err());

    // An entry at now+1 has no prior tick to buffer.
    let prepended = tiling
        .io_tile_buffer(&ctx, il, 1, &vehicle, true, None)
        .unwrap()
        .unwrap();
    assert!(prepended.is_empty());

    // An entry at now+2 buffers exactly the tick before it.
    let prepended = tiling
        .io_tile_buffer(&ctx, il, 2, &vehicle, true, None)
        .unwrap()
        .unwrap();
    assert_eq!(prepended.len(), 1);
    assert!(prepended.contains_key(&1));
    let entry_tile = tiling.tile_loc_to_id(tiling.buffer_tile_loc(il.entry()).unwrap());
    assert_eq!(prepended[&1].get(&entry_tile), Some(&1.0));

    // An exit at t=1 with an explicit window claims t+1 ..= t+k.
    let postpended = tiling
        .io_tile_buffer(&ctx, il, 1, &vehicle, false, Some(5))
        .unwrap()
        .unwrap();
    assert_eq!(postpended.len(), 5);
    let exit_tile = tiling.tile_loc_to_id(tiling.buffer_tile_loc(il.exit()).unwrap());
    for t in 2..=6 {
        assert_eq!(postpended[&t].get(&exit_tile), Some(&1.0));
    }

    // Without an explicit window, the braking bound for the vehicle's speed
    // decides: 18 ticks at rest.
    let postpended = tiling
        .io_tile_buffer(&ctx, il, 1, &vehicle, false, None)
        .unwrap()
        .unwrap();
    assert_eq!(postpended.len(), 18);
    assert!(postpended.contains_key(&19));
}

#[test]
fn io_buffer_contested() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let map = turn_map();
    let il = &map.all_intersection_lanes()[0];
    let mut tiling = Tiling::for_map(&map, &settings);
    let vehicle = Vehicle::new(VehicleID(0), 0);

    let entry_tile = tiling.tile_loc_to_id(tiling.buffer_tile_loc(il.entry()).unwrap());
    let mut competing = sim::TileSet::new();
    competing.insert(1, vec![(entry_tile, 1.0)].into_iter().collect());
    tiling.confirm_tiles(VehicleID(9), &competing, false).unwrap();

    assert!(tiling
        .io_tile_buffer(&ctx, il, 2, &vehicle, true, None)
        .unwrap()
        .is_none());
    // An exit window through the contested tick fails too, on the exit tile.
    let exit_tile = tiling.tile_loc_to_id(tiling.buffer_tile_loc(il.exit()).unwrap());
    let mut competing_exit = sim::TileSet::new();
    competing_exit.insert(4, vec![(exit_tile, 1.0)].into_iter().collect());
    tiling
        .confirm_tiles(VehicleID(9), &competing_exit, false)
        .unwrap();
    assert!(tiling
        .io_tile_buffer(&ctx, il, 1, &vehicle, false, Some(5))
        .unwrap()
        .is_none());
}

#[test]
fn confirm_then_clear_round_trip() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let mut tiling = big_tiling();

    let mut vehicle = Vehicle::new(VehicleID(3), 0);
    vehicle.pos = Pt2D::new(20.0, 20.0);
    let covered = tiling.pos_to_tiles(&ctx, 2, &vehicle).unwrap().unwrap();
    let mut tiles = sim::TileSet::new();
    tiles.insert(2, covered);

    tiling.confirm_tiles(vehicle.id, &tiles, false).unwrap();
    let layer = tiling.layer(2).unwrap();
    for id in tiles[&2].keys() {
        assert!(layer.tile(*id).reserved_by(vehicle.id));
    }

    tiling.clear_vehicle_tiles(vehicle.id, &tiles);
    let layer = tiling.layer(2).unwrap();
    for id in 0..layer.len() {
        assert!(!layer.tile(id).is_reserved());
    }
}

#[test]
fn window_rolls_with_time() {
    let settings = Settings::default();
    let mut tiling = big_tiling();
    let ctx = Ctx::new(&settings, 0);
    let vehicle = Vehicle::new(VehicleID(0), 0);

    let mut v = vehicle.clone();
    v.pos = Pt2D::new(10.0, 10.0);
    tiling.pos_to_tiles(&ctx, 3, &v).unwrap().unwrap();
    assert_eq!(tiling.layers().len(), 3);
    assert_eq!(tiling.layers().front().unwrap().t, 1);

    let ctx = Ctx::new(&settings, 2);
    tiling.handle_new_timestep(&ctx);
    assert_eq!(tiling.layers().len(), 1);
    assert_eq!(tiling.layers().front().unwrap().t, 3);
}
