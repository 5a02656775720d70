//! End-to-end scenarios for check_request and the reservation lifecycle,
//! driven through the manager's public API.

use geom::{Pt2D, Speed};
use map_model::{Connection, Map, RoadLane, Trajectory};
use sim::{
    Ctx, IntersectionManager, RoadLaneState, Settings, Sim, Vehicle, VehicleID, VehicleProgress,
    VehicleSection,
};
use std::collections::BTreeMap;

fn straight(a: Pt2D, b: Pt2D) -> Trajectory {
    Trajectory::new(
        a,
        Pt2D::new((a.x() + b.x()) / 2.0, (a.y() + b.y()) / 2.0),
        b,
    )
}

/// One incoming lane from the north turning east across the conflict area.
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

/// Two incoming lanes merging into the same outgoing lane, so their paths
/// must share the exit.
fn merge_map() -> Map {
    let speed_limit = Speed::meters_per_second(30.0);
    Map::new(
        vec![
            (
                straight(Pt2D::new(50.0, 250.0), Pt2D::new(50.0, 200.0)),
                speed_limit,
            ),
            (
                straight(Pt2D::new(-50.0, 150.0), Pt2D::new(0.0, 150.0)),
                speed_limit,
            ),
        ],
        vec![(
            straight(Pt2D::new(100.0, 100.0), Pt2D::new(150.0, 100.0)),
            speed_limit,
        )],
        vec![
            Connection {
                incoming: 0,
                outgoing: 0,
            },
            Connection {
                incoming: 1,
                outgoing: 0,
            },
        ],
        speed_limit,
    )
    .unwrap()
}

/// Put a stopped vehicle on a road lane with its front at `front`.
fn place(
    state: &mut RoadLaneState,
    vehicles: &mut BTreeMap<VehicleID, Vehicle>,
    lane: &RoadLane,
    id: usize,
    front: f64,
    destination: usize,
) -> VehicleID {
    let vid = VehicleID(id);
    let mut vehicle = Vehicle::new(vid, destination);
    let section = (vehicle.length.inner_meters() / 2.0) / lane.length().inner_meters();
    let center = front - section;
    vehicle.pos = lane.trajectory.position(center);
    vehicle.heading = lane.trajectory.heading(center);
    vehicles.insert(vid, vehicle);
    state.queue.push_back(
        vid,
        VehicleProgress::new(Some(front), Some(center), Some(front - 2.0 * section)),
    );
    vid
}

#[test]
fn single_vehicle_clean_request() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let map = turn_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    let mut state = RoadLaneState::new();
    let mut vehicles = BTreeMap::new();
    let lane = map.incoming_road_lanes()[0];

    let vid = place(&mut state, &mut vehicles, lane, 0, 1.0, 1);
    assert!(state.latest_scheduled_exit.is_none());

    let mut granted = manager
        .check_request(&ctx, &map, lane, &state, &vehicles)
        .unwrap();
    assert_eq!(granted.len(), 1);
    let res = granted.remove(0);
    assert_eq!(res.vehicle, vid);
    assert_eq!(res.its_exit.section, VehicleSection::Rear);
    assert_eq!(res.entry_coord, map.all_intersection_lanes()[0].entry());
    let first = res.entry_timestep().unwrap();
    let last = res.last_timestep().unwrap();
    assert!(first >= 1);
    assert!(last > first);
    assert!(res.its_exit.t > 0);
    assert!(res.dependency.is_none());

    // Nothing is live until the caller confirms.
    assert!(!vehicles[&vid].has_reservation);
    assert!(manager.queued_reservations().is_empty());

    let exit = res.its_exit;
    manager
        .confirm_reservation(&ctx, res, &mut state, &mut vehicles)
        .unwrap();
    assert!(vehicles[&vid].has_reservation);
    assert!(vehicles[&vid].permission_to_enter_intersection);
    assert_eq!(state.latest_scheduled_exit, Some(exit));
    assert_eq!(manager.queued_reservations().len(), 1);
}

#[test]
fn start_before_confirm_fails() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let map = turn_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    assert!(manager.start_reservation(&ctx, VehicleID(0)).is_err());
    let mut vehicles = BTreeMap::new();
    assert!(manager
        .clear_reservation(VehicleID(0), &mut vehicles)
        .is_err());
}

#[test]
fn reservation_lifecycle() {
    let settings = Settings::default();
    let map = turn_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    let mut state = RoadLaneState::new();
    let mut vehicles = BTreeMap::new();
    let lane = map.incoming_road_lanes()[0];
    let vid = place(&mut state, &mut vehicles, lane, 0, 1.0, 1);

    let ctx = Ctx::new(&settings, 0);
    let granted = manager
        .check_request(&ctx, &map, lane, &state, &vehicles)
        .unwrap();
    let res = granted.into_iter().next().unwrap();
    let entry_t = res.entry_timestep().unwrap();
    let tiles = res.tiles.clone();
    manager
        .confirm_reservation(&ctx, res, &mut state, &mut vehicles)
        .unwrap();

    // Starting before the scheduled entry fails loudly.
    if entry_t > ctx.now {
        assert!(manager.start_reservation(&ctx, vid).is_err());
    }

    // Reach the entry tick and start: queued becomes active.
    let ctx = Ctx::new(&settings, entry_t);
    manager.tick(&ctx);
    let lane_id = manager.start_reservation(&ctx, vid).unwrap();
    assert_eq!(lane_id, map.all_intersection_lanes()[0].id);
    assert!(manager.queued_reservations().is_empty());
    assert_eq!(manager.active_reservations().len(), 1);

    // Starting twice is illegal.
    assert!(manager.start_reservation(&ctx, vid).is_err());

    // The rear crosses the exit: clearing erases every future hold.
    manager.clear_reservation(vid, &mut vehicles).unwrap();
    assert!(manager.active_reservations().is_empty());
    assert!(!vehicles[&vid].has_reservation);
    assert!(!vehicles[&vid].permission_to_enter_intersection);
    for (t, cells) in &tiles {
        if let Some(layer) = manager.tiling().layer(*t) {
            for id in cells.keys() {
                assert!(!layer.tile(*id).is_reserved());
            }
        }
    }

    // Clearing twice is illegal too.
    assert!(manager.clear_reservation(vid, &mut vehicles).is_err());
}

#[test]
fn same_tick_rival_rejected() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let map = turn_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    let mut state = RoadLaneState::new();
    let mut vehicles = BTreeMap::new();
    let lane = map.incoming_road_lanes()[0];

    // Two vehicles bumper to bumper at the line, wanting the same crossing
    // at the same tick. The first takes it; the second's entry is contested.
    let a = place(&mut state, &mut vehicles, lane, 0, 1.0, 1);
    let b = place(&mut state, &mut vehicles, lane, 1, 0.97, 1);

    let granted = manager
        .check_request(&ctx, &map, lane, &state, &vehicles)
        .unwrap();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].vehicle, a);
    for res in granted {
        manager
            .confirm_reservation(&ctx, res, &mut state, &mut vehicles)
            .unwrap();
    }

    // The second vehicle asks again on its own; still jammed this tick.
    let granted = manager
        .check_request(&ctx, &map, lane, &state, &vehicles)
        .unwrap();
    assert!(granted.is_empty());
    // And the live tiling holds nothing for it.
    for layer in manager.tiling().layers() {
        for id in 0..layer.len() {
            assert!(!layer.tile(id).reserved_by(b));
        }
    }
}

#[test]
fn merge_rival_rejected_and_unmutated() {
    let settings = Settings::default();
    let ctx = Ctx::new(&settings, 0);
    let map = merge_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    let mut vehicles = BTreeMap::new();
    let lanes = map.incoming_road_lanes();
    let (lane_a, lane_b) = (lanes[0], lanes[1]);
    let mut state_a = RoadLaneState::new();
    let mut state_b = RoadLaneState::new();

    // Both vehicles head for the shared outgoing lane at the same tick.
    let a = place(&mut state_a, &mut vehicles, lane_a, 0, 1.0, 2);
    let b = place(&mut state_b, &mut vehicles, lane_b, 1, 1.0, 2);

    let granted = manager
        .check_request(&ctx, &map, lane_a, &state_a, &vehicles)
        .unwrap();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].vehicle, a);
    for res in granted {
        manager
            .confirm_reservation(&ctx, res, &mut state_a, &mut vehicles)
            .unwrap();
    }

    // The rival from the other lane must share exit tiles with the winner;
    // its rollout dies and commits nothing.
    let granted = manager
        .check_request(&ctx, &map, lane_b, &state_b, &vehicles)
        .unwrap();
    assert!(granted.is_empty());
    assert!(!vehicles[&b].has_reservation);
    assert!(state_b.latest_scheduled_exit.is_none());
    for layer in manager.tiling().layers() {
        for id in 0..layer.len() {
            assert!(!layer.tile(id).reserved_by(b));
        }
    }
}

#[test]
fn follower_eventually_granted_after_leader() {
    let settings = Settings::default();
    let map = turn_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    let mut state = RoadLaneState::new();
    let mut vehicles = BTreeMap::new();
    let lane = map.incoming_road_lanes()[0];

    let a = place(&mut state, &mut vehicles, lane, 0, 1.0, 1);
    // The follower sits a full buffered car length behind the leader.
    let f = settings.length_buffer_factor;
    let spacing =
        (1.0 + 2.0 * f) * vehicles[&a].length.inner_meters() / lane.length().inner_meters();
    let rear_a = state.queue.progress[&a].rear.unwrap();
    let b = place(&mut state, &mut vehicles, lane, 1, rear_a - spacing, 1);

    let ctx = Ctx::new(&settings, 0);
    let granted = manager
        .check_request(&ctx, &map, lane, &state, &vehicles)
        .unwrap();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].vehicle, a);
    let leader_exit = granted[0].its_exit;
    for res in granted {
        manager
            .confirm_reservation(&ctx, res, &mut state, &mut vehicles)
            .unwrap();
    }

    // The follower keeps asking as time passes; once the leader's holds age
    // out of its path, it gets a reservation ordered after the leader's.
    let mut follower_exit = None;
    for now in 1..=60 {
        let ctx = Ctx::new(&settings, now);
        manager.tick(&ctx);
        let granted = manager
            .check_request(&ctx, &map, lane, &state, &vehicles)
            .unwrap();
        if let Some(res) = granted.into_iter().next() {
            assert_eq!(res.vehicle, b);
            follower_exit = Some(res.its_exit);
            manager
                .confirm_reservation(&ctx, res, &mut state, &mut vehicles)
                .unwrap();
            break;
        }
    }
    let follower_exit = follower_exit.expect("follower never granted");
    assert!(follower_exit.t > leader_exit.t);
    assert_eq!(state.latest_scheduled_exit, Some(follower_exit));
}

#[test]
fn issued_permission_removes_candidate() {
    let settings = Settings::default();
    let map = turn_map();
    let mut manager = IntersectionManager::new(&map, &settings);
    let mut state = RoadLaneState::new();
    let mut vehicles = BTreeMap::new();
    let lane = map.incoming_road_lanes()[0];

    let a = place(&mut state, &mut vehicles, lane, 0, 1.0, 1);
    let _b = place(&mut state, &mut vehicles, lane, 1, 0.8, 1);
    assert_eq!(
        state.first_without_permission(lane, &vehicles),
        Some((0, 2)),
        "both vehicles start as candidates"
    );

    // Warmup: the first vehicle was already arranged to cross.
    let exit = sim::ScheduledExit {
        vehicle: a,
        section: VehicleSection::Rear,
        t: 4,
        velocity: Speed::meters_per_second(2.0),
    };
    manager
        .issue_permission(a, &mut state, &mut vehicles, exit)
        .unwrap();
    assert!(vehicles[&a].permission_to_enter_intersection);
    assert!(!vehicles[&a].has_reservation);
    assert_eq!(state.latest_scheduled_exit, Some(exit));
    // The candidate scan now starts at the second vehicle.
    assert_eq!(state.first_without_permission(lane, &vehicles), Some((1, 2)));
}

#[test]
fn full_sim_smoke() {
    let settings = Settings {
        vehicles_per_minute: 20.0,
        ..Settings::default()
    };
    let mut sim = Sim::new(turn_map(), settings).unwrap();
    for _ in 0..300 {
        sim.step().unwrap();
        sim.check_invariants().unwrap();
    }
    assert!(sim.vehicles_spawned() > 0);
    assert!(sim.reservations_granted() > 0);
    assert!(sim.trips_completed() > 0);
}
