//! The discrete motion model. Speeds update first each tick; a vehicle then
//! covers `v * dt + a * dt^2` within the tick. Reservations assume every
//! vehicle manages at least `min_acceleration`.

use crate::Timestep;
use geom::{Acceleration, Distance, Duration, Speed, EPSILON_DIST};

/// Distance covered in one tick after the speed update has been applied.
pub fn dist_covered_in_tick(v: Speed, a: Acceleration, dt: Duration) -> Distance {
    v * dt + (a * dt) * dt
}

/// The new speed after accelerating for one tick, clamped to [0, limit].
pub fn speed_update(v: Speed, a: Acceleration, dt: Duration, limit: Speed) -> Speed {
    let v_new = v + a * dt;
    if v_new < Speed::ZERO {
        Speed::ZERO
    } else {
        v_new.min(limit)
    }
}

/// Acceleration choice when there's nothing ahead: floor it, hold at the
/// limit, or brake back down to it.
pub fn accel_update_uncontested(
    v: Speed,
    limit: Speed,
    max_accel: Acceleration,
    max_braking: Acceleration,
) -> Acceleration {
    if v > limit {
        max_braking
    } else if v == limit {
        Acceleration::ZERO
    } else {
        max_accel
    }
}

/// Worst-case distance to stop from `v` under `braking` (negative).
pub fn stopping_distance(v: Speed, braking: Acceleration) -> Distance {
    let b = -braking.inner_meters_per_second_squared();
    if b <= 0.0 {
        panic!("Bad braking {}", braking);
    }
    Distance::meters(
        v.inner_meters_per_second() * v.inner_meters_per_second() / (2.0 * b),
    )
}

/// Acceleration choice with an obstacle `gap` ahead (a stopped preceding
/// vehicle's worst case, or the intersection line). Accelerate only if we
/// could still stop in time afterwards.
pub fn accel_update_following(
    v: Speed,
    gap: Distance,
    dt: Duration,
    limit: Speed,
    max_accel: Acceleration,
    max_braking: Acceleration,
) -> Acceleration {
    let a_free = accel_update_uncontested(v, limit, max_accel, max_braking);
    if a_free < Acceleration::ZERO {
        // Over the limit; braking regardless of closeness.
        return a_free;
    }

    let v_if_accel = speed_update(v, a_free, dt, limit);
    let needed_if_accel =
        dist_covered_in_tick(v_if_accel, a_free, dt) + stopping_distance(v_if_accel, max_braking);
    if needed_if_accel <= gap {
        return a_free;
    }
    let needed_if_hold =
        dist_covered_in_tick(v, Acceleration::ZERO, dt) + stopping_distance(v, max_braking);
    if needed_if_hold <= gap {
        Acceleration::ZERO
    } else {
        max_braking
    }
}

/// The fewest whole timesteps for a vehicle to cover `dist` at constant
/// `accel` capped by `limit`, and its speed at that point. Iterates the
/// exact per-tick recurrence the stepper uses, so a live vehicle replaying
/// this profile arrives on the predicted tick, not a rounding ahead of it.
pub fn timesteps_to_cover(
    dist: Distance,
    v0: Speed,
    accel: Acceleration,
    limit: Speed,
    dt: Duration,
) -> (Timestep, Speed) {
    if dist <= EPSILON_DIST {
        return (0, v0);
    }
    // Predicting a crossing one tick early is harmless (the live vehicle
    // arrives no sooner than scheduled); predicting late is not.
    let target = dist - EPSILON_DIST;
    let mut v = v0;
    let mut covered = Distance::ZERO;
    let mut steps: Timestep = 0;
    while covered < target {
        if v == limit {
            // Constant per-tick distance from here; finish in closed form.
            let per_tick = dist_covered_in_tick(v, accel, dt);
            let remaining = ((target - covered) / per_tick).ceil() as Timestep;
            return (steps + remaining, v);
        }
        v = speed_update(v, accel, dt, limit);
        let step_dist = dist_covered_in_tick(v, accel, dt);
        if step_dist <= Distance::ZERO {
            panic!(
                "can't cover {} from {} accelerating at {}",
                dist, v0, accel
            );
        }
        covered += step_dist;
        steps += 1;
    }
    (steps, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standing_start() {
        // From rest at a = 1.875, dt = 1: ticks cover 3.75, 5.625, 7.5, ...
        let a = Acceleration::meters_per_second_squared(1.875);
        let dt = Duration::seconds(1.0);
        let limit = Speed::meters_per_second(30.0);
        let (steps, v) = timesteps_to_cover(Distance::meters(7.5), Speed::ZERO, a, limit, dt);
        assert_eq!(steps, 2);
        assert_eq!(v, Speed::meters_per_second(2.0 * 1.875));

        let (steps, _) = timesteps_to_cover(Distance::meters(9.4), Speed::ZERO, a, limit, dt);
        assert_eq!(steps, 3);
    }

    #[test]
    fn prediction_matches_stepping() {
        // The returned tick count is exactly when discrete stepping crosses.
        let a = Acceleration::meters_per_second_squared(1.875);
        let dt = Duration::seconds(1.0);
        let limit = Speed::meters_per_second(8.0);
        let target = Distance::meters(63.0);
        let (steps, v_pred) = timesteps_to_cover(target, Speed::ZERO, a, limit, dt);

        let mut v = Speed::ZERO;
        let mut covered = Distance::ZERO;
        let mut n = 0;
        while covered < target {
            v = speed_update(v, a, dt, limit);
            covered += dist_covered_in_tick(v, a, dt);
            n += 1;
        }
        assert_eq!(steps, n);
        assert_eq!(v_pred, v);
    }

    #[test]
    fn following_brakes_when_close() {
        let dt = Duration::seconds(1.0);
        let limit = Speed::meters_per_second(30.0);
        let a = accel_update_following(
            Speed::meters_per_second(10.0),
            Distance::meters(2.0),
            dt,
            limit,
            Acceleration::meters_per_second_squared(3.0),
            Acceleration::meters_per_second_squared(-2.7),
        );
        assert_eq!(a, Acceleration::meters_per_second_squared(-2.7));
    }

    #[test]
    fn following_accelerates_when_clear() {
        let dt = Duration::seconds(1.0);
        let limit = Speed::meters_per_second(30.0);
        let a = accel_update_following(
            Speed::ZERO,
            Distance::meters(500.0),
            dt,
            limit,
            Acceleration::meters_per_second_squared(3.0),
            Acceleration::meters_per_second_squared(-2.7),
        );
        assert_eq!(a, Acceleration::meters_per_second_squared(3.0));
    }
}
