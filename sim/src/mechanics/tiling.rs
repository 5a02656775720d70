use crate::mechanics::{TileIndex, TileLayer, TileSet};
use crate::{Ctx, Settings, Timestep, Vehicle, VehicleID};
use anyhow::{ensure, Result};
use geom::{HashablePt2D, Pt2D, Speed};
use map_model::{IntersectionLane, Map};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// The rolling 3D (x, y, t) grid over the conflict area. Owns every tile;
/// reservations refer to tiles by (timestep, index) only. The window starts
/// at `now + 1` and extends lazily as far forward as requests need.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tiling {
    tile_width: f64,
    origin: Pt2D,
    x_tile_count: usize,
    y_tile_count: usize,
    rejection_threshold: f64,
    tiles: VecDeque<TileLayer>,
    first_layer_t: Timestep,
    /// The in-range tile under each intersection entry and exit coord.
    buffer_tile_loc: BTreeMap<HashablePt2D, (usize, usize)>,
}

impl Tiling {
    pub fn new(
        min: Pt2D,
        max: Pt2D,
        io_coords: Vec<Pt2D>,
        tile_width: f64,
        rejection_threshold: f64,
    ) -> Tiling {
        assert!(tile_width > 0.0, "tile width must be positive");
        let x_tile_count = ((max.x() - min.x()) / tile_width).ceil() as usize;
        let y_tile_count = ((max.y() - min.y()) / tile_width).ceil() as usize;
        let mut tiling = Tiling {
            tile_width,
            origin: min,
            x_tile_count,
            y_tile_count,
            rejection_threshold,
            tiles: VecDeque::new(),
            first_layer_t: 1,
            buffer_tile_loc: BTreeMap::new(),
        };
        for coord in io_coords {
            let loc = tiling.io_coord_to_tile_xy(coord);
            tiling.buffer_tile_loc.insert(coord.to_hashable(), loc);
        }
        tiling
    }

    pub fn for_map(map: &Map, settings: &Settings) -> Tiling {
        let (min, max) = map.conflict_bounds();
        let mut io_coords = Vec::new();
        for il in map.all_intersection_lanes() {
            io_coords.push(il.entry());
            io_coords.push(il.exit());
        }
        Tiling::new(
            min,
            max,
            io_coords,
            settings.tile_width,
            settings.rejection_threshold,
        )
    }

    pub fn tile_width(&self) -> f64 {
        self.tile_width
    }

    pub fn origin(&self) -> Pt2D {
        self.origin
    }

    pub fn x_tile_count(&self) -> usize {
        self.x_tile_count
    }

    pub fn y_tile_count(&self) -> usize {
        self.y_tile_count
    }

    pub fn buffer_tile_loc(&self, coord: Pt2D) -> Option<(usize, usize)> {
        self.buffer_tile_loc.get(&coord.to_hashable()).copied()
    }

    pub fn tile_loc_to_id(&self, loc: (usize, usize)) -> TileIndex {
        loc.0 + loc.1 * self.x_tile_count
    }

    /// The tile under an entry/exit coord. Coords on the far boundary of the
    /// extent belong to the last row or column.
    pub fn io_coord_to_tile_xy(&self, coord: Pt2D) -> (usize, usize) {
        let tx = ((coord.x() - self.origin.x()) / self.tile_width).floor() as i64;
        let ty = ((coord.y() - self.origin.y()) / self.tile_width).floor() as i64;
        (
            tx.clamp(0, self.x_tile_count as i64 - 1) as usize,
            ty.clamp(0, self.y_tile_count as i64 - 1) as usize,
        )
    }

    // Rolling window maintenance

    pub fn layers(&self) -> &VecDeque<TileLayer> {
        &self.tiles
    }

    pub fn layer(&self, t: Timestep) -> Option<&TileLayer> {
        if t < self.first_layer_t {
            return None;
        }
        self.tiles.get((t - self.first_layer_t) as usize)
    }

    pub fn layer_mut(&mut self, t: Timestep) -> Option<&mut TileLayer> {
        if t < self.first_layer_t {
            return None;
        }
        self.tiles.get_mut((t - self.first_layer_t) as usize)
    }

    /// Extends the back of the window by one layer.
    pub fn add_new_layer(&mut self) {
        let t = self.first_layer_t + self.tiles.len() as Timestep;
        self.tiles.push_back(TileLayer::new(
            t,
            self.x_tile_count * self.y_tile_count,
            self.rejection_threshold,
        ));
    }

    fn ensure_layer(&mut self, t: Timestep) {
        debug_assert!(t >= self.first_layer_t);
        while self.first_layer_t + (self.tiles.len() as Timestep) <= t {
            self.add_new_layer();
        }
    }

    /// Called once per tick, after `now` has advanced: the layer whose time
    /// just passed falls off the front.
    pub fn handle_new_timestep(&mut self, ctx: &Ctx) {
        while self
            .tiles
            .front()
            .map(|layer| layer.t <= ctx.now)
            .unwrap_or(false)
        {
            self.tiles.pop_front();
        }
        self.first_layer_t = ctx.now + 1;
        if let Some(front) = self.tiles.front() {
            debug_assert_eq!(front.t, self.first_layer_t);
        }
    }

    /// How far forward an exit buffer must reach: enough timesteps for any
    /// follower to brake from `v` to a stop at the guaranteed deceleration,
    /// floored at 18.
    pub fn exit_res_timesteps_forward(v: Speed, ctx: &Ctx) -> Timestep {
        let seconds = v / ctx.settings.min_acceleration;
        let steps = (seconds / ctx.settings.timestep_length).ceil() as Timestep;
        (2 * steps + 2).max(18)
    }

    // Admission

    /// The set of tiles a vehicle's footprint covers at virtual time `t`,
    /// with per-tile probability of use. None if any covered tile refuses
    /// the vehicle. `t` must be in the future.
    pub fn pos_to_tiles(
        &mut self,
        ctx: &Ctx,
        t: Timestep,
        vehicle: &Vehicle,
    ) -> Result<Option<BTreeMap<TileIndex, f64>>> {
        ensure!(
            t > ctx.now,
            "can't reserve tiles at t={} when now={}",
            t,
            ctx.now
        );
        let corners = vehicle.footprint(ctx.settings.length_buffer_factor);
        let (y_min, x_mins, x_maxes) = self.outline_to_tile_range(&corners);
        self.ensure_layer(t);

        let mut covered: Vec<TileIndex> = Vec::new();
        for (i, (lo, hi)) in x_mins.iter().zip(x_maxes.iter()).enumerate() {
            let y = (y_min + i as i64) as usize;
            for x in *lo..=*hi {
                covered.push(self.tile_loc_to_id((x as usize, y)));
            }
        }

        let layer = self.layer(t).unwrap();
        if covered
            .iter()
            .any(|id| !layer.tile(*id).will_reservation_work(vehicle.id, 1.0))
        {
            return Ok(None);
        }
        let layer = self.layer_mut(t).unwrap();
        let mut result = BTreeMap::new();
        for id in covered {
            layer.tile_mut(id).mark(vehicle.id, 1.0);
            result.insert(id, 1.0);
        }
        Ok(Some(result))
    }

    /// Reserves a short buffer window on the tile under the entry (or exit)
    /// coord, keeping the vehicle physically continuous across the
    /// road-intersection handoff. Entry buffers cover the single tick before
    /// `t`; exit buffers cover `steps_forward` ticks after it, defaulting to
    /// the braking window for the vehicle's speed. None if contested.
    pub fn io_tile_buffer(
        &mut self,
        ctx: &Ctx,
        il: &IntersectionLane,
        t: Timestep,
        vehicle: &Vehicle,
        is_entry: bool,
        steps_forward: Option<Timestep>,
    ) -> Result<Option<TileSet>> {
        ensure!(
            t > ctx.now,
            "can't buffer tiles at t={} when now={}",
            t,
            ctx.now
        );
        let coord = if is_entry { il.entry() } else { il.exit() };
        let loc = self
            .buffer_tile_loc(coord)
            .unwrap_or_else(|| self.io_coord_to_tile_xy(coord));
        let id = self.tile_loc_to_id(loc);

        let window: Vec<Timestep> = if is_entry {
            let k = steps_forward.unwrap_or(1);
            let lo = (ctx.now + 1).max(t.saturating_sub(k));
            (lo..t).collect()
        } else {
            let k = steps_forward
                .unwrap_or_else(|| Tiling::exit_res_timesteps_forward(vehicle.velocity, ctx));
            (t + 1..=t + k).collect()
        };
        if window.is_empty() {
            return Ok(Some(TileSet::new()));
        }

        for t_prime in &window {
            self.ensure_layer(*t_prime);
            let tile = self.layer(*t_prime).unwrap().tile(id);
            if !tile.will_reservation_work(vehicle.id, 1.0) {
                return Ok(None);
            }
        }
        let mut result = TileSet::new();
        for t_prime in window {
            self.layer_mut(t_prime)
                .unwrap()
                .tile_mut(id)
                .mark(vehicle.id, 1.0);
            result.insert(t_prime, vec![(id, 1.0)].into_iter().collect());
        }
        Ok(Some(result))
    }

    /// Do all of these cells still admit the vehicle? Pure check; extends the
    /// window lazily.
    pub fn tiles_will_work(&mut self, vehicle: VehicleID, tiles: &TileSet) -> bool {
        for (t, cells) in tiles {
            if *t < self.first_layer_t {
                return false;
            }
            self.ensure_layer(*t);
            let layer = self.layer(*t).unwrap();
            for (id, p) in cells {
                if !layer.tile(*id).will_reservation_work(vehicle, *p) {
                    return false;
                }
            }
        }
        true
    }

    /// Atomically commit every cell of a reservation into the live grid.
    pub fn confirm_tiles(&mut self, vehicle: VehicleID, tiles: &TileSet, force: bool) -> Result<()> {
        for (t, cells) in tiles {
            ensure!(
                *t >= self.first_layer_t,
                "confirming tiles at t={} which already passed",
                t
            );
            self.ensure_layer(*t);
            let layer = self.layer_mut(*t).unwrap();
            for (id, p) in cells {
                layer.tile_mut(*id).confirm_reservation(vehicle, *p, force)?;
            }
        }
        Ok(())
    }

    /// Erase every reference to the vehicle from cells still in the window.
    pub fn clear_vehicle_tiles(&mut self, vehicle: VehicleID, tiles: &TileSet) {
        for (t, cells) in tiles {
            if let Some(layer) = self.layer_mut(*t) {
                for id in cells.keys() {
                    layer.tile_mut(*id).clear_vehicle(vehicle);
                }
            }
        }
    }

    pub fn remove_marks(&mut self, vehicle: VehicleID, tiles: &TileSet) {
        for (t, cells) in tiles {
            if let Some(layer) = self.layer_mut(*t) {
                for id in cells.keys() {
                    layer.tile_mut(*id).remove_mark(vehicle);
                }
            }
        }
    }

    // Rasterisation. All of this works in tile space: world coords shifted
    // by the origin and scaled by the tile width.

    fn to_tile_space(&self, pt: Pt2D) -> (f64, f64) {
        (
            (pt.x() - self.origin.x()) / self.tile_width,
            (pt.y() - self.origin.y()) / self.tile_width,
        )
    }

    /// Walks a segment and emits the tile-column extrema for each row it
    /// crosses: upward edges record per-row minima, downward edges maxima,
    /// horizontal and vertical edges both. Returns (bottom row, mins, maxes)
    /// with the lists indexed from the bottom row upward.
    pub(crate) fn line_to_tile_ranges(
        &self,
        start: Pt2D,
        end: Pt2D,
    ) -> (i64, Vec<i64>, Vec<i64>) {
        let (sx, sy) = self.to_tile_space(start);
        let (ex, ey) = self.to_tile_space(end);

        if is_close(sy, ey) {
            let row = tile_at(sy.min(ey));
            return (row, vec![tile_at(sx.min(ex))], vec![tile_at(sx.max(ex))]);
        }
        if is_close(sx, ex) {
            let r0 = tile_at(sy.min(ey));
            let r1 = tile_at(sy.max(ey));
            let col = tile_at(sx);
            let n = (r1 - r0 + 1) as usize;
            return (r0, vec![col; n], vec![col; n]);
        }

        let dxdy = (ex - sx) / (ey - sy);
        let x_at = |y: f64| sx + (y - sy) * dxdy;

        if ey > sy {
            // Upward: the minimum x within each row bounds the polygon's left
            // side.
            let r0 = tile_at(sy);
            let r1 = tile_at(ey);
            let mut mins = Vec::with_capacity((r1 - r0 + 1) as usize);
            if ex > sx {
                // Up-right: the min sits at each row's bottom edge.
                mins.push(tile_at(sx));
                for r in (r0 + 1)..=r1 {
                    mins.push(tile_below(x_at(r as f64)));
                }
            } else {
                // Up-left: the min sits at each row's top edge.
                for r in r0..r1 {
                    mins.push(tile_at(x_at((r + 1) as f64)));
                }
                mins.push(tile_at(ex));
            }
            (r0, mins, Vec::new())
        } else {
            // Downward: the maximum x within each row bounds the right side.
            let r0 = tile_at(ey);
            let r1 = tile_at(sy);
            let mut maxes = Vec::with_capacity((r1 - r0 + 1) as usize);
            if ex > sx {
                // Down-right: the max sits at each row's bottom edge.
                for r in r0..=r1 {
                    maxes.push(tile_at(x_at((r as f64).max(ey))));
                }
            } else {
                // Down-left: the max sits at each row's top edge.
                for r in r0..r1 {
                    maxes.push(tile_below(x_at((r + 1) as f64)));
                }
                maxes.push(tile_at(sx));
            }
            (r0, Vec::new(), maxes)
        }
    }

    /// Rasterises a convex outline: per-row min of all edge minima, max of
    /// all maxima, clipped to the extent.
    pub(crate) fn outline_to_tile_range(&self, corners: &[Pt2D]) -> (i64, Vec<i64>, Vec<i64>) {
        let mut row_min: BTreeMap<i64, i64> = BTreeMap::new();
        let mut row_max: BTreeMap<i64, i64> = BTreeMap::new();
        for i in 0..corners.len() {
            let (y0, mins, maxes) =
                self.line_to_tile_ranges(corners[i], corners[(i + 1) % corners.len()]);
            for (j, v) in mins.into_iter().enumerate() {
                let r = y0 + j as i64;
                row_min
                    .entry(r)
                    .and_modify(|m| *m = (*m).min(v))
                    .or_insert(v);
            }
            for (j, v) in maxes.into_iter().enumerate() {
                let r = y0 + j as i64;
                row_max
                    .entry(r)
                    .and_modify(|m| *m = (*m).max(v))
                    .or_insert(v);
            }
        }

        let lo = match (row_min.keys().next(), row_max.keys().next()) {
            (Some(a), Some(b)) => *a.min(b),
            (Some(a), None) => *a,
            (None, Some(b)) => *b,
            (None, None) => {
                return (0, Vec::new(), Vec::new());
            }
        };
        let hi = *row_min
            .keys()
            .next_back()
            .unwrap_or(&lo)
            .max(row_max.keys().next_back().unwrap_or(&lo));

        let mut mins = Vec::new();
        let mut maxes = Vec::new();
        for r in lo..=hi {
            let m = row_min.get(&r).or_else(|| row_max.get(&r)).unwrap();
            let x = row_max.get(&r).or_else(|| row_min.get(&r)).unwrap();
            mins.push(*m);
            maxes.push(*x);
        }
        self.clip_tile_range(lo, mins, maxes)
    }

    /// Intersects row ranges with the tiling extent. Rows that clamp to
    /// nothing are trimmed from the ends; the returned base row stays at the
    /// clipped bottom even when nothing survives.
    pub(crate) fn clip_tile_range(
        &self,
        mut y0: i64,
        mut mins: Vec<i64>,
        mut maxes: Vec<i64>,
    ) -> (i64, Vec<i64>, Vec<i64>) {
        if y0 < 0 {
            let cut = (-y0).min(mins.len() as i64) as usize;
            mins.drain(..cut);
            maxes.drain(..cut);
            y0 = 0;
        }
        if y0 >= self.y_tile_count as i64 {
            y0 = self.y_tile_count as i64 - 1;
            mins.clear();
            maxes.clear();
        }
        let overhang = y0 + mins.len() as i64 - self.y_tile_count as i64;
        if overhang > 0 {
            mins.truncate(mins.len() - overhang as usize);
            maxes.truncate(maxes.len() - overhang as usize);
        }

        for m in &mut mins {
            *m = (*m).max(0);
        }
        for m in &mut maxes {
            *m = (*m).min(self.x_tile_count as i64 - 1);
        }

        while !mins.is_empty() && mins.last().unwrap() > maxes.last().unwrap() {
            mins.pop();
            maxes.pop();
        }
        let base = y0;
        while !mins.is_empty() && mins[0] > maxes[0] {
            mins.remove(0);
            maxes.remove(0);
            y0 += 1;
        }
        if mins.is_empty() {
            y0 = base;
        }
        (y0, mins, maxes)
    }
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// The tile containing x. Boundary points belong to the higher tile
/// (closed-at-low).
fn tile_at(x: f64) -> i64 {
    let r = x.round();
    if is_close(x, r) {
        r as i64
    } else {
        x.floor() as i64
    }
}

/// Like `tile_at`, except a crossing that lands exactly on a boundary while
/// approaching from the low side stays in the lower tile.
fn tile_below(x: f64) -> i64 {
    let r = x.round();
    if is_close(x, r) {
        r as i64 - 1
    } else {
        x.floor() as i64
    }
}
