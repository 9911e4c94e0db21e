//! # Hydrology Synthesis
//!
//! Rivers that flow downhill, branch into tributaries and end in the sea, in
//! a lake, or wherever the terrain stops descending.
//!
//! ## River Lifecycle
//!
//! ```text
//! Seeking source ──► Flowing ──┬──► reached ocean / lake
//!                              ├──► evaporated (seeded draw)
//!                              ├──► local minimum (may carve a terminal lake)
//!                              ├──► loop detected
//!                              ├──► max length
//!                              └──► confluence (joined another river)
//! ```
//!
//! ## Concurrency
//!
//! Every river system is traced independently from read-only elevation and
//! terrain, with its own RNG stream derived from the seed and the river
//! index. A sequential join afterwards walks the systems in source order and
//! cuts each path where it meets a river kept before it, so two systems never
//! cross. The output does not depend on which worker traced which river.

use std::collections::HashSet;

use mapforge_core::{Grid, WorkerPool, DEFAULT_CHUNK_2D};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::biome::Terrain;
use crate::error::{MapError, MapResult};
use crate::lakes::LakeCarver;
use crate::math::mix64;
use crate::noise::{purpose, WorldSeed};

/// River and lake parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiverParams {
    /// Number of river sources; 0 picks `width * height * 0.0005`.
    pub count: u32,
    /// Lowest elevation a source may have.
    pub min_source_height: f32,
    /// Highest elevation a source may have.
    pub max_source_height: f32,
    /// Main rivers shorter than this are dropped with their tributaries.
    pub min_river_length: u32,
    /// Most tiles a main river may cover.
    pub max_river_length: u32,
    /// Whether tributaries branch off long rivers.
    pub tributaries: bool,
    /// Smallest branch angle in degrees.
    pub min_tributary_angle: f32,
    /// Largest branch angle in degrees.
    pub max_tributary_angle: f32,
    /// A branch may start every this many tiles.
    pub tributary_interval: u32,
    /// A river must be this long before it branches.
    pub tributary_min_length: u32,
    /// Most tiles a tributary may cover.
    pub tributary_max_length: u32,
    /// Branching levels, counting the main river.
    pub max_branch_depth: u32,
    /// Chance per tile that a river dries up.
    pub evaporation_chance: f32,
    /// How far uphill a step may go to cross a plateau.
    pub flat_tolerance: f32,
    /// Chance that a stalled main river ends in a lake.
    pub terminal_lake_chance: f32,
    /// A stalled river must be longer than this to end in a lake.
    pub terminal_lake_min_length: u32,
    /// Whether standalone lakes fill terrain depressions.
    pub generate_lakes: bool,
    /// Chance that a depression becomes a lake.
    pub lake_probability: f32,
    /// Most depression lakes per map.
    pub max_lakes: u32,
    /// Smallest lake radius in tiles.
    pub min_lake_size: f32,
    /// Largest lake radius in tiles.
    pub max_lake_size: f32,
}

impl Default for RiverParams {
    fn default() -> Self {
        Self {
            count: 0,
            min_source_height: 0.6,
            max_source_height: 0.9,
            min_river_length: 10,
            max_river_length: 100,
            tributaries: true,
            min_tributary_angle: 30.0,
            max_tributary_angle: 60.0,
            tributary_interval: 30,
            tributary_min_length: 20,
            tributary_max_length: 24,
            max_branch_depth: 3,
            evaporation_chance: 0.01,
            flat_tolerance: 0.01,
            terminal_lake_chance: 0.3,
            terminal_lake_min_length: 10,
            generate_lakes: true,
            lake_probability: 0.3,
            max_lakes: 16,
            min_lake_size: 3.0,
            max_lake_size: 20.0,
        }
    }
}

impl RiverParams {
    /// Number of sources to seed on a `width x height` map.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn river_count(&self, width: u32, height: u32) -> usize {
        if self.count > 0 {
            return self.count as usize;
        }
        let tiles = f64::from(width) * f64::from(height);
        ((tiles * 0.0005) as usize).max(1)
    }

    /// Rejects parameters that cannot be traced.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> MapResult<()> {
        let unit = |v: f32| (0.0..=1.0).contains(&v);
        if !(unit(self.min_source_height) && unit(self.max_source_height))
            || self.min_source_height > self.max_source_height
        {
            return Err(MapError::invalid("rivers.source_height", "needs 0 <= min <= max <= 1"));
        }
        if self.max_river_length == 0 || self.tributary_interval == 0 {
            return Err(MapError::invalid("rivers.length", "lengths and intervals must be positive"));
        }
        if !(self.min_tributary_angle.is_finite() && self.max_tributary_angle.is_finite())
            || self.min_tributary_angle > self.max_tributary_angle
        {
            return Err(MapError::invalid("rivers.tributary_angle", "needs min <= max"));
        }
        for (name, p) in [
            ("rivers.evaporation_chance", self.evaporation_chance),
            ("rivers.terminal_lake_chance", self.terminal_lake_chance),
            ("rivers.lake_probability", self.lake_probability),
        ] {
            if !unit(p) {
                return Err(MapError::invalid(name, "probability must be in [0, 1]"));
            }
        }
        if !(self.flat_tolerance.is_finite() && self.flat_tolerance >= 0.0) {
            return Err(MapError::invalid("rivers.flat_tolerance", "must be zero or positive"));
        }
        if !(self.min_lake_size.is_finite() && self.min_lake_size > 0.0 && self.min_lake_size <= self.max_lake_size) {
            return Err(MapError::invalid("rivers.lake_size", "needs 0 < min <= max"));
        }
        Ok(())
    }
}

/// Walk state carried on the explicit stack.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiverPoint {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Elevation at `(x, y)`.
    pub elevation: f32,
    /// Whether this walk is a tributary.
    pub is_tributary: bool,
    /// Steps taken from the walk's start.
    pub depth: u32,
    /// 0 for a main river, parent level + 1 for a tributary.
    pub branch_level: u32,
}

/// Why a walk stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Reached ocean or sea level.
    Ocean,
    /// Ran into a lake.
    Lake,
    /// Dried up.
    Evaporated,
    /// No neighbor was low enough to continue.
    LocalMinimum,
    /// The next tile had already been visited by this walk.
    Loop,
    /// Hit the length limit.
    MaxLength,
    /// Met an earlier river, or a tributary touched its own system or the
    /// ocean.
    Confluence,
}

/// Tiles of one walk, from its start downstream.
#[derive(Clone, Debug, PartialEq)]
pub struct RiverPath {
    /// Row-major tile indices in flow order.
    pub tiles: Vec<usize>,
    /// Why the walk stopped.
    pub termination: Termination,
    /// 0 for the main river.
    pub branch_level: u32,
}

/// A main river and its tributaries.
#[derive(Clone, Debug, PartialEq)]
pub struct RiverSystem {
    /// Index of the source tile.
    pub source: usize,
    /// Main river first, then tributaries in the order they were traced.
    pub paths: Vec<RiverPath>,
    /// Where a terminal lake should be carved.
    pub terminal_lake: Option<usize>,
}

impl RiverSystem {
    /// Length of the main river.
    #[must_use]
    pub fn main_length(&self) -> usize {
        self.paths.first().map_or(0, |p| p.tiles.len())
    }

    /// Every tile of every path.
    pub fn tiles(&self) -> impl Iterator<Item = usize> + '_ {
        self.paths.iter().flat_map(|p| p.tiles.iter().copied())
    }
}

/// Traced rivers plus the merged set of river tiles.
#[derive(Clone, Debug, Default)]
pub struct RiverNetwork {
    /// Kept river systems, in source order.
    pub systems: Vec<RiverSystem>,
    /// Sorted tile indices marked by any kept system.
    pub river_tiles: Vec<usize>,
}

/// Counters reported by [`synthesize`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HydrologyReport {
    /// Source candidates found by the scan.
    pub candidates: usize,
    /// River systems kept.
    pub rivers: usize,
    /// Tributary paths kept.
    pub tributaries: usize,
    /// Tiles turned into river.
    pub river_tiles: usize,
    /// Lakes carved (terminal and depression).
    pub lakes: usize,
}

/// Read-only inputs shared by every walk.
struct WalkContext<'a> {
    elevation: &'a Grid<f32>,
    terrain: &'a Grid<Terrain>,
    params: &'a RiverParams,
    sea_level: f32,
}

impl WalkContext<'_> {
    fn point(&self, index: usize, is_tributary: bool, depth: u32, branch_level: u32) -> RiverPoint {
        let (x, y) = self.elevation.coords(index);
        RiverPoint {
            x,
            y,
            elevation: self.elevation[index],
            is_tributary,
            depth,
            branch_level,
        }
    }

    /// Whether any neighbor belongs to the system, is river on the map or is
    /// ocean.
    fn touches_water(&self, point: &RiverPoint, system: &HashSet<usize>) -> bool {
        self.terrain.neighbors8(point.x, point.y).any(|(nx, ny)| {
            let n = self.terrain.index(nx, ny);
            system.contains(&n) || self.terrain[n] == Terrain::River || self.terrain[n].is_ocean()
        })
    }

    /// Steepest strictly-lower neighbor, else the lowest near-flat unvisited one.
    fn next_tile(&self, point: &RiverPoint, visited: &HashSet<usize>) -> Option<usize> {
        let neighbors = || {
            self.elevation
                .neighbors8(point.x, point.y)
                .map(|(nx, ny)| self.elevation.index(nx, ny))
        };
        let lowest = |candidates: &mut dyn Iterator<Item = usize>| {
            candidates.fold(None, |best: Option<usize>, n| match best {
                Some(b) if self.elevation[b] <= self.elevation[n] => Some(b),
                _ => Some(n),
            })
        };

        let descent = lowest(&mut neighbors().filter(|&n| self.elevation[n] < point.elevation));
        descent.or_else(|| {
            let ceiling = point.elevation + self.params.flat_tolerance;
            lowest(&mut neighbors().filter(|&n| self.elevation[n] <= ceiling && !visited.contains(&n)))
        })
    }

    /// Picks an upstream start point for a tributary, or `None`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn branch_start(
        &self,
        point: &RiverPoint,
        previous: Option<usize>,
        rng: &mut ChaCha8Rng,
        system: &HashSet<usize>,
    ) -> Option<usize> {
        let p = self.params;
        let angle = rng.gen_range(p.min_tributary_angle..=p.max_tributary_angle).to_radians();
        let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let distance: f32 = rng.gen_range(4.0..=8.0);

        // Upstream direction: from the current tile back toward the previous one.
        let (ux, uy) = previous.map_or((0.0, -1.0), |prev| {
            let (px, py) = self.elevation.coords(prev);
            let (dx, dy) = (px as f32 - point.x as f32, py as f32 - point.y as f32);
            let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
            (dx / len, dy / len)
        });
        let (sin, cos) = (angle * side).sin_cos();
        let (bx, by) = (ux * cos - uy * sin, ux * sin + uy * cos);

        let max_x = self.elevation.width().saturating_sub(2).max(1) as f32;
        let max_y = self.elevation.height().saturating_sub(2).max(1) as f32;
        let sx = (point.x as f32 + bx * distance).round().clamp(1.0, max_x) as u32;
        let sy = (point.y as f32 + by * distance).round().clamp(1.0, max_y) as u32;
        let start = self.elevation.index(sx, sy);

        let usable = self.terrain[start].is_land()
            && self.elevation[start] > point.elevation
            && !system.contains(&start);
        usable.then_some(start)
    }

    /// Follows one walk downstream, pushing any branches onto `stack`.
    fn walk(
        &self,
        start: RiverPoint,
        rng: &mut ChaCha8Rng,
        system: &mut HashSet<usize>,
        stack: &mut Vec<RiverPoint>,
        terminal_lake: &mut Option<usize>,
    ) -> RiverPath {
        let p = self.params;
        let max_length = if start.is_tributary {
            p.tributary_max_length
        } else {
            p.max_river_length
        };
        let mut visited = HashSet::new();
        let mut tiles = Vec::new();
        let mut previous: Option<usize> = None;
        let mut current = start;

        let termination = loop {
            let index = self.elevation.index(current.x, current.y);
            let terrain = self.terrain[index];
            if terrain == Terrain::Lake {
                break Termination::Lake;
            }
            if terrain.is_open_water() || current.elevation < self.sea_level {
                break Termination::Ocean;
            }
            if current.is_tributary && current.depth > 0 && self.touches_water(&current, system) {
                tiles.push(index);
                break Termination::Confluence;
            }

            tiles.push(index);
            visited.insert(index);

            if rng.gen::<f32>() < p.evaporation_chance {
                break Termination::Evaporated;
            }
            if current.depth + 1 >= max_length {
                break Termination::MaxLength;
            }

            let branch_due = p.tributaries
                && current.branch_level + 1 < p.max_branch_depth
                && current.depth >= p.tributary_min_length
                && current.depth % p.tributary_interval == 0;
            if branch_due {
                if let Some(branch) = self.branch_start(&current, previous, rng, system) {
                    stack.push(self.point(branch, true, 0, current.branch_level + 1));
                }
            }

            let Some(next) = self.next_tile(&current, &visited) else {
                let long_enough = tiles.len() > p.terminal_lake_min_length as usize;
                if !current.is_tributary && long_enough && rng.gen::<f32>() < p.terminal_lake_chance {
                    *terminal_lake = Some(index);
                }
                break Termination::LocalMinimum;
            };
            if visited.contains(&next) {
                break Termination::Loop;
            }

            previous = Some(index);
            current = self.point(next, current.is_tributary, current.depth + 1, current.branch_level);
        };

        system.extend(tiles.iter().copied());
        RiverPath {
            tiles,
            termination,
            branch_level: start.branch_level,
        }
    }

    /// Traces a main river and all of its tributaries with an explicit stack.
    fn trace_system(&self, source: usize, rng: &mut ChaCha8Rng) -> RiverSystem {
        let mut system = HashSet::new();
        let mut stack = vec![self.point(source, false, 0, 0)];
        let mut paths = Vec::new();
        let mut terminal_lake = None;

        while let Some(start) = stack.pop() {
            let path = self.walk(start, rng, &mut system, &mut stack, &mut terminal_lake);
            if !path.tiles.is_empty() {
                paths.push(path);
            }
        }

        RiverSystem {
            source,
            paths,
            terminal_lake,
        }
    }
}

/// Strict local maxima of `elevation` inside the source band, sorted.
fn find_sources(
    pool: &WorkerPool,
    elevation: &Grid<f32>,
    terrain: &Grid<Terrain>,
    params: &RiverParams,
) -> Vec<usize> {
    let (width, height) = (elevation.width(), elevation.height());
    let band = params.min_source_height..=params.max_source_height;
    let mut sources: Vec<usize> = pool
        .map_chunks_2d(width, height, DEFAULT_CHUNK_2D * 4, |rect| {
            rect.iter()
                .filter(|&(x, y)| !elevation.is_border(x, y))
                .filter_map(|(x, y)| {
                    let e = elevation.at(x, y);
                    let peak = band.contains(&e)
                        && terrain.at(x, y).is_land()
                        && elevation.neighbors8(x, y).all(|(nx, ny)| elevation.at(nx, ny) < e);
                    peak.then(|| elevation.index(x, y))
                })
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect();
    sources.sort_unstable();
    sources
}

/// Traces rivers on read-only inputs.
///
/// Sources are shuffled with a seeded RNG and capped to the river count, so
/// the selection does not depend on scan order. Systems whose main river is
/// shorter than `min_river_length` are dropped.
#[must_use]
pub fn trace_rivers(
    pool: &WorkerPool,
    elevation: &Grid<f32>,
    terrain: &Grid<Terrain>,
    params: &RiverParams,
    sea_level: f32,
    seed: WorldSeed,
) -> (RiverNetwork, usize) {
    let river_seed = seed.derive(purpose::RIVERS).value();
    let mut sources = find_sources(pool, elevation, terrain, params);
    let candidates = sources.len();
    sources.shuffle(&mut ChaCha8Rng::seed_from_u64(river_seed));
    sources.truncate(params.river_count(elevation.width(), elevation.height()));

    let ctx = WalkContext {
        elevation,
        terrain,
        params,
        sea_level,
    };
    let min_length = params.min_river_length as usize;

    let traced = pool.map_tasks(sources.len(), |i| {
        let mut rng = ChaCha8Rng::seed_from_u64(mix64(river_seed ^ (i as u64 + 1)));
        let system = ctx.trace_system(sources[i], &mut rng);
        (system.main_length() >= min_length).then_some(system)
    });

    let mut claimed = vec![false; elevation.len()];
    let systems: Vec<RiverSystem> = traced
        .into_iter()
        .flatten()
        .filter_map(|system| join_earlier(system, elevation, &mut claimed))
        .collect();

    let network = RiverNetwork {
        systems,
        river_tiles: claimed.iter().enumerate().filter_map(|(i, &c)| c.then_some(i)).collect(),
    };
    (network, candidates)
}

/// Cuts every path of `system` at the first tile on or next to a `claimed`
/// river, then claims what is left. A cut main river also gives up its
/// terminal lake; a system whose source is already river is dropped.
fn join_earlier(mut system: RiverSystem, layout: &Grid<f32>, claimed: &mut [bool]) -> Option<RiverSystem> {
    let meets = |index: usize| {
        let (x, y) = layout.coords(index);
        claimed[index] || layout.neighbors8(x, y).any(|(nx, ny)| claimed[layout.index(nx, ny)])
    };
    for (level, path) in system.paths.iter_mut().enumerate() {
        let Some(at) = path.tiles.iter().position(|&t| meets(t)) else {
            continue;
        };
        let keep = if claimed[path.tiles[at]] { at } else { at + 1 };
        path.tiles.truncate(keep);
        path.termination = Termination::Confluence;
        if level == 0 {
            system.terminal_lake = None;
        }
    }
    if system.main_length() == 0 {
        return None;
    }
    system.paths.retain(|p| !p.tiles.is_empty());

    for tile in system.tiles() {
        claimed[tile] = true;
    }
    Some(system)
}

/// Interior land tiles with nothing lower in their 5x5 neighborhood.
fn find_depressions(pool: &WorkerPool, elevation: &Grid<f32>, terrain: &Grid<Terrain>) -> Vec<usize> {
    let (width, height) = (elevation.width(), elevation.height());
    let mut found: Vec<usize> = pool
        .map_chunks_2d(width, height, DEFAULT_CHUNK_2D * 4, |rect| {
            rect.iter()
                .filter(|&(x, y)| x >= 2 && y >= 2 && x + 2 < width && y + 2 < height)
                .filter(|&(x, y)| terrain.at(x, y).is_land())
                .filter(|&(x, y)| {
                    let e = elevation.at(x, y);
                    (y - 2..=y + 2).all(|sy| (x - 2..=x + 2).all(|sx| elevation.at(sx, sy) >= e))
                })
                .map(|(x, y)| elevation.index(x, y))
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect();
    found.sort_unstable();
    found
}

/// Adds rivers and lakes to `terrain`.
///
/// River tiles never replace ocean, coast or lake tiles; lakes only replace
/// land.
pub fn synthesize(
    pool: &WorkerPool,
    elevation: &Grid<f32>,
    terrain: &mut Grid<Terrain>,
    params: &RiverParams,
    sea_level: f32,
    seed: WorldSeed,
) -> HydrologyReport {
    let (network, candidates) = trace_rivers(pool, elevation, terrain, params, sea_level, seed);

    let mut river_tiles = 0;
    for &index in &network.river_tiles {
        let current = terrain[index];
        if !(current.is_ocean() || matches!(current, Terrain::Coast | Terrain::Lake)) {
            terrain[index] = Terrain::River;
            river_tiles += 1;
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed.derive(purpose::LAKES).value());
    let carver = LakeCarver::new(params, seed);
    let mut lakes = 0;
    for center in network.systems.iter().filter_map(|s| s.terminal_lake) {
        if carver.carve(terrain, center, &mut rng) > 0 {
            lakes += 1;
        }
    }

    if params.generate_lakes {
        let mut depression_lakes = 0;
        for center in find_depressions(pool, elevation, terrain) {
            if depression_lakes >= params.max_lakes {
                break;
            }
            if rng.gen::<f32>() >= params.lake_probability || !terrain[center].is_land() {
                continue;
            }
            if carver.carve(terrain, center, &mut rng) > 0 {
                depression_lakes += 1;
            }
        }
        lakes += depression_lakes as usize;
    }

    let report = HydrologyReport {
        candidates,
        rivers: network.systems.len(),
        tributaries: network
            .systems
            .iter()
            .map(|s| s.paths.len().saturating_sub(1))
            .sum(),
        river_tiles,
        lakes,
    };
    tracing::debug!(
        target: "mapforge::hydrology",
        candidates = report.candidates,
        rivers = report.rivers,
        tributaries = report.tributaries,
        river_tiles = report.river_tiles,
        lakes = report.lakes,
        "hydrology synthesized"
    );
    report
}
