//! # Erosion
//!
//! Iterative hydraulic and thermal erosion over the elevation field.
//!
//! Each iteration reads the front of a [`DoubleBuffer`] per layer and writes
//! the back, which starts as a copy of the front. Tiles are processed
//! in chunks; every chunk writes its height, sediment and water changes into a
//! private delta buffer that covers the chunk plus a one-tile halo, because a
//! tile may push material onto a neighbor in another chunk. The buffers come
//! back in chunk order and are summed sequentially, so the floating-point
//! result is identical for any worker count.
//!
//! ```text
//! snapshot ──► per-chunk deltas (parallel) ──► ordered merge ──► evaporate
//!                                                                    │
//!          next iteration ◄── clamp to [0, 1] ◄── settle sediment ◄──┘
//! ```

use mapforge_core::{ChunkRect, DoubleBuffer, Grid, WorkerPool, DEFAULT_CHUNK_2D};
use serde::{Deserialize, Serialize};

use crate::error::{MapError, MapResult};

/// Erosion parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionParams {
    /// Number of iterations; 0 leaves the field as is apart from renormalization.
    pub iterations: u32,
    /// Water added to every tile per iteration.
    pub rain_amount: f32,
    /// Fraction of water lost per iteration.
    pub evaporation_rate: f32,
    /// Sediment carried per unit of slope and water.
    pub sediment_capacity: f32,
    /// Share of moving sediment that stays on the source tile.
    pub deposition_rate: f32,
    /// Share of spare capacity eroded from the source tile.
    pub erosion_rate: f32,
    /// Accepted for configuration compatibility; the flow model does not use it.
    pub gravity: f32,
    /// Run the hydraulic pass.
    pub hydraulic: bool,
    /// Run the thermal pass.
    pub thermal: bool,
    /// Angle of repose in degrees.
    pub talus_angle: f32,
    /// Share of the excess slope moved per thermal step.
    pub thermal_rate: f32,
    /// Water only flows across slopes steeper than this.
    pub min_slope: f32,
    /// Pipe length between tile centers. Scales the talus threshold and caps
    /// the water a tile passes downhill per step at `slope * pipe_length`.
    pub pipe_length: f32,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            iterations: 5,
            rain_amount: 0.01,
            evaporation_rate: 0.01,
            sediment_capacity: 0.1,
            deposition_rate: 0.3,
            erosion_rate: 0.3,
            gravity: 9.8,
            hydraulic: true,
            thermal: true,
            talus_angle: 35.0,
            thermal_rate: 0.1,
            min_slope: 0.01,
            pipe_length: 1.0,
        }
    }
}

impl ErosionParams {
    /// Rejects rates outside [0, 1] and non-positive geometry.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> MapResult<()> {
        for (name, rate) in [
            ("erosion.rain_amount", self.rain_amount),
            ("erosion.evaporation_rate", self.evaporation_rate),
            ("erosion.sediment_capacity", self.sediment_capacity),
            ("erosion.deposition_rate", self.deposition_rate),
            ("erosion.erosion_rate", self.erosion_rate),
            ("erosion.thermal_rate", self.thermal_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(MapError::invalid(name, "must be in [0, 1]"));
            }
        }
        if !(self.talus_angle > 0.0 && self.talus_angle < 90.0) {
            return Err(MapError::invalid("erosion.talus_angle", "must be in (0, 90) degrees"));
        }
        if !(self.pipe_length.is_finite() && self.pipe_length > 0.0) {
            return Err(MapError::invalid("erosion.pipe_length", "must be positive"));
        }
        if !(self.min_slope.is_finite() && self.min_slope >= 0.0) {
            return Err(MapError::invalid("erosion.min_slope", "must be zero or positive"));
        }
        Ok(())
    }

    /// Height difference above which the thermal pass moves material.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn talus_threshold(&self, width: u32, height: u32) -> f32 {
        self.talus_angle.to_radians().tan() * self.pipe_length / width.max(height) as f32
    }
}

/// Accumulated changes of one chunk, covering the chunk plus a one-tile halo.
struct Deltas<const N: usize> {
    x0: u32,
    y0: u32,
    width: u32,
    values: Vec<[f32; N]>,
}

impl<const N: usize> Deltas<N> {
    fn around(rect: ChunkRect, map_width: u32, map_height: u32) -> Self {
        let x0 = rect.x0.saturating_sub(1);
        let y0 = rect.y0.saturating_sub(1);
        let x1 = (rect.x1 + 1).min(map_width);
        let y1 = (rect.y1 + 1).min(map_height);
        let width = x1 - x0;
        Self {
            x0,
            y0,
            width,
            values: vec![[0.0; N]; width as usize * (y1 - y0) as usize],
        }
    }

    #[inline]
    fn add(&mut self, x: u32, y: u32, channel: usize, amount: f32) {
        let i = (y - self.y0) as usize * self.width as usize + (x - self.x0) as usize;
        self.values[i][channel] += amount;
    }

    /// Adds every recorded change into the full-size channels.
    fn merge_into(&self, map_width: u32, channels: &mut [&mut [f32]; N]) {
        for (i, delta) in self.values.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let (dx, dy) = ((i % self.width as usize) as u32, (i / self.width as usize) as u32);
            let index = (self.y0 + dy) as usize * map_width as usize + (self.x0 + dx) as usize;
            for (channel, amount) in channels.iter_mut().zip(delta) {
                channel[index] += amount;
            }
        }
    }
}

const HEIGHT: usize = 0;
const SEDIMENT: usize = 1;
const WATER: usize = 2;

/// Computes chunk deltas from `step` and merges them in chunk order.
fn accumulate<const N: usize, F>(pool: &WorkerPool, width: u32, height: u32, channels: &mut [&mut [f32]; N], step: F)
where
    F: Fn(u32, u32, &mut Deltas<N>) + Sync,
{
    let chunks = pool.map_chunks_2d(width, height, DEFAULT_CHUNK_2D * 2, |rect| {
        let mut deltas = Deltas::around(rect, width, height);
        for (x, y) in rect.iter() {
            step(x, y, &mut deltas);
        }
        deltas
    });
    for deltas in &chunks {
        deltas.merge_into(width, channels);
    }
}

/// Lowest strictly-lower neighbor and the slope toward it. `layout` supplies
/// the geometry, `heights` the values.
fn steepest_descent(layout: &Grid<f32>, heights: &[f32], x: u32, y: u32) -> Option<(u32, u32, f32)> {
    let h = heights[layout.index(x, y)];
    layout
        .neighbors8(x, y)
        .map(|(nx, ny)| (nx, ny, h - heights[layout.index(nx, ny)]))
        .filter(|&(_, _, slope)| slope > 0.0)
        .fold(None, |best, candidate| match best {
            Some((_, _, s)) if s >= candidate.2 => best,
            _ => Some(candidate),
        })
}

/// Resets NaN and infinite values to zero and returns how many there were.
fn scrub_non_finite(pool: &WorkerPool, values: &mut [f32]) -> usize {
    let bad = values.iter().filter(|v| !v.is_finite()).count();
    if bad > 0 {
        pool.transform(values, |_, v| {
            if !v.is_finite() {
                *v = 0.0;
            }
        });
    }
    bad
}

/// Height, water and sediment layers, each read from the front and written
/// to the back.
struct Layers {
    heights: DoubleBuffer<f32>,
    water: DoubleBuffer<f32>,
    sediment: DoubleBuffer<f32>,
}

impl Layers {
    fn dry(heights: &[f32]) -> Self {
        Self {
            heights: DoubleBuffer::new(heights.to_vec()),
            water: DoubleBuffer::new(vec![0.0; heights.len()]),
            sediment: DoubleBuffer::new(vec![0.0; heights.len()]),
        }
    }

    /// Scrubs every layer and clamps heights to [0, 1]; returns the number of
    /// non-finite values replaced.
    fn settle(&mut self, pool: &WorkerPool) -> usize {
        let bad = scrub_non_finite(pool, self.heights.front_mut())
            + scrub_non_finite(pool, self.water.front_mut())
            + scrub_non_finite(pool, self.sediment.front_mut());
        pool.transform(self.heights.front_mut(), |_, v| *v = v.clamp(0.0, 1.0));
        bad
    }
}

/// Erodes a field in place.
pub struct Eroder<'a> {
    params: &'a ErosionParams,
}

impl<'a> Eroder<'a> {
    /// Creates an eroder for `params`.
    #[must_use]
    pub const fn new(params: &'a ErosionParams) -> Self {
        Self { params }
    }

    /// Runs all iterations on `field`, then renormalizes it to [0, 1].
    ///
    /// Non-finite heights, in the input or produced along the way, are reset
    /// to zero with a warning; the result is always finite.
    pub fn apply(&self, pool: &WorkerPool, field: &mut Grid<f32>) {
        let (width, height) = (field.width(), field.height());
        let p = self.params;
        let talus = p.talus_threshold(width, height);

        let bad = scrub_non_finite(pool, field.as_mut_slice());
        if bad > 0 {
            tracing::warn!(target: "mapforge::erosion", tiles = bad, "non-finite input heights reset to zero");
        }

        let mut layers = Layers::dry(field.as_slice());
        for iteration in 0..p.iterations {
            if p.hydraulic {
                self.hydraulic_step(pool, field, &mut layers);
            }
            if p.thermal {
                self.thermal_step(pool, field, &mut layers.heights, talus);
            }
            let bad = layers.settle(pool);
            if bad > 0 {
                tracing::warn!(target: "mapforge::erosion", iteration, values = bad, "non-finite erosion state reset to zero");
            }
            tracing::trace!(target: "mapforge::erosion", iteration, "erosion iteration complete");
        }

        field.as_mut_slice().copy_from_slice(&layers.heights.into_front());
        pool.normalize_field(field.as_mut_slice());
        tracing::debug!(
            target: "mapforge::erosion",
            iterations = p.iterations,
            hydraulic = p.hydraulic,
            thermal = p.thermal,
            "erosion applied"
        );
    }

    /// Rain, downhill flow with sediment transport, evaporation and settling.
    ///
    /// A tile passes at most `slope * pipe_length` of its water downhill, and
    /// the sediment in suspension travels in the same proportion.
    fn hydraulic_step(&self, pool: &WorkerPool, layout: &Grid<f32>, layers: &mut Layers) {
        let p = self.params;
        let (width, height) = (layout.width(), layout.height());
        layers.heights.sync_back();
        layers.water.sync_back();
        layers.sediment.sync_back();
        let (heights_now, heights_next) = layers.heights.split();
        let (water_now, water_next) = layers.water.split();
        let (sediment_now, sediment_next) = layers.sediment.split();

        let mut channels = [heights_next, sediment_next, water_next];
        accumulate(pool, width, height, &mut channels, |x, y, deltas| {
            let index = layout.index(x, y);
            let carried = sediment_now[index];
            let wet = water_now[index] + p.rain_amount;
            deltas.add(x, y, WATER, p.rain_amount);

            match steepest_descent(layout, heights_now, x, y) {
                Some((nx, ny, slope)) if slope > p.min_slope && wet > 0.0 => {
                    let flow = (slope * p.pipe_length).min(wet);
                    let share = flow / wet;
                    let capacity = slope * flow * p.sediment_capacity;
                    let erosion = ((capacity - carried).max(0.0) * p.erosion_rate).min(slope * 0.5);
                    let travelling = (erosion + carried) * (1.0 - p.deposition_rate) * share;

                    deltas.add(x, y, HEIGHT, -erosion);
                    deltas.add(x, y, SEDIMENT, erosion - travelling);
                    deltas.add(nx, ny, SEDIMENT, travelling);
                    deltas.add(x, y, WATER, -flow);
                    deltas.add(nx, ny, WATER, flow);
                }
                _ => {
                    // Pits and flats drop everything they carry.
                    deltas.add(x, y, HEIGHT, carried);
                    deltas.add(x, y, SEDIMENT, -carried);
                }
            }
        });

        let [heights, sediment, water] = channels;
        let evaporation = p.evaporation_rate;
        for ((h, w), s) in heights.iter_mut().zip(water.iter_mut()).zip(sediment.iter_mut()) {
            *w *= 1.0 - evaporation;
            let settle = *s * evaporation;
            *h += settle;
            *s -= settle;
        }

        layers.heights.swap();
        layers.water.swap();
        layers.sediment.swap();
    }

    /// Moves material from slopes steeper than the talus threshold.
    fn thermal_step(&self, pool: &WorkerPool, layout: &Grid<f32>, heights: &mut DoubleBuffer<f32>, talus: f32) {
        let rate = self.params.thermal_rate;
        let (width, height) = (layout.width(), layout.height());
        heights.sync_back();
        let (now, next) = heights.split();
        let at = |x: u32, y: u32| now[layout.index(x, y)];

        let mut channels = [next];
        accumulate(pool, width, height, &mut channels, |x, y, deltas| {
            let h = at(x, y);
            let (mut total, mut steepest) = (0.0f32, 0.0f32);
            for (nx, ny) in layout.neighbors8(x, y) {
                let diff = h - at(nx, ny);
                if diff > talus {
                    total += diff;
                    steepest = steepest.max(diff);
                }
            }
            if total <= 0.0 {
                return;
            }

            let moved = rate * (steepest - talus) * 0.5;
            deltas.add(x, y, HEIGHT, -moved);
            for (nx, ny) in layout.neighbors8(x, y) {
                let diff = h - at(nx, ny);
                if diff > talus {
                    deltas.add(nx, ny, HEIGHT, moved * diff / total);
                }
            }
        });
        heights.swap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::HeightmapGenerator;
    use crate::noise::WorldSeed;

    fn terrain_field() -> Grid<f32> {
        HeightmapGenerator::new(WorldSeed::new(77))
            .generate(&WorkerPool::new(2), 72, 60, &crate::heightmap::NoiseParams::default())
            .unwrap()
    }

    #[test]
    fn test_zero_iterations_only_renormalizes() {
        let field = terrain_field();
        let mut eroded = field.clone();
        let params = ErosionParams {
            iterations: 0,
            ..ErosionParams::default()
        };
        Eroder::new(&params).apply(&WorkerPool::new(2), &mut eroded);
        assert_eq!(field, eroded);
    }

    #[test]
    fn test_stays_in_unit_range() {
        let mut field = terrain_field();
        let params = ErosionParams {
            iterations: 8,
            rain_amount: 0.2,
            ..ErosionParams::default()
        };
        Eroder::new(&params).apply(&WorkerPool::new(3), &mut field);
        assert!(field.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let run = |threads| {
            let mut field = terrain_field();
            let pool = WorkerPool::new(threads).with_sequential_threshold(0);
            Eroder::new(&ErosionParams::default()).apply(&pool, &mut field);
            field
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn test_thermal_spreads_a_spike() {
        let mut field = Grid::filled(16, 16, 0.0f32).unwrap();
        field.set(8, 8, 1.0);
        let params = ErosionParams {
            iterations: 3,
            hydraulic: false,
            ..ErosionParams::default()
        };
        Eroder::new(&params).apply(&WorkerPool::sequential(), &mut field);
        assert!(field.at(7, 8) > 0.0);
        assert_eq!(field.at(0, 0), 0.0);
        assert_eq!(field.at(8, 8), 1.0);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_pipe_length_caps_downhill_flow() {
        // One row sloping down to the right by 0.05 per tile.
        let layout = Grid::from_vec(8, 1, (0..8).map(|x| 1.0 - x as f32 * 0.05).collect()).unwrap();
        let run = |pipe_length| {
            let params = ErosionParams {
                rain_amount: 0.2,
                evaporation_rate: 0.0,
                pipe_length,
                ..ErosionParams::default()
            };
            let mut layers = Layers::dry(layout.as_slice());
            Eroder::new(&params).hydraulic_step(&WorkerPool::sequential(), &layout, &mut layers);
            layers.water.into_front()
        };
        let narrow = run(0.5);
        let wide = run(100.0);

        // The top tile only receives rain and keeps what its pipe cannot pass.
        assert!((narrow[0] - 0.175).abs() < 1e-6, "narrow pipe kept {}", narrow[0]);
        assert_eq!(wide[0], 0.0);
        assert!(narrow[7] < wide[7]);
        for water in [&narrow, &wide] {
            assert!((water.iter().sum::<f32>() - 1.6).abs() < 1e-5, "water not conserved");
        }
    }

    #[test]
    fn test_non_finite_heights_are_reset() {
        for iterations in [0, 3] {
            let mut field = terrain_field();
            field.set(10, 10, f32::NAN);
            field.set(20, 5, f32::INFINITY);
            field.set(3, 3, f32::NEG_INFINITY);
            let params = ErosionParams {
                iterations,
                ..ErosionParams::default()
            };
            Eroder::new(&params).apply(&WorkerPool::new(2), &mut field);
            assert!(
                field.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)),
                "{iterations} iterations left a non-finite height"
            );
        }
    }

    #[test]
    fn test_talus_threshold_scales_with_map() {
        let params = ErosionParams::default();
        let small = params.talus_threshold(64, 64);
        let large = params.talus_threshold(512, 256);
        assert!((small - 35f32.to_radians().tan() / 64.0).abs() < 1e-6);
        assert!(large < small);
        assert!(ErosionParams {
            talus_angle: 95.0,
            ..ErosionParams::default()
        }
        .validate()
        .is_err());
    }
}
