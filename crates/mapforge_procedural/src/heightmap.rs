//! # Heightmap Synthesis
//!
//! Turns noise primitives into a normalized elevation field.
//!
//! ## Stages
//!
//! ```text
//! fbm / layered blend ──► normalize ──► ridge ──► terrace ──► island falloff
//!                                                                  │
//!              normalize ◄── bilinear resample at warped coords ◄──┘
//! ```
//!
//! Every stage is evaluated per tile from read-only inputs, so the result is
//! bit-identical for any worker count.

use mapforge_core::{DoubleBuffer, Grid, WorkerPool};
use serde::{Deserialize, Serialize};

use crate::error::{MapError, MapResult};
use crate::noise::{purpose, NoiseKind, NoiseSource, Perlin, WorldSeed};

/// Coordinate displacement applied before the final resample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainWarp {
    /// Whether the warp runs at all.
    pub enabled: bool,
    /// Maximum displacement in tiles.
    pub strength: f32,
    /// Frequency of the displacement field, in cycles per tile.
    pub frequency: f32,
    /// Octaves of the displacement field.
    pub octaves: u32,
}

impl Default for DomainWarp {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 30.0,
            frequency: 0.05,
            octaves: 3,
        }
    }
}

/// One independently parameterized layer of a layered blend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseLayer {
    /// Relative weight in the blend.
    pub weight: f32,
    /// Feature size in tiles.
    pub scale: f32,
    /// Octave count.
    pub octaves: u32,
    /// Amplitude decay per octave.
    pub persistence: f32,
    /// Frequency growth per octave.
    pub lacunarity: f32,
    /// Primitive sampled by this layer.
    pub kind: NoiseKind,
    /// Apply radial falloff to this layer alone.
    pub island_mode: bool,
}

impl Default for NoiseLayer {
    fn default() -> Self {
        Self {
            weight: 1.0,
            scale: 100.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            kind: NoiseKind::Perlin,
            island_mode: false,
        }
    }
}

/// Shape parameters of the elevation field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    /// Feature size in tiles; larger is smoother.
    pub scale: f32,
    /// Octave count.
    pub octaves: u32,
    /// Amplitude decay per octave.
    pub persistence: f32,
    /// Frequency growth per octave.
    pub lacunarity: f32,
    /// Base primitive.
    pub kind: NoiseKind,
    /// Radial falloff from the map center.
    pub island_mode: bool,
    /// Ridge exponent; 0 disables the ridge transform.
    pub ridge_exponent: f32,
    /// Terrace step count; 0 disables terracing.
    pub terrace_levels: u32,
    /// Coordinate warp.
    pub domain_warp: DomainWarp,
    /// Blend layers; when non-empty they replace the base fbm.
    pub layers: Vec<NoiseLayer>,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            scale: 100.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
            kind: NoiseKind::Perlin,
            island_mode: false,
            ridge_exponent: 0.0,
            terrace_levels: 0,
            domain_warp: DomainWarp::default(),
            layers: Vec::new(),
        }
    }
}

/// Checks one octave stack.
fn validate_octaves(scale: f32, octaves: u32, persistence: f32, lacunarity: f32) -> MapResult<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(MapError::invalid("noise.scale", "must be a positive number"));
    }
    if !(1..=16).contains(&octaves) {
        return Err(MapError::invalid("noise.octaves", "must be between 1 and 16"));
    }
    if !(persistence.is_finite() && persistence > 0.0) {
        return Err(MapError::invalid("noise.persistence", "must be a positive number"));
    }
    if !(lacunarity.is_finite() && lacunarity >= 1.0) {
        return Err(MapError::invalid("noise.lacunarity", "must be at least 1"));
    }
    Ok(())
}

impl NoiseParams {
    /// Rejects parameters that cannot produce a field.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> MapResult<()> {
        validate_octaves(self.scale, self.octaves, self.persistence, self.lacunarity)?;
        if !(self.ridge_exponent.is_finite() && self.ridge_exponent >= 0.0) {
            return Err(MapError::invalid("noise.ridge_exponent", "must be zero or positive"));
        }
        let warp = &self.domain_warp;
        if warp.enabled && !(warp.strength.is_finite() && warp.frequency.is_finite() && warp.frequency > 0.0) {
            return Err(MapError::invalid("noise.domain_warp", "needs finite strength and positive frequency"));
        }
        for layer in &self.layers {
            validate_octaves(layer.scale, layer.octaves, layer.persistence, layer.lacunarity)?;
            if !(layer.weight.is_finite() && layer.weight >= 0.0) {
                return Err(MapError::invalid("noise.layers.weight", "must be zero or positive"));
            }
        }
        if !self.layers.is_empty() && self.layers.iter().map(|l| l.weight).sum::<f32>() <= 0.0 {
            return Err(MapError::invalid("noise.layers", "total weight must be positive"));
        }
        Ok(())
    }
}

/// Lattice period of the permutation-based primitives.
const LATTICE_PERIOD: f64 = 256.0;

/// Radial falloff factor: 1 at the center, 0 from half a map-diagonal out.
#[inline]
#[allow(clippy::cast_precision_loss)]
fn island_falloff(x: u32, y: u32, width: u32, height: u32) -> f32 {
    let dx = x as f32 / width as f32 - 0.5;
    let dy = y as f32 / height as f32 - 0.5;
    let d = (dx * dx + dy * dy).sqrt() * 2.0;
    (1.0 - d).max(0.0)
}

/// Ridge transform `(1 - |2v - 1|)^exponent`.
#[inline]
#[must_use]
pub fn ridge(v: f32, exponent: f32) -> f32 {
    (1.0 - (2.0 * v - 1.0).abs()).max(0.0).powf(exponent)
}

/// Quantizes `v` into `levels` flat steps, each at its step midpoint.
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn terrace(v: f32, levels: u32) -> f32 {
    let levels_f = levels as f32;
    let step = ((v * levels_f).floor() as u32).min(levels - 1);
    (step as f32 + 0.5) / levels_f
}

/// Bilinear sample of a row-major field at fractional coordinates.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bilinear(data: &[f32], width: u32, height: u32, fx: f32, fy: f32) -> f32 {
    let fx = fx.clamp(0.0, (width - 1) as f32);
    let fy = fy.clamp(0.0, (height - 1) as f32);
    let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);
    let at = |x: u32, y: u32| data[y as usize * width as usize + x as usize];

    let top = at(x0, y0) + (at(x1, y0) - at(x0, y0)) * tx;
    let bottom = at(x0, y1) + (at(x1, y1) - at(x0, y1)) * tx;
    top + (bottom - top) * ty
}

/// Produces elevation fields from a seed.
#[derive(Clone, Copy, Debug)]
pub struct HeightmapGenerator {
    seed: WorldSeed,
}

impl HeightmapGenerator {
    /// Creates a generator for `seed`.
    #[must_use]
    pub const fn new(seed: WorldSeed) -> Self {
        Self { seed }
    }

    /// Noise-space coordinates of tile `(0, 0)`.
    ///
    /// A seeded point inside one lattice period, so maps of different seeds
    /// do not all start on the lattice corner where every octave is zero.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn origin(&self) -> (f64, f64) {
        let bits = self.seed.derive(purpose::ORIGIN).value();
        let unit = |half: u64| (half & 0xFFFF_FFFF) as f64 / 4_294_967_296.0 * LATTICE_PERIOD;
        (unit(bits), unit(bits >> 32))
    }

    /// Generates a `width x height` field normalized to [0, 1].
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidParameter`] for unusable parameters and
    /// [`MapError::Allocation`] when the grid cannot be allocated.
    #[allow(clippy::cast_precision_loss)]
    pub fn generate(
        &self,
        pool: &WorkerPool,
        width: u32,
        height: u32,
        params: &NoiseParams,
    ) -> MapResult<Grid<f32>> {
        params.validate()?;
        let mut field = Grid::filled(width, height, 0.0f32)?;
        let (ox, oy) = self.origin();

        if params.layers.is_empty() {
            let source = NoiseSource::new(params.kind, self.seed.derive(purpose::ELEVATION));
            let inv_scale = 1.0 / f64::from(params.scale);
            let (octaves, persistence, lacunarity) = (
                params.octaves,
                f64::from(params.persistence),
                f64::from(params.lacunarity),
            );
            pool.fill_2d(width, height, field.as_mut_slice(), |x, y| {
                #[allow(clippy::cast_possible_truncation)]
                let v = source.octaved(
                    f64::from(x) * inv_scale + ox,
                    f64::from(y) * inv_scale + oy,
                    octaves,
                    persistence,
                    lacunarity,
                ) as f32;
                v
            });
        } else {
            self.blend_layers(pool, &mut field, &params.layers);
        }
        pool.normalize_field(field.as_mut_slice());

        let ridge_exponent = params.ridge_exponent;
        let terrace_levels = params.terrace_levels;
        let island = params.island_mode;
        if ridge_exponent > 0.0 || terrace_levels > 0 || island {
            let w = field.width();
            pool.transform(field.as_mut_slice(), |i, v| {
                if ridge_exponent > 0.0 {
                    *v = ridge(*v, ridge_exponent);
                }
                if terrace_levels > 0 {
                    *v = terrace(*v, terrace_levels);
                }
                if island {
                    #[allow(clippy::cast_possible_truncation)]
                    let (x, y) = ((i % w as usize) as u32, (i / w as usize) as u32);
                    *v *= island_falloff(x, y, width, height);
                }
            });
        }

        if params.domain_warp.enabled {
            self.apply_domain_warp(pool, &mut field, &params.domain_warp);
        }

        pool.normalize_field(field.as_mut_slice());
        tracing::debug!(
            target: "mapforge::noise",
            width,
            height,
            kind = ?params.kind,
            layers = params.layers.len(),
            "elevation field synthesized"
        );
        Ok(field)
    }

    /// Weighted sum of independently seeded layers.
    fn blend_layers(&self, pool: &WorkerPool, field: &mut Grid<f32>, layers: &[NoiseLayer]) {
        let (width, height) = (field.width(), field.height());
        let sources: Vec<(NoiseSource, &NoiseLayer)> = layers
            .iter()
            .zip(0u64..)
            .map(|(layer, i)| {
                let seed = self.seed.derive(purpose::LAYER_BASE + i);
                (NoiseSource::new(layer.kind, seed), layer)
            })
            .collect();
        let total_weight: f32 = layers.iter().map(|l| l.weight).sum();
        let (ox, oy) = self.origin();

        pool.fill_2d(width, height, field.as_mut_slice(), |x, y| {
            let mut sum = 0.0f32;
            for (source, layer) in &sources {
                let inv_scale = 1.0 / f64::from(layer.scale);
                #[allow(clippy::cast_possible_truncation)]
                let mut v = source.octaved(
                    f64::from(x) * inv_scale + ox,
                    f64::from(y) * inv_scale + oy,
                    layer.octaves,
                    f64::from(layer.persistence),
                    f64::from(layer.lacunarity),
                ) as f32;
                if layer.island_mode {
                    v *= island_falloff(x, y, width, height);
                }
                sum += v * layer.weight;
            }
            sum / total_weight
        });
    }

    /// Resamples the field at coordinates displaced by a Perlin vector field.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn apply_domain_warp(&self, pool: &WorkerPool, field: &mut Grid<f32>, warp: &DomainWarp) {
        let (width, height) = (field.width(), field.height());
        let source = Perlin::new(self.seed.derive(purpose::WARP));
        let frequency = f64::from(warp.frequency);
        let octaves = warp.octaves.max(1);
        let strength = warp.strength;

        let displacement = |nx: f64, ny: f64| {
            let (mut total, mut amplitude, mut freq, mut norm) = (0.0, 1.0, 1.0, 0.0);
            for _ in 0..octaves {
                total += source.sample(nx * freq, ny * freq) * amplitude;
                norm += amplitude;
                amplitude *= 0.5;
                freq *= 2.0;
            }
            (total / norm) as f32
        };

        let before = field.as_slice().to_vec();
        pool.fill_2d(width, height, field.as_mut_slice(), |x, y| {
            let nx = f64::from(x) * frequency;
            let ny = f64::from(y) * frequency;
            let dx = displacement(nx, ny);
            let dy = displacement(nx + 5.2, ny + 1.3);
            bilinear(
                &before,
                width,
                height,
                x as f32 + dx * strength,
                y as f32 + dy * strength,
            )
        });
    }
}

/// Box-filters `field` with the given radius; tiles closer than `radius` to
/// the border keep their values.
#[allow(clippy::cast_precision_loss)]
pub fn smooth(pool: &WorkerPool, field: &mut Grid<f32>, radius: u32) {
    let (width, height) = (field.width(), field.height());
    if radius == 0 || width <= 2 * radius || height <= 2 * radius {
        return;
    }
    let window = ((2 * radius + 1) * (2 * radius + 1)) as f32;
    let mut buffers = DoubleBuffer::new(field.as_slice().to_vec());
    let (before, after) = buffers.split();

    pool.fill_2d(width, height, after, |x, y| {
        let index = y as usize * width as usize + x as usize;
        if x < radius || y < radius || x + radius >= width || y + radius >= height {
            return before[index];
        }
        let mut sum = 0.0f32;
        for sy in y - radius..=y + radius {
            let row = sy as usize * width as usize;
            for sx in x - radius..=x + radius {
                sum += before[row + sx as usize];
            }
        }
        sum / window
    });
    buffers.swap();
    field.as_mut_slice().copy_from_slice(buffers.front());
}
