//! # Noise Primitives
//!
//! Seeded, deterministic 2D noise sources.
//!
//! ## Available Sources
//!
//! - **Perlin**: improved gradient noise over a seeded permutation table
//! - **Simplex**: triangular-lattice gradient noise, fewer axis artifacts
//! - **Worley**: distance to the k-th nearest seeded feature point
//! - **Value**: smoothly interpolated random lattice values
//!
//! ## Determinism Guarantee
//!
//! Every generator owns its tables, built from a [`WorldSeed`]. There are no
//! process-wide statics, so two generators with the same seed produce
//! **exactly** the same values on any thread, in any order.

use serde::{Deserialize, Serialize};

use crate::math::{hash2d, mix64};

/// World seed for deterministic generation.
///
/// All procedural generation derives from this seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives a sub-seed for a specific purpose (e.g., river tracing).
    ///
    /// Uses a hash function to create independent streams from one seed.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

/// Stream identifiers for [`WorldSeed::derive`].
pub mod purpose {
    /// Base elevation noise.
    pub const ELEVATION: u64 = 1;
    /// Domain warp displacement.
    pub const WARP: u64 = 2;
    /// Temperature noise channel.
    pub const TEMPERATURE: u64 = 3;
    /// Moisture noise channel.
    pub const MOISTURE: u64 = 4;
    /// River source shuffle and walks.
    pub const RIVERS: u64 = 5;
    /// Lake placement and shapes.
    pub const LAKES: u64 = 6;
    /// Decoration rolls.
    pub const DECORATION: u64 = 7;
    /// Resource rolls.
    pub const RESOURCES: u64 = 8;
    /// Noise-space position of the map's first tile.
    pub const ORIGIN: u64 = 9;
    /// First extra noise layer; layer `i` uses `LAYER_BASE + i`.
    pub const LAYER_BASE: u64 = 100;
}

/// Which primitive a noise layer samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    /// Improved Perlin gradient noise.
    #[default]
    Perlin,
    /// 2D simplex noise.
    Simplex,
    /// Cellular noise.
    Worley,
    /// Interpolated lattice values.
    Value,
}

/// Pre-computed permutation table for noise.
///
/// This is computed once from the seed and reused.
#[derive(Clone)]
struct PermutationTable {
    /// 512-entry permutation table (256 entries, doubled for overflow handling).
    perm: [u8; 512],
}

impl PermutationTable {
    /// Creates a new permutation table from a seed.
    #[allow(clippy::cast_possible_truncation)]
    fn new(seed: WorldSeed) -> Self {
        let mut perm = [0u8; 512];

        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        // Fisher-Yates shuffle with deterministic RNG. xorshift64 has a fixed
        // point at zero, so the state is pre-mixed.
        let mut rng_state = mix64(seed.value()) | 1;
        for i in (1..256).rev() {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;

            let j = (rng_state % (i as u64 + 1)) as usize;
            perm.swap(i, j);
        }

        // Double the table to avoid index wrapping
        let (low, high) = perm.split_at_mut(256);
        high.copy_from_slice(low);

        Self { perm }
    }

    /// Gets a permutation value (with automatic wrapping).
    #[inline]
    fn get(&self, index: usize) -> u8 {
        self.perm[index & 511]
    }
}

/// Fast floor function.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) {
        xi - 1
    } else {
        xi
    }
}

/// Quintic fade curve `6t^5 - 15t^4 + 10t^3`.
#[inline]
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp64(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Wraps a lattice coordinate into the permutation table.
#[inline]
#[allow(clippy::cast_sign_loss)]
const fn wrap(i: i32) -> usize {
    (i & 255) as usize
}

/// Improved Perlin noise.
///
/// Produces values roughly in `[-1, 1]`.
#[derive(Clone)]
pub struct Perlin {
    perm_table: PermutationTable,
}

impl Perlin {
    /// Creates a Perlin generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples the `z = 0` plane.
    #[inline]
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        self.sample3(x, y, 0.0)
    }

    /// Samples 3D Perlin noise.
    #[must_use]
    pub fn sample3(&self, x: f64, y: f64, z: f64) -> f64 {
        let (xi, yi, zi) = (fast_floor(x), fast_floor(y), fast_floor(z));
        let (xf, yf, zf) = (x - f64::from(xi), y - f64::from(yi), z - f64::from(zi));
        let (u, v, w) = (fade(xf), fade(yf), fade(zf));
        let (xi, yi, zi) = (wrap(xi), wrap(yi), wrap(zi));

        let p = &self.perm_table;
        let a = p.get(xi) as usize + yi;
        let aa = p.get(a) as usize + zi;
        let ab = p.get(a + 1) as usize + zi;
        let b = p.get(xi + 1) as usize + yi;
        let ba = p.get(b) as usize + zi;
        let bb = p.get(b + 1) as usize + zi;

        lerp64(
            lerp64(
                lerp64(grad3(p.get(aa), xf, yf, zf), grad3(p.get(ba), xf - 1.0, yf, zf), u),
                lerp64(
                    grad3(p.get(ab), xf, yf - 1.0, zf),
                    grad3(p.get(bb), xf - 1.0, yf - 1.0, zf),
                    u,
                ),
                v,
            ),
            lerp64(
                lerp64(
                    grad3(p.get(aa + 1), xf, yf, zf - 1.0),
                    grad3(p.get(ba + 1), xf - 1.0, yf, zf - 1.0),
                    u,
                ),
                lerp64(
                    grad3(p.get(ab + 1), xf, yf - 1.0, zf - 1.0),
                    grad3(p.get(bb + 1), xf - 1.0, yf - 1.0, zf - 1.0),
                    u,
                ),
                v,
            ),
            w,
        )
    }
}

/// Dot product with one of the 12 cube-edge gradients picked by `hash`.
#[inline]
fn grad3(hash: u8, x: f64, y: f64, z: f64) -> f64 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

/// 2D Simplex noise generator.
///
/// Produces smooth, continuous noise values in the range [-1, 1].
#[derive(Clone)]
pub struct SimplexNoise {
    /// The permutation table.
    perm_table: PermutationTable,
}

impl SimplexNoise {
    /// Skewing factor for 2D simplex grid.
    const F2: f64 = 0.366_025_403_784_439; // (sqrt(3) - 1) / 2
    /// Unskewing factor for 2D simplex grid.
    const G2: f64 = 0.211_324_865_405_187; // (3 - sqrt(3)) / 6

    /// 12 gradient vectors, pointing at the vertices of a regular 12-gon.
    const GRAD: [[i8; 2]; 12] = [
        [1, 0],
        [1, 1],
        [0, 1],
        [-1, 1],
        [-1, 0],
        [-1, -1],
        [0, -1],
        [1, -1],
        [1, 0],
        [0, 1],
        [-1, 0],
        [0, -1],
    ];

    /// Creates a new simplex noise generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples 2D simplex noise at the given coordinates.
    ///
    /// # Returns
    ///
    /// A value in the range [-1, 1].
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        // Skew input coordinates to simplex grid
        let skew = (x + y) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);

        // Unskew to get first corner in simplex
        let unskew = f64::from(i + j) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);

        // Upper or lower triangle
        let (i1, j1) = if x0 > y0 { (1usize, 0usize) } else { (0, 1) };

        #[allow(clippy::cast_precision_loss)]
        let (x1, y1) = (x0 - i1 as f64 + Self::G2, y0 - j1 as f64 + Self::G2);
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        let (ii, jj) = (wrap(i), wrap(j));
        let p = &self.perm_table;
        let gi0 = p.get(ii + p.get(jj) as usize);
        let gi1 = p.get(ii + i1 + p.get(jj + j1) as usize);
        let gi2 = p.get(ii + 1 + p.get(jj + 1) as usize);

        // The magic number 70.0 normalizes the output
        70.0 * (Self::contribution(x0, y0, gi0)
            + Self::contribution(x1, y1, gi1)
            + Self::contribution(x2, y2, gi2))
    }

    /// Contribution from one corner of the simplex.
    #[inline]
    fn contribution(x: f64, y: f64, gradient_index: u8) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            0.0
        } else {
            let grad = Self::GRAD[(gradient_index % 12) as usize];
            let t2 = t * t;
            t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]))
        }
    }
}

/// Most feature points a Worley cell may hold.
pub const MAX_POINTS_PER_CELL: u32 = 4;

/// Cellular (Worley) noise.
///
/// Each unit cell holds `points_per_cell` feature points placed by hashing
/// the cell coordinate, so the pattern extends over the whole plane.
#[derive(Clone, Debug)]
pub struct Worley {
    seed: u64,
    points_per_cell: u32,
    feature: usize,
}

impl Worley {
    /// Creates a Worley generator returning distance to the nearest point.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            seed: seed.value(),
            points_per_cell: 1,
            feature: 0,
        }
    }

    /// Sets the feature points per cell (clamped to `1..=4`).
    #[must_use]
    pub fn with_points_per_cell(mut self, points: u32) -> Self {
        self.points_per_cell = points.clamp(1, MAX_POINTS_PER_CELL);
        self
    }

    /// Selects the k-th nearest point (0 = nearest).
    #[must_use]
    pub const fn with_feature(mut self, feature: usize) -> Self {
        self.feature = feature;
        self
    }

    /// Distance from `(x, y)` to the selected feature point.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        let (cx, cy) = (fast_floor(x), fast_floor(y));
        let mut distances = [f64::INFINITY; 9 * MAX_POINTS_PER_CELL as usize];
        let mut count = 0;

        for oy in -1..=1 {
            for ox in -1..=1 {
                let (gx, gy) = (i64::from(cx + ox), i64::from(cy + oy));
                for k in 0..self.points_per_cell {
                    let h = hash2d(gx, gy, self.seed ^ u64::from(k).wrapping_mul(0xA24B_AED4_963E_E407));
                    let fx = gx as f64 + (h & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
                    let fy = gy as f64 + (h >> 32) as f64 / 4_294_967_296.0;
                    distances[count] = ((fx - x).powi(2) + (fy - y).powi(2)).sqrt();
                    count += 1;
                }
            }
        }

        let live = &mut distances[..count];
        let k = self.feature.min(count - 1);
        let (_, kth, _) = live.select_nth_unstable_by(k, f64::total_cmp);
        *kth
    }

    /// Samples the field mapped to [-1, 1]; near a feature point is high.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let closeness = 1.0 - (self.distance(x, y) / std::f64::consts::SQRT_2).min(1.0);
        closeness * 2.0 - 1.0
    }
}

/// Value noise: random lattice values blended with the fade curve.
#[derive(Clone)]
pub struct ValueNoise {
    perm_table: PermutationTable,
}

impl ValueNoise {
    /// Creates a value-noise generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    #[inline]
    fn lattice(&self, i: usize, j: usize) -> f64 {
        let p = &self.perm_table;
        f64::from(p.get(p.get(i) as usize + j)) / 255.0
    }

    /// Samples value noise mapped to [-1, 1].
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (xi, yi) = (fast_floor(x), fast_floor(y));
        let (u, v) = (fade(x - f64::from(xi)), fade(y - f64::from(yi)));
        let (i, j) = (wrap(xi), wrap(yi));

        let top = lerp64(self.lattice(i, j), self.lattice(i + 1, j), u);
        let bottom = lerp64(self.lattice(i, j + 1), self.lattice(i + 1, j + 1), u);
        lerp64(top, bottom, v) * 2.0 - 1.0
    }
}

/// A noise source of any kind behind one sampling interface.
#[derive(Clone)]
pub enum NoiseSource {
    /// Perlin source.
    Perlin(Perlin),
    /// Simplex source.
    Simplex(SimplexNoise),
    /// Worley source.
    Worley(Worley),
    /// Value source.
    Value(ValueNoise),
}

impl NoiseSource {
    /// Builds the source for `kind` from `seed`.
    #[must_use]
    pub fn new(kind: NoiseKind, seed: WorldSeed) -> Self {
        match kind {
            NoiseKind::Perlin => Self::Perlin(Perlin::new(seed)),
            NoiseKind::Simplex => Self::Simplex(SimplexNoise::new(seed)),
            NoiseKind::Worley => Self::Worley(Worley::new(seed)),
            NoiseKind::Value => Self::Value(ValueNoise::new(seed)),
        }
    }

    /// Raw sample, roughly in [-1, 1].
    #[inline]
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        match self {
            Self::Perlin(n) => n.sample(x, y),
            Self::Simplex(n) => n.sample(x, y),
            Self::Worley(n) => n.sample(x, y),
            Self::Value(n) => n.sample(x, y),
        }
    }

    /// Sample mapped to [0, 1].
    #[inline]
    #[must_use]
    pub fn sample01(&self, x: f64, y: f64) -> f64 {
        ((self.sample(x, y) + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Generates octaved (fractal) noise in [0, 1].
    ///
    /// Combines multiple layers of noise at different frequencies
    /// to create more natural-looking terrain.
    ///
    /// # Arguments
    ///
    /// * `x`, `y` - Coordinates
    /// * `octaves` - Number of noise layers (typically 4-8)
    /// * `persistence` - Amplitude decay per octave (typically 0.5)
    /// * `lacunarity` - Frequency increase per octave (typically 2.0)
    #[must_use]
    pub fn octaved(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves.max(1) {
            total += self.sample01(x * frequency, y * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        if max_amplitude > 0.0 {
            (total / max_amplitude).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}
