//! Lake carving.
//!
//! A lake is a soft blob around a center tile. Its boundary is a base radius
//! perturbed by lobes, a low-frequency noise field and a per-tile jitter; the
//! blend factor `alpha = 1 - smoothstep(t - 0.3, t + 0.3, d)` decides whether a
//! tile becomes lake, shore or stays untouched.

use mapforge_core::Grid;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::biome::Terrain;
use crate::hydrology::RiverParams;
use crate::math::{smoothstep, unit_hash};
use crate::noise::{purpose, Perlin, WorldSeed};

/// Outline family of a lake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LakeShape {
    /// Round with shallow lobes.
    Circular,
    /// Stretched along one axis.
    Elliptical,
    /// Several overlapping lobe frequencies.
    Irregular,
}

/// Randomized outline parameters of one lake.
#[derive(Clone, Copy, Debug)]
struct Outline {
    shape: LakeShape,
    radius: f32,
    irregularity: f32,
    distortion: f32,
    lobes: f32,
    stretch: (f32, f32),
    phases: [f32; 3],
}

impl Outline {
    fn random(params: &RiverParams, rng: &mut ChaCha8Rng) -> Self {
        let shape = match rng.gen_range(0..3) {
            0 => LakeShape::Circular,
            1 => LakeShape::Elliptical,
            _ => LakeShape::Irregular,
        };
        let stretch = match shape {
            LakeShape::Elliptical => (rng.gen_range(1.0..=1.6), rng.gen_range(0.6..=1.0)),
            _ => (1.0, 1.0),
        };
        let tau = std::f32::consts::TAU;
        Self {
            shape,
            radius: rng.gen_range(params.min_lake_size..=params.max_lake_size),
            irregularity: rng.gen_range(0.3..=0.7),
            distortion: rng.gen_range(0.2..=0.5),
            lobes: f32::from(rng.gen_range(5u8..=10)),
            stretch,
            phases: [rng.gen_range(0.0..tau), rng.gen_range(0.0..tau), rng.gen_range(0.0..tau)],
        }
    }

    /// Boundary threshold in units of the base radius at `angle`.
    fn threshold(&self, angle: f32, distance: f32) -> f32 {
        let [p1, p2, p3] = self.phases;
        match self.shape {
            LakeShape::Circular => 1.0 + 0.1 * (angle * self.lobes + p1).sin() * (0.5 + self.irregularity),
            LakeShape::Elliptical => 1.0 + 0.15 * (angle * 8.0 + distance * 0.2 + p1).sin() * self.irregularity,
            LakeShape::Irregular => {
                let wobble = 0.2 * (angle * self.lobes + p1).sin()
                    + 0.15 * (angle * (self.lobes * 0.5 + 1.0) + p2).sin()
                    + 0.1 * (angle * 3.0 + p3).sin();
                1.0 + self.irregularity * wobble
            }
        }
    }
}

/// Carves lakes into a terrain grid.
pub struct LakeCarver<'a> {
    params: &'a RiverParams,
    detail: Perlin,
    jitter_seed: u64,
}

impl<'a> LakeCarver<'a> {
    /// Blend above which a tile is always water.
    const CORE_ALPHA: f32 = 0.8;
    /// Blend above which a tile is at least shore.
    const SHORE_ALPHA: f32 = 0.5;
    /// Core tiles below this blend may become islands.
    const ISLAND_ALPHA: f32 = 0.95;
    const ISLAND_CHANCE: f32 = 0.02;
    const SHORE_BEACH_CHANCE: f32 = 0.3;
    /// Lake tiles with fewer lake neighbors than this revert to plain.
    const MIN_LAKE_NEIGHBORS: usize = 3;

    /// Creates a carver for the given parameters.
    #[must_use]
    pub fn new(params: &'a RiverParams, seed: WorldSeed) -> Self {
        let lakes = seed.derive(purpose::LAKES);
        Self {
            params,
            detail: Perlin::new(lakes),
            jitter_seed: lakes.value(),
        }
    }

    /// Carves one lake centered on tile `center` and returns its lake tile count.
    ///
    /// Water and river tiles are never overwritten.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn carve(&self, terrain: &mut Grid<Terrain>, center: usize, rng: &mut ChaCha8Rng) -> usize {
        let outline = Outline::random(self.params, rng);
        let (cx, cy) = terrain.coords(center);
        let reach = (outline.radius * 1.6 * outline.stretch.0.max(outline.stretch.1)).ceil() as u32;
        let x0 = cx.saturating_sub(reach);
        let y0 = cy.saturating_sub(reach);
        let x1 = (cx + reach).min(terrain.width() - 1);
        let y1 = (cy + reach).min(terrain.height() - 1);

        let mut carved = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let index = terrain.index(x, y);
                if terrain[index].is_water() || terrain[index] == Terrain::Unknown {
                    continue;
                }
                let alpha = self.alpha(&outline, x, y, cx, cy);
                if alpha <= Self::SHORE_ALPHA {
                    continue;
                }
                let draw: f32 = rng.gen();
                let tile = if alpha > Self::CORE_ALPHA {
                    if alpha < Self::ISLAND_ALPHA && draw < Self::ISLAND_CHANCE {
                        Terrain::Plain
                    } else {
                        Terrain::Lake
                    }
                } else if draw < Self::SHORE_BEACH_CHANCE {
                    Terrain::Beach
                } else {
                    Terrain::Lake
                };
                terrain[index] = tile;
                if tile == Terrain::Lake {
                    carved.push(index);
                }
            }
        }

        // Isolated specks read as noise; fold them back into land.
        let mut stray = Vec::new();
        for &index in &carved {
            let (x, y) = terrain.coords(index);
            let lake_neighbors = terrain
                .neighbors8(x, y)
                .filter(|&(nx, ny)| terrain.at(nx, ny) == Terrain::Lake)
                .count();
            if lake_neighbors < Self::MIN_LAKE_NEIGHBORS {
                stray.push(index);
            }
        }
        for &index in &stray {
            terrain[index] = Terrain::Plain;
        }

        tracing::trace!(
            target: "mapforge::hydrology",
            x = cx,
            y = cy,
            shape = ?outline.shape,
            radius = outline.radius,
            tiles = carved.len() - stray.len(),
            "lake carved"
        );
        carved.len() - stray.len()
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn alpha(&self, outline: &Outline, x: u32, y: u32, cx: u32, cy: u32) -> f32 {
        let dx = (x as f32 - cx as f32) / outline.stretch.0;
        let dy = (y as f32 - cy as f32) / outline.stretch.1;
        let distance = (dx * dx + dy * dy).sqrt();
        let normalized = distance / outline.radius;
        let angle = dy.atan2(dx);

        let detail = self.detail.sample(f64::from(x) * 0.1, f64::from(y) * 0.1) as f32;
        let jitter = unit_hash(x, y, self.jitter_seed, 0x1A4E) - 0.5;
        let threshold = outline.threshold(angle, distance)
            * (1.0 + detail * 0.15)
            * (1.0 + jitter * outline.distortion * 0.2);

        1.0 - smoothstep(threshold - 0.3, threshold + 0.3, normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn carve_on(terrain: &mut Grid<Terrain>, center: usize, seed: u64) -> usize {
        let params = RiverParams {
            min_lake_size: 5.0,
            max_lake_size: 6.0,
            ..RiverParams::default()
        };
        let carver = LakeCarver::new(&params, WorldSeed::new(seed));
        carver.carve(terrain, center, &mut ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn test_lake_is_carved_around_center() {
        let mut terrain = Grid::filled(40, 40, Terrain::Plain).unwrap();
        let center = terrain.index(20, 20);
        let tiles = carve_on(&mut terrain, center, 3);
        assert!(tiles > 10, "only {tiles} lake tiles");
        assert_eq!(terrain.iter().filter(|&&t| t == Terrain::Lake).count(), tiles);
        assert_eq!(terrain.at(0, 0), Terrain::Plain);
    }

    #[test]
    fn test_water_is_never_overwritten() {
        let mut terrain = Grid::filled(40, 40, Terrain::Forest).unwrap();
        for y in 0..40 {
            terrain.set(20, y, Terrain::River);
            terrain.set(21, y, Terrain::DeepOcean);
        }
        let center = terrain.index(18, 20);
        carve_on(&mut terrain, center, 8);
        for y in 0..40 {
            assert_eq!(terrain.at(20, y), Terrain::River);
            assert_eq!(terrain.at(21, y), Terrain::DeepOcean);
        }
    }

    #[test]
    fn test_no_isolated_lake_tiles() {
        let mut terrain = Grid::filled(50, 50, Terrain::Hill).unwrap();
        for (i, seed) in [1u64, 2, 3, 4].into_iter().enumerate() {
            let center = terrain.index(12 + (i as u32 % 2) * 25, 12 + (i as u32 / 2) * 25);
            carve_on(&mut terrain, center, seed);
        }
        for y in 0..50 {
            for x in 0..50 {
                if terrain.at(x, y) == Terrain::Lake {
                    let n = terrain
                        .neighbors8(x, y)
                        .filter(|&(nx, ny)| terrain.at(nx, ny) == Terrain::Lake)
                        .count();
                    assert!(
                        n >= LakeCarver::MIN_LAKE_NEIGHBORS,
                        "lake tile at ({x}, {y}) has only {n} lake neighbors"
                    );
                }
            }
        }
    }
}
