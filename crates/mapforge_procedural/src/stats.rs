//! Summary statistics of a generated map.

use mapforge_core::{Grid, WorkerPool, DEFAULT_CHUNK_2D};
use serde::{Deserialize, Serialize};

use crate::biome::Terrain;
use crate::decoration::Decoration;
use crate::resource::Resource;

/// Tile counts and elevation range of one map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Tiles per terrain, indexed by [`Terrain::id`].
    pub terrain_counts: [usize; Terrain::COUNT],
    /// Ocean, coast, lake and river tiles.
    pub water_tiles: usize,
    /// Classified tiles that are not water.
    pub land_tiles: usize,
    /// Forest tiles.
    pub forest_tiles: usize,
    /// Mountain and snow mountain tiles.
    pub mountain_tiles: usize,
    /// River tiles.
    pub river_tiles: usize,
    /// Lake tiles.
    pub lake_tiles: usize,
    /// Tiles holding any decoration.
    pub decorated_tiles: usize,
    /// Tiles holding any resource.
    pub resource_tiles: usize,
    /// Lowest elevation.
    pub min_elevation: f32,
    /// Highest elevation.
    pub max_elevation: f32,
    /// Mean elevation.
    pub avg_elevation: f32,
    /// Wall-clock generation time.
    pub generation_ms: f64,
}

/// Partial tallies of one chunk.
#[derive(Default)]
struct Tally {
    terrain: [usize; Terrain::COUNT],
    decorated: usize,
    resources: usize,
    elevation_sum: f64,
    min: f32,
    max: f32,
}

impl Statistics {
    /// Counts every grid; all four must share one shape.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn collect(
        pool: &WorkerPool,
        elevation: &Grid<f32>,
        terrain: &Grid<Terrain>,
        decoration: &Grid<Decoration>,
        resources: &Grid<Resource>,
    ) -> Self {
        let (width, height) = (terrain.width(), terrain.height());
        let tallies = pool.map_chunks_2d(width, height, DEFAULT_CHUNK_2D * 4, |rect| {
            let mut tally = Tally {
                min: f32::INFINITY,
                max: f32::NEG_INFINITY,
                ..Tally::default()
            };
            for (x, y) in rect.iter() {
                let i = terrain.index(x, y);
                tally.terrain[terrain[i].id() as usize] += 1;
                tally.decorated += usize::from(decoration[i] != Decoration::None);
                tally.resources += usize::from(resources[i] != Resource::None);
                let e = elevation[i];
                tally.elevation_sum += f64::from(e);
                tally.min = tally.min.min(e);
                tally.max = tally.max.max(e);
            }
            tally
        });

        let mut stats = Self {
            min_elevation: f32::INFINITY,
            max_elevation: f32::NEG_INFINITY,
            ..Self::default()
        };
        let mut elevation_sum = 0.0;
        for tally in tallies {
            for (total, count) in stats.terrain_counts.iter_mut().zip(tally.terrain) {
                *total += count;
            }
            stats.decorated_tiles += tally.decorated;
            stats.resource_tiles += tally.resources;
            elevation_sum += tally.elevation_sum;
            stats.min_elevation = stats.min_elevation.min(tally.min);
            stats.max_elevation = stats.max_elevation.max(tally.max);
        }

        let count = |t: Terrain| stats.terrain_counts[t.id() as usize];
        stats.water_tiles = Terrain::ALL.iter().filter(|t| t.is_water()).map(|&t| count(t)).sum();
        stats.land_tiles = Terrain::ALL.iter().filter(|t| t.is_land()).map(|&t| count(t)).sum();
        stats.forest_tiles = count(Terrain::Forest);
        stats.mountain_tiles = count(Terrain::Mountain) + count(Terrain::SnowMountain);
        stats.river_tiles = count(Terrain::River);
        stats.lake_tiles = count(Terrain::Lake);

        let tiles = terrain.len();
        if tiles == 0 {
            stats.min_elevation = 0.0;
            stats.max_elevation = 0.0;
        } else {
            stats.avg_elevation = (elevation_sum / tiles as f64) as f32;
        }
        stats
    }

    /// Tiles of one terrain.
    #[inline]
    #[must_use]
    pub const fn count(&self, terrain: Terrain) -> usize {
        self.terrain_counts[terrain.id() as usize]
    }

    /// Water tiles over all tiles, 0 for an empty map.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn water_ratio(&self) -> f32 {
        let total = self.water_tiles + self.land_tiles;
        if total == 0 {
            0.0
        } else {
            self.water_tiles as f32 / total as f32
        }
    }
}
