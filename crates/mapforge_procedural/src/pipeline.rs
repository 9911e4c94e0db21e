//! # Generation Pipeline
//!
//! Runs the stages in strict order on one [`WorkerPool`]:
//!
//! ```text
//! noise -> erosion -> smoothing -> classify -> hydrology -> decoration
//!       -> consistency repair -> resources -> statistics
//! ```
//!
//! Each stage owns the grid it mutates until it returns. Results are
//! immutable and shared through [`Arc`], and a [`MapGenerator`] keeps an
//! instance-scoped cache keyed by [`GenerationConfig::cache_key`].
//!
//! A config with a non-zero `threads` runs on a pool of that size; zero uses
//! the generator's own pool. The output is identical either way, so the
//! thread count is not part of the cache key.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use mapforge_core::{Grid, WorkerPool};
use parking_lot::Mutex;

use crate::biome::{classify, Terrain};
use crate::config::GenerationConfig;
use crate::consistency;
use crate::decoration::{Decoration, Decorator};
use crate::erosion::Eroder;
use crate::error::MapResult;
use crate::heightmap::{smooth, HeightmapGenerator};
use crate::hydrology::{self, HydrologyReport};
use crate::noise::WorldSeed;
use crate::resource::{self, Resource};
use crate::stats::Statistics;

/// Radius of the box filter applied after erosion.
const SMOOTHING_RADIUS: u32 = 1;

/// The output of one generation run. Immutable once built.
#[derive(Clone, Debug)]
pub struct GeneratedMap {
    config: GenerationConfig,
    elevation: Grid<f32>,
    terrain: Grid<Terrain>,
    decoration: Grid<Decoration>,
    resources: Grid<Resource>,
    hydrology: HydrologyReport,
    statistics: Statistics,
}

impl GeneratedMap {
    /// Configuration this map was generated from.
    #[must_use]
    pub const fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Map width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.terrain.width()
    }

    /// Map height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.terrain.height()
    }

    /// Elevation in [0, 1].
    #[must_use]
    pub const fn elevation(&self) -> &Grid<f32> {
        &self.elevation
    }

    /// Terrain categories.
    #[must_use]
    pub const fn terrain(&self) -> &Grid<Terrain> {
        &self.terrain
    }

    /// Decorations.
    #[must_use]
    pub const fn decoration(&self) -> &Grid<Decoration> {
        &self.decoration
    }

    /// Resources.
    #[must_use]
    pub const fn resources(&self) -> &Grid<Resource> {
        &self.resources
    }

    /// Rivers and lakes added by the hydrology stage.
    #[must_use]
    pub const fn hydrology(&self) -> &HydrologyReport {
        &self.hydrology
    }

    /// Summary counts.
    #[must_use]
    pub const fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Terrain at `(x, y)`, or `None` outside the map.
    #[must_use]
    pub fn terrain_at(&self, x: u32, y: u32) -> Option<Terrain> {
        self.terrain.get(x, y).copied()
    }
}

/// Drives the pipeline and caches its results.
pub struct MapGenerator {
    pool: WorkerPool,
    cache: Mutex<HashMap<u64, Arc<GeneratedMap>>>,
}

impl Default for MapGenerator {
    fn default() -> Self {
        Self::new(WorkerPool::default())
    }
}

impl MapGenerator {
    /// Creates a generator running every stage on `pool`.
    #[must_use]
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a generator with the thread count `config` asks for.
    #[must_use]
    pub fn for_config(config: &GenerationConfig) -> Self {
        Self::new(WorkerPool::new(config.threads))
    }

    /// Worker pool used when a config leaves `threads` at 0.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Pool a run of `config` uses.
    #[must_use]
    pub fn pool_for(&self, config: &GenerationConfig) -> Cow<'_, WorkerPool> {
        if config.threads == 0 || config.threads == self.pool.threads() {
            Cow::Borrowed(&self.pool)
        } else {
            Cow::Owned(WorkerPool::new(config.threads))
        }
    }

    /// Number of cached maps.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drops every cached map.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Generates a map, or returns the cached one for an identical config.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is allocated, or
    /// [`crate::MapError::Allocation`] when a grid cannot be allocated.
    pub fn generate(&self, config: &GenerationConfig) -> MapResult<Arc<GeneratedMap>> {
        config.validate()?;
        let key = config.cache_key();
        if let Some(hit) = self.cache.lock().get(&key) {
            tracing::debug!(target: "mapforge::pipeline", key, "cache hit");
            return Ok(Arc::clone(hit));
        }

        let map = Arc::new(self.run(config)?);
        // A concurrent run of the same config may have finished first; both
        // results are identical, so keep whichever landed.
        let map = Arc::clone(self.cache.lock().entry(key).or_insert(map));
        Ok(map)
    }

    /// Raw normalized noise before erosion, as the first stage produces it.
    ///
    /// # Errors
    ///
    /// Same as [`MapGenerator::generate`].
    pub fn generate_heightmap(&self, config: &GenerationConfig) -> MapResult<Grid<f32>> {
        config.validate()?;
        raw_heightmap(&self.pool_for(config), config)
    }

    fn run(&self, config: &GenerationConfig) -> MapResult<GeneratedMap> {
        let started = Instant::now();
        let run_pool = self.pool_for(config);
        let pool: &WorkerPool = &run_pool;
        let seed = WorldSeed::new(config.seed);
        tracing::info!(
            target: "mapforge::pipeline",
            width = config.width,
            height = config.height,
            seed = config.seed,
            preset = ?config.preset,
            threads = pool.threads(),
            "generation started"
        );

        let mut stage = Instant::now();
        let mut elevation = raw_heightmap(pool, config)?;
        tracing::debug!(target: "mapforge::noise", elapsed_ms = elapsed_ms(stage), "heightmap generated");

        stage = Instant::now();
        Eroder::new(&config.erosion).apply(pool, &mut elevation);
        if config.erosion.iterations > 0 {
            smooth(pool, &mut elevation, SMOOTHING_RADIUS);
        }
        tracing::debug!(
            target: "mapforge::erosion",
            iterations = config.erosion.iterations,
            elapsed_ms = elapsed_ms(stage),
            "erosion applied"
        );

        stage = Instant::now();
        let climate = config.climate_model();
        let mut terrain = classify(pool, &elevation, &config.bands(), &climate)?;
        tracing::debug!(target: "mapforge::classify", elapsed_ms = elapsed_ms(stage), "classification done");

        stage = Instant::now();
        let hydrology = hydrology::synthesize(pool, &elevation, &mut terrain, &config.rivers, config.sea_level, seed);
        tracing::debug!(target: "mapforge::hydrology", elapsed_ms = elapsed_ms(stage), "hydrology done");

        stage = Instant::now();
        let mut decoration = Decorator::new(&config.decoration, &climate, seed).decorate(pool, &elevation, &terrain)?;
        if config.decoration.repair {
            consistency::repair(pool, &terrain, &mut decoration)?;
        }
        let resources = if config.decoration.resources {
            resource::assign(pool, &terrain, &decoration, seed)?
        } else {
            Grid::filled(config.width, config.height, Resource::None)?
        };
        tracing::debug!(target: "mapforge::decoration", elapsed_ms = elapsed_ms(stage), "decoration done");

        let mut statistics = Statistics::collect(pool, &elevation, &terrain, &decoration, &resources);
        statistics.generation_ms = elapsed_ms(started);
        tracing::info!(
            target: "mapforge::pipeline",
            elapsed_ms = statistics.generation_ms,
            water_ratio = statistics.water_ratio(),
            rivers = hydrology.rivers,
            lakes = hydrology.lakes,
            "generation finished"
        );

        Ok(GeneratedMap {
            config: config.clone(),
            elevation,
            terrain,
            decoration,
            resources,
            hydrology,
            statistics,
        })
    }
}

fn raw_heightmap(pool: &WorkerPool, config: &GenerationConfig) -> MapResult<Grid<f32>> {
    HeightmapGenerator::new(WorldSeed::new(config.seed)).generate(pool, config.width, config.height, &config.noise_params())
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Generates `count` maps from `base`, the i-th with seed `base.seed + i`.
///
/// Maps are generated one after another; each run already spreads its
/// stages over every worker of the generator's pool.
///
/// # Errors
///
/// Stops at the first failing run.
pub fn generate_batch(generator: &MapGenerator, base: &GenerationConfig, count: u32) -> MapResult<Vec<Arc<GeneratedMap>>> {
    (0..count)
        .map(|i| {
            let config = GenerationConfig {
                seed: base.seed.wrapping_add(u64::from(i)),
                ..base.clone()
            };
            generator.generate(&config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;

    fn small(seed: u64) -> GenerationConfig {
        GenerationConfig {
            width: 48,
            height: 48,
            seed,
            noise_scale: 24.0,
            threads: 2,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_cache_returns_same_map() {
        let generator = MapGenerator::new(WorkerPool::new(2));
        let first = generator.generate(&small(3)).unwrap();
        let second = generator.generate(&small(3)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(generator.cached_len(), 1);

        generator.clear_cache();
        assert_eq!(generator.cached_len(), 0);
        let third = generator.generate(&small(3)).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.terrain(), third.terrain());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let generator = MapGenerator::new(WorkerPool::sequential());
        let config = GenerationConfig {
            height: 0,
            ..small(1)
        };
        assert!(matches!(generator.generate(&config), Err(MapError::InvalidDimensions { .. })));
        assert_eq!(generator.cached_len(), 0);
    }

    #[test]
    fn test_accessors_share_one_shape() {
        let generator = MapGenerator::new(WorkerPool::new(2));
        let map = generator.generate(&small(9)).unwrap();
        assert_eq!((map.width(), map.height()), (48, 48));
        for len in [map.elevation().len(), map.decoration().len(), map.resources().len()] {
            assert_eq!(len, map.terrain().len());
        }
        assert_eq!(map.terrain_at(0, 0), Some(map.terrain().at(0, 0)));
        assert_eq!(map.terrain_at(48, 0), None);
        assert_eq!(map.config().seed, 9);
        assert_eq!(map.statistics().water_tiles + map.statistics().land_tiles, 48 * 48);
    }

    #[test]
    fn test_batch_offsets_seeds() {
        let generator = MapGenerator::new(WorkerPool::new(2));
        let maps = generate_batch(&generator, &small(100), 3).unwrap();
        let seeds: Vec<u64> = maps.iter().map(|m| m.config().seed).collect();
        assert_eq!(seeds, vec![100, 101, 102]);
        assert_eq!(generator.cached_len(), 3);
    }

    #[test]
    fn test_thread_count_shares_cache_and_sizes_the_pool() {
        let generator = MapGenerator::new(WorkerPool::new(2));
        assert_eq!(generator.pool_for(&small(4)).threads(), 2);
        let wide = GenerationConfig { threads: 3, ..small(4) };
        assert_eq!(generator.pool_for(&wide).threads(), 3);
        let inherit = GenerationConfig { threads: 0, ..small(4) };
        assert_eq!(generator.pool_for(&inherit).threads(), 2);

        let first = generator.generate(&small(4)).unwrap();
        let again = generator.generate(&wide).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(generator.cached_len(), 1);

        generator.clear_cache();
        let fresh = generator.generate(&wide).unwrap();
        assert_eq!(first.terrain(), fresh.terrain());
        assert_eq!(first.decoration(), fresh.decoration());
    }

    #[test]
    fn test_disabled_resources_stay_empty() {
        let mut config = small(5);
        config.decoration.resources = false;
        let map = MapGenerator::new(WorkerPool::new(2)).generate(&config).unwrap();
        assert!(map.resources().iter().all(|r| *r == Resource::None));
        assert_eq!(map.statistics().resource_tiles, 0);
    }
}
