//! # Terrain Quality Tests
//!
//! Whole-pipeline properties: determinism, value ranges, plausible terrain
//! mixes, river walks and decoration consistency.

use std::collections::HashSet;
use std::sync::Arc;

use mapforge_core::WorkerPool;
use mapforge_procedural::consistency::{compatible_ratio, is_settled, neighborhood, MIN_COMPATIBLE_RATIO};
use mapforge_procedural::hydrology::trace_rivers;
use mapforge_procedural::{
    classify, generate_batch, GeneratedMap, GenerationConfig, MapGenerator, Preset, Terrain, WorldSeed,
};

fn scenario_config(seed: u64) -> GenerationConfig {
    GenerationConfig {
        width: 64,
        height: 64,
        seed,
        sea_level: 0.3,
        threads: 4,
        ..GenerationConfig::default()
    }
}

fn generate(config: &GenerationConfig) -> Arc<GeneratedMap> {
    MapGenerator::for_config(config).generate(config).expect("valid config")
}

/// Test: Identical configs give bit-identical grids, on any thread count.
#[test]
fn test_generation_is_deterministic() {
    let config = scenario_config(1);
    let a = generate(&config);
    let b = MapGenerator::new(WorkerPool::sequential()).generate(&config).expect("valid config");

    assert_eq!(a.elevation(), b.elevation(), "elevation differs between runs");
    assert_eq!(a.terrain(), b.terrain(), "terrain differs between runs");
    assert_eq!(a.decoration(), b.decoration(), "decoration differs between runs");
    assert_eq!(a.resources(), b.resources(), "resources differ between runs");
}

/// Test: Elevation stays in [0, 1] after the full pipeline.
#[test]
fn test_elevation_in_unit_range() {
    for preset in [Preset::Custom, Preset::Mountains, Preset::DesertCanyons] {
        let config = GenerationConfig {
            width: 96,
            height: 96,
            ..GenerationConfig::from_preset(preset)
        };
        let map = generate(&config);
        assert!(
            map.elevation().iter().all(|e| (0.0..=1.0).contains(e)),
            "{preset:?} produced elevation outside [0, 1]"
        );
    }
}

/// Test: The 64x64 seed 1 map is 20-60% water and has every major category.
#[test]
fn test_small_map_has_plausible_mix() {
    let map = generate(&scenario_config(1));
    let stats = map.statistics();

    println!("=== 64x64 seed 1 ===");
    for terrain in Terrain::ALL {
        println!("{:>14}: {}", terrain.name(), stats.count(terrain));
    }
    println!("water ratio: {:.2}", stats.water_ratio());

    assert!(
        (0.2..=0.6).contains(&stats.water_ratio()),
        "water ratio {:.2} outside the plausible band",
        stats.water_ratio()
    );
    assert!(
        stats.count(Terrain::DeepOcean) + stats.count(Terrain::ShallowOcean) > 0,
        "no ocean tiles"
    );
    assert!(stats.count(Terrain::Plain) > 0, "no plain tiles");
    assert!(stats.forest_tiles > 0, "no forest tiles");
    assert!(stats.mountain_tiles > 0, "no mountain tiles");
}

/// Test: The next seed changes the statistics.
#[test]
fn test_seed_changes_statistics() {
    let a = generate(&scenario_config(1));
    let b = generate(&scenario_config(2));
    let summary = |m: &GeneratedMap| {
        let s = m.statistics();
        (s.water_tiles, s.land_tiles, s.forest_tiles, s.mountain_tiles)
    };
    assert_ne!(summary(&a), summary(&b), "seed + 1 produced identical statistics");
}

/// Test: Without erosion iterations the field is the raw noise, renormalized only.
#[test]
fn test_zero_iteration_erosion_is_pass_through() {
    let mut config = scenario_config(5);
    config.erosion.iterations = 0;
    let generator = MapGenerator::for_config(&config);
    let raw = generator.generate_heightmap(&config).expect("valid config");
    let map = generator.generate(&config).expect("valid config");

    for (i, (before, after)) in raw.iter().zip(map.elevation().iter()).enumerate() {
        assert!((before - after).abs() < 1e-5, "tile {i}: {before} became {after}");
    }
}

/// Test: Ocean lies below sea level and peaks are mountains, before rivers are cut.
#[test]
fn test_classification_follows_height_bands() {
    let config = scenario_config(3);
    let map = generate(&config);
    let bands = config.bands();
    let terrain = classify(&WorkerPool::new(2), map.elevation(), &bands, &config.climate_model()).expect("valid grid");

    for (e, t) in map.elevation().iter().zip(terrain.iter()) {
        if *e < bands.sea_level {
            assert!(t.is_ocean(), "{e} below sea level classified as {t:?}");
        }
        if *e >= bands.mountain {
            assert!(
                matches!(t, Terrain::Mountain | Terrain::SnowMountain),
                "{e} above the mountain band classified as {t:?}"
            );
        }
    }
}

/// Test: Every river path descends (within tolerance), never revisits a tile and respects its length limit.
#[test]
fn test_river_walks_are_connected_and_bounded() {
    let mut config = scenario_config(11);
    (config.width, config.height) = (128, 128);
    config.rivers.count = 12;
    config.rivers.min_river_length = 1;
    let map = generate(&config);

    let pool = WorkerPool::new(2);
    let terrain = classify(&pool, map.elevation(), &config.bands(), &config.climate_model()).expect("valid grid");
    let (network, candidates) = trace_rivers(
        &pool,
        map.elevation(),
        &terrain,
        &config.rivers,
        config.sea_level,
        WorldSeed::new(config.seed),
    );
    println!("candidates: {candidates}, systems: {}", network.systems.len());

    let elevation = map.elevation();
    let tolerance = config.rivers.flat_tolerance + 1e-6;
    for system in &network.systems {
        for path in &system.paths {
            let limit = if path.branch_level == 0 {
                config.rivers.max_river_length
            } else {
                config.rivers.tributary_max_length
            };
            assert!(path.tiles.len() <= limit as usize, "path of {} tiles exceeds {limit}", path.tiles.len());

            let unique: HashSet<usize> = path.tiles.iter().copied().collect();
            assert_eq!(unique.len(), path.tiles.len(), "path revisits a tile");

            for pair in path.tiles.windows(2) {
                let ((ax, ay), (bx, by)) = (elevation.coords(pair[0]), elevation.coords(pair[1]));
                assert!(ax.abs_diff(bx) <= 1 && ay.abs_diff(by) <= 1, "path jumps between tiles");
                assert!(
                    elevation[pair[1]] <= elevation[pair[0]] + tolerance,
                    "path climbs from {} to {}",
                    elevation[pair[0]],
                    elevation[pair[1]]
                );
            }
        }
    }
}

/// Test: Every decoration is allowed by its terrain, and repair never leaves more inconsistent tiles.
#[test]
fn test_decoration_consistency() {
    let config = scenario_config(7);
    let repaired = generate(&config);
    let mut raw_config = config.clone();
    raw_config.decoration.repair = false;
    let raw = generate(&raw_config);

    for (t, d) in repaired.terrain().iter().zip(repaired.decoration().iter()) {
        assert!(t.allows(*d), "{d:?} placed on {t:?}");
    }

    let inconsistent = |map: &GeneratedMap| {
        let decoration = map.decoration();
        (0..decoration.height())
            .flat_map(|y| (0..decoration.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                compatible_ratio(decoration.at(x, y), &neighborhood(decoration, x, y)) < MIN_COMPATIBLE_RATIO
            })
            .count()
    };
    let (before, after) = (inconsistent(&raw), inconsistent(&repaired));
    println!("inconsistent tiles: {before} -> {after}");
    assert!(after <= before, "repair increased inconsistent tiles: {before} -> {after}");
}

/// Test: After repair every tile is at least half compatible with its
/// neighbors, unless no decoration its terrain allows would be.
#[test]
fn test_repaired_tiles_are_settled() {
    for seed in [1, 7, 42] {
        let map = generate(&scenario_config(seed));
        let (terrain, decoration) = (map.terrain(), map.decoration());
        for y in 0..decoration.height() {
            for x in 0..decoration.width() {
                let around = neighborhood(decoration, x, y);
                assert!(
                    is_settled(terrain.at(x, y), decoration.at(x, y), &around),
                    "seed {seed}: {:?} on {:?} at ({x}, {y}) is only {:.2} compatible",
                    decoration.at(x, y),
                    terrain.at(x, y),
                    compatible_ratio(decoration.at(x, y), &around)
                );
            }
        }
    }
}

/// Test: The cache hands back the same map, and batches offset the seed.
#[test]
fn test_cache_and_batch() {
    let config = scenario_config(21);
    let generator = MapGenerator::for_config(&config);
    let first = generator.generate(&config).expect("valid config");
    let again = generator.generate(&config).expect("valid config");
    assert!(Arc::ptr_eq(&first, &again), "identical config was regenerated");

    let batch = generate_batch(&generator, &config, 3).expect("valid config");
    assert!(Arc::ptr_eq(&batch[0], &first), "batch did not reuse the cached first map");
    assert_ne!(batch[1].terrain(), batch[2].terrain(), "batch maps are identical");
    assert_eq!(generator.cached_len(), 3);
}

/// Test: Presets survive a TOML round-trip and still generate.
#[test]
fn test_preset_from_toml() {
    let mut config = GenerationConfig::from_preset(Preset::Archipelago);
    (config.width, config.height) = (80, 80);
    let text = config.to_toml_string().expect("serializable");
    let parsed = GenerationConfig::from_toml_str(&text).expect("parsable");
    assert_eq!(parsed, config);

    let map = generate(&parsed);
    assert!(map.statistics().water_tiles > 0, "archipelago without water");
}
