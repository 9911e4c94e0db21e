//! Local consistency repair for decorations.
//!
//! A tile whose 8-neighborhood is less than half compatible with it switches
//! to the decoration its terrain allows that is compatible with the most
//! neighbors, preferring the most frequent neighbor decoration on a tie. A
//! tile only switches on a strict gain, so the number of compatible neighbor
//! pairs grows with every change and repair always settles.
//!
//! Sweeps visit the map in nine interleaved classes `(x % 3, y % 3)`. Two
//! tiles of one class are never neighbors, so a class is evaluated in
//! parallel against a frozen grid and its changes applied in chunk order.
//! The result does not depend on the worker count.
//!
//! Once settled, a tile below [`MIN_COMPATIBLE_RATIO`] has no allowed
//! decoration that would reach it, e.g. a lake tile on a sharp shore corner.

use std::cmp::Reverse;

use mapforge_core::{Grid, WorkerPool, DEFAULT_CHUNK_2D};

use crate::biome::Terrain;
use crate::decoration::Decoration;
use crate::error::{MapError, MapResult};

/// Most sweeps before repair gives up on settling.
pub const MAX_SWEEPS: u32 = 32;

/// Below this share of compatible neighbors a tile is repaired.
pub const MIN_COMPATIBLE_RATIO: f32 = 0.5;

/// Stride of the interleaved sweep classes.
const CLASS_STRIDE: u32 = 3;

/// Share of neighbors compatible with `decoration`, or 1 without neighbors.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compatible_ratio(decoration: Decoration, around: &[Decoration]) -> f32 {
    if around.is_empty() {
        return 1.0;
    }
    let compatible = around.iter().filter(|d| decoration.compatible(**d)).count();
    compatible as f32 / around.len() as f32
}

/// Decorations of the 8 neighbors of `(x, y)`.
#[must_use]
pub fn neighborhood(decoration: &Grid<Decoration>, x: u32, y: u32) -> Vec<Decoration> {
    decoration.neighbors8(x, y).map(|(nx, ny)| decoration.at(nx, ny)).collect()
}

/// Whether the tile is consistent, or no decoration `terrain` allows could
/// make it so against the same neighbors.
#[must_use]
pub fn is_settled(terrain: Terrain, current: Decoration, around: &[Decoration]) -> bool {
    compatible_ratio(current, around) >= MIN_COMPATIBLE_RATIO
        || !Decoration::ALL
            .iter()
            .any(|&d| terrain.allows(d) && compatible_ratio(d, around) >= MIN_COMPATIBLE_RATIO)
}

/// Decoration a tile should hold given its neighbors.
fn best_response(terrain: Terrain, current: Decoration, around: &[Decoration]) -> Decoration {
    if compatible_ratio(current, around) >= MIN_COMPATIBLE_RATIO {
        return current;
    }
    let score = |d: Decoration| around.iter().filter(|n| d.compatible(**n)).count();
    let frequency = |d: Decoration| around.iter().filter(|n| **n == d).count();
    let baseline = score(current);

    Decoration::ALL
        .iter()
        .copied()
        .filter(|&d| d != current && terrain.allows(d))
        .map(|d| (score(d), frequency(d), Reverse(d)))
        .filter(|&(s, _, _)| s > baseline)
        .max()
        .map_or(current, |(_, _, Reverse(d))| d)
}

/// Repairs `decoration` in place and returns the number of tile changes.
///
/// # Errors
///
/// Returns [`MapError::InvalidDimensions`] if `terrain` and
/// `decoration` disagree on their dimensions.
pub fn repair(pool: &WorkerPool, terrain: &Grid<Terrain>, decoration: &mut Grid<Decoration>) -> MapResult<usize> {
    let (width, height) = (terrain.width(), terrain.height());
    if (decoration.width(), decoration.height()) != (width, height) {
        return Err(MapError::InvalidDimensions {
            width: decoration.width(),
            height: decoration.height(),
        });
    }

    let mut changed_total = 0;
    let mut sweeps = 0;
    let mut settled = false;
    while sweeps < MAX_SWEEPS {
        sweeps += 1;
        let mut changed = 0;
        for class in 0..CLASS_STRIDE * CLASS_STRIDE {
            let (cx, cy) = (class % CLASS_STRIDE, class / CLASS_STRIDE);
            let frozen = &*decoration;
            let updates = pool.map_chunks_2d(width, height, DEFAULT_CHUNK_2D, |rect| {
                rect.iter()
                    .filter(|&(x, y)| x % CLASS_STRIDE == cx && y % CLASS_STRIDE == cy)
                    .filter_map(|(x, y)| {
                        let index = frozen.index(x, y);
                        let here = frozen[index];
                        let next = best_response(terrain.at(x, y), here, &neighborhood(frozen, x, y));
                        (next != here).then_some((index, next))
                    })
                    .collect::<Vec<_>>()
            });
            for (index, next) in updates.into_iter().flatten() {
                decoration[index] = next;
                changed += 1;
            }
        }
        changed_total += changed;
        if changed == 0 {
            settled = true;
            break;
        }
    }

    if !settled {
        tracing::warn!(target: "mapforge::decoration", sweeps, "consistency repair stopped before settling");
    }
    tracing::debug!(target: "mapforge::decoration", sweeps, repaired = changed_total, "consistency repaired");
    Ok(changed_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::unit_hash;

    fn assert_settled(terrain: &Grid<Terrain>, decoration: &Grid<Decoration>) {
        for y in 0..decoration.height() {
            for x in 0..decoration.width() {
                let around = neighborhood(decoration, x, y);
                assert!(
                    is_settled(terrain.at(x, y), decoration.at(x, y), &around),
                    "({x}, {y}) holds {:?} with ratio {} although a better decoration is allowed",
                    decoration.at(x, y),
                    compatible_ratio(decoration.at(x, y), &around)
                );
            }
        }
    }

    /// Plain and hill patches covered with random allowed decorations.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn scattered(width: u32, height: u32) -> (Grid<Terrain>, Grid<Decoration>) {
        let mut terrain = Grid::filled(width, height, Terrain::Plain).unwrap();
        let mut decoration = Grid::filled(width, height, Decoration::None).unwrap();
        for y in 0..height {
            for x in 0..width {
                let t = if (x / 6 + y / 5) % 2 == 0 { Terrain::Plain } else { Terrain::Hill };
                let allowed: Vec<Decoration> = Decoration::ALL.iter().copied().filter(|&d| t.allows(d)).collect();
                let pick = (unit_hash(x, y, 31, 2) * allowed.len() as f32) as usize;
                terrain.set(x, y, t);
                decoration.set(x, y, allowed[pick.min(allowed.len() - 1)]);
            }
        }
        (terrain, decoration)
    }

    #[test]
    fn test_isolated_tile_joins_neighborhood() {
        let terrain = Grid::filled(5, 5, Terrain::Plain).unwrap();
        let mut decoration = Grid::filled(5, 5, Decoration::Grass).unwrap();
        decoration.set(2, 2, Decoration::TreeDense);

        let changed = repair(&WorkerPool::sequential(), &terrain, &mut decoration).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(decoration.at(2, 2), Decoration::Grass);
    }

    #[test]
    fn test_compatible_neighbors_are_left_alone() {
        let terrain = Grid::filled(5, 5, Terrain::Plain).unwrap();
        let mut decoration = Grid::filled(5, 5, Decoration::Grass).unwrap();
        decoration.set(2, 2, Decoration::Flowers);
        let before = decoration.clone();
        assert_eq!(repair(&WorkerPool::sequential(), &terrain, &mut decoration).unwrap(), 0);
        assert_eq!(decoration, before);
    }

    #[test]
    fn test_terrain_rules_block_repair() {
        let mut terrain = Grid::filled(5, 5, Terrain::Lake).unwrap();
        let mut decoration = Grid::filled(5, 5, Decoration::Water).unwrap();
        terrain.set(2, 2, Terrain::Beach);
        decoration.set(2, 2, Decoration::Sand);

        repair(&WorkerPool::sequential(), &terrain, &mut decoration).unwrap();
        assert_eq!(decoration.at(2, 2), Decoration::Sand);
        assert!(is_settled(Terrain::Beach, Decoration::Sand, &neighborhood(&decoration, 2, 2)));
    }

    #[test]
    fn test_tie_prefers_the_most_frequent_neighbor() {
        let around = [
            Decoration::RockSmall,
            Decoration::RockSmall,
            Decoration::RockLarge,
            Decoration::Grass,
            Decoration::Grass,
            Decoration::Flowers,
            Decoration::Bush,
            Decoration::Snow,
        ];
        // Large rocks and grass both reach four compatible neighbors.
        let picked = best_response(Terrain::Hill, Decoration::TreeSnow, &around);
        assert_eq!(picked, Decoration::Grass);
        assert!(compatible_ratio(picked, &around) >= MIN_COMPATIBLE_RATIO);
    }

    #[test]
    fn test_candidates_need_not_be_neighbors() {
        // No allowed neighbor decoration reaches half, but large rocks
        // match both the rocks and the snow.
        let around = [
            Decoration::RockSmall,
            Decoration::RockSmall,
            Decoration::RockSmall,
            Decoration::Snow,
            Decoration::Snow,
            Decoration::Snow,
            Decoration::Grass,
            Decoration::Grass,
        ];
        assert!(compatible_ratio(Decoration::TreeSnow, &around) < MIN_COMPATIBLE_RATIO);
        let picked = best_response(Terrain::SnowMountain, Decoration::TreeSnow, &around);
        assert_eq!(picked, Decoration::RockLarge);
    }

    #[test]
    fn test_scattered_map_settles_everywhere() {
        let (terrain, mut decoration) = scattered(40, 30);
        let changed = repair(&WorkerPool::new(3), &terrain, &mut decoration).unwrap();
        assert!(changed > 0);
        assert_settled(&terrain, &decoration);
        for (t, d) in terrain.iter().zip(decoration.iter()) {
            assert!(t.allows(*d), "{d:?} placed on {t:?}");
        }
    }

    #[test]
    fn test_thread_count_does_not_change_repair() {
        let (terrain, raw) = scattered(50, 37);
        let run = |pool: WorkerPool| {
            let mut decoration = raw.clone();
            repair(&pool, &terrain, &mut decoration).unwrap();
            decoration
        };
        assert_eq!(
            run(WorkerPool::sequential()),
            run(WorkerPool::new(4).with_sequential_threshold(0))
        );
    }

    #[test]
    fn test_mismatched_grids_are_rejected() {
        let terrain = Grid::filled(4, 4, Terrain::Plain).unwrap();
        let mut decoration = Grid::filled(4, 5, Decoration::Grass).unwrap();
        assert!(matches!(
            repair(&WorkerPool::sequential(), &terrain, &mut decoration),
            Err(MapError::InvalidDimensions { width: 4, height: 5 })
        ));
    }

    #[test]
    fn test_ratio_without_neighbors() {
        assert_eq!(compatible_ratio(Decoration::Sand, &[]), 1.0);
    }
}
