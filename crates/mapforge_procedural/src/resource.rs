//! Resource deposits.
//!
//! A deposit is rolled per tile from a stateless hash of its position and
//! its terrain/decoration pair, then deposits with enough like neighbors
//! spread into adjacent empty tiles that can hold them.

use mapforge_core::{Grid, WorkerPool};
use serde::{Deserialize, Serialize};

use crate::biome::Terrain;
use crate::decoration::Decoration;
use crate::error::MapResult;
use crate::math::unit_hash;
use crate::noise::{purpose, WorldSeed};

/// Resource found on a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Resource {
    /// No resource.
    #[default]
    None = 0,
    /// Iron ore.
    Iron = 1,
    /// Copper ore.
    Copper = 2,
    /// Timber.
    Wood = 3,
    /// Clay.
    Clay = 4,
    /// Herbs.
    Herbs = 5,
    /// Fish.
    Fish = 6,
}

impl Resource {
    /// Every resource in id order.
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::Iron,
        Self::Copper,
        Self::Wood,
        Self::Clay,
        Self::Herbs,
        Self::Fish,
    ];

    /// Stable numeric id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Iron => "iron",
            Self::Copper => "copper",
            Self::Wood => "wood",
            Self::Clay => "clay",
            Self::Herbs => "herbs",
            Self::Fish => "fish",
        }
    }

    /// Whether a deposit of this resource can spread onto `terrain`.
    #[must_use]
    pub const fn fits(self, terrain: Terrain) -> bool {
        match self {
            Self::None => true,
            Self::Iron | Self::Copper => matches!(terrain, Terrain::Mountain | Terrain::Hill | Terrain::SnowMountain),
            Self::Wood => matches!(terrain, Terrain::Forest),
            Self::Clay => matches!(terrain, Terrain::Swamp),
            Self::Herbs => matches!(terrain, Terrain::Plain | Terrain::Forest | Terrain::Hill),
            Self::Fish => matches!(terrain, Terrain::River | Terrain::Lake),
        }
    }
}

const SALT_PRIMARY: u64 = 0x0E51;
const SALT_SECONDARY: u64 = 0x0E52;
/// Like neighbors a deposit needs before it spreads.
const SPREAD_NEIGHBORS: usize = 2;

/// Rolls the resource of one tile from two independent draws.
#[must_use]
pub fn roll_resource(terrain: Terrain, decoration: Decoration, first: f32, second: f32) -> Resource {
    match (terrain, decoration) {
        (Terrain::Mountain, Decoration::RockLarge) => {
            if first < 0.15 {
                Resource::Iron
            } else if second < 0.05 {
                Resource::Copper
            } else {
                Resource::None
            }
        }
        (Terrain::Forest, Decoration::TreeDense | Decoration::TreeSparse) if first < 0.3 => Resource::Wood,
        (Terrain::Plain, Decoration::Grass) if first < 0.1 => Resource::Herbs,
        (Terrain::Swamp, Decoration::Clay) if first < 0.2 => Resource::Clay,
        (Terrain::River, _) if first < 0.05 => Resource::Fish,
        _ => Resource::None,
    }
}

/// Rolls resources for every tile, then spreads dense deposits.
///
/// # Errors
///
/// Returns [`crate::MapError::Allocation`] when the grid cannot be allocated.
pub fn assign(
    pool: &WorkerPool,
    terrain: &Grid<Terrain>,
    decoration: &Grid<Decoration>,
    seed: WorldSeed,
) -> MapResult<Grid<Resource>> {
    let (width, height) = (terrain.width(), terrain.height());
    let seed = seed.derive(purpose::RESOURCES).value();
    let mut rolled = Grid::new(width, height)?;
    pool.fill_2d(width, height, rolled.as_mut_slice(), |x, y| {
        let salt = (u64::from(terrain.at(x, y).id()) << 8) | u64::from(decoration.at(x, y).id());
        roll_resource(
            terrain.at(x, y),
            decoration.at(x, y),
            unit_hash(x, y, seed, SALT_PRIMARY ^ salt),
            unit_hash(x, y, seed, SALT_SECONDARY ^ salt),
        )
    });

    let mut resources = Grid::new(width, height)?;
    pool.fill_2d(width, height, resources.as_mut_slice(), |x, y| spread_into(&rolled, terrain, x, y));

    tracing::debug!(
        target: "mapforge::decoration",
        rolled = rolled.iter().filter(|r| **r != Resource::None).count(),
        total = resources.iter().filter(|r| **r != Resource::None).count(),
        "resources assigned"
    );
    Ok(resources)
}

/// Whether the deposit at `(x, y)` is dense enough to spread.
fn spreads(rolled: &Grid<Resource>, x: u32, y: u32) -> bool {
    let resource = rolled.at(x, y);
    if resource == Resource::None {
        return false;
    }
    let (mut same, mut empty) = (0, 0);
    for (nx, ny) in rolled.neighbors8(x, y) {
        match rolled.at(nx, ny) {
            r if r == resource => same += 1,
            Resource::None => empty += 1,
            _ => {}
        }
    }
    same >= SPREAD_NEIGHBORS && empty > same
}

/// Resource of `(x, y)` after spreading, gathered from its neighbors.
///
/// An empty tile takes the spreading neighbor resource that appears most
/// often around it; ties go to the lower id.
fn spread_into(rolled: &Grid<Resource>, terrain: &Grid<Terrain>, x: u32, y: u32) -> Resource {
    let own = rolled.at(x, y);
    if own != Resource::None {
        return own;
    }
    let mut votes = [0u8; Resource::ALL.len()];
    for (nx, ny) in rolled.neighbors8(x, y) {
        let neighbor = rolled.at(nx, ny);
        if spreads(rolled, nx, ny) && neighbor.fits(terrain.at(x, y)) {
            votes[neighbor.id() as usize] += 1;
        }
    }
    votes
        .iter()
        .enumerate()
        .skip(1)
        .filter(|&(_, &v)| v > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map_or(Resource::None, |(id, _)| Resource::ALL[id])
}
