//! # Decoration Placement
//!
//! Secondary per-tile detail on top of terrain: trees, rocks, ground cover,
//! reeds.
//!
//! ## Passes
//!
//! ```text
//! base (terrain → decoration) ─► trees ─► rocks ─► vegetation ─► reeds
//! ```
//!
//! Every pass reads a snapshot of the previous pass and draws from a stateless
//! per-tile hash, so it can be filled in parallel. The reed pass is the one
//! exception: its spacing rule is committed sequentially in row-major order.
//! Each pass only emits decorations that [`Terrain::allows`].

use mapforge_core::{Grid, WorkerPool};
use serde::{Deserialize, Serialize};

use crate::biome::Terrain;
use crate::climate::{ClimateModel, ClimateType};
use crate::error::{MapError, MapResult};
use crate::math::unit_hash;
use crate::noise::{purpose, WorldSeed};

/// Decoration tag of a tile. Ids continue after the terrain ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Decoration {
    /// Nothing.
    #[default]
    None = 0,
    /// Dense tree canopy.
    TreeDense = 14,
    /// Scattered trees.
    TreeSparse = 15,
    /// Palm trees.
    TreePalm = 16,
    /// Snow-covered conifers.
    TreeSnow = 17,
    /// Small rocks.
    RockSmall = 18,
    /// Boulders.
    RockLarge = 19,
    /// Bushes.
    Bush = 20,
    /// Flowers.
    Flowers = 21,
    /// Grass.
    Grass = 22,
    /// Sand.
    Sand = 23,
    /// Clay.
    Clay = 24,
    /// Snow.
    Snow = 25,
    /// Open water.
    Water = 26,
    /// Reeds.
    Reeds = 27,
}

impl Decoration {
    /// Every decoration in id order.
    pub const ALL: [Self; 15] = [
        Self::None,
        Self::TreeDense,
        Self::TreeSparse,
        Self::TreePalm,
        Self::TreeSnow,
        Self::RockSmall,
        Self::RockLarge,
        Self::Bush,
        Self::Flowers,
        Self::Grass,
        Self::Sand,
        Self::Clay,
        Self::Snow,
        Self::Water,
        Self::Reeds,
    ];

    /// Stable numeric id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Converts from an id; unknown ids map to `None`.
    #[must_use]
    pub fn from_id(id: u8) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.id() == id)
            .unwrap_or(Self::None)
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TreeDense => "dense trees",
            Self::TreeSparse => "sparse trees",
            Self::TreePalm => "palm trees",
            Self::TreeSnow => "snow trees",
            Self::RockSmall => "small rocks",
            Self::RockLarge => "large rocks",
            Self::Bush => "bushes",
            Self::Flowers => "flowers",
            Self::Grass => "grass",
            Self::Sand => "sand",
            Self::Clay => "clay",
            Self::Snow => "snow",
            Self::Water => "water",
            Self::Reeds => "reeds",
        }
    }

    /// Any of the tree variants.
    #[inline]
    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(self, Self::TreeDense | Self::TreeSparse | Self::TreePalm | Self::TreeSnow)
    }

    /// Either rock variant.
    #[inline]
    #[must_use]
    pub const fn is_rock(self) -> bool {
        matches!(self, Self::RockSmall | Self::RockLarge)
    }

    /// Whether two decorations may sit side by side.
    ///
    /// Symmetric; every decoration is compatible with itself.
    #[must_use]
    pub fn compatible(self, other: Self) -> bool {
        const PAIRS: [(Decoration, Decoration); 11] = [
            (Decoration::Grass, Decoration::Flowers),
            (Decoration::Grass, Decoration::Bush),
            (Decoration::Grass, Decoration::TreeSparse),
            (Decoration::TreeDense, Decoration::TreeSparse),
            (Decoration::TreePalm, Decoration::TreeSparse),
            (Decoration::RockSmall, Decoration::RockLarge),
            (Decoration::Sand, Decoration::RockSmall),
            (Decoration::Water, Decoration::Reeds),
            (Decoration::Bush, Decoration::Clay),
            (Decoration::Snow, Decoration::RockLarge),
            (Decoration::Snow, Decoration::TreeSnow),
        ];
        self == other
            || PAIRS
                .iter()
                .any(|&(a, b)| (a == self && b == other) || (a == other && b == self))
    }
}

impl Terrain {
    /// Whether `decoration` may be placed on this terrain.
    #[must_use]
    pub const fn allows(self, decoration: Decoration) -> bool {
        use Decoration as D;
        match self {
            Self::Unknown => matches!(decoration, D::None),
            Self::DeepOcean => matches!(decoration, D::Water),
            Self::ShallowOcean | Self::River | Self::Lake => matches!(decoration, D::Water | D::Reeds),
            Self::Coast => matches!(decoration, D::Sand | D::RockSmall | D::Reeds),
            Self::Beach => matches!(decoration, D::Sand | D::RockSmall | D::Grass),
            Self::Plain => matches!(
                decoration,
                D::Grass | D::Flowers | D::Bush | D::TreeSparse | D::TreeDense | D::TreePalm | D::RockSmall
            ),
            Self::Forest => matches!(
                decoration,
                D::TreeDense | D::TreeSparse | D::TreePalm | D::TreeSnow | D::Bush | D::Grass | D::Flowers
            ),
            Self::Hill => matches!(
                decoration,
                D::Grass | D::Bush | D::Flowers | D::RockSmall | D::RockLarge | D::TreeSparse | D::TreeDense | D::TreeSnow
            ),
            Self::Mountain => matches!(decoration, D::RockSmall | D::RockLarge | D::Snow | D::TreeSnow | D::Grass),
            Self::SnowMountain => matches!(decoration, D::Snow | D::RockLarge | D::RockSmall | D::TreeSnow),
            Self::Desert => matches!(decoration, D::Sand | D::RockSmall | D::RockLarge | D::Bush),
            Self::Swamp => matches!(decoration, D::Bush | D::Clay | D::Reeds | D::Grass | D::Flowers),
        }
    }
}

/// Decoration densities and pass toggles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorationParams {
    /// Chance that open grassland grows a tree.
    pub tree_density: f32,
    /// Radius searched for an existing tree cluster.
    pub tree_cluster_radius: u32,
    /// Chance that a hill or desert tile gets rocks.
    pub rock_density: f32,
    /// Extra rock chance on steep tiles, as a multiplier offset.
    pub rock_slope_bias: f32,
    /// Chance that a dry beach tile grows dune grass.
    pub grass_density: f32,
    /// Bush chance on grass, scaled by moisture.
    pub bush_density: f32,
    /// Flower chance on grass, scaled by moisture.
    pub flower_density: f32,
    /// Minimum distance between committed reed tiles.
    pub reed_spacing: f32,
    /// Run the tree pass.
    pub trees: bool,
    /// Run the rock pass.
    pub rocks: bool,
    /// Run the ground cover pass.
    pub vegetation: bool,
    /// Run the reed pass.
    pub reeds: bool,
    /// Assign resources.
    pub resources: bool,
    /// Run the consistency repair.
    pub repair: bool,
}

impl Default for DecorationParams {
    fn default() -> Self {
        Self {
            tree_density: 0.3,
            tree_cluster_radius: 5,
            rock_density: 0.1,
            rock_slope_bias: 0.8,
            grass_density: 0.6,
            bush_density: 0.2,
            flower_density: 0.05,
            reed_spacing: 1.2,
            trees: true,
            rocks: true,
            vegetation: true,
            reeds: true,
            resources: true,
            repair: true,
        }
    }
}

impl DecorationParams {
    /// Defaults adjusted for a climate.
    #[must_use]
    pub fn for_climate(climate: ClimateType) -> Self {
        let mut params = Self::default();
        match climate {
            ClimateType::Tropical => {
                params.tree_density = 0.4;
                params.grass_density = 0.7;
                params.bush_density = 0.3;
            }
            ClimateType::Arid => {
                params.tree_density = 0.05;
                params.grass_density = 0.2;
                params.rock_density = 0.3;
            }
            ClimateType::Polar => {
                params.tree_density = 0.1;
                params.grass_density = 0.3;
            }
            ClimateType::Temperate | ClimateType::Continental | ClimateType::Mediterranean => {}
        }
        params
    }

    /// Rejects densities outside [0, 1] and negative spacing.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> MapResult<()> {
        for (name, density) in [
            ("decoration.tree_density", self.tree_density),
            ("decoration.rock_density", self.rock_density),
            ("decoration.grass_density", self.grass_density),
            ("decoration.bush_density", self.bush_density),
            ("decoration.flower_density", self.flower_density),
        ] {
            if !(0.0..=1.0).contains(&density) {
                return Err(MapError::invalid(name, "density must be in [0, 1]"));
            }
        }
        if !(self.rock_slope_bias.is_finite() && self.rock_slope_bias >= 0.0) {
            return Err(MapError::invalid("decoration.rock_slope_bias", "must be zero or positive"));
        }
        if !(self.reed_spacing.is_finite() && self.reed_spacing >= 0.0) {
            return Err(MapError::invalid("decoration.reed_spacing", "must be zero or positive"));
        }
        Ok(())
    }
}

// Salts separating the per-tile draws of each pass.
const SALT_SWAMP: u64 = 0x5701;
const SALT_TREE: u64 = 0x7EE1;
const SALT_TREE_KIND: u64 = 0x7EE2;
const SALT_ROCK: u64 = 0x70C1;
const SALT_BUSH: u64 = 0xB051;
const SALT_FLOWER: u64 = 0xF10E;
const SALT_GRASS: u64 = 0x6A55;
const SALT_REED: u64 = 0x4EED;

/// Height difference to a neighbor above which a tile counts as steep.
const STEEP_SLOPE: f32 = 0.02;
/// Trees within the cluster radius needed for the cluster bonus.
const CLUSTER_TREES: usize = 3;
/// Above this elevation trees of a cold map are snow trees.
const FROST_LINE: f32 = 0.5;

/// Decoration implied by terrain alone. `cold` marks a map whose base
/// temperature is low, see [`ClimateModel::is_cold`].
#[must_use]
pub fn base_decoration(terrain: Terrain, elevation: f32, cold: bool, climate: ClimateType, swamp_draw: f32) -> Decoration {
    match terrain {
        Terrain::Forest => {
            if cold && elevation > FROST_LINE {
                Decoration::TreeSnow
            } else if climate == ClimateType::Tropical && elevation < 0.5 {
                Decoration::TreePalm
            } else if elevation > 0.5 {
                Decoration::TreeDense
            } else {
                Decoration::TreeSparse
            }
        }
        Terrain::Mountain => {
            if elevation > 0.8 {
                Decoration::RockLarge
            } else {
                Decoration::RockSmall
            }
        }
        Terrain::Hill | Terrain::Plain => Decoration::Grass,
        Terrain::Beach | Terrain::Coast | Terrain::Desert => Decoration::Sand,
        Terrain::Swamp => {
            if swamp_draw < 0.25 {
                Decoration::Clay
            } else {
                Decoration::Bush
            }
        }
        Terrain::SnowMountain => Decoration::Snow,
        Terrain::DeepOcean | Terrain::ShallowOcean | Terrain::River | Terrain::Lake => Decoration::Water,
        Terrain::Unknown => Decoration::None,
    }
}

/// Largest height difference to any neighbor; 0 on the border.
fn slope(elevation: &Grid<f32>, x: u32, y: u32) -> f32 {
    if elevation.is_border(x, y) {
        return 0.0;
    }
    let h = elevation.at(x, y);
    elevation
        .neighbors8(x, y)
        .map(|(nx, ny)| (elevation.at(nx, ny) - h).abs())
        .fold(0.0, f32::max)
}

/// In-bounds tiles of the square window of `radius` around `(x, y)`.
fn window<T: Copy>(grid: &Grid<T>, x: u32, y: u32, radius: u32) -> impl Iterator<Item = (u32, u32, T)> + '_ {
    let x0 = x.saturating_sub(radius);
    let y0 = y.saturating_sub(radius);
    let x1 = (x + radius).min(grid.width() - 1);
    let y1 = (y + radius).min(grid.height() - 1);
    (y0..=y1).flat_map(move |sy| (x0..=x1).map(move |sx| (sx, sy, grid.at(sx, sy))))
}

/// Places decorations on a classified map.
pub struct Decorator<'a> {
    params: &'a DecorationParams,
    climate: &'a ClimateModel,
    seed: u64,
}

impl<'a> Decorator<'a> {
    /// Creates a decorator.
    #[must_use]
    pub fn new(params: &'a DecorationParams, climate: &'a ClimateModel, seed: WorldSeed) -> Self {
        Self {
            params,
            climate,
            seed: seed.derive(purpose::DECORATION).value(),
        }
    }

    #[inline]
    fn draw(&self, x: u32, y: u32, salt: u64) -> f32 {
        unit_hash(x, y, self.seed, salt)
    }

    /// Runs the base decoration and every enabled refinement pass.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Allocation`] when a grid cannot be allocated.
    pub fn decorate(&self, pool: &WorkerPool, elevation: &Grid<f32>, terrain: &Grid<Terrain>) -> MapResult<Grid<Decoration>> {
        let (width, height) = (terrain.width(), terrain.height());
        let mut decoration = Grid::new(width, height)?;
        let climate = self.climate.climate();
        let cold = self.climate.is_cold();
        pool.fill_2d(width, height, decoration.as_mut_slice(), |x, y| {
            base_decoration(terrain.at(x, y), elevation.at(x, y), cold, climate, self.draw(x, y, SALT_SWAMP))
        });

        if self.params.trees {
            self.place_trees(pool, elevation, terrain, &mut decoration);
        }
        if self.params.rocks {
            self.place_rocks(pool, elevation, terrain, &mut decoration);
        }
        if self.params.vegetation {
            self.place_vegetation(pool, elevation, terrain, &mut decoration);
        }
        let reeds = if self.params.reeds {
            self.place_reeds(pool, elevation, terrain, &mut decoration)?
        } else {
            0
        };

        tracing::debug!(target: "mapforge::decoration", width, height, reeds, "decorations placed");
        Ok(decoration)
    }

    /// Scattered trees on open grass, more likely next to existing trees.
    fn place_trees(&self, pool: &WorkerPool, elevation: &Grid<f32>, terrain: &Grid<Terrain>, decoration: &mut Grid<Decoration>) {
        let before = decoration.clone();
        let p = self.params;
        let tropical = self.climate.climate() == ClimateType::Tropical;
        let cold = self.climate.is_cold();
        pool.fill_2d(terrain.width(), terrain.height(), decoration.as_mut_slice(), |x, y| {
            let current = before.at(x, y);
            let t = terrain.at(x, y);
            if current != Decoration::Grass || !matches!(t, Terrain::Plain | Terrain::Hill) {
                return current;
            }

            let e = elevation.at(x, y);
            let mut chance = p.tree_density * 0.5;
            if e > 0.7 {
                chance *= 0.5;
            }
            let trees = window(&before, x, y, p.tree_cluster_radius)
                .filter(|&(_, _, d)| d.is_tree())
                .count();
            if trees >= CLUSTER_TREES {
                chance *= 1.5;
            }
            if self.draw(x, y, SALT_TREE) >= chance {
                return current;
            }

            let tree = if cold && e > FROST_LINE {
                Decoration::TreeSnow
            } else if tropical && e < 0.5 {
                Decoration::TreePalm
            } else if self.draw(x, y, SALT_TREE_KIND) < 0.3 {
                Decoration::TreeDense
            } else {
                Decoration::TreeSparse
            };
            if t.allows(tree) {
                tree
            } else {
                current
            }
        });
    }

    /// Rocks on hills and deserts, favoring steep tiles.
    fn place_rocks(&self, pool: &WorkerPool, elevation: &Grid<f32>, terrain: &Grid<Terrain>, decoration: &mut Grid<Decoration>) {
        let before = decoration.clone();
        let p = self.params;
        pool.fill_2d(terrain.width(), terrain.height(), decoration.as_mut_slice(), |x, y| {
            let current = before.at(x, y);
            let t = terrain.at(x, y);
            let ground = matches!((t, current), (Terrain::Hill, Decoration::Grass) | (Terrain::Desert, Decoration::Sand));
            if !ground {
                return current;
            }

            let mut chance = p.rock_density;
            if slope(elevation, x, y) > STEEP_SLOPE {
                chance *= 1.0 + p.rock_slope_bias;
            }
            if self.draw(x, y, SALT_ROCK) >= chance {
                return current;
            }
            if elevation.at(x, y) > 0.85 {
                Decoration::RockLarge
            } else {
                Decoration::RockSmall
            }
        });
    }

    /// Bushes, flowers and dune grass, in that priority.
    fn place_vegetation(&self, pool: &WorkerPool, elevation: &Grid<f32>, terrain: &Grid<Terrain>, decoration: &mut Grid<Decoration>) {
        let before = decoration.clone();
        let p = self.params;
        pool.fill_2d(terrain.width(), terrain.height(), decoration.as_mut_slice(), |x, y| {
            let current = before.at(x, y);
            let t = terrain.at(x, y);
            let e = elevation.at(x, y);
            match (t, current) {
                (_, Decoration::Grass) => {
                    let moisture = self.climate.moisture(x, y, e);
                    if self.draw(x, y, SALT_BUSH) < p.bush_density * moisture && t.allows(Decoration::Bush) {
                        Decoration::Bush
                    } else if self.draw(x, y, SALT_FLOWER) < p.flower_density * moisture && t.allows(Decoration::Flowers) {
                        Decoration::Flowers
                    } else {
                        current
                    }
                }
                (Terrain::Beach, Decoration::Sand) => {
                    let dry = terrain.neighbors8(x, y).all(|(nx, ny)| !terrain.at(nx, ny).is_water());
                    let moisture = self.climate.moisture(x, y, e);
                    if dry && self.draw(x, y, SALT_GRASS) < p.grass_density * moisture {
                        Decoration::Grass
                    } else {
                        current
                    }
                }
                _ => current,
            }
        });
    }

    /// Base reed chance of an eligible tile.
    fn reed_chance(&self, terrain: Terrain, elevation: f32, x: u32, y: u32) -> f32 {
        let base = match terrain {
            Terrain::Swamp => 0.6,
            Terrain::River | Terrain::Lake => 0.4,
            Terrain::Coast => 0.3,
            Terrain::ShallowOcean => 0.2,
            _ => return 0.0,
        };
        let mut chance = base * (0.5 + self.climate.moisture(x, y, elevation) * 0.5);
        if elevation < 0.4 {
            chance *= 1.5;
        }
        match self.climate.climate() {
            ClimateType::Tropical => chance *= 1.3,
            ClimateType::Arid => chance *= 0.3,
            _ => {}
        }
        chance.min(0.8)
    }

    /// Two-pass reed placement; returns the number of reed tiles committed.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn place_reeds(
        &self,
        pool: &WorkerPool,
        elevation: &Grid<f32>,
        terrain: &Grid<Terrain>,
        decoration: &mut Grid<Decoration>,
    ) -> MapResult<usize> {
        let (width, height) = (terrain.width(), terrain.height());

        // Pass 1: eligibility and base chance. 0 marks an ineligible tile.
        let mut chance = Grid::filled(width, height, 0.0f32)?;
        {
            let deco = &*decoration;
            pool.fill_2d(width, height, chance.as_mut_slice(), |x, y| {
                let t = terrain.at(x, y);
                let d = deco.at(x, y);
                let shore = d == Decoration::Water
                    && deco.neighbors8(x, y).any(|(nx, ny)| deco.at(nx, ny) != Decoration::Water);
                let eligible = (shore || matches!(t, Terrain::Swamp | Terrain::Coast)) && t.allows(Decoration::Reeds);
                if eligible {
                    self.reed_chance(t, elevation.at(x, y), x, y)
                } else {
                    0.0
                }
            });
        }

        // Pass 2: cluster bonus and draw, in parallel.
        let mut wanted = Grid::filled(width, height, false)?;
        pool.fill_2d(width, height, wanted.as_mut_slice(), |x, y| {
            let own = chance.at(x, y);
            if own <= 0.0 {
                return false;
            }
            let (mut possible, mut strong) = (0u32, 0u32);
            for (sx, sy, c) in window(&chance, x, y, 2) {
                if (sx, sy) != (x, y) && c > 0.0 {
                    possible += 1;
                    if c > 0.5 {
                        strong += 1;
                    }
                }
            }
            let bonus = if possible == 0 {
                1.0
            } else {
                1.0 + strong as f32 / possible as f32 * 2.0
            };
            self.draw(x, y, SALT_REED) < own * bonus
        });

        // Commit with the spacing rule, row-major.
        let spacing = self.params.reed_spacing;
        let reach = spacing.floor() as u32;
        let mut committed = 0;
        for index in 0..wanted.len() {
            if !wanted[index] {
                continue;
            }
            let (x, y) = terrain.coords(index);
            let crowded = reach > 0
                && window(decoration, x, y, reach).any(|(sx, sy, d)| {
                    let (dx, dy) = (sx as f32 - x as f32, sy as f32 - y as f32);
                    d == Decoration::Reeds && (sx, sy) != (x, y) && (dx * dx + dy * dy).sqrt() < spacing
                });
            if !crowded {
                decoration[index] = Decoration::Reeds;
                committed += 1;
            }
        }
        Ok(committed)
    }
}
