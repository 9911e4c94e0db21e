//! # Terrain Classification
//!
//! Maps (elevation, temperature, moisture) to a terrain category.
//!
//! The decision tree is evaluated in a fixed priority order and the first
//! match wins:
//!
//! ```text
//! e < sea * 0.5        deep ocean
//! e < sea              shallow ocean
//! e < sea + 0.02       coast
//! e < beach            beach
//! e < plain            desert (t > 0.7, m < 0.3) | swamp (t > 0.6, m > 0.7) | plain
//! e < hill             forest (m > 0.6, t > 0.4) | hill
//! e < mountain         snow mountain (t < 0.2) | mountain
//! otherwise            snow mountain (t < 0.1) | mountain
//! ```
//!
//! Hydrology and decoration rely on these exact boundaries.

use mapforge_core::{Grid, WorkerPool};
use serde::{Deserialize, Serialize};

use crate::climate::ClimateModel;
use crate::error::MapResult;

/// Terrain category of a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Terrain {
    /// Not yet classified.
    #[default]
    Unknown = 0,
    /// Open ocean below half the sea level.
    DeepOcean = 1,
    /// Ocean above half the sea level.
    ShallowOcean = 2,
    /// Narrow band just above sea level.
    Coast = 3,
    /// Sandy shore
    Beach = 4,
    /// Grassland
    Plain = 5,
    /// Forest
    Forest = 6,
    /// Hills
    Hill = 7,
    /// Mountains
    Mountain = 8,
    /// Snow-capped mountains
    SnowMountain = 9,
    /// Hot, dry lowland
    Desert = 10,
    /// Hot, wet lowland
    Swamp = 11,
    /// River channel
    River = 12,
    /// Lake
    Lake = 13,
}

impl Terrain {
    /// Number of categories, including `Unknown`.
    pub const COUNT: usize = 14;

    /// Every category in id order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Unknown,
        Self::DeepOcean,
        Self::ShallowOcean,
        Self::Coast,
        Self::Beach,
        Self::Plain,
        Self::Forest,
        Self::Hill,
        Self::Mountain,
        Self::SnowMountain,
        Self::Desert,
        Self::Swamp,
        Self::River,
        Self::Lake,
    ];

    /// Stable numeric id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Converts from an id; unknown ids map to `Unknown`.
    #[must_use]
    pub const fn from_id(id: u8) -> Self {
        if (id as usize) < Self::COUNT {
            Self::ALL[id as usize]
        } else {
            Self::Unknown
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::DeepOcean => "deep ocean",
            Self::ShallowOcean => "shallow ocean",
            Self::Coast => "coast",
            Self::Beach => "beach",
            Self::Plain => "plain",
            Self::Forest => "forest",
            Self::Hill => "hill",
            Self::Mountain => "mountain",
            Self::SnowMountain => "snow mountain",
            Self::Desert => "desert",
            Self::Swamp => "swamp",
            Self::River => "river",
            Self::Lake => "lake",
        }
    }

    /// Deep or shallow ocean.
    #[inline]
    #[must_use]
    pub const fn is_ocean(self) -> bool {
        matches!(self, Self::DeepOcean | Self::ShallowOcean)
    }

    /// Ocean, river or lake.
    #[inline]
    #[must_use]
    pub const fn is_open_water(self) -> bool {
        matches!(self, Self::DeepOcean | Self::ShallowOcean | Self::River | Self::Lake)
    }

    /// Open water or coast; this is what statistics count as water.
    #[inline]
    #[must_use]
    pub const fn is_water(self) -> bool {
        self.is_open_water() || matches!(self, Self::Coast)
    }

    /// Classified and not water.
    #[inline]
    #[must_use]
    pub const fn is_land(self) -> bool {
        !self.is_water() && !matches!(self, Self::Unknown)
    }
}

/// Height thresholds separating the elevation bands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightBands {
    /// Below this is ocean.
    pub sea_level: f32,
    /// Upper edge of beaches.
    pub beach: f32,
    /// Upper edge of plains.
    pub plain: f32,
    /// Upper edge of hills and forests.
    pub hill: f32,
    /// Upper edge of the mountain band.
    pub mountain: f32,
}

impl Default for HeightBands {
    fn default() -> Self {
        Self {
            sea_level: 0.3,
            beach: 0.32,
            plain: 0.4,
            hill: 0.6,
            mountain: 0.8,
        }
    }
}

/// Classifies one tile.
#[must_use]
pub fn classify_tile(elevation: f32, temperature: f32, moisture: f32, bands: &HeightBands) -> Terrain {
    if elevation < bands.sea_level * 0.5 {
        return Terrain::DeepOcean;
    }
    if elevation < bands.sea_level {
        return Terrain::ShallowOcean;
    }
    if elevation < bands.sea_level + 0.02 {
        return Terrain::Coast;
    }
    if elevation < bands.beach {
        return Terrain::Beach;
    }
    if elevation < bands.plain {
        if temperature > 0.7 && moisture < 0.3 {
            return Terrain::Desert;
        }
        if temperature > 0.6 && moisture > 0.7 {
            return Terrain::Swamp;
        }
        return Terrain::Plain;
    }
    if elevation < bands.hill {
        if moisture > 0.6 && temperature > 0.4 {
            return Terrain::Forest;
        }
        return Terrain::Hill;
    }
    if elevation < bands.mountain {
        if temperature < 0.2 {
            return Terrain::SnowMountain;
        }
        return Terrain::Mountain;
    }
    if temperature < 0.1 {
        Terrain::SnowMountain
    } else {
        Terrain::Mountain
    }
}

/// Classifies every tile of `elevation`.
///
/// Pure per tile, so the result does not depend on the worker count.
///
/// # Errors
///
/// Returns [`crate::MapError::Allocation`] when the grid cannot be allocated.
pub fn classify(
    pool: &WorkerPool,
    elevation: &Grid<f32>,
    bands: &HeightBands,
    climate: &ClimateModel,
) -> MapResult<Grid<Terrain>> {
    let (width, height) = (elevation.width(), elevation.height());
    let mut terrain = Grid::new(width, height)?;
    pool.fill_2d(width, height, terrain.as_mut_slice(), |x, y| {
        let e = elevation.at(x, y);
        classify_tile(e, climate.temperature(x, y, e), climate.moisture(x, y, e), bands)
    });
    tracing::debug!(target: "mapforge::classify", width, height, "terrain classified");
    Ok(terrain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::WorldSeed;

    #[test]
    fn test_decision_tree_thresholds() {
        let b = HeightBands::default();
        assert_eq!(classify_tile(0.149, 0.5, 0.5, &b), Terrain::DeepOcean);
        assert_eq!(classify_tile(0.15, 0.5, 0.5, &b), Terrain::ShallowOcean);
        assert_eq!(classify_tile(0.30, 0.5, 0.5, &b), Terrain::Coast);
        assert_eq!(classify_tile(0.315, 0.5, 0.5, &b), Terrain::Coast);
        assert_eq!(classify_tile(0.321, 0.5, 0.5, &b), Terrain::Plain);
        assert_eq!(classify_tile(0.35, 0.8, 0.2, &b), Terrain::Desert);
        assert_eq!(classify_tile(0.35, 0.7, 0.8, &b), Terrain::Swamp);
        assert_eq!(classify_tile(0.5, 0.5, 0.7, &b), Terrain::Forest);
        assert_eq!(classify_tile(0.5, 0.3, 0.7, &b), Terrain::Hill);
        assert_eq!(classify_tile(0.7, 0.15, 0.5, &b), Terrain::SnowMountain);
        assert_eq!(classify_tile(0.7, 0.5, 0.5, &b), Terrain::Mountain);
        assert_eq!(classify_tile(0.9, 0.15, 0.5, &b), Terrain::Mountain);
        assert_eq!(classify_tile(0.9, 0.05, 0.5, &b), Terrain::SnowMountain);
    }

    #[test]
    fn test_beach_band() {
        let b = HeightBands {
            beach: 0.36,
            ..HeightBands::default()
        };
        assert_eq!(classify_tile(0.33, 0.5, 0.5, &b), Terrain::Beach);
    }

    #[test]
    fn test_sea_level_monotonicity() {
        let bands = HeightBands::default();
        let pool = WorkerPool::new(3).with_sequential_threshold(0);
        let mut elevation = Grid::filled(50, 40, 0.0f32).unwrap();
        for (i, v) in elevation.as_mut_slice().iter_mut().enumerate() {
            *v = (i % 101) as f32 / 100.0;
        }
        let climate = ClimateModel::new(WorldSeed::new(8), 50, 40);
        let terrain = classify(&pool, &elevation, &bands, &climate).unwrap();

        for (e, t) in elevation.iter().zip(terrain.iter()) {
            if *e < bands.sea_level {
                assert!(t.is_ocean(), "{e} classified as {t:?}");
            }
            if *e >= bands.mountain {
                assert!(matches!(t, Terrain::Mountain | Terrain::SnowMountain));
            }
        }
    }

    #[test]
    fn test_id_roundtrip_and_predicates() {
        for t in Terrain::ALL {
            assert_eq!(Terrain::from_id(t.id()), t);
        }
        assert_eq!(Terrain::from_id(200), Terrain::Unknown);
        assert!(Terrain::Coast.is_water() && !Terrain::Coast.is_open_water());
        assert!(Terrain::Beach.is_land());
        assert!(!Terrain::Unknown.is_land());
    }
}
