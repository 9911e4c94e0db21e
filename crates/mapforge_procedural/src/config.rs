//! # Generation Configuration
//!
//! Every knob of a generation run, with presets and TOML round-tripping.
//!
//! A preset is expanded into concrete numbers by
//! [`GenerationConfig::from_preset`]; the pipeline only ever reads those
//! numbers and never branches on the preset itself.
//!
//! ```toml
//! width = 256
//! height = 256
//! seed = 7
//! sea_level = 0.35
//!
//! [erosion]
//! iterations = 0
//! ```
//!
//! Missing fields take their defaults, so partial documents are fine.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::biome::HeightBands;
use crate::climate::{ClimateModel, ClimateType};
use crate::decoration::DecorationParams;
use crate::erosion::ErosionParams;
use crate::error::{MapError, MapResult};
use crate::heightmap::{DomainWarp, NoiseLayer, NoiseParams};
use crate::hydrology::RiverParams;
use crate::noise::{NoiseKind, WorldSeed};

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 16_384;

/// Named starting points for a configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Plain defaults.
    #[default]
    Custom,
    /// Tropical islands in open sea.
    Islands,
    /// Ridged mountain ranges.
    Mountains,
    /// Broad, gentle lowlands.
    Plains,
    /// One large landmass.
    Continent,
    /// Many small cellular islands.
    Archipelago,
    /// Wet lowlands full of lakes.
    SwampLakes,
    /// Terraced arid highlands.
    DesertCanyons,
    /// Cold, steep peaks.
    Alpine,
}

impl Preset {
    /// Every preset.
    pub const ALL: [Self; 9] = [
        Self::Custom,
        Self::Islands,
        Self::Mountains,
        Self::Plains,
        Self::Continent,
        Self::Archipelago,
        Self::SwampLakes,
        Self::DesertCanyons,
        Self::Alpine,
    ];
}

/// Elevation shaping beyond the base octave stack.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainShape {
    /// Base primitive.
    pub kind: NoiseKind,
    /// Radial falloff from the map center.
    pub island_mode: bool,
    /// Ridge exponent; 0 disables it.
    pub ridge_exponent: f32,
    /// Terrace steps; 0 disables them.
    pub terrace_levels: u32,
    /// Coordinate warp.
    pub domain_warp: DomainWarp,
    /// Blend layers replacing the base stack when non-empty.
    pub layers: Vec<NoiseLayer>,
}

/// Full description of one generation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// World seed. Written as a string when it exceeds a TOML integer.
    #[serde(with = "seed_format")]
    pub seed: u64,
    /// Preset these numbers were expanded from. Informational only.
    pub preset: Preset,
    /// Base feature size in tiles.
    pub noise_scale: f32,
    /// Octave count.
    pub octaves: u32,
    /// Amplitude decay per octave.
    pub persistence: f32,
    /// Frequency growth per octave.
    pub lacunarity: f32,
    /// Below this is ocean.
    pub sea_level: f32,
    /// Upper edge of beaches.
    pub beach_level: f32,
    /// Upper edge of plains.
    pub plain_level: f32,
    /// Upper edge of hills.
    pub hill_level: f32,
    /// Upper edge of the mountain band.
    pub mountain_level: f32,
    /// Broad climate.
    pub climate: ClimateType,
    /// Base temperature in [0, 1].
    pub temperature: f32,
    /// Base humidity in [0, 1].
    pub humidity: f32,
    /// Worker threads; 0 uses every available core.
    pub threads: usize,
    /// Elevation shaping.
    pub shape: TerrainShape,
    /// Erosion.
    pub erosion: ErosionParams,
    /// Rivers and lakes.
    pub rivers: RiverParams,
    /// Decoration and resources.
    pub decoration: DecorationParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            seed: 12345,
            preset: Preset::Custom,
            noise_scale: 100.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
            sea_level: 0.3,
            beach_level: 0.32,
            plain_level: 0.4,
            hill_level: 0.6,
            mountain_level: 0.8,
            climate: ClimateType::Temperate,
            temperature: 0.5,
            humidity: 0.5,
            threads: 0,
            shape: TerrainShape::default(),
            erosion: ErosionParams::default(),
            rivers: RiverParams::default(),
            decoration: DecorationParams::default(),
        }
    }
}

impl GenerationConfig {
    /// Expands a preset into a full configuration.
    #[must_use]
    pub fn from_preset(preset: Preset) -> Self {
        let mut c = Self {
            preset,
            ..Self::default()
        };
        match preset {
            Preset::Custom => {}
            Preset::Islands => {
                (c.width, c.height) = (1024, 1024);
                c.sea_level = 0.35;
                c.noise_scale = 150.0 * 0.8;
                c.octaves = 5;
                c.set_climate(ClimateType::Tropical, 0.8, 0.7);
                c.shape.island_mode = true;
                c.shape.domain_warp = DomainWarp {
                    enabled: true,
                    strength: 20.0,
                    ..DomainWarp::default()
                };
            }
            Preset::Mountains => {
                c.sea_level = 0.25;
                c.mountain_level = 0.75;
                c.noise_scale = 80.0;
                c.persistence = 0.7;
                c.lacunarity = 3.0;
                c.set_climate(ClimateType::Continental, 0.4, 0.6);
                c.shape.ridge_exponent = 2.0;
                c.erosion.iterations = 10;
            }
            Preset::Plains => {
                c.plain_level = 0.5;
                c.noise_scale = 200.0;
                c.persistence = 0.3;
                c.set_climate(ClimateType::Temperate, 0.6, 0.5);
            }
            Preset::Continent => {
                (c.width, c.height) = (1024, 768);
                c.noise_scale = 300.0;
                c.octaves = 7;
                c.set_climate(ClimateType::Continental, 0.5, 0.6);
            }
            Preset::Archipelago => {
                (c.width, c.height) = (1024, 1024);
                c.sea_level = 0.4;
                c.beach_level = 0.42;
                c.plain_level = 0.48;
                c.noise_scale = 100.0;
                c.octaves = 4;
                c.set_climate(ClimateType::Tropical, 0.9, 0.8);
                c.shape.kind = NoiseKind::Worley;
                c.shape.island_mode = true;
            }
            Preset::SwampLakes => {
                c.sea_level = 0.28;
                c.beach_level = 0.3;
                c.plain_level = 0.35;
                c.noise_scale = 120.0;
                c.persistence = 0.4;
                c.set_climate(ClimateType::Tropical, 0.7, 0.9);
                c.decoration.bush_density = 0.4;
                c.decoration.grass_density = 0.4;
            }
            Preset::DesertCanyons => {
                (c.width, c.height) = (1024, 512);
                c.sea_level = 0.2;
                c.beach_level = 0.22;
                c.plain_level = 0.3;
                c.noise_scale = 150.0;
                c.persistence = 0.6;
                c.lacunarity = 2.5;
                c.set_climate(ClimateType::Arid, 0.9, 0.1);
                c.shape.terrace_levels = 8;
                c.erosion.iterations = 15;
                c.decoration.rock_density = 0.4;
                c.decoration.rock_slope_bias = 0.9;
            }
            Preset::Alpine => {
                (c.width, c.height) = (768, 768);
                c.sea_level = 0.25;
                c.mountain_level = 0.7;
                c.noise_scale = 100.0;
                c.persistence = 0.8;
                c.lacunarity = 3.0;
                c.set_climate(ClimateType::Polar, 0.2, 0.4);
                c.shape.ridge_exponent = 2.0;
                c.erosion.iterations = 12;
            }
        }
        c
    }

    /// Sets the climate and re-derives decoration densities for it.
    fn set_climate(&mut self, climate: ClimateType, temperature: f32, humidity: f32) {
        self.climate = climate;
        self.temperature = temperature;
        self.humidity = humidity;
        self.decoration = DecorationParams::for_climate(climate);
    }

    /// Checks every field before any grid is allocated.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> MapResult<()> {
        if self.width == 0 || self.height == 0 || self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(MapError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let thresholds = [
            ("sea_level", self.sea_level),
            ("beach_level", self.beach_level),
            ("plain_level", self.plain_level),
            ("hill_level", self.hill_level),
            ("mountain_level", self.mountain_level),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(MapError::ThresholdOutOfRange { name, value });
            }
        }
        for pair in thresholds.windows(2) {
            if pair[0].1 >= pair[1].1 {
                return Err(MapError::NonMonotonicThresholds {
                    lower: pair[0].0,
                    upper: pair[1].0,
                });
            }
        }
        for (name, value) in [("temperature", self.temperature), ("humidity", self.humidity)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MapError::ThresholdOutOfRange { name, value });
            }
        }

        self.noise_params().validate()?;
        self.erosion.validate()?;
        self.rivers.validate()?;
        self.decoration.validate()
    }

    /// Height bands for the classifier.
    #[must_use]
    pub const fn bands(&self) -> HeightBands {
        HeightBands {
            sea_level: self.sea_level,
            beach: self.beach_level,
            plain: self.plain_level,
            hill: self.hill_level,
            mountain: self.mountain_level,
        }
    }

    /// Noise parameters with climate shaping applied.
    #[must_use]
    pub fn noise_params(&self) -> NoiseParams {
        let mut scale = self.noise_scale;
        let mut octaves = self.octaves;
        let mut persistence = self.persistence;
        let mut lacunarity = self.lacunarity;

        match self.climate {
            ClimateType::Arid => {
                persistence *= 0.8;
                scale *= 1.2;
            }
            ClimateType::Tropical => {
                persistence *= 1.2;
                octaves += 1;
            }
            ClimateType::Polar => {
                persistence *= 0.7;
                lacunarity *= 1.1;
            }
            ClimateType::Temperate | ClimateType::Continental | ClimateType::Mediterranean => {}
        }
        if self.humidity > 0.7 {
            persistence *= 1.0 + (self.humidity - 0.7) * 0.5;
        }
        if self.temperature < 0.3 {
            scale *= 1.1;
        }

        NoiseParams {
            scale,
            octaves,
            persistence,
            lacunarity,
            kind: self.shape.kind,
            island_mode: self.shape.island_mode,
            ridge_exponent: self.shape.ridge_exponent,
            terrace_levels: self.shape.terrace_levels,
            domain_warp: self.shape.domain_warp.clone(),
            layers: self.shape.layers.clone(),
        }
    }

    /// Temperature and moisture model for this run.
    #[must_use]
    pub fn climate_model(&self) -> ClimateModel {
        ClimateModel::new(WorldSeed::new(self.seed), self.width, self.height)
            .with_climate(self.climate, self.temperature, self.humidity)
            .with_sea_level(self.sea_level)
    }

    /// Parses a TOML document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::ConfigParse`] for malformed documents.
    pub fn from_toml_str(source: &str) -> MapResult<Self> {
        toml::from_str(source).map_err(|err| MapError::ConfigParse(err.to_string()))
    }

    /// Writes the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::ConfigParse`] if serialization fails.
    pub fn to_toml_string(&self) -> MapResult<String> {
        toml::to_string_pretty(self).map_err(|err| MapError::ConfigParse(err.to_string()))
    }

    /// 64-bit key used by the results cache.
    ///
    /// Covers every field except `threads`, which never changes the output.
    /// Hashes the `Debug` rendering: floats print their shortest round-trip
    /// form, so distinct values give distinct keys.
    #[must_use]
    pub fn cache_key(&self) -> u64 {
        let output_shape = Self {
            threads: 0,
            ..self.clone()
        };
        let mut hasher = DefaultHasher::new();
        format!("{output_shape:?}").hash(&mut hasher);
        hasher.finish()
    }
}

/// TOML integers are signed 64-bit, so seeds above `i64::MAX` are written as
/// decimal strings. Both forms are accepted on input.
mod seed_format {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Written {
        Number(u64),
        Text(String),
    }

    /// Integer when it fits, string otherwise.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(seed: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        match i64::try_from(*seed) {
            Ok(fits) => fits.serialize(serializer),
            Err(_) => seed.to_string().serialize(serializer),
        }
    }

    /// Integer or decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Written::deserialize(deserializer)? {
            Written::Number(seed) => Ok(seed),
            Written::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference() {
        let c = GenerationConfig::default();
        assert_eq!((c.width, c.height, c.seed), (512, 512, 12345));
        assert_eq!(c.octaves, 6);
        assert_eq!(c.bands(), HeightBands::default());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_every_preset_validates() {
        for preset in Preset::ALL {
            let config = GenerationConfig::from_preset(preset);
            assert_eq!(config.preset, preset);
            assert!(config.validate().is_ok(), "{preset:?}: {:?}", config.validate());
        }
    }

    #[test]
    fn test_preset_numbers() {
        let alpine = GenerationConfig::from_preset(Preset::Alpine);
        assert_eq!((alpine.width, alpine.height), (768, 768));
        assert_eq!(alpine.climate, ClimateType::Polar);
        assert_eq!(alpine.erosion.iterations, 12);

        let desert = GenerationConfig::from_preset(Preset::DesertCanyons);
        assert_eq!(desert.shape.terrace_levels, 8);
        assert_eq!(desert.decoration.rock_density, 0.4);
        assert_eq!(desert.decoration.tree_density, 0.05);

        let archipelago = GenerationConfig::from_preset(Preset::Archipelago);
        assert_eq!(archipelago.shape.kind, NoiseKind::Worley);
        assert!(archipelago.shape.island_mode);
    }

    #[test]
    fn test_climate_shapes_noise() {
        let tropical = GenerationConfig {
            climate: ClimateType::Tropical,
            ..GenerationConfig::default()
        };
        let noise = tropical.noise_params();
        assert_eq!(noise.octaves, 7);
        assert!((noise.persistence - 0.6).abs() < 1e-6);

        let cold_and_wet = GenerationConfig {
            temperature: 0.2,
            humidity: 0.9,
            ..GenerationConfig::default()
        };
        let noise = cold_and_wet.noise_params();
        assert!((noise.scale - 110.0).abs() < 1e-4);
        assert!((noise.persistence - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_validation_errors() {
        let zero = GenerationConfig {
            width: 0,
            ..GenerationConfig::default()
        };
        assert_eq!(zero.validate(), Err(MapError::InvalidDimensions { width: 0, height: 512 }));

        let unordered = GenerationConfig {
            beach_level: 0.5,
            ..GenerationConfig::default()
        };
        assert_eq!(
            unordered.validate(),
            Err(MapError::NonMonotonicThresholds {
                lower: "beach_level",
                upper: "plain_level"
            })
        );

        let out_of_range = GenerationConfig {
            sea_level: 1.5,
            ..GenerationConfig::default()
        };
        assert!(matches!(out_of_range.validate(), Err(MapError::ThresholdOutOfRange { name: "sea_level", .. })));

        let no_octaves = GenerationConfig {
            octaves: 0,
            ..GenerationConfig::default()
        };
        assert!(matches!(no_octaves.validate(), Err(MapError::InvalidParameter { .. })));
    }

    #[test]
    fn test_toml_roundtrip_and_partial_documents() {
        let config = GenerationConfig::from_preset(Preset::Islands);
        let text = config.to_toml_string().unwrap();
        assert_eq!(GenerationConfig::from_toml_str(&text).unwrap(), config);

        let partial = GenerationConfig::from_toml_str("seed = 7\n[erosion]\niterations = 0\n").unwrap();
        assert_eq!(partial.seed, 7);
        assert_eq!(partial.erosion.iterations, 0);
        assert_eq!(partial.erosion.talus_angle, 35.0);
        assert_eq!(partial.width, 512);

        assert!(matches!(
            GenerationConfig::from_toml_str("width = \"wide\""),
            Err(MapError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_cache_key_tracks_every_field() {
        let base = GenerationConfig::default();
        let key = base.cache_key();
        assert_eq!(key, base.clone().cache_key());

        let mut changed = base.clone();
        changed.rivers.max_river_length = 99;
        assert_ne!(key, changed.cache_key());

        let mut reseeded = base.clone();
        reseeded.seed += 1;
        assert_ne!(key, reseeded.cache_key());

        let threaded = GenerationConfig { threads: 7, ..base };
        assert_eq!(key, threaded.cache_key());
    }

    #[test]
    fn test_full_range_seed_survives_toml() {
        let config = GenerationConfig {
            seed: u64::MAX,
            ..GenerationConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("seed = \"18446744073709551615\""), "{text}");
        assert_eq!(GenerationConfig::from_toml_str(&text).unwrap(), config);

        let small = GenerationConfig::default().to_toml_string().unwrap();
        assert!(small.contains("seed = 12345"), "{small}");

        assert_eq!(GenerationConfig::from_toml_str("seed = \"42\"").unwrap().seed, 42);
        assert!(matches!(
            GenerationConfig::from_toml_str("seed = -1"),
            Err(MapError::ConfigParse(_))
        ));
    }
}
