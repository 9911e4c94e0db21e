//! # Climate Model
//!
//! Per-tile temperature and moisture in [0, 1].
//!
//! Uses a climate model based on:
//! - Latitude (warm and wet toward the vertical center of the map)
//! - Elevation (higher = colder and drier)
//! - Two independent noise channels for local variation
//! - Rain belts at the equator and at both mid-latitudes

use serde::{Deserialize, Serialize};

use crate::math::smoothstep;
use crate::noise::{purpose, Perlin, WorldSeed};

/// Broad climate of the whole map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateType {
    /// Moderate temperature and rainfall.
    #[default]
    Temperate,
    /// Hot and wet.
    Tropical,
    /// Hot and dry.
    Arid,
    /// Cool and slightly dry.
    Continental,
    /// Cold.
    Polar,
    /// Warm with dry summers.
    Mediterranean,
}

/// Offsets a climate adds to every tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClimateBias {
    /// Added to temperature.
    pub temperature: f32,
    /// Added to moisture.
    pub moisture: f32,
}

impl ClimateType {
    /// Temperature and moisture offsets of this climate.
    #[must_use]
    pub const fn bias(self) -> ClimateBias {
        let (temperature, moisture) = match self {
            Self::Temperate => (0.0, 0.0),
            Self::Tropical => (0.0, 0.3),
            Self::Arid => (0.0, -0.3),
            Self::Continental => (-0.1, -0.1),
            Self::Polar => (-0.4, 0.0),
            Self::Mediterranean => (0.1, -0.1),
        };
        ClimateBias {
            temperature,
            moisture,
        }
    }
}

/// Temperature and moisture fields for one map.
///
/// Stateless per tile, so it can be sampled from any worker.
///
/// # Example
///
/// ```rust,ignore
/// let climate = ClimateModel::new(WorldSeed::new(7), 512, 512)
///     .with_climate(ClimateType::Tropical, 0.8, 0.7)
///     .with_sea_level(0.35);
/// let t = climate.temperature(10, 20, 0.5);
/// ```
#[derive(Clone)]
pub struct ClimateModel {
    /// Temperature noise
    temperature_noise: Perlin,
    /// Moisture noise
    moisture_noise: Perlin,
    climate: ClimateType,
    base_temperature: f32,
    base_humidity: f32,
    sea_level: f32,
    height: u32,
}

impl ClimateModel {
    /// Noise frequency in cycles per tile.
    const NOISE_FREQUENCY: f64 = 1.0 / 48.0;
    /// Noise octaves for both channels.
    const NOISE_OCTAVES: u32 = 4;
    /// Swing of temperature from the poles to the equator.
    const LATITUDE_WEIGHT: f32 = 0.6;
    /// Cooling per unit of elevation above sea level.
    const ELEVATION_COOLING: f32 = 0.35;
    /// Extra moisture at the equator.
    const EQUATOR_MOISTURE: f32 = 0.15;
    /// Drying per unit of elevation, centered on mid-height land.
    const ELEVATION_DRYING: f32 = 0.5;
    /// Amplitude of the temperature noise.
    const TEMPERATURE_NOISE: f32 = 0.1;
    /// Amplitude of the moisture noise.
    const MOISTURE_NOISE: f32 = 0.15;
    /// Base temperatures below this make a cold map.
    pub const COLD_BASE_TEMPERATURE: f32 = 0.3;

    /// Creates a temperate model for a map of the given size.
    #[must_use]
    pub fn new(seed: WorldSeed, width: u32, height: u32) -> Self {
        debug_assert!(width > 0 && height > 0);
        Self {
            temperature_noise: Perlin::new(seed.derive(purpose::TEMPERATURE)),
            moisture_noise: Perlin::new(seed.derive(purpose::MOISTURE)),
            climate: ClimateType::Temperate,
            base_temperature: 0.5,
            base_humidity: 0.5,
            sea_level: 0.3,
            height,
        }
    }

    /// Sets the climate and its base temperature and humidity.
    #[must_use]
    pub const fn with_climate(mut self, climate: ClimateType, temperature: f32, humidity: f32) -> Self {
        self.climate = climate;
        self.base_temperature = temperature;
        self.base_humidity = humidity;
        self
    }

    /// Sets the sea level used by elevation cooling.
    #[must_use]
    pub const fn with_sea_level(mut self, sea_level: f32) -> Self {
        self.sea_level = sea_level;
        self
    }

    /// Climate of the map.
    #[inline]
    #[must_use]
    pub const fn climate(&self) -> ClimateType {
        self.climate
    }

    /// Whether the base temperature is below [`ClimateModel::COLD_BASE_TEMPERATURE`].
    /// Trees on the upper slopes of a cold map are snow trees.
    #[inline]
    #[must_use]
    pub fn is_cold(&self) -> bool {
        self.base_temperature < Self::COLD_BASE_TEMPERATURE
    }

    /// Latitude of row `y` in [0, 1], top to bottom.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latitude(&self, y: u32) -> f32 {
        (y as f32 + 0.5) / self.height as f32
    }

    /// Warmth from latitude: 1 at the vertical center, 0 at the edges.
    #[inline]
    fn equator_proximity(&self, y: u32) -> f32 {
        1.0 - (self.latitude(y) - 0.5).abs() * 2.0
    }

    /// Multi-octave noise in [-1, 1], sampled on its own z slice.
    #[allow(clippy::cast_possible_truncation)]
    fn channel(noise: &Perlin, x: u32, y: u32, z: f64) -> f32 {
        let (mut total, mut amplitude, mut frequency, mut norm) = (0.0, 1.0, Self::NOISE_FREQUENCY, 0.0);
        for _ in 0..Self::NOISE_OCTAVES {
            total += noise.sample3(f64::from(x) * frequency, f64::from(y) * frequency, z) * amplitude;
            norm += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }
        ((total / norm) as f32).clamp(-1.0, 1.0)
    }

    /// Rain belts: one at the equator, one at each mid-latitude.
    fn precipitation_bonus(latitude: f32) -> f32 {
        let belt = |center: f32, half_width: f32, strength: f32| {
            strength * (1.0 - smoothstep(0.0, half_width, (latitude - center).abs()))
        };
        belt(0.5, 0.08, 0.1) + belt(0.2, 0.05, 0.08) + belt(0.8, 0.05, 0.08)
    }

    /// Temperature of tile `(x, y)` at `elevation`, clamped to [0, 1].
    #[must_use]
    pub fn temperature(&self, x: u32, y: u32, elevation: f32) -> f32 {
        let latitude = (self.equator_proximity(y) - 0.5) * Self::LATITUDE_WEIGHT;
        let cooling = (elevation - self.sea_level).max(0.0) * Self::ELEVATION_COOLING;
        let noise = Self::channel(&self.temperature_noise, x, y, 0.5) * Self::TEMPERATURE_NOISE;
        (self.base_temperature + latitude - cooling + noise + self.climate.bias().temperature).clamp(0.0, 1.0)
    }

    /// Moisture of tile `(x, y)` at `elevation`, clamped to [0, 1].
    #[must_use]
    pub fn moisture(&self, x: u32, y: u32, elevation: f32) -> f32 {
        let latitude = self.equator_proximity(y) * Self::EQUATOR_MOISTURE;
        let drying = (0.55 - elevation) * Self::ELEVATION_DRYING;
        let noise = Self::channel(&self.moisture_noise, x, y, 10.5) * Self::MOISTURE_NOISE;
        let belts = Self::precipitation_bonus(self.latitude(y));
        (self.base_humidity + latitude + drying + noise + belts + self.climate.bias().moisture).clamp(0.0, 1.0)
    }
}
