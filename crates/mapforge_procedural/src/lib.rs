//! # MAPFORGE Procedural Generation
//!
//! Deterministic whole-map generation for tile worlds.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same config and seed always produce the same map, for any thread count
//! 2. **Staged**: noise, erosion, classification, hydrology and decoration run in strict order
//! 3. **Validated up front**: only configuration and allocation can fail
//! 4. **No per-tile locks**: stages write disjoint slices or merge private buffers
//!
//! ## Core Components
//!
//! - `HeightmapGenerator`: Multi-octave, layered and warped elevation noise
//! - `Eroder`: Hydraulic and thermal erosion
//! - `classify`: Terrain categories from elevation, temperature and moisture
//! - `hydrology`: Rivers with tributaries, terminal and depression lakes
//! - `Decorator` / `resource`: Decorations, consistency repair and resources
//! - `MapGenerator`: The pipeline driver with its results cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use mapforge_procedural::{GenerationConfig, MapGenerator, Preset, Terrain};
//!
//! let config = GenerationConfig::from_preset(Preset::Islands);
//! let generator = MapGenerator::for_config(&config);
//! let map = generator.generate(&config)?;
//!
//! println!("water: {:.0}%", map.statistics().water_ratio() * 100.0);
//! assert!(map.terrain_at(0, 0).is_some_and(Terrain::is_water));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod biome;
pub mod climate;
pub mod config;
pub mod consistency;
pub mod decoration;
pub mod erosion;
pub mod error;
pub mod heightmap;
pub mod hydrology;
pub mod lakes;
pub mod math;
pub mod noise;
pub mod pipeline;
pub mod resource;
pub mod stats;

pub use biome::{classify, HeightBands, Terrain};
pub use climate::{ClimateModel, ClimateType};
pub use config::{GenerationConfig, Preset, TerrainShape};
pub use decoration::{Decoration, DecorationParams, Decorator};
pub use erosion::{Eroder, ErosionParams};
pub use error::{MapError, MapResult};
pub use heightmap::{DomainWarp, HeightmapGenerator, NoiseLayer, NoiseParams};
pub use hydrology::{HydrologyReport, RiverParams};
pub use noise::{NoiseKind, WorldSeed};
pub use pipeline::{generate_batch, GeneratedMap, MapGenerator};
pub use resource::Resource;
pub use stats::Statistics;
