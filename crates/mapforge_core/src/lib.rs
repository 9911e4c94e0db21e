//! # MAPFORGE Core Kernel
//!
//! Data-parallel building blocks for whole-map generation:
//! - A fixed-size worker pool that hands out chunks through an atomic counter
//! - Dense row-major grids whose allocation failures surface as errors
//! - Double buffers for stencil passes that read one generation and write the next
//!
//! ## Architecture Rules
//!
//! 1. **Every callback runs exactly once per index or region** - no retries, no duplicates
//! 2. **No per-tile locks** - workers write into disjoint slices or private buffers
//! 3. **Deterministic reductions** - partial results are combined in chunk order,
//!    so the thread count never changes an output
//!
//! ## Example
//!
//! ```rust,ignore
//! use mapforge_core::{Grid, WorkerPool};
//!
//! let pool = WorkerPool::new(0); // hardware concurrency
//! let mut field = Grid::<f32>::new(512, 512)?;
//! pool.fill_2d(512, 512, field.as_mut_slice(), |x, y| (x + y) as f32);
//! let range = pool.parallel_min_max(field.as_slice());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod grid;
pub mod parallel;
pub mod sync;

pub use error::{GridError, GridResult};
pub use grid::{Grid, NEIGHBORS_8};
pub use parallel::{ChunkRect, WorkerPool, DEFAULT_CHUNK_2D, DEFAULT_CHUNK_LEN, SEQUENTIAL_THRESHOLD};
pub use sync::DoubleBuffer;
