//! # Snapshot Buffers for Iterative Stages
//!
//! ## The Problem
//!
//! ```text
//! Pass N reads tile (x, y) and its 8 neighbors
//! Pass N writes tile (x, y)
//!
//! In place:       neighbors see a mix of old and new values → order dependent
//! Double buffer:  every read hits pass N-1, every write lands in pass N
//! ```

mod double_buffer;

pub use double_buffer::DoubleBuffer;
