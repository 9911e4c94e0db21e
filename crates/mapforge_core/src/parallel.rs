//! # Parallel Execution Framework
//!
//! Generic 1D/2D work distribution over a fixed number of OS threads.
//!
//! ## How Work Is Handed Out
//!
//! ```text
//!   index range ──► chunks [0] [1] [2] [3] ... [n-1]
//!                            ▲
//!                 AtomicUsize::fetch_add (work stealing)
//!                            │
//!        ┌──────────┬────────┴─┬──────────┐
//!        ▼          ▼          ▼          ▼
//!    worker 0    worker 1   worker 2   worker N-1
//!   (caller)    (scoped)   (scoped)    (scoped)
//! ```
//!
//! Each dispatch spawns `threads - 1` scoped workers and lets the calling
//! thread take part, so borrowed inputs never need `'static` lifetimes.
//! A chunk index is claimed by exactly one worker, which means every
//! callback runs exactly once for its index or region.
//!
//! ## Mutation Rules
//!
//! The framework does not synchronize caller state. Stages that write must
//! either receive disjoint slices ([`WorkerPool::fill_2d`],
//! [`WorkerPool::transform`]) or return chunk-local results that are merged
//! afterwards ([`WorkerPool::map_chunks_2d`]). A panicking callback is
//! propagated to the caller once every worker has stopped.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Below this many elements work runs on the calling thread.
pub const SEQUENTIAL_THRESHOLD: usize = 1000;

/// Default 1D chunk length.
pub const DEFAULT_CHUNK_LEN: usize = 1024;

/// Default 2D chunk edge in tiles.
pub const DEFAULT_CHUNK_2D: u32 = 16;

/// Half-open sub-rectangle `[x0, x1) x [y0, y1)` of a 2D range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRect {
    /// First column.
    pub x0: u32,
    /// First row.
    pub y0: u32,
    /// One past the last column.
    pub x1: u32,
    /// One past the last row.
    pub y1: u32,
}

impl ChunkRect {
    /// Columns covered.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    /// Rows covered.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Tiles covered.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// True when the rectangle covers no tiles.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `(x, y)` lies inside the rectangle.
    #[inline]
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Tiles of the rectangle in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> {
        let (x0, x1) = (self.x0, self.x1);
        (self.y0..self.y1).flat_map(move |y| (x0..x1).map(move |x| (x, y)))
    }
}

/// Number of chunks needed to cover `len` with `chunk` sized pieces.
#[inline]
const fn chunk_count(len: usize, chunk: usize) -> usize {
    (len + chunk - 1) / chunk
}

/// Fixed-size pool of worker threads.
///
/// The pool is a value type: it stores the worker count and the tuning knobs,
/// and every dispatch runs inside a `std::thread::scope`. One pool is shared by
/// all stages of a generation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerPool {
    threads: usize,
    sequential_threshold: usize,
    chunk_len: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl WorkerPool {
    /// Creates a pool with `threads` workers (0 = hardware concurrency).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            threads
        };
        tracing::debug!(target: "mapforge::parallel", threads, "worker pool ready");
        Self {
            threads,
            sequential_threshold: SEQUENTIAL_THRESHOLD,
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }

    /// Creates a single-threaded pool.
    #[must_use]
    pub fn sequential() -> Self {
        Self::new(1)
    }

    /// Overrides the element count below which work is not distributed.
    #[must_use]
    pub const fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    /// Overrides the 1D chunk length (clamped to at least 1).
    #[must_use]
    pub const fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = if chunk_len == 0 { 1 } else { chunk_len };
        self
    }

    /// Number of workers, including the calling thread.
    #[inline]
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `job(worker, index)` once for every index in `0..jobs`.
    ///
    /// `worker` is in `0..self.threads()` and identifies the thread running
    /// the job, which lets callers address per-worker scratch storage.
    pub fn dispatch<F>(&self, jobs: usize, job: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        let workers = self.threads.min(jobs);
        if workers <= 1 {
            for index in 0..jobs {
                job(0, index);
            }
            return;
        }

        let next = AtomicUsize::new(0);
        let run = |worker: usize| loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            if index >= jobs {
                break;
            }
            job(worker, index);
        };

        std::thread::scope(|scope| {
            for worker in 1..workers {
                let run = &run;
                scope.spawn(move || run(worker));
            }
            run(0);
        });
    }

    /// Calls `f(i)` for every `i` in `0..count`.
    pub fn parallel_for_1d<F>(&self, count: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        if count < self.sequential_threshold {
            (0..count).for_each(f);
            return;
        }
        let chunk = self.chunk_len;
        self.dispatch(chunk_count(count, chunk), |_, job| {
            let end = ((job + 1) * chunk).min(count);
            (job * chunk..end).for_each(&f);
        });
    }

    /// Calls `f(x, y)` for every tile of a `width x height` range.
    pub fn parallel_for_2d<F>(&self, width: u32, height: u32, f: F)
    where
        F: Fn(u32, u32) + Sync,
    {
        self.parallel_for_2d_chunked(width, height, DEFAULT_CHUNK_2D, |rect| {
            for (x, y) in rect.iter() {
                f(x, y);
            }
        });
    }

    /// Calls `f(rect)` once for every `chunk x chunk` sub-rectangle.
    ///
    /// Edge chunks are clipped to the range.
    pub fn parallel_for_2d_chunked<F>(&self, width: u32, height: u32, chunk: u32, f: F)
    where
        F: Fn(ChunkRect) + Sync,
    {
        let chunk = chunk.max(1);
        let cols = chunk_count(width as usize, chunk as usize);
        let rows = chunk_count(height as usize, chunk as usize);
        let rect_of = |job: usize| {
            #[allow(clippy::cast_possible_truncation)]
            let (cx, cy) = ((job % cols) as u32, (job / cols) as u32);
            ChunkRect {
                x0: cx * chunk,
                y0: cy * chunk,
                x1: ((cx + 1) * chunk).min(width),
                y1: ((cy + 1) * chunk).min(height),
            }
        };

        let tiles = width as usize * height as usize;
        if tiles < self.sequential_threshold {
            (0..cols * rows).for_each(|job| f(rect_of(job)));
        } else {
            self.dispatch(cols * rows, |_, job| f(rect_of(job)));
        }
    }

    /// Computes `f(rect)` for every chunk and returns the results in chunk order.
    ///
    /// Chunk order is row-major over the chunk grid, independent of which
    /// worker computed which chunk, so merging the output sequentially is
    /// deterministic.
    pub fn map_chunks_2d<R, F>(&self, width: u32, height: u32, chunk: u32, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ChunkRect) -> R + Sync,
    {
        let chunk = chunk.max(1);
        let jobs = chunk_count(width as usize, chunk as usize)
            * chunk_count(height as usize, chunk as usize);
        let slots: Vec<Mutex<Option<R>>> = (0..jobs).map(|_| Mutex::new(None)).collect();
        let order = AtomicUsize::new(0);

        // Chunk rectangles are recomputed from the job index, so the slot
        // index and the rectangle always agree.
        let cols = chunk_count(width as usize, chunk as usize);
        let run = |job: usize| {
            #[allow(clippy::cast_possible_truncation)]
            let (cx, cy) = ((job % cols) as u32, (job / cols) as u32);
            let rect = ChunkRect {
                x0: cx * chunk,
                y0: cy * chunk,
                x1: ((cx + 1) * chunk).min(width),
                y1: ((cy + 1) * chunk).min(height),
            };
            *slots[job].lock() = Some(f(rect));
            order.fetch_add(1, Ordering::Relaxed);
        };

        if (width as usize * height as usize) < self.sequential_threshold {
            (0..jobs).for_each(run);
        } else {
            self.dispatch(jobs, |_, job| run(job));
        }
        debug_assert_eq!(order.load(Ordering::Relaxed), jobs);

        slots.into_iter().filter_map(Mutex::into_inner).collect()
    }

    /// Computes `f(i)` for every `i` in `0..count`, one heavy task per index.
    ///
    /// Unlike the element-wise helpers there is no sequential threshold: each
    /// index is assumed to be expensive (a river walk, a whole map).
    pub fn map_tasks<R, F>(&self, count: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync,
    {
        let slots: Vec<Mutex<Option<R>>> = (0..count).map(|_| Mutex::new(None)).collect();
        self.dispatch(count, |_, index| {
            *slots[index].lock() = Some(f(index));
        });
        slots.into_iter().filter_map(Mutex::into_inner).collect()
    }

    /// Fills a row-major `width x height` slice with `f(x, y)`.
    ///
    /// Rows are split into disjoint bands, so no two workers touch the same
    /// element.
    ///
    /// # Panics
    ///
    /// Panics if `out.len() != width * height`.
    pub fn fill_2d<T, F>(&self, width: u32, height: u32, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(u32, u32) -> T + Sync,
    {
        let w = width as usize;
        assert_eq!(out.len(), w * height as usize, "output does not match dimensions");
        if w == 0 {
            return;
        }

        let fill_band = |first_row: usize, band: &mut [T]| {
            for (i, cell) in band.iter_mut().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let (x, y) = ((i % w) as u32, (first_row + i / w) as u32);
                *cell = f(x, y);
            }
        };

        if out.len() < self.sequential_threshold {
            fill_band(0, out);
            return;
        }

        let band_rows = DEFAULT_CHUNK_2D as usize;
        let bands: Vec<Mutex<&mut [T]>> = out.chunks_mut(band_rows * w).map(Mutex::new).collect();
        self.dispatch(bands.len(), |_, band| {
            let mut slice = bands[band].lock();
            fill_band(band * band_rows, &mut **slice);
        });
    }

    /// Applies `f(index, &mut element)` to every element in place.
    pub fn transform<T, F>(&self, data: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        if data.len() < self.sequential_threshold {
            data.iter_mut().enumerate().for_each(|(i, v)| f(i, v));
            return;
        }

        let chunk = self.chunk_len;
        let chunks: Vec<Mutex<&mut [T]>> = data.chunks_mut(chunk).map(Mutex::new).collect();
        self.dispatch(chunks.len(), |_, job| {
            let mut slice = chunks[job].lock();
            let base = job * chunk;
            slice
                .iter_mut()
                .enumerate()
                .for_each(|(i, v)| f(base + i, v));
        });
    }

    /// Minimum and maximum of the finite values in `data`.
    ///
    /// Returns `None` when `data` holds no finite value.
    #[must_use]
    pub fn parallel_min_max(&self, data: &[f32]) -> Option<(f32, f32)> {
        fn fold(values: &[f32]) -> Option<(f32, f32)> {
            values
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(None, |acc, v| match acc {
                    None => Some((v, v)),
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                })
        }

        if data.len() < self.sequential_threshold {
            return fold(data);
        }

        let chunk = self.chunk_len;
        let partials = self.map_tasks(chunk_count(data.len(), chunk), |job| {
            let end = ((job + 1) * chunk).min(data.len());
            fold(&data[job * chunk..end])
        });

        partials.into_iter().flatten().fold(None, |acc, (lo, hi)| match acc {
            None => Some((lo, hi)),
            Some((a, b)) => Some((a.min(lo), b.max(hi))),
        })
    }

    /// Maps `data` from `[min, max]` onto `[0, 1]` in place.
    ///
    /// A zero or non-finite range resets every element to 0.5. Non-finite
    /// elements become 0.
    pub fn parallel_normalize(&self, data: &mut [f32], min: f32, max: f32) {
        let range = max - min;
        if !range.is_finite() || range <= f32::EPSILON {
            tracing::warn!(
                target: "mapforge::parallel",
                min,
                max,
                "degenerate range, substituting uniform field"
            );
            self.transform(data, |_, v| *v = 0.5);
            return;
        }

        self.transform(data, |_, v| {
            *v = if v.is_finite() {
                ((*v - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
        });
    }

    /// Rescales `data` to `[0, 1]` using its own finite extremes.
    ///
    /// Returns the `(min, max)` that was used, or `None` when the field had
    /// no finite values and was reset to 0.5.
    pub fn normalize_field(&self, data: &mut [f32]) -> Option<(f32, f32)> {
        match self.parallel_min_max(data) {
            Some((min, max)) => {
                self.parallel_normalize(data, min, max);
                Some((min, max))
            }
            None => {
                self.parallel_normalize(data, 0.0, 0.0);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> Vec<WorkerPool> {
        vec![
            WorkerPool::sequential(),
            WorkerPool::new(2).with_sequential_threshold(0),
            WorkerPool::new(7).with_sequential_threshold(0).with_chunk_len(13),
        ]
    }

    #[test]
    fn test_each_index_visited_once() {
        for pool in pools() {
            let hits: Vec<AtomicUsize> = (0..5000).map(|_| AtomicUsize::new(0)).collect();
            pool.parallel_for_1d(hits.len(), |i| {
                hits[i].fetch_add(1, Ordering::Relaxed);
            });
            assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        }
    }

    #[test]
    fn test_each_tile_visited_once_2d() {
        let (w, h) = (97u32, 61u32);
        for pool in pools() {
            let hits: Vec<AtomicUsize> = (0..(w * h) as usize).map(|_| AtomicUsize::new(0)).collect();
            pool.parallel_for_2d(w, h, |x, y| {
                hits[(y * w + x) as usize].fetch_add(1, Ordering::Relaxed);
            });
            assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        }
    }

    #[test]
    fn test_chunks_tile_the_range() {
        let pool = WorkerPool::new(4).with_sequential_threshold(0);
        let rects = pool.map_chunks_2d(40, 35, 16, |rect| rect);
        assert_eq!(rects.len(), 3 * 3);
        assert_eq!(rects.iter().map(ChunkRect::len).sum::<usize>(), 40 * 35);
        assert_eq!(rects[0], ChunkRect { x0: 0, y0: 0, x1: 16, y1: 16 });
        assert_eq!(rects[8], ChunkRect { x0: 32, y0: 32, x1: 40, y1: 35 });
    }

    #[test]
    fn test_fill_2d_matches_sequential() {
        let (w, h) = (123u32, 77u32);
        let mut expected = vec![0u64; (w * h) as usize];
        WorkerPool::sequential().fill_2d(w, h, &mut expected, |x, y| u64::from(x) * 1000 + u64::from(y));
        for pool in pools() {
            let mut out = vec![0u64; (w * h) as usize];
            pool.fill_2d(w, h, &mut out, |x, y| u64::from(x) * 1000 + u64::from(y));
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_transform_sees_global_index() {
        for pool in pools() {
            let mut data = vec![0usize; 3000];
            pool.transform(&mut data, |i, v| *v = i * 2);
            assert!(data.iter().enumerate().all(|(i, &v)| v == i * 2));
        }
    }

    #[test]
    fn test_min_max_ignores_non_finite() {
        let mut data: Vec<f32> = (0..4000).map(|i| i as f32 * 0.25).collect();
        data[17] = f32::NAN;
        data[900] = f32::INFINITY;
        for pool in pools() {
            assert_eq!(pool.parallel_min_max(&data), Some((0.0, 999.75)));
        }
        assert_eq!(WorkerPool::sequential().parallel_min_max(&[f32::NAN]), None);
    }

    #[test]
    fn test_flat_field_becomes_uniform_half() {
        let pool = WorkerPool::new(3).with_sequential_threshold(0);
        let mut data = vec![0.7f32; 2048];
        pool.normalize_field(&mut data);
        assert!(data.iter().all(|&v| (v - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let pool = WorkerPool::new(4).with_sequential_threshold(0);
        let mut data: Vec<f32> = (0..5000).map(|i| ((i * 7919) % 1013) as f32 - 300.0).collect();
        pool.normalize_field(&mut data);
        let once = data.clone();
        pool.normalize_field(&mut data);
        for (a, b) in once.iter().zip(&data) {
            assert!((a - b).abs() < 1e-6, "second pass changed {a} to {b}");
        }
    }

    #[test]
    fn test_map_tasks_keeps_order() {
        let pool = WorkerPool::new(5);
        let out = pool.map_tasks(100, |i| i * i);
        assert_eq!(out, (0..100).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_worker_ids_in_range() {
        let pool = WorkerPool::new(3);
        let seen: Vec<AtomicUsize> = (0..3).map(|_| AtomicUsize::new(0)).collect();
        pool.dispatch(64, |worker, _| {
            seen[worker].fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(seen.iter().map(|s| s.load(Ordering::Relaxed)).sum::<usize>(), 64);
    }
}
