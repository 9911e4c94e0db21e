//! # Dense Tile Grid
//!
//! Row-major storage shared by every map layer (elevation, terrain,
//! decoration, resources).
//!
//! Allocation goes through `try_reserve_exact`, so a map that does not fit in
//! memory is reported as [`GridError::Allocation`] instead of aborting.

use std::ops::{Index, IndexMut};

use crate::error::{GridError, GridResult};

/// Offsets of the 8-connected neighborhood, row by row.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Dense row-major grid of tiles.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    cells: Vec<T>,
}

/// Checks dimensions and converts them into a tile count.
fn tile_count(width: u32, height: u32) -> GridResult<usize> {
    if width == 0 || height == 0 {
        return Err(GridError::EmptyDimensions { width, height });
    }
    let tiles = u64::from(width) * u64::from(height);
    usize::try_from(tiles).map_err(|_| GridError::Allocation { tiles })
}

impl<T: Clone> Grid<T> {
    /// Creates a grid with every tile set to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyDimensions`] for a zero dimension and
    /// [`GridError::Allocation`] when the storage cannot be reserved.
    pub fn filled(width: u32, height: u32, value: T) -> GridResult<Self> {
        let len = tile_count(width, height)?;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| GridError::Allocation { tiles: len as u64 })?;
        cells.resize(len, value);
        Ok(Self { width, height, cells })
    }
}

impl<T: Clone + Default> Grid<T> {
    /// Creates a grid filled with `T::default()`.
    ///
    /// # Errors
    ///
    /// Same as [`Grid::filled`].
    pub fn new(width: u32, height: u32) -> GridResult<Self> {
        Self::filled(width, height, T::default())
    }
}

impl<T> Grid<T> {
    /// Wraps an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyDimensions`] for a zero dimension and
    /// [`GridError::LengthMismatch`] when `cells` does not hold exactly
    /// `width * height` tiles.
    pub fn from_vec(width: u32, height: u32, cells: Vec<T>) -> GridResult<Self> {
        let expected = tile_count(width, height)?;
        if cells.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self { width, height, cells })
    }

    /// Grid width in tiles.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total number of tiles.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false for a constructed grid; present for API symmetry.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major index of `(x, y)`.
    #[inline]
    #[must_use]
    pub const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Inverse of [`Grid::index`].
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn coords(&self, index: usize) -> (u32, u32) {
        let w = self.width as usize;
        ((index % w) as u32, (index / w) as u32)
    }

    /// Whether signed coordinates fall inside the grid.
    #[inline]
    #[must_use]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    /// Whether `(x, y)` lies on the outermost ring of tiles.
    #[inline]
    #[must_use]
    pub const fn is_border(&self, x: u32, y: u32) -> bool {
        x == 0 || y == 0 || x + 1 >= self.width || y + 1 >= self.height
    }

    /// Tile at `(x, y)`, or `None` when out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x < self.width && y < self.height {
            self.cells.get(self.index(x, y))
        } else {
            None
        }
    }

    /// Mutable tile at `(x, y)`, or `None` when out of bounds.
    #[inline]
    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut T> {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            self.cells.get_mut(index)
        } else {
            None
        }
    }

    /// In-bounds 8-connected neighbors of `(x, y)`.
    pub fn neighbors8(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (x, y) = (i64::from(x), i64::from(y));
        NEIGHBORS_8.iter().filter_map(move |&(dx, dy)| {
            let (nx, ny) = (x + i64::from(dx), y + i64::from(dy));
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.contains(nx, ny).then_some((nx as u32, ny as u32))
        })
    }

    /// Row-major view of all tiles.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    /// Mutable row-major view of all tiles.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.cells
    }

    /// Consumes the grid, returning its row-major buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }

    /// Iterates tiles in row-major order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }
}

impl<T: Copy> Grid<T> {
    /// Copies out the tile at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    #[must_use]
    pub fn at(&self, x: u32, y: u32) -> T {
        self.cells[self.index(x, y)]
    }

    /// Overwrites the tile at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let index = self.index(x, y);
        self.cells[index] = value;
    }
}

impl<T> Index<usize> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.cells[index]
    }
}

impl<T> IndexMut<usize> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.cells[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let grid = Grid::<u8>::new(7, 5).unwrap();
        for i in 0..grid.len() {
            let (x, y) = grid.coords(i);
            assert_eq!(grid.index(x, y), i);
        }
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert_eq!(
            Grid::<f32>::new(0, 10),
            Err(GridError::EmptyDimensions { width: 0, height: 10 })
        );
    }

    #[test]
    fn test_huge_grid_reports_allocation_failure() {
        // 2^64 - 2^33 + 1 tiles cannot fit anywhere.
        let result = Grid::<u8>::new(u32::MAX, u32::MAX);
        assert!(matches!(result, Err(GridError::Allocation { .. })));
    }

    #[test]
    fn test_neighbors_clipped_at_corners() {
        let grid = Grid::<u8>::new(4, 4).unwrap();
        assert_eq!(grid.neighbors8(0, 0).count(), 3);
        assert_eq!(grid.neighbors8(3, 1).count(), 5);
        assert_eq!(grid.neighbors8(1, 1).count(), 8);
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let result = Grid::from_vec(2, 2, vec![0u8; 3]);
        assert_eq!(
            result,
            Err(GridError::LengthMismatch { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_get_out_of_bounds() {
        let mut grid = Grid::filled(3, 3, 1.5f32).unwrap();
        assert_eq!(grid.get(3, 0), None);
        grid.set(2, 2, 4.0);
        assert_eq!(grid.at(2, 2), 4.0);
        assert!(grid.is_border(2, 1));
        assert!(!grid.is_border(1, 1));
    }
}
