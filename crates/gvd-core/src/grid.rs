use serde::{Deserialize, Serialize};

use crate::{Error, Image, Origin2D};

/// Occupancy class of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Unknown,
    Free,
    Occupied,
}

impl Cell {
    /// Classifies a ROS-style occupancy value (`-1` unknown, `0..=100` probability).
    pub fn from_occupancy(value: i8, threshold: u8) -> Self {
        if value < 0 {
            Cell::Unknown
        } else if value as u8 >= threshold {
            Cell::Occupied
        } else {
            Cell::Free
        }
    }

    pub fn is_occupied(self) -> bool {
        self == Cell::Occupied
    }
}

/// Row-major occupancy raster.
///
/// Fields are public so that loaders can assemble grids directly; call
/// [`OccupancyGrid::validate`] before trusting the shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OccupancyGrid {
    pub width: usize,
    pub height: usize,
    /// Meters per cell.
    pub resolution: f64,
    pub origin: Origin2D,
    pub cells: Vec<Cell>,
}

impl OccupancyGrid {
    /// Grid with every cell [`Cell::Unknown`].
    pub fn new(width: usize, height: usize, resolution: f64) -> Self {
        let len = width.saturating_mul(height);
        Self {
            width,
            height,
            resolution,
            origin: Origin2D::default(),
            cells: vec![Cell::Unknown; len],
        }
    }

    pub fn from_occupancy_values(
        width: usize,
        height: usize,
        resolution: f64,
        values: &[i8],
        threshold: u8,
    ) -> Self {
        Self {
            width,
            height,
            resolution,
            origin: Origin2D::default(),
            cells: values
                .iter()
                .map(|&v| Cell::from_occupancy(v, threshold))
                .collect(),
        }
    }

    pub fn with_origin(mut self, origin: Origin2D) -> Self {
        self.origin = origin;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::EmptyGrid);
        }
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(Error::InvalidResolution(self.resolution));
        }

        let expected = self.width.checked_mul(self.height).ok_or(Error::SizeMismatch {
            expected: usize::MAX,
            actual: self.cells.len(),
        })?;
        if self.cells.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: self.cells.len(),
            });
        }

        Ok(())
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(self.index(x, y)).copied()
    }

    /// Sets a cell; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.index(x, y);
        if let Some(c) = self.cells.get_mut(idx) {
            *c = cell;
        }
    }

    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|&&c| c == cell).count()
    }

    /// Binary obstacle mask, `255` for [`Cell::Occupied`] and `0` otherwise.
    ///
    /// Unknown cells are not obstacles.
    pub fn occupied_mask(&self) -> Image<u8> {
        let data = self
            .cells
            .iter()
            .map(|c| if c.is_occupied() { 255 } else { 0 })
            .collect();

        Image::from_vec(self.width, self.height, data).unwrap_or_else(|_| Image::empty())
    }
}
