//! Cell addressing for the N×N listener grid.
//!
//! A cell is identified either by its [`CellCoord`] (row counted from the bottom of the canvas,
//! column counted from the left) or by its linear [`CellIndex`] `column + n * row`. The
//! [`GridLayout`] maps canvas pointer coordinates onto cells and back onto the swatch
//! rectangles a renderer paints, so the visual cells and the audio cells always agree.

use thiserror::Error;

/// Linear cell identity: `column + n * row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex(pub usize);

impl CellIndex {
    pub fn get(self) -> usize {
        self.0
    }

    /// Decodes the index back into its (row, column) pair for an `n`-sided grid.
    ///
    /// Returns `None` when the index lies outside `0..n²`.
    pub fn coord(self, n: usize) -> Option<CellCoord> {
        if n == 0 || self.0 >= n * n {
            return None;
        }

        Some(CellCoord {
            row: self.0 / n,
            column: self.0 % n,
        })
    }
}

/// Two-dimensional cell identity. Row 0 is the bottom row of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub row: usize,
    pub column: usize,
}

impl CellCoord {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Encodes the pair as `column + n * row`, or `None` if either axis is outside `0..n`.
    pub fn index(self, n: usize) -> Option<CellIndex> {
        if self.row >= n || self.column >= n {
            return None;
        }

        Some(CellIndex(self.column + n * self.row))
    }

    /// Iterates every cell of an `n`-sided grid in index order.
    pub fn all(n: usize) -> impl Iterator<Item = CellCoord> {
        (0..n).flat_map(move |row| (0..n).map(move |column| CellCoord { row, column }))
    }
}

/// Pointer position that does not fall on any cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("pointer position ({x}, {y}) is outside the grid")]
pub struct OutOfBounds {
    pub x: f64,
    pub y: f64,
}

/// Canvas-space rectangle of one swatch (screen coordinates, y growing downwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub left: f64,
    pub top: f64,
    pub size: f64,
}

/// Geometry of the grid canvas in pointer coordinates.
///
/// The canvas covers `x ∈ [origin_x, origin_x + n·s)` and `y ∈ [bottom − n·s, bottom)` where
/// `s` is the cell size in pixels. Points outside that rectangle have no cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    origin_x: f64,
    origin_bottom: f64,
    cell_size: f64,
    n: usize,
}

impl GridLayout {
    /// Creates a layout from the canvas' left edge and bottom edge.
    pub fn new(origin_x: f64, origin_bottom: f64, cell_size: f64, n: usize) -> Self {
        Self {
            origin_x,
            origin_bottom,
            cell_size,
            n,
        }
    }

    /// Creates a layout from the canvas' top-left corner, the way a bounding client rect
    /// reports it.
    pub fn from_top_left(left: f64, top: f64, cell_size: f64, n: usize) -> Self {
        Self::new(left, top + cell_size * n as f64, cell_size, n)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn cell_count(&self) -> usize {
        self.n * self.n
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Side length of the whole canvas in pixels.
    pub fn extent(&self) -> f64 {
        self.cell_size * self.n as f64
    }

    /// Maps a pointer position to the cell under it.
    ///
    /// `column = floor((x − origin_x) / s)` and `row = ceil((bottom − y) / s) − 1`, so the
    /// bottom band of the canvas is row 0.
    pub fn coord_at(&self, x: f64, y: f64) -> Result<CellCoord, OutOfBounds> {
        let out_of_bounds = OutOfBounds { x, y };

        if self.n == 0 || !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(out_of_bounds);
        }

        let dx = x - self.origin_x;
        let dy = self.origin_bottom - y;
        let extent = self.extent();
        if !dx.is_finite() || !dy.is_finite() {
            return Err(out_of_bounds);
        }
        if dx < 0.0 || dx >= extent || dy <= 0.0 || dy > extent {
            return Err(out_of_bounds);
        }

        let column = (dx / self.cell_size).floor() as usize;
        let row = ((dy / self.cell_size).ceil() as usize).saturating_sub(1);

        // Division rounding at the far edges must not escape the grid.
        Ok(CellCoord {
            row: row.min(self.n - 1),
            column: column.min(self.n - 1),
        })
    }

    /// Maps a pointer position to the linear index of the cell under it.
    pub fn index_at(&self, x: f64, y: f64) -> Result<CellIndex, OutOfBounds> {
        let coord = self.coord_at(x, y)?;
        coord.index(self.n).ok_or(OutOfBounds { x, y })
    }

    /// Swatch rectangle of a cell; the forward mapping `index_at` inverts.
    pub fn cell_rect(&self, coord: CellCoord) -> Option<CellRect> {
        if coord.row >= self.n || coord.column >= self.n {
            return None;
        }

        Some(CellRect {
            left: self.origin_x + coord.column as f64 * self.cell_size,
            top: self.origin_bottom - (coord.row + 1) as f64 * self.cell_size,
            size: self.cell_size,
        })
    }
}
