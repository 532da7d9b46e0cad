//! CSV data tables shipped alongside the per-cell clips.
//!
//! - `pixcols.csv`: one `r,g,b` row per cell, row-major, row 0 at the bottom of the canvas.
//! - `spec.csv`: a shared wavelength axis followed by one intensity row per cell.
//! - `intspec.csv`: a wavelength axis followed by the integrated (whole image) series.
//!
//! All tables are validated against the grid size when loaded so a mismatched export is
//! rejected up front instead of silently shifting cells.

use std::path::Path;

use thiserror::Error;

use crate::grid::{CellCoord, CellIndex};

/// Errors that can occur while reading a data table.
#[derive(Debug, Error)]
pub enum TableError {
    /// Failed to read the table file.
    #[error("failed to read table: {0}")]
    Io(#[from] std::io::Error),

    /// The table contains no rows.
    #[error("table is empty")]
    Empty,

    /// A field could not be parsed as a number in the expected range.
    #[error("invalid value {value:?} at line {line}, column {column}")]
    InvalidValue {
        line: usize,
        column: usize,
        value: String,
    },

    /// A row does not have the expected number of fields.
    #[error("line {line} has {found} values, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// The number of cell rows does not match the grid.
    #[error("table describes {found} cells, expected {expected}")]
    CellCountMismatch { expected: usize, found: usize },

    /// The pixel table's row count is not a perfect square.
    #[error("pixel table has {rows} rows, which does not form a square grid")]
    NotSquare { rows: usize },
}

/// Splits CSV text into rows of numbers, remembering 1-based line numbers.
fn parse_rows(text: &str) -> Result<Vec<(usize, Vec<f64>)>, TableError> {
    let mut rows = Vec::new();

    for (line_idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line_no = line_idx + 1;
        let values = line
            .split(',')
            .enumerate()
            .map(|(column_idx, field)| {
                field
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| TableError::InvalidValue {
                        line: line_no,
                        column: column_idx + 1,
                        value: field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        rows.push((line_no, values));
    }

    if rows.is_empty() {
        return Err(TableError::Empty);
    }

    Ok(rows)
}

/// Pairs a data row with the wavelength axis.
fn zip_with_axis(axis: &[f64], line: usize, values: &[f64]) -> Result<Vec<(f64, f64)>, TableError> {
    if values.len() != axis.len() {
        return Err(TableError::RaggedRow {
            line,
            expected: axis.len(),
            found: values.len(),
        });
    }

    Ok(axis.iter().copied().zip(values.iter().copied()).collect())
}

/// Swatch colour of every cell; also the source of the grid size.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelColorTable {
    n: usize,
    colors: Vec<[u8; 3]>,
}

impl PixelColorTable {
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses one `r,g,b` row per cell. The grid side is the square root of the row count.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let rows = parse_rows(text)?;

        let n = rows.len().isqrt();
        if n * n != rows.len() {
            return Err(TableError::NotSquare { rows: rows.len() });
        }

        let mut colors = Vec::with_capacity(rows.len());
        for (line, values) in rows {
            if values.len() != 3 {
                return Err(TableError::RaggedRow {
                    line,
                    expected: 3,
                    found: values.len(),
                });
            }

            let mut rgb = [0u8; 3];
            for (column, (slot, value)) in rgb.iter_mut().zip(values).enumerate() {
                if !(0.0..=255.0).contains(&value) {
                    return Err(TableError::InvalidValue {
                        line,
                        column: column + 1,
                        value: value.to_string(),
                    });
                }
                *slot = value.round() as u8;
            }
            colors.push(rgb);
        }

        Ok(Self { n, colors })
    }

    /// Side length of the grid.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn color(&self, coord: CellCoord) -> Option<[u8; 3]> {
        let index = coord.index(self.n)?;
        self.colors.get(index.get()).copied()
    }
}

/// Per-cell spectra sharing one wavelength axis, keyed by [`CellIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumTable {
    wavelengths: Vec<f64>,
    series: Vec<Vec<(f64, f64)>>,
}

impl SpectrumTable {
    pub fn load(path: &Path, n: usize) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, n)
    }

    /// Parses the axis row and exactly `n²` cell rows, each as long as the axis.
    pub fn parse(text: &str, n: usize) -> Result<Self, TableError> {
        let mut rows = parse_rows(text)?.into_iter();
        let Some((_, wavelengths)) = rows.next() else {
            return Err(TableError::Empty);
        };

        let series = rows
            .map(|(line, values)| zip_with_axis(&wavelengths, line, &values))
            .collect::<Result<Vec<_>, _>>()?;

        if series.len() != n * n {
            return Err(TableError::CellCountMismatch {
                expected: n * n,
                found: series.len(),
            });
        }

        Ok(Self {
            wavelengths,
            series,
        })
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn cell_count(&self) -> usize {
        self.series.len()
    }

    /// The (wavelength, intensity) points of one cell.
    pub fn series(&self, index: CellIndex) -> Option<&[(f64, f64)]> {
        self.series.get(index.get()).map(Vec::as_slice)
    }
}

/// Spectrum of the whole image, shown in its own chart.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedSpectrum {
    points: Vec<(f64, f64)>,
}

impl IntegratedSpectrum {
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses the axis row and the first series row; further rows are ignored.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let rows = parse_rows(text)?;
        let [(_, axis), (line, values), ..] = rows.as_slice() else {
            return Err(TableError::CellCountMismatch {
                expected: 1,
                found: 0,
            });
        };

        Ok(Self {
            points: zip_with_axis(axis, *line, values)?,
        })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}
