//! Keeps the spectrum plot in step with the cell under the pointer.

use crate::grid::CellIndex;
use crate::tables::SpectrumTable;

/// A plot widget that shows one (wavelength, intensity) series at a time.
pub trait SpectrumPlot {
    /// Replaces the displayed dataset.
    fn set_series(&mut self, points: &[(f64, f64)]);

    /// Requests a redraw after the dataset changed.
    fn redraw(&mut self);
}

/// Pushes the pre-loaded per-cell spectrum of the hovered cell into a [`SpectrumPlot`].
pub struct SpectrumSync<P> {
    table: Option<SpectrumTable>,
    plot: P,
    shown: Option<CellIndex>,
}

impl<P: SpectrumPlot> SpectrumSync<P> {
    /// Creates the sync. A `None` table leaves the plot untouched forever.
    pub fn new(table: Option<SpectrumTable>, plot: P) -> Self {
        Self {
            table,
            plot,
            shown: None,
        }
    }

    /// Shows the series of `index`. Returns `false` and leaves the plot as it was when the
    /// index has no series.
    pub fn show(&mut self, index: CellIndex) -> bool {
        let Some(series) = self.table.as_ref().and_then(|table| table.series(index)) else {
            return false;
        };

        self.plot.set_series(series);
        self.plot.redraw();
        self.shown = Some(index);
        true
    }

    /// Index of the series currently displayed.
    pub fn shown(&self) -> Option<CellIndex> {
        self.shown
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    pub fn table(&self) -> Option<&SpectrumTable> {
        self.table.as_ref()
    }

    pub fn plot(&self) -> &P {
        &self.plot
    }

    pub fn plot_mut(&mut self) -> &mut P {
        &mut self.plot
    }
}
