//! Weighted 1-D and 2-D histograms with under/overflow cells.
//!
//! Contents are stored flat with `(nx + 2) * (ny + 2)` cells, where index `0`
//! and index `n + 1` of each axis hold the underflow and overflow. A 1-D
//! histogram uses a single row (`ny + 2` collapses to `1`).

use std::fmt;

use thiserror::Error;

/// Default bin count for an automatic 1-D axis.
pub const DEFAULT_BINS_1D: u32 = 100;

/// Default bin count per axis for an automatic 2-D histogram.
pub const DEFAULT_BINS_2D: u32 = 40;

/// Number of accepted entries buffered before an automatic range is fixed.
pub const AUTO_RANGE_BUFFER: usize = 1000;

/// Largest number of cells, flow cells included, that explicit binning may
/// request.
pub const MAX_CELLS: usize = 1 << 24;

/// Fraction of the observed span added on each side of an automatic range.
const AUTO_RANGE_MARGIN: f64 = 0.01;
/// Automatic axes never extend past `±AUTO_RANGE_LIMIT`, keeping the span finite.
const AUTO_RANGE_LIMIT: f64 = f64::MAX / 4.0;

/// Invalid axis parameters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AxisError {
    /// The axis has no bins.
    #[error("an axis needs at least one bin")]
    NoBins,
    /// The range is empty, inverted or not finite.
    #[error("axis range [{low}, {high}) is invalid")]
    InvalidRange {
        /// Lower edge.
        low: f64,
        /// Upper edge.
        high: f64,
    },
}

/// A uniformly binned axis over `[low, high)`.
///
/// # Examples
/// ```
/// use treedraw_core::Axis;
///
/// let axis = Axis::new(4, 0.0, 2.0)?;
/// assert_eq!(axis.find_bin(-1.0), Some(0));
/// assert_eq!(axis.find_bin(0.6), Some(2));
/// assert_eq!(axis.find_bin(2.0), Some(5));
/// assert_eq!(axis.find_bin(f64::NAN), None);
/// # Ok::<(), treedraw_core::AxisError>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Axis {
    bins: u32,
    low: f64,
    high: f64,
}

impl Axis {
    /// Creates an axis with `bins` equal-width bins.
    ///
    /// # Errors
    /// Returns [`AxisError`] when `bins` is zero or the range is not a finite,
    /// non-empty interval.
    pub fn new(bins: u32, low: f64, high: f64) -> Result<Self, AxisError> {
        if bins == 0 {
            return Err(AxisError::NoBins);
        }
        if !(low.is_finite() && high.is_finite() && low < high && (high - low).is_finite()) {
            return Err(AxisError::InvalidRange { low, high });
        }
        Ok(Self { bins, low, high })
    }

    /// Derives an axis covering the finite range `[min, max]` with a small
    /// margin. Values beyond `±AUTO_RANGE_LIMIT` are left to the flow cells.
    fn covering(bins: u32, min: f64, max: f64) -> Self {
        let min = min.clamp(-AUTO_RANGE_LIMIT, AUTO_RANGE_LIMIT);
        let max = max.clamp(-AUTO_RANGE_LIMIT, AUTO_RANGE_LIMIT);
        let span = max - min;
        let margin = if span > 0.0 {
            span * AUTO_RANGE_MARGIN
        } else {
            f64::max(1.0, min.abs() * AUTO_RANGE_MARGIN)
        };
        Self::new(bins, min - margin, max + margin).unwrap_or(Self::unit(bins))
    }

    const fn unit(bins: u32) -> Self {
        Self {
            bins,
            low: 0.0,
            high: 1.0,
        }
    }

    /// Number of in-range bins.
    #[must_use]
    pub const fn bins(&self) -> u32 {
        self.bins
    }

    /// Lower edge of the first bin.
    #[must_use]
    pub const fn low(&self) -> f64 {
        self.low
    }

    /// Upper edge of the last bin.
    #[must_use]
    pub const fn high(&self) -> f64 {
        self.high
    }

    /// Width of one bin.
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.high - self.low) / f64::from(self.bins)
    }

    /// Number of cells including under/overflow.
    #[must_use]
    pub fn cells(&self) -> usize {
        self.bins as usize + 2
    }

    /// Returns the cell holding `value`, or `None` for NaN.
    #[must_use]
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        if value < self.low {
            return Some(0);
        }
        if value >= self.high {
            return Some(self.bins as usize + 1);
        }
        let offset = ((value - self.low) / self.width()) as usize;
        Some(offset.min(self.bins as usize - 1) + 1)
    }

    /// Centre of in-range bin `bin` (one-based).
    #[must_use]
    pub fn center(&self, bin: usize) -> f64 {
        self.low + (bin as f64 - 0.5) * self.width()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}, {})", self.bins, self.low, self.high)
    }
}

/// A filled histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    name: String,
    x: Axis,
    y: Option<Axis>,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
}

/// Stored contents failed to match the histogram shape.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("histogram `{name}` expects {expected} cells but {found} were supplied")]
pub struct ShapeMismatch {
    /// Histogram name.
    pub name: String,
    /// Cells implied by the axes.
    pub expected: usize,
    /// Cells supplied.
    pub found: usize,
}

impl Histogram {
    /// Creates an empty 1-D histogram.
    #[must_use]
    pub fn new_1d(name: impl Into<String>, x: Axis) -> Self {
        Self::empty(name.into(), x, None)
    }

    /// Creates an empty 2-D histogram.
    #[must_use]
    pub fn new_2d(name: impl Into<String>, x: Axis, y: Axis) -> Self {
        Self::empty(name.into(), x, Some(y))
    }

    fn empty(name: String, x: Axis, y: Option<Axis>) -> Self {
        let cells = x.cells() * y.map_or(1, |axis| axis.cells());
        Self {
            name,
            x,
            y,
            contents: vec![0.0; cells],
            sumw2: vec![0.0; cells],
            entries: 0,
        }
    }

    /// Rebuilds a histogram from stored cells.
    ///
    /// # Errors
    /// Returns [`ShapeMismatch`] when `contents` or `sumw2` do not hold
    /// exactly one value per cell.
    pub fn from_parts(
        name: impl Into<String>,
        x: Axis,
        y: Option<Axis>,
        contents: Vec<f64>,
        sumw2: Vec<f64>,
        entries: u64,
    ) -> Result<Self, ShapeMismatch> {
        let name = name.into();
        let expected = x.cells() * y.map_or(1, |axis| axis.cells());
        for found in [contents.len(), sumw2.len()] {
            if found != expected {
                return Err(ShapeMismatch {
                    name,
                    expected,
                    found,
                });
            }
        }
        Ok(Self {
            name,
            x,
            y,
            contents,
            sumw2,
            entries,
        })
    }

    /// Histogram name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The x axis.
    #[must_use]
    pub const fn x_axis(&self) -> &Axis {
        &self.x
    }

    /// The y axis of a 2-D histogram.
    #[must_use]
    pub const fn y_axis(&self) -> Option<&Axis> {
        self.y.as_ref()
    }

    /// 1 or 2.
    #[must_use]
    pub const fn dimension(&self) -> u8 {
        if self.y.is_some() { 2 } else { 1 }
    }

    /// Number of fills, including those that landed in flow cells.
    #[must_use]
    pub const fn entries(&self) -> u64 {
        self.entries
    }

    /// Flat cell contents.
    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Flat sums of squared weights.
    #[must_use]
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    fn cell_index(&self, bin_x: usize, bin_y: usize) -> usize {
        bin_y * self.x.cells() + bin_x
    }

    /// Content of cell `(bin_x, bin_y)`; pass `bin_y = 0` for 1-D.
    #[must_use]
    pub fn content(&self, bin_x: usize, bin_y: usize) -> f64 {
        self.contents
            .get(self.cell_index(bin_x, bin_y))
            .copied()
            .unwrap_or(0.0)
    }

    /// Fills one entry with weight `weight`.
    ///
    /// `y` is ignored for 1-D histograms and required for 2-D histograms.
    /// Returns whether the entry was recorded; NaN coordinates are dropped.
    pub fn fill(&mut self, x: f64, y: Option<f64>, weight: f64) -> bool {
        let Some(bin_x) = self.x.find_bin(x) else {
            return false;
        };
        let bin_y = match (self.y, y) {
            (None, _) => 0,
            (Some(axis), Some(value)) => match axis.find_bin(value) {
                Some(bin) => bin,
                None => return false,
            },
            (Some(_), None) => return false,
        };
        let index = self.cell_index(bin_x, bin_y);
        if let (Some(content), Some(sumw2)) =
            (self.contents.get_mut(index), self.sumw2.get_mut(index))
        {
            *content += weight;
            *sumw2 += weight * weight;
            self.entries += 1;
            return true;
        }
        false
    }

    /// Sum of weights in the in-range cells.
    #[must_use]
    pub fn integral(&self) -> f64 {
        let (nx, ny) = self.in_range_bins();
        let mut total = 0.0;
        for bin_y in ny.clone() {
            for bin_x in nx.clone() {
                total += self.content(bin_x, bin_y);
            }
        }
        total
    }

    /// Weighted mean of the x coordinate over in-range cells, from bin centres.
    #[must_use]
    pub fn mean_x(&self) -> Option<f64> {
        let (nx, ny) = self.in_range_bins();
        let mut sum_w = 0.0;
        let mut sum_wx = 0.0;
        for bin_y in ny {
            for bin_x in nx.clone() {
                let weight = self.content(bin_x, bin_y);
                sum_w += weight;
                sum_wx += weight * self.x.center(bin_x);
            }
        }
        (sum_w != 0.0).then(|| sum_wx / sum_w)
    }

    fn in_range_bins(&self) -> (std::ops::RangeInclusive<usize>, std::ops::RangeInclusive<usize>) {
        let nx = 1..=self.x.bins() as usize;
        let ny = match self.y {
            Some(axis) => 1..=axis.bins() as usize,
            None => 0..=0,
        };
        (nx, ny)
    }
}

/// How a histogram's axes are chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Binning {
    /// Axes derived from the first [`AUTO_RANGE_BUFFER`] entries.
    Auto {
        /// Bins on the x axis.
        x_bins: u32,
        /// Bins on the y axis, for 2-D.
        y_bins: Option<u32>,
    },
    /// Axes given up front.
    Fixed {
        /// The x axis.
        x: Axis,
        /// The y axis, for 2-D.
        y: Option<Axis>,
    },
}

impl Binning {
    /// Automatic binning with the default bin counts for `dimension`.
    #[must_use]
    pub const fn auto(dimension: u8) -> Self {
        if dimension == 2 {
            Self::Auto {
                x_bins: DEFAULT_BINS_2D,
                y_bins: Some(DEFAULT_BINS_2D),
            }
        } else {
            Self::Auto {
                x_bins: DEFAULT_BINS_1D,
                y_bins: None,
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingEntry {
    x: f64,
    y: Option<f64>,
    weight: f64,
}

#[derive(Debug)]
enum FillerState {
    Buffering {
        x_bins: u32,
        y_bins: Option<u32>,
        buffer: Vec<PendingEntry>,
    },
    Ready(Histogram),
}

/// Accumulates entries for one histogram, fixing automatic axes once enough
/// entries have been buffered.
#[derive(Debug)]
pub struct HistogramFiller {
    name: String,
    state: FillerState,
}

impl HistogramFiller {
    /// Creates a filler for `name` with the given binning.
    #[must_use]
    pub fn new(name: impl Into<String>, binning: Binning) -> Self {
        let name = name.into();
        let state = match binning {
            Binning::Fixed { x, y } => FillerState::Ready(Histogram::empty(name.clone(), x, y)),
            Binning::Auto { x_bins, y_bins } => FillerState::Buffering {
                x_bins,
                y_bins,
                buffer: Vec::new(),
            },
        };
        Self { name, state }
    }

    /// Records one entry.
    pub fn fill(&mut self, x: f64, y: Option<f64>, weight: f64) {
        match &mut self.state {
            FillerState::Ready(histogram) => {
                histogram.fill(x, y, weight);
            }
            FillerState::Buffering { buffer, .. } => {
                if x.is_nan() || y.is_some_and(f64::is_nan) {
                    return;
                }
                buffer.push(PendingEntry { x, y, weight });
                if buffer.len() >= AUTO_RANGE_BUFFER {
                    self.flush();
                }
            }
        }
    }

    fn flush(&mut self) {
        let FillerState::Buffering {
            x_bins,
            y_bins,
            buffer,
        } = &mut self.state
        else {
            return;
        };
        let (x_bins, y_bins) = (*x_bins, *y_bins);
        let entries = std::mem::take(buffer);
        let axis_for = |bins: u32, range: Option<(f64, f64)>| match range {
            Some((min, max)) => Axis::covering(bins, min, max),
            None => Axis::unit(bins),
        };
        let x = axis_for(x_bins, range_of(entries.iter().map(|entry| entry.x)));
        let y = y_bins
            .map(|bins| axis_for(bins, range_of(entries.iter().filter_map(|entry| entry.y))));
        let mut histogram = Histogram::empty(self.name.clone(), x, y);
        for entry in entries {
            histogram.fill(entry.x, entry.y, entry.weight);
        }
        self.state = FillerState::Ready(histogram);
    }

    /// Fixes any pending automatic axes and returns the histogram.
    #[must_use]
    pub fn finish(mut self) -> Histogram {
        self.flush();
        match self.state {
            FillerState::Ready(histogram) => histogram,
            FillerState::Buffering { x_bins, y_bins, .. } => {
                Histogram::empty(self.name, Axis::unit(x_bins), y_bins.map(Axis::unit))
            }
        }
    }
}

/// Minimum and maximum of the finite `values`; infinities only reach the
/// flow cells.
fn range_of(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|value| value.is_finite()).fold(None, |range, value| match range {
        None => Some((value, value)),
        Some((min, max)) => Some((f64::min(min, value), f64::max(max, value))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn axis(bins: u32, low: f64, high: f64) -> Axis {
        Axis::new(bins, low, high).expect("axis must be valid")
    }

    #[rstest]
    #[case(0, 0.0, 1.0, AxisError::NoBins)]
    #[case(10, 1.0, 1.0, AxisError::InvalidRange { low: 1.0, high: 1.0 })]
    #[case(10, 2.0, 1.0, AxisError::InvalidRange { low: 2.0, high: 1.0 })]
    #[case(10, 0.0, f64::INFINITY, AxisError::InvalidRange { low: 0.0, high: f64::INFINITY })]
    #[case(10, -1e308, 1e308, AxisError::InvalidRange { low: -1e308, high: 1e308 })]
    fn axis_rejects_invalid_parameters(
        #[case] bins: u32,
        #[case] low: f64,
        #[case] high: f64,
        #[case] expected: AxisError,
    ) {
        assert_eq!(Axis::new(bins, low, high), Err(expected));
    }

    #[rstest]
    #[case(-0.1, 0)]
    #[case(0.0, 1)]
    #[case(0.99, 1)]
    #[case(1.0, 2)]
    #[case(2.999_999, 3)]
    #[case(3.0, 4)]
    #[case(f64::INFINITY, 4)]
    #[case(f64::NEG_INFINITY, 0)]
    fn find_bin_places_edges_in_upper_bin(#[case] value: f64, #[case] expected: usize) {
        assert_eq!(axis(3, 0.0, 3.0).find_bin(value), Some(expected));
    }

    #[rstest]
    fn fill_1d_tracks_flow_and_weights() {
        let mut histogram = Histogram::new_1d("h", axis(3, 0.0, 3.0));
        assert!(histogram.fill(0.5, None, 1.0));
        assert!(histogram.fill(0.5, None, 2.0));
        assert!(histogram.fill(-4.0, None, 1.0));
        assert!(histogram.fill(9.0, None, 1.0));
        assert!(!histogram.fill(f64::NAN, None, 1.0));
        assert_eq!(histogram.contents(), [1.0, 3.0, 0.0, 0.0, 1.0]);
        assert_eq!(histogram.sumw2(), [1.0, 5.0, 0.0, 0.0, 1.0]);
        assert_eq!(histogram.entries(), 4);
        assert_eq!(histogram.integral(), 3.0);
        assert_eq!(histogram.mean_x(), Some(0.5));
    }

    #[rstest]
    fn fill_2d_uses_x_then_y() {
        let mut histogram = Histogram::new_2d("h", axis(2, 0.0, 2.0), axis(2, 0.0, 2.0));
        assert!(histogram.fill(1.5, Some(0.5), 1.0));
        assert_eq!(histogram.content(2, 1), 1.0);
        assert_eq!(histogram.content(1, 2), 0.0);
        assert!(!histogram.fill(1.5, None, 1.0));
        assert_eq!(histogram.dimension(), 2);
        assert_eq!(histogram.contents().len(), 16);
    }

    #[rstest]
    fn from_parts_checks_shape() {
        let err = Histogram::from_parts("h", axis(2, 0.0, 1.0), None, vec![0.0; 3], vec![0.0; 4], 0)
            .expect_err("three cells cannot describe a two-bin axis");
        assert_eq!(err.expected, 4);
        assert_eq!(err.found, 3);
    }

    #[rstest]
    fn auto_range_covers_buffered_values() {
        let mut filler = HistogramFiller::new("h", Binning::auto(1));
        for value in [1.0, 5.0, 3.0] {
            filler.fill(value, None, 1.0);
        }
        let histogram = filler.finish();
        let x = histogram.x_axis();
        assert_eq!(x.bins(), DEFAULT_BINS_1D);
        assert!(x.low() < 1.0 && x.high() > 5.0);
        assert_eq!(histogram.entries(), 3);
        assert_eq!(histogram.integral(), 3.0);
    }

    #[rstest]
    fn auto_range_is_fixed_after_buffer_fills() {
        let mut filler = HistogramFiller::new("h", Binning::auto(1));
        for index in 0..AUTO_RANGE_BUFFER {
            filler.fill(index as f64 / 1000.0, None, 1.0);
        }
        filler.fill(50.0, None, 1.0);
        let histogram = filler.finish();
        assert!(histogram.x_axis().high() < 2.0);
        let overflow = histogram.content(DEFAULT_BINS_1D as usize + 1, 0);
        assert_eq!(overflow, 1.0);
        assert_eq!(histogram.entries(), AUTO_RANGE_BUFFER as u64 + 1);
    }

    #[rstest]
    fn auto_range_widens_single_value() {
        let mut filler = HistogramFiller::new("h", Binning::auto(2));
        filler.fill(2.0, Some(-3.0), 1.0);
        let histogram = filler.finish();
        assert_eq!(histogram.x_axis().low(), 1.0);
        assert_eq!(histogram.x_axis().high(), 3.0);
        let y = histogram.y_axis().expect("2-D histogram has a y axis");
        assert_eq!((y.low(), y.high()), (-4.0, -2.0));
    }

    #[rstest]
    fn auto_range_ignores_infinite_values() {
        let mut filler = HistogramFiller::new("inv", Binning::auto(1));
        for x in [0.1_f64, 0.2, 0.25, 0.5, 0.0] {
            filler.fill(1.0 / x, None, 1.0);
        }
        let histogram = filler.finish();
        let x = histogram.x_axis();
        assert!((x.low() - 1.92).abs() < 1e-9, "low = {}", x.low());
        assert!((x.high() - 10.08).abs() < 1e-9, "high = {}", x.high());
        assert_eq!(histogram.entries(), 5);
        assert_eq!(histogram.integral(), 4.0);
        assert_eq!(histogram.content(DEFAULT_BINS_1D as usize + 1, 0), 1.0);
    }

    #[rstest]
    fn auto_range_survives_spans_that_overflow() {
        let mut filler = HistogramFiller::new("h", Binning::auto(1));
        for x in [-1e308, 0.0, 1e308, f64::NEG_INFINITY] {
            filler.fill(x, None, 1.0);
        }
        let histogram = filler.finish();
        let x = histogram.x_axis();
        assert!(x.width().is_finite());
        assert!(x.low() < -1e307 && x.high() > 1e307);
        assert_eq!(histogram.integral(), 1.0);
        assert_eq!(histogram.content(0, 0), 2.0);
        assert_eq!(histogram.content(DEFAULT_BINS_1D as usize + 1, 0), 1.0);
    }

    #[rstest]
    fn auto_range_of_only_infinities_keeps_them_in_flow_cells() {
        let mut filler = HistogramFiller::new("h", Binning::auto(1));
        filler.fill(f64::INFINITY, None, 1.0);
        let histogram = filler.finish();
        assert_eq!((histogram.x_axis().low(), histogram.x_axis().high()), (0.0, 1.0));
        assert_eq!(histogram.entries(), 1);
        assert_eq!(histogram.integral(), 0.0);
    }

    #[rstest]
    fn empty_auto_histogram_uses_unit_axis() {
        let histogram = HistogramFiller::new("h", Binning::auto(1)).finish();
        assert_eq!(histogram.x_axis().low(), 0.0);
        assert_eq!(histogram.x_axis().high(), 1.0);
        assert_eq!(histogram.entries(), 0);
    }
}
