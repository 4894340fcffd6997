//! Candidate cutpoint grids.

use std::num::NonZero;

use crate::Error;

/// How candidate cutpoints are placed on the normalized domain.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    /// Equal-width cells spanning `[0, 1]`.
    Regular,
    /// Every distinct sample value is a cutpoint, the finest grid consistent with the data.
    #[default]
    Data,
    /// Cutpoints at evenly spaced sample quantiles.
    Quantile,
}

/// Side of a bin that contains its boundary value.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// Bins are `[a, b)`, the last bin also contains its right edge.
    Left,
    /// Bins are `(a, b]`, the first bin also contains its left edge.
    #[default]
    Right,
}

impl Closed {
    /// Whether `value` belongs to a bin left of `cut`.
    #[inline]
    #[must_use]
    pub fn is_before(self, value: f64, cut: f64) -> bool {
        match self {
            Self::Left => value < cut,
            Self::Right => value <= cut,
        }
    }

    /// Index of the cell of `points` containing `value`.
    ///
    /// Values outside of the outer points are assigned to the outermost cell.
    #[inline]
    pub(crate) fn locate(self, points: &[f64], value: f64) -> usize {
        let cells = points.len().saturating_sub(1);
        if cells <= 1 {
            return 0;
        }

        // Count the interior cuts the value is not before
        points[1..cells].partition_point(|cut| !self.is_before(value, *cut))
    }

    /// Index of the cell of an equal-width grid containing `value`.
    ///
    /// Arithmetic gives the cell up to rounding, the stored points decide at the edges.
    #[inline]
    fn locate_regular(self, points: &[f64], value: f64) -> usize {
        let cells = points.len().saturating_sub(1);
        if cells <= 1 {
            return 0;
        }

        // Negative values saturate to zero
        let mut index = ((value * cells as f64).floor() as usize).min(cells - 1);

        loop {
            if index > 0 && self.is_before(value, points[index]) {
                index -= 1;
            } else if index + 1 < cells && !self.is_before(value, points[index + 1]) {
                index += 1;
            } else {
                break index;
            }
        }
    }
}

/// Default number of cells for the regular and quantile grids, `floor(n / ln n)`.
#[must_use]
pub fn default_cells(sample_size: usize) -> NonZero<usize> {
    if sample_size < 3 {
        return NonZero::<usize>::MIN;
    }

    let size = sample_size as f64;
    let cells = (size / size.ln()).floor() as usize;

    NonZero::new(cells).unwrap_or(NonZero::<usize>::MIN)
}

/// Candidate cutpoints on `[0, 1]` with the cumulative sample counts at each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Strictly increasing cutpoints, first is `0.0` and last is `1.0`.
    points: Vec<f64>,
    /// `cumulative[i]` is the amount of values in the cells left of `points[i]`.
    cumulative: Vec<usize>,
    /// Convention used to assign boundary values.
    closed: Closed,
}

impl Grid {
    /// Build the grid for a sample already normalized to `[0, 1]`.
    ///
    /// `cells` bounds the regular and quantile grids, the data grid uses every distinct value.
    #[must_use]
    pub fn build(normalized: &[f64], mode: GridMode, cells: NonZero<usize>, closed: Closed) -> Self {
        debug_assert!(
            normalized.iter().all(|value| (0.0..=1.0).contains(value)),
            "sample must be normalized before building a grid"
        );

        let mut sorted = normalized.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);

        let points = match mode {
            GridMode::Regular => regular_points(cells),
            GridMode::Data => data_points(&sorted),
            GridMode::Quantile => quantile_points(&sorted, cells),
        };

        // Bin every value, equal-width grids don't need a binary search
        let mut cell_counts = vec![0_usize; points.len() - 1];
        for value in &sorted {
            let cell = match mode {
                GridMode::Regular => closed.locate_regular(&points, *value),
                GridMode::Data | GridMode::Quantile => closed.locate(&points, *value),
            };
            cell_counts[cell] += 1;
        }

        Self {
            cumulative: cumulate(&cell_counts),
            points,
            closed,
        }
    }

    /// Construct a grid from its parts.
    ///
    /// # Errors
    ///
    /// - When the points are not strictly increasing from `0.0` to `1.0`.
    /// - When the counts don't start at zero, decrease, or have a different length.
    pub fn from_parts(points: Vec<f64>, cumulative: Vec<usize>, closed: Closed) -> Result<Self, Error> {
        if points.len() < 2
            || points.first().copied() != Some(0.0)
            || points.last().copied() != Some(1.0)
            || points.windows(2).any(|pair| pair[0] >= pair[1])
        {
            return Err(Error::InvalidParameter("grid points must increase strictly from 0 to 1"));
        }

        if cumulative.len() != points.len()
            || cumulative.first().copied() != Some(0)
            || cumulative.windows(2).any(|pair| pair[0] > pair[1])
        {
            return Err(Error::InvalidParameter("cumulative counts must start at 0 and never decrease"));
        }

        Ok(Self {
            points,
            cumulative,
            closed,
        })
    }

    /// Keep only the points at the given sorted indices.
    ///
    /// The indices must include the first and the last point.
    #[must_use]
    pub fn restrict(&self, indices: &[usize]) -> Self {
        debug_assert!(
            indices.first() == Some(&0) && indices.last() == Some(&self.cells()),
            "restricted grid must keep both endpoints"
        );
        debug_assert!(
            indices.windows(2).all(|pair| pair[0] < pair[1]),
            "restricted indices must be strictly increasing"
        );

        Self {
            points: indices.iter().map(|index| self.points[*index]).collect(),
            cumulative: indices.iter().map(|index| self.cumulative[*index]).collect(),
            closed: self.closed,
        }
    }

    /// Amount of cells between the points.
    #[inline]
    #[must_use]
    pub const fn cells(&self) -> usize {
        self.points.len() - 1
    }

    /// Cutpoints.
    #[must_use]
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Cumulative counts, one per cutpoint.
    #[must_use]
    pub fn cumulative_counts(&self) -> &[usize] {
        &self.cumulative
    }

    /// Amount of sample values on the grid.
    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.cumulative.last().copied().unwrap_or_default()
    }

    /// Boundary convention the counts were computed with.
    #[must_use]
    pub const fn closed(&self) -> Closed {
        self.closed
    }

    /// Amount of values between two cutpoint indices.
    #[inline]
    #[must_use]
    pub fn count(&self, left: usize, right: usize) -> usize {
        self.cumulative[right] - self.cumulative[left]
    }

    /// Normalized length between two cutpoint indices.
    #[inline]
    #[must_use]
    pub fn length(&self, left: usize, right: usize) -> f64 {
        self.points[right] - self.points[left]
    }
}

/// Equal-width cutpoints.
fn regular_points(cells: NonZero<usize>) -> Vec<f64> {
    let cells = cells.get();

    (0..=cells)
        .map(|index| index as f64 / cells as f64)
        .collect()
}

/// Distinct values of a sorted sample, framed by the domain endpoints.
fn data_points(sorted: &[f64]) -> Vec<f64> {
    let mut points = Vec::with_capacity(sorted.len() + 2);
    points.push(0.0);
    points.extend(sorted.iter().copied().filter(|value| *value > 0.0 && *value < 1.0));
    points.push(1.0);
    points.dedup();

    points
}

/// Evenly spaced quantiles of a sorted sample, ties collapsed.
fn quantile_points(sorted: &[f64], cells: NonZero<usize>) -> Vec<f64> {
    let cells = cells.get();

    let mut points = Vec::with_capacity(cells + 1);
    points.push(0.0);
    if !sorted.is_empty() {
        for step in 1..cells {
            let cut = quantile(sorted, step as f64 / cells as f64);

            // Keep the grid strictly increasing and inside the domain
            if cut > points[points.len() - 1] && cut < 1.0 {
                points.push(cut);
            }
        }
    }
    points.push(1.0);

    points
}

/// Quantile with linear interpolation between order statistics.
fn quantile(sorted: &[f64], probability: f64) -> f64 {
    let position = probability * (sorted.len() - 1) as f64;
    let lower = position.floor();
    let index = lower as usize;

    match (sorted.get(index), sorted.get(index + 1)) {
        (Some(below), Some(above)) => (position - lower).mul_add(above - below, *below),
        (Some(below), None) => *below,
        _ => sorted.last().copied().unwrap_or_default(),
    }
}

/// Running total starting at zero.
fn cumulate(cell_counts: &[usize]) -> Vec<usize> {
    std::iter::once(0)
        .chain(cell_counts.iter().scan(0, |total, count| {
            *total += count;
            Some(*total)
        }))
        .collect()
}
