//! Fitted histogram in data units.

use std::fmt::{self, Display, Formatter};

use accurate::{sum::Kahan, traits::SumAccumulator as _};

use crate::{Closed, Grid, Partition};

/// Histogram with irregular bins.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Bin edges, one more than the amount of bins.
    breaks: Vec<f64>,
    /// Sample values per bin.
    counts: Vec<usize>,
    /// Density per bin.
    densities: Vec<f64>,
    /// Boundary convention of the bins.
    closed: Closed,
    /// Dirichlet prior mass the densities were shrunk with.
    concentration: Option<f64>,
    /// Optimized criterion value.
    score: f64,
    /// Amount of values in the sample.
    sample_size: usize,
}

impl Histogram {
    /// Map a partition of a normalized grid back to the `(lower, upper)` support.
    ///
    /// With a `concentration` the densities are posterior means under a Dirichlet prior
    /// proportional to the bin lengths.
    #[must_use]
    pub fn from_partition(
        grid: &Grid,
        partition: &Partition,
        (lower, upper): (f64, f64),
        concentration: Option<f64>,
        score: f64,
    ) -> Self {
        let indices = partition.indices();
        let scale = upper - lower;
        let points = grid.points();

        let breaks = indices
            .iter()
            .map(|index| match *index {
                0 => lower,
                index if index == grid.cells() => upper,
                index => points[index].mul_add(scale, lower),
            })
            .collect::<Vec<_>>();

        let counts = indices
            .windows(2)
            .map(|pair| grid.count(pair[0], pair[1]))
            .collect::<Vec<_>>();

        let sample_size = grid.sample_size();
        let densities = indices
            .windows(2)
            .zip(&counts)
            .map(|(pair, count)| {
                let length = grid.length(pair[0], pair[1]);
                let width = length * scale;
                let count = *count as f64;

                match concentration {
                    Some(concentration) => {
                        concentration.mul_add(length, count)
                            / ((sample_size as f64 + concentration) * width)
                    }
                    None => count / (sample_size as f64 * width),
                }
            })
            .collect();

        Self {
            breaks,
            counts,
            densities,
            closed: grid.closed(),
            concentration,
            score,
            sample_size,
        }
    }

    /// Bin edges.
    #[must_use]
    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    /// Sample values per bin.
    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Density per bin.
    #[must_use]
    pub fn densities(&self) -> &[f64] {
        &self.densities
    }

    /// Bin centers.
    #[must_use]
    pub fn mids(&self) -> Vec<f64> {
        self.breaks
            .windows(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .collect()
    }

    /// Bin widths.
    #[must_use]
    pub fn widths(&self) -> Vec<f64> {
        self.breaks.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    /// Amount of bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Boundary convention of the bins.
    #[must_use]
    pub const fn closed(&self) -> Closed {
        self.closed
    }

    /// Dirichlet prior mass, only set for Bayesian fits.
    #[must_use]
    pub const fn concentration(&self) -> Option<f64> {
        self.concentration
    }

    /// Optimized criterion value, including the bin count penalty.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Amount of values the histogram was fitted on.
    #[must_use]
    pub const fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Bin containing `value`, `None` outside of the outer edges.
    #[must_use]
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        let lower = self.breaks.first().copied()?;
        let upper = self.breaks.last().copied()?;
        if !(lower..=upper).contains(&value) {
            return None;
        }

        Some(self.closed.locate(&self.breaks, value))
    }

    /// Density at `value`, zero outside of the outer edges.
    #[must_use]
    pub fn density_at(&self, value: f64) -> f64 {
        self.bin_index(value)
            .map_or(0.0, |index| self.densities[index])
    }

    /// Integral of the density, one up to rounding.
    #[must_use]
    pub fn mass(&self) -> f64 {
        let mut total = Kahan::zero();
        for (pair, density) in self.breaks.windows(2).zip(&self.densities) {
            total += density * (pair[1] - pair[0]);
        }

        total.sum()
    }
}

impl Display for Histogram {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let last = self.bins().saturating_sub(1);

        for (index, ((pair, count), density)) in self
            .breaks
            .windows(2)
            .zip(&self.counts)
            .zip(&self.densities)
            .enumerate()
        {
            // Outer bins also contain their outer edge
            let (open, close) = match self.closed {
                Closed::Right if index == 0 => ('[', ']'),
                Closed::Right => ('(', ']'),
                Closed::Left if index == last => ('[', ']'),
                Closed::Left => ('[', ')'),
            };

            writeln!(
                formatter,
                "{open}{:.6}, {:.6}{close}\t{count}\t{density:.6}",
                pair[0], pair[1]
            )?;
        }

        Ok(())
    }
}
