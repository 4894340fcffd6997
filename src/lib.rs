//! Irregular histograms with data-driven bin boundaries.
//!
//! The sample is normalized to `[0, 1]`, candidate cutpoints are placed on a grid, optionally
//! reduced by a greedy pass, and a dynamic program picks the partition maximizing a penalized
//! likelihood, Bayesian or cross-validation criterion.

mod backtrack;
mod criterion;
mod error;
mod greedy;
mod grid;
mod histogram;
mod penalty;
mod solve;

use std::num::NonZero;

pub use backtrack::{Ancestors, Partition, backtrack};
pub use criterion::{BinScorer, Criterion, IntervalScore};
pub use error::Error;
pub use greedy::{GreedyPruner, PruneTrace};
pub use grid::{Closed, Grid, GridMode, default_cells};
pub use histogram::Histogram;
use ndarray::{ArrayView1, AsArray, Ix1};
pub use penalty::{BinCountPrior, CardinalityPenalty, nml_complexity};
pub use solve::{Algorithm, OptimalPartitioning, SegmentNeighborhood, Solution};

/// Smallest grid automatic pruning reduces to.
const AUTO_PRUNING_FLOOR: usize = 100;

/// Reduction of the candidate grid before the exact optimization.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Pruning {
    /// Optimize over the full grid.
    Disabled,
    /// Keep `max(n / ln n, 100)` cells when the grid is larger than that.
    #[default]
    Auto,
    /// Keep `target` cells.
    Greedy {
        /// Amount of cells kept.
        target: NonZero<usize>,
    },
    /// Keep at most `target` cells, stopping once no split increases the likelihood.
    Strict {
        /// Largest amount of cells kept.
        target: NonZero<usize>,
    },
}

impl Pruning {
    /// Pruner to apply on a grid with `cells` cells, if any.
    #[must_use]
    pub fn pruner(self, sample_size: usize, cells: usize) -> Option<GreedyPruner> {
        match self {
            Self::Disabled => None,
            Self::Auto => {
                let target = default_cells(sample_size).get().max(AUTO_PRUNING_FLOOR);

                NonZero::new(target)
                    .filter(|_| cells > target)
                    .map(GreedyPruner::new)
            }
            Self::Greedy { target } => (cells > target.get()).then(|| GreedyPruner::new(target)),
            Self::Strict { target } => Some(GreedyPruner::new(target).with_strict(true)),
        }
    }
}

/// Irregular histogram estimator.
///
/// # Defaults
///
/// - `criterion`: [`Criterion::PenaltyB`]
/// - `grid_mode`: [`GridMode::Data`]
/// - `cells`: `None`, `floor(n / ln n)` for regular and quantile grids
/// - `closed`: [`Closed::Right`]
/// - `pruning`: [`Pruning::Auto`]
/// - `algorithm`: [`Algorithm::Auto`]
/// - `prior`: [`BinCountPrior::Uniform`]
/// - `support`: `None`, the range of the sample
/// - `maximum_bins`: `None`, unbounded
/// - `memory_budget`: `None`, unbounded
#[derive(Debug, Clone, Copy)]
pub struct IrregularHistogram {
    /// Criterion maximized by the partition.
    criterion: Criterion,
    /// Placement of candidate cutpoints.
    grid_mode: GridMode,
    /// Amount of cells of regular and quantile grids.
    cells: Option<NonZero<usize>>,
    /// Side of the bins containing the boundary.
    closed: Closed,
    /// Candidate grid reduction.
    pruning: Pruning,
    /// Dynamic programming variant.
    algorithm: Algorithm,
    /// Log prior on the amount of bins.
    prior: BinCountPrior,
    /// Domain of the histogram in data units.
    support: Option<(f64, f64)>,
    /// Largest amount of bins.
    maximum_bins: Option<NonZero<usize>>,
    /// Bytes the segment neighborhood tables may occupy.
    memory_budget: Option<usize>,
}

impl IrregularHistogram {
    /// Construct a new estimator with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            criterion: Criterion::PenaltyB,
            grid_mode: GridMode::Data,
            cells: None,
            closed: Closed::Right,
            pruning: Pruning::Auto,
            algorithm: Algorithm::Auto,
            prior: BinCountPrior::Uniform,
            support: None,
            maximum_bins: None,
            memory_budget: None,
        }
    }

    /// Set the criterion maximized by the partition.
    #[must_use]
    pub const fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;

        self
    }

    /// Set how candidate cutpoints are placed.
    #[must_use]
    pub const fn with_grid_mode(mut self, grid_mode: GridMode) -> Self {
        self.grid_mode = grid_mode;

        self
    }

    /// Set the amount of cells of regular and quantile grids.
    #[must_use]
    pub const fn with_cells(mut self, cells: Option<NonZero<usize>>) -> Self {
        self.cells = cells;

        self
    }

    /// Set which side of a bin contains its boundary.
    #[must_use]
    pub const fn with_closed(mut self, closed: Closed) -> Self {
        self.closed = closed;

        self
    }

    /// Set the candidate grid reduction.
    #[must_use]
    pub const fn with_pruning(mut self, pruning: Pruning) -> Self {
        self.pruning = pruning;

        self
    }

    /// Set the dynamic programming variant.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;

        self
    }

    /// Set the log prior on the amount of bins.
    #[must_use]
    pub const fn with_prior(mut self, prior: BinCountPrior) -> Self {
        self.prior = prior;

        self
    }

    /// Set the domain of the histogram, every value must lie within it.
    #[must_use]
    pub const fn with_support(mut self, support: Option<(f64, f64)>) -> Self {
        self.support = support;

        self
    }

    /// Bound the amount of bins.
    ///
    /// Forces segment neighborhood, since optimal partitioning can't limit the amount of bins.
    #[must_use]
    pub const fn with_maximum_bins(mut self, maximum_bins: Option<NonZero<usize>>) -> Self {
        self.maximum_bins = maximum_bins;

        self
    }

    /// Refuse segment neighborhood tables larger than this amount of bytes.
    #[must_use]
    pub const fn with_memory_budget(mut self, bytes: Option<usize>) -> Self {
        self.memory_budget = bytes;

        self
    }

    /// Fit a histogram on a sample.
    ///
    /// # Errors
    ///
    /// - When the sample is empty or contains non-finite values.
    /// - When the support is invalid or doesn't contain the sample.
    /// - When a criterion or prior constant is out of range.
    /// - When optimal partitioning is requested for a criterion with a bin count penalty.
    /// - When the criterion has no feasible partition.
    /// - When the segment neighborhood tables exceed the memory budget.
    pub fn fit<'a>(&self, sample: impl AsArray<'a, f64, Ix1>) -> Result<Histogram, Error> {
        let sample_view = sample.into();

        self.fit_impl(sample_view)
    }

    /// [`Self::fit`] implementation outside of generic to avoid code duplication.
    fn fit_impl(&self, sample: ArrayView1<f64>) -> Result<Histogram, Error> {
        if sample.is_empty() {
            return Err(Error::EmptySample);
        }
        if sample.iter().any(|value| !value.is_finite()) {
            return Err(Error::NonFiniteSample);
        }
        self.criterion.validate()?;
        self.prior.validate()?;

        let (lower, upper) = self.support(sample)?;
        let scale = upper - lower;
        let normalized = sample
            .iter()
            .map(|value| ((value - lower) / scale).clamp(0.0, 1.0))
            .collect::<Vec<_>>();
        let sample_size = normalized.len();

        let cells = self.cells.unwrap_or_else(|| default_cells(sample_size));
        let grid = Grid::build(&normalized, self.grid_mode, cells, self.closed);
        let candidate_cells = grid.cells();
        log::debug!("built {:?} grid with {candidate_cells} cells", self.grid_mode);

        let grid = match self.pruning.pruner(sample_size, candidate_cells) {
            Some(pruner) => pruner.prune(&grid),
            None => grid,
        };

        // The penalty counts partitions of the grid before pruning
        let penalty =
            CardinalityPenalty::new(self.criterion, self.prior, candidate_cells, sample_size);
        let scorer = self.criterion.bind(&grid);
        let solution = self.solve(&scorer, &penalty)?;

        log::debug!("fitted {} bins with score {}", solution.bins(), solution.score());

        Ok(Histogram::from_partition(
            &grid,
            solution.partition(),
            (lower, upper),
            self.criterion.concentration(),
            solution.score(),
        ))
    }

    /// Domain of the histogram, validated against the sample.
    fn support(&self, sample: ArrayView1<f64>) -> Result<(f64, f64), Error> {
        let minimum = sample.iter().copied().fold(f64::INFINITY, f64::min);
        let maximum = sample.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        match self.support {
            Some((lower, upper)) => {
                if !(lower.is_finite() && upper.is_finite() && lower < upper)
                    || !(upper - lower).is_finite()
                {
                    return Err(Error::InvalidSupport);
                }
                if minimum < lower || maximum > upper {
                    return Err(Error::SampleOutsideSupport);
                }

                Ok((lower, upper))
            }
            None => {
                if minimum >= maximum {
                    return Err(Error::DegenerateSample);
                }
                if !(maximum - minimum).is_finite() {
                    return Err(Error::InvalidSupport);
                }

                Ok((minimum, maximum))
            }
        }
    }

    /// Run the dynamic programming variant matching the configuration.
    fn solve(
        &self,
        scorer: &BinScorer<'_>,
        penalty: &CardinalityPenalty,
    ) -> Result<Solution, Error> {
        let (use_table, predecessor_limit) = match self.algorithm {
            Algorithm::OptimalPartitioning => {
                if !penalty.is_zero() {
                    return Err(Error::IncompatibleAlgorithm);
                }

                (false, None)
            }
            Algorithm::SegmentNeighborhood => (true, None),
            Algorithm::Auto => (self.needs_table(penalty), None),
            Algorithm::Bounded { predecessors } => (self.needs_table(penalty), Some(predecessors)),
        };

        if use_table {
            log::debug!("solving with segment neighborhood");

            SegmentNeighborhood::new()
                .with_maximum_bins(self.maximum_bins)
                .with_predecessor_limit(predecessor_limit)
                .with_memory_budget(self.memory_budget)
                .solve(scorer, |bins| penalty.evaluate(bins))
        } else {
            log::debug!("solving with optimal partitioning");

            OptimalPartitioning::new()
                .with_predecessor_limit(predecessor_limit)
                .solve(scorer)
        }
    }

    /// Whether the amount of bins must be selected from a full table.
    const fn needs_table(&self, penalty: &CardinalityPenalty) -> bool {
        !penalty.is_zero() || self.maximum_bins.is_some()
    }
}

impl Default for IrregularHistogram {
    fn default() -> Self {
        Self::new()
    }
}
