//! Dynamic programming over candidate cutpoints.

use std::num::NonZero;

use ndarray::{Array2, ArrayView1};

use crate::{Error, IntervalScore, Partition, backtrack::backtrack};

/// Margin a later candidate needs to replace the incumbent, relative to the single bin score.
///
/// Partitions with mathematically equal scores differ by rounding only, this keeps the earliest.
const TIE_TOLERANCE: f64 = 1e-10;

/// Algorithm used to find the partition.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Optimal partitioning without a bin count penalty, segment neighborhood with one.
    #[default]
    Auto,
    /// Quadratic single sweep, only valid without a bin count penalty.
    OptimalPartitioning,
    /// Cubic table over every amount of bins.
    SegmentNeighborhood,
    /// Like [`Self::Auto`], but every step only considers the most promising predecessors.
    ///
    /// Always returns a valid partition, optimality is not guaranteed.
    Bounded {
        /// Amount of predecessors retained.
        predecessors: NonZero<usize>,
    },
}

/// Best partition found by a solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Edge indices on the grid.
    partition: Partition,
    /// Score including the bin count penalty.
    score: f64,
    /// Best score without penalty for `1..` bins, only filled by segment neighborhood.
    objective_by_bins: Vec<f64>,
}

impl Solution {
    /// Edge indices on the grid.
    #[must_use]
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Achieved score, including the bin count penalty.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Amount of bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.partition.bins()
    }

    /// Best unpenalized score per amount of bins, the first element is for a single bin.
    ///
    /// Empty for optimal partitioning.
    #[must_use]
    pub fn objective_by_bins(&self) -> &[f64] {
        &self.objective_by_bins
    }
}

/// Quadratic dynamic programming over endpoints.
///
/// Jointly optimizes the amount of bins, so the criterion must not penalize it.
///
/// # Defaults
///
/// - `predecessor_limit`: `None`, every predecessor is considered
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptimalPartitioning {
    /// Retain only this many predecessors per step.
    predecessor_limit: Option<NonZero<usize>>,
}

impl OptimalPartitioning {
    /// Construct an exact solver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predecessor_limit: None,
        }
    }

    /// Only consider the predecessors with the best partial scores.
    #[must_use]
    pub const fn with_predecessor_limit(mut self, limit: Option<NonZero<usize>>) -> Self {
        self.predecessor_limit = limit;

        self
    }

    /// Find the partition maximizing the sum of bin scores.
    ///
    /// # Errors
    ///
    /// - When every partition contains an infeasible bin.
    pub fn solve<S>(&self, scorer: &S) -> Result<Solution, Error>
    where
        S: IntervalScore + ?Sized,
    {
        let cells = scorer.cells();
        log::debug!("optimal partitioning over {cells} cells");

        let margin = tie_margin(scorer);
        let mut prefixes = Prefixes::new(cells);

        match self.predecessor_limit {
            None => sweep(scorer, margin, &mut prefixes),
            Some(limit) => bounded_sweep(scorer, limit, margin, &mut prefixes),
        }

        let score = prefixes.best[cells];
        if score == f64::NEG_INFINITY {
            return Err(Error::NoFeasiblePartition);
        }

        Ok(Solution {
            partition: backtrack(prefixes.ancestors.as_slice(), cells, None),
            score,
            objective_by_bins: Vec::new(),
        })
    }
}

/// Cubic dynamic programming over amounts of bins and endpoints.
///
/// # Defaults
///
/// - `maximum_bins`: `None`, up to one bin per grid cell
/// - `predecessor_limit`: `None`, every predecessor is considered
/// - `memory_budget`: `None`, only limited by the address space
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentNeighborhood {
    /// Largest amount of bins tried.
    maximum_bins: Option<NonZero<usize>>,
    /// Retain only this many predecessors per step.
    predecessor_limit: Option<NonZero<usize>>,
    /// Bytes the tables may occupy.
    memory_budget: Option<usize>,
}

impl SegmentNeighborhood {
    /// Construct an exact solver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            maximum_bins: None,
            predecessor_limit: None,
            memory_budget: None,
        }
    }

    /// Bound the amount of bins, and with it the table size.
    #[must_use]
    pub const fn with_maximum_bins(mut self, maximum_bins: Option<NonZero<usize>>) -> Self {
        self.maximum_bins = maximum_bins;

        self
    }

    /// Only consider the predecessors with the best partial scores.
    #[must_use]
    pub const fn with_predecessor_limit(mut self, limit: Option<NonZero<usize>>) -> Self {
        self.predecessor_limit = limit;

        self
    }

    /// Fail instead of allocating tables larger than this amount of bytes.
    #[must_use]
    pub const fn with_memory_budget(mut self, bytes: Option<usize>) -> Self {
        self.memory_budget = bytes;

        self
    }

    /// Find the best partition for every amount of bins and select the one maximizing the
    /// score plus `penalty(bins)`.
    ///
    /// # Errors
    ///
    /// - When the tables exceed the memory budget.
    /// - When every partition contains an infeasible bin.
    pub fn solve<S, P>(&self, scorer: &S, penalty: P) -> Result<Solution, Error>
    where
        S: IntervalScore + ?Sized,
        P: Fn(usize) -> f64,
    {
        let cells = scorer.cells();
        let maximum_bins = self
            .maximum_bins
            .map_or(cells, |maximum_bins| maximum_bins.get().min(cells));
        self.check_memory(cells, maximum_bins)?;

        log::debug!("segment neighborhood over {cells} cells up to {maximum_bins} bins");

        let margin = tie_margin(scorer);

        // `table[[k, t]]` is the best score of `k` bins covering the grid up to index `t`
        let mut table = Array2::from_elem((maximum_bins + 1, cells + 1), f64::NEG_INFINITY);
        let mut ancestors = Array2::<usize>::zeros((maximum_bins + 1, cells + 1));

        for endpoint in 1..=cells {
            table[[1, endpoint]] = scorer.score(0, endpoint);
        }

        for bins in 2..=maximum_bins {
            let row = match self.predecessor_limit {
                None => fill_row(scorer, margin, table.row(bins - 1), bins),
                Some(limit) => {
                    bounded_fill_row(scorer, limit, margin, table.row(bins - 1), bins)
                }
            };

            for (endpoint, choice) in (bins..=cells).zip(row) {
                if let Some((start, value)) = choice {
                    table[[bins, endpoint]] = value;
                    ancestors[[bins, endpoint]] = start;
                }
            }

            log::trace!("filled row for {bins} bins");
        }

        let objective_by_bins = (1..=maximum_bins)
            .map(|bins| table[[bins, cells]])
            .collect::<Vec<_>>();

        // Smallest amount of bins wins ties
        let (bins, score) = argmax(
            objective_by_bins
                .iter()
                .zip(1..)
                .map(|(objective, bins)| (bins, objective + penalty(bins))),
            margin,
        )
        .ok_or(Error::NoFeasiblePartition)?;

        log::debug!("selected {bins} bins with score {score}");

        Ok(Solution {
            partition: backtrack(&ancestors, cells, Some(bins)),
            score,
            objective_by_bins,
        })
    }

    /// Ensure both tables fit in the memory budget.
    fn check_memory(&self, cells: usize, maximum_bins: usize) -> Result<(), Error> {
        let limit = self.memory_budget.unwrap_or(isize::MAX.unsigned_abs());
        let required = (maximum_bins + 1)
            .checked_mul(cells + 1)
            .and_then(|entries| entries.checked_mul(size_of::<f64>() + size_of::<usize>()))
            .unwrap_or(usize::MAX);

        if required > limit {
            return Err(Error::TableTooLarge { required, limit });
        }

        Ok(())
    }
}

/// Best partition of every grid prefix, as found by optimal partitioning.
struct Prefixes {
    /// `best[t]` is the best score of partitioning the grid up to index `t`.
    best: Vec<f64>,
    /// Start of the last bin of the best partition up to each index.
    ancestors: Vec<usize>,
    /// Amount of bins of the best partition up to each index.
    bins: Vec<usize>,
}

impl Prefixes {
    /// Only the empty prefix is feasible.
    fn new(cells: usize) -> Self {
        let mut best = vec![f64::NEG_INFINITY; cells + 1];
        best[0] = 0.0;

        Self {
            best,
            ancestors: vec![0; cells + 1],
            bins: vec![0; cells + 1],
        }
    }

    /// Candidate ending the last bin at `endpoint` after the best partition up to `start`.
    #[inline]
    fn candidate<S>(&self, scorer: &S, start: usize, endpoint: usize) -> (usize, f64, usize)
    where
        S: IntervalScore + ?Sized,
    {
        (
            start,
            extend(scorer, self.best[start], start, endpoint),
            self.bins[start] + 1,
        )
    }

    /// Store the best partition up to `endpoint`.
    fn record(&mut self, endpoint: usize, (start, score, bins): (usize, f64, usize)) {
        self.best[endpoint] = score;
        self.ancestors[endpoint] = start;
        self.bins[endpoint] = bins;
    }
}

/// Absolute margin used for every comparison of a solve.
///
/// Partial scores of all endpoints share one margin, so a difference between two prefixes is
/// judged the same wherever it propagates.
fn tie_margin<S>(scorer: &S) -> f64
where
    S: IntervalScore + ?Sized,
{
    let scale = scorer.score(0, scorer.cells()).abs();
    let scale = if scale.is_finite() { scale } else { 0.0 };

    TIE_TOLERANCE.mul_add(scale, TIE_TOLERANCE)
}

/// Whether `candidate` beats `incumbent` by more than rounding noise.
#[inline]
fn improves(candidate: f64, incumbent: f64, margin: f64) -> bool {
    if incumbent == f64::NEG_INFINITY {
        return candidate > incumbent;
    }

    candidate > incumbent + margin
}

/// First candidate with the highest value, `None` when all are negative infinity.
#[inline]
fn argmax(candidates: impl Iterator<Item = (usize, f64)>, margin: f64) -> Option<(usize, f64)> {
    let mut best = None;
    let mut best_value = f64::NEG_INFINITY;

    for (index, value) in candidates {
        if improves(value, best_value, margin) {
            best = Some((index, value));
            best_value = value;
        }
    }

    best
}

/// Like [`argmax`] over `(start, value, bins)`, but ties go to the fewest bins.
///
/// Segment neighborhood selects the smallest amount of bins among tied totals, this makes
/// optimal partitioning backtrack the same partition.
#[inline]
fn argmax_fewest_bins(
    candidates: impl Iterator<Item = (usize, f64, usize)>,
    margin: f64,
) -> Option<(usize, f64, usize)> {
    let mut best: Option<(usize, f64, usize)> = None;

    for candidate @ (_, value, bins) in candidates {
        let replace = match best {
            None => value > f64::NEG_INFINITY,
            Some((_, best_value, best_bins)) => {
                improves(value, best_value, margin)
                    || (bins < best_bins && !improves(best_value, value, margin))
            }
        };

        if replace {
            best = Some(candidate);
        }
    }

    best
}

/// Score of extending the best partition up to `start` with a bin up to `endpoint`.
#[inline]
fn extend<S>(scorer: &S, prefix: f64, start: usize, endpoint: usize) -> f64
where
    S: IntervalScore + ?Sized,
{
    if branches::unlikely(prefix == f64::NEG_INFINITY) {
        return f64::NEG_INFINITY;
    }

    prefix + scorer.score(start, endpoint)
}

/// Exact optimal partitioning sweep.
fn sweep<S>(scorer: &S, margin: f64, prefixes: &mut Prefixes)
where
    S: IntervalScore + ?Sized,
{
    // Pre-allocate it outside of the loop
    let mut values = Vec::with_capacity(prefixes.best.len());

    for endpoint in 1..prefixes.best.len() {
        let done = &*prefixes;
        let value = |start: usize| done.candidate(scorer, start, endpoint);

        // Split the candidates across threads based on a heuristic
        #[cfg(feature = "rayon")]
        if scorer.should_use_threading(endpoint) {
            use rayon::iter::{
                IndexedParallelIterator as _, IntoParallelIterator as _, ParallelIterator as _,
            };

            (0..endpoint)
                .into_par_iter()
                .map(value)
                .collect_into_vec(&mut values);
        } else {
            values.clear();
            values.extend((0..endpoint).map(value));
        }

        #[cfg(not(feature = "rayon"))]
        {
            values.clear();
            values.extend((0..endpoint).map(value));
        }

        // Reduce in order so the outcome doesn't depend on the thread count
        if let Some(choice) = argmax_fewest_bins(values.iter().copied(), margin) {
            prefixes.record(endpoint, choice);
        }
    }
}

/// Optimal partitioning sweep retaining a bounded pool of predecessors.
fn bounded_sweep<S>(scorer: &S, limit: NonZero<usize>, margin: f64, prefixes: &mut Prefixes)
where
    S: IntervalScore + ?Sized,
{
    let mut pool = Vec::with_capacity(limit.get() + 1);
    pool.push(0);

    for endpoint in 1..prefixes.best.len() {
        let done = &*prefixes;
        let value = |start: usize| done.candidate(scorer, start, endpoint);

        let retained = pool.iter().map(|start| value(*start));
        let every = (0..endpoint).map(value);

        // Every feasible endpoint stays feasible, even when no retained predecessor reaches it
        let choice = argmax_fewest_bins(retained, margin)
            .or_else(|| argmax_fewest_bins(every, margin));

        if let Some(choice) = choice {
            prefixes.record(endpoint, choice);

            admit(&mut pool, limit, endpoint, |index| prefixes.best[index]);
        }
    }
}

/// Add a predecessor to the pool, evicting the weakest one when it overflows.
///
/// The strongest predecessor is never evicted.
fn admit<F>(pool: &mut Vec<usize>, limit: NonZero<usize>, index: usize, partial_score: F)
where
    F: Fn(usize) -> f64,
{
    pool.push(index);
    if pool.len() <= limit.get() {
        return;
    }

    let mut weakest = 0;
    for (position, candidate) in pool.iter().enumerate().skip(1) {
        if partial_score(*candidate) < partial_score(pool[weakest]) {
            weakest = position;
        }
    }

    // Keeps the pool sorted by index
    pool.remove(weakest);
}

/// Best predecessor of every endpoint of an exact segment neighborhood row.
fn fill_row<S>(
    scorer: &S,
    margin: f64,
    previous: ArrayView1<f64>,
    bins: usize,
) -> Vec<Option<(usize, f64)>>
where
    S: IntervalScore + ?Sized,
{
    let cells = previous.len() - 1;
    let choose = |endpoint: usize| {
        argmax(
            (bins - 1..endpoint)
                .map(|start| (start, extend(scorer, previous[start], start, endpoint))),
            margin,
        )
    };

    // Every endpoint only reads the previous row, so they are independent
    #[cfg(feature = "rayon")]
    {
        let width = cells + 1 - bins;
        if scorer.should_use_threading(width * width / 2) {
            use rayon::iter::{IntoParallelIterator as _, ParallelIterator as _};

            return (bins..=cells).into_par_iter().map(choose).collect();
        }
    }

    (bins..=cells).map(choose).collect()
}

/// Best retained predecessor of every endpoint of a segment neighborhood row.
///
/// Falls back to every predecessor when none of the retained ones reaches the endpoint.
fn bounded_fill_row<S>(
    scorer: &S,
    limit: NonZero<usize>,
    margin: f64,
    previous: ArrayView1<f64>,
    bins: usize,
) -> Vec<Option<(usize, f64)>>
where
    S: IntervalScore + ?Sized,
{
    let cells = previous.len() - 1;
    let mut pool = Vec::with_capacity(limit.get() + 1);
    let value =
        |start: usize, endpoint: usize| (start, extend(scorer, previous[start], start, endpoint));

    (bins..=cells)
        .map(|endpoint| {
            // The newest start becomes available
            let start = endpoint - 1;
            if previous[start] > f64::NEG_INFINITY {
                admit(&mut pool, limit, start, |index| previous[index]);
            }

            let retained = pool.iter().map(|start| value(*start, endpoint));
            let every = (bins - 1..endpoint).map(|start| value(start, endpoint));

            argmax(retained, margin).or_else(|| argmax(every, margin))
        })
        .collect()
}
