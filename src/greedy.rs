//! Greedy preselection of candidate cutpoints.

use std::{cmp::Ordering, collections::BinaryHeap, num::NonZero};

use crate::{BinScorer, Criterion, Grid, IntervalScore as _};

/// Reduce a grid by repeatedly keeping the cutpoint with the largest likelihood gain.
///
/// The gain is always the unpenalized likelihood gain, whatever criterion is optimized
/// afterwards.
///
/// # Defaults
///
/// - `strict`: `false`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyPruner {
    /// Amount of cells to keep.
    target: NonZero<usize>,
    /// Stop early once no split increases the likelihood.
    strict: bool,
}

impl GreedyPruner {
    /// Construct a pruner keeping `target` cells.
    #[must_use]
    pub const fn new(target: NonZero<usize>) -> Self {
        Self {
            target,
            strict: false,
        }
    }

    /// Stop as soon as the best remaining split doesn't increase the likelihood.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;

        self
    }

    /// Amount of cells to keep.
    #[must_use]
    pub const fn target(&self) -> NonZero<usize> {
        self.target
    }

    /// Run the greedy selection and record in which order cutpoints were kept.
    #[must_use]
    pub fn run(&self, grid: &Grid) -> PruneTrace {
        let scorer = Criterion::Likelihood.bind(grid);
        let cells = grid.cells();
        let limit = self.target.get().min(cells);

        let mut search = Search {
            scorer,
            intervals: Vec::with_capacity(2 * limit),
            queue: BinaryHeap::with_capacity(limit),
            gains: Vec::with_capacity(cells),
        };
        search.open(0, cells);

        let mut order = Vec::with_capacity(limit.saturating_sub(1));
        while order.len() + 1 < limit {
            let Some(candidate) = search.queue.pop() else {
                break;
            };

            if self.strict && candidate.gain <= 0.0 {
                break;
            }

            let Interval { left, right } = search.intervals[candidate.slot];
            order.push(candidate.split);

            // Only the two new halves need their gains computed
            search.open(left, candidate.split);
            search.open(candidate.split, right);
        }

        log::debug!("greedy pruning kept {} of {cells} cells", order.len() + 1);

        PruneTrace { cells, order }
    }

    /// Run the selection and restrict the grid to the kept cutpoints.
    #[must_use]
    pub fn prune(&self, grid: &Grid) -> Grid {
        let trace = self.run(grid);

        grid.restrict(&trace.kept(trace.order.len() + 1))
    }
}

/// Cutpoints kept by a greedy run, in the order they were selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneTrace {
    /// Cells of the grid the run started from.
    cells: usize,
    /// Interior indices in selection order.
    order: Vec<usize>,
}

impl PruneTrace {
    /// Interior indices in the order they were selected.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Sorted grid indices forming `target_cells` cells, including both endpoints.
    ///
    /// Smaller targets always give a subset of larger ones.
    #[must_use]
    pub fn kept(&self, target_cells: usize) -> Vec<usize> {
        let picks = target_cells.saturating_sub(1).min(self.order.len());

        let mut kept = Vec::with_capacity(picks + 2);
        kept.push(0);
        kept.extend_from_slice(&self.order[..picks]);
        kept.push(self.cells);
        kept.sort_unstable();

        kept
    }
}

/// Grid indices of an interval that can still be split.
#[derive(Debug, Clone, Copy)]
struct Interval {
    /// Left index.
    left: usize,
    /// Right index.
    right: usize,
}

/// Best split of an interval, ordered by gain and then by the lowest index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Likelihood increase of splitting.
    gain: f64,
    /// Grid index to split at.
    split: usize,
    /// Position of the interval in the arena.
    slot: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            // Earlier indices win ties
            .then_with(|| other.split.cmp(&self.split))
    }
}

/// State of a greedy run.
struct Search<'a> {
    /// Likelihood bound to the grid.
    scorer: BinScorer<'a>,
    /// Arena of every interval ever opened.
    intervals: Vec<Interval>,
    /// Best split of every open interval.
    queue: BinaryHeap<Candidate>,
    /// Gains of the interval being opened, reused between intervals.
    gains: Vec<f64>,
}

impl Search<'_> {
    /// Register an interval and queue its best split, if it has any interior point.
    fn open(&mut self, left: usize, right: usize) {
        if right - left < 2 {
            return;
        }

        self.fill_gains(left, right);

        // First maximum wins
        let mut best = 0;
        for (index, gain) in self.gains.iter().enumerate() {
            if *gain > self.gains[best] {
                best = index;
            }
        }

        let slot = self.intervals.len();
        self.intervals.push(Interval { left, right });
        self.queue.push(Candidate {
            gain: self.gains[best],
            split: left + 1 + best,
            slot,
        });
    }

    /// Compute the gain of every interior split of the interval.
    fn fill_gains(&mut self, left: usize, right: usize) {
        let scorer = &self.scorer;
        let whole = scorer.score(left, right);
        let gain = |split: usize| scorer.score(left, split) + scorer.score(split, right) - whole;

        #[cfg(feature = "rayon")]
        if scorer.should_use_threading(right - left - 1) {
            use rayon::iter::{
                IndexedParallelIterator as _, IntoParallelIterator as _, ParallelIterator as _,
            };

            (left + 1..right)
                .into_par_iter()
                .map(gain)
                .collect_into_vec(&mut self.gains);

            return;
        }

        self.gains.clear();
        self.gains.extend((left + 1..right).map(gain));
    }
}
