//! Partition reconstruction from dynamic programming ancestors.

use ndarray::Array2;
use smallvec::SmallVec;

/// Predecessor pointers left behind by a dynamic programming sweep.
pub trait Ancestors {
    /// Grid index preceding `index` in the best partition ending there with `bins` bins.
    fn predecessor(&self, bins: usize, index: usize) -> usize;
}

/// Optimal partitioning keeps one predecessor per endpoint, whatever the amount of bins.
impl Ancestors for [usize] {
    #[inline]
    fn predecessor(&self, _bins: usize, index: usize) -> usize {
        self[index]
    }
}

/// Segment neighborhood keeps one predecessor per amount of bins and endpoint.
impl Ancestors for Array2<usize> {
    #[inline]
    fn predecessor(&self, bins: usize, index: usize) -> usize {
        self[[bins, index]]
    }
}

/// Grid indices of the bin edges, strictly increasing from `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Edge indices.
    indices: SmallVec<usize, 16>,
}

impl Partition {
    /// Construct from edge indices.
    ///
    /// Returns `None` when the indices don't start at zero or are not strictly increasing.
    #[must_use]
    pub fn new(indices: &[usize]) -> Option<Self> {
        (indices.len() >= 2
            && indices.first() == Some(&0)
            && indices.windows(2).all(|pair| pair[0] < pair[1]))
        .then(|| Self {
            indices: indices.iter().copied().collect(),
        })
    }

    /// Edge indices.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Amount of bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.indices.len() - 1
    }

    /// Last edge index.
    #[must_use]
    pub fn terminal(&self) -> usize {
        self.indices[self.indices.len() - 1]
    }
}

/// Walk the predecessors from `terminal` back to zero.
///
/// With a known amount of `bins` exactly that many steps are taken, otherwise the walk stops at
/// index zero.
#[must_use]
pub fn backtrack<A>(ancestors: &A, terminal: usize, bins: Option<usize>) -> Partition
where
    A: Ancestors + ?Sized,
{
    let mut indices = SmallVec::<usize, 16>::new();
    indices.push(terminal);

    let mut index = terminal;
    match bins {
        Some(bins) => {
            for remaining in (1..=bins).rev() {
                index = ancestors.predecessor(remaining, index);
                indices.push(index);
            }
        }
        None => {
            while index > 0 {
                index = ancestors.predecessor(0, index);
                indices.push(index);
            }
        }
    }

    indices.reverse();

    debug_assert!(
        indices.first() == Some(&0),
        "backtracking must end at the first grid index"
    );
    debug_assert!(
        indices.windows(2).all(|pair| pair[0] < pair[1]),
        "backtracked indices must be strictly increasing"
    );

    Partition { indices }
}
