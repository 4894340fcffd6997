//! Criteria scoring a single bin.

use accurate::{sum::Kahan, traits::SumAccumulator as _};
use statrs::function::gamma::ln_gamma;

use crate::{Error, Grid};

/// Weight of the small-sample correction of [`Criterion::PenaltyR`].
const CORRECTION_WEIGHT: f64 = 0.5;

/// Statistical criterion maximized by the partition.
///
/// Each criterion is a pair of a per-bin contribution and an optional term depending only on the
/// amount of bins. Criteria without the latter can be solved by optimal partitioning.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Unpenalized maximum likelihood.
    Likelihood,
    /// Likelihood penalized by the log amount of partitions, a linear term and a square-root
    /// correction.
    PenaltyA,
    /// Likelihood penalized by the log amount of partitions and a linear term.
    #[default]
    PenaltyB,
    /// Likelihood with a small-sample correction per bin, penalized by the log amount of
    /// partitions.
    PenaltyR,
    /// Akaike information criterion.
    Aic,
    /// Bayesian information criterion.
    Bic,
    /// Normalized maximum likelihood, using an asymptotic expansion of the parametric complexity.
    Nml,
    /// Marginal likelihood under a Dirichlet prior proportional to the bin lengths.
    Bayes {
        /// Total prior mass, must be positive.
        concentration: f64,
    },
    /// Leave-one-out Kullback-Leibler cross-validation.
    KullbackLeiblerCv {
        /// Shortest normalized bin length allowed.
        minimum_length: f64,
    },
    /// Leave-one-out L2 cross-validation.
    L2Cv {
        /// Shortest normalized bin length allowed.
        minimum_length: f64,
    },
}

/// Contribution of a single bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinRule {
    /// `N ln(N / len)`.
    Likelihood,
    /// Likelihood minus `N / (2 n len)`.
    CorrectedLikelihood,
    /// Dirichlet-multinomial marginal likelihood relative to the uniform density.
    Dirichlet {
        /// Total prior mass.
        concentration: f64,
    },
    /// `N ln((N - 1) / len)`.
    KullbackLeibler {
        /// Shortest bin allowed.
        minimum_length: f64,
    },
    /// `((n + 1) / n N^2 - 2 N) / len`.
    SquaredError {
        /// Shortest bin allowed.
        minimum_length: f64,
    },
}

/// Term depending only on the amount of bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CountRule {
    /// Nothing is added.
    Zero,
    /// See [`Criterion::PenaltyA`].
    PenaltyA,
    /// See [`Criterion::PenaltyB`].
    PenaltyB,
    /// See [`Criterion::PenaltyR`].
    PenaltyR,
    /// See [`Criterion::Aic`].
    Aic,
    /// See [`Criterion::Bic`].
    Bic,
    /// See [`Criterion::Nml`].
    Nml,
    /// Normalizing constants of the Dirichlet marginal likelihood.
    Dirichlet {
        /// Total prior mass.
        concentration: f64,
    },
}

impl Criterion {
    /// Per-bin and per-count rules of the criterion.
    #[must_use]
    pub(crate) const fn rules(self) -> (BinRule, CountRule) {
        match self {
            Self::Likelihood => (BinRule::Likelihood, CountRule::Zero),
            Self::PenaltyA => (BinRule::Likelihood, CountRule::PenaltyA),
            Self::PenaltyB => (BinRule::Likelihood, CountRule::PenaltyB),
            Self::PenaltyR => (BinRule::CorrectedLikelihood, CountRule::PenaltyR),
            Self::Aic => (BinRule::Likelihood, CountRule::Aic),
            Self::Bic => (BinRule::Likelihood, CountRule::Bic),
            Self::Nml => (BinRule::Likelihood, CountRule::Nml),
            Self::Bayes { concentration } => (
                BinRule::Dirichlet { concentration },
                CountRule::Dirichlet { concentration },
            ),
            Self::KullbackLeiblerCv { minimum_length } => {
                (BinRule::KullbackLeibler { minimum_length }, CountRule::Zero)
            }
            Self::L2Cv { minimum_length } => {
                (BinRule::SquaredError { minimum_length }, CountRule::Zero)
            }
        }
    }

    /// Whether the criterion adds a term depending on the amount of bins.
    #[must_use]
    pub const fn has_cardinality_penalty(self) -> bool {
        !matches!(self.rules().1, CountRule::Zero)
    }

    /// Dirichlet concentration, if the criterion has one.
    #[must_use]
    pub const fn concentration(self) -> Option<f64> {
        match self {
            Self::Bayes { concentration } => Some(concentration),
            _ => None,
        }
    }

    /// Check the constants of the criterion.
    ///
    /// # Errors
    ///
    /// - When the concentration is not a positive finite number.
    /// - When the minimum length is outside of `[0, 1]`.
    pub fn validate(self) -> Result<(), Error> {
        match self {
            Self::Bayes { concentration }
                if !(concentration.is_finite() && concentration > 0.0) =>
            {
                Err(Error::InvalidParameter("concentration must be positive and finite"))
            }
            Self::KullbackLeiblerCv { minimum_length } | Self::L2Cv { minimum_length }
                if !(0.0..=1.0).contains(&minimum_length) =>
            {
                Err(Error::InvalidParameter("minimum bin length must be within [0, 1]"))
            }
            _ => Ok(()),
        }
    }

    /// Bind the per-bin contribution to a grid.
    #[must_use]
    pub fn bind(self, grid: &Grid) -> BinScorer<'_> {
        BinScorer {
            grid,
            rule: self.rules().0,
            sample_size: grid.sample_size() as f64,
        }
    }
}

/// Additive score of a bin between two grid indices.
pub trait IntervalScore: Sync {
    /// Amount of cells of the underlying grid, the largest valid index.
    fn cells(&self) -> usize;

    /// Score of the bin from grid index `left` to `right`.
    ///
    /// Negative infinity marks a bin that can't be part of any partition.
    fn score(&self, left: usize, right: usize) -> f64;

    /// Whether evaluating this amount of candidates is worth spreading across threads.
    #[inline]
    fn should_use_threading(&self, candidates: usize) -> bool {
        candidates >= 2048
    }

    /// Total score of a partition given as strictly increasing grid indices.
    fn partition_score(&self, indices: &[usize]) -> f64 {
        let mut total = Kahan::zero();

        for pair in indices.windows(2) {
            let score = self.score(pair[0], pair[1]);
            if branches::unlikely(score == f64::NEG_INFINITY) {
                return f64::NEG_INFINITY;
            }

            total += score;
        }

        total.sum()
    }
}

/// Per-bin contribution of a criterion bound to a grid.
#[derive(Debug, Clone, Copy)]
pub struct BinScorer<'a> {
    /// Grid supplying counts and lengths.
    grid: &'a Grid,
    /// Contribution rule.
    rule: BinRule,
    /// Sample size as float.
    sample_size: f64,
}

impl BinScorer<'_> {
    /// Grid the scorer is bound to.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        self.grid
    }
}

impl IntervalScore for BinScorer<'_> {
    #[inline]
    fn cells(&self) -> usize {
        self.grid.cells()
    }

    #[inline]
    fn score(&self, left: usize, right: usize) -> f64 {
        let count = self.grid.count(left, right) as f64;
        let length = self.grid.length(left, right);

        match self.rule {
            BinRule::Likelihood => log_likelihood(count, length),
            BinRule::CorrectedLikelihood => {
                log_likelihood(count, length) - CORRECTION_WEIGHT * count / (self.sample_size * length)
            }
            BinRule::Dirichlet { concentration } => {
                let prior = concentration * length;

                count.mul_add(-length.ln(), ln_gamma(prior + count) - ln_gamma(prior))
            }
            BinRule::KullbackLeibler { minimum_length } => {
                if count >= 2.0 && length >= minimum_length {
                    count * ((count - 1.0) / length).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            BinRule::SquaredError { minimum_length } => {
                if length >= minimum_length {
                    let inflation = (self.sample_size + 1.0) / self.sample_size;

                    inflation.mul_add(count * count, -2.0 * count) / length
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    #[inline]
    fn should_use_threading(&self, candidates: usize) -> bool {
        match self.rule {
            // Log-gamma dominates, threads pay off much sooner
            BinRule::Dirichlet { .. } => candidates >= 256,
            _ => candidates >= 2048,
        }
    }
}

/// Log-likelihood of a bin up to constants, empty bins contribute nothing.
#[inline]
fn log_likelihood(count: f64, length: f64) -> f64 {
    if count > 0.0 {
        count * (count / length).ln()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::Closed;

    /// Grid with three cells holding 0, 3 and 1 values.
    fn grid() -> Grid {
        Grid::from_parts(vec![0.0, 0.25, 0.75, 1.0], vec![0, 0, 3, 4], Closed::Right)
            .expect("Invalid grid")
    }

    /// Empty bins are neutral for the likelihood.
    #[test]
    fn likelihood() {
        let grid = grid();
        let scorer = Criterion::Likelihood.bind(&grid);

        assert_eq!(scorer.score(0, 1), 0.0);
        assert_relative_eq!(scorer.score(1, 2), 3.0 * 6.0_f64.ln());
        assert_relative_eq!(scorer.score(0, 3), 4.0 * 4.0_f64.ln());
    }

    /// The correction lowers the likelihood of dense bins.
    #[test]
    fn corrected_likelihood() {
        let grid = grid();
        let scorer = Criterion::PenaltyR.bind(&grid);

        assert_relative_eq!(scorer.score(1, 2), 3.0 * 6.0_f64.ln() - 0.5 * 3.0 / (4.0 * 0.5));
    }

    /// Dirichlet marginal likelihood against a hand computed value.
    #[test]
    fn dirichlet() {
        let grid = grid();
        let scorer = Criterion::Bayes { concentration: 2.0 }.bind(&grid);

        // ln Γ(4) - ln Γ(1) - 3 ln 0.5 = ln 48
        assert_relative_eq!(scorer.score(1, 2), 48.0_f64.ln(), epsilon = 1e-10);
        assert_relative_eq!(scorer.score(0, 1), 0.0, epsilon = 1e-12);
    }

    /// Bins with fewer than two values are infeasible for Kullback-Leibler cross-validation.
    #[test]
    fn kullback_leibler() {
        let grid = grid();
        let scorer = Criterion::KullbackLeiblerCv { minimum_length: 0.3 }.bind(&grid);

        assert_eq!(scorer.score(0, 1), f64::NEG_INFINITY);
        assert_eq!(scorer.score(2, 3), f64::NEG_INFINITY);
        assert_relative_eq!(scorer.score(1, 2), 3.0 * 4.0_f64.ln());
        assert_relative_eq!(scorer.score(0, 2), 3.0 * (2.0 / 0.75_f64).ln());
    }

    /// Short bins are infeasible for L2 cross-validation.
    #[test]
    fn squared_error() {
        let grid = grid();
        let scorer = Criterion::L2Cv { minimum_length: 0.3 }.bind(&grid);

        assert_eq!(scorer.score(0, 1), f64::NEG_INFINITY);
        assert_relative_eq!(scorer.score(1, 2), (1.25 * 9.0 - 6.0) / 0.5);
        assert_relative_eq!(scorer.score(0, 2), (1.25 * 9.0 - 6.0) / 0.75);
    }

    /// Partition scores add up bins and propagate infeasibility.
    #[test]
    fn partition_score() {
        let grid = grid();

        let likelihood = Criterion::Likelihood.bind(&grid);
        assert_relative_eq!(
            likelihood.partition_score(&[0, 1, 2, 3]),
            3.0 * 6.0_f64.ln() + 4.0_f64.ln(),
            epsilon = 1e-12
        );

        let cross_validation = Criterion::KullbackLeiblerCv { minimum_length: 0.0 }.bind(&grid);
        assert_eq!(cross_validation.partition_score(&[0, 2, 3]), f64::NEG_INFINITY);
    }

    /// Only the cross-validation criteria and the plain likelihood lack a bin count term.
    #[test]
    fn cardinality_penalty() {
        assert!(!Criterion::Likelihood.has_cardinality_penalty());
        assert!(!Criterion::L2Cv { minimum_length: 0.0 }.has_cardinality_penalty());
        assert!(Criterion::PenaltyB.has_cardinality_penalty());
        assert!(Criterion::Bayes { concentration: 1.0 }.has_cardinality_penalty());
    }

    /// Invalid constants are rejected.
    #[test]
    fn validate() {
        assert!(Criterion::Bayes { concentration: 0.0 }.validate().is_err());
        assert!(Criterion::Bayes { concentration: f64::NAN }.validate().is_err());
        assert!(Criterion::L2Cv { minimum_length: 1.5 }.validate().is_err());
        assert!(Criterion::KullbackLeiblerCv { minimum_length: 0.1 }.validate().is_ok());
    }
}
