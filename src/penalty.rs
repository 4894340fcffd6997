//! Terms depending only on the amount of bins.

use std::f64::consts::PI;

use statrs::function::{factorial::ln_binomial, gamma::ln_gamma};

use crate::{Criterion, Error, criterion::CountRule};

/// Exponent of the logarithmic term shared by the penalized likelihood criteria.
const LOG_EXPONENT: f64 = 2.5;

/// Log prior on the amount of bins, added on top of the criterion.
#[derive(Debug, Default, Clone, Copy)]
pub enum BinCountPrior {
    /// Every amount of bins is equally likely.
    #[default]
    Uniform,
    /// Poisson distribution on the amount of cutpoints, `k - 1`.
    Poisson {
        /// Expected amount of cutpoints.
        mean: f64,
    },
    /// Each extra bin multiplies the prior by `ratio`.
    Geometric {
        /// Decay per bin, within `(0, 1]`.
        ratio: f64,
    },
    /// Log prior for `k` bins computed by the caller.
    Custom(fn(usize) -> f64),
}

impl BinCountPrior {
    /// Log prior of `bins` bins, up to a constant.
    #[must_use]
    pub fn log_prior(self, bins: usize) -> f64 {
        let cutpoints = bins.saturating_sub(1) as f64;

        match self {
            Self::Uniform => 0.0,
            Self::Poisson { mean } => cutpoints.mul_add(mean.ln(), -mean) - ln_gamma(cutpoints + 1.0),
            Self::Geometric { ratio } => cutpoints * ratio.ln(),
            Self::Custom(log_prior) => log_prior(bins),
        }
    }

    /// Whether the prior is constant.
    #[must_use]
    pub const fn is_uniform(self) -> bool {
        matches!(self, Self::Uniform)
    }

    /// Check the constants of the prior.
    ///
    /// # Errors
    ///
    /// - When the Poisson mean is not positive and finite.
    /// - When the geometric ratio is outside of `(0, 1]`.
    pub fn validate(self) -> Result<(), Error> {
        match self {
            Self::Poisson { mean } if !(mean.is_finite() && mean > 0.0) => {
                Err(Error::InvalidParameter("Poisson prior mean must be positive and finite"))
            }
            Self::Geometric { ratio } if !(ratio > 0.0 && ratio <= 1.0) => {
                Err(Error::InvalidParameter("geometric prior ratio must be within (0, 1]"))
            }
            _ => Ok(()),
        }
    }
}

/// Correction added once per candidate amount of bins after the partition table is complete.
#[derive(Debug, Clone, Copy)]
pub struct CardinalityPenalty {
    /// Criterion specific term.
    rule: CountRule,
    /// Term supplied by the caller.
    prior: BinCountPrior,
    /// Cells of the finest candidate grid, before any pruning.
    candidate_cells: usize,
    /// Amount of values in the sample.
    sample_size: usize,
}

impl CardinalityPenalty {
    /// Penalty of a criterion.
    ///
    /// `candidate_cells` is the size of the finest grid, pruning must not shrink it.
    #[must_use]
    pub const fn new(
        criterion: Criterion,
        prior: BinCountPrior,
        candidate_cells: usize,
        sample_size: usize,
    ) -> Self {
        Self {
            rule: criterion.rules().1,
            prior,
            candidate_cells,
            sample_size,
        }
    }

    /// Penalty that is always zero.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            rule: CountRule::Zero,
            prior: BinCountPrior::Uniform,
            candidate_cells: 1,
            sample_size: 0,
        }
    }

    /// Whether the penalty is zero for every amount of bins.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        matches!(self.rule, CountRule::Zero) && self.prior.is_uniform()
    }

    /// Value added to the best score with `bins` bins.
    #[must_use]
    pub fn evaluate(&self, bins: usize) -> f64 {
        debug_assert!(bins >= 1, "a partition has at least one bin");

        let criterion = match self.rule {
            CountRule::Zero => 0.0,
            CountRule::PenaltyA => {
                let partitions = self.log_partitions(bins);
                let extra = bins.saturating_sub(1) as f64;
                let log_bins = (bins as f64).ln();

                -(partitions
                    + 0.5 * extra
                    + log_bins.powf(LOG_EXPONENT)
                    + 2.0 * (extra * 2.0_f64.mul_add(log_bins, partitions)).sqrt())
            }
            CountRule::PenaltyB => {
                let extra = bins.saturating_sub(1) as f64;

                -(self.log_partitions(bins) + extra + (bins as f64).ln().powf(LOG_EXPONENT))
            }
            CountRule::PenaltyR => {
                -(self.log_partitions(bins) + (bins as f64).ln().powf(LOG_EXPONENT))
            }
            CountRule::Aic => -(bins.saturating_sub(1) as f64),
            CountRule::Bic => {
                -0.5 * bins.saturating_sub(1) as f64 * (self.sample_size as f64).ln()
            }
            CountRule::Nml => {
                -(self.log_partitions(bins) + nml_complexity(self.sample_size, bins))
            }
            CountRule::Dirichlet { concentration } => {
                ln_gamma(concentration)
                    - ln_gamma(concentration + self.sample_size as f64)
                    - self.log_partitions(bins)
            }
        };

        criterion + self.prior.log_prior(bins)
    }

    /// Log amount of ways to choose `bins - 1` cutpoints out of the interior candidates.
    #[inline]
    fn log_partitions(&self, bins: usize) -> f64 {
        let interior = self.candidate_cells.saturating_sub(1);
        let cutpoints = bins.saturating_sub(1).min(interior);

        ln_binomial(interior as u64, cutpoints as u64)
    }
}

/// Log parametric complexity of a multinomial model with `bins` categories.
///
/// Uses the asymptotic expansion in the sample size, which is accurate to a few thousandths
/// already for small samples.
#[must_use]
pub fn nml_complexity(sample_size: usize, bins: usize) -> f64 {
    if bins <= 1 || sample_size == 0 {
        return 0.0;
    }

    let size = sample_size as f64;
    let categories = bins as f64;

    // Γ(k / 2) / Γ((k - 1) / 2)
    let half = ln_gamma(categories / 2.0);
    let ratio = (half - ln_gamma((categories - 1.0) / 2.0)).exp();

    let leading = (categories - 1.0) / 2.0 * (size / 2.0).ln() + 0.5 * PI.ln() - half;
    let first = 2.0_f64.sqrt() * categories * ratio / (3.0 * size.sqrt());
    let second = ((categories - 2.0).mul_add(categories * 2.0_f64.mul_add(categories, 1.0), 3.0)
        / 36.0
        - ratio * ratio * categories * categories / 9.0)
        / size;

    leading + first + second
}
