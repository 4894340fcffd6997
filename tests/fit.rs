//! Fit histograms end to end.

mod common;

use std::num::NonZero;

use approx::assert_relative_eq;
use irrhist::{
    Algorithm, BinCountPrior, Closed, Criterion, Error, GridMode, IrregularHistogram, Pruning,
};

/// Bin edges of the bimodal fixture under penalty B.
const BIMODAL_BREAKS: [f64; 6] = [-2.8399, -1.6127, 1.0327, 3.3928, 4.7449, 5.3388];

/// Bin counts of the bimodal fixture under penalty B.
const BIMODAL_COUNTS: [usize; 5] = [13, 167, 33, 82, 5];

/// Score of the bimodal fixture under penalty B.
const BIMODAL_SCORE: f64 = 1_760.825_025_665_763_2;

/// Compare breaks up to rounding of the normalization.
fn assert_breaks(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
    for (actual, expected) in actual.iter().zip(expected) {
        assert_relative_eq!(*actual, *expected, epsilon = 1e-9);
    }
}

/// Equally spaced values are best described by a single bin.
#[test]
fn eleven_penalized() {
    // Splitting off the denser boundary bin gains about 0.34, far below the two bin penalty of 3.6
    let histogram = IrregularHistogram::new()
        .fit(&common::eleven())
        .expect("Fitting failed");

    assert_eq!(histogram.breaks(), &[0.0, 1.0]);
    assert_eq!(histogram.counts(), &[11]);
    assert_relative_eq!(histogram.score(), 11.0 * 11.0_f64.ln(), epsilon = 1e-10);
    assert_relative_eq!(histogram.densities()[0], 1.0);
}

/// Without a penalty the boundary value makes the first bin denser.
#[test]
fn eleven_likelihood() {
    let histogram = IrregularHistogram::new()
        .with_criterion(Criterion::Likelihood)
        .fit(&common::eleven())
        .expect("Fitting failed");

    assert_breaks(histogram.breaks(), &[0.0, 0.1, 1.0]);
    assert_eq!(histogram.counts(), &[2, 9]);
    assert_relative_eq!(
        histogram.score(),
        2.0 * 20.0_f64.ln() + 9.0 * 10.0_f64.ln(),
        epsilon = 1e-10
    );
}

/// Left closed bins put the dense bin at the other end.
#[test]
fn eleven_left_closed() {
    let histogram = IrregularHistogram::new()
        .with_criterion(Criterion::Likelihood)
        .with_closed(Closed::Left)
        .fit(&common::eleven())
        .expect("Fitting failed");

    assert_breaks(histogram.breaks(), &[0.0, 0.9, 1.0]);
    assert_eq!(histogram.counts(), &[9, 2]);
    assert_eq!(histogram.closed(), Closed::Left);
    assert_eq!(histogram.bin_index(0.9), Some(1));
}

/// Uniformly spread values give a single Bayesian bin with a neutral score.
#[test]
fn uniform_bayes() {
    let sample = (0..100)
        .map(|index| (f64::from(index) + 0.5) / 100.0)
        .collect::<Vec<_>>();

    let histogram = IrregularHistogram::new()
        .with_criterion(Criterion::Bayes { concentration: 5.0 })
        .fit(&sample)
        .expect("Fitting failed");

    assert_eq!(histogram.bins(), 1);
    assert_eq!(histogram.concentration(), Some(5.0));
    assert_relative_eq!(histogram.score(), 0.0, epsilon = 1e-8);
    assert_relative_eq!(histogram.mass(), 1.0, epsilon = 1e-12);
}

/// Two distinct values form a single bin spanning them.
#[test]
fn two_points() {
    let histogram = IrregularHistogram::new()
        .fit(&[3.0, 7.0])
        .expect("Fitting failed");

    assert_eq!(histogram.breaks(), &[3.0, 7.0]);
    assert_eq!(histogram.counts(), &[2]);
    assert_relative_eq!(histogram.density_at(5.0), 0.25);
}

/// The default pipeline prunes the data grid and finds the two modes.
#[test]
fn bimodal_default() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));
    let histogram = IrregularHistogram::new().fit(&sample).expect("Fitting failed");

    assert_breaks(histogram.breaks(), &BIMODAL_BREAKS);
    assert_eq!(histogram.counts(), &BIMODAL_COUNTS);
    assert_relative_eq!(histogram.score(), BIMODAL_SCORE, max_relative = 1e-10);
    assert_eq!(histogram.sample_size(), 300);
}

/// Coarser pruning and no pruning agree on the bimodal fixture.
#[test]
fn bimodal_pruning() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));

    for pruning in [
        Pruning::Disabled,
        Pruning::Greedy {
            target: NonZero::new(60).expect("Invalid number"),
        },
    ] {
        let histogram = IrregularHistogram::new()
            .with_pruning(pruning)
            .fit(&sample)
            .expect("Fitting failed");

        assert_breaks(histogram.breaks(), &BIMODAL_BREAKS);
        assert_eq!(histogram.counts(), &BIMODAL_COUNTS, "{pruning:?}");
        assert_relative_eq!(histogram.score(), BIMODAL_SCORE, max_relative = 1e-10);
    }
}

/// Bounding the amount of bins keeps the strongest split.
#[test]
fn bimodal_maximum_bins() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));
    let histogram = IrregularHistogram::new()
        .with_pruning(Pruning::Disabled)
        .with_maximum_bins(NonZero::new(2))
        .fit(&sample)
        .expect("Fitting failed");

    assert_breaks(histogram.breaks(), &[-2.8399, -1.6127, 5.3388]);
    assert_eq!(histogram.counts(), &[13, 287]);
}

/// Cross-validation is solved without a bin count penalty.
#[test]
fn bimodal_kullback_leibler() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));
    let histogram = IrregularHistogram::new()
        .with_criterion(Criterion::KullbackLeiblerCv { minimum_length: 0.0 })
        .fit(&sample)
        .expect("Fitting failed");

    assert_eq!(histogram.bins(), 35);
    assert_relative_eq!(histogram.score(), 1_820.976_056_505_106_5, max_relative = 1e-10);
    assert!(
        histogram.counts().iter().all(|count| *count >= 2),
        "every bin needs two values"
    );
}

/// Every criterion and grid produces a valid histogram.
#[test]
fn all_criteria() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));

    for criterion in [
        Criterion::Likelihood,
        Criterion::PenaltyA,
        Criterion::PenaltyB,
        Criterion::PenaltyR,
        Criterion::Aic,
        Criterion::Bic,
        Criterion::Nml,
        Criterion::Bayes { concentration: 1.0 },
        Criterion::KullbackLeiblerCv { minimum_length: 0.01 },
        Criterion::L2Cv { minimum_length: 0.01 },
    ] {
        for grid_mode in [GridMode::Regular, GridMode::Data, GridMode::Quantile] {
            let histogram = IrregularHistogram::new()
                .with_criterion(criterion)
                .with_grid_mode(grid_mode)
                .fit(&sample)
                .expect("Fitting failed");

            assert_eq!(
                histogram.counts().iter().sum::<usize>(),
                300,
                "{criterion:?} on {grid_mode:?}"
            );
            assert_relative_eq!(histogram.mass(), 1.0, epsilon = 1e-9);
        }
    }
}

/// The bounded heuristic returns a valid histogram no better than the exact one.
#[test]
fn bounded() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));
    let exact = IrregularHistogram::new().fit(&sample).expect("Fitting failed");

    for predecessors in [1, 5, 20] {
        let bounded = IrregularHistogram::new()
            .with_algorithm(Algorithm::Bounded {
                predecessors: NonZero::new(predecessors).expect("Invalid number"),
            })
            .fit(&sample)
            .expect("Fitting failed");

        // Near ties may resolve differently than in the exact table
        assert!(
            bounded.score() <= exact.score() + 1e-8 * exact.score().abs(),
            "heuristic beat the optimum"
        );
        assert_eq!(bounded.counts().iter().sum::<usize>(), 300);
    }
}

/// The heuristic stays feasible when retained predecessors can't start a valid bin.
#[test]
fn bounded_cross_validation() {
    let estimator = IrregularHistogram::new()
        .with_criterion(Criterion::KullbackLeiblerCv { minimum_length: 0.0 });
    let exact = estimator.fit(&common::eleven()).expect("Fitting failed");
    assert_eq!(exact.bins(), 1);

    for predecessors in 1..5 {
        let bounded = estimator
            .with_algorithm(Algorithm::Bounded {
                predecessors: NonZero::new(predecessors).expect("Invalid number"),
            })
            .fit(&common::eleven())
            .expect("Fitting failed");

        assert_eq!(bounded.counts().iter().sum::<usize>(), 11);
        assert!(
            bounded.counts().iter().all(|count| *count >= 2),
            "every bin needs two values"
        );
        assert!(
            bounded.score() <= exact.score() + 1e-8 * exact.score().abs(),
            "heuristic beat the optimum"
        );
    }
}

/// Priors on the amount of bins shift the selection.
#[test]
fn prior() {
    let sample = common::load_sample_fixture(include_str!("bimodal.csv"));
    let histogram = IrregularHistogram::new()
        .with_criterion(Criterion::Likelihood)
        .with_prior(BinCountPrior::Geometric { ratio: 1e-100 })
        .fit(&sample)
        .expect("Fitting failed");

    assert_eq!(histogram.bins(), 1);
}

/// A user support widens the domain of constant samples.
#[test]
fn support() {
    let histogram = IrregularHistogram::new()
        .with_support(Some((0.0, 2.0)))
        .fit(&[1.0, 1.0, 1.0])
        .expect("Fitting failed");

    assert_eq!(histogram.breaks().first(), Some(&0.0));
    assert_eq!(histogram.breaks().last(), Some(&2.0));
    assert_eq!(histogram.counts().iter().sum::<usize>(), 3);
}

/// Invalid input is rejected before fitting.
#[test]
fn invalid_input() {
    let estimator = IrregularHistogram::new();

    assert_eq!(estimator.fit(&Vec::<f64>::new()), Err(Error::EmptySample));
    assert_eq!(estimator.fit(&[1.0, f64::NAN]), Err(Error::NonFiniteSample));
    assert_eq!(estimator.fit(&[1.0, f64::INFINITY]), Err(Error::NonFiniteSample));
    assert_eq!(estimator.fit(&[2.0, 2.0]), Err(Error::DegenerateSample));
    assert_eq!(
        estimator.with_support(Some((1.0, 1.0))).fit(&[1.0]),
        Err(Error::InvalidSupport)
    );
    assert_eq!(
        estimator.with_support(Some((0.0, 1.0))).fit(&[0.5, 1.5]),
        Err(Error::SampleOutsideSupport)
    );
    assert!(matches!(
        estimator
            .with_criterion(Criterion::Bayes { concentration: -1.0 })
            .fit(&[0.0, 1.0]),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        estimator
            .with_prior(BinCountPrior::Poisson { mean: 0.0 })
            .fit(&[0.0, 1.0]),
        Err(Error::InvalidParameter(_))
    ));
}

/// Optimal partitioning refuses criteria with a bin count penalty.
#[test]
fn incompatible_algorithm() {
    let estimator = IrregularHistogram::new().with_algorithm(Algorithm::OptimalPartitioning);

    assert_eq!(
        estimator.fit(&common::eleven()),
        Err(Error::IncompatibleAlgorithm)
    );
    assert_eq!(
        estimator
            .with_criterion(Criterion::Likelihood)
            .with_prior(BinCountPrior::Geometric { ratio: 0.5 })
            .fit(&common::eleven()),
        Err(Error::IncompatibleAlgorithm)
    );

    let histogram = estimator
        .with_criterion(Criterion::L2Cv { minimum_length: 0.0 })
        .fit(&common::eleven())
        .expect("Fitting failed");
    assert_eq!(histogram.bins(), 1);
    assert_relative_eq!(histogram.score(), 110.0, epsilon = 1e-9);
}

/// A lone value can't satisfy Kullback-Leibler cross-validation.
#[test]
fn infeasible() {
    let result = IrregularHistogram::new()
        .with_criterion(Criterion::KullbackLeiblerCv { minimum_length: 0.0 })
        .with_support(Some((0.0, 1.0)))
        .fit(&[0.5]);

    assert_eq!(result, Err(Error::NoFeasiblePartition));
}

/// Oversized tables are refused.
#[test]
fn memory_budget() {
    let result = IrregularHistogram::new()
        .with_memory_budget(Some(1024))
        .fit(&common::eleven());

    assert!(
        matches!(result, Err(Error::TableTooLarge { limit: 1024, .. })),
        "{result:?}"
    );
}
