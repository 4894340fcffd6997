//! Error types.

/// Errors that can occur while fitting a histogram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Sample doesn't contain any values.
    #[error("sample is empty")]
    EmptySample,
    /// Sample contains a NaN or infinite value.
    #[error("sample contains a non-finite value")]
    NonFiniteSample,
    /// All values are equal and no support was given to widen the domain.
    #[error("sample has a zero-width range, provide a support to fit it")]
    DegenerateSample,
    /// Support bounds are not finite or not strictly increasing.
    #[error("support bounds must be finite with lower < upper")]
    InvalidSupport,
    /// A sample value lies outside of the given support.
    #[error("sample contains values outside of the support")]
    SampleOutsideSupport,
    /// A configuration value is out of its allowed range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// The selected algorithm can't optimize the selected criterion.
    #[error("optimal partitioning can't be used with a bin count penalty")]
    IncompatibleAlgorithm,
    /// Every candidate partition scores negative infinity.
    #[error("criterion has no feasible partition on this grid")]
    NoFeasiblePartition,
    /// Dynamic programming tables would exceed the memory budget.
    #[error("dynamic programming tables need {required} bytes, budget is {limit} bytes")]
    TableTooLarge {
        /// Bytes needed for the tables.
        required: usize,
        /// Configured budget in bytes.
        limit: usize,
    },
}
