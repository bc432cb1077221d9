//! Numeric tolerances and solver options shared by the algorithms.

use crate::backend::ordering::OrderingStrategy;
use crate::math::Scalar;

/// Tolerances and strategy knobs for the numerical algorithms.
///
/// Every entry point that depends on these has a `_with` variant taking a
/// `&NumericConfig`; the plain variant uses [`NumericConfig::default`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericConfig {
    /// Relative tolerance when comparing sampling intervals.
    pub sampling_rel_tol: Scalar,
    /// Pivot magnitude (relative to the largest entry) below which a matrix
    /// is declared singular.
    pub pivot_tol: Scalar,
    /// Magnitude under which a feedback self-loop gain is treated as zero.
    pub zero_feedthrough_tol: Scalar,
    /// Fraction of a full period above which a phase step counts as a wrap.
    pub phase_jump_fraction: Scalar,
    /// Condition estimate above which factorizations are reported.
    pub condition_warning: Scalar,
    /// Fill-reducing ordering applied by the sparse factorization.
    pub ordering: OrderingStrategy,
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            sampling_rel_tol: 1e-10,
            pivot_tol: 1e-14,
            zero_feedthrough_tol: 1e-32,
            phase_jump_fraction: 0.97,
            condition_warning: 1e12,
            ordering: OrderingStrategy::Auto,
        }
    }
}

impl NumericConfig {
    /// Returns a copy with a different sparse ordering strategy.
    #[must_use]
    pub fn with_ordering(mut self, ordering: OrderingStrategy) -> Self {
        self.ordering = ordering;
        self
    }

    /// Returns a copy with a different sampling-interval tolerance.
    #[must_use]
    pub fn with_sampling_tolerance(mut self, rel_tol: Scalar) -> Self {
        self.sampling_rel_tol = rel_tol;
        self
    }
}
