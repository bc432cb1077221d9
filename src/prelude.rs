//! Convenience re-exports for building and analysing state-space models.

pub use crate::backend::block::{hstack, vstack, BlockMatrix};
pub use crate::backend::ordering::OrderingStrategy;
pub use crate::backend::solver::{SolverError, SparseLu, SparseSolver};
pub use crate::backend::{add, block_diag, dot, solve, sub, Matrix, Representation};
pub use crate::builders::{build_ss_poly, ss_conv, ss_derivative, ss_integr, IntegrationScheme, Realization};
pub use crate::config::NumericConfig;
pub use crate::discretize::{cont2disc, disc2cont};
pub use crate::errors::LinssError;
pub use crate::filters::{butter, Cutoff, FilterKind};
pub use crate::freqresp::{
    freqresp, get_freq_from_eigs, h_norm, EvaluationDomain, FrequencyResponse, NormKind,
};
pub use crate::interconnect::{
    add_gain, couple, couple_with, join, join2, parallel, project, series, sum_ss, CoupleOptions,
    GainPlacement, Operand,
};
pub use crate::math::{CMatrix, CScalar, RMatrix, RVector, Scalar};
pub use crate::statespace::{BlockStateSpace, Dimensions, ProjectionBasis, Scaling, Side, StateSpace};
pub use crate::sweep::{adjust_phase, linspace, logspace, mag, mag_db, phase, PhaseUnit};
