#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(clippy::all, clippy::cargo, clippy::nursery, missing_docs)]
#![doc = include_str!("../README.md")]

/// Dense/sparse matrix storage, block matrices and the sparse LU backend.
pub mod backend;
/// Numeric tolerances shared by the algorithms.
pub mod config;
/// Shared scalar and matrix aliases.
pub mod math;
/// State-space models, monolithic and block-partitioned.
pub mod statespace;
/// Feedback coupling, cascades, parallel and weighted connections.
pub mod interconnect;
/// Frequency-response evaluation and system norms.
pub mod freqresp;
/// Frequency grids and phase/magnitude post-processing.
pub mod sweep;
/// Bilinear conversion between discrete and continuous time.
pub mod discretize;
/// Derivative, integrator and polynomial building blocks.
pub mod builders;
/// Digital Butterworth filter design.
pub mod filters;
/// Error types shared between modules.
pub mod errors;

/// Common exports for downstream crates.
pub mod prelude;

#[cfg(test)]
mod testing;
