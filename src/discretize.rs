//! Bilinear (Tustin) conversion between discrete- and continuous-time models.
//!
//! With `ω₀ = 2/dt` the discrete model `(A, B, C, D)` maps to
//!
//! ```text
//! Ā = ω₀ (A - I)(A + I)⁻¹      B̄ = √(2ω₀) (A + I)⁻¹ B
//! C̄ = √(2ω₀) C (A + I)⁻¹       D̄ = D - C (A + I)⁻¹ B
//! ```
//!
//! so that `H_c(s) = H_d(z)` on `s = ω₀ (z - 1)/(z + 1)`. The `√(2ω₀)` split
//! between `B̄` and `C̄` keeps both factors balanced.

use tracing::debug;

use crate::backend::{lu_solve_dense, Matrix};
use crate::config::NumericConfig;
use crate::errors::{LinssError, Result};
use crate::math::{RMatrix, Scalar};
use crate::statespace::StateSpace;

/// Dense `(A, B, C, D)`.
pub type Quadruple = (RMatrix, RMatrix, RMatrix, RMatrix);

/// Discrete to continuous time with the default [`NumericConfig`].
pub fn disc2cont(ss: &StateSpace) -> Result<StateSpace> {
    disc2cont_with(ss, &NumericConfig::default())
}

/// Discrete to continuous time; fails on continuous input or singular `A + I`.
pub fn disc2cont_with(ss: &StateSpace, config: &NumericConfig) -> Result<StateSpace> {
    let dt = ss
        .dt()
        .ok_or_else(|| LinssError::InvalidArgument("disc2cont: model is already continuous-time".into()))?;
    let (a, b, c, d) = ss.dense_matrices();
    let (ac, bc, cc, dc) = disc2cont_matrices(&a, &b, &c, &d, dt, config)?;
    rebuild(ss, ac, bc, cc, dc, None)
}

/// Continuous to discrete time with the default [`NumericConfig`].
pub fn cont2disc(ss: &StateSpace, dt: Scalar) -> Result<StateSpace> {
    cont2disc_with(ss, dt, &NumericConfig::default())
}

/// Inverse of [`disc2cont`]: with `M = Ā/ω₀`,
/// `A = (I - M)⁻¹(I + M)`, `B = 2 (I - M)⁻¹ B̄ / √(2ω₀)`,
/// `C = 2 C̄ (I - M)⁻¹ / √(2ω₀)`, `D = D̄ + C̄ (I - M)⁻¹ B̄ / ω₀`.
pub fn cont2disc_with(ss: &StateSpace, dt: Scalar, config: &NumericConfig) -> Result<StateSpace> {
    if ss.is_discrete() {
        return Err(LinssError::InvalidArgument("cont2disc: model is already discrete-time".into()));
    }
    if !(dt.is_finite() && dt > 0.0) {
        return Err(LinssError::InvalidArgument(format!("cont2disc: invalid sampling interval {dt}")));
    }
    let (a, b, c, d) = ss.dense_matrices();
    let n = a.nrows();
    let w0 = 2.0 / dt;
    let eye = RMatrix::identity(n, n);
    let m = &a / w0;
    let inv = lu_solve_dense(&eye - &m, &eye, config.pivot_tol)
        .map_err(|_| LinssError::NumericalFailure("cont2disc: I - A/ω₀ is singular".into()))?;
    let root = (2.0 * w0).sqrt();

    let ad = &inv * (&eye + &m);
    let bd = &inv * &b * (2.0 / root);
    let cd = &c * &inv * (2.0 / root);
    let dd = &d + &c * &inv * &b / w0;
    debug!(states = n, dt, "inverse bilinear transform");
    rebuild(ss, ad, bd, cd, dd, Some(dt))
}

/// Bilinear transform on raw dense matrices, for callers without a model.
pub fn disc2cont_matrices(
    a: &RMatrix,
    b: &RMatrix,
    c: &RMatrix,
    d: &RMatrix,
    dt: Scalar,
    config: &NumericConfig,
) -> Result<Quadruple> {
    let n = a.nrows();
    let eye = RMatrix::identity(n, n);
    let inv = lu_solve_dense(a + &eye, &eye, config.pivot_tol)
        .map_err(|_| LinssError::NumericalFailure("disc2cont: A + I is singular (eigenvalue at -1)".into()))?;
    let w0 = 2.0 / dt;
    let root = (2.0 * w0).sqrt();

    let ac = (a - &eye) * &inv * w0;
    let bc = &inv * b * root;
    let cc = c * &inv * root;
    let dc = d - c * &inv * b;
    debug!(states = n, dt, "bilinear transform to continuous time");
    Ok((ac, bc, cc, dc))
}

/// New model with the storage of `like` and the given sampling.
fn rebuild(like: &StateSpace, a: RMatrix, b: RMatrix, c: RMatrix, d: RMatrix, dt: Option<Scalar>) -> Result<StateSpace> {
    StateSpace::new(
        Matrix::Dense(a).into_representation(like.a().representation()),
        Matrix::Dense(b).into_representation(like.b().representation()),
        Matrix::Dense(c).into_representation(like.c().representation()),
        Matrix::Dense(d).into_representation(like.d().representation()),
        dt,
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex;

    use super::*;
    use crate::backend::Representation;
    use crate::testing::random_ss;

    #[test]
    fn round_trip_recovers_the_discrete_model() {
        let ss = random_ss(6, 2, 3, Some(0.05), 42);
        let cont = ss.disc2cont().unwrap();
        assert!(!cont.is_discrete());
        let back = cont.cont2disc(0.05).unwrap();
        assert_eq!(back.dt(), Some(0.05));
        let (a0, b0, c0, d0) = ss.dense_matrices();
        let (a1, b1, c1, d1) = back.dense_matrices();
        assert_relative_eq!(a1, a0, epsilon = 1e-8);
        assert_relative_eq!(b1, b0, epsilon = 1e-8);
        assert_relative_eq!(c1, c0, epsilon = 1e-8);
        assert_relative_eq!(d1, d0, epsilon = 1e-8);
    }

    #[test]
    fn transfer_functions_match_on_the_tustin_map() {
        let dt = 0.2;
        let ss = random_ss(4, 2, 2, Some(dt), 7);
        let cont = disc2cont(&ss).unwrap();
        let z = Complex::from_polar(1.0, 0.8);
        let s = (z - 1.0) / (z + 1.0) * (2.0 / dt);
        let hd = ss.transfer_function_evaluation(z).unwrap();
        let hc = cont.transfer_function_evaluation(s).unwrap();
        assert!((hd - hc).camax() < 1e-10);
    }

    #[test]
    fn continuous_input_and_eigenvalue_at_minus_one_are_rejected() {
        let cont = random_ss(3, 1, 1, None, 1);
        assert!(matches!(disc2cont(&cont), Err(LinssError::InvalidArgument(_))));

        let a = -RMatrix::identity(2, 2);
        let ss = StateSpace::discrete(a, RMatrix::zeros(2, 1), RMatrix::zeros(1, 2), RMatrix::zeros(1, 1), 0.1).unwrap();
        assert!(matches!(ss.disc2cont(), Err(LinssError::NumericalFailure(_))));

        let disc = random_ss(3, 1, 1, Some(0.1), 1);
        assert!(cont2disc(&disc, 0.1).is_err());
    }

    #[test]
    fn in_place_conversion_keeps_storage() {
        let mut ss = random_ss(3, 1, 2, Some(0.1), 5).to_representation(Representation::Sparse);
        ss.disc2cont_in_place().unwrap();
        assert!(ss.dt().is_none());
        assert!(ss.a().is_sparse());
    }
}
