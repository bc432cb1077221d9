//! Shared numerical primitives anchored on `nalgebra`.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

/// Primary scalar type used across the crate.
pub type Scalar = f64;
/// Primary complex scalar type used for frequency-domain quantities.
pub type CScalar = Complex<Scalar>;
/// Dense real matrix.
pub type RMatrix = DMatrix<Scalar>;
/// Dense complex matrix.
pub type CMatrix = DMatrix<CScalar>;
/// Dense real vector.
pub type RVector = DVector<Scalar>;

/// Returns the complex exponential `e^(j * theta)` using `Scalar` precision.
#[must_use]
pub fn phasor(theta: Scalar) -> CScalar {
    Complex::from_polar(1.0, theta)
}

/// Lifts a real dense matrix into the complex field.
#[must_use]
pub fn complexify(m: &RMatrix) -> CMatrix {
    m.map(|v| Complex::new(v, 0.0))
}

/// Relative closeness test used for sampling intervals.
///
/// Two absent intervals (continuous-time) always agree; a continuous and a
/// discrete interval never do.
#[must_use]
pub fn same_sampling(a: Option<Scalar>, b: Option<Scalar>, rel_tol: Scalar) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() <= rel_tol * x.abs().max(y.abs()),
        _ => false,
    }
}
