//! Seeded random models for unit tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::{RMatrix, Scalar};
use crate::statespace::StateSpace;

/// Matrix with entries uniform in `[-1, 1)`.
pub(crate) fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> RMatrix {
    RMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

/// Random asymptotically stable model.
///
/// `A` is scaled to infinity-norm 0.9, which bounds every eigenvalue inside
/// the disc of radius 0.9; continuous models shift that disc by `-1`.
pub(crate) fn random_ss(nx: usize, nu: usize, ny: usize, dt: Option<Scalar>, seed: u64) -> StateSpace {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = random_matrix(&mut rng, nx, nx);
    let norm = a.row_iter().map(|r| r.abs().sum()).fold(0.0, Scalar::max);
    if norm > 0.0 {
        a *= 0.9 / norm;
    }
    if dt.is_none() {
        a -= RMatrix::identity(nx, nx);
    }
    let b = random_matrix(&mut rng, nx, nu);
    let c = random_matrix(&mut rng, ny, nx);
    let d = random_matrix(&mut rng, ny, nu);
    StateSpace::new(a, b, c, d, dt).expect("random model shapes are consistent")
}
