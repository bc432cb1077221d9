//! Canonical discrete-time building blocks: delay-augmented realizations,
//! derivative and integrator models, polynomial forcing systems.
//!
//! The input-dependent terms of a recursion
//! `x_{n+1} = A x_n + B0 u_n + B1 u_{n+1} + Bm1 u_{n-1}` are absorbed by
//! [`ss_conv`] into a standard realization driven by `u_n` alone.

use tracing::debug;

use crate::backend::Matrix;
use crate::errors::{LinssError, Result};
use crate::interconnect::{add_gain, join2, series, GainPlacement, Operand};
use crate::math::{RMatrix, Scalar};
use crate::statespace::StateSpace;

/// Raw dense `(A, B, C, D)` with no sampling attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    /// State matrix.
    pub a: RMatrix,
    /// Input matrix.
    pub b: RMatrix,
    /// Output matrix.
    pub c: RMatrix,
    /// Feedthrough matrix.
    pub d: RMatrix,
}

impl Realization {
    /// Wraps the matrices into a validated model.
    pub fn into_state_space(self, dt: Option<Scalar>) -> Result<StateSpace> {
        StateSpace::new(self.a, self.b, self.c, self.d, dt)
    }
}

/// Integration rule of [`ss_integr`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationScheme {
    /// `x_{n+1} = x_n + ds u_n`.
    FirstOrderTaylor,
    /// `x_{n+1} = x_n + ds (u_n + u_{n+1}) / 2`.
    #[default]
    Trapezoidal,
}

fn check_shape(what: &str, m: &RMatrix, rows: usize, cols: usize) -> Result<()> {
    if m.shape() != (rows, cols) {
        return Err(LinssError::dims(
            "ss_conv",
            format!("{what} is {}x{}, expected {rows}x{cols}", m.nrows(), m.ncols()),
        ));
    }
    Ok(())
}

fn check_step(ds: Scalar) -> Result<()> {
    if ds.is_finite() && ds > 0.0 {
        Ok(())
    } else {
        Err(LinssError::InvalidArgument(format!("step size must be positive, got {ds}")))
    }
}

/// Converts `x_{n+1} = A x_n + B0 u_n + B1 u_{n+1} + Bm1 u_{n-1}`,
/// `y_n = C x_n + D u_n` into a realization driven by `u_n` only.
///
/// The `u_{n+1}` term is removed with `x ← x - B1 u_n`, giving
/// `B = B0 + A B1` and `D + C B1`. A `u_{n-1}` term appends the previous input
/// `g_n = u_{n-1}` to the state:
///
/// ```text
/// AA = [[A, Bm1], [0, 0]]   BB = [B0 + A B1; I]   CC = [C, 0]   DD = D + C B1
/// ```
pub fn ss_conv(
    a: &RMatrix,
    b0: Option<&RMatrix>,
    b1: &RMatrix,
    c: &RMatrix,
    d: &RMatrix,
    bm1: Option<&RMatrix>,
) -> Result<Realization> {
    let (n, m) = b1.shape();
    let p = c.nrows();
    check_shape("A", a, n, n)?;
    check_shape("C", c, p, n)?;
    check_shape("D", d, p, m)?;
    let mut bh = a * b1;
    if let Some(b0) = b0 {
        check_shape("B0", b0, n, m)?;
        bh += b0;
    }
    let dh = d + c * b1;

    let Some(bm1) = bm1 else {
        return Ok(Realization {
            a: a.clone(),
            b: bh,
            c: c.clone(),
            d: dh,
        });
    };
    check_shape("Bm1", bm1, n, m)?;
    debug!(states = n, inputs = m, "augmenting state with delayed input");
    let mut aa = RMatrix::zeros(n + m, n + m);
    aa.view_mut((0, 0), (n, n)).copy_from(a);
    aa.view_mut((0, n), (n, m)).copy_from(bm1);
    let mut bb = RMatrix::zeros(n + m, m);
    bb.view_mut((0, 0), (n, m)).copy_from(&bh);
    bb.view_mut((n, 0), (m, m)).fill_with_identity();
    let mut cc = RMatrix::zeros(p, n + m);
    cc.view_mut((0, 0), (p, n)).copy_from(c);
    Ok(Realization {
        a: aa,
        b: bb,
        c: cc,
        d: dh,
    })
}

/// Second-order backward difference: one input `u`, outputs `[u, du/ds]` with
/// `du_n = (1.5 u_n - 2 u_{n-1} + 0.5 u_{n-2}) / ds`.
pub fn ss_derivative(ds: Scalar) -> Result<Realization> {
    check_step(ds)?;
    let a = RMatrix::zeros(1, 1);
    let bm1 = RMatrix::from_element(1, 1, 0.5 / ds);
    let b0 = RMatrix::from_element(1, 1, -2.0 / ds);
    let b1 = RMatrix::from_element(1, 1, 1.5 / ds);
    let c = RMatrix::from_column_slice(2, 1, &[0.0, 1.0]);
    let d = RMatrix::from_column_slice(2, 1, &[1.0, 0.0]);
    ss_conv(&a, Some(&b0), &b1, &c, &d, Some(&bm1))
}

/// Single-channel integrator with step `ds`.
pub fn ss_integr(ds: Scalar, scheme: IntegrationScheme) -> Result<Realization> {
    check_step(ds)?;
    let one = RMatrix::from_element(1, 1, 1.0);
    let zero = RMatrix::zeros(1, 1);
    match scheme {
        IntegrationScheme::FirstOrderTaylor => Ok(Realization {
            a: one.clone(),
            b: RMatrix::from_element(1, 1, ds),
            c: one,
            d: zero,
        }),
        IntegrationScheme::Trapezoidal => {
            let half = RMatrix::from_element(1, 1, 0.5 * ds);
            ss_conv(&one, Some(&half), &half, &one, &zero, None)
        }
    }
}

/// Discrete polynomial system `y = ±(A0 u + A1 du + A2 d²u)` with the
/// derivatives of every input channel taken by [`ss_derivative`].
///
/// Each channel is expanded into `[u, du, d²u]` by chaining two derivative
/// blocks, the channels are stacked block-diagonally and the coefficient
/// columns `(A0, A1, A2)[:, i]` form the output gain.
pub fn build_ss_poly(coefficients: &[RMatrix; 3], ds: Scalar, negative: bool) -> Result<StateSpace> {
    let (outputs, inputs) = coefficients[0].shape();
    if coefficients.iter().any(|m| m.shape() != (outputs, inputs)) {
        return Err(LinssError::dims(
            "build_ss_poly",
            "coefficient matrices A0, A1, A2 must share one shape",
        ));
    }
    if inputs == 0 {
        return Err(LinssError::InvalidArgument("build_ss_poly needs at least one input".into()));
    }

    let der = ss_derivative(ds)?.into_state_space(Some(ds))?;
    let passthrough = Operand::Gain(Matrix::Dense(RMatrix::identity(1, 1)));
    let second = join2(&passthrough, &Operand::System(der.clone()))?;
    let second = second
        .as_system()
        .ok_or_else(|| LinssError::InvariantViolation("derivative stage lost its states".into()))?;
    let channel = Operand::System(series(&der, second)?);

    let mut all = channel.clone();
    for _ in 1..inputs {
        all = join2(&all, &channel)?;
    }
    let Operand::System(all) = all else {
        return Err(LinssError::InvariantViolation("derivative chain lost its states".into()));
    };

    let sign = if negative { -1.0 } else { 1.0 };
    let mut force = RMatrix::zeros(outputs, 3 * inputs);
    for i in 0..inputs {
        for (order, cf) in coefficients.iter().enumerate() {
            force.set_column(3 * i + order, &(cf.column(i) * sign));
        }
    }
    add_gain(&all, &Matrix::Dense(force), GainPlacement::Output)
}
