//! Linear time-invariant models in state-space form.
//!
//! A [`StateSpace`] holds the quadruple `(A, B, C, D)` and an optional sampling
//! interval. Its state, input and output counts are derived from the matrix
//! shapes by [`Dimensions::derive`] every time matrices are installed, so the
//! counts can never go stale.

pub mod block;

use std::fmt;

use tracing::debug;

use crate::backend::{dot, lu_solve_dense, Matrix, Representation};
use crate::config::NumericConfig;
use crate::discretize;
use crate::errors::{LinssError, Result};
use crate::math::{CMatrix, CScalar, RMatrix, RVector, Scalar};

pub use block::{BlockStateSpace, ProjectionBasis};

/// Which side of a model a gain or channel selection acts on.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Acts on the input vector `u`.
    Input,
    /// Acts on the output vector `y`.
    Output,
}

/// Reference values of a change of variables `v ← v / v_ref`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Scaling {
    /// Same reference value for every channel.
    Uniform(Scalar),
    /// One reference value per channel.
    PerChannel(Vec<Scalar>),
}

impl Default for Scaling {
    fn default() -> Self {
        Self::Uniform(1.0)
    }
}

impl From<Scalar> for Scaling {
    fn from(v: Scalar) -> Self {
        Self::Uniform(v)
    }
}

impl From<Vec<Scalar>> for Scaling {
    fn from(v: Vec<Scalar>) -> Self {
        Self::PerChannel(v)
    }
}

impl From<&[Scalar]> for Scaling {
    fn from(v: &[Scalar]) -> Self {
        Self::PerChannel(v.to_vec())
    }
}

impl Scaling {
    /// Expands into `n` nonzero finite factors.
    pub fn factors(&self, n: usize, what: &str) -> Result<Vec<Scalar>> {
        let factors = match self {
            Self::Uniform(v) => vec![*v; n],
            Self::PerChannel(v) if v.len() == n => v.clone(),
            Self::PerChannel(v) => {
                return Err(LinssError::dims(
                    "scale",
                    format!("{} {what} reference values for {n} {what}s", v.len()),
                ))
            }
        };
        if let Some(bad) = factors.iter().find(|f| **f == 0.0 || !f.is_finite()) {
            return Err(LinssError::InvalidArgument(format!(
                "{what} reference value {bad} must be finite and nonzero"
            )));
        }
        Ok(factors)
    }
}

/// State, input and output counts of a model.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    /// Number of states `n`.
    pub states: usize,
    /// Number of inputs `m`.
    pub inputs: usize,
    /// Number of outputs `p`.
    pub outputs: usize,
}

impl Dimensions {
    /// Derives the counts from the four matrices, checking that their shapes
    /// are mutually consistent.
    pub fn derive(a: &Matrix, b: &Matrix, c: &Matrix, d: &Matrix) -> Result<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LinssError::dims("state-space", format!("A is {}x{}, not square", n, a.ncols())));
        }
        if b.nrows() != n {
            return Err(LinssError::dims(
                "state-space",
                format!("B has {} rows but A has {n} states", b.nrows()),
            ));
        }
        if c.ncols() != n {
            return Err(LinssError::dims(
                "state-space",
                format!("C has {} columns but A has {n} states", c.ncols()),
            ));
        }
        let (m, p) = (b.ncols(), c.nrows());
        if d.nrows() != p {
            return Err(LinssError::dims(
                "state-space",
                format!("D has {} rows but C has {p} outputs", d.nrows()),
            ));
        }
        if d.ncols() != m {
            return Err(LinssError::dims(
                "state-space",
                format!("D has {} columns but B has {m} inputs", d.ncols()),
            ));
        }
        Ok(Self {
            states: n,
            inputs: m,
            outputs: p,
        })
    }
}

fn check_dt(dt: Option<Scalar>) -> Result<()> {
    match dt {
        Some(dt) if !(dt.is_finite() && dt > 0.0) => Err(LinssError::InvalidArgument(format!(
            "sampling interval must be positive and finite, got {dt}"
        ))),
        _ => Ok(()),
    }
}

/// LTI model `x' = A x + B u`, `y = C x + D u` (continuous) or
/// `x_{n+1} = A x_n + B u_n`, `y_n = C x_n + D u_n` (discrete, `dt` present).
#[derive(Debug, Clone)]
pub struct StateSpace {
    a: Matrix,
    b: Matrix,
    c: Matrix,
    d: Matrix,
    dt: Option<Scalar>,
    dims: Dimensions,
}

impl StateSpace {
    /// Builds a model, rejecting inconsistent shapes.
    ///
    /// A single-input model may pass `B` as an [`RVector`]; it becomes a column.
    pub fn new(
        a: impl Into<Matrix>,
        b: impl Into<Matrix>,
        c: impl Into<Matrix>,
        d: impl Into<Matrix>,
        dt: Option<Scalar>,
    ) -> Result<Self> {
        let (a, b, c, d) = (a.into(), b.into(), c.into(), d.into());
        check_dt(dt)?;
        let dims = Dimensions::derive(&a, &b, &c, &d)?;
        Ok(Self { a, b, c, d, dt, dims })
    }

    /// Continuous-time model.
    pub fn continuous(a: impl Into<Matrix>, b: impl Into<Matrix>, c: impl Into<Matrix>, d: impl Into<Matrix>) -> Result<Self> {
        Self::new(a, b, c, d, None)
    }

    /// Discrete-time model with sampling interval `dt`.
    pub fn discrete(
        a: impl Into<Matrix>,
        b: impl Into<Matrix>,
        c: impl Into<Matrix>,
        d: impl Into<Matrix>,
        dt: Scalar,
    ) -> Result<Self> {
        Self::new(a, b, c, d, Some(dt))
    }

    /// State matrix.
    #[must_use]
    pub fn a(&self) -> &Matrix {
        &self.a
    }

    /// Input matrix.
    #[must_use]
    pub fn b(&self) -> &Matrix {
        &self.b
    }

    /// Output matrix.
    #[must_use]
    pub fn c(&self) -> &Matrix {
        &self.c
    }

    /// Feedthrough matrix.
    #[must_use]
    pub fn d(&self) -> &Matrix {
        &self.d
    }

    /// Sampling interval; `None` for continuous-time models.
    #[must_use]
    pub fn dt(&self) -> Option<Scalar> {
        self.dt
    }

    /// True when a sampling interval is set.
    #[must_use]
    pub fn is_discrete(&self) -> bool {
        self.dt.is_some()
    }

    /// Derived counts.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Number of states.
    #[must_use]
    pub fn states(&self) -> usize {
        self.dims.states
    }

    /// Number of inputs.
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.dims.inputs
    }

    /// Number of outputs.
    #[must_use]
    pub fn outputs(&self) -> usize {
        self.dims.outputs
    }

    /// Consumes the model, returning `(A, B, C, D)`.
    #[must_use]
    pub fn into_matrices(self) -> (Matrix, Matrix, Matrix, Matrix) {
        (self.a, self.b, self.c, self.d)
    }

    /// Replaces all four matrices at once; nothing changes if the shapes are
    /// inconsistent.
    pub fn set_matrices(&mut self, a: Matrix, b: Matrix, c: Matrix, d: Matrix) -> Result<()> {
        let dims = Dimensions::derive(&a, &b, &c, &d)?;
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;
        self.dims = dims;
        Ok(())
    }

    /// Changes the sampling interval.
    pub fn set_dt(&mut self, dt: Option<Scalar>) -> Result<()> {
        check_dt(dt)?;
        self.dt = dt;
        Ok(())
    }

    /// Inserts a static gain: on [`Side::Input`] `B ← B K`, `D ← D K`; on
    /// [`Side::Output`] `C ← K C`, `D ← K D`.
    pub fn add_gain(&mut self, k: &Matrix, side: Side) -> Result<()> {
        let (b, c, d) = match side {
            Side::Input => {
                if k.nrows() != self.inputs() {
                    return Err(LinssError::dims(
                        "add_gain",
                        format!("input gain has {} rows for {} inputs", k.nrows(), self.inputs()),
                    ));
                }
                (dot(&self.b, k)?, self.c.clone(), dot(&self.d, k)?)
            }
            Side::Output => {
                if k.ncols() != self.outputs() {
                    return Err(LinssError::dims(
                        "add_gain",
                        format!("output gain has {} columns for {} outputs", k.ncols(), self.outputs()),
                    ));
                }
                (self.b.clone(), dot(k, &self.c)?, dot(k, &self.d)?)
            }
        };
        let a = self.a.clone();
        self.set_matrices(a, b, c, d)
    }

    /// By-value form of [`StateSpace::add_gain`].
    pub fn with_gain(&self, k: &Matrix, side: Side) -> Result<Self> {
        let mut out = self.clone();
        out.add_gain(k, side)?;
        Ok(out)
    }

    /// Change of variables `x ← x/x_ref`, `u ← u/u_ref`, `y ← y/y_ref`:
    ///
    /// `B ← X⁻¹ B U`, `C ← Y⁻¹ C X`, `D ← Y⁻¹ D U` with `X, U, Y` the
    /// diagonal matrices of reference values. `A` is left untouched, so a
    /// non-uniform state scaling is only a similarity transform when `A` is
    /// diagonal.
    pub fn scale(
        &mut self,
        input: impl Into<Scaling>,
        output: impl Into<Scaling>,
        state: impl Into<Scaling>,
    ) -> Result<()> {
        let u = input.into().factors(self.inputs(), "input")?;
        let y = output.into().factors(self.outputs(), "output")?;
        let x = state.into().factors(self.states(), "state")?;
        let inv = |v: &[Scalar]| v.iter().map(|f| f.recip()).collect::<Vec<_>>();
        let (x_inv, y_inv) = (inv(&x), inv(&y));

        let a = self.a.clone();
        let b = self.b.scale_rows(&x_inv)?.scale_cols(&u)?;
        let c = self.c.scale_rows(&y_inv)?.scale_cols(&x)?;
        let d = self.d.scale_rows(&y_inv)?.scale_cols(&u)?;
        self.set_matrices(a, b, c, d)
    }

    /// By-value form of [`StateSpace::scale`].
    pub fn scaled(
        &self,
        input: impl Into<Scaling>,
        output: impl Into<Scaling>,
        state: impl Into<Scaling>,
    ) -> Result<Self> {
        let mut out = self.clone();
        out.scale(input, output, state)?;
        Ok(out)
    }

    /// Galerkin projection onto `k` states: `A ← WT A V`, `B ← WT B`, `C ← C V`.
    pub fn project(&mut self, wt: &Matrix, v: &Matrix) -> Result<()> {
        let n = self.states();
        if wt.ncols() != n || v.nrows() != n || wt.nrows() != v.ncols() {
            return Err(LinssError::dims(
                "project",
                format!(
                    "WT is {}x{} and V is {}x{} for {n} states",
                    wt.nrows(),
                    wt.ncols(),
                    v.nrows(),
                    v.ncols()
                ),
            ));
        }
        let a = dot(wt, &dot(&self.a, v)?)?;
        let b = dot(wt, &self.b)?;
        let c = dot(&self.c, v)?;
        let d = self.d.clone();
        self.set_matrices(a, b, c, d)
    }

    /// By-value form of [`StateSpace::project`].
    pub fn projected(&self, wt: &Matrix, v: &Matrix) -> Result<Self> {
        let mut out = self.clone();
        out.project(wt, v)?;
        Ok(out)
    }

    /// Keeps the leading `n` states.
    pub fn truncate(&mut self, n: usize) -> Result<()> {
        if n == 0 || n > self.states() {
            return Err(LinssError::InvalidArgument(format!(
                "cannot truncate {} states to {n}",
                self.states()
            )));
        }
        let a = self.a.submatrix(0..n, 0..n)?;
        let b = self.b.submatrix(0..n, 0..self.inputs())?;
        let c = self.c.submatrix(0..self.outputs(), 0..n)?;
        let d = self.d.clone();
        self.set_matrices(a, b, c, d)
    }

    /// By-value form of [`StateSpace::truncate`].
    pub fn truncated(&self, n: usize) -> Result<Self> {
        let mut out = self.clone();
        out.truncate(n)?;
        Ok(out)
    }

    /// Keeps only the listed input or output channels, in the listed order.
    pub fn remove_inout_channels(&mut self, retain: &[usize], side: Side) -> Result<()> {
        let (m, repr) = match side {
            Side::Input => (self.inputs(), self.b.representation()),
            Side::Output => (self.outputs(), self.c.representation()),
        };
        if let Some(bad) = retain.iter().find(|&&ch| ch >= m) {
            return Err(LinssError::InvalidArgument(format!(
                "channel {bad} out of range for {m} channels"
            )));
        }
        let mut selector = RMatrix::zeros(retain.len(), m);
        for (k, &ch) in retain.iter().enumerate() {
            selector[(k, ch)] = 1.0;
        }
        let gain = match side {
            Side::Input => selector.transpose(),
            Side::Output => selector,
        };
        self.add_gain(&Matrix::Dense(gain).into_representation(repr), side)
    }

    /// By-value form of [`StateSpace::remove_inout_channels`].
    pub fn with_channels(&self, retain: &[usize], side: Side) -> Result<Self> {
        let mut out = self.clone();
        out.remove_inout_channels(retain, side)?;
        Ok(out)
    }

    /// Eigenvalues of `A`, ascending by modulus (discrete) or by real part
    /// (continuous).
    #[must_use]
    pub fn eigvals(&self) -> Vec<CScalar> {
        let mut eigs: Vec<CScalar> = self.a.dense().complex_eigenvalues().iter().copied().collect();
        if self.is_discrete() {
            eigs.sort_by(|x, y| x.norm().total_cmp(&y.norm()));
        } else {
            eigs.sort_by(|x, y| x.re.total_cmp(&y.re));
        }
        eigs
    }

    /// Stability measure of the least stable eigenvalue: largest modulus
    /// (discrete) or largest real part (continuous).
    pub fn max_eig(&self) -> Result<Scalar> {
        let eigs = self.eigvals();
        let measure = |z: &CScalar| if self.is_discrete() { z.norm() } else { z.re };
        eigs.iter()
            .map(measure)
            .reduce(Scalar::max)
            .ok_or_else(|| LinssError::InvalidArgument("model has no states".into()))
    }

    /// `C (sI - A)⁻¹ B + D` at a complex point `s`.
    pub fn transfer_function_evaluation(&self, s: CScalar) -> Result<CMatrix> {
        self.transfer_function_evaluation_with(s, &NumericConfig::default())
    }

    /// [`StateSpace::transfer_function_evaluation`] with explicit pivot tolerance.
    pub fn transfer_function_evaluation_with(&self, s: CScalar, config: &NumericConfig) -> Result<CMatrix> {
        let n = self.states();
        let resolvent = CMatrix::from_diagonal_element(n, n, s) - self.a.to_complex();
        let x = lu_solve_dense(resolvent, &self.b.to_complex(), config.pivot_tol)?;
        Ok(self.c.to_complex() * x + self.d.to_complex())
    }

    /// One discrete update: returns `(x_{n+1}, y_n)`.
    pub fn solve_step(&self, x: &RVector, u: &RVector) -> Result<(RVector, RVector)> {
        let x_next = self.a.mul_vector(x)? + self.b.mul_vector(u)?;
        let y = self.c.mul_vector(x)? + self.d.mul_vector(u)?;
        Ok((x_next, y))
    }

    /// Marches the discrete recursion over the rows of `u` (one row per step).
    ///
    /// Returns `(Y, X)` with one row per step; row 0 of `X` is `x0` (zero when
    /// absent).
    pub fn simulate(&self, u: &RMatrix, x0: Option<&RVector>) -> Result<(RMatrix, RMatrix)> {
        if u.ncols() != self.inputs() {
            return Err(LinssError::dims(
                "simulate",
                format!("input history has {} columns for {} inputs", u.ncols(), self.inputs()),
            ));
        }
        let steps = u.nrows();
        let mut x = match x0 {
            Some(x0) if x0.len() != self.states() => {
                return Err(LinssError::dims(
                    "simulate",
                    format!("initial state has length {} for {} states", x0.len(), self.states()),
                ))
            }
            Some(x0) => x0.clone(),
            None => RVector::zeros(self.states()),
        };
        let mut xs = RMatrix::zeros(steps, self.states());
        let mut ys = RMatrix::zeros(steps, self.outputs());
        for k in 0..steps {
            let uk = u.row(k).transpose();
            let (x_next, y) = self.solve_step(&x, &uk)?;
            xs.set_row(k, &x.transpose());
            ys.set_row(k, &y.transpose());
            x = x_next;
        }
        Ok((ys, xs))
    }

    /// Bilinear transform to continuous time (see [`discretize::disc2cont`]).
    pub fn disc2cont(&self) -> Result<Self> {
        discretize::disc2cont(self)
    }

    /// In-place form of [`StateSpace::disc2cont`].
    pub fn disc2cont_in_place(&mut self) -> Result<()> {
        *self = discretize::disc2cont(self)?;
        Ok(())
    }

    /// Inverse bilinear transform with sampling interval `dt`.
    pub fn cont2disc(&self, dt: Scalar) -> Result<Self> {
        discretize::cont2disc(self, dt)
    }

    /// Copy with every matrix converted to `repr`.
    #[must_use]
    pub fn to_representation(&self, repr: Representation) -> Self {
        debug!(?repr, states = self.states(), "converting state-space storage");
        Self {
            a: self.a.clone().into_representation(repr),
            b: self.b.clone().into_representation(repr),
            c: self.c.clone().into_representation(repr),
            d: self.d.clone().into_representation(repr),
            dt: self.dt,
            dims: self.dims,
        }
    }

    /// Dense copies of `(A, B, C, D)`.
    #[must_use]
    pub fn dense_matrices(&self) -> (RMatrix, RMatrix, RMatrix, RMatrix) {
        (self.a.to_dense(), self.b.to_dense(), self.c.to_dense(), self.d.to_dense())
    }

    /// Static gain model `y = K u` with no states.
    pub fn from_gain(k: Matrix, dt: Option<Scalar>) -> Result<Self> {
        let repr = k.representation();
        let (p, m) = k.shape();
        Self::new(
            Matrix::zeros(0, 0, repr),
            Matrix::zeros(0, m, repr),
            Matrix::zeros(p, 0, repr),
            k,
            dt,
        )
    }
}

impl fmt::Display for StateSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State-space system")?;
        writeln!(f, "States: {}", self.states())?;
        writeln!(f, "Inputs: {}", self.inputs())?;
        writeln!(f, "Outputs: {}", self.outputs())?;
        match self.dt {
            Some(dt) => write!(f, "Sampling interval: {dt}"),
            None => write!(f, "Continuous-time"),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex;

    use super::*;
    use crate::testing::random_ss;

    #[test]
    fn shapes_are_validated_at_construction() {
        let a = RMatrix::zeros(2, 2);
        let bad_b = RMatrix::zeros(3, 1);
        let err = StateSpace::continuous(a.clone(), bad_b, RMatrix::zeros(1, 2), RMatrix::zeros(1, 1)).unwrap_err();
        assert!(err.to_string().contains("B has 3 rows"));

        let err = StateSpace::continuous(a.clone(), RMatrix::zeros(2, 1), RMatrix::zeros(1, 2), RMatrix::zeros(1, 2))
            .unwrap_err();
        assert!(err.to_string().contains("D has 2 columns"));

        let err = StateSpace::discrete(a, RMatrix::zeros(2, 1), RMatrix::zeros(1, 2), RMatrix::zeros(1, 1), -0.1)
            .unwrap_err();
        assert!(matches!(err, LinssError::InvalidArgument(_)));
    }

    #[test]
    fn vector_input_matrix_is_a_single_column() {
        let ss = StateSpace::continuous(
            RMatrix::identity(3, 3),
            RVector::from_vec(vec![1.0, 2.0, 3.0]),
            RMatrix::zeros(2, 3),
            RMatrix::zeros(2, 1),
        )
        .unwrap();
        assert_eq!(ss.inputs(), 1);
        assert_eq!(ss.b().shape(), (3, 1));
    }

    #[test]
    fn dimensions_follow_every_mutation() {
        let mut ss = random_ss(6, 3, 4, Some(0.1), 11);
        let check = |ss: &StateSpace| {
            assert_eq!(ss.states(), ss.a().nrows());
            assert_eq!(ss.inputs(), ss.b().ncols());
            assert_eq!(ss.outputs(), ss.c().nrows());
            assert_eq!(ss.dimensions(), Dimensions::derive(ss.a(), ss.b(), ss.c(), ss.d()).unwrap());
        };
        check(&ss);
        ss.add_gain(&Matrix::Dense(RMatrix::from_element(3, 5, 0.5)), Side::Input).unwrap();
        check(&ss);
        assert_eq!(ss.inputs(), 5);
        ss.add_gain(&Matrix::Dense(RMatrix::from_element(2, 4, 0.5)), Side::Output).unwrap();
        check(&ss);
        assert_eq!(ss.outputs(), 2);
        ss.truncate(4).unwrap();
        check(&ss);
        ss.remove_inout_channels(&[4, 0], Side::Input).unwrap();
        check(&ss);
        assert_eq!(ss.inputs(), 2);
        let wt = Matrix::Dense(RMatrix::from_fn(2, 4, |i, j| if i == j { 1.0 } else { 0.0 }));
        ss.project(&wt, &wt.transpose()).unwrap();
        check(&ss);
        assert_eq!(ss.states(), 2);
    }

    #[test]
    fn failed_mutation_leaves_model_untouched() {
        let mut ss = random_ss(3, 2, 2, Some(0.1), 3);
        let before = ss.a().to_dense();
        assert!(ss.add_gain(&Matrix::Dense(RMatrix::zeros(3, 3)), Side::Input).is_err());
        assert!(ss.truncate(0).is_err());
        assert!(ss.truncate(4).is_err());
        assert_eq!(ss.a().to_dense(), before);
        assert_eq!(ss.inputs(), 2);
    }

    #[test]
    fn truncate_keeps_leading_block() {
        let ss = random_ss(5, 2, 3, Some(0.2), 5);
        let t = ss.truncated(3).unwrap();
        assert_eq!(t.a().to_dense(), ss.a().to_dense().view((0, 0), (3, 3)).into_owned());
        assert_eq!(t.b().to_dense(), ss.b().to_dense().rows(0, 3).into_owned());
        assert_eq!(t.c().to_dense(), ss.c().to_dense().columns(0, 3).into_owned());
        assert_eq!(ss.states(), 5);
    }

    #[test]
    fn identity_projection_is_exact() {
        let ss = random_ss(4, 2, 3, None, 9);
        let eye = Matrix::Dense(RMatrix::identity(4, 4));
        let p = ss.projected(&eye, &eye).unwrap();
        assert_eq!(p.a().to_dense(), ss.a().to_dense());
        assert_eq!(p.b().to_dense(), ss.b().to_dense());
        assert_eq!(p.c().to_dense(), ss.c().to_dense());
    }

    #[test]
    fn scaling_rescales_the_transfer_function() {
        let ss = random_ss(4, 2, 3, Some(0.1), 21);
        let u_ref = vec![2.0, 0.5];
        let y_ref = vec![1.5, 3.0, 0.25];
        let scaled = ss.scaled(u_ref.clone(), y_ref.clone(), 7.0).unwrap();
        let z = Complex::from_polar(1.0, 0.3);
        let h = ss.transfer_function_evaluation(z).unwrap();
        let hs = scaled.transfer_function_evaluation(z).unwrap();
        for i in 0..3 {
            for j in 0..2 {
                let expected = h[(i, j)] * u_ref[j] / y_ref[i];
                assert_relative_eq!(hs[(i, j)].re, expected.re, epsilon = 1e-12);
                assert_relative_eq!(hs[(i, j)].im, expected.im, epsilon = 1e-12);
            }
        }
        assert!(ss.scaled(vec![1.0], 1.0, 1.0).is_err());
        assert!(ss.scaled(0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn state_scaling_leaves_a_untouched() {
        let ss = random_ss(3, 2, 2, Some(0.1), 23);
        let x_ref = vec![2.0, 0.5, 4.0];
        let scaled = ss.scaled(1.0, 1.0, x_ref.clone()).unwrap();
        assert_eq!(scaled.a().to_dense(), ss.a().to_dense());

        let (b, bs) = (ss.b().to_dense(), scaled.b().to_dense());
        let (c, cs) = (ss.c().to_dense(), scaled.c().to_dense());
        for i in 0..3 {
            for j in 0..2 {
                assert_relative_eq!(bs[(i, j)], b[(i, j)] / x_ref[i], epsilon = 1e-14);
                assert_relative_eq!(cs[(j, i)], c[(j, i)] * x_ref[i], epsilon = 1e-14);
            }
        }
        assert_eq!(scaled.d().to_dense(), ss.d().to_dense());
    }

    #[test]
    fn transfer_function_evaluation_honours_pivot_tolerance() {
        // s = 1 makes sI - A singular for A = I
        let ss = StateSpace::continuous(
            RMatrix::identity(2, 2),
            RMatrix::identity(2, 1),
            RMatrix::identity(1, 2),
            RMatrix::zeros(1, 1),
        )
        .unwrap();
        let config = NumericConfig::default();
        assert!(ss.transfer_function_evaluation_with(Complex::new(1.0, 0.0), &config).is_err());
        let h = ss.transfer_function_evaluation_with(Complex::new(3.0, 0.0), &config).unwrap();
        assert_relative_eq!(h[(0, 0)].re, 0.5, epsilon = 1e-14);
    }

    #[test]
    fn eigenvalues_are_ordered() {
        let a = RMatrix::from_diagonal(&RVector::from_vec(vec![-0.9, 0.2, -0.5]));
        let b = RMatrix::zeros(3, 1);
        let c = RMatrix::zeros(1, 3);
        let d = RMatrix::zeros(1, 1);
        let disc = StateSpace::discrete(a.clone(), b.clone(), c.clone(), d.clone(), 0.1).unwrap();
        for (z, expected) in disc.eigvals().iter().zip([0.2, 0.5, 0.9]) {
            assert_relative_eq!(z.norm(), expected, epsilon = 1e-12);
        }
        assert_relative_eq!(disc.max_eig().unwrap(), 0.9, epsilon = 1e-12);

        let cont = StateSpace::continuous(a, b, c, d).unwrap();
        for (z, expected) in cont.eigvals().iter().zip([-0.9, -0.5, 0.2]) {
            assert_relative_eq!(z.re, expected, epsilon = 1e-12);
        }
        assert_relative_eq!(cont.max_eig().unwrap(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn simulate_matches_manual_recursion() {
        let ss = random_ss(3, 2, 2, Some(0.1), 4);
        let u = RMatrix::from_fn(6, 2, |k, j| ((k + j) as f64).cos());
        let x0 = RVector::from_vec(vec![0.1, -0.2, 0.3]);
        let (ys, xs) = ss.simulate(&u, Some(&x0)).unwrap();
        let (a, b, c, d) = ss.dense_matrices();
        let mut x = x0;
        for k in 0..6 {
            let uk = u.row(k).transpose();
            let y = &c * &x + &d * &uk;
            assert_relative_eq!(ys.row(k).transpose(), y, epsilon = 1e-12);
            assert_relative_eq!(xs.row(k).transpose(), x.clone(), epsilon = 1e-12);
            x = &a * &x + &b * &uk;
        }
    }

    #[test]
    fn sparse_storage_gives_the_same_transfer_function() {
        let ss = random_ss(5, 2, 3, Some(0.05), 17);
        let sparse = ss.to_representation(Representation::Sparse);
        assert!(sparse.a().is_sparse());
        let z = Complex::from_polar(1.0, 1.1);
        let h = ss.transfer_function_evaluation(z).unwrap();
        let hs = sparse.transfer_function_evaluation(z).unwrap();
        assert!((h - hs).camax() < 1e-12);

        let x = RVector::from_element(5, 1.0);
        let u = RVector::from_element(2, -1.0);
        let (x1, y1) = ss.solve_step(&x, &u).unwrap();
        let (x2, y2) = sparse.solve_step(&x, &u).unwrap();
        assert_relative_eq!(x1, x2, epsilon = 1e-14);
        assert_relative_eq!(y1, y2, epsilon = 1e-14);
    }

    #[test]
    fn display_summarises_the_model() {
        let ss = random_ss(2, 1, 3, Some(0.5), 1);
        let text = ss.to_string();
        assert!(text.contains("States: 2"));
        assert!(text.contains("Outputs: 3"));
        assert!(text.contains("Sampling interval: 0.5"));
    }
}
