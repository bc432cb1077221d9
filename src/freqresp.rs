//! Frequency-response evaluation and norms.
//!
//! At each frequency the resolvent system `(zI - A) X = B` is solved and the
//! response is `Y = C X + D`, with `z = e^(jω dt)` in the discrete domain and
//! `z = jω` in the continuous one. Sparse `A` goes through [`SparseLu`]: the
//! symbolic phase runs once for the whole sweep since `zI - A` keeps the
//! pattern of `A` plus the diagonal.

use nalgebra_sparse::csc::CscMatrix;
use num_complex::Complex;
use tracing::{debug, trace};

use crate::backend::solver::{SolverError, SparseLu, SparseSolver};
use crate::backend::{lu_solve_dense, singular_to_failure, Matrix};
use crate::config::NumericConfig;
use crate::errors::{LinssError, Result};
use crate::math::{phasor, CMatrix, CScalar, Scalar};
use crate::statespace::StateSpace;

/// Variable in which the transfer function is evaluated.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationDomain {
    /// `z = e^(jω dt)`; needs a sampling interval.
    Discrete,
    /// `s = jω`.
    Continuous,
}

impl EvaluationDomain {
    /// Domain matching the sampling of `ss`.
    #[must_use]
    pub fn of(ss: &StateSpace) -> Self {
        if ss.is_discrete() {
            Self::Discrete
        } else {
            Self::Continuous
        }
    }
}

/// Norm computed by [`h_norm`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormKind {
    /// Root of the trapezoidal mean of `|g|²`.
    H2,
    /// Peak magnitude.
    HInfinity,
}

/// Sampled response, one `outputs × inputs` matrix per frequency.
#[derive(Debug, Clone)]
pub struct FrequencyResponse {
    omegas: Vec<Scalar>,
    values: Vec<CMatrix>,
    outputs: usize,
    inputs: usize,
}

impl FrequencyResponse {
    /// Frequencies of the sweep.
    #[must_use]
    pub fn omegas(&self) -> &[Scalar] {
        &self.omegas
    }

    /// Number of frequencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty sweep.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(outputs, inputs, frequencies)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.outputs, self.inputs, self.values.len())
    }

    /// Response matrix at frequency index `k`.
    #[must_use]
    pub fn at(&self, k: usize) -> Option<&CMatrix> {
        self.values.get(k)
    }

    /// Single entry `Y[output, input, k]`.
    #[must_use]
    pub fn get(&self, output: usize, input: usize, k: usize) -> Option<CScalar> {
        let m = self.values.get(k)?;
        (output < self.outputs && input < self.inputs).then(|| m[(output, input)])
    }

    /// Iterator over the per-frequency matrices.
    pub fn iter(&self) -> impl Iterator<Item = &CMatrix> {
        self.values.iter()
    }

    /// Trace of one input/output channel over the sweep.
    pub fn channel(&self, output: usize, input: usize) -> Result<Vec<CScalar>> {
        if output >= self.outputs || input >= self.inputs {
            return Err(LinssError::InvalidArgument(format!(
                "channel ({output}, {input}) outside a {}x{} response",
                self.outputs, self.inputs
            )));
        }
        Ok(self.values.iter().map(|m| m[(output, input)]).collect())
    }

    /// Trace of a single-input single-output response.
    pub fn siso(&self) -> Result<Vec<CScalar>> {
        if (self.outputs, self.inputs) != (1, 1) {
            return Err(LinssError::InvalidArgument(format!(
                "response is {}x{}, not single-input single-output",
                self.outputs, self.inputs
            )));
        }
        self.channel(0, 0)
    }
}

/// Frequency response with the default [`NumericConfig`].
pub fn freqresp(ss: &StateSpace, omegas: &[Scalar], domain: EvaluationDomain) -> Result<FrequencyResponse> {
    freqresp_with(ss, omegas, domain, &NumericConfig::default())
}

/// Frequency response of `ss` at the angular frequencies `omegas`.
///
/// Fails when the discrete domain is requested for a continuous model or when
/// `zI - A` is singular at one of the frequencies.
pub fn freqresp_with(
    ss: &StateSpace,
    omegas: &[Scalar],
    domain: EvaluationDomain,
    config: &NumericConfig,
) -> Result<FrequencyResponse> {
    let point: Box<dyn Fn(Scalar) -> CScalar> = match domain {
        EvaluationDomain::Continuous => Box::new(|w: Scalar| Complex::new(0.0, w)),
        EvaluationDomain::Discrete => {
            let dt = ss.dt().ok_or_else(|| {
                LinssError::InvalidArgument("discrete-domain response of a continuous-time model".into())
            })?;
            Box::new(move |w: Scalar| phasor(w * dt))
        }
    };

    let b = ss.b().to_complex();
    let c = ss.c().to_complex();
    let d = ss.d().to_complex();
    let points: Vec<CScalar> = omegas.iter().map(|&w| point(w)).collect();

    let resolvents = match ss.a() {
        Matrix::Sparse(a) if ss.states() > 0 => sparse_sweep(a, &b, &points, config)?,
        a => dense_sweep(a, &b, &points, config)?,
    };
    let values = resolvents.into_iter().map(|x| &c * x + &d).collect();
    Ok(FrequencyResponse {
        omegas: omegas.to_vec(),
        values,
        outputs: ss.outputs(),
        inputs: ss.inputs(),
    })
}

fn singular_at(point: CScalar) -> impl Fn(LinssError) -> LinssError {
    move |e| match e {
        LinssError::NumericalFailure(msg) => {
            LinssError::NumericalFailure(format!("resolvent singular at z = {point}: {msg}"))
        }
        other => other,
    }
}

fn dense_sweep(a: &Matrix, b: &CMatrix, points: &[CScalar], config: &NumericConfig) -> Result<Vec<CMatrix>> {
    let a = a.to_complex();
    let n = a.nrows();
    debug!(states = n, frequencies = points.len(), "dense frequency sweep");
    points
        .iter()
        .map(|&z| lu_solve_dense(CMatrix::from_diagonal_element(n, n, z) - &a, b, config.pivot_tol).map_err(singular_at(z)))
        .collect()
}

/// `zI - A` with a fixed pattern; only the diagonal values change with `z`.
struct Resolvent {
    matrix: CscMatrix<CScalar>,
    diagonal: Vec<(usize, CScalar)>,
}

impl Resolvent {
    fn new(a: &CscMatrix<Scalar>) -> Result<Self> {
        let n = a.nrows();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut rows = Vec::with_capacity(a.nnz() + n);
        let mut values = Vec::with_capacity(a.nnz() + n);
        let mut diagonal = Vec::with_capacity(n);
        offsets.push(0);
        for j in 0..n {
            let col = a.col(j);
            let mut entries: Vec<(usize, Scalar)> = col.row_indices().iter().copied().zip(col.values().iter().copied()).collect();
            if !entries.iter().any(|&(i, _)| i == j) {
                entries.push((j, 0.0));
                entries.sort_unstable_by_key(|&(i, _)| i);
            }
            for (i, v) in entries {
                if i == j {
                    diagonal.push((values.len(), Complex::new(-v, 0.0)));
                }
                rows.push(i);
                values.push(Complex::new(-v, 0.0));
            }
            offsets.push(rows.len());
        }
        let matrix = CscMatrix::try_from_csc_data(n, n, offsets, rows, values)
            .map_err(|e| SolverError::InvalidMatrix(e.to_string()))?;
        Ok(Self { matrix, diagonal })
    }

    fn at(&mut self, z: CScalar) -> &CscMatrix<CScalar> {
        let values = self.matrix.values_mut();
        for &(k, base) in &self.diagonal {
            values[k] = base + z;
        }
        &self.matrix
    }
}

fn sparse_sweep(a: &CscMatrix<Scalar>, b: &CMatrix, points: &[CScalar], config: &NumericConfig) -> Result<Vec<CMatrix>> {
    let mut resolvent = Resolvent::new(a)?;
    let mut lu = SparseLu::<CScalar>::from_config(config);
    let Some(&first) = points.first() else {
        return Ok(Vec::new());
    };
    lu.symbolic(resolvent.at(first))?;
    debug!(
        states = a.nrows(),
        nnz = a.nnz(),
        frequencies = points.len(),
        "sparse frequency sweep"
    );

    let mut out = Vec::with_capacity(points.len());
    for &z in points {
        lu.numeric(resolvent.at(z))
            .map_err(singular_to_failure)
            .map_err(singular_at(z))?;
        let stats = lu.stats();
        trace!(nnz_factor = stats.nnz_factor, cond = ?stats.condition_estimate, "resolvent factored");
        out.push(lu.solve_matrix(b)?);
    }
    Ok(out)
}

/// H2 or H∞ norm of a single-input single-output trace.
///
/// The H2 norm is `sqrt(trapz(|g|² / (N - 1)))` with unit sample spacing and
/// needs at least two samples. Magnitudes are accumulated in real arithmetic,
/// so the result is real; a non-finite result (infinite or NaN samples) is an
/// [`LinssError::InvariantViolation`].
pub fn h_norm(trace: &[CScalar], kind: NormKind) -> Result<Scalar> {
    let norm = match kind {
        NormKind::H2 => {
            if trace.len() < 2 {
                return Err(LinssError::InvalidArgument(format!(
                    "H2 norm needs at least two samples, got {}",
                    trace.len()
                )));
            }
            let weight = 1.0 / (trace.len() as Scalar - 1.0);
            let energy: Vec<Scalar> = trace.iter().map(|g| g.norm_sqr() * weight).collect();
            let area: Scalar = energy.windows(2).map(|w| (w[0] + w[1]) * 0.5).sum();
            area.sqrt()
        }
        NormKind::HInfinity => trace
            .iter()
            .map(|g| g.norm())
            .reduce(Scalar::max)
            .ok_or_else(|| LinssError::InvalidArgument("H-infinity norm of an empty trace".into()))?,
    };
    if !norm.is_finite() {
        return Err(LinssError::InvariantViolation(format!("{kind:?} norm is not finite: {norm}")));
    }
    Ok(norm)
}

/// Natural frequencies of eigenvalues: `arg(λ)/2π` for discrete models
/// (cycles per sample; multiply by `1/dt` for Hertz) or `|Im λ|` otherwise.
#[must_use]
pub fn get_freq_from_eigs(eigs: &[CScalar], discrete: bool) -> Vec<Scalar> {
    eigs.iter()
        .map(|l| {
            if discrete {
                0.5 * l.arg() / std::f64::consts::PI
            } else {
                l.im.abs()
            }
        })
        .collect()
}

impl StateSpace {
    /// Frequency response in the domain matching the model's sampling.
    pub fn freqresp(&self, omegas: &[Scalar]) -> Result<FrequencyResponse> {
        freqresp(self, omegas, EvaluationDomain::of(self))
    }
}
