//! Digital Butterworth filters in state-space form.
//!
//! The design follows the usual analog-prototype route: normalized poles on
//! the left unit half-circle, frequency transformation to the requested band,
//! bilinear transform with `fs = 2` (so cut-offs are fractions of the Nyquist
//! frequency) and a controllable canonical realization of the resulting
//! transfer function. The realization does not depend on the sampling
//! interval.

use std::f64::consts::PI;

use num_complex::Complex;
use tracing::debug;

use crate::backend::{block_diag, Matrix};
use crate::builders::Realization;
use crate::errors::{LinssError, Result};
use crate::math::{CScalar, RMatrix, Scalar};

/// Band type of a Butterworth filter.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    /// Pass below the cut-off.
    #[default]
    Lowpass,
    /// Pass above the cut-off.
    Highpass,
    /// Pass between two edges.
    Bandpass,
    /// Reject between two edges.
    Bandstop,
}

/// Critical frequencies as fractions of the Nyquist frequency, in `(0, 1)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cutoff {
    /// Single edge (lowpass, highpass).
    Single(Scalar),
    /// Lower and upper edge (bandpass, bandstop).
    Band(Scalar, Scalar),
}

/// Zeros, poles and gain of a rational transfer function.
#[derive(Debug, Clone)]
struct Zpk {
    zeros: Vec<CScalar>,
    poles: Vec<CScalar>,
    gain: Scalar,
}

impl Zpk {
    fn prototype(order: usize) -> Self {
        let n = order as Scalar;
        let poles = (0..order)
            .map(|k| Complex::from_polar(1.0, PI * (2.0 * k as Scalar + n + 1.0) / (2.0 * n)))
            .collect();
        Self {
            zeros: Vec::new(),
            poles,
            gain: 1.0,
        }
    }

    fn degree(&self) -> usize {
        self.poles.len() - self.zeros.len()
    }

    fn lowpass(self, wo: Scalar) -> Self {
        let degree = self.degree() as i32;
        Self {
            zeros: self.zeros.iter().map(|z| z * wo).collect(),
            poles: self.poles.iter().map(|p| p * wo).collect(),
            gain: self.gain * wo.powi(degree),
        }
    }

    fn highpass(self, wo: Scalar) -> Self {
        let degree = self.degree();
        let ratio: CScalar = self.zeros.iter().map(|z| -z).product::<CScalar>() / self.poles.iter().map(|p| -p).product::<CScalar>();
        let mut zeros: Vec<CScalar> = self.zeros.iter().map(|z| wo / *z).collect();
        zeros.extend(std::iter::repeat(Complex::new(0.0, 0.0)).take(degree));
        Self {
            zeros,
            poles: self.poles.iter().map(|p| wo / *p).collect(),
            gain: self.gain * ratio.re,
        }
    }

    /// `r ± sqrt(r² - wo²)` for every root `r`, all `+` branches first.
    fn split(roots: &[CScalar], wo: Scalar) -> Vec<CScalar> {
        let branch = |sign: Scalar| roots.iter().map(move |r| r + sign * (r * r - wo * wo).sqrt());
        branch(1.0).chain(branch(-1.0)).collect()
    }

    fn bandpass(self, wo: Scalar, bw: Scalar) -> Self {
        let degree = self.degree();
        let scaled = |roots: &[CScalar]| roots.iter().map(|r| r * (bw / 2.0)).collect::<Vec<_>>();
        let mut zeros = Self::split(&scaled(self.zeros.as_slice()), wo);
        zeros.extend(std::iter::repeat(Complex::new(0.0, 0.0)).take(degree));
        Self {
            zeros,
            poles: Self::split(&scaled(self.poles.as_slice()), wo),
            gain: self.gain * bw.powi(degree as i32),
        }
    }

    fn bandstop(self, wo: Scalar, bw: Scalar) -> Self {
        let degree = self.degree();
        let ratio: CScalar = self.zeros.iter().map(|z| -z).product::<CScalar>() / self.poles.iter().map(|p| -p).product::<CScalar>();
        let inverted = |roots: &[CScalar]| roots.iter().map(|r| (bw / 2.0) / *r).collect::<Vec<_>>();
        let mut zeros = Self::split(&inverted(self.zeros.as_slice()), wo);
        zeros.extend(std::iter::repeat(Complex::new(0.0, wo)).take(degree));
        zeros.extend(std::iter::repeat(Complex::new(0.0, -wo)).take(degree));
        Self {
            zeros,
            poles: Self::split(&inverted(self.poles.as_slice()), wo),
            gain: self.gain * ratio.re,
        }
    }

    /// Bilinear map `z = (4 + s)/(4 - s)`; missing zeros go to `z = -1`.
    fn bilinear(self) -> Self {
        const FS2: Scalar = 4.0;
        let degree = self.degree();
        let ratio: CScalar = self.zeros.iter().map(|z| FS2 - *z).product::<CScalar>()
            / self.poles.iter().map(|p| FS2 - *p).product::<CScalar>();
        let mut zeros: Vec<CScalar> = self.zeros.iter().map(|z| (FS2 + *z) / (FS2 - *z)).collect();
        zeros.extend(std::iter::repeat(Complex::new(-1.0, 0.0)).take(degree));
        Self {
            zeros,
            poles: self.poles.iter().map(|p| (FS2 + *p) / (FS2 - *p)).collect(),
            gain: self.gain * ratio.re,
        }
    }

    /// Numerator and denominator coefficients, highest power first.
    fn to_tf(&self) -> (Vec<Scalar>, Vec<Scalar>) {
        let num = poly(&self.zeros).into_iter().map(|c| c.re * self.gain).collect();
        let den = poly(&self.poles).into_iter().map(|c| c.re).collect();
        (num, den)
    }
}

/// Monic polynomial with the given roots, highest power first.
fn poly(roots: &[CScalar]) -> Vec<CScalar> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for r in roots {
        let mut next = coeffs.clone();
        next.push(Complex::new(0.0, 0.0));
        for (k, c) in coeffs.iter().enumerate() {
            next[k + 1] -= r * c;
        }
        coeffs = next;
    }
    coeffs
}

/// Controllable canonical realization of `num(z)/den(z)` with
/// `deg num ≤ deg den`.
fn tf2ss(num: &[Scalar], den: &[Scalar]) -> Result<Realization> {
    let lead = den
        .first()
        .copied()
        .filter(|&v| v != 0.0)
        .ok_or_else(|| LinssError::InvalidArgument("denominator must have a nonzero leading coefficient".into()))?;
    if num.len() > den.len() {
        return Err(LinssError::InvalidArgument("improper transfer function".into()));
    }
    let den: Vec<Scalar> = den.iter().map(|v| v / lead).collect();
    let mut padded = vec![0.0; den.len() - num.len()];
    padded.extend(num.iter().map(|v| v / lead));

    let n = den.len() - 1;
    let d0 = padded[0];
    let mut a = RMatrix::zeros(n, n);
    for j in 0..n {
        a[(0, j)] = -den[j + 1];
    }
    for i in 1..n {
        a[(i, i - 1)] = 1.0;
    }
    let mut b = RMatrix::zeros(n, 1);
    if n > 0 {
        b[(0, 0)] = 1.0;
    }
    let c = RMatrix::from_fn(1, n, |_, j| padded[j + 1] - d0 * den[j + 1]);
    Ok(Realization {
        a,
        b,
        c,
        d: RMatrix::from_element(1, 1, d0),
    })
}

fn check_edge(w: Scalar) -> Result<Scalar> {
    if w > 0.0 && w < 1.0 {
        Ok(w)
    } else {
        Err(LinssError::InvalidArgument(format!(
            "critical frequency {w} must lie strictly between 0 and 1 (Nyquist)"
        )))
    }
}

/// Pre-warped analog frequency of a normalized digital edge.
fn warp(w: Scalar) -> Scalar {
    4.0 * (PI * w / 2.0).tan()
}

/// Digital Butterworth filter of the given order, replicated block-diagonally
/// over `replicas` independent channels (`replicas` inputs and outputs).
///
/// Lowpass and highpass filters have `order` states per channel, bandpass and
/// bandstop filters `2 * order`.
pub fn butter(order: usize, cutoff: Cutoff, replicas: usize, kind: FilterKind) -> Result<Realization> {
    if order == 0 {
        return Err(LinssError::InvalidArgument("filter order must be positive".into()));
    }
    if replicas == 0 {
        return Err(LinssError::InvalidArgument("at least one filter channel is required".into()));
    }
    let prototype = Zpk::prototype(order);
    let analog = match (kind, cutoff) {
        (FilterKind::Lowpass, Cutoff::Single(w)) => prototype.lowpass(warp(check_edge(w)?)),
        (FilterKind::Highpass, Cutoff::Single(w)) => prototype.highpass(warp(check_edge(w)?)),
        (FilterKind::Bandpass | FilterKind::Bandstop, Cutoff::Band(lo, hi)) => {
            let (lo, hi) = (check_edge(lo)?, check_edge(hi)?);
            if lo >= hi {
                return Err(LinssError::InvalidArgument(format!("band edges [{lo}, {hi}] are not increasing")));
            }
            let (wl, wh) = (warp(lo), warp(hi));
            let (wo, bw) = ((wl * wh).sqrt(), wh - wl);
            if kind == FilterKind::Bandpass {
                prototype.bandpass(wo, bw)
            } else {
                prototype.bandstop(wo, bw)
            }
        }
        (kind, cutoff) => {
            return Err(LinssError::InvalidArgument(format!("{kind:?} filter cannot use cut-off {cutoff:?}")));
        }
    };
    let (num, den) = analog.bilinear().to_tf();
    let single = tf2ss(&num, &den)?;
    debug!(order, ?kind, replicas, "butterworth filter designed");
    if replicas == 1 {
        return Ok(single);
    }

    let parts = [single.a, single.b, single.c, single.d].map(Matrix::Dense);
    let replicate = |m: &Matrix| block_diag(&vec![m; replicas]).to_dense();
    Ok(Realization {
        a: replicate(&parts[0]),
        b: replicate(&parts[1]),
        c: replicate(&parts[2]),
        d: replicate(&parts[3]),
    })
}
