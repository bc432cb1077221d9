//! Frequency grids and post-processing of response traces.

use tracing::debug;

use crate::config::NumericConfig;
use crate::errors::{LinssError, Result};
use crate::math::{CScalar, Scalar};

/// Angle unit of a phase trace.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseUnit {
    /// Degrees; one period is 360.
    #[default]
    Degrees,
    /// Radians; one period is 2π.
    Radians,
}

impl PhaseUnit {
    /// Length of one full period in this unit.
    #[must_use]
    pub fn period(self) -> Scalar {
        match self {
            Self::Degrees => 360.0,
            Self::Radians => std::f64::consts::TAU,
        }
    }
}

/// Generates `n` linearly spaced samples in [start, stop].
#[must_use]
pub fn linspace(start: Scalar, stop: Scalar, n: usize) -> Vec<Scalar> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n as Scalar - 1.0);
            (0..n).map(|i| start + step * i as Scalar).collect()
        }
    }
}

/// Generates `n` logarithmically spaced samples between `start` and `stop`.
/// Both bounds must be positive.
pub fn logspace(start: Scalar, stop: Scalar, n: usize) -> Result<Vec<Scalar>> {
    if !(start > 0.0 && stop > 0.0) {
        return Err(LinssError::InvalidArgument(format!(
            "logspace bounds must be positive, got [{start}, {stop}]"
        )));
    }
    Ok(linspace(start.log10(), stop.log10(), n)
        .into_iter()
        .map(|e| 10f64.powf(e))
        .collect())
}

/// Magnitude of complex sequence.
#[must_use]
pub fn mag(values: impl IntoIterator<Item = CScalar>) -> Vec<Scalar> {
    values.into_iter().map(|v| v.norm()).collect()
}

/// Magnitude in dB (20*log10(|x|)), clamping very small values.
#[must_use]
pub fn mag_db(values: impl IntoIterator<Item = CScalar>) -> Vec<Scalar> {
    const MIN: Scalar = 1e-300;
    values
        .into_iter()
        .map(|v| 20.0 * (v.norm().max(MIN)).log10())
        .collect()
}

/// Phase of complex sequence in the requested unit, in (-π, π] before conversion.
#[must_use]
pub fn phase(values: impl IntoIterator<Item = CScalar>, unit: PhaseUnit) -> Vec<Scalar> {
    values
        .into_iter()
        .map(|v| match unit {
            PhaseUnit::Degrees => v.arg().to_degrees(),
            PhaseUnit::Radians => v.arg(),
        })
        .collect()
}

/// Removes wrap-around jumps from a phase trace; see [`adjust_phase_with`].
pub fn adjust_phase(values: &mut [Scalar], unit: PhaseUnit) {
    adjust_phase_with(values, unit, &NumericConfig::default());
}

/// Removes wrap-around jumps from a phase trace.
///
/// Whenever two consecutive samples differ by more than
/// `config.phase_jump_fraction` of a period, every later sample is shifted by
/// one period against the jump.
pub fn adjust_phase_with(values: &mut [Scalar], unit: PhaseUnit, config: &NumericConfig) {
    let period = unit.period();
    let threshold = config.phase_jump_fraction * period;
    for k in 1..values.len() {
        let step = values[k] - values[k - 1];
        let shift = if step > threshold {
            -period
        } else if step < -threshold {
            period
        } else {
            continue;
        };
        debug!(sample = k, shift, "unwrapping phase jump");
        for v in &mut values[k..] {
            *v += shift;
        }
    }
}
