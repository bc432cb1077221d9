//! Interconnection of state-space models.
//!
//! Every function here builds a new model and leaves its operands untouched.
//! Composite states are the concatenation `[x₁; x₂; …]` of the operand states.

use tracing::debug;

use crate::backend::block::{hstack, vstack, BlockMatrix};
use crate::backend::{add, block_diag, dot, eye_as, solve_with, sub, Matrix, Representation};
use crate::config::NumericConfig;
use crate::errors::{LinssError, Result};
use crate::math::{same_sampling, Scalar};
use crate::statespace::{Side, StateSpace};

/// Either a static gain (no states) or a dynamic model.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Static map `y = K u`.
    Gain(Matrix),
    /// Dynamic model.
    System(StateSpace),
}

impl From<Matrix> for Operand {
    fn from(k: Matrix) -> Self {
        Self::Gain(k)
    }
}

impl From<StateSpace> for Operand {
    fn from(ss: StateSpace) -> Self {
        Self::System(ss)
    }
}

impl Operand {
    /// Input count.
    #[must_use]
    pub fn inputs(&self) -> usize {
        match self {
            Self::Gain(k) => k.ncols(),
            Self::System(ss) => ss.inputs(),
        }
    }

    /// Output count.
    #[must_use]
    pub fn outputs(&self) -> usize {
        match self {
            Self::Gain(k) => k.nrows(),
            Self::System(ss) => ss.outputs(),
        }
    }

    /// The model, if this operand is dynamic.
    #[must_use]
    pub fn as_system(&self) -> Option<&StateSpace> {
        match self {
            Self::System(ss) => Some(ss),
            Self::Gain(_) => None,
        }
    }

    /// The gain, if this operand is static.
    #[must_use]
    pub fn as_gain(&self) -> Option<&Matrix> {
        match self {
            Self::Gain(k) => Some(k),
            Self::System(_) => None,
        }
    }

    fn to_system(&self, dt: Option<Scalar>) -> Result<StateSpace> {
        match self {
            Self::Gain(k) => StateSpace::from_gain(k.clone(), dt),
            Self::System(ss) => Ok(ss.clone()),
        }
    }
}

/// Where [`add_gain`] places a static gain `K`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainPlacement {
    /// `u = K u_new`.
    Input,
    /// `y_new = K y`.
    Output,
    /// Extra inputs appended after the model's own, fed through `K` to the output:
    /// `B = [B 0]`, `D = [D K]`.
    ParallelDown,
    /// Extra inputs prepended before the model's own: `B = [0 B]`, `D = [K D]`.
    ParallelUp,
}

/// Options for [`couple_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoupleOptions {
    /// Storage of the coupled model; only dense output is supported.
    pub output: Representation,
    /// Tolerances.
    pub config: NumericConfig,
}

impl Default for CoupleOptions {
    fn default() -> Self {
        Self {
            output: Representation::Dense,
            config: NumericConfig::default(),
        }
    }
}

fn check_sampling(operation: &'static str, first: Option<Scalar>, second: Option<Scalar>, config: &NumericConfig) -> Result<()> {
    if same_sampling(first, second, config.sampling_rel_tol) {
        Ok(())
    } else {
        Err(LinssError::SamplingMismatch {
            operation,
            first,
            second,
        })
    }
}

fn singular_loop(which: &'static str) -> impl Fn(LinssError) -> LinssError {
    move |e| match e {
        LinssError::NumericalFailure(msg) => LinssError::NumericalFailure(format!("couple: {which} is singular ({msg})")),
        other => other,
    }
}

fn dot3(x: &Matrix, y: &Matrix, z: &Matrix) -> Result<Matrix> {
    dot(&dot(x, y)?, z)
}

/// Assembles a block grid whose row and column sizes are all known.
fn grid(blocks: Vec<Vec<Option<Matrix>>>, rows: &[usize], cols: &[usize], repr: Option<Representation>) -> Result<Matrix> {
    let grid = BlockMatrix::new(blocks)?;
    let repr = repr.unwrap_or_else(|| grid.preferred_representation());
    grid.assemble(rows, cols, repr)
}

/// Loop-resolved coupling gains of [`couple`].
struct Coupling {
    c11: Matrix,
    c12: Matrix,
    c21: Matrix,
    c22: Matrix,
}

impl Coupling {
    /// `[[base₁ + L₁ c₁₁ R₁, L₁ c₁₂ R₂], [L₂ c₂₁ R₁, base₂ + L₂ c₂₂ R₂]]`.
    fn combine(&self, base: [&Matrix; 2], left: [&Matrix; 2], right: [&Matrix; 2]) -> Result<Matrix> {
        let b11 = add(base[0], &dot3(left[0], &self.c11, right[0])?)?;
        let b12 = dot3(left[0], &self.c12, right[1])?;
        let b21 = dot3(left[1], &self.c21, right[0])?;
        let b22 = add(base[1], &dot3(left[1], &self.c22, right[1])?)?;
        let rows = [base[0].nrows(), base[1].nrows()];
        let cols = [base[0].ncols(), base[1].ncols()];
        grid(
            vec![vec![Some(b11), Some(b12)], vec![Some(b21), Some(b22)]],
            &rows,
            &cols,
            Some(Representation::Dense),
        )
    }
}

/// Feedback coupling with default options; see [`couple_with`].
pub fn couple(ss1: &StateSpace, ss2: &StateSpace, k12: &Matrix, k21: &Matrix) -> Result<StateSpace> {
    couple_with(ss1, ss2, k12, k21, &CoupleOptions::default())
}

/// Couples two models in closed loop: `K12` feeds the outputs of `ss2` into the
/// inputs of `ss1` and `K21` the outputs of `ss1` into the inputs of `ss2`.
///
/// Inputs and outputs of the result are `[u₁; u₂]` and `[y₁; y₂]`, where `uᵢ`
/// are the external inputs added to the fed-back signals. The algebraic loop
/// through the feedthrough terms is resolved with
///
/// ```text
/// K11 = K12 D2 K21        K22 = K21 D1 K12
/// L1 = I - K11 D1         L2 = I - K22 D2
/// cpl12 = L1⁻¹ K12        cpl21 = L2⁻¹ K21
/// cpl11 = cpl12 D2 K21    cpl22 = cpl21 D1 K12
/// ```
///
/// When either feedthrough vanishes (`max |D| < zero_feedthrough_tol`) both
/// self-loops vanish, `L1 = L2 = I` and the solves are skipped.
pub fn couple_with(
    ss1: &StateSpace,
    ss2: &StateSpace,
    k12: &Matrix,
    k21: &Matrix,
    options: &CoupleOptions,
) -> Result<StateSpace> {
    if options.output == Representation::Sparse {
        return Err(LinssError::NotImplemented("sparse output of couple"));
    }
    let config = &options.config;
    check_sampling("couple", ss1.dt(), ss2.dt(), config)?;
    if k12.shape() != (ss1.inputs(), ss2.outputs()) {
        return Err(LinssError::dims(
            "couple",
            format!(
                "K12 is {}x{}, expected {}x{} (ss1 inputs x ss2 outputs)",
                k12.nrows(),
                k12.ncols(),
                ss1.inputs(),
                ss2.outputs()
            ),
        ));
    }
    if k21.shape() != (ss2.inputs(), ss1.outputs()) {
        return Err(LinssError::dims(
            "couple",
            format!(
                "K21 is {}x{}, expected {}x{} (ss2 inputs x ss1 outputs)",
                k21.nrows(),
                k21.ncols(),
                ss2.inputs(),
                ss1.outputs()
            ),
        ));
    }

    let (d1, d2) = (ss1.d(), ss2.d());
    let no_self_loop = d1.max_abs() < config.zero_feedthrough_tol || d2.max_abs() < config.zero_feedthrough_tol;
    let (c12, c21) = if no_self_loop {
        debug!("couple: vanishing feedthrough, skipping algebraic-loop solve");
        (k12.clone(), k21.clone())
    } else {
        let k11 = dot3(k12, d2, k21)?;
        let k22 = dot3(k21, d1, k12)?;
        let kd1 = dot(&k11, d1)?;
        let kd2 = dot(&k22, d2)?;
        let l1 = sub(&eye_as(&kd1), &kd1)?;
        let l2 = sub(&eye_as(&kd2), &kd2)?;
        (
            solve_with(&l1, k12, config).map_err(singular_loop("L1"))?,
            solve_with(&l2, k21, config).map_err(singular_loop("L2"))?,
        )
    };
    let cpl = Coupling {
        c11: dot3(&c12, d2, k21)?,
        c22: dot3(&c21, d1, k12)?,
        c12,
        c21,
    };

    let (a1, b1, c1) = (ss1.a(), ss1.b(), ss1.c());
    let (a2, b2, c2) = (ss2.a(), ss2.b(), ss2.c());
    let a = cpl.combine([a1, a2], [b1, b2], [c1, c2])?;
    let b = cpl.combine([b1, b2], [b1, b2], [d1, d2])?;
    let c = cpl.combine([c1, c2], [d1, d2], [c1, c2])?;
    let d = cpl.combine([d1, d2], [d1, d2], [d1, d2])?;
    StateSpace::new(a, b, c, d, ss1.dt())
}

/// Cascade `u → ss1 → ss2 → y`:
/// `A = [[A1, 0], [B2 C1, A2]]`, `B = [B1; B2 D1]`, `C = [D2 C1, C2]`, `D = D2 D1`.
pub fn series(ss1: &StateSpace, ss2: &StateSpace) -> Result<StateSpace> {
    check_sampling("series", ss1.dt(), ss2.dt(), &NumericConfig::default())?;
    if ss1.outputs() != ss2.inputs() {
        return Err(LinssError::dims(
            "series",
            format!("ss1 has {} outputs, ss2 has {} inputs", ss1.outputs(), ss2.inputs()),
        ));
    }
    let (n1, n2) = (ss1.states(), ss2.states());
    let a = grid(
        vec![
            vec![Some(ss1.a().clone()), None],
            vec![Some(dot(ss2.b(), ss1.c())?), Some(ss2.a().clone())],
        ],
        &[n1, n2],
        &[n1, n2],
        None,
    )?;
    let b = vstack(&[ss1.b(), &dot(ss2.b(), ss1.d())?])?;
    let c = hstack(&[&dot(ss2.d(), ss1.c())?, ss2.c()])?;
    let d = dot(ss2.d(), ss1.d())?;
    StateSpace::new(a, b, c, d, ss1.dt())
}

/// Parallel connection with separate inputs and summed outputs:
/// `y = y1 + y2` driven by `[u1; u2]`.
pub fn parallel(ss1: &StateSpace, ss2: &StateSpace) -> Result<StateSpace> {
    check_sampling("parallel", ss1.dt(), ss2.dt(), &NumericConfig::default())?;
    if ss1.outputs() != ss2.outputs() {
        return Err(LinssError::dims(
            "parallel",
            format!("ss1 has {} outputs, ss2 has {}", ss1.outputs(), ss2.outputs()),
        ));
    }
    let a = block_diag(&[ss1.a(), ss2.a()]);
    let b = block_diag(&[ss1.b(), ss2.b()]);
    let c = hstack(&[ss1.c(), ss2.c()])?;
    let d = hstack(&[ss1.d(), ss2.d()])?;
    StateSpace::new(a, b, c, d, ss1.dt())
}

/// Joins models driven by the same input into `y = Σ wᵢ yᵢ` (unit weights by
/// default): `A` block-diagonal, `B` stacked, `C = [w₁C₁ … w_NC_N]`, `D = Σ wᵢDᵢ`.
pub fn join(systems: &[StateSpace], weights: Option<&[Scalar]>) -> Result<StateSpace> {
    let first = systems
        .first()
        .ok_or_else(|| LinssError::InvalidArgument("join needs at least one model".into()))?;
    let unit;
    let weights = match weights {
        Some(w) if w.len() != systems.len() => {
            return Err(LinssError::dims(
                "join",
                format!("{} weights for {} models", w.len(), systems.len()),
            ))
        }
        Some(w) => w,
        None => {
            unit = vec![1.0; systems.len()];
            unit.as_slice()
        }
    };
    for (k, ss) in systems.iter().enumerate().skip(1) {
        check_sampling("join", first.dt(), ss.dt(), &NumericConfig::default())?;
        if ss.inputs() != first.inputs() || ss.outputs() != first.outputs() {
            return Err(LinssError::dims(
                "join",
                format!(
                    "model {k} is {}x{} (outputs x inputs), model 0 is {}x{}",
                    ss.outputs(),
                    ss.inputs(),
                    first.outputs(),
                    first.inputs()
                ),
            ));
        }
    }

    let a = block_diag(&systems.iter().map(StateSpace::a).collect::<Vec<_>>());
    let b = vstack(&systems.iter().map(StateSpace::b).collect::<Vec<_>>())?;
    let weighted_c: Vec<Matrix> = systems.iter().zip(weights).map(|(ss, &w)| ss.c().scale(w)).collect();
    let c = hstack(&weighted_c.iter().collect::<Vec<_>>())?;
    let mut d = first.d().scale(weights[0]);
    for (ss, &w) in systems.iter().zip(weights).skip(1) {
        d = add(&d, &ss.d().scale(w))?;
    }
    StateSpace::new(a, b, c, d, first.dt())
}

fn operand_sampling(operation: &'static str, a: &Operand, b: &Operand) -> Result<Option<Scalar>> {
    match (a, b) {
        (Operand::System(x), Operand::System(y)) => {
            check_sampling(operation, x.dt(), y.dt(), &NumericConfig::default())?;
            Ok(x.dt())
        }
        (Operand::System(x), _) | (_, Operand::System(x)) => Ok(x.dt()),
        _ => Ok(None),
    }
}

/// Stacks two operands side by side: `[u₁; u₂] → [y₁; y₂]`.
///
/// Two gains give a block-diagonal gain; any dynamic operand gives a model
/// whose matrices are all block-diagonal.
pub fn join2(first: &Operand, second: &Operand) -> Result<Operand> {
    if let (Operand::Gain(k1), Operand::Gain(k2)) = (first, second) {
        return Ok(Operand::Gain(block_diag(&[k1, k2])));
    }
    let dt = operand_sampling("join2", first, second)?;
    let (s1, s2) = (first.to_system(dt)?, second.to_system(dt)?);
    let ss = StateSpace::new(
        block_diag(&[s1.a(), s2.a()]),
        block_diag(&[s1.b(), s2.b()]),
        block_diag(&[s1.c(), s2.c()]),
        block_diag(&[s1.d(), s2.d()]),
        dt,
    )?;
    Ok(Operand::System(ss))
}

/// Sums two operands sharing inputs and outputs: `u → y₁ ± y₂`.
pub fn sum_ss(first: &Operand, second: &Operand, negative: bool) -> Result<Operand> {
    if first.inputs() != second.inputs() || first.outputs() != second.outputs() {
        return Err(LinssError::dims(
            "sum_ss",
            format!(
                "{}x{} and {}x{} (outputs x inputs)",
                first.outputs(),
                first.inputs(),
                second.outputs(),
                second.inputs()
            ),
        ));
    }
    let sign = if negative { -1.0 } else { 1.0 };
    if let (Operand::Gain(k1), Operand::Gain(k2)) = (first, second) {
        return Ok(Operand::Gain(add(k1, &k2.scale(sign))?));
    }
    let dt = operand_sampling("sum_ss", first, second)?;
    let (s1, s2) = (first.to_system(dt)?, second.to_system(dt)?);
    let ss = StateSpace::new(
        block_diag(&[s1.a(), s2.a()]),
        vstack(&[s1.b(), s2.b()])?,
        hstack(&[s1.c(), &s2.c().scale(sign)])?,
        add(s1.d(), &s2.d().scale(sign))?,
        dt,
    )?;
    Ok(Operand::System(ss))
}

/// Returns a copy of `ss` with the gain `k` placed per `placement`.
pub fn add_gain(ss: &StateSpace, k: &Matrix, placement: GainPlacement) -> Result<StateSpace> {
    let extra = |operation: &'static str| -> Result<()> {
        if k.nrows() != ss.outputs() {
            return Err(LinssError::dims(
                operation,
                format!("gain has {} rows for {} outputs", k.nrows(), ss.outputs()),
            ));
        }
        Ok(())
    };
    let (n, m, q) = (ss.states(), ss.inputs(), k.ncols());
    let (b, d) = match placement {
        GainPlacement::Input => return ss.with_gain(k, Side::Input),
        GainPlacement::Output => return ss.with_gain(k, Side::Output),
        GainPlacement::ParallelDown => {
            extra("add_gain (parallel-down)")?;
            (
                grid(vec![vec![Some(ss.b().clone()), None]], &[n], &[m, q], None)?,
                hstack(&[ss.d(), k])?,
            )
        }
        GainPlacement::ParallelUp => {
            extra("add_gain (parallel-up)")?;
            (
                grid(vec![vec![None, Some(ss.b().clone())]], &[n], &[q, m], None)?,
                hstack(&[k, ss.d()])?,
            )
        }
    };
    StateSpace::new(ss.a().clone(), b, ss.c().clone(), d, ss.dt())
}

/// Returns the Galerkin projection `(WT A V, WT B, C V, D)` of `ss`.
pub fn project(ss: &StateSpace, wt: &Matrix, v: &Matrix) -> Result<StateSpace> {
    ss.projected(wt, v)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex;

    use super::*;
    use crate::math::{complexify, CMatrix, RMatrix};
    use crate::testing::{random_matrix, random_ss};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn h(ss: &StateSpace, theta: f64) -> CMatrix {
        ss.transfer_function_evaluation(Complex::from_polar(1.0, theta)).unwrap()
    }

    fn dense(m: RMatrix) -> Matrix {
        Matrix::Dense(m)
    }

    /// Solves `y₁ = H1 (u₁ + K12 y₂)`, `y₂ = H2 (u₂ + K21 y₁)` for the map `u → y`.
    fn closed_loop(ss1: &StateSpace, ss2: &StateSpace, k12: &RMatrix, k21: &RMatrix, theta: f64) -> CMatrix {
        let (h1, h2) = (h(ss1, theta), h(ss2, theta));
        let (p1, p2) = (h1.nrows(), h2.nrows());
        let (m1, m2) = (h1.ncols(), h2.ncols());
        let mut lhs = CMatrix::identity(p1 + p2, p1 + p2);
        lhs.view_mut((0, p1), (p1, p2)).copy_from(&(-&h1 * complexify(k12)));
        lhs.view_mut((p1, 0), (p2, p1)).copy_from(&(-&h2 * complexify(k21)));
        let mut rhs = CMatrix::zeros(p1 + p2, m1 + m2);
        rhs.view_mut((0, 0), (p1, m1)).copy_from(&h1);
        rhs.view_mut((p1, m1), (p2, m2)).copy_from(&h2);
        lhs.lu().solve(&rhs).unwrap()
    }

    #[test]
    fn zero_gain_coupling_matches_join2() {
        let ss1 = random_ss(3, 2, 2, Some(0.1), 1);
        let ss2 = random_ss(4, 1, 3, Some(0.1), 2);
        let k12 = dense(RMatrix::zeros(2, 3));
        let k21 = dense(RMatrix::zeros(1, 2));
        let coupled = couple(&ss1, &ss2, &k12, &k21).unwrap();
        let joined = join2(&ss1.clone().into(), &ss2.clone().into()).unwrap();
        let joined = joined.as_system().unwrap();
        for theta in [0.0, 0.4, 2.0] {
            assert!((h(&coupled, theta) - h(joined, theta)).camax() < 1e-12);
        }
    }

    #[test]
    fn coupling_closes_the_algebraic_loop() {
        let ss1 = random_ss(3, 2, 2, Some(0.1), 3);
        let ss2 = random_ss(2, 2, 2, Some(0.1), 4);
        let mut rng = StdRng::seed_from_u64(5);
        let k12 = random_matrix(&mut rng, 2, 2) * 0.3;
        let k21 = random_matrix(&mut rng, 2, 2) * 0.3;
        let coupled = couple(&ss1, &ss2, &dense(k12.clone()), &dense(k21.clone())).unwrap();
        assert_eq!(coupled.states(), 5);

        for theta in [0.0, 0.7, 1.9] {
            let expected = closed_loop(&ss1, &ss2, &k12, &k21, theta);
            assert!((h(&coupled, theta) - expected).camax() < 1e-10);
        }
    }

    fn with_feedthrough(ss: &StateSpace, d: RMatrix) -> StateSpace {
        let mut out = ss.clone();
        out.set_matrices(ss.a().clone(), ss.b().clone(), ss.c().clone(), dense(d)).unwrap();
        out
    }

    #[test]
    fn feedthrough_free_shortcut_is_continuous_with_the_general_loop() {
        let ss1 = random_ss(3, 2, 2, Some(0.1), 30);
        let ss2 = random_ss(2, 2, 2, Some(0.1), 31);
        let mut rng = StdRng::seed_from_u64(32);
        let k12 = random_matrix(&mut rng, 2, 2) * 0.4;
        let k21 = random_matrix(&mut rng, 2, 2) * 0.4;
        let d1 = random_matrix(&mut rng, 2, 2);
        let (k12d, k21d) = (dense(k12.clone()), dense(k21.clone()));

        // D1 = 0 exactly: only ss2 carries feedthrough
        let exact = with_feedthrough(&ss1, RMatrix::zeros(2, 2));
        let shortcut = couple(&exact, &ss2, &k12d, &k21d).unwrap();
        // D1 small but nonzero: both sides carry feedthrough
        let perturbed = with_feedthrough(&ss1, &d1 * 1e-9);
        let general = couple(&perturbed, &ss2, &k12d, &k21d).unwrap();

        for theta in [0.0, 0.5, 2.2] {
            let hs = h(&shortcut, theta);
            assert!((&hs - closed_loop(&exact, &ss2, &k12, &k21, theta)).camax() < 1e-10);
            assert!((h(&general, theta) - closed_loop(&perturbed, &ss2, &k12, &k21, theta)).camax() < 1e-10);
            assert!((h(&general, theta) - hs).camax() < 1e-6);
        }
    }

    #[test]
    fn feedthrough_tolerance_selects_the_shortcut() {
        // unit feedthrough on both sides makes L1 singular in the general loop
        let ss1 = StateSpace::discrete(
            RMatrix::from_element(1, 1, 0.5),
            RMatrix::from_element(1, 1, 1.0),
            RMatrix::from_element(1, 1, 1.0),
            RMatrix::from_element(1, 1, 1.0),
            0.1,
        )
        .unwrap();
        let k = dense(RMatrix::from_element(1, 1, 1.0));
        assert!(matches!(couple(&ss1, &ss1, &k, &k), Err(LinssError::NumericalFailure(_))));

        let mut options = CoupleOptions::default();
        options.config.zero_feedthrough_tol = 2.0;
        let coupled = couple_with(&ss1, &ss1, &k, &k, &options).unwrap();
        // K11 and K22 dropped: A = diag(A) + B K C with cpl = K, cpl11 = K D K
        assert_relative_eq!(coupled.a().to_dense()[(0, 1)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(coupled.a().to_dense()[(0, 0)], 1.5, epsilon = 1e-14);
    }

    #[test]
    fn coupling_is_storage_independent() {
        let ss1 = random_ss(3, 2, 2, Some(0.1), 6);
        let ss2 = random_ss(3, 2, 2, Some(0.1), 7);
        let k = dense(RMatrix::from_row_slice(2, 2, &[0.2, 0.0, -0.1, 0.3]));
        let reference = couple(&ss1, &ss2, &k, &k).unwrap();
        let sp1 = ss1.to_representation(Representation::Sparse);
        let sp2 = ss2.to_representation(Representation::Sparse);
        let ks = k.clone().into_representation(Representation::Sparse);
        for (x, y, kk) in [(&sp1, &ss2, &k), (&ss1, &sp2, &ks), (&sp1, &sp2, &ks)] {
            let other = couple(x, y, kk, kk).unwrap();
            assert!(!other.a().is_sparse());
            assert_relative_eq!(other.a().to_dense(), reference.a().to_dense(), epsilon = 1e-12);
            assert_relative_eq!(other.d().to_dense(), reference.d().to_dense(), epsilon = 1e-12);
        }
    }

    #[test]
    fn coupling_rejects_bad_requests() {
        let ss1 = random_ss(2, 1, 1, Some(0.1), 8);
        let ss2 = random_ss(2, 1, 1, Some(0.2), 9);
        let k = dense(RMatrix::zeros(1, 1));
        assert!(matches!(couple(&ss1, &ss2, &k, &k), Err(LinssError::SamplingMismatch { .. })));

        let ss2 = random_ss(2, 1, 1, Some(0.1), 9);
        let sparse = CoupleOptions {
            output: Representation::Sparse,
            ..CoupleOptions::default()
        };
        assert!(matches!(couple_with(&ss1, &ss2, &k, &k, &sparse), Err(LinssError::NotImplemented(_))));

        let wrong = dense(RMatrix::zeros(2, 1));
        assert!(matches!(couple(&ss1, &ss2, &wrong, &k), Err(LinssError::DimensionMismatch { .. })));
    }

    #[test]
    fn singular_loop_is_a_numerical_failure() {
        // D1 = D2 = 1 with unit feedback both ways gives L1 = 1 - 1 = 0
        let one = || dense(RMatrix::from_element(1, 1, 1.0));
        let ss1 = StateSpace::discrete(RMatrix::zeros(1, 1), RMatrix::zeros(1, 1), RMatrix::zeros(1, 1), RMatrix::from_element(1, 1, 1.0), 0.1).unwrap();
        let ss2 = ss1.clone();
        let err = couple(&ss1, &ss2, &one(), &one()).unwrap_err();
        assert!(matches!(err, LinssError::NumericalFailure(_)));
    }

    #[test]
    fn series_response_is_the_product() {
        let ss1 = random_ss(3, 2, 3, Some(0.1), 10);
        let ss2 = random_ss(4, 3, 2, Some(0.1), 11);
        let s = series(&ss1, &ss2).unwrap();
        assert_eq!((s.states(), s.inputs(), s.outputs()), (7, 2, 2));
        for theta in [0.0, 1.0, 2.5] {
            assert!((h(&s, theta) - h(&ss2, theta) * h(&ss1, theta)).camax() < 1e-10);
        }
        assert!(series(&ss2, &ss2).is_err());
    }

    #[test]
    fn parallel_sums_outputs_over_concatenated_inputs() {
        let ss1 = random_ss(3, 2, 2, Some(0.1), 12);
        let ss2 = random_ss(2, 2, 2, Some(0.1), 13);
        let p = parallel(&ss1, &ss2).unwrap();
        assert_eq!(p.inputs(), 4);
        for theta in [0.0, 0.3, 3.0] {
            let (hp, h1, h2) = (h(&p, theta), h(&ss1, theta), h(&ss2, theta));
            assert!((hp.columns(0, 2) - &h1).camax() < 1e-12);
            assert!((hp.columns(2, 2) - &h2).camax() < 1e-12);
            let u = CMatrix::from_fn(2, 1, |i, _| Complex::new(1.0 + i as f64, -0.5));
            let mut uu = CMatrix::zeros(4, 1);
            uu.view_mut((0, 0), (2, 1)).copy_from(&u);
            uu.view_mut((2, 0), (2, 1)).copy_from(&u);
            assert!((&hp * uu - (h1 + h2) * u).camax() < 1e-10);
        }
    }

    #[test]
    fn weighted_join_is_the_weighted_sum() {
        let models: Vec<StateSpace> = (0..3).map(|k| random_ss(2 + k, 2, 3, Some(0.1), 20 + k as u64)).collect();
        let weights = [0.3, 0.5, 0.2];
        let joined = join(&models, Some(&weights)).unwrap();
        assert_eq!(joined.states(), 2 + 3 + 4);
        for omega in [0.0, 1.0, 3.0] {
            let theta = omega * 0.1;
            let expected = models
                .iter()
                .zip(weights)
                .fold(CMatrix::zeros(3, 2), |acc, (m, w)| acc + h(m, theta) * Complex::new(w, 0.0));
            assert!((h(&joined, theta) - expected).camax() < 1e-12);
        }
        assert!(join(&[], None).is_err());
        assert!(join(&models, Some(&[1.0])).is_err());
    }

    #[test]
    fn join2_and_sum_cover_gain_and_system_operands() {
        let ss = random_ss(3, 2, 2, Some(0.1), 30);
        let k = dense(RMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
        let gain = Operand::Gain(k.clone());
        let sys = Operand::System(ss.clone());

        let gg = join2(&gain, &gain).unwrap();
        assert_eq!(gg.as_gain().unwrap().shape(), (4, 4));

        let gs = join2(&gain, &sys).unwrap();
        let gs = gs.as_system().unwrap();
        assert_eq!((gs.states(), gs.inputs(), gs.outputs()), (3, 4, 4));
        let hgs = h(gs, 0.5);
        assert!((hgs.view((0, 0), (2, 2)) - complexify(&k.to_dense())).camax() < 1e-14);
        assert!((hgs.view((2, 2), (2, 2)) - h(&ss, 0.5)).camax() < 1e-12);
        assert!(hgs.view((0, 2), (2, 2)).camax() == 0.0);

        let sg = join2(&sys, &gain).unwrap();
        assert_eq!(sg.as_system().unwrap().dt(), Some(0.1));

        let sum = sum_ss(&sys, &gain, false).unwrap();
        let diff = sum_ss(&sys, &sys, true).unwrap();
        let ck = complexify(&k.to_dense());
        assert!((h(sum.as_system().unwrap(), 0.5) - (h(&ss, 0.5) + ck)).camax() < 1e-12);
        assert!(h(diff.as_system().unwrap(), 0.5).camax() < 1e-12);
        let gsum = sum_ss(&gain, &gain, true).unwrap();
        assert_eq!(gsum.as_gain().unwrap().max_abs(), 0.0);
    }

    #[test]
    fn operand_sampling_mismatch_names_the_operation() {
        let fast = Operand::System(random_ss(2, 1, 1, Some(0.1), 40));
        let slow = Operand::System(random_ss(2, 1, 1, Some(0.2), 41));
        assert!(matches!(
            sum_ss(&fast, &slow, false),
            Err(LinssError::SamplingMismatch { operation: "sum_ss", .. })
        ));
        assert!(matches!(
            join2(&fast, &slow),
            Err(LinssError::SamplingMismatch { operation: "join2", .. })
        ));
    }

    #[test]
    fn parallel_gain_placements() {
        let ss = random_ss(3, 2, 2, None, 40);
        let k = dense(RMatrix::from_element(2, 1, 0.5));
        let down = add_gain(&ss, &k, GainPlacement::ParallelDown).unwrap();
        let up = add_gain(&ss, &k, GainPlacement::ParallelUp).unwrap();
        assert_eq!(down.inputs(), 3);
        assert_eq!(down.d().get(1, 2), 0.5);
        assert_eq!(down.b().to_dense().column(2).amax(), 0.0);
        assert_eq!(up.d().get(0, 0), 0.5);
        assert_eq!(up.b().to_dense().column(0).amax(), 0.0);
        assert_relative_eq!(up.b().to_dense().columns(1, 2).into_owned(), ss.b().to_dense());

        let wrong = dense(RMatrix::zeros(3, 1));
        assert!(add_gain(&ss, &wrong, GainPlacement::ParallelUp).is_err());
        let input = add_gain(&ss, &dense(RMatrix::identity(2, 2)), GainPlacement::Input).unwrap();
        assert_eq!(input.b().to_dense(), ss.b().to_dense());
    }
}
