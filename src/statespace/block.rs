//! Partition-aware state-space models.
//!
//! States, inputs and outputs are split into blocks (one per subsystem, for
//! example structure and aerodynamics), and `A`, `B`, `C`, `D` are grids of
//! optional sub-matrices. Absent blocks are zero, so composing weakly coupled
//! subsystems never materialises their empty cross terms.

use crate::backend::block::BlockMatrix;
use crate::backend::Matrix;
use crate::errors::{LinssError, Result};
use crate::math::{RVector, Scalar};

use super::{Side, StateSpace};

/// State transformation pair for [`BlockStateSpace::project`].
#[derive(Debug, Clone)]
pub enum ProjectionBasis {
    /// Full `WT (k×n)` and `V (n×k)`, split along the state partition.
    Monolithic {
        /// Left (test) basis, transposed.
        wt: Matrix,
        /// Right (trial) basis.
        v: Matrix,
    },
    /// Already block-structured `WT` (one block column per state block) and
    /// `V` (one block row per state block).
    Blocks {
        /// Left basis.
        wt: BlockMatrix,
        /// Right basis.
        v: BlockMatrix,
    },
}

/// State-space model stored as block matrices with size vectors `S_x`, `S_u`, `S_y`.
#[derive(Debug, Clone)]
pub struct BlockStateSpace {
    a: BlockMatrix,
    b: BlockMatrix,
    c: BlockMatrix,
    d: BlockMatrix,
    s_x: Vec<usize>,
    s_u: Vec<usize>,
    s_y: Vec<usize>,
    dt: Option<Scalar>,
}

fn check_grid(name: &str, m: &BlockMatrix, rows: &[usize], cols: &[usize]) -> Result<()> {
    if m.block_rows() != rows.len() || m.block_cols() != cols.len() {
        return Err(LinssError::dims(
            "block state-space",
            format!(
                "{name} has {}x{} blocks, partition needs {}x{}",
                m.block_rows(),
                m.block_cols(),
                rows.len(),
                cols.len()
            ),
        ));
    }
    let (inferred_rows, inferred_cols) = m.sizes()?;
    for (i, (got, &want)) in inferred_rows.iter().zip(rows).enumerate() {
        if got.is_some_and(|g| g != want) {
            return Err(LinssError::dims(
                "block state-space",
                format!("{name} block row {i} has {} rows, expected {want}", got.unwrap_or(0)),
            ));
        }
    }
    for (j, (got, &want)) in inferred_cols.iter().zip(cols).enumerate() {
        if got.is_some_and(|g| g != want) {
            return Err(LinssError::dims(
                "block state-space",
                format!("{name} block column {j} has {} columns, expected {want}", got.unwrap_or(0)),
            ));
        }
    }
    Ok(())
}

fn known_sizes(sizes: Vec<Option<usize>>, what: &str) -> Result<Vec<usize>> {
    sizes
        .into_iter()
        .enumerate()
        .map(|(k, s)| {
            s.ok_or_else(|| LinssError::InvalidArgument(format!("size of {what} block {k} cannot be inferred")))
        })
        .collect()
}

/// Column grid holding one vector per block.
fn column_blocks(parts: &[RVector], sizes: &[usize], what: &str) -> Result<BlockMatrix> {
    if parts.len() != sizes.len() {
        return Err(LinssError::dims(
            "solve_step",
            format!("{} {what} blocks supplied, {} expected", parts.len(), sizes.len()),
        ));
    }
    for (k, (part, &n)) in parts.iter().zip(sizes).enumerate() {
        if part.len() != n {
            return Err(LinssError::dims(
                "solve_step",
                format!("{what} block {k} has length {}, expected {n}", part.len()),
            ));
        }
    }
    BlockMatrix::new(parts.iter().map(|p| vec![Some(Matrix::from(p.clone()))]).collect())
}

/// Splits a block column back into vectors, filling absent blocks with zeros.
fn column_parts(grid: &BlockMatrix, sizes: &[usize]) -> Vec<RVector> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| match grid.get(i, 0) {
            Some(m) => m.to_dense().column(0).into_owned(),
            None => RVector::zeros(n),
        })
        .collect()
}

impl BlockStateSpace {
    /// Builds a block model, checking every block against the partition sizes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        a: BlockMatrix,
        b: BlockMatrix,
        c: BlockMatrix,
        d: BlockMatrix,
        s_x: Vec<usize>,
        s_u: Vec<usize>,
        s_y: Vec<usize>,
        dt: Option<Scalar>,
    ) -> Result<Self> {
        check_grid("A", &a, &s_x, &s_x)?;
        check_grid("B", &b, &s_x, &s_u)?;
        check_grid("C", &c, &s_y, &s_x)?;
        check_grid("D", &d, &s_y, &s_u)?;
        Ok(Self {
            a,
            b,
            c,
            d,
            s_x,
            s_u,
            s_y,
            dt,
        })
    }

    /// Partitions a monolithic model.
    pub fn from_state_space(ss: &StateSpace, s_x: &[usize], s_u: &[usize], s_y: &[usize]) -> Result<Self> {
        Self::new(
            BlockMatrix::from_partition(ss.a(), s_x, s_x)?,
            BlockMatrix::from_partition(ss.b(), s_x, s_u)?,
            BlockMatrix::from_partition(ss.c(), s_y, s_x)?,
            BlockMatrix::from_partition(ss.d(), s_y, s_u)?,
            s_x.to_vec(),
            s_u.to_vec(),
            s_y.to_vec(),
            ss.dt(),
        )
    }

    /// State block sizes.
    #[must_use]
    pub fn s_x(&self) -> &[usize] {
        &self.s_x
    }

    /// Input block sizes.
    #[must_use]
    pub fn s_u(&self) -> &[usize] {
        &self.s_u
    }

    /// Output block sizes.
    #[must_use]
    pub fn s_y(&self) -> &[usize] {
        &self.s_y
    }

    /// Total number of states.
    #[must_use]
    pub fn states(&self) -> usize {
        self.s_x.iter().sum()
    }

    /// Total number of inputs.
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.s_u.iter().sum()
    }

    /// Total number of outputs.
    #[must_use]
    pub fn outputs(&self) -> usize {
        self.s_y.iter().sum()
    }

    /// Sampling interval.
    #[must_use]
    pub fn dt(&self) -> Option<Scalar> {
        self.dt
    }

    /// Block state matrix.
    #[must_use]
    pub fn a(&self) -> &BlockMatrix {
        &self.a
    }

    /// Block input matrix.
    #[must_use]
    pub fn b(&self) -> &BlockMatrix {
        &self.b
    }

    /// Block output matrix.
    #[must_use]
    pub fn c(&self) -> &BlockMatrix {
        &self.c
    }

    /// Block feedthrough matrix.
    #[must_use]
    pub fn d(&self) -> &BlockMatrix {
        &self.d
    }

    /// Drops one input partition (block column of `B` and `D`) or one output
    /// partition (block row of `C` and `D`).
    pub fn remove_block(&mut self, side: Side, index: usize) -> Result<()> {
        match side {
            Side::Input => {
                if index >= self.s_u.len() {
                    return Err(LinssError::InvalidArgument(format!(
                        "input block {index} out of range ({} blocks)",
                        self.s_u.len()
                    )));
                }
                self.b.remove_block_col(index)?;
                self.d.remove_block_col(index)?;
                self.s_u.remove(index);
            }
            Side::Output => {
                if index >= self.s_y.len() {
                    return Err(LinssError::InvalidArgument(format!(
                        "output block {index} out of range ({} blocks)",
                        self.s_y.len()
                    )));
                }
                self.c.remove_block_row(index)?;
                self.d.remove_block_row(index)?;
                self.s_y.remove(index);
            }
        }
        Ok(())
    }

    /// Inserts a block-structured gain on the inputs (`B ← B K`, `D ← D K`) or
    /// outputs (`C ← K C`, `D ← K D`), re-partitioning that side by `K`.
    pub fn add_gain(&mut self, k: &BlockMatrix, side: Side) -> Result<()> {
        let (rows, cols) = k.sizes()?;
        match side {
            Side::Input => {
                check_rows_only("input gain", k, &self.s_u)?;
                let s_u = known_sizes(cols, "input gain column")?;
                let b = self.b.dot(k)?;
                let d = self.d.dot(k)?;
                self.b = b;
                self.d = d;
                self.s_u = s_u;
            }
            Side::Output => {
                check_cols_only("output gain", k, &self.s_y)?;
                let s_y = known_sizes(rows, "output gain row")?;
                let c = k.dot(&self.c)?;
                let d = k.dot(&self.d)?;
                self.c = c;
                self.d = d;
                self.s_y = s_y;
            }
        }
        Ok(())
    }

    /// Projects the states through `basis`; the new state partition follows
    /// the block rows of `WT`.
    pub fn project(&mut self, basis: &ProjectionBasis) -> Result<()> {
        *self = self.projected(basis)?;
        Ok(())
    }

    /// By-value form of [`BlockStateSpace::project`].
    pub fn projected(&self, basis: &ProjectionBasis) -> Result<Self> {
        let split;
        let (wt, v) = match basis {
            ProjectionBasis::Monolithic { wt, v } => {
                split = self.split_basis(wt, v)?;
                (&split.0, &split.1)
            }
            ProjectionBasis::Blocks { wt, v } => (wt, v),
        };
        let s_x = known_sizes(wt.sizes()?.0, "projected state")?;
        let a = wt.dot(&self.a.dot(v)?)?;
        let b = wt.dot(&self.b)?;
        let c = self.c.dot(v)?;
        Self::new(a, b, c, self.d.clone(), s_x, self.s_u.clone(), self.s_y.clone(), self.dt)
    }

    fn split_basis(&self, wt: &Matrix, v: &Matrix) -> Result<(BlockMatrix, BlockMatrix)> {
        let n = self.states();
        let k = wt.nrows();
        if wt.ncols() != n || v.shape() != (n, k) {
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
        let wt_blocks = BlockMatrix::from_partition(wt, &[k], &self.s_x)?;
        let v_blocks = BlockMatrix::from_partition(v, &self.s_x, &[k])?;
        Ok((wt_blocks, v_blocks))
    }

    /// One discrete update at block granularity: `x_{n+1} = A x_n + B u_n`,
    /// `y_n = C x_n + D u_n`, with one vector per state/input/output block.
    pub fn solve_step(&self, x: &[RVector], u: &[RVector]) -> Result<(Vec<RVector>, Vec<RVector>)> {
        let xb = column_blocks(x, &self.s_x, "state")?;
        let ub = column_blocks(u, &self.s_u, "input")?;
        let x_next = self.a.dot(&xb)?.sum(&self.b.dot(&ub)?)?;
        let y = self.c.dot(&xb)?.sum(&self.d.dot(&ub)?)?;
        Ok((column_parts(&x_next, &self.s_x), column_parts(&y, &self.s_y)))
    }

    /// Assembles the monolithic model.
    pub fn assemble(&self) -> Result<StateSpace> {
        let a = self.a.assemble(&self.s_x, &self.s_x, self.a.preferred_representation())?;
        let b = self.b.assemble(&self.s_x, &self.s_u, self.b.preferred_representation())?;
        let c = self.c.assemble(&self.s_y, &self.s_x, self.c.preferred_representation())?;
        let d = self.d.assemble(&self.s_y, &self.s_u, self.d.preferred_representation())?;
        StateSpace::new(a, b, c, d, self.dt)
    }
}

fn check_rows_only(name: &str, k: &BlockMatrix, rows: &[usize]) -> Result<()> {
    if k.block_rows() != rows.len() {
        return Err(LinssError::dims(
            "add_gain",
            format!("{name} has {} block rows, model has {} input blocks", k.block_rows(), rows.len()),
        ));
    }
    for (i, (got, &want)) in k.sizes()?.0.iter().zip(rows).enumerate() {
        if got.is_some_and(|g| g != want) {
            return Err(LinssError::dims("add_gain", format!("{name} block row {i} is not {want} rows high")));
        }
    }
    Ok(())
}

fn check_cols_only(name: &str, k: &BlockMatrix, cols: &[usize]) -> Result<()> {
    if k.block_cols() != cols.len() {
        return Err(LinssError::dims(
            "add_gain",
            format!("{name} has {} block columns, model has {} output blocks", k.block_cols(), cols.len()),
        ));
    }
    for (j, (got, &want)) in k.sizes()?.1.iter().zip(cols).enumerate() {
        if got.is_some_and(|g| g != want) {
            return Err(LinssError::dims("add_gain", format!("{name} block column {j} is not {want} columns wide")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::math::RMatrix;
    use crate::testing::random_ss;

    fn split(v: &RVector, sizes: &[usize]) -> Vec<RVector> {
        let mut out = Vec::new();
        let mut start = 0;
        for &n in sizes {
            out.push(v.rows(start, n).into_owned());
            start += n;
        }
        out
    }

    fn join(parts: &[RVector]) -> RVector {
        RVector::from_iterator(parts.iter().map(RVector::len).sum(), parts.iter().flat_map(|p| p.iter().copied()))
    }

    #[test]
    fn block_step_matches_monolithic_step() {
        let ss = random_ss(5, 3, 4, Some(0.1), 2);
        let blk = BlockStateSpace::from_state_space(&ss, &[2, 3], &[1, 2], &[3, 1]).unwrap();
        assert_eq!((blk.states(), blk.inputs(), blk.outputs()), (5, 3, 4));

        let x = RVector::from_fn(5, |i, _| i as f64 - 2.0);
        let u = RVector::from_fn(3, |i, _| 0.5 * i as f64 + 1.0);
        let (x1, y1) = ss.solve_step(&x, &u).unwrap();
        let (xb, yb) = blk.solve_step(&split(&x, &[2, 3]), &split(&u, &[1, 2])).unwrap();
        assert_relative_eq!(join(&xb), x1, epsilon = 1e-13);
        assert_relative_eq!(join(&yb), y1, epsilon = 1e-13);
    }

    #[test]
    fn absent_blocks_are_zero_in_steps() {
        let a = BlockMatrix::new(vec![
            vec![Some(Matrix::Dense(RMatrix::identity(1, 1))), None],
            vec![None, Some(Matrix::Dense(RMatrix::identity(2, 2).scale(0.5)))],
        ])
        .unwrap();
        let b = BlockMatrix::new(vec![vec![Some(Matrix::Dense(RMatrix::from_element(1, 1, 2.0)))], vec![None]]).unwrap();
        let c = BlockMatrix::new(vec![vec![None, Some(Matrix::Dense(RMatrix::from_element(1, 2, 1.0)))]]).unwrap();
        let d = BlockMatrix::new(vec![vec![None]]).unwrap();
        let blk = BlockStateSpace::new(a, b, c, d, vec![1, 2], vec![1], vec![1], Some(1.0)).unwrap();

        let x = vec![RVector::from_element(1, 1.0), RVector::from_element(2, 4.0)];
        let u = vec![RVector::from_element(1, 1.0)];
        let (x1, y) = blk.solve_step(&x, &u).unwrap();
        assert_eq!(x1[0][0], 3.0);
        assert_eq!(x1[1], RVector::from_element(2, 2.0));
        assert_eq!(y[0][0], 8.0);

        let ss = blk.assemble().unwrap();
        assert_eq!(ss.a().get(2, 2), 0.5);
        assert_eq!(ss.a().get(0, 1), 0.0);
    }

    #[test]
    fn construction_rejects_wrong_partition() {
        let ss = random_ss(4, 2, 2, Some(0.1), 8);
        let blk = BlockStateSpace::from_state_space(&ss, &[2, 2], &[2], &[2]).unwrap();
        let result = BlockStateSpace::new(
            blk.a().clone(),
            blk.b().clone(),
            blk.c().clone(),
            blk.d().clone(),
            vec![1, 3],
            vec![2],
            vec![2],
            Some(0.1),
        );
        assert!(matches!(result, Err(LinssError::DimensionMismatch { .. })));
    }

    #[test]
    fn removing_blocks_updates_partitions() {
        let ss = random_ss(4, 3, 3, Some(0.1), 6);
        let mut blk = BlockStateSpace::from_state_space(&ss, &[4], &[1, 2], &[2, 1]).unwrap();
        blk.remove_block(Side::Input, 0).unwrap();
        assert_eq!(blk.s_u(), &[2]);
        assert_eq!(blk.inputs(), 2);
        blk.remove_block(Side::Output, 1).unwrap();
        assert_eq!(blk.s_y(), &[2]);
        assert_eq!(blk.outputs(), 2);

        let reduced = blk.assemble().unwrap();
        let expected = ss.with_channels(&[1, 2], Side::Input).unwrap().with_channels(&[0, 1], Side::Output).unwrap();
        assert_relative_eq!(reduced.d().to_dense(), expected.d().to_dense(), epsilon = 1e-14);
        assert_relative_eq!(reduced.b().to_dense(), expected.b().to_dense(), epsilon = 1e-14);
        assert!(blk.remove_block(Side::Output, 5).is_err());
    }

    #[test]
    fn block_gain_repartitions_inputs() {
        let ss = random_ss(3, 2, 2, Some(0.1), 12);
        let mut blk = BlockStateSpace::from_state_space(&ss, &[3], &[2], &[2]).unwrap();
        let k = RMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 0.0, 1.0, -1.0]);
        let kb = BlockMatrix::new(vec![vec![
            Some(Matrix::Dense(k.columns(0, 1).into_owned())),
            Some(Matrix::Dense(k.columns(1, 2).into_owned())),
        ]])
        .unwrap();
        blk.add_gain(&kb, Side::Input).unwrap();
        assert_eq!(blk.s_u(), &[1, 2]);
        let expected = ss.with_gain(&Matrix::Dense(k), Side::Input).unwrap();
        let got = blk.assemble().unwrap();
        assert_relative_eq!(got.b().to_dense(), expected.b().to_dense(), epsilon = 1e-14);
        assert_relative_eq!(got.d().to_dense(), expected.d().to_dense(), epsilon = 1e-14);
    }

    #[test]
    fn monolithic_and_block_projection_agree() {
        let ss = random_ss(5, 2, 3, Some(0.1), 30);
        let blk = BlockStateSpace::from_state_space(&ss, &[2, 3], &[2], &[3]).unwrap();
        let v = RMatrix::from_fn(5, 2, |i, j| ((i + 2 * j) as f64 * 0.7).sin());
        let wt = v.transpose();
        let basis = ProjectionBasis::Monolithic {
            wt: Matrix::Dense(wt.clone()),
            v: Matrix::Dense(v.clone()),
        };
        let projected = blk.projected(&basis).unwrap();
        assert_eq!(projected.s_x(), &[2]);
        let reference = ss.projected(&Matrix::Dense(wt), &Matrix::Dense(v)).unwrap();
        let assembled = projected.assemble().unwrap();
        assert_relative_eq!(assembled.a().to_dense(), reference.a().to_dense(), epsilon = 1e-12);
        assert_relative_eq!(assembled.b().to_dense(), reference.b().to_dense(), epsilon = 1e-12);
        assert_relative_eq!(assembled.c().to_dense(), reference.c().to_dense(), epsilon = 1e-12);
        assert_eq!(blk.states(), 5);
    }
}
