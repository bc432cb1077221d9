//! Uniform matrix arithmetic over dense and sparse storage.
//!
//! Every state-space matrix is a [`Matrix`], either a dense `DMatrix<f64>` or a
//! compressed-sparse-column `CscMatrix<f64>`. Binary operations dispatch on the
//! pair of variants; the result is dense unless both operands are sparse or a
//! representation is requested explicitly (`dot_as`, `into_representation`).

pub mod block;
pub mod ordering;
pub mod solver;

use std::borrow::Cow;
use std::ops::Range;

use nalgebra::{ComplexField, DMatrix};
use nalgebra_sparse::{coo::CooMatrix, CscMatrix};
use num_complex::Complex;

use crate::config::NumericConfig;
use crate::errors::{LinssError, Result};
use crate::math::{CMatrix, RMatrix, RVector, Scalar};
use solver::{SparseLu, SparseSolver};

/// Storage tag of a [`Matrix`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Column-major dense storage.
    Dense,
    /// Compressed sparse column storage.
    Sparse,
}

/// A real matrix in one of the supported storage formats.
#[derive(Debug, Clone)]
pub enum Matrix {
    /// Dense storage.
    Dense(RMatrix),
    /// Compressed sparse column storage.
    Sparse(CscMatrix<Scalar>),
}

impl From<RMatrix> for Matrix {
    fn from(m: RMatrix) -> Self {
        Self::Dense(m)
    }
}

impl From<CscMatrix<Scalar>> for Matrix {
    fn from(m: CscMatrix<Scalar>) -> Self {
        Self::Sparse(m)
    }
}

/// Vectors enter as single columns.
impl From<RVector> for Matrix {
    fn from(v: RVector) -> Self {
        Self::Dense(RMatrix::from_column_slice(v.len(), 1, v.as_slice()))
    }
}

impl Matrix {
    /// All-zero matrix.
    #[must_use]
    pub fn zeros(nrows: usize, ncols: usize, repr: Representation) -> Self {
        match repr {
            Representation::Dense => Self::Dense(RMatrix::zeros(nrows, ncols)),
            Representation::Sparse => Self::Sparse(CscMatrix::zeros(nrows, ncols)),
        }
    }

    /// Identity of size `n`.
    #[must_use]
    pub fn identity(n: usize, repr: Representation) -> Self {
        match repr {
            Representation::Dense => Self::Dense(RMatrix::identity(n, n)),
            Representation::Sparse => Self::Sparse(CscMatrix::identity(n)),
        }
    }

    /// Square diagonal matrix with the given entries.
    #[must_use]
    pub fn from_diagonal(values: &[Scalar], repr: Representation) -> Self {
        let dense = RMatrix::from_diagonal(&RVector::from_column_slice(values));
        Self::Dense(dense).into_representation(repr)
    }

    /// Storage tag.
    #[must_use]
    pub fn representation(&self) -> Representation {
        match self {
            Self::Dense(_) => Representation::Dense,
            Self::Sparse(_) => Representation::Sparse,
        }
    }

    /// True for sparse storage.
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Number of rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(m) => m.nrows(),
            Self::Sparse(m) => m.nrows(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(m) => m.ncols(),
            Self::Sparse(m) => m.ncols(),
        }
    }

    /// `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// Entry `(i, j)`; zero for entries outside a sparse pattern.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Scalar {
        match self {
            Self::Dense(m) => m[(i, j)],
            Self::Sparse(m) => m
                .get_entry(i, j)
                .map_or(0.0, |entry| entry.into_value()),
        }
    }

    /// Dense view, borrowing when already dense.
    #[must_use]
    pub fn dense(&self) -> Cow<'_, RMatrix> {
        match self {
            Self::Dense(m) => Cow::Borrowed(m),
            Self::Sparse(m) => Cow::Owned(csc_to_dense(m)),
        }
    }

    /// Owned dense copy.
    #[must_use]
    pub fn to_dense(&self) -> RMatrix {
        self.dense().into_owned()
    }

    /// Owned sparse copy; exact zeros of a dense matrix are dropped.
    #[must_use]
    pub fn to_sparse(&self) -> CscMatrix<Scalar> {
        match self {
            Self::Dense(m) => dense_to_csc(m),
            Self::Sparse(m) => m.clone(),
        }
    }

    /// Converts to the requested storage.
    #[must_use]
    pub fn into_representation(self, repr: Representation) -> Self {
        match (self, repr) {
            (Self::Sparse(m), Representation::Dense) => Self::Dense(csc_to_dense(&m)),
            (Self::Dense(m), Representation::Sparse) => Self::Sparse(dense_to_csc(&m)),
            (m, _) => m,
        }
    }

    /// Lifts into a dense complex matrix.
    #[must_use]
    pub fn to_complex(&self) -> CMatrix {
        self.dense().map(|v| Complex::new(v, 0.0))
    }

    /// Transposed copy in the same storage.
    #[must_use]
    pub fn transpose(&self) -> Self {
        match self {
            Self::Dense(m) => Self::Dense(m.transpose()),
            Self::Sparse(m) => Self::Sparse(m.transpose()),
        }
    }

    /// Copy multiplied by `factor`.
    #[must_use]
    pub fn scale(&self, factor: Scalar) -> Self {
        match self {
            Self::Dense(m) => Self::Dense(m * factor),
            Self::Sparse(m) => {
                let mut out = m.clone();
                out.values_mut().iter_mut().for_each(|v| *v *= factor);
                Self::Sparse(out)
            }
        }
    }

    /// Copy with row `i` multiplied by `factors[i]`.
    pub fn scale_rows(&self, factors: &[Scalar]) -> Result<Self> {
        if factors.len() != self.nrows() {
            return Err(LinssError::dims(
                "scale_rows",
                format!("{} factors for {} rows", factors.len(), self.nrows()),
            ));
        }
        Ok(match self {
            Self::Dense(m) => {
                let mut out = m.clone();
                for (i, &f) in factors.iter().enumerate() {
                    out.row_mut(i).scale_mut(f);
                }
                Self::Dense(out)
            }
            Self::Sparse(m) => {
                let mut out = m.clone();
                for (i, _, v) in out.triplet_iter_mut() {
                    *v *= factors[i];
                }
                Self::Sparse(out)
            }
        })
    }

    /// Copy with column `j` multiplied by `factors[j]`.
    pub fn scale_cols(&self, factors: &[Scalar]) -> Result<Self> {
        if factors.len() != self.ncols() {
            return Err(LinssError::dims(
                "scale_cols",
                format!("{} factors for {} columns", factors.len(), self.ncols()),
            ));
        }
        Ok(match self {
            Self::Dense(m) => {
                let mut out = m.clone();
                for (j, &f) in factors.iter().enumerate() {
                    out.column_mut(j).scale_mut(f);
                }
                Self::Dense(out)
            }
            Self::Sparse(m) => {
                let mut out = m.clone();
                for (_, j, v) in out.triplet_iter_mut() {
                    *v *= factors[j];
                }
                Self::Sparse(out)
            }
        })
    }

    /// Matrix-vector product.
    pub fn mul_vector(&self, v: &RVector) -> Result<RVector> {
        if v.len() != self.ncols() {
            return Err(LinssError::dims(
                "mul_vector",
                format!("{}x{} times vector of length {}", self.nrows(), self.ncols(), v.len()),
            ));
        }
        Ok(match self {
            Self::Dense(m) => m * v,
            Self::Sparse(m) => {
                let column = RMatrix::from_column_slice(v.len(), 1, v.as_slice());
                (m * &column).column(0).into_owned()
            }
        })
    }

    /// Largest absolute entry (zero for empty matrices).
    #[must_use]
    pub fn max_abs(&self) -> Scalar {
        match self {
            Self::Dense(m) => m.iter().fold(0.0, |acc: Scalar, v| acc.max(v.abs())),
            Self::Sparse(m) => m.values().iter().fold(0.0, |acc: Scalar, v| acc.max(v.abs())),
        }
    }

    /// Contiguous sub-matrix `rows × cols` in the same storage.
    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Self> {
        if rows.end > self.nrows() || cols.end > self.ncols() || rows.start > rows.end || cols.start > cols.end {
            return Err(LinssError::dims(
                "submatrix",
                format!("range {rows:?} x {cols:?} outside {}x{}", self.nrows(), self.ncols()),
            ));
        }
        let (nr, nc) = (rows.len(), cols.len());
        Ok(match self {
            Self::Dense(m) => Self::Dense(m.view((rows.start, cols.start), (nr, nc)).into_owned()),
            Self::Sparse(m) => {
                let mut coo = CooMatrix::new(nr, nc);
                for (i, j, &v) in m.triplet_iter() {
                    if rows.contains(&i) && cols.contains(&j) {
                        coo.push(i - rows.start, j - cols.start, v);
                    }
                }
                Self::Sparse(CscMatrix::from(&coo))
            }
        })
    }

    /// Rows picked (and possibly repeated) in the order of `indices`.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        check_indices("select_rows", indices, self.nrows())?;
        Ok(match self {
            Self::Dense(m) => Self::Dense(m.select_rows(indices)),
            Self::Sparse(m) => {
                let targets = targets_of(indices, m.nrows());
                let mut coo = CooMatrix::new(indices.len(), m.ncols());
                for (i, j, &v) in m.triplet_iter() {
                    for &k in &targets[i] {
                        coo.push(k, j, v);
                    }
                }
                Self::Sparse(CscMatrix::from(&coo))
            }
        })
    }

    /// Columns picked (and possibly repeated) in the order of `indices`.
    pub fn select_cols(&self, indices: &[usize]) -> Result<Self> {
        check_indices("select_cols", indices, self.ncols())?;
        Ok(match self {
            Self::Dense(m) => Self::Dense(m.select_columns(indices)),
            Self::Sparse(m) => {
                let targets = targets_of(indices, m.ncols());
                let mut coo = CooMatrix::new(m.nrows(), indices.len());
                for (i, j, &v) in m.triplet_iter() {
                    for &k in &targets[j] {
                        coo.push(i, k, v);
                    }
                }
                Self::Sparse(CscMatrix::from(&coo))
            }
        })
    }
}

fn check_indices(operation: &'static str, indices: &[usize], bound: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= bound) {
        Some(i) => Err(LinssError::InvalidArgument(format!(
            "{operation}: index {i} out of range for dimension {bound}"
        ))),
        None => Ok(()),
    }
}

/// For every source index, the output positions it is copied to.
fn targets_of(indices: &[usize], bound: usize) -> Vec<Vec<usize>> {
    let mut targets = vec![Vec::new(); bound];
    for (k, &i) in indices.iter().enumerate() {
        targets[i].push(k);
    }
    targets
}

pub(crate) fn csc_to_dense(m: &CscMatrix<Scalar>) -> RMatrix {
    let mut out = RMatrix::zeros(m.nrows(), m.ncols());
    for (i, j, &v) in m.triplet_iter() {
        out[(i, j)] += v;
    }
    out
}

pub(crate) fn dense_to_csc(m: &RMatrix) -> CscMatrix<Scalar> {
    let mut coo = CooMatrix::new(m.nrows(), m.ncols());
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            let v = m[(i, j)];
            if v != 0.0 {
                coo.push(i, j, v);
            }
        }
    }
    CscMatrix::from(&coo)
}

fn default_representation(x: &Matrix, y: &Matrix) -> Representation {
    if x.is_sparse() && y.is_sparse() {
        Representation::Sparse
    } else {
        Representation::Dense
    }
}

/// Product `X · Y`; sparse only when both operands are sparse.
pub fn dot(x: &Matrix, y: &Matrix) -> Result<Matrix> {
    dot_as(x, y, default_representation(x, y))
}

/// Product `X · Y` returned in the requested storage.
pub fn dot_as(x: &Matrix, y: &Matrix, repr: Representation) -> Result<Matrix> {
    if x.ncols() != y.nrows() {
        return Err(LinssError::dims(
            "dot",
            format!("{}x{} times {}x{}", x.nrows(), x.ncols(), y.nrows(), y.ncols()),
        ));
    }
    let product = match (x, y) {
        (Matrix::Dense(a), Matrix::Dense(b)) => Matrix::Dense(a * b),
        (Matrix::Sparse(a), Matrix::Sparse(b)) => Matrix::Sparse(a * b),
        (Matrix::Sparse(a), Matrix::Dense(b)) => Matrix::Dense(a * b),
        // (A B)ᵀ = Bᵀ Aᵀ keeps the sparse operand on the left
        (Matrix::Dense(a), Matrix::Sparse(b)) => Matrix::Dense((&b.transpose() * &a.transpose()).transpose()),
    };
    Ok(product.into_representation(repr))
}

fn check_same_shape(operation: &'static str, x: &Matrix, y: &Matrix) -> Result<()> {
    if x.shape() != y.shape() {
        return Err(LinssError::dims(
            operation,
            format!("{}x{} and {}x{}", x.nrows(), x.ncols(), y.nrows(), y.ncols()),
        ));
    }
    Ok(())
}

/// Sum `X + Y`.
pub fn add(x: &Matrix, y: &Matrix) -> Result<Matrix> {
    check_same_shape("add", x, y)?;
    Ok(match (x, y) {
        (Matrix::Sparse(a), Matrix::Sparse(b)) => Matrix::Sparse(a + b),
        _ => Matrix::Dense(&*x.dense() + &*y.dense()),
    })
}

/// Difference `X - Y`.
pub fn sub(x: &Matrix, y: &Matrix) -> Result<Matrix> {
    check_same_shape("sub", x, y)?;
    Ok(match (x, y) {
        (Matrix::Sparse(a), Matrix::Sparse(b)) => Matrix::Sparse(a - b),
        _ => Matrix::Dense(&*x.dense() - &*y.dense()),
    })
}

/// Identity matching the row count and storage of `x`.
#[must_use]
pub fn eye_as(x: &Matrix) -> Matrix {
    Matrix::identity(x.nrows(), x.representation())
}

/// Solves `X Z = Y` with the default [`NumericConfig`].
pub fn solve(x: &Matrix, y: &Matrix) -> Result<Matrix> {
    solve_with(x, y, &NumericConfig::default())
}

/// Solves `X Z = Y`.
///
/// Dense `X` is factored by LU with partial pivoting; sparse `X` goes through
/// [`SparseLu`]. A pivot below `config.pivot_tol` relative to the largest entry
/// of `X` is reported as [`LinssError::NumericalFailure`].
pub fn solve_with(x: &Matrix, y: &Matrix, config: &NumericConfig) -> Result<Matrix> {
    if x.nrows() != x.ncols() {
        return Err(LinssError::dims(
            "solve",
            format!("coefficient matrix is {}x{}", x.nrows(), x.ncols()),
        ));
    }
    if x.nrows() != y.nrows() {
        return Err(LinssError::dims(
            "solve",
            format!("{} equations but right-hand side has {} rows", x.nrows(), y.nrows()),
        ));
    }
    let z = match x {
        Matrix::Dense(a) => lu_solve_dense(a.clone(), &*y.dense(), config.pivot_tol)?,
        Matrix::Sparse(a) => {
            let mut lu = SparseLu::from_config(config);
            lu.factor(a).map_err(singular_to_failure)?;
            lu.solve_matrix(&*y.dense())?
        }
    };
    Ok(Matrix::Dense(z).into_representation(default_representation(x, y)))
}

pub(crate) fn singular_to_failure(e: solver::SolverError) -> LinssError {
    match e {
        solver::SolverError::SingularMatrix { column } => {
            LinssError::NumericalFailure(format!("singular matrix (no pivot in column {column})"))
        }
        other => LinssError::Solver(other),
    }
}

/// Dense LU solve with a relative pivot check, shared by real and complex paths.
pub(crate) fn lu_solve_dense<T>(a: DMatrix<T>, b: &DMatrix<T>, pivot_tol: Scalar) -> Result<DMatrix<T>>
where
    T: ComplexField<RealField = Scalar> + Copy,
{
    if a.nrows() == 0 {
        return Ok(b.clone());
    }
    let scale = a.iter().fold(0.0, |acc: Scalar, v| acc.max(v.modulus()));
    let lu = a.lu();
    let min_pivot = lu
        .u()
        .diagonal()
        .iter()
        .fold(Scalar::INFINITY, |acc, v| acc.min(v.modulus()));
    if scale == 0.0 || min_pivot <= pivot_tol * scale {
        return Err(LinssError::NumericalFailure(format!(
            "singular matrix (smallest pivot {min_pivot:.3e}, largest entry {scale:.3e})"
        )));
    }
    lu.solve(b)
        .ok_or_else(|| LinssError::NumericalFailure("LU solve failed".into()))
}

/// Block-diagonal concatenation; sparse only if every block is sparse.
#[must_use]
pub fn block_diag(blocks: &[&Matrix]) -> Matrix {
    let nrows = blocks.iter().map(|b| b.nrows()).sum();
    let ncols = blocks.iter().map(|b| b.ncols()).sum();
    let all_sparse = !blocks.is_empty() && blocks.iter().all(|b| b.is_sparse());
    let repr = if all_sparse {
        Representation::Sparse
    } else {
        Representation::Dense
    };
    let mut placed = Placement::new(nrows, ncols, repr);
    let (mut r0, mut c0) = (0, 0);
    for block in blocks {
        placed.put(r0, c0, block);
        r0 += block.nrows();
        c0 += block.ncols();
    }
    placed.finish()
}

/// Accumulates blocks at offsets into a dense or sparse target.
pub(crate) enum Placement {
    Dense(RMatrix),
    Sparse(CooMatrix<Scalar>),
}

impl Placement {
    pub(crate) fn new(nrows: usize, ncols: usize, repr: Representation) -> Self {
        match repr {
            Representation::Dense => Self::Dense(RMatrix::zeros(nrows, ncols)),
            Representation::Sparse => Self::Sparse(CooMatrix::new(nrows, ncols)),
        }
    }

    pub(crate) fn put(&mut self, r0: usize, c0: usize, block: &Matrix) {
        match (self, block) {
            (Self::Dense(target), Matrix::Dense(m)) => {
                target.view_mut((r0, c0), m.shape()).copy_from(m);
            }
            (Self::Dense(target), Matrix::Sparse(m)) => {
                for (i, j, &v) in m.triplet_iter() {
                    target[(r0 + i, c0 + j)] += v;
                }
            }
            (Self::Sparse(coo), Matrix::Sparse(m)) => {
                for (i, j, &v) in m.triplet_iter() {
                    coo.push(r0 + i, c0 + j, v);
                }
            }
            (Self::Sparse(coo), Matrix::Dense(m)) => {
                for j in 0..m.ncols() {
                    for i in 0..m.nrows() {
                        if m[(i, j)] != 0.0 {
                            coo.push(r0 + i, c0 + j, m[(i, j)]);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn finish(self) -> Matrix {
        match self {
            Self::Dense(m) => Matrix::Dense(m),
            Self::Sparse(coo) => Matrix::Sparse(CscMatrix::from(&coo)),
        }
    }
}
