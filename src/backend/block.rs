//! Block-partitioned matrices with implicit zero blocks.

use super::{add, dot, Matrix, Placement, Representation};
use crate::errors::{LinssError, Result};

/// Row-major grid of optional blocks; `None` is a zero block of whatever size
/// its row and column imply.
#[derive(Debug, Clone)]
pub struct BlockMatrix {
    blocks: Vec<Vec<Option<Matrix>>>,
    block_cols: usize,
}

/// Block sizes inferred from the present blocks; `None` where a whole
/// row or column of blocks is absent.
pub type BlockSizes = (Vec<Option<usize>>, Vec<Option<usize>>);

impl BlockMatrix {
    /// Wraps a rectangular grid of blocks.
    pub fn new(blocks: Vec<Vec<Option<Matrix>>>) -> Result<Self> {
        let block_cols = blocks.first().map_or(0, Vec::len);
        if let Some(row) = blocks.iter().position(|r| r.len() != block_cols) {
            return Err(LinssError::dims(
                "block matrix",
                format!("block row {row} has {} blocks, expected {block_cols}", blocks[row].len()),
            ));
        }
        let out = Self { blocks, block_cols };
        out.sizes()?;
        Ok(out)
    }

    /// Grid of absent blocks.
    #[must_use]
    pub fn empty(block_rows: usize, block_cols: usize) -> Self {
        Self {
            blocks: vec![vec![None; block_cols]; block_rows],
            block_cols,
        }
    }

    /// Single-block grid.
    #[must_use]
    pub fn single(m: Matrix) -> Self {
        Self {
            blocks: vec![vec![Some(m)]],
            block_cols: 1,
        }
    }

    /// Number of block rows.
    #[must_use]
    pub fn block_rows(&self) -> usize {
        self.blocks.len()
    }

    /// Number of block columns.
    #[must_use]
    pub fn block_cols(&self) -> usize {
        self.block_cols
    }

    /// Block `(i, j)`, `None` when absent.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<&Matrix> {
        self.blocks.get(i).and_then(|row| row.get(j)).and_then(Option::as_ref)
    }

    /// Replaces block `(i, j)`, checking it against the sizes of its row and column.
    pub fn set(&mut self, i: usize, j: usize, block: Option<Matrix>) -> Result<()> {
        if i >= self.block_rows() || j >= self.block_cols {
            return Err(LinssError::InvalidArgument(format!(
                "block ({i}, {j}) outside {}x{} grid",
                self.block_rows(),
                self.block_cols
            )));
        }
        let previous = std::mem::replace(&mut self.blocks[i][j], block);
        if let Err(e) = self.sizes() {
            self.blocks[i][j] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Infers block row heights and column widths, failing on any block that
    /// disagrees with another in the same block row or column.
    pub fn sizes(&self) -> Result<BlockSizes> {
        let mut rows = vec![None; self.block_rows()];
        let mut cols = vec![None; self.block_cols];
        for (i, row) in self.blocks.iter().enumerate() {
            for (j, block) in row.iter().enumerate() {
                let Some(m) = block else { continue };
                merge_size(&mut rows[i], m.nrows(), || format!("block row {i}"))?;
                merge_size(&mut cols[j], m.ncols(), || format!("block column {j}"))?;
            }
        }
        Ok((rows, cols))
    }

    /// Block product; absent blocks contribute nothing and a result block with
    /// no contributing terms stays absent.
    pub fn dot(&self, other: &Self) -> Result<Self> {
        if self.block_cols != other.block_rows() {
            return Err(LinssError::dims(
                "block_dot",
                format!("{} block columns times {} block rows", self.block_cols, other.block_rows()),
            ));
        }
        let (_, inner_left) = self.sizes()?;
        let (inner_right, _) = other.sizes()?;
        for (k, (l, r)) in inner_left.iter().zip(&inner_right).enumerate() {
            if let (Some(l), Some(r)) = (l, r) {
                if l != r {
                    return Err(LinssError::dims("block_dot", format!("inner block {k}: {l} vs {r}")));
                }
            }
        }

        let mut out = Self::empty(self.block_rows(), other.block_cols);
        for i in 0..self.block_rows() {
            for j in 0..other.block_cols {
                let mut acc: Option<Matrix> = None;
                for k in 0..self.block_cols {
                    let (Some(a), Some(b)) = (self.get(i, k), other.get(k, j)) else { continue };
                    let term = dot(a, b)?;
                    acc = Some(match acc {
                        Some(prev) => add(&prev, &term)?,
                        None => term,
                    });
                }
                out.blocks[i][j] = acc;
            }
        }
        Ok(out)
    }

    /// Blockwise sum; an absent block is the additive identity.
    pub fn sum(&self, other: &Self) -> Result<Self> {
        if self.block_rows() != other.block_rows() || self.block_cols != other.block_cols {
            return Err(LinssError::dims(
                "block_sum",
                format!(
                    "{}x{} blocks and {}x{} blocks",
                    self.block_rows(),
                    self.block_cols,
                    other.block_rows(),
                    other.block_cols
                ),
            ));
        }
        let mut out = Self::empty(self.block_rows(), self.block_cols);
        for i in 0..self.block_rows() {
            for j in 0..self.block_cols {
                out.blocks[i][j] = match (self.get(i, j), other.get(i, j)) {
                    (Some(a), Some(b)) => Some(add(a, b)?),
                    (Some(a), None) => Some(a.clone()),
                    (None, Some(b)) => Some(b.clone()),
                    (None, None) => None,
                };
            }
        }
        out.sizes()?;
        Ok(out)
    }

    /// Deletes block row `index`.
    pub fn remove_block_row(&mut self, index: usize) -> Result<Vec<Option<Matrix>>> {
        if index >= self.block_rows() {
            return Err(out_of_range("block row", index, self.block_rows()));
        }
        Ok(self.blocks.remove(index))
    }

    /// Deletes block column `index`.
    pub fn remove_block_col(&mut self, index: usize) -> Result<Vec<Option<Matrix>>> {
        if index >= self.block_cols {
            return Err(out_of_range("block column", index, self.block_cols));
        }
        self.block_cols -= 1;
        Ok(self.blocks.iter_mut().map(|row| row.remove(index)).collect())
    }

    /// Assembles the full matrix with explicit block sizes.
    pub fn assemble(&self, row_sizes: &[usize], col_sizes: &[usize], repr: Representation) -> Result<Matrix> {
        if row_sizes.len() != self.block_rows() || col_sizes.len() != self.block_cols {
            return Err(LinssError::dims(
                "assemble",
                format!(
                    "{} row sizes and {} column sizes for a {}x{} block grid",
                    row_sizes.len(),
                    col_sizes.len(),
                    self.block_rows(),
                    self.block_cols
                ),
            ));
        }
        let (rows, cols) = self.sizes()?;
        for (i, (inferred, &given)) in rows.iter().zip(row_sizes).enumerate() {
            if inferred.is_some_and(|n| n != given) {
                return Err(LinssError::dims("assemble", format!("block row {i} is not {given} rows high")));
            }
        }
        for (j, (inferred, &given)) in cols.iter().zip(col_sizes).enumerate() {
            if inferred.is_some_and(|n| n != given) {
                return Err(LinssError::dims("assemble", format!("block column {j} is not {given} columns wide")));
            }
        }

        let mut placed = Placement::new(row_sizes.iter().sum(), col_sizes.iter().sum(), repr);
        let mut r0 = 0;
        for (i, row) in self.blocks.iter().enumerate() {
            let mut c0 = 0;
            for (j, block) in row.iter().enumerate() {
                if let Some(m) = block {
                    placed.put(r0, c0, m);
                }
                c0 += col_sizes[j];
            }
            r0 += row_sizes[i];
        }
        Ok(placed.finish())
    }

    /// Assembles with sizes inferred from the blocks; sparse only if every
    /// present block is sparse.
    pub fn assemble_inferred(&self) -> Result<Matrix> {
        let (rows, cols) = self.sizes()?;
        let rows = resolve(rows, "block row")?;
        let cols = resolve(cols, "block column")?;
        self.assemble(&rows, &cols, self.preferred_representation())
    }

    /// Sparse if every present block is sparse, dense otherwise.
    #[must_use]
    pub fn preferred_representation(&self) -> Representation {
        let mut present = self.blocks.iter().flatten().flatten().peekable();
        if present.peek().is_some() && present.all(Matrix::is_sparse) {
            Representation::Sparse
        } else {
            Representation::Dense
        }
    }

    /// Splits `matrix` into blocks of the given sizes.
    pub fn from_partition(matrix: &Matrix, row_sizes: &[usize], col_sizes: &[usize]) -> Result<Self> {
        let total_rows: usize = row_sizes.iter().sum();
        let total_cols: usize = col_sizes.iter().sum();
        if (total_rows, total_cols) != matrix.shape() {
            return Err(LinssError::dims(
                "partition",
                format!(
                    "sizes cover {total_rows}x{total_cols}, matrix is {}x{}",
                    matrix.nrows(),
                    matrix.ncols()
                ),
            ));
        }
        let mut blocks = Vec::with_capacity(row_sizes.len());
        let mut r0 = 0;
        for &nr in row_sizes {
            let mut row = Vec::with_capacity(col_sizes.len());
            let mut c0 = 0;
            for &nc in col_sizes {
                row.push(Some(matrix.submatrix(r0..r0 + nr, c0..c0 + nc)?));
                c0 += nc;
            }
            blocks.push(row);
            r0 += nr;
        }
        Ok(Self {
            blocks,
            block_cols: col_sizes.len(),
        })
    }
}

fn merge_size(slot: &mut Option<usize>, n: usize, what: impl FnOnce() -> String) -> Result<()> {
    match *slot {
        Some(existing) if existing != n => Err(LinssError::dims(
            "block sizes",
            format!("{} mixes sizes {existing} and {n}", what()),
        )),
        _ => {
            *slot = Some(n);
            Ok(())
        }
    }
}

fn resolve(sizes: Vec<Option<usize>>, what: &str) -> Result<Vec<usize>> {
    sizes
        .into_iter()
        .enumerate()
        .map(|(k, s)| {
            s.ok_or_else(|| LinssError::InvalidArgument(format!("{what} {k} has no block to infer its size from")))
        })
        .collect()
}

fn out_of_range(what: &str, index: usize, len: usize) -> LinssError {
    LinssError::InvalidArgument(format!("{what} {index} out of range ({len} present)"))
}

/// Horizontal concatenation `[m₁ m₂ …]`.
pub fn hstack(blocks: &[&Matrix]) -> Result<Matrix> {
    BlockMatrix::new(vec![blocks.iter().map(|&m| Some(m.clone())).collect()])?.assemble_inferred()
}

/// Vertical concatenation `[m₁; m₂; …]`.
pub fn vstack(blocks: &[&Matrix]) -> Result<Matrix> {
    BlockMatrix::new(blocks.iter().map(|&m| vec![Some(m.clone())]).collect())?.assemble_inferred()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dense_to_csc;
    use crate::math::RMatrix;

    fn dense(rows: usize, cols: usize, fill: f64) -> Matrix {
        Matrix::Dense(RMatrix::from_element(rows, cols, fill))
    }

    #[test]
    fn absent_blocks_act_as_zero_in_products() {
        // [[I, 0], [0, 2]] · [[x], [y]]
        let left = BlockMatrix::new(vec![
            vec![Some(Matrix::Dense(RMatrix::identity(2, 2))), None],
            vec![None, Some(Matrix::Dense(RMatrix::identity(1, 1).scale(2.0)))],
        ])
        .unwrap();
        let right = BlockMatrix::new(vec![vec![Some(dense(2, 1, 1.0))], vec![Some(dense(1, 1, 3.0))]]).unwrap();
        let product = left.dot(&right).unwrap();
        assert_eq!(product.get(0, 0).unwrap().to_dense(), RMatrix::from_element(2, 1, 1.0));
        assert_eq!(product.get(1, 0).unwrap().get(0, 0), 6.0);
    }

    #[test]
    fn product_without_terms_stays_absent() {
        let left = BlockMatrix::new(vec![vec![Some(dense(1, 1, 1.0)), None]]).unwrap();
        let right = BlockMatrix::new(vec![vec![None], vec![Some(dense(2, 1, 1.0))]]).unwrap();
        let product = left.dot(&right).unwrap();
        assert!(product.get(0, 0).is_none());
    }

    #[test]
    fn inconsistent_block_sizes_fail_fast() {
        let result = BlockMatrix::new(vec![vec![Some(dense(2, 1, 1.0)), Some(dense(3, 1, 1.0))]]);
        assert!(matches!(result, Err(LinssError::DimensionMismatch { .. })));

        let left = BlockMatrix::new(vec![vec![Some(dense(1, 2, 1.0))]]).unwrap();
        let right = BlockMatrix::new(vec![vec![Some(dense(3, 1, 1.0))]]).unwrap();
        assert!(left.dot(&right).is_err());
    }

    #[test]
    fn sum_treats_absent_blocks_as_identity() {
        let a = BlockMatrix::new(vec![vec![Some(dense(1, 1, 1.0)), None]]).unwrap();
        let b = BlockMatrix::new(vec![vec![Some(dense(1, 1, 2.0)), Some(dense(1, 2, 5.0))]]).unwrap();
        let s = a.sum(&b).unwrap();
        assert_eq!(s.get(0, 0).unwrap().get(0, 0), 3.0);
        assert_eq!(s.get(0, 1).unwrap().get(0, 1), 5.0);
    }

    #[test]
    fn partition_then_assemble_is_lossless() {
        let m = RMatrix::from_fn(5, 4, |i, j| (i * 4 + j) as f64);
        for matrix in [Matrix::Dense(m.clone()), Matrix::Sparse(dense_to_csc(&m))] {
            let blocks = BlockMatrix::from_partition(&matrix, &[2, 3], &[1, 3]).unwrap();
            let back = blocks.assemble(&[2, 3], &[1, 3], matrix.representation()).unwrap();
            assert_eq!(back.to_dense(), m);
            assert_eq!(back.is_sparse(), matrix.is_sparse());
        }
    }

    #[test]
    fn stacking_concatenates() {
        let a = dense(2, 1, 1.0);
        let b = dense(2, 2, 2.0);
        let h = hstack(&[&a, &b]).unwrap();
        assert_eq!(h.shape(), (2, 3));
        let v = vstack(&[&b, &b]).unwrap();
        assert_eq!(v.shape(), (4, 2));
        assert!(vstack(&[&a, &b]).is_err());
    }

    #[test]
    fn removing_rows_and_columns_shrinks_the_grid() {
        let mut g = BlockMatrix::new(vec![
            vec![Some(dense(1, 1, 1.0)), Some(dense(1, 2, 2.0))],
            vec![Some(dense(2, 1, 3.0)), None],
        ])
        .unwrap();
        g.remove_block_col(0).unwrap();
        assert_eq!(g.block_cols(), 1);
        g.remove_block_row(1).unwrap();
        assert_eq!(g.block_rows(), 1);
        assert_eq!(g.sizes().unwrap(), (vec![Some(1)], vec![Some(2)]));
        assert!(g.remove_block_row(3).is_err());
    }
}
