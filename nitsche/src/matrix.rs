//! Global sparse matrix with a fixed sparsity pattern.

use sprs::CsMat;

use crate::Error;

/// Collects the couplings of a global matrix before any values are assembled.
#[derive(Clone, Debug)]
pub struct SparsityPattern {
    rows: Vec<Vec<usize>>,
}

impl SparsityPattern {
    pub fn new(size: usize) -> Self {
        SparsityPattern {
            rows: vec![Vec::new(); size],
        }
    }

    /// Couples every dof in `rows` with every dof in `cols`.
    pub fn insert_block(&mut self, rows: &[usize], cols: &[usize]) {
        for &r in rows {
            self.rows[r].extend_from_slice(cols);
        }
    }

    /// Compresses the pattern into a zero-valued CSR matrix.
    pub fn build(self) -> GlobalMatrix {
        let size = self.rows.len();
        let mut indptr = Vec::with_capacity(size + 1);
        let mut indices = Vec::new();
        indptr.push(0);
        for mut row in self.rows.into_iter() {
            row.sort_unstable();
            row.dedup();
            indices.extend_from_slice(&row);
            indptr.push(indices.len());
        }
        let data = vec![0.0; indices.len()];
        GlobalMatrix {
            mat: CsMat::new((size, size), indptr, indices, data),
        }
    }
}

/// Square CSR matrix whose structure never changes after construction.
///
/// Values are accumulated with [`GlobalMatrix::add`]; adding to a location outside of the
/// pattern is an error rather than a silent reallocation.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalMatrix {
    mat: CsMat<f64>,
}

impl GlobalMatrix {
    #[inline]
    pub fn size(&self) -> usize {
        self.mat.rows()
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.mat.nnz()
    }

    pub fn view(&self) -> sprs::CsMatView<f64> {
        self.mat.view()
    }

    pub fn values(&self) -> &[f64] {
        self.mat.data()
    }

    pub fn zero(&mut self) {
        self.mat.data_mut().iter_mut().for_each(|x| *x = 0.0);
    }

    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<(), Error> {
        match self.mat.get_mut(row, col) {
            Some(entry) => {
                *entry += value;
                Ok(())
            }
            None => Err(Error::SparsityViolation { row, col }),
        }
    }

    /// Scatter-adds a dense row-major local matrix.
    ///
    /// Dofs given as `None` are skipped along with their rows and columns.
    pub fn add_local(&mut self, dofs: &[Option<usize>], local: &[f64]) -> Result<(), Error> {
        let n = dofs.len();
        debug_assert_eq!(local.len(), n * n);
        for (i, row) in dofs.iter().enumerate() {
            let row = match row {
                Some(row) => *row,
                None => continue,
            };
            for (j, col) in dofs.iter().enumerate() {
                if let Some(col) = col {
                    let value = local[i * n + j];
                    if value != 0.0 {
                        self.add(row, *col, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds all entries of `other`, whose pattern must be contained in this one.
    pub fn add_matrix(&mut self, other: &GlobalMatrix) -> Result<(), Error> {
        if other.size() != self.size() {
            return Err(Error::SizeMismatch);
        }
        for (row, vec) in other.mat.outer_iterator().enumerate() {
            for (col, &v) in vec.iter() {
                self.add(row, col, v)?;
            }
        }
        Ok(())
    }

    /// Value at the given location, zero if it is outside of the pattern.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.mat.get(row, col).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.mat.get(row, col).is_some()
    }

    /// Computes `out = A x`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        for (row, vec) in self.mat.outer_iterator().enumerate() {
            out[row] = vec.iter().map(|(j, &v)| v * x[j]).sum();
        }
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.size()).map(|i| self.get(i, i)).collect()
    }

    pub fn to_dense(&self) -> na::DMatrix<f64> {
        let n = self.size();
        let mut dense = na::DMatrix::zeros(n, n);
        for (row, vec) in self.mat.outer_iterator().enumerate() {
            for (col, &v) in vec.iter() {
                dense[(row, col)] = v;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scatter_into_fixed_pattern() {
        let mut pattern = SparsityPattern::new(4);
        pattern.insert_block(&[0, 1], &[0, 1]);
        pattern.insert_block(&[2, 3], &[2, 3]);
        pattern.insert_block(&[1, 0], &[1]);
        let mut mat = pattern.build();
        assert_eq!(mat.nnz(), 8);

        let local = [1.0, 2.0, 3.0, 4.0];
        mat.add_local(&[Some(0), Some(1)], &local).unwrap();
        mat.add_local(&[Some(0), Some(1)], &local).unwrap();
        mat.add_local(&[None, Some(3)], &local).unwrap();
        assert_eq!(mat.get(0, 1), 4.0);
        assert_eq!(mat.get(1, 1), 8.0);
        assert_eq!(mat.get(3, 3), 4.0);

        let mut out = vec![0.0; 4];
        mat.mul_vec(&[1.0, 1.0, 1.0, 1.0], &mut out);
        assert_eq!(out, vec![6.0, 14.0, 0.0, 4.0]);

        assert!(matches!(
            mat.add(0, 3, 1.0),
            Err(Error::SparsityViolation { row: 0, col: 3 })
        ));

        mat.zero();
        assert!(mat.values().iter().all(|&v| v == 0.0));
        assert!(mat.contains(2, 3));
    }
}
