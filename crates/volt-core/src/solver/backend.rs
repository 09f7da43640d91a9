use crate::{VoltError, VoltResult};
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::SparseColMat;
use faer::Mat;
use sprs::CsMat;
use tracing::trace;

/// Trait for solving square sparse linear systems (Ax = b).
///
/// This is for linear algebra, not optimization. The interior-point solver
/// calls it once per iteration on its KKT system.
pub trait SparseSolver: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> VoltResult<Vec<f64>>;
}

fn check_dimensions(matrix: &CsMat<f64>, rhs: &[f64]) -> VoltResult<usize> {
    let n = matrix.rows();
    if matrix.cols() != n {
        return Err(VoltError::Numeric(format!(
            "matrix must be square, got {}x{}",
            n,
            matrix.cols()
        )));
    }
    if rhs.len() != n {
        return Err(VoltError::Numeric(format!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        )));
    }
    trace!(n, nnz = matrix.nnz(), "solving linear system");
    Ok(n)
}

fn densify(matrix: &CsMat<f64>, n: usize) -> Vec<Vec<f64>> {
    let mut dense = vec![vec![0.0; n]; n];
    for (&value, (row, col)) in matrix.iter() {
        dense[row][col] += value;
    }
    dense
}

fn check_finite(solution: Vec<f64>, backend: &str) -> VoltResult<Vec<f64>> {
    if solution.iter().all(|v| v.is_finite()) {
        Ok(solution)
    } else {
        Err(VoltError::Numeric(format!(
            "{backend}: matrix is singular or badly conditioned"
        )))
    }
}

/// Dense Gauss-Jordan elimination with partial pivoting.
///
/// Reference backend for small systems: it densifies the matrix, so memory
/// grows with n². A pivot is only rejected when it is exactly zero.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl SparseSolver for GaussSolver {
    fn name(&self) -> &'static str {
        "gauss"
    }

    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> VoltResult<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut a = densify(matrix, n);
        let mut b = rhs.to_vec();

        for i in 0..n {
            let mut pivot = i;
            for row in i + 1..n {
                if a[row][i].abs() > a[pivot][i].abs() {
                    pivot = row;
                }
            }
            if pivot != i {
                a.swap(i, pivot);
                b.swap(i, pivot);
            }

            let diag = a[i][i];
            if diag == 0.0 || !diag.is_finite() {
                return Err(VoltError::Numeric(format!(
                    "gauss: singular matrix (zero pivot in column {i})"
                )));
            }

            for value in a[i][i..].iter_mut() {
                *value /= diag;
            }
            b[i] /= diag;

            let pivot_segment = a[i][i..].to_vec();
            let pivot_rhs = b[i];
            for row in 0..n {
                if row == i {
                    continue;
                }
                let factor = a[row][i];
                if factor == 0.0 {
                    continue;
                }
                for (target, &p) in a[row][i..].iter_mut().zip(pivot_segment.iter()) {
                    *target -= factor * p;
                }
                b[row] -= factor * pivot_rhs;
            }
        }

        check_finite(b, self.name())
    }
}

/// Sparse LU from `faer`.
///
/// The `CsMat` triplets go straight into a column-major sparse matrix;
/// symbolic and numeric factorization never form a dense copy.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl SparseSolver for FaerSolver {
    fn name(&self) -> &'static str {
        "faer"
    }

    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> VoltResult<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let triplets: Vec<(usize, usize, f64)> = matrix
            .iter()
            .map(|(&value, (row, col))| (row, col, value))
            .collect();
        let sparse = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| VoltError::Numeric(format!("faer: invalid sparse matrix: {e:?}")))?;

        let symbolic = SymbolicLu::try_new(sparse.symbolic())
            .map_err(|e| VoltError::Numeric(format!("faer: symbolic LU failed: {e:?}")))?;
        let lu = Lu::try_new_with_symbolic(symbolic, sparse.as_ref())
            .map_err(|e| VoltError::Numeric(format!("faer: matrix is singular: {e:?}")))?;

        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let sol = lu.solve(rhs_mat.as_ref());

        let solution = (0..n).map(|i| sol.read(i, 0)).collect();
        check_finite(solution, self.name())
    }
}
