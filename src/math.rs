// src/math.rs

//! Linear algebra helpers for the ISA model.
//!
//! Data lives in `ndarray` arrays throughout the crate; factorizations are
//! delegated to `faer`.

use crate::error::{IsaError, Result};
use faer::linalg::solvers::Solve;
use faer::Mat;
use ndarray::{Array1, Array2};

/// Residual tolerance used to reject solutions of (near-)singular systems.
const RESIDUAL_TOL: f64 = 1e-6;

/// Copy an ndarray matrix into a faer matrix.
pub fn to_faer(a: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a faer matrix into an ndarray matrix.
pub fn from_faer(m: &Mat<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn ensure_square(a: &Array2<f64>, what: &str) -> Result<()> {
    if a.nrows() != a.ncols() {
        return Err(IsaError::invalid(format!(
            "{} requires a square matrix, got {}x{}",
            what,
            a.nrows(),
            a.ncols()
        )));
    }
    Ok(())
}

/// Solve `A X = B` using an LU decomposition with partial pivoting.
///
/// Returns `SingularMatrix` if the solution is not finite or does not
/// reproduce `B` to within a small relative residual.
pub fn solve(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_square(a, "solve")?;
    if a.nrows() != b.nrows() {
        return Err(IsaError::invalid(format!(
            "right-hand side has {} rows, expected {}",
            b.nrows(),
            a.nrows()
        )));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(IsaError::SingularMatrix);
    }

    let a_f = to_faer(a);
    let b_f = to_faer(b);
    let lu = a_f.as_ref().partial_piv_lu();
    let x = from_faer(&lu.solve(b_f.as_ref()));

    if x.iter().any(|v| !v.is_finite()) {
        return Err(IsaError::SingularMatrix);
    }

    let residual = (a.dot(&x) - b).mapv(f64::abs).fold(0.0, |m: f64, &v| m.max(v));
    let b_scale = b.iter().fold(0.0, |m: f64, &v| m.max(v.abs()));
    if residual > RESIDUAL_TOL * (1.0 + b_scale) {
        return Err(IsaError::SingularMatrix);
    }

    Ok(x)
}

/// Invert a square matrix.
pub fn inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_square(a, "inverse")?;
    solve(a, &Array2::eye(a.nrows()))
}

/// Compute the signed log-determinant of a square matrix.
///
/// Returns (sign, log_abs_det) where:
/// - sign is 1.0 or -1.0
/// - log_abs_det is ln(|det(m)|)
///
/// Works from the LU factors, summing `ln|u_ii|`, so determinants beyond
/// the range of `f64` are still representable. A zero or non-finite pivot is
/// reported as `SingularMatrix`.
pub fn sln_det(m: &Array2<f64>) -> Result<(f64, f64)> {
    ensure_square(m, "determinant")?;
    if m.iter().any(|v| !v.is_finite()) {
        return Err(IsaError::SingularMatrix);
    }

    let lu = to_faer(m).as_ref().partial_piv_lu();
    let u = from_faer(&lu.U().to_owned());

    let mut sign = permutation_sign(lu.P().arrays().0);
    let mut log_abs_det = 0.0;
    for i in 0..u.nrows() {
        let pivot = u[[i, i]];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(IsaError::SingularMatrix);
        }
        sign *= pivot.signum();
        log_abs_det += pivot.abs().ln();
    }

    Ok((sign, log_abs_det))
}

/// Sign of a permutation given as an index array: `(-1)^(n - cycles)`.
fn permutation_sign(perm: &[usize]) -> f64 {
    let mut visited = vec![false; perm.len()];
    let mut sign = 1.0;
    for start in 0..perm.len() {
        if visited[start] {
            continue;
        }
        let mut j = start;
        let mut len = 0;
        while !visited[j] {
            visited[j] = true;
            j = perm[j];
            len += 1;
        }
        if len % 2 == 0 {
            sign = -sign;
        }
    }
    sign
}

/// Orthonormal basis of the null space of `a`, returned as rows.
///
/// For an `n × m` matrix of full row rank the result is `(m - n) × m`, and
/// stacking `a` on top of it yields an invertible square matrix. Built by
/// Gram-Schmidt: the rows of `a` are orthonormalized first, then standard
/// basis vectors are projected onto their complement until the space is
/// exhausted.
pub fn orthogonal_complement(a: &Array2<f64>) -> Result<Array2<f64>> {
    let (n, m) = a.dim();
    if n > m {
        return Err(IsaError::invalid(format!(
            "orthogonal complement requires rows <= columns, got {}x{}",
            n, m
        )));
    }

    let mut span: Vec<Array1<f64>> = Vec::with_capacity(m);

    for row in a.rows() {
        let v = project_out(row.to_owned(), &span);
        let norm = v.dot(&v).sqrt();
        if norm < 1e-10 * (1.0 + row.dot(&row).sqrt()) {
            return Err(IsaError::SingularMatrix);
        }
        span.push(v / norm);
    }

    let mut complement = Vec::with_capacity(m - n);
    for j in 0..m {
        if span.len() == m {
            break;
        }
        let mut e = Array1::zeros(m);
        e[j] = 1.0;
        let v = project_out(e, &span);
        let norm = v.dot(&v).sqrt();
        if norm > 1e-6 {
            let q = v / norm;
            span.push(q.clone());
            complement.push(q);
        }
    }

    let mut out = Array2::zeros((complement.len(), m));
    for (i, q) in complement.iter().enumerate() {
        out.row_mut(i).assign(q);
    }
    Ok(out)
}

/// Remove the components of `v` along the orthonormal vectors in `span`.
fn project_out(mut v: Array1<f64>, span: &[Array1<f64>]) -> Array1<f64> {
    // two passes keep the result orthogonal to working precision
    for _ in 0..2 {
        for q in span {
            let c = q.dot(&v);
            v.scaled_add(-c, q);
        }
    }
    v
}
