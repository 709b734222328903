//! Numeric utilities shared by the GSM and ISA models.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

/// Column-wise log-sum-exp: `log Σ_i exp(a[i, j])` for every column `j`.
///
/// The column maximum is subtracted before exponentiating, so large
/// magnitudes neither overflow nor underflow. Columns consisting only of
/// `-inf` yield `-inf`.
pub fn logsumexp(a: &Array2<f64>) -> Array1<f64> {
    a.map_axis(Axis(0), |column| {
        let max = column.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        if max == f64::INFINITY {
            return f64::INFINITY;
        }
        let sum: f64 = column.iter().map(|&v| (v - max).exp()).sum();
        max + sum.ln()
    })
}

/// Column-wise log-mean-exp: `log (1/m) Σ_i exp(a[i, j])`.
pub fn logmeanexp(a: &Array2<f64>) -> Array1<f64> {
    let log_m = (a.nrows() as f64).ln();
    logsumexp(a) - log_m
}

/// Draw an `m × n` matrix of independent standard normal samples.
pub fn sample_normal(m: usize, n: usize, rng: &mut dyn RngCore) -> Array2<f64> {
    Array2::from_shape_simple_fn((m, n), || rng.sample(StandardNormal))
}

/// Draw an index from a discrete distribution given by `probs`.
///
/// `probs` need not be normalized exactly; the draw is made against its sum.
pub fn sample_categorical(probs: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> usize {
    let total: f64 = probs.sum();
    let u = rng.random::<f64>() * total;

    let mut cumulative = 0.0;
    for (k, &p) in probs.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return k;
        }
    }

    // u landed on the rounding slack at the top end
    probs
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(probs.len().saturating_sub(1))
}

/// Compute the Amari distance between two matrices.
///
/// The Amari distance measures how close `W @ A` is to a permutation
/// and scaling matrix. It equals 0 when W perfectly unmixes A. Useful for
/// checking whether a learned basis recovered a known mixing matrix.
///
/// # Arguments
/// * `w` - Unmixing matrix (e.g. the inverse of a learned basis)
/// * `a` - Mixing matrix
///
/// # Returns
/// * Amari distance (0 = perfect separation)
pub fn amari_distance(w: &Array2<f64>, a: &Array2<f64>) -> f64 {
    let p = w.dot(a);
    let n = p.nrows() as f64;

    let s = |r: &Array2<f64>| -> f64 {
        let mut sum = 0.0;
        for row in r.rows() {
            let row_sum: f64 = row.iter().map(|&x| x * x).sum();
            let row_max: f64 = row.iter().map(|&x| x * x).fold(0.0, f64::max);
            if row_max > 1e-15 {
                sum += row_sum / row_max - 1.0;
            }
        }
        sum
    };

    let p_abs = p.mapv(f64::abs);
    let p_abs_t = p_abs.t().to_owned();

    (s(&p_abs) + s(&p_abs_t)) / (2.0 * n)
}
