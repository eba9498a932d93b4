//! Truncated SVD without LAPACK.
//!
//! The leading eigenvectors of the smaller Gram matrix come from randomized
//! block subspace iteration: a seeded block of `components + OVERSAMPLES`
//! columns is multiplied through the Gram matrix a fixed number of times,
//! then a Rayleigh-Ritz step solves the small projected problem with cyclic
//! Jacobi rotations. The projection returned is `X·V = U·Σ` (documents x
//! components), matching an uncentered truncated SVD.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::error::ClusterError;

const OVERSAMPLES: usize = 10;
const SUBSPACE_PASSES: usize = 7;
const JACOBI_SWEEPS: usize = 64;
const JACOBI_TOLERANCE: f64 = 1e-22;
const DEPENDENCE_TOLERANCE: f64 = 1e-10;
const RANK_EPSILON: f64 = 1e-12;
const SEED: u64 = 42;

/// Projects `x` onto its `components` leading singular directions.
pub fn reduce(x: &Array2<f64>, components: usize) -> Result<Array2<f64>, ClusterError> {
    let (n_docs, n_features) = x.dim();
    if components == 0 || components > n_features {
        return Err(ClusterError::Numerical(format!(
            "cannot keep {components} components of {n_features} features"
        )));
    }

    let docs_side = n_docs <= n_features;
    let gram = if docs_side { x.dot(&x.t()) } else { x.t().dot(x) };
    let (values, vectors) = leading_eigenpairs(&gram, components.min(gram.nrows()));

    let mut reduced = Array2::<f64>::zeros((n_docs, components));
    for (c, &lambda) in values.iter().enumerate() {
        if lambda <= RANK_EPSILON {
            continue;
        }
        let column = if docs_side {
            vectors.column(c).mapv(|u| u * lambda.sqrt())
        } else {
            x.dot(&vectors.column(c))
        };
        reduced.column_mut(c).assign(&flip_sign(column));
    }

    if reduced.iter().any(|v| !v.is_finite()) {
        return Err(ClusterError::Numerical("SVD produced non-finite values".into()));
    }
    Ok(reduced)
}

/// Makes the largest-magnitude entry positive so the output is deterministic.
fn flip_sign(column: Array1<f64>) -> Array1<f64> {
    let pivot = column
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        -column
    } else {
        column
    }
}

/// Leading `count` eigenpairs of a symmetric positive semi-definite matrix,
/// eigenvalues descending.
fn leading_eigenpairs(matrix: &Array2<f64>, count: usize) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let width = (count + OVERSAMPLES).min(n);
    let mut rng = Xoshiro256Plus::seed_from_u64(SEED);

    let mut basis = Array2::from_shape_fn((n, width), |_| rng.gen::<f64>() - 0.5);
    orthonormalize_columns(&mut basis);
    for _ in 0..SUBSPACE_PASSES {
        basis = matrix.dot(&basis);
        orthonormalize_columns(&mut basis);
    }

    let projected = basis.t().dot(matrix).dot(&basis);
    let (ritz_values, ritz_vectors) = symmetric_eigen(projected);

    let mut order: Vec<usize> = (0..width).collect();
    order.sort_by(|&a, &b| ritz_values[b].total_cmp(&ritz_values[a]));

    let mut values = Vec::with_capacity(count);
    let mut vectors = Array2::<f64>::zeros((n, count));
    for (c, &pick) in order.iter().take(count).enumerate() {
        values.push(ritz_values[pick].max(0.0));
        vectors.column_mut(c).assign(&basis.dot(&ritz_vectors.column(pick)));
    }
    (values, vectors)
}

/// Gram-Schmidt with one re-orthogonalization pass. Columns that are
/// numerically dependent on earlier ones are zeroed.
fn orthonormalize_columns(q: &mut Array2<f64>) {
    for j in 0..q.ncols() {
        let mut column = q.column(j).to_owned();
        let original = column.dot(&column).sqrt();
        for _ in 0..2 {
            for i in 0..j {
                let previous = q.column(i);
                let projection = column.dot(&previous);
                column.scaled_add(-projection, &previous);
            }
        }
        let norm = column.dot(&column).sqrt();
        if original > 0.0 && norm > DEPENDENCE_TOLERANCE * original {
            column /= norm;
        } else {
            column.fill(0.0);
        }
        q.column_mut(j).assign(&column);
    }
}

/// Cyclic Jacobi eigen-decomposition of a small symmetric matrix. Returns
/// the diagonal after convergence and the accumulated rotations as columns.
fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let m = a.nrows();
    let mut v = Array2::<f64>::eye(m);
    let scale = a.iter().map(|x| x * x).sum::<f64>().max(f64::MIN_POSITIVE);

    for _ in 0..JACOBI_SWEEPS {
        let off: f64 = (0..m)
            .flat_map(|p| (p + 1..m).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]] * a[[p, q]])
            .sum();
        if off <= JACOBI_TOLERANCE * scale {
            break;
        }
        for p in 0..m {
            for q in p + 1..m {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..m {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..m {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..m {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..m).map(|i| a[[i, i]]).collect(), v)
}

/// L2-normalizes each row in place; zero rows are left untouched.
pub fn normalize_rows(x: &mut Array2<f64>) {
    for mut row in x.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
}
