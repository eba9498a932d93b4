//! Fuzzy c-means over an SVD-reduced TF-IDF space.
//!
//! Memberships `u` are `clusters x samples`; every column sums to one. The
//! update follows the classic Bezdek iteration and stops once the Frobenius
//! norm of the membership change drops below `error`.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::debug;

use super::keywords::{closest_members, top_terms, TOP_KEYWORDS};
use super::svd;
use super::tfidf::TfidfMatrix;
use super::{NativeCluster, NativeClustering};
use crate::error::ClusterError;

const MIN_COMPONENTS: usize = 2;
const MAX_COMPONENTS: usize = 100;
const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct FuzzyParams {
    pub fuzziness: f64,
    pub error: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for FuzzyParams {
    fn default() -> Self {
        Self {
            fuzziness: 2.0,
            error: 0.005,
            max_iterations: 1000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuzzyModel {
    /// `clusters x features`.
    pub centers: Array2<f64>,
    /// `clusters x samples`.
    pub memberships: Array2<f64>,
    pub iterations: usize,
    /// Fuzzy partition coefficient, `1/c` (uniform) to `1` (crisp).
    pub partition_coefficient: f64,
}

impl FuzzyModel {
    /// Index of the strongest membership for each sample.
    pub fn hard_labels(&self) -> Vec<usize> {
        self.memberships
            .axis_iter(Axis(1))
            .map(|column| {
                column
                    .iter()
                    .enumerate()
                    .fold((0, f64::MIN), |best, (idx, &u)| if u > best.1 { (idx, u) } else { best })
                    .0
            })
            .collect()
    }
}

/// Fits `clusters` fuzzy centers to the rows of `data` (`samples x features`).
pub fn cmeans(data: &Array2<f64>, clusters: usize, params: FuzzyParams) -> Result<FuzzyModel, ClusterError> {
    let n_samples = data.nrows();
    if clusters < 2 || clusters > n_samples {
        return Err(ClusterError::Numerical(format!(
            "cannot fit {clusters} fuzzy clusters to {n_samples} samples"
        )));
    }
    if params.fuzziness <= 1.0 {
        return Err(ClusterError::Numerical("fuzziness must exceed 1".into()));
    }

    let mut rng = Xoshiro256Plus::seed_from_u64(params.seed);
    let mut u = Array2::from_shape_fn((clusters, n_samples), |_| rng.gen::<f64>());
    normalize_columns(&mut u);

    let mut centers = Array2::zeros((clusters, data.ncols()));
    let mut iterations = 0;
    while iterations < params.max_iterations {
        let previous = u.clone();
        let (next_centers, next_u) = step(data, &previous, params.fuzziness)?;
        centers = next_centers;
        u = next_u;
        iterations += 1;

        let change = (&u - &previous).mapv(|d| d * d).sum().sqrt();
        if change < params.error {
            break;
        }
    }

    let partition_coefficient = u.mapv(|v| v * v).sum() / n_samples as f64;
    debug!(clusters, iterations, partition_coefficient, "Fuzzy c-means finished");
    Ok(FuzzyModel {
        centers,
        memberships: u,
        iterations,
        partition_coefficient,
    })
}

fn step(data: &Array2<f64>, u: &Array2<f64>, m: f64) -> Result<(Array2<f64>, Array2<f64>), ClusterError> {
    let mut previous = u.clone();
    normalize_columns(&mut previous);
    let um = previous.mapv(|v| v.powf(m));

    let weights = um.sum_axis(Axis(1)).insert_axis(Axis(1));
    let centers = um.dot(data) / &weights;

    let mut distances = Array2::<f64>::zeros(u.dim());
    for (c, center) in centers.axis_iter(Axis(0)).enumerate() {
        for (s, sample) in data.axis_iter(Axis(0)).enumerate() {
            let d = (&sample - &center).mapv(|v| v * v).sum().sqrt();
            distances[[c, s]] = d.max(EPSILON);
        }
    }

    let exponent = -2.0 / (m - 1.0);
    let mut next = distances.mapv(|d| d.powf(exponent));
    let column_sums = next.sum_axis(Axis(0));
    next /= &column_sums.insert_axis(Axis(0));

    if next.iter().chain(centers.iter()).any(|v| !v.is_finite()) {
        return Err(ClusterError::Numerical("fuzzy c-means diverged".into()));
    }
    Ok((centers, next))
}

fn normalize_columns(u: &mut Array2<f64>) {
    let sums = u.sum_axis(Axis(0));
    for (mut column, sum) in u.axis_iter_mut(Axis(1)).zip(sums.iter()) {
        if *sum > 0.0 {
            column /= *sum;
        }
        column.mapv_inplace(|v| v.max(f64::EPSILON));
    }
}

/// Number of SVD components kept before the fuzzy step.
pub fn reduced_dimension(n_docs: usize, n_features: usize) -> usize {
    n_docs
        .saturating_sub(1)
        .min(n_features.saturating_sub(1))
        .clamp(MIN_COMPONENTS, MAX_COMPONENTS)
}

pub fn run<S: AsRef<str>>(
    texts: &[S],
    matrix: &TfidfMatrix,
    k: usize,
    representatives: usize,
) -> Result<NativeClustering, ClusterError> {
    let dim = reduced_dimension(matrix.n_documents(), matrix.n_features());
    let reduced = svd::reduce(&matrix.vectors, dim)?;
    let model = cmeans(&reduced, k, FuzzyParams::default())?;
    let labels = model.hard_labels();

    let clusters = (0..k)
        .map(|cluster| {
            let memberships = model.memberships.row(cluster);
            let centroid = soft_centroid(&matrix.vectors, memberships.to_owned());
            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|&(_, &label)| label == cluster)
                .map(|(idx, _)| idx)
                .collect();
            NativeCluster {
                id: cluster,
                keywords: top_terms(centroid.view(), &matrix.terms, TOP_KEYWORDS),
                representatives: closest_members(&reduced, &members, model.centers.row(cluster), representatives)
                    .into_iter()
                    .map(|idx| texts[idx].as_ref().to_string())
                    .collect(),
            }
        })
        .collect();

    Ok(NativeClustering {
        labels: labels.into_iter().map(Some).collect(),
        clusters,
    })
}

/// `Σ u·x / (Σ u + ε)` in the original TF-IDF space.
fn soft_centroid(vectors: &Array2<f64>, memberships: Array1<f64>) -> Array1<f64> {
    let total = memberships.sum() + EPSILON;
    memberships.dot(vectors) / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::tfidf::{fit_transform, TfidfParams};
    use ndarray::array;

    #[test]
    fn memberships_are_a_partition() {
        let data = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 4.9], [0.0, 0.2]];
        let model = cmeans(&data, 2, FuzzyParams::default()).unwrap();
        for column in model.memberships.axis_iter(Axis(1)) {
            assert!((column.sum() - 1.0).abs() < 1e-9);
            assert!(column.iter().all(|&u| (0.0..=1.0).contains(&u)));
        }
        let labels = model.hard_labels();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[4]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
        assert!(model.partition_coefficient > 0.9);
    }

    #[test]
    fn same_seed_same_model() {
        let data = array![[0.3, 0.1], [0.2, 0.9], [0.8, 0.8], [0.1, 0.4]];
        let a = cmeans(&data, 2, FuzzyParams::default()).unwrap();
        let b = cmeans(&data, 2, FuzzyParams::default()).unwrap();
        assert_eq!(a.memberships, b.memberships);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn rejects_more_clusters_than_samples() {
        let data = array![[0.0], [1.0]];
        assert!(cmeans(&data, 3, FuzzyParams::default()).is_err());
    }

    #[test]
    fn dimension_is_clamped() {
        assert_eq!(reduced_dimension(2, 50), 2);
        assert_eq!(reduced_dimension(10, 6), 5);
        assert_eq!(reduced_dimension(500, 400), 100);
    }

    #[test]
    fn four_comments_cluster_into_two_groups() {
        let texts = [
            "audio crackling loud",
            "audio crackling noise",
            "color grading lovely",
            "color grading superb",
        ];
        let matrix = fit_transform(&texts, TfidfParams::default()).unwrap();
        let result = run(&texts, &matrix, 2, 3).unwrap();
        assert_eq!(result.labels.len(), 4);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[2], result.labels[3]);
        assert_ne!(result.labels[0], result.labels[2]);
        let audio = result.labels[0].unwrap();
        assert!(result.clusters[audio].keywords.iter().any(|k| k.contains("audio")));
    }
}
