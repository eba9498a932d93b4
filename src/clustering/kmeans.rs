use std::collections::HashSet;

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::Array1;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::debug;

use super::keywords::{closest_members, top_terms, TOP_KEYWORDS};
use super::tfidf::{TermCounts, TfidfMatrix};
use super::{NativeCluster, NativeClustering};
use crate::error::ClusterError;

pub const KMEANS_SEED: u64 = 42;
const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-4;

/// Hard k-means over the TF-IDF rows with a fixed seed.
pub fn run<S: AsRef<str>>(
    texts: &[S],
    matrix: &TfidfMatrix,
    k: usize,
    representatives: usize,
) -> Result<NativeClustering, ClusterError> {
    // k-means++ cannot seed more centroids than there are distinct points.
    let k = k.min(distinct_rows(&matrix.counts)).max(1);
    let dataset = DatasetBase::from(matrix.vectors.view());
    let rng = Xoshiro256Plus::seed_from_u64(KMEANS_SEED);
    let model = KMeans::params_with_rng(k, rng)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|e| ClusterError::Backend(format!("k-means fit failed: {e}")))?;

    let labels: Array1<usize> = model.predict(&matrix.vectors);
    let centroids = model.centroids();
    if centroids.iter().any(|v| !v.is_finite()) {
        return Err(ClusterError::Numerical("k-means produced non-finite centroids".into()));
    }

    let clusters = (0..centroids.nrows())
        .map(|cluster| {
            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|&(_, &label)| label == cluster)
                .map(|(idx, _)| idx)
                .collect();
            let centroid = centroids.row(cluster);
            NativeCluster {
                id: cluster,
                keywords: top_terms(centroid, &matrix.terms, TOP_KEYWORDS),
                representatives: closest_members(&matrix.vectors, &members, centroid, representatives)
                    .into_iter()
                    .map(|idx| texts[idx].as_ref().to_string())
                    .collect(),
            }
        })
        .collect();

    debug!(k, inertia = model.inertia(), "k-means converged");
    Ok(NativeClustering {
        labels: labels.iter().map(|&label| Some(label)).collect(),
        clusters,
    })
}

/// Rows with identical counts have identical TF-IDF vectors.
fn distinct_rows(counts: &[TermCounts]) -> usize {
    counts
        .iter()
        .map(|row| row.iter().map(|&(col, count)| (col, count.to_bits())).collect::<Vec<_>>())
        .collect::<HashSet<_>>()
        .len()
}
