use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1};

pub const TOP_KEYWORDS: usize = 5;

/// Highest-weighted terms of a centroid, strongest first. Terms whose weight
/// is not strictly positive are never returned.
pub fn top_terms(centroid: ArrayView1<'_, f64>, terms: &[String], top_n: usize) -> Vec<String> {
    let mut order: Vec<usize> = (0..centroid.len()).collect();
    order.sort_by(|&a, &b| {
        centroid[b]
            .partial_cmp(&centroid[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    order
        .into_iter()
        .take(top_n)
        .filter(|&idx| centroid[idx] > 0.0)
        .filter_map(|idx| terms.get(idx).cloned())
        .collect()
}

/// Up to `k` member indices ordered by ascending Euclidean distance to `center`.
pub fn closest_members(points: &Array2<f64>, members: &[usize], center: ArrayView1<'_, f64>, k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = members
        .iter()
        .map(|&idx| (idx, euclidean_distance(points.row(idx), center)))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    scored.into_iter().take(k).map(|(idx, _)| idx).collect()
}

pub fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
