//! Density-based topic model.
//!
//! Documents are embedded as unit-length LSA vectors, grouped with DBSCAN
//! (points left unassigned are outliers) and each topic is described with a
//! class-based TF-IDF: term counts pooled per topic, L1-normalized, weighted
//! by `ln(1 + avg_words_per_topic / term_frequency)`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use linfa::traits::Transformer;
use linfa::DatasetBase;
use linfa_clustering::Dbscan;
use ndarray::Array1;
use tracing::debug;

use super::keywords::{top_terms, TOP_KEYWORDS};
use super::svd;
use super::tfidf::{TermCounts, TfidfMatrix};
use super::{NativeCluster, NativeClustering};
use crate::error::ClusterError;

const MAX_EMBEDDING_DIM: usize = 5;
const TOPIC_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopicParams {
    pub min_topic_size: usize,
    pub epsilon: f64,
}

impl Default for TopicParams {
    fn default() -> Self {
        Self {
            min_topic_size: 2,
            epsilon: 0.9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopicModel {
    assignments: Vec<Option<usize>>,
    topic_words: BTreeMap<usize, Vec<String>>,
    topic_vectors: BTreeMap<usize, Array1<f64>>,
    doc_vectors: Vec<TermCounts>,
}

impl TopicModel {
    pub fn fit(matrix: &TfidfMatrix, params: TopicParams) -> Result<Self, ClusterError> {
        let n_docs = matrix.n_documents();
        let dim = n_docs
            .saturating_sub(1)
            .min(matrix.n_features())
            .clamp(1, MAX_EMBEDDING_DIM);
        let mut embedding = svd::reduce(&matrix.vectors, dim)?;
        svd::normalize_rows(&mut embedding);

        let dataset = DatasetBase::from(embedding);
        let clustered = Dbscan::params(params.min_topic_size)
            .tolerance(params.epsilon)
            .transform(dataset)
            .map_err(|e| ClusterError::Backend(format!("DBSCAN failed: {e:?}")))?;
        let assignments: Vec<Option<usize>> = clustered.targets().iter().copied().collect();

        let mut pooled: BTreeMap<usize, Array1<f64>> = BTreeMap::new();
        for (doc, topic) in assignments.iter().enumerate() {
            if let Some(topic) = topic {
                let acc = pooled
                    .entry(*topic)
                    .or_insert_with(|| Array1::zeros(matrix.n_features()));
                for &(col, count) in &matrix.counts[doc] {
                    acc[col] += count;
                }
            }
        }

        let idf = class_idf(pooled.values(), matrix.n_features());
        let topic_vectors: BTreeMap<usize, Array1<f64>> = pooled
            .into_iter()
            .map(|(topic, counts)| (topic, weigh(&counts, &idf)))
            .collect();
        let topic_words = topic_vectors
            .iter()
            .map(|(&topic, vector)| (topic, top_terms(vector.view(), &matrix.terms, TOPIC_WORDS)))
            .collect();

        let doc_vectors = matrix.counts.iter().map(|counts| weigh_sparse(counts, &idf)).collect();

        let outliers = assignments.iter().filter(|topic| topic.is_none()).count();
        debug!(n_docs, topics = topic_vectors.len(), outliers, "Topic model fitted");
        Ok(Self {
            assignments,
            topic_words,
            topic_vectors,
            doc_vectors,
        })
    }

    /// Topic per document; `None` marks an outlier.
    pub fn topics(&self) -> &[Option<usize>] {
        &self.assignments
    }

    pub fn topic_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.topic_vectors.keys().copied()
    }

    /// Up to ten descriptive terms for `topic`, strongest first.
    pub fn topic_words(&self, topic: usize) -> Option<&[String]> {
        self.topic_words.get(&topic).map(Vec::as_slice)
    }

    /// Members of `topic` most similar to its c-TF-IDF vector, best first.
    pub fn representative_docs(&self, topic: usize, k: usize) -> Result<Vec<usize>, ClusterError> {
        let center = self
            .topic_vectors
            .get(&topic)
            .ok_or_else(|| ClusterError::Backend(format!("unknown topic {topic}")))?;

        let mut scored: Vec<(usize, f64)> = self
            .assignments
            .iter()
            .enumerate()
            .filter(|&(_, assigned)| *assigned == Some(topic))
            .map(|(doc, _)| (doc, cosine(&self.doc_vectors[doc], center)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        Ok(scored.into_iter().take(k).map(|(doc, _)| doc).collect())
    }
}

/// `ln(1 + A / f_w)` where `A` is the mean word count per topic and `f_w`
/// the frequency of term `w` across all topics.
fn class_idf<'a>(classes: impl Iterator<Item = &'a Array1<f64>>, n_features: usize) -> Array1<f64> {
    let mut frequency = Array1::<f64>::zeros(n_features);
    let mut n_classes = 0usize;
    for counts in classes {
        frequency += counts;
        n_classes += 1;
    }
    if n_classes == 0 {
        return frequency;
    }
    let average = frequency.sum() / n_classes as f64;
    frequency.mapv(|f| if f > 0.0 { (1.0 + average / f).ln() } else { 0.0 })
}

fn weigh(counts: &Array1<f64>, idf: &Array1<f64>) -> Array1<f64> {
    let total = counts.sum();
    if total <= 0.0 {
        return Array1::zeros(counts.len());
    }
    counts / total * idf
}

fn weigh_sparse(counts: &[(usize, f64)], idf: &Array1<f64>) -> TermCounts {
    let total: f64 = counts.iter().map(|&(_, count)| count).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    counts
        .iter()
        .map(|&(col, count)| (col, count / total * idf[col]))
        .collect()
}

fn cosine(sparse: &[(usize, f64)], dense: &Array1<f64>) -> f64 {
    let sparse_norm = sparse.iter().map(|&(_, v)| v * v).sum::<f64>().sqrt();
    let norm = sparse_norm * dense.dot(dense).sqrt();
    if norm > 0.0 {
        sparse.iter().map(|&(col, v)| v * dense[col]).sum::<f64>() / norm
    } else {
        0.0
    }
}

pub fn run<S: AsRef<str>>(
    texts: &[S],
    matrix: &TfidfMatrix,
    params: TopicParams,
    representatives: usize,
) -> Result<NativeClustering, ClusterError> {
    let model = TopicModel::fit(matrix, params)?;

    let clusters = model
        .topic_ids()
        .map(|topic| {
            let keywords = model
                .topic_words(topic)
                .map(|words| words.iter().take(TOP_KEYWORDS).cloned().collect())
                .unwrap_or_default();
            let docs = model.representative_docs(topic, representatives).unwrap_or_else(|err| {
                debug!(topic, error = %err, "Representative lookup failed; using first members");
                model
                    .topics()
                    .iter()
                    .enumerate()
                    .filter(|&(_, assigned)| *assigned == Some(topic))
                    .map(|(doc, _)| doc)
                    .take(representatives)
                    .collect()
            });
            NativeCluster {
                id: topic,
                keywords,
                representatives: docs.into_iter().map(|doc| texts[doc].as_ref().to_string()).collect(),
            }
        })
        .collect();

    Ok(NativeClustering {
        labels: model.topics().to_vec(),
        clusters,
    })
}
