//! Aspect clustering over cleaned comments.
//!
//! Every algorithm produces a [`NativeClustering`] keyed by its own cluster
//! ids; [`NativeClustering::into_dense`] turns that into the uniform
//! [`ClusterResult`] with ids `0..n_clusters` and no empty clusters. Any
//! [`ClusterError`] collapses into [`ClusterResult::empty`].

pub mod fcm;
pub mod keywords;
pub mod kmeans;
pub mod svd;
pub mod tfidf;
pub mod topic;

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::capability::Capabilities;
use crate::config::Settings;
use crate::error::ClusterError;
use crate::metrics::{CLUSTERING_FALLBACKS_TOTAL, CLUSTERING_TIME_SECONDS};
use crate::types::{AspectCluster, ClusteringAlgorithm};

use self::tfidf::{TfidfMatrix, TfidfParams};
use self::topic::TopicParams;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterResult {
    /// One entry per input text; `None` for outliers or when nothing ran.
    pub labels: Vec<Option<usize>>,
    pub cluster_ids: Vec<usize>,
    pub keywords: Vec<Vec<String>>,
    pub sizes: Vec<usize>,
    pub n_clusters: usize,
    pub representatives: Vec<Vec<String>>,
}

impl ClusterResult {
    pub fn empty(n_texts: usize) -> Self {
        Self {
            labels: vec![None; n_texts],
            ..Self::default()
        }
    }

    pub fn aspects(&self) -> Vec<AspectCluster> {
        self.cluster_ids
            .iter()
            .enumerate()
            .map(|(idx, &cluster_id)| AspectCluster {
                cluster_id,
                keywords: self.keywords.get(idx).cloned().unwrap_or_default(),
                size: self.sizes.get(idx).copied().unwrap_or_default(),
                representatives: self.representatives.get(idx).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// One cluster as an algorithm reports it, under the algorithm's own id.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCluster {
    pub id: usize,
    pub keywords: Vec<String>,
    pub representatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeClustering {
    pub labels: Vec<Option<usize>>,
    pub clusters: Vec<NativeCluster>,
}

impl NativeClustering {
    /// Remaps the ids that actually label a text to `0..k` in ascending
    /// native order. Clusters nobody belongs to are dropped and sizes are
    /// counted from the labels.
    pub fn into_dense(self) -> ClusterResult {
        let mut sizes_by_id: BTreeMap<usize, usize> = BTreeMap::new();
        for label in self.labels.iter().flatten() {
            *sizes_by_id.entry(*label).or_default() += 1;
        }
        if sizes_by_id.is_empty() {
            return ClusterResult::empty(self.labels.len());
        }

        let dense: BTreeMap<usize, usize> = sizes_by_id
            .keys()
            .enumerate()
            .map(|(dense_id, &native)| (native, dense_id))
            .collect();
        let mut by_id: BTreeMap<usize, NativeCluster> =
            self.clusters.into_iter().map(|cluster| (cluster.id, cluster)).collect();

        let mut result = ClusterResult {
            labels: self
                .labels
                .iter()
                .map(|label| label.and_then(|native| dense.get(&native).copied()))
                .collect(),
            ..ClusterResult::default()
        };
        for (native, size) in sizes_by_id {
            let cluster = by_id.remove(&native);
            result.cluster_ids.push(dense[&native]);
            result.sizes.push(size);
            result
                .keywords
                .push(cluster.as_ref().map(|c| c.keywords.clone()).unwrap_or_default());
            result
                .representatives
                .push(cluster.map(|c| c.representatives).unwrap_or_default());
        }
        result.n_clusters = result.cluster_ids.len();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSettings {
    pub representatives: usize,
    pub topic_fallback_clusters: usize,
    pub topic_min_size: usize,
    pub topic_epsilon: f64,
}

impl ClusterSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            representatives: settings.cluster_representatives,
            topic_fallback_clusters: settings.topic_fallback_clusters,
            topic_min_size: settings.topic_min_size,
            topic_epsilon: settings.topic_epsilon,
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            representatives: 3,
            topic_fallback_clusters: 5,
            topic_min_size: 2,
            topic_epsilon: 0.9,
        }
    }
}

/// `max(2, min(hint, n_docs))`.
pub fn clamp_clusters(hint: usize, n_docs: usize) -> usize {
    hint.min(n_docs).max(2)
}

#[derive(Debug, Clone)]
pub struct AspectClusterer {
    capabilities: Capabilities,
    settings: ClusterSettings,
}

impl AspectClusterer {
    pub fn new(capabilities: Capabilities, settings: ClusterSettings) -> Self {
        Self {
            capabilities,
            settings,
        }
    }

    pub fn cluster<S: AsRef<str>>(&self, texts: &[S], hint: usize, algorithm: ClusteringAlgorithm) -> ClusterResult {
        if texts.len() < 2 {
            debug!(n_texts = texts.len(), "Too few texts to cluster");
            return ClusterResult::empty(texts.len());
        }
        if !self.capabilities.vectorizer {
            debug!("Vectorizer unavailable; skipping clustering");
            return ClusterResult::empty(texts.len());
        }

        let start = Instant::now();
        let result = match self.try_cluster(texts, hint, algorithm) {
            Ok(native) => native.into_dense(),
            Err(err) => {
                warn!(algorithm = %algorithm, error = %err, "Clustering failed; returning empty result");
                CLUSTERING_FALLBACKS_TOTAL
                    .with_label_values(&[algorithm.as_str(), err.label()])
                    .inc();
                ClusterResult::empty(texts.len())
            }
        };

        let elapsed = start.elapsed();
        CLUSTERING_TIME_SECONDS
            .with_label_values(&[algorithm.as_str()])
            .observe(elapsed.as_secs_f64());
        info!(
            algorithm = %algorithm,
            n_texts = texts.len(),
            n_clusters = result.n_clusters,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Clustering completed"
        );
        result
    }

    /// k-means with the configured topic fallback size; used when the topic
    /// model cannot run or runs out of time.
    pub fn topic_fallback<S: AsRef<str>>(&self, texts: &[S]) -> ClusterResult {
        self.cluster(texts, self.settings.topic_fallback_clusters, ClusteringAlgorithm::KMeans)
    }

    fn try_cluster<S: AsRef<str>>(
        &self,
        texts: &[S],
        hint: usize,
        algorithm: ClusteringAlgorithm,
    ) -> Result<NativeClustering, ClusterError> {
        let matrix = tfidf::fit_transform(texts, TfidfParams::default())?;
        let n_docs = matrix.n_documents();
        let representatives = self.settings.representatives;

        match algorithm {
            ClusteringAlgorithm::KMeans => self.kmeans(texts, &matrix, hint),
            ClusteringAlgorithm::Fcm if !self.capabilities.fuzzy => {
                degraded(algorithm, "fuzzy capability disabled");
                self.kmeans(texts, &matrix, hint)
            }
            ClusteringAlgorithm::Fcm => fcm::run(texts, &matrix, clamp_clusters(hint, n_docs), representatives),
            ClusteringAlgorithm::BerTopic if !self.capabilities.topic_model => {
                degraded(algorithm, "topic model capability disabled");
                self.kmeans(texts, &matrix, self.settings.topic_fallback_clusters)
            }
            ClusteringAlgorithm::BerTopic => {
                let params = TopicParams {
                    min_topic_size: self.settings.topic_min_size,
                    epsilon: self.settings.topic_epsilon,
                };
                topic::run(texts, &matrix, params, representatives)
            }
        }
    }

    fn kmeans<S: AsRef<str>>(&self, texts: &[S], matrix: &TfidfMatrix, hint: usize) -> Result<NativeClustering, ClusterError> {
        let k = clamp_clusters(hint, matrix.n_documents());
        kmeans::run(texts, matrix, k, self.settings.representatives)
    }
}

fn degraded(algorithm: ClusteringAlgorithm, reason: &'static str) {
    info!(algorithm = %algorithm, reason, "Falling back to kmeans");
    CLUSTERING_FALLBACKS_TOTAL
        .with_label_values(&[algorithm.as_str(), "capability"])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENTS: [&str; 8] = [
        "great video quality and clear audio",
        "audio was too low in the intro",
        "video quality looks great in 4k",
        "the intro music was way too loud",
        "loved the editing and transitions",
        "editing was smooth, transitions are great",
        "audio mixing needs work",
        "please upload more tutorials like this",
    ];

    fn clusterer(capabilities: Capabilities) -> AspectClusterer {
        AspectClusterer::new(capabilities, ClusterSettings::default())
    }

    fn assert_contract(result: &ClusterResult, n_texts: usize) {
        assert_eq!(result.labels.len(), n_texts);
        assert_eq!(result.n_clusters, result.cluster_ids.len());
        assert_eq!(result.cluster_ids, (0..result.n_clusters).collect::<Vec<_>>());
        assert_eq!(result.sizes.len(), result.n_clusters);
        assert_eq!(result.keywords.len(), result.n_clusters);
        assert_eq!(result.representatives.len(), result.n_clusters);
        for (id, &size) in result.sizes.iter().enumerate() {
            let members = result.labels.iter().filter(|&&label| label == Some(id)).count();
            assert!(size > 0);
            assert_eq!(size, members);
            assert!(result.keywords[id].len() <= 5);
            assert!(result.representatives[id].len() <= 3);
        }
        assert!(result.labels.iter().flatten().all(|&label| label < result.n_clusters));
    }

    #[test]
    fn fewer_than_two_texts_is_empty() {
        let clusterer = clusterer(Capabilities::detect());
        assert_eq!(clusterer.cluster(&["only one"], 5, ClusteringAlgorithm::KMeans), ClusterResult::empty(1));
        let none: [&str; 0] = [];
        assert_eq!(clusterer.cluster(&none, 5, ClusteringAlgorithm::Fcm), ClusterResult::empty(0));
    }

    #[test]
    fn missing_vectorizer_is_empty() {
        let result = clusterer(Capabilities::detect().without(&["vectorizer"])).cluster(
            &COMMENTS,
            3,
            ClusteringAlgorithm::KMeans,
        );
        assert_eq!(result, ClusterResult::empty(COMMENTS.len()));
    }

    #[test]
    fn identical_documents_map_to_empty() {
        let result = clusterer(Capabilities::detect()).cluster(&["same", "same", "same"], 2, ClusteringAlgorithm::KMeans);
        assert_eq!(result.n_clusters, 0);
        assert!(result.labels.iter().all(Option::is_none));
    }

    #[test]
    fn every_algorithm_honours_the_output_contract() {
        let clusterer = clusterer(Capabilities::detect());
        for algorithm in [ClusteringAlgorithm::KMeans, ClusteringAlgorithm::Fcm, ClusteringAlgorithm::BerTopic] {
            let result = clusterer.cluster(&COMMENTS, 3, algorithm);
            assert_contract(&result, COMMENTS.len());
        }
    }

    #[test]
    fn kmeans_assigns_every_text_and_is_deterministic() {
        let clusterer = clusterer(Capabilities::detect());
        let first = clusterer.cluster(&COMMENTS, 3, ClusteringAlgorithm::KMeans);
        let second = clusterer.cluster(&COMMENTS, 3, ClusteringAlgorithm::KMeans);
        assert_eq!(first, second);
        assert!(first.labels.iter().all(Option::is_some));
        assert_eq!(first.sizes.iter().sum::<usize>(), COMMENTS.len());
    }

    #[test]
    fn fcm_is_deterministic_and_assigns_every_text() {
        let clusterer = clusterer(Capabilities::detect());
        let first = clusterer.cluster(&COMMENTS, 3, ClusteringAlgorithm::Fcm);
        let second = clusterer.cluster(&COMMENTS, 3, ClusteringAlgorithm::Fcm);
        assert_eq!(first, second);
        assert!(first.n_clusters >= 1);
        assert!(first.labels.iter().all(Option::is_some));
        assert_eq!(first.sizes.iter().sum::<usize>(), COMMENTS.len());
        assert_contract(&first, COMMENTS.len());
    }

    #[test]
    fn topic_model_groups_paraphrases_and_leaves_outliers_unassigned() {
        let texts = [
            "shipping took forever to arrive honestly",
            "shipping took forever to arrive again",
            "shipping took forever to arrive sadly",
            "battery died quickly after charging today",
            "battery died quickly after charging overnight",
            "battery died quickly after charging twice",
            "zebra xylophone quartz",
        ];
        let result = clusterer(Capabilities::detect()).cluster(&texts, 5, ClusteringAlgorithm::BerTopic);
        assert_contract(&result, texts.len());
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.labels[6], None);
        assert!(result.labels[..3].iter().all(|l| l.is_some() && *l == result.labels[0]));
        assert!(result.labels[3..6].iter().all(|l| l.is_some() && *l == result.labels[3]));
        assert_eq!(result.sizes.iter().sum::<usize>(), 6);
    }

    #[test]
    fn cluster_count_is_clamped() {
        assert_eq!(clamp_clusters(50, 4), 4);
        assert_eq!(clamp_clusters(1, 10), 2);
        assert_eq!(clamp_clusters(5, 2), 2);

        let four = &COMMENTS[..4];
        let result = clusterer(Capabilities::detect()).cluster(four, 50, ClusteringAlgorithm::KMeans);
        assert!(result.n_clusters <= 4);
        assert_contract(&result, 4);
    }

    #[test]
    fn disabled_fuzzy_matches_kmeans() {
        let plain = clusterer(Capabilities::detect()).cluster(&COMMENTS, 3, ClusteringAlgorithm::KMeans);
        let degraded = clusterer(Capabilities::detect().without(&["fuzzy"])).cluster(&COMMENTS, 3, ClusteringAlgorithm::Fcm);
        assert_eq!(plain, degraded);
    }

    #[test]
    fn disabled_topic_model_uses_fallback_cluster_count() {
        let settings = ClusterSettings {
            topic_fallback_clusters: 2,
            ..ClusterSettings::default()
        };
        let expected = AspectClusterer::new(Capabilities::detect(), settings).cluster(&COMMENTS, 2, ClusteringAlgorithm::KMeans);
        let degraded = AspectClusterer::new(Capabilities::detect().without(&["topic_model"]), settings).cluster(
            &COMMENTS,
            7,
            ClusteringAlgorithm::BerTopic,
        );
        assert_eq!(expected, degraded);
    }

    #[test]
    fn densify_drops_empty_and_outlier_ids() {
        let native = NativeClustering {
            labels: vec![Some(4), None, Some(1), Some(4)],
            clusters: vec![
                NativeCluster {
                    id: 1,
                    keywords: vec!["audio".into()],
                    representatives: vec!["b".into()],
                },
                NativeCluster {
                    id: 2,
                    keywords: vec!["never used".into()],
                    representatives: vec![],
                },
                NativeCluster {
                    id: 4,
                    keywords: vec!["video".into()],
                    representatives: vec!["a".into(), "d".into()],
                },
            ],
        };
        let dense = native.into_dense();
        assert_eq!(dense.labels, vec![Some(1), None, Some(0), Some(1)]);
        assert_eq!(dense.cluster_ids, vec![0, 1]);
        assert_eq!(dense.sizes, vec![1, 2]);
        assert_eq!(dense.keywords, vec![vec!["audio".to_string()], vec!["video".to_string()]]);
        assert_eq!(dense.n_clusters, 2);
    }

    #[test]
    fn all_outliers_densify_to_empty() {
        let native = NativeClustering {
            labels: vec![None, None],
            clusters: vec![],
        };
        assert_eq!(native.into_dense(), ClusterResult::empty(2));
    }

    #[test]
    fn aspects_mirror_the_parallel_vectors() {
        let result = clusterer(Capabilities::detect()).cluster(&COMMENTS, 2, ClusteringAlgorithm::KMeans);
        let aspects = result.aspects();
        assert_eq!(aspects.len(), result.n_clusters);
        for aspect in aspects {
            assert_eq!(aspect.size, result.sizes[aspect.cluster_id]);
        }
    }
}
