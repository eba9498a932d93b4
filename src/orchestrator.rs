use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tracing::{error, info, warn};

use crate::capability::Capabilities;
use crate::clustering::{AspectClusterer, ClusterResult, ClusterSettings};
use crate::config::Settings;
use crate::metrics::{ANALYSIS_COMMENTS_TOTAL, ANALYSIS_WARNINGS_TOTAL, CLUSTERING_FALLBACKS_TOTAL};
use crate::preprocess::normalize_batch;
use crate::sentiment::{ClassifierCache, SentimentScorer};
use crate::types::{
    AnalysisItem, AnalysisResponse, AnalysisSummary, ClusteringAlgorithm, SentimentResult, ValidatedRequest,
};

/// Caps the batch at `max_comments` and each comment at `max_len` characters.
/// Both limits produce a warning instead of an error.
pub fn enforce_limits(comments: Vec<String>, max_comments: usize, max_len: usize) -> (Vec<String>, Vec<String>) {
    let mut warnings = Vec::new();
    let received = comments.len();

    let mut limited = comments;
    if received > max_comments {
        limited.truncate(max_comments);
        warnings.push(format!(
            "Received {received} comments; only the first {max_comments} were analyzed."
        ));
        record_warning("max_comments");
    }

    let mut truncated = 0;
    for comment in &mut limited {
        if let Some((cut, _)) = comment.char_indices().nth(max_len) {
            comment.truncate(cut);
            truncated += 1;
        }
    }
    if truncated > 0 {
        warnings.push(format!("{truncated} comment(s) truncated to {max_len} characters."));
        record_warning("truncated");
    }

    (limited, warnings)
}

fn record_warning(kind: &str) {
    ANALYSIS_WARNINGS_TOTAL.with_label_values(&[kind]).inc();
}

#[derive(Debug)]
enum Blocking<T> {
    Done(T),
    TimedOut,
    Failed(String),
}

/// Runs CPU-bound work on the blocking pool, optionally bounded by `limit`.
/// A timed-out task is detached and left to finish on its own.
async fn run_blocking<T, F>(limit: Option<Duration>, work: F) -> Blocking<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let handle = task::spawn_blocking(work);
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return Blocking::TimedOut,
        },
        None => handle.await,
    };
    match joined {
        Ok(value) => Blocking::Done(value),
        Err(err) => Blocking::Failed(err.to_string()),
    }
}

pub struct AnalysisOrchestrator {
    settings: Arc<Settings>,
    capabilities: Capabilities,
    cache: Arc<ClassifierCache>,
}

impl AnalysisOrchestrator {
    pub fn new(settings: Arc<Settings>, capabilities: Capabilities, cache: Arc<ClassifierCache>) -> Self {
        Self {
            settings,
            capabilities,
            cache,
        }
    }

    pub async fn analyze(&self, request: ValidatedRequest) -> AnalysisResponse {
        let options = request.options;
        let (limited, mut warnings) = enforce_limits(
            request.comments,
            self.settings.max_comments,
            self.settings.max_comment_length,
        );
        let cleaned = Arc::new(normalize_batch(&limited));
        let use_transformers = self.settings.use_transformers && options.use_transformers;

        let (sentiment, clustering) = tokio::join!(
            self.score(cleaned.clone(), use_transformers),
            self.cluster(cleaned, options.num_aspect_clusters, options.clustering_algorithm),
        );
        let (sentiments, sentiment_warning) = sentiment;
        let (clusters, cluster_warning) = clustering;
        warnings.extend(sentiment_warning);
        warnings.extend(cluster_warning);

        ANALYSIS_COMMENTS_TOTAL.inc_by(limited.len() as u64);
        info!(
            n_comments = limited.len(),
            n_clusters = clusters.n_clusters,
            algorithm = %options.clustering_algorithm,
            warnings = warnings.len(),
            "Analysis completed"
        );
        assemble(limited, sentiments, clusters, warnings)
    }

    async fn score(&self, texts: Arc<Vec<String>>, use_transformers: bool) -> (Vec<SentimentResult>, Option<String>) {
        let capabilities = self.capabilities;
        let limit = (use_transformers && capabilities.transformers).then_some(self.settings.sentiment_timeout);

        let work = {
            let texts = texts.clone();
            let cache = self.cache.clone();
            let model_id = self.settings.sentiment_model.clone();
            move || {
                let scorer = SentimentScorer::new(use_transformers, &model_id, &capabilities, &cache);
                scorer.predict_batch(texts.as_slice())
            }
        };

        let failure = match run_blocking(limit, work).await {
            Blocking::Done(results) => return (results, None),
            Blocking::TimedOut => {
                let secs = self.settings.sentiment_timeout.as_secs();
                warn!(timeout_sec = secs, "Sentiment scoring timed out; rescoring without transformers");
                record_warning("sentiment_timeout");
                format!("Sentiment model timed out after {secs}s")
            }
            Blocking::Failed(reason) => {
                error!(error = %reason, "Sentiment task failed; rescoring without transformers");
                record_warning("sentiment_failed");
                "Sentiment model failed".to_string()
            }
        };

        let fallback = SentimentScorer::without_transformers(&capabilities);
        let backend = fallback.backend();
        let n_texts = texts.len();
        let results = match run_blocking(None, move || fallback.predict_batch(texts.as_slice())).await {
            Blocking::Done(results) => results,
            _ => {
                error!(backend = backend.as_str(), "Fallback sentiment scoring failed; marking all neutral");
                vec![SentimentResult::neutral(); n_texts]
            }
        };
        (results, Some(format!("{failure}; scores use the {} backend.", backend.as_str())))
    }

    async fn cluster(
        &self,
        texts: Arc<Vec<String>>,
        hint: usize,
        algorithm: ClusteringAlgorithm,
    ) -> (ClusterResult, Option<String>) {
        let clusterer = AspectClusterer::new(self.capabilities, ClusterSettings::from_settings(&self.settings));
        let limit = (algorithm == ClusteringAlgorithm::BerTopic).then_some(self.settings.topic_model_timeout);

        let work = {
            let texts = texts.clone();
            let clusterer = clusterer.clone();
            move || clusterer.cluster(texts.as_slice(), hint, algorithm)
        };

        match run_blocking(limit, work).await {
            Blocking::Done(result) => (result, None),
            Blocking::TimedOut => {
                let secs = self.settings.topic_model_timeout.as_secs();
                warn!(timeout_sec = secs, "Topic model timed out; falling back to kmeans");
                CLUSTERING_FALLBACKS_TOTAL
                    .with_label_values(&[algorithm.as_str(), "timeout"])
                    .inc();
                record_warning("topic_timeout");
                let n_texts = texts.len();
                let result = match run_blocking(None, move || clusterer.topic_fallback(texts.as_slice())).await {
                    Blocking::Done(result) => result,
                    _ => ClusterResult::empty(n_texts),
                };
                (
                    result,
                    Some(format!(
                        "Topic model timed out after {secs}s; aspects were clustered with kmeans."
                    )),
                )
            }
            Blocking::Failed(reason) => {
                error!(algorithm = %algorithm, error = %reason, "Clustering task failed");
                CLUSTERING_FALLBACKS_TOTAL
                    .with_label_values(&[algorithm.as_str(), "panic"])
                    .inc();
                (ClusterResult::empty(texts.len()), None)
            }
        }
    }
}

/// Zips per-index results into items and builds the summary.
pub fn assemble(
    comments: Vec<String>,
    sentiments: Vec<SentimentResult>,
    clusters: ClusterResult,
    warnings: Vec<String>,
) -> AnalysisResponse {
    let aspects = clusters.aspects();
    let items: Vec<AnalysisItem> = comments
        .into_iter()
        .zip(sentiments)
        .enumerate()
        .map(|(idx, (text, sentiment))| AnalysisItem {
            text,
            sentiment,
            cluster_id: clusters.labels.get(idx).copied().flatten(),
        })
        .collect();

    AnalysisResponse {
        summary: AnalysisSummary {
            n_comments: items.len(),
            n_clusters: aspects.len(),
            aspects,
        },
        items,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisOptions, SentimentLabel};

    fn orchestrator(pairs: &[(&str, &str)]) -> AnalysisOrchestrator {
        let settings = Settings::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap();
        AnalysisOrchestrator::new(
            Arc::new(settings),
            Capabilities::detect().without(&["transformers"]),
            Arc::new(ClassifierCache::new()),
        )
    }

    fn request(comments: &[&str], options: AnalysisOptions) -> ValidatedRequest {
        ValidatedRequest {
            comments: comments.iter().map(|c| c.to_string()).collect(),
            options,
        }
    }

    fn assert_consistent(response: &AnalysisResponse) {
        assert_eq!(response.summary.n_comments, response.items.len());
        assert_eq!(response.summary.n_clusters, response.summary.aspects.len());
        for aspect in &response.summary.aspects {
            let members = response
                .items
                .iter()
                .filter(|item| item.cluster_id == Some(aspect.cluster_id))
                .count();
            assert!(aspect.size > 0);
            assert_eq!(aspect.size, members);
        }
        for item in &response.items {
            assert!((0.0..=1.0).contains(&item.sentiment.score));
            if let Some(id) = item.cluster_id {
                assert!(response.summary.aspects.iter().any(|a| a.cluster_id == id));
            }
        }
    }

    #[test]
    fn limits_count_and_length_with_warnings() {
        let comments = vec!["ok".to_string(), "é".repeat(12), "third".to_string()];
        let (limited, warnings) = enforce_limits(comments, 2, 10);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].chars().count(), 10);
        assert_eq!(
            warnings,
            vec![
                "Received 3 comments; only the first 2 were analyzed.".to_string(),
                "1 comment(s) truncated to 10 characters.".to_string(),
            ]
        );
    }

    #[test]
    fn no_warnings_within_limits() {
        let (limited, warnings) = enforce_limits(vec!["short".to_string()], 5, 10);
        assert_eq!(limited, vec!["short"]);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn analyzes_three_comments_end_to_end() {
        let response = orchestrator(&[])
            .analyze(request(
                &[
                    "Great content, learned a lot!",
                    "Too long and boring.",
                    "Audio was low but editing was good",
                ],
                AnalysisOptions::default(),
            ))
            .await;
        assert_eq!(response.items.len(), 3);
        assert_eq!(response.items[0].text, "Great content, learned a lot!");
        assert_eq!(response.items[0].sentiment.label, SentimentLabel::Positive);
        assert_eq!(response.items[1].sentiment.label, SentimentLabel::Negative);
        assert!(response.warnings.is_empty());
        assert_consistent(&response);
    }

    #[tokio::test]
    async fn three_aspects_cover_every_comment() {
        let options = AnalysisOptions {
            num_aspect_clusters: 3,
            ..AnalysisOptions::default()
        };
        let response = orchestrator(&[])
            .analyze(request(
                &[
                    "Great content, learned a lot!",
                    "Too long and boring.",
                    "Audio was low but editing was good",
                ],
                options,
            ))
            .await;
        assert!(response.summary.n_clusters >= 1);
        assert_eq!(response.summary.aspects.iter().map(|a| a.size).sum::<usize>(), 3);
        assert!(response.items.iter().all(|item| item.cluster_id.is_some()));
        assert_consistent(&response);
    }

    #[tokio::test]
    async fn oversized_comment_is_truncated_with_a_warning() {
        let long = "x".repeat(10_000);
        let response = orchestrator(&[])
            .analyze(request(&[long.as_str(), "short comment"], AnalysisOptions::default()))
            .await;
        assert!(response.warnings.iter().any(|w| w.contains("truncated")));
        assert_eq!(response.items[0].text.chars().count(), 2000);
        assert_consistent(&response);
    }

    #[tokio::test]
    async fn every_algorithm_yields_a_consistent_response() {
        let comments = [
            "the audio is crackling",
            "audio crackling again",
            "great color grading",
            "color grading looks great",
            "more tutorials please",
        ];
        let orchestrator = orchestrator(&[("CLUSTER_REPRESENTATIVES", "2")]);
        for algorithm in [ClusteringAlgorithm::KMeans, ClusteringAlgorithm::Fcm, ClusteringAlgorithm::BerTopic] {
            let options = AnalysisOptions {
                num_aspect_clusters: 2,
                clustering_algorithm: algorithm,
                ..AnalysisOptions::default()
            };
            let response = orchestrator.analyze(request(&comments, options)).await;
            assert_eq!(response.items.len(), comments.len());
            assert!(response.summary.aspects.iter().all(|a| a.representatives.len() <= 2));
            assert_consistent(&response);
        }
    }

    #[tokio::test]
    async fn single_comment_has_no_clusters() {
        let response = orchestrator(&[])
            .analyze(request(&["just one"], AnalysisOptions::default()))
            .await;
        assert_eq!(response.summary.n_clusters, 0);
        assert_eq!(response.items[0].cluster_id, None);
    }

    #[tokio::test]
    async fn blocking_work_can_time_out() {
        let outcome = run_blocking(Some(Duration::from_millis(10)), || {
            std::thread::sleep(Duration::from_millis(200));
            1
        })
        .await;
        assert!(matches!(outcome, Blocking::TimedOut));
        assert!(matches!(run_blocking(None, || 7).await, Blocking::Done(7)));
    }

    #[tokio::test]
    async fn panicking_work_is_reported() {
        let outcome: Blocking<()> = run_blocking(None, || panic!("boom")).await;
        assert!(matches!(outcome, Blocking::Failed(_)));
    }
}
