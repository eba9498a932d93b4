use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MIN_ASPECT_CLUSTERS: i64 = 2;
pub const MAX_ASPECT_CLUSTERS: i64 = 50;
pub const DEFAULT_ASPECT_CLUSTERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub score: f64,
}

impl SentimentResult {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringAlgorithm {
    #[default]
    KMeans,
    Fcm,
    BerTopic,
}

impl ClusteringAlgorithm {
    pub const NAMES: [&'static str; 3] = ["kmeans", "fcm", "bertopic"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
            Self::Fcm => "fcm",
            Self::BerTopic => "bertopic",
        }
    }

    /// Lenient lookup for library callers: unrecognized names run k-means.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(algorithm = name, "Unknown clustering algorithm; using kmeans");
            Self::KMeans
        })
    }
}

impl fmt::Display for ClusteringAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAlgorithm(pub String);

impl FromStr for ClusteringAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmeans" => Ok(Self::KMeans),
            "fcm" => Ok(Self::Fcm),
            "bertopic" => Ok(Self::BerTopic),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub comments: Vec<String>,
    #[serde(default)]
    pub options: Option<RawOptions>,
}

/// Options as received on the wire, before range and choice checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOptions {
    #[serde(default)]
    pub num_aspect_clusters: Option<i64>,
    #[serde(default)]
    pub use_transformers: Option<bool>,
    #[serde(default)]
    pub clustering_algorithm: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub num_aspect_clusters: usize,
    pub use_transformers: bool,
    pub clustering_algorithm: ClusteringAlgorithm,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            num_aspect_clusters: DEFAULT_ASPECT_CLUSTERS,
            use_transformers: true,
            clustering_algorithm: ClusteringAlgorithm::KMeans,
        }
    }
}

/// A request that passed validation: comments are trimmed and non-blank.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub comments: Vec<String>,
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn validate(self) -> Result<ValidatedRequest, Vec<String>> {
        let mut errors = Vec::new();

        if self.comments.is_empty() {
            errors.push("comments: this list may not be empty".to_string());
        }
        let comments: Vec<String> = self.comments.iter().map(|c| c.trim().to_string()).collect();
        for (idx, comment) in comments.iter().enumerate() {
            if comment.is_empty() {
                errors.push(format!("comments[{idx}]: this field may not be blank"));
            }
        }

        let raw = self.options.unwrap_or_default();
        let mut options = AnalysisOptions::default();

        if let Some(n) = raw.num_aspect_clusters {
            if (MIN_ASPECT_CLUSTERS..=MAX_ASPECT_CLUSTERS).contains(&n) {
                options.num_aspect_clusters = n as usize;
            } else {
                errors.push(format!(
                    "options.num_aspect_clusters: must be between {MIN_ASPECT_CLUSTERS} and {MAX_ASPECT_CLUSTERS}"
                ));
            }
        }
        if let Some(flag) = raw.use_transformers {
            options.use_transformers = flag;
        }
        if let Some(name) = raw.clustering_algorithm {
            match name.parse::<ClusteringAlgorithm>() {
                Ok(algorithm) => options.clustering_algorithm = algorithm,
                Err(UnknownAlgorithm(other)) => errors.push(format!(
                    "options.clustering_algorithm: \"{other}\" is not a valid choice ({})",
                    ClusteringAlgorithm::NAMES.join(", ")
                )),
            }
        }

        if errors.is_empty() {
            Ok(ValidatedRequest { comments, options })
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectCluster {
    pub cluster_id: usize,
    pub keywords: Vec<String>,
    pub size: usize,
    pub representatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub n_comments: usize,
    pub n_clusters: usize,
    pub aspects: Vec<AspectCluster>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisItem {
    pub text: String,
    pub sentiment: SentimentResult,
    pub cluster_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub summary: AnalysisSummary,
    pub items: Vec<AnalysisItem>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> AnalysisRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn options_default_when_missing() {
        let validated = request(serde_json::json!({ "comments": ["  hi  "] }))
            .validate()
            .unwrap();
        assert_eq!(validated.comments, vec!["hi"]);
        assert_eq!(validated.options, AnalysisOptions::default());
    }

    #[test]
    fn rejects_blank_comments_and_bad_options() {
        let errors = request(serde_json::json!({
            "comments": ["ok", "   "],
            "options": { "num_aspect_clusters": 1, "clustering_algorithm": "dbscan" }
        }))
        .validate()
        .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("comments[1]"));
    }

    #[test]
    fn rejects_empty_comment_list() {
        let errors = request(serde_json::json!({ "comments": [] })).validate().unwrap_err();
        assert_eq!(errors, vec!["comments: this list may not be empty"]);
    }

    #[test]
    fn algorithm_names_parse_and_default() {
        assert_eq!("FCM".parse::<ClusteringAlgorithm>(), Ok(ClusteringAlgorithm::Fcm));
        assert_eq!(
            ClusteringAlgorithm::from_name_or_default("spectral"),
            ClusteringAlgorithm::KMeans
        );
        assert_eq!(
            ClusteringAlgorithm::from_name_or_default("bertopic"),
            ClusteringAlgorithm::BerTopic
        );
    }

    #[test]
    fn labels_serialize_lowercase() {
        let json = serde_json::to_string(&SentimentResult::neutral()).unwrap();
        assert_eq!(json, r#"{"label":"neutral","score":0.5}"#);
    }
}
