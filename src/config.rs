use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    #[serde(rename = "HTTP_PORT", default = "default_http_port")]
    http_port: u16,
    #[serde(rename = "PROMETHEUS_PORT", default = "default_prometheus_port")]
    prometheus_port: u16,
    #[serde(rename = "LOG_LEVEL", default = "default_log_level")]
    log_level: String,
    #[serde(rename = "MAX_COMMENTS", default = "default_max_comments")]
    max_comments: usize,
    #[serde(rename = "MAX_COMMENT_LENGTH", default = "default_max_comment_length")]
    max_comment_length: usize,
    #[serde(rename = "CLUSTER_REPRESENTATIVES", default = "default_cluster_representatives")]
    cluster_representatives: usize,
    #[serde(rename = "SENTIMENT_MODEL", default = "default_sentiment_model")]
    sentiment_model: String,
    #[serde(rename = "USE_TRANSFORMERS", default = "default_use_transformers")]
    use_transformers: bool,
    #[serde(rename = "SENTIMENT_TIMEOUT_SEC", default = "default_sentiment_timeout_sec")]
    sentiment_timeout_sec: u64,
    #[serde(rename = "TOPIC_MODEL_TIMEOUT_SEC", default = "default_topic_model_timeout_sec")]
    topic_model_timeout_sec: u64,
    #[serde(rename = "TOPIC_FALLBACK_CLUSTERS", default = "default_topic_fallback_clusters")]
    topic_fallback_clusters: usize,
    #[serde(rename = "TOPIC_MIN_SIZE", default = "default_topic_min_size")]
    topic_min_size: usize,
    #[serde(rename = "TOPIC_EPSILON", default = "default_topic_epsilon")]
    topic_epsilon: f64,
    #[serde(rename = "DISABLED_CAPABILITIES", default)]
    disabled_capabilities: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub http_port: u16,
    pub prometheus_port: u16,
    pub log_level: String,
    pub max_comments: usize,
    pub max_comment_length: usize,
    pub cluster_representatives: usize,
    pub sentiment_model: String,
    pub use_transformers: bool,
    pub sentiment_timeout: Duration,
    pub topic_model_timeout: Duration,
    pub topic_fallback_clusters: usize,
    pub topic_min_size: usize,
    pub topic_epsilon: f64,
    pub disabled_capabilities: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, envy::Error> {
        let raw: RawSettings = envy::from_env()?;
        Ok(Self::from_raw(raw))
    }

    /// Builds settings from explicit key/value pairs; unset keys take their defaults.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawSettings = envy::from_iter(pairs)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawSettings) -> Self {
        Self {
            http_port: raw.http_port,
            prometheus_port: raw.prometheus_port,
            log_level: raw.log_level.to_ascii_lowercase(),
            max_comments: raw.max_comments.max(1),
            max_comment_length: raw.max_comment_length.max(1),
            cluster_representatives: raw.cluster_representatives.clamp(1, 20),
            sentiment_model: raw.sentiment_model.trim().to_string(),
            use_transformers: raw.use_transformers,
            sentiment_timeout: Duration::from_secs(raw.sentiment_timeout_sec.max(1)),
            topic_model_timeout: Duration::from_secs(raw.topic_model_timeout_sec.max(1)),
            topic_fallback_clusters: raw.topic_fallback_clusters.clamp(2, 50),
            topic_min_size: raw.topic_min_size.max(2),
            topic_epsilon: if raw.topic_epsilon > 0.0 {
                raw.topic_epsilon
            } else {
                default_topic_epsilon()
            },
            disabled_capabilities: raw
                .disabled_capabilities
                .into_iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_pairs(std::iter::empty()).expect("defaults cover every setting")
    }
}

fn default_http_port() -> u16 {
    8000
}

fn default_prometheus_port() -> u16 {
    8001
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_comments() -> usize {
    500
}

fn default_max_comment_length() -> usize {
    2000
}

fn default_cluster_representatives() -> usize {
    3
}

fn default_sentiment_model() -> String {
    "cardiffnlp/twitter-xlm-roberta-base-sentiment".to_string()
}

fn default_use_transformers() -> bool {
    true
}

fn default_sentiment_timeout_sec() -> u64 {
    30
}

fn default_topic_model_timeout_sec() -> u64 {
    60
}

fn default_topic_fallback_clusters() -> usize {
    5
}

fn default_topic_min_size() -> usize {
    2
}

fn default_topic_epsilon() -> f64 {
    0.9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::default();
        assert_eq!(settings.max_comments, 500);
        assert_eq!(settings.max_comment_length, 2000);
        assert_eq!(settings.cluster_representatives, 3);
        assert!(settings.use_transformers);
        assert_eq!(settings.sentiment_model, "cardiffnlp/twitter-xlm-roberta-base-sentiment");
        assert!(settings.disabled_capabilities.is_empty());
    }

    #[test]
    fn values_are_normalized() {
        let settings = Settings::from_pairs(pairs(&[
            ("MAX_COMMENTS", "0"),
            ("CLUSTER_REPRESENTATIVES", "99"),
            ("LOG_LEVEL", "DEBUG"),
            ("TOPIC_MIN_SIZE", "1"),
            ("TOPIC_EPSILON", "-1"),
            ("DISABLED_CAPABILITIES", "Fuzzy, topic_model"),
        ]))
        .unwrap();
        assert_eq!(settings.max_comments, 1);
        assert_eq!(settings.cluster_representatives, 20);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.topic_min_size, 2);
        assert_eq!(settings.topic_epsilon, 0.9);
        assert_eq!(settings.disabled_capabilities, vec!["fuzzy", "topic_model"]);
    }
}
