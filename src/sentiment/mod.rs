//! Per-comment sentiment scoring over a capability-ordered backend chain:
//! transformer classifier, then lexicon scorer, then a constant neutral.
//!
//! The chain is resolved once when the scorer is built. Scoring never fails:
//! a transformer error on one text rescores that text one tier down.

pub mod lexicon;
pub mod transformer;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::capability::Capabilities;
use crate::error::LoadError;
use crate::metrics::{SENTIMENT_BACKEND_TOTAL, SENTIMENT_TIME_SECONDS};
use crate::model_cache::ModelCache;
use crate::types::{SentimentLabel, SentimentResult};

pub use lexicon::LexiconAnalyzer;
pub use transformer::SequenceClassifier;

pub type ClassifierCache = ModelCache<dyn SequenceClassifier>;

const POSITIVE_THRESHOLD: f64 = 0.05;
const NEGATIVE_THRESHOLD: f64 = -0.05;
const CLASS_LABELS: [SentimentLabel; 3] = [
    SentimentLabel::Negative,
    SentimentLabel::Neutral,
    SentimentLabel::Positive,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Transformer,
    Lexicon,
    Neutral,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transformer => "transformer",
            Self::Lexicon => "lexicon",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Clone)]
pub enum Backend {
    Transformer(Arc<dyn SequenceClassifier>),
    Lexicon(LexiconAnalyzer),
    Neutral,
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Transformer(_) => BackendKind::Transformer,
            Self::Lexicon(_) => BackendKind::Lexicon,
            Self::Neutral => BackendKind::Neutral,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

/// Picks the first usable backend: the transformer when requested, compiled
/// in and loadable; otherwise the lexicon when enabled; otherwise neutral.
/// The loader is only invoked when the transformer tier is actually eligible.
pub fn select_backend<F>(requested: bool, capabilities: &Capabilities, load: F) -> Backend
where
    F: FnOnce() -> Result<Arc<dyn SequenceClassifier>, LoadError>,
{
    if requested && capabilities.transformers {
        match load() {
            Ok(model) => return Backend::Transformer(model),
            Err(err) => debug!(error = %err, "Transformer backend not ready; degrading"),
        }
    }
    if capabilities.lexicon {
        Backend::Lexicon(LexiconAnalyzer::new())
    } else {
        Backend::Neutral
    }
}

#[derive(Debug, Clone)]
pub struct SentimentScorer {
    primary: Backend,
    fallback: Backend,
}

impl SentimentScorer {
    /// Builds a scorer whose transformer tier comes from the shared cache.
    pub fn new(use_transformers: bool, model_id: &str, capabilities: &Capabilities, cache: &ClassifierCache) -> Self {
        Self::with_loader(use_transformers, capabilities, || {
            cache.get_or_load(model_id, || transformer::load(model_id))
        })
    }

    pub fn with_loader<F>(use_transformers: bool, capabilities: &Capabilities, load: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn SequenceClassifier>, LoadError>,
    {
        let primary = select_backend(use_transformers, capabilities, load);
        let fallback = select_backend(false, capabilities, || {
            Err(LoadError::Unavailable("fallback tier".into()))
        });
        Self { primary, fallback }
    }

    /// A scorer that never touches the transformer tier.
    pub fn without_transformers(capabilities: &Capabilities) -> Self {
        Self::with_loader(false, capabilities, || Err(LoadError::Unavailable("not requested".into())))
    }

    pub fn backend(&self) -> BackendKind {
        self.primary.kind()
    }

    pub fn predict(&self, text: &str) -> SentimentResult {
        match &self.primary {
            Backend::Transformer(model) => match model.logits(text) {
                Ok(logits) => from_logits(logits),
                Err(err) => {
                    warn!(error = %err, fallback = self.fallback.kind().as_str(), "Transformer inference failed; rescoring one tier down");
                    score_with(&self.fallback, text)
                }
            },
            other => score_with(other, text),
        }
    }

    pub fn predict_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<SentimentResult> {
        let start = Instant::now();
        let results: Vec<SentimentResult> = texts.iter().map(|text| self.predict(text.as_ref())).collect();
        let backend = self.backend().as_str();
        SENTIMENT_TIME_SECONDS
            .with_label_values(&[backend])
            .observe(start.elapsed().as_secs_f64());
        SENTIMENT_BACKEND_TOTAL
            .with_label_values(&[backend])
            .inc_by(texts.len() as u64);
        results
    }
}

fn score_with(backend: &Backend, text: &str) -> SentimentResult {
    match backend {
        Backend::Lexicon(analyzer) => from_compound(analyzer.compound(text)),
        Backend::Neutral | Backend::Transformer(_) => SentimentResult::neutral(),
    }
}

/// Maps a compound polarity in `[-1, 1]` to a labelled result.
pub fn from_compound(compound: f64) -> SentimentResult {
    if compound >= POSITIVE_THRESHOLD {
        SentimentResult {
            label: SentimentLabel::Positive,
            score: (compound + 1.0) / 2.0,
        }
    } else if compound <= NEGATIVE_THRESHOLD {
        SentimentResult {
            label: SentimentLabel::Negative,
            score: (1.0 - compound) / 2.0,
        }
    } else {
        SentimentResult {
            label: SentimentLabel::Neutral,
            score: 1.0 - compound.abs(),
        }
    }
}

/// Softmax over `[negative, neutral, positive]` logits; the argmax wins.
pub fn from_logits(logits: [f32; 3]) -> SentimentResult {
    let probs = softmax(&logits.map(f64::from));
    let (idx, score) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::MIN), |best, (idx, p)| if p > best.1 { (idx, p) } else { best });
    SentimentResult {
        label: CLASS_LABELS[idx],
        score,
    }
}

fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
