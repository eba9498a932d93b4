//! Which optional analysis backends this process can use.
//!
//! The transformer classifier is only compiled with the `transformers` cargo
//! feature. The other backends are always built in but can be switched off
//! through `DISABLED_CAPABILITIES`, which also lets tests exercise every
//! fallback path.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub transformers: bool,
    pub lexicon: bool,
    pub vectorizer: bool,
    pub fuzzy: bool,
    pub topic_model: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            transformers: cfg!(feature = "transformers"),
            lexicon: true,
            vectorizer: true,
            fuzzy: true,
            topic_model: true,
        }
    }

    pub fn none() -> Self {
        Self {
            transformers: false,
            lexicon: false,
            vectorizer: false,
            fuzzy: false,
            topic_model: false,
        }
    }

    pub fn without<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for name in names {
            match name.as_ref() {
                "transformers" => self.transformers = false,
                "lexicon" => self.lexicon = false,
                "vectorizer" => self.vectorizer = false,
                "fuzzy" => self.fuzzy = false,
                "topic_model" | "topic-model" => self.topic_model = false,
                other => warn!(capability = other, "Ignoring unknown capability name"),
            }
        }
        self
    }
}
