//! TF-IDF document vectors over word n-grams.
//!
//! Tokens are runs of two or more word characters. Document frequency
//! pruning keeps a term when `min_df <= df <= max_df * n_docs`. Weights are
//! `count * (ln((1 + n) / (1 + df)) + 1)` with each row L2-normalized, and
//! the vocabulary is kept in lexical order. Raw counts stay sparse; only the
//! weighted matrix is dense.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ClusterError;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("Invalid token regex"));

#[derive(Debug, Clone, Copy)]
pub struct TfidfParams {
    pub ngram_range: (usize, usize),
    pub min_df: usize,
    pub max_df: f64,
}

impl Default for TfidfParams {
    fn default() -> Self {
        Self {
            ngram_range: (1, 2),
            min_df: 1,
            max_df: 0.9,
        }
    }
}

/// Non-zero raw counts of one document as `(column, count)`, by column.
pub type TermCounts = Vec<(usize, f64)>;

#[derive(Debug, Clone)]
pub struct TfidfMatrix {
    /// Documents x terms, L2-normalized rows.
    pub vectors: Array2<f64>,
    /// Raw term counts per document, in the column space of `vectors`.
    pub counts: Vec<TermCounts>,
    pub terms: Vec<String>,
}

impl TfidfMatrix {
    pub fn n_documents(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.vectors.ncols()
    }
}

pub fn fit_transform<S: AsRef<str>>(texts: &[S], params: TfidfParams) -> Result<TfidfMatrix, ClusterError> {
    let n_docs = texts.len();
    let doc_counts: Vec<HashMap<String, usize>> = texts
        .iter()
        .map(|text| count_ngrams(text.as_ref(), params.ngram_range))
        .collect();

    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for counts in &doc_counts {
        for term in counts.keys() {
            *document_frequency.entry(term.as_str()).or_default() += 1;
        }
    }

    let max_doc_count = params.max_df * n_docs as f64;
    let kept: Vec<(&str, usize)> = document_frequency
        .into_iter()
        .filter(|&(_, df)| df >= params.min_df && df as f64 <= max_doc_count)
        .collect();
    if kept.is_empty() {
        return Err(ClusterError::EmptyVocabulary);
    }

    let index: HashMap<&str, usize> = kept.iter().enumerate().map(|(i, (term, _))| (*term, i)).collect();
    let idf: Vec<f64> = kept
        .iter()
        .map(|&(_, df)| ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    let mut vectors = Array2::<f64>::zeros((n_docs, kept.len()));
    let mut counts = Vec::with_capacity(n_docs);
    for (mut row, doc) in vectors.rows_mut().into_iter().zip(&doc_counts) {
        let mut sparse: TermCounts = doc
            .iter()
            .filter_map(|(term, &count)| index.get(term.as_str()).map(|&col| (col, count as f64)))
            .collect();
        sparse.sort_by_key(|&(col, _)| col);
        for &(col, count) in &sparse {
            row[col] = count * idf[col];
        }
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
        counts.push(sparse);
    }

    Ok(TfidfMatrix {
        vectors,
        counts,
        terms: kept.into_iter().map(|(term, _)| term.to_string()).collect(),
    })
}

fn count_ngrams(text: &str, (min_n, max_n): (usize, usize)) -> HashMap<String, usize> {
    let tokens: Vec<&str> = TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect();
    let mut counts = HashMap::new();
    for n in min_n.max(1)..=max_n {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            *counts.entry(window.join(" ")).or_insert(0) += 1;
        }
    }
    counts
}
