//! Rule-based polarity scorer in the VADER style.
//!
//! Produces a single compound value in `[-1, 1]` from a valence lexicon
//! (-4..=4), booster words, negation, the contrastive "but" rule and
//! exclamation emphasis.

use std::collections::HashMap;

use once_cell::sync::Lazy;

const BOOSTER_INCREMENT: f64 = 0.293;
const NEGATION_SCALAR: f64 = -0.74;
const EXCLAMATION_BOOST: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const NORMALIZATION_ALPHA: f64 = 15.0;
const LOOKBACK: usize = 3;

static VALENCES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        // positive
        ("good", 1.9),
        ("great", 3.1),
        ("excellent", 2.7),
        ("amazing", 2.8),
        ("awesome", 3.1),
        ("fantastic", 2.6),
        ("wonderful", 2.7),
        ("brilliant", 2.8),
        ("perfect", 2.7),
        ("best", 3.2),
        ("better", 1.9),
        ("love", 3.2),
        ("loved", 2.9),
        ("loving", 2.9),
        ("like", 1.5),
        ("liked", 1.8),
        ("enjoy", 2.2),
        ("enjoyed", 2.3),
        ("nice", 1.8),
        ("cool", 1.3),
        ("fun", 2.3),
        ("funny", 1.9),
        ("happy", 2.7),
        ("glad", 2.0),
        ("helpful", 1.8),
        ("useful", 1.9),
        ("interesting", 1.7),
        ("informative", 1.6),
        ("clear", 1.6),
        ("beautiful", 2.9),
        ("impressive", 2.3),
        ("incredible", 2.3),
        ("superb", 3.1),
        ("outstanding", 3.0),
        ("recommend", 1.5),
        ("recommended", 1.8),
        ("thanks", 1.9),
        ("thank", 1.5),
        ("learned", 1.2),
        ("learn", 1.1),
        ("well", 1.1),
        ("fine", 0.8),
        ("win", 2.8),
        ("wow", 2.8),
        ("masterpiece", 3.1),
        ("inspiring", 2.4),
        ("solid", 1.7),
        ("smooth", 1.5),
        ("easy", 1.9),
        ("fast", 1.0),
        ("genius", 1.9),
        ("legendary", 2.5),
        ("satisfied", 1.8),
        ("excited", 1.4),
        ("fascinating", 2.5),
        ("favorite", 2.0),
        ("bueno", 1.9),
        ("excelente", 2.7),
        ("genial", 2.4),
        ("gracias", 1.9),
        // negative
        ("bad", -2.5),
        ("terrible", -2.1),
        ("awful", -2.0),
        ("horrible", -2.5),
        ("worst", -3.1),
        ("worse", -2.1),
        ("hate", -2.7),
        ("hated", -3.2),
        ("boring", -1.3),
        ("bored", -1.1),
        ("dull", -1.7),
        ("slow", -0.8),
        ("poor", -2.1),
        ("annoying", -1.7),
        ("annoyed", -1.6),
        ("confusing", -1.3),
        ("confused", -1.3),
        ("disappointed", -1.9),
        ("disappointing", -2.2),
        ("useless", -1.8),
        ("waste", -1.8),
        ("wrong", -2.1),
        ("broken", -1.9),
        ("problem", -1.7),
        ("problems", -1.7),
        ("issue", -0.9),
        ("issues", -0.9),
        ("bug", -1.5),
        ("sad", -2.1),
        ("angry", -2.3),
        ("ugly", -2.3),
        ("stupid", -2.4),
        ("fail", -2.5),
        ("failed", -2.3),
        ("lame", -1.8),
        ("meh", -0.3),
        ("mediocre", -1.0),
        ("noisy", -0.7),
        ("painful", -1.9),
        ("trash", -1.8),
        ("garbage", -2.0),
        ("scam", -2.6),
        ("clickbait", -1.6),
        ("misleading", -1.6),
        ("hard", -0.4),
        ("difficult", -1.5),
        ("lost", -1.3),
        ("low", -1.1),
        ("long", -0.4),
        ("malo", -2.5),
        ("aburrido", -1.3),
    ]
    .into_iter()
    .collect()
});

static BOOSTERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        ("absolutely", BOOSTER_INCREMENT),
        ("really", BOOSTER_INCREMENT),
        ("very", BOOSTER_INCREMENT),
        ("so", BOOSTER_INCREMENT),
        ("extremely", BOOSTER_INCREMENT),
        ("incredibly", BOOSTER_INCREMENT),
        ("super", BOOSTER_INCREMENT),
        ("totally", BOOSTER_INCREMENT),
        ("completely", BOOSTER_INCREMENT),
        ("highly", BOOSTER_INCREMENT),
        ("most", BOOSTER_INCREMENT),
        ("too", BOOSTER_INCREMENT),
        ("muy", BOOSTER_INCREMENT),
        ("slightly", -BOOSTER_INCREMENT),
        ("somewhat", -BOOSTER_INCREMENT),
        ("barely", -BOOSTER_INCREMENT),
        ("hardly", -BOOSTER_INCREMENT),
        ("kinda", -BOOSTER_INCREMENT),
        ("little", -BOOSTER_INCREMENT),
        ("marginally", -BOOSTER_INCREMENT),
        ("partly", -BOOSTER_INCREMENT),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "nowhere", "neither", "nor", "cannot", "cant", "can't", "dont",
    "don't", "doesnt", "doesn't", "didnt", "didn't", "isnt", "isn't", "wasnt", "wasn't", "arent", "aren't",
    "wont", "won't", "wouldnt", "wouldn't", "shouldnt", "shouldn't", "without", "nunca",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconAnalyzer;

impl LexiconAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Compound polarity in `[-1, 1]`.
    pub fn compound(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return 0.0;
        }

        let mut valences: Vec<f64> = tokens
            .iter()
            .enumerate()
            .map(|(idx, token)| token_valence(&tokens, idx, token))
            .collect();

        if let Some(but_idx) = tokens.iter().position(|t| t == "but") {
            for (idx, valence) in valences.iter_mut().enumerate() {
                if idx < but_idx {
                    *valence *= 0.5;
                } else if idx > but_idx {
                    *valence *= 1.5;
                }
            }
        }

        let mut sum: f64 = valences.iter().sum();
        if sum != 0.0 {
            let emphasis = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64 * EXCLAMATION_BOOST;
            sum += emphasis.copysign(sum);
        }
        normalize(sum)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn token_valence(tokens: &[String], idx: usize, token: &str) -> f64 {
    if BOOSTERS.contains_key(token) {
        return 0.0;
    }
    let Some(&base) = VALENCES.get(token) else {
        return 0.0;
    };

    let mut valence = base;
    let window_start = idx.saturating_sub(LOOKBACK);
    for (distance, prior) in tokens[window_start..idx].iter().rev().enumerate() {
        if let Some(&boost) = BOOSTERS.get(prior.as_str()) {
            let damping = match distance {
                0 => 1.0,
                1 => 0.95,
                _ => 0.9,
            };
            let signed = if valence >= 0.0 { boost } else { -boost };
            valence += signed * damping;
        }
    }
    if tokens[window_start..idx]
        .iter()
        .any(|prior| NEGATIONS.contains(&prior.as_str()) || prior.ends_with("n't"))
    {
        valence *= NEGATION_SCALAR;
    }
    valence
}

fn normalize(score: f64) -> f64 {
    (score / (score * score + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
}
