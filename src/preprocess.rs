use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("Invalid URL regex"));
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("Invalid mention regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Lowercases, strips URLs and @mentions, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let without_urls = URL_RE.replace_all(&lowered, " ");
    let without_mentions = MENTION_RE.replace_all(&without_urls, " ");
    WHITESPACE_RE
        .replace_all(&without_mentions, " ")
        .trim()
        .to_string()
}

pub fn normalize_batch<S: AsRef<str>>(texts: &[S]) -> Vec<String> {
    texts.iter().map(|text| normalize(text.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls_mentions_and_extra_whitespace() {
        let cleaned = normalize("  Loved it @creator!!   see https://example.com/watch?v=1   NOW ");
        assert_eq!(cleaned, "loved it !! see now");
    }

    #[test]
    fn batch_preserves_order() {
        let cleaned = normalize_batch(&["B", "a  b", "@x"]);
        assert_eq!(cleaned, vec!["b", "a b", ""]);
    }
}
