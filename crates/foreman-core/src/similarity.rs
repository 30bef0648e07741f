//! Title similarity used to keep near-duplicate tasks off the board.

/// Similarity at or above which a candidate counts as a duplicate.
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.7;

/// A scoring function over two task titles; higher means more alike.
///
/// The aggregator only ever asks "how alike are these two titles", so a
/// stronger strategy (embeddings, edit distance) can replace the default
/// without touching it.
pub trait SimilarityStrategy: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;

    /// True when `candidate` scores at least `threshold` against any title.
    fn is_duplicate(&self, candidate: &str, existing: &[String], threshold: f64) -> bool {
        existing
            .iter()
            .any(|title| self.similarity(candidate, title) >= threshold)
    }
}

/// Exact match, then containment, then shared long words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordOverlap;

impl SimilarityStrategy for WordOverlap {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        calculate_similarity(a, b)
    }
}

/// Case-insensitive after trimming:
/// - equal titles score 1.0;
/// - one containing the other scores 0.8;
/// - otherwise `2 * shared / (words(a) + words(b))`, where shared counts the
///   words of `a` longer than three characters that also occur in `b`.
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }

    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();
    let total = words_a.len() + words_b.len();
    if total == 0 {
        return 0.0;
    }
    let shared = words_a
        .iter()
        .filter(|w| w.chars().count() > 3 && words_b.contains(w))
        .count();
    (2 * shared) as f64 / total as f64
}

/// [`WordOverlap`] duplicate check against `existing` titles.
pub fn is_duplicate_title<S: AsRef<str>>(candidate: &str, existing: &[S], threshold: f64) -> bool {
    existing
        .iter()
        .any(|title| calculate_similarity(candidate, title.as_ref()) >= threshold)
}
