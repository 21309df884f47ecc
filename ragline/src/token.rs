//! Token estimation and budget fitting.

/// Estimates how many model tokens a piece of text costs.
///
/// Implementations must return 0 for empty text and be monotone on
/// prefixes: `count(prefix) <= count(text)`. [`fit_to_budget`] relies on it.
///
/// [`fit_to_budget`]: TokenCounter::fit_to_budget
pub trait TokenCounter: Send + Sync {
    /// Estimate the token count of `text`.
    fn count(&self, text: &str) -> usize;

    /// Return the longest prefix of `text` whose count is at most `max_tokens`.
    ///
    /// Text already within budget is returned unchanged. The cut always
    /// lands on a `char` boundary.
    fn fit_to_budget<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        if self.count(text) <= max_tokens {
            return text;
        }

        // Byte offsets of every char boundary, including the end.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();

        // boundaries[0] == 0 always fits (empty prefix counts 0).
        let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if self.count(&text[..boundaries[mid]]) <= max_tokens {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        &text[..boundaries[lo]]
    }
}

/// Counts roughly one token per `chars_per_token` characters, rounding up.
///
/// Four characters per token is the usual rule of thumb for English prose
/// with OpenAI tokenizers; it overestimates for dense CJK text only mildly.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioTokenCounter {
    chars_per_token: usize,
}

impl CharRatioTokenCounter {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    /// Create a counter; a ratio of 0 is treated as 1.
    pub fn new(chars_per_token: usize) -> Self {
        Self { chars_per_token: chars_per_token.max(1) }
    }
}

impl Default for CharRatioTokenCounter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenCounter for CharRatioTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_costs_nothing() {
        assert_eq!(CharRatioTokenCounter::default().count(""), 0);
    }

    #[test]
    fn counts_chars_not_bytes() {
        let counter = CharRatioTokenCounter::default();
        assert_eq!(counter.count("🦀🦀🦀🦀"), 1);
        assert_eq!(counter.count("hello"), 2);
    }

    #[test]
    fn fits_on_char_boundaries() {
        let counter = CharRatioTokenCounter::new(1);
        let fitted = counter.fit_to_budget("日本語テキスト", 3);
        assert_eq!(fitted, "日本語");
    }

    #[test]
    fn zero_budget_yields_empty_prefix() {
        let counter = CharRatioTokenCounter::default();
        assert_eq!(counter.fit_to_budget("anything", 0), "");
        assert_eq!(counter.fit_to_budget("", 0), "");
    }

    #[test]
    fn text_within_budget_is_unchanged() {
        let counter = CharRatioTokenCounter::default();
        let text = "short enough";
        assert!(std::ptr::eq(counter.fit_to_budget(text, 100), text));
    }
}
