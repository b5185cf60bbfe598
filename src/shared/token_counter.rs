//! Provider-agnostic token estimation for prompt budgeting.
//!
//! Approximation: ~4 bytes of UTF-8 per token. Hangul and other multi-byte
//! scripts come out heavier per character, which errs toward staying under
//! budget.

pub struct TokenCounter;

impl TokenCounter {
    pub fn estimate_tokens(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.len() + 3) / 4
    }

    /// System and user messages plus ~4 tokens of wrapper overhead each.
    pub fn estimate_prompt_tokens(system: &str, user: &str) -> usize {
        8 + Self::estimate_tokens(system) + Self::estimate_tokens(user)
    }

    pub fn fits_in_budget(estimated: usize, budget: usize) -> bool {
        estimated <= budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(TokenCounter::estimate_tokens(""), 0);
        assert_eq!(TokenCounter::estimate_tokens("a"), 1);
        assert_eq!(TokenCounter::estimate_tokens("abcd"), 1);
        assert_eq!(TokenCounter::estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_multibyte_text_counts_bytes() {
        // 3 Hangul syllables, 9 bytes
        assert_eq!(TokenCounter::estimate_tokens("직원수"), 3);
    }

    #[test]
    fn test_prompt_overhead() {
        assert_eq!(TokenCounter::estimate_prompt_tokens("", ""), 8);
        assert_eq!(TokenCounter::estimate_prompt_tokens("abcd", "abcd"), 10);
    }

    #[test]
    fn test_fits_in_budget() {
        assert!(TokenCounter::fits_in_budget(1000, 8000));
        assert!(TokenCounter::fits_in_budget(8000, 8000));
        assert!(!TokenCounter::fits_in_budget(9000, 8000));
    }
}
