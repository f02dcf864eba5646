/// Token estimation for chunk texts.
/// Heuristic: ~4 characters per token. Advisory only, nothing depends on
/// exactness.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Check if adding text would cross a token limit.
pub fn would_exceed_limit(current_tokens: usize, new_text: &str, max_tokens: usize) -> bool {
    current_tokens + estimate_tokens(new_text) > max_tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_heuristic() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_would_exceed() {
        let text = "x".repeat(400); // ~100 tokens
        assert!(would_exceed_limit(950, &text, 1000));
        assert!(!would_exceed_limit(100, &text, 1000));
    }
}
