use std::collections::HashSet;

/// Lexical relevance between a query and a chunk text.
/// Blend: 0.7 * jaccard word overlap + 0.3 * partial (substring) match ratio.
/// Result is clamped to [0, 1].
pub fn text_relevance(query: &str, text: &str) -> f32 {
    let query_words: HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();
    let text_words: HashSet<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();

    if query_words.is_empty() {
        return 0.0;
    }

    let intersection = query_words.intersection(&text_words).count();
    let union = query_words.union(&text_words).count();

    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    };

    // Substring matches catch compound words and inflected forms
    let mut partial_matches = 0usize;
    for qw in &query_words {
        for tw in &text_words {
            if tw.contains(qw.as_str()) || qw.contains(tw.as_str()) {
                partial_matches += 1;
            }
        }
    }
    let partial = partial_matches as f32 / query_words.len() as f32;

    ((jaccard * 0.7) + (partial * 0.3)).min(1.0)
}
