//! Cross-stream utterance similarity.
//!
//! Blends word-set Jaccard overlap with a containment score for short
//! phrases ("ok" swallowed by "ok let's begin"). Both the threshold and
//! the containment score are configuration, not constants of the
//! algorithm. Degenerate inputs score 0.0 so the dedup path fails open
//! and never suppresses real speech on an internal error.

use std::collections::HashSet;

/// A contained phrase only earns the containment score when the shorter
/// side is at most this many tokens; longer overlaps are left to Jaccard.
const SHORT_PHRASE_MAX_TOKENS: usize = 4;

/// Lowercase, strip punctuation, split on whitespace.
pub fn normalized_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Similarity in [0, 1] between two utterances.
pub fn similarity(a: &str, b: &str, containment_bonus: f64) -> f64 {
    let tokens_a = normalized_tokens(a);
    let tokens_b = normalized_tokens(b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = tokens_a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = tokens_b.iter().map(String::as_str).collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    let jaccard = intersection as f64 / union as f64;

    let (shorter, longer) = if tokens_a.len() <= tokens_b.len() {
        (&tokens_a, &tokens_b)
    } else {
        (&tokens_b, &tokens_a)
    };

    // Containment is a whole-token window match, not a substring match,
    // so "can you" never matches inside "scan your".
    if shorter.len() <= SHORT_PHRASE_MAX_TOKENS
        && longer
            .windows(shorter.len())
            .any(|window| window == shorter.as_slice())
    {
        return jaccard.max(containment_bonus);
    }

    jaccard
}

#[cfg(test)]
mod tests {
    use super::*;

    const BONUS: f64 = 0.85;

    #[test]
    fn identical_texts_score_one() {
        assert_eq!(similarity("how are you", "how are you", BONUS), 1.0);
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(similarity("How are you?", "how, are... YOU", BONUS), 1.0);
    }

    #[test]
    fn disjoint_texts_score_zero() {
        assert_eq!(similarity("hello world", "goodbye moon", BONUS), 0.0);
    }

    #[test]
    fn jaccard_boundary_case() {
        // Token sets of size 4 and 5 with intersection 4: Jaccard = 0.8.
        // The shorter phrase is a 4-token prefix of the longer one, so
        // the containment score lifts it to the configured bonus; either
        // way it sits at or above a 0.8 threshold.
        let score = similarity("can you hear me", "can you hear me now", BONUS);
        assert!(score >= 0.8, "expected >= 0.8, got {}", score);

        // Without containment (bonus disabled) the raw Jaccard shows
        let raw = similarity("can you hear me", "can you hear me now", 0.0);
        assert!((raw - 0.8).abs() < 1e-9, "expected 0.8, got {}", raw);
    }

    #[test]
    fn short_phrase_containment_earns_bonus() {
        // Jaccard alone: {ok} vs {ok, thanks, lets, begin} = 0.25
        let score = similarity("ok", "ok thanks let's begin", BONUS);
        assert_eq!(score, BONUS);
    }

    #[test]
    fn containment_requires_whole_token_matches() {
        // "can you" appears as a substring of "scan your" but shares no
        // whole token with it, so no containment score applies
        assert_eq!(similarity("can you", "scan your files now", BONUS), 0.0);

        // Same tokens out of order are not containment either
        let score = similarity("you can", "can you hear me", BONUS);
        assert!(score < BONUS);
    }

    #[test]
    fn long_contained_phrases_fall_back_to_jaccard() {
        let score = similarity(
            "one two three four five",
            "one two three four five six seven eight nine ten",
            BONUS,
        );
        assert!(score < BONUS);
    }

    #[test]
    fn empty_or_punctuation_only_text_fails_open() {
        assert_eq!(similarity("", "hello", BONUS), 0.0);
        assert_eq!(similarity("?!...", "hello", BONUS), 0.0);
        assert_eq!(similarity("", "", BONUS), 0.0);
    }
}
