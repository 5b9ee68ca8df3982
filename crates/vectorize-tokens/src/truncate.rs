//! Budget truncation for oversized document text.
//!
//! Every strategy guarantees the post-condition
//! `count(out_text) <= max_tokens`, whatever the input. Candidate cuts
//! are found by binary search over character boundaries, counting the
//! fully composed output (content plus sentinel) so byte-pair merges at
//! the seams cannot push the result over budget.

use vectorize_types::TruncationStrategy;

use crate::counter::TokenCounter;

/// Marker inserted where text was removed.
pub const SENTINEL: &str = "\n\n[... truncated ...]\n\n";

/// Result of a truncation call.
#[derive(Debug, Clone)]
pub struct Truncation {
    /// Output text, `count(text) <= max_tokens`
    pub text: String,
    /// Real token count of `text`
    pub tokens: usize,
    /// Whether anything was removed
    pub truncated: bool,
    /// Strategy that actually produced the output, after fallbacks
    pub strategy: TruncationStrategy,
}

/// Pick a concrete strategy from a model's semantic field hints.
///
/// Name-like fields keep their head (`end`), prose-like fields keep
/// whole sentences, everything else preserves both ends.
pub fn auto_strategy(semantic_fields: &[String]) -> TruncationStrategy {
    let name_like = |f: &str| f.ends_with("name") || f.ends_with("title") || f == "label";
    let prose_like = |f: &str| {
        matches!(
            f,
            "description" | "documentation" | "help_text" | "notes" | "text" | "body"
        )
    };
    if !semantic_fields.is_empty() && semantic_fields.iter().all(|f| name_like(f)) {
        TruncationStrategy::End
    } else if semantic_fields.iter().any(|f| prose_like(f)) {
        TruncationStrategy::Sentences
    } else {
        TruncationStrategy::MiddleOut
    }
}

/// Fit `text` into `max_tokens` using the given strategy.
///
/// Returns the input unchanged when it already fits. `Auto` resolves to
/// `middle_out` here; callers that have a model spec resolve `Auto` via
/// [`auto_strategy`] first.
pub fn fit(
    counter: &TokenCounter,
    text: &str,
    max_tokens: usize,
    strategy: TruncationStrategy,
) -> Truncation {
    let current = counter.count(text);
    if current <= max_tokens {
        return Truncation {
            text: text.to_string(),
            tokens: current,
            truncated: false,
            strategy,
        };
    }

    match strategy {
        TruncationStrategy::End => truncate_end(counter, text, max_tokens),
        TruncationStrategy::Start => truncate_start(counter, text, max_tokens),
        TruncationStrategy::Sentences => truncate_sentences(counter, text, max_tokens),
        TruncationStrategy::MiddleOut | TruncationStrategy::Auto => {
            truncate_middle_out(counter, text, max_tokens)
        }
    }
}

/// Byte offsets of all character boundaries in `text`, including both ends.
fn char_boundaries(text: &str) -> Vec<usize> {
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    bounds
}

/// Largest prefix (in characters) whose composed output fits the budget.
///
/// `compose` turns a candidate boundary index into the full output text;
/// the search maximises the index under `count(compose(i)) <= max_tokens`.
fn search_largest<F>(counter: &TokenCounter, upper: usize, max_tokens: usize, compose: F) -> String
where
    F: Fn(usize) -> String,
{
    let mut lo = 0usize;
    let mut hi = upper;
    let mut best = compose(0);
    if counter.count(&best) > max_tokens {
        // Even the empty cut plus markers is over budget; caller must
        // retry without a sentinel.
        return String::new();
    }
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let candidate = compose(mid);
        if counter.count(&candidate) <= max_tokens {
            best = candidate;
            if mid == upper {
                break;
            }
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
    }
    best
}

fn truncate_end(counter: &TokenCounter, text: &str, max_tokens: usize) -> Truncation {
    let bounds = char_boundaries(text);
    let sentinel_tokens = counter.count(SENTINEL);

    let out = if sentinel_tokens >= max_tokens {
        // No room for the marker; keep the largest bare prefix.
        search_largest(counter, bounds.len() - 1, max_tokens, |i| {
            text[..bounds[i]].to_string()
        })
    } else {
        search_largest(counter, bounds.len() - 1, max_tokens, |i| {
            format!("{}{}", &text[..bounds[i]], SENTINEL)
        })
    };

    finish(counter, out, TruncationStrategy::End)
}

fn truncate_start(counter: &TokenCounter, text: &str, max_tokens: usize) -> Truncation {
    let bounds = char_boundaries(text);
    let last = bounds.len() - 1;
    let sentinel_tokens = counter.count(SENTINEL);

    let out = if sentinel_tokens >= max_tokens {
        search_largest(counter, last, max_tokens, |i| {
            text[bounds[last - i]..].to_string()
        })
    } else {
        search_largest(counter, last, max_tokens, |i| {
            format!("{}{}", SENTINEL, &text[bounds[last - i]..])
        })
    };

    finish(counter, out, TruncationStrategy::Start)
}

fn truncate_middle_out(counter: &TokenCounter, text: &str, max_tokens: usize) -> Truncation {
    let sentinel_tokens = counter.count(SENTINEL);
    if sentinel_tokens >= max_tokens {
        // Marker will not fit; fall back to a plain head cut.
        return truncate_end(counter, text, max_tokens);
    }

    let bounds = char_boundaries(text);
    let last = bounds.len() - 1;
    let half = last / 2;

    let out = search_largest(counter, half, max_tokens, |k| {
        format!(
            "{}{}{}",
            &text[..bounds[k]],
            SENTINEL,
            &text[bounds[last - k]..]
        )
    });

    finish(counter, out, TruncationStrategy::MiddleOut)
}

fn truncate_sentences(counter: &TokenCounter, text: &str, max_tokens: usize) -> Truncation {
    let sentinel_tokens = counter.count(SENTINEL);
    if sentinel_tokens >= max_tokens || max_tokens < 20 {
        return truncate_middle_out(counter, text, max_tokens);
    }

    let sentences = split_sentences(text);
    if sentences.len() < 3 {
        return truncate_middle_out(counter, text, max_tokens);
    }

    let available = max_tokens - sentinel_tokens;

    // Whole sentences greedily from the head, up to half the budget.
    let mut head: Vec<&str> = Vec::new();
    let mut head_text = String::new();
    for sentence in &sentences {
        let candidate = if head_text.is_empty() {
            sentence.to_string()
        } else {
            format!("{head_text} {sentence}")
        };
        if counter.count(&candidate) <= available / 2 {
            head.push(sentence);
            head_text = candidate;
        } else {
            break;
        }
    }

    // Remaining budget filled with whole sentences from the tail.
    let remaining = available.saturating_sub(counter.count(&head_text));
    let mut tail: Vec<&str> = Vec::new();
    let mut tail_text = String::new();
    for sentence in sentences.iter().rev() {
        if head.contains(sentence) {
            continue;
        }
        let candidate = if tail_text.is_empty() {
            sentence.to_string()
        } else {
            format!("{sentence} {tail_text}")
        };
        if counter.count(&candidate) <= remaining {
            tail.insert(0, sentence);
            tail_text = candidate;
        } else {
            break;
        }
    }

    if head.is_empty() && tail.is_empty() {
        return truncate_middle_out(counter, text, max_tokens);
    }

    let out = format!("{head_text}{SENTINEL}{tail_text}");
    if counter.count(&out) > max_tokens {
        return truncate_middle_out(counter, text, max_tokens);
    }
    finish(counter, out, TruncationStrategy::Sentences)
}

fn finish(counter: &TokenCounter, text: String, strategy: TruncationStrategy) -> Truncation {
    let tokens = counter.count(&text);
    Truncation {
        text,
        tokens,
        truncated: true,
        strategy,
    }
}

/// Split on `[.!?]+` runs followed by whitespace, keeping the terminator.
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut j = i + 1;
            while j < bytes.len() && matches!(bytes[j], b'.' | b'!' | b'?') {
                j += 1;
            }
            if j >= bytes.len() || bytes[j].is_ascii_whitespace() {
                let sentence = text[start..j].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                start = j;
            }
            i = j;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest);
        }
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn counter() -> TokenCounter {
        TokenCounter::new()
    }

    #[test]
    fn test_fits_untouched() {
        let c = counter();
        let out = fit(&c, "short text", 100, TruncationStrategy::End);
        assert!(!out.truncated);
        assert_eq!(out.text, "short text");
        assert_eq!(out.tokens, c.count("short text"));
    }

    #[test]
    fn test_end_respects_budget_and_keeps_prefix() {
        let c = counter();
        let text = "alpha beta gamma delta ".repeat(200);
        let out = fit(&c, &text, 50, TruncationStrategy::End);
        assert!(out.truncated);
        assert!(out.tokens <= 50);
        assert_eq!(out.tokens, c.count(&out.text));
        assert!(out.text.starts_with("alpha"));
        assert!(out.text.contains(SENTINEL.trim()));
    }

    #[test]
    fn test_start_keeps_suffix() {
        let c = counter();
        let text = format!("{} FINAL WORDS", "filler words here ".repeat(200));
        let out = fit(&c, &text, 40, TruncationStrategy::Start);
        assert!(out.truncated);
        assert!(out.tokens <= 40);
        assert!(out.text.ends_with("FINAL WORDS"));
    }

    #[test]
    fn test_middle_out_keeps_both_ends() {
        let c = counter();
        let text = format!("HEAD {} TAIL", "middle chunk ".repeat(300));
        let out = fit(&c, &text, 60, TruncationStrategy::MiddleOut);
        assert!(out.truncated);
        assert!(out.tokens <= 60);
        assert!(out.text.starts_with("HEAD"));
        assert!(out.text.ends_with("TAIL"));
        assert!(out.text.contains(SENTINEL.trim()));
    }

    #[test]
    fn test_sentinel_too_big_drops_marker() {
        let c = counter();
        let sentinel_tokens = c.count(SENTINEL);
        let budget = sentinel_tokens.saturating_sub(1).max(1);
        let text = "word ".repeat(500);
        let out = fit(&c, &text, budget, TruncationStrategy::End);
        assert!(out.tokens <= budget);
        assert!(!out.text.contains("truncated"));
    }

    #[test]
    fn test_sentences_falls_back_on_two_sentences() {
        let c = counter();
        let text = format!("First sentence {}. Second sentence!", "pad ".repeat(200));
        let out = fit(&c, &text, 30, TruncationStrategy::Sentences);
        assert!(out.tokens <= 30);
        assert_eq!(out.strategy, TruncationStrategy::MiddleOut);
    }

    #[test]
    fn test_sentences_small_budget_falls_back() {
        let c = counter();
        let text = "One. Two. Three. Four. Five. ".repeat(50);
        let out = fit(&c, &text, 10, TruncationStrategy::Sentences);
        assert!(out.tokens <= 10);
    }

    #[test]
    fn test_sentences_keeps_whole_sentences() {
        let c = counter();
        let long = "x ".repeat(100);
        let text = format!(
            "The head sentence stays. {long}. Another pad block {long}. The tail sentence stays."
        );
        let out = fit(&c, &text, 40, TruncationStrategy::Sentences);
        assert!(out.tokens <= 40);
        if out.strategy == TruncationStrategy::Sentences {
            assert!(out.text.contains(SENTINEL));
        }
    }

    #[test]
    fn test_zero_budget_yields_empty() {
        let c = counter();
        for strategy in [
            TruncationStrategy::End,
            TruncationStrategy::Start,
            TruncationStrategy::MiddleOut,
            TruncationStrategy::Sentences,
        ] {
            let out = fit(&c, "some text that is too long", 0, strategy);
            assert_eq!(out.tokens, 0, "strategy {strategy}");
            assert!(out.text.is_empty());
        }
    }

    #[test]
    fn test_multibyte_input_stays_on_char_boundaries() {
        let c = counter();
        let text = "héllo wörld ünïcode ".repeat(100);
        for strategy in [
            TruncationStrategy::End,
            TruncationStrategy::Start,
            TruncationStrategy::MiddleOut,
        ] {
            let out = fit(&c, &text, 20, strategy);
            assert!(out.tokens <= 20);
            // would have panicked on a byte slice mid-codepoint
        }
    }

    #[test]
    fn test_auto_strategy_hints() {
        let names = vec!["table_name".to_string(), "field_title".to_string()];
        assert_eq!(auto_strategy(&names), TruncationStrategy::End);

        let prose = vec!["table_name".to_string(), "description".to_string()];
        assert_eq!(auto_strategy(&prose), TruncationStrategy::Sentences);

        let other = vec!["payload".to_string()];
        assert_eq!(auto_strategy(&other), TruncationStrategy::MiddleOut);
    }

    #[test]
    fn test_split_sentences() {
        let parts = split_sentences("One. Two!  Three?! Four");
        assert_eq!(parts, vec!["One.", "Two!", "Three?!", "Four"]);
    }

    #[test]
    fn test_reported_tokens_match_real_count() {
        let c = counter();
        let text = "A. B. C. D. E. ".repeat(40);
        for strategy in [
            TruncationStrategy::End,
            TruncationStrategy::Start,
            TruncationStrategy::MiddleOut,
            TruncationStrategy::Sentences,
        ] {
            let out = fit(&c, &text, 25, strategy);
            assert_eq!(out.tokens, c.count(&out.text));
            assert!(out.tokens <= 25);
            assert!(out.truncated);
        }
    }
}
