//! Recursive, overlap-aware text segmenter.
//!
//! Splits article body text into chunks that respect a target size and an
//! overlap length. Separators are tried coarsest-first (paragraph break,
//! line break, sentence boundary, space, hard character cut); pieces still
//! too large are re-split with the next separator, then adjacent pieces are
//! merged greedily up to the target size with a sliding-window overlap.
//!
//! This is a pure, deterministic function: the same input and parameters
//! always yield byte-identical chunk boundaries, which the sync pipeline
//! relies on — chunk indices and embeddings must be reproducible across
//! resyncs.

/// Separator cascade, coarsest to finest. The empty string means a hard
/// per-character cut and always matches.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Split `text` into chunks of at most `chunk_size` characters (except when
/// a single unbreakable token exceeds it), with consecutive chunks
/// overlapping by at most `overlap` characters.
///
/// Lengths are measured in characters, not bytes. Empty or whitespace-only
/// input yields no chunks. Input shorter than `chunk_size` yields exactly
/// one chunk equal to the trimmed input.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    split_recursive(trimmed, chunk_size, overlap, SEPARATORS)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    // Pick the first separator that occurs in the text; "" always matches.
    let mut separator = *separators.last().unwrap_or(&"");
    let mut remaining: &[&str] = &[];
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            separator = sep;
            remaining = &separators[i + 1..];
            break;
        }
    }

    let splits: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    let mut final_chunks = Vec::new();
    let mut good_splits: Vec<String> = Vec::new();

    for piece in splits {
        if char_len(&piece) < chunk_size {
            good_splits.push(piece);
        } else {
            if !good_splits.is_empty() {
                merge_splits(&good_splits, separator, chunk_size, overlap, &mut final_chunks);
                good_splits.clear();
            }
            if remaining.is_empty() {
                // No finer separator left; emit the oversized token as-is.
                final_chunks.push(piece);
            } else {
                final_chunks.extend(split_recursive(&piece, chunk_size, overlap, remaining));
            }
        }
    }

    if !good_splits.is_empty() {
        merge_splits(&good_splits, separator, chunk_size, overlap, &mut final_chunks);
    }

    final_chunks
}

/// Greedily merge size-bounded pieces up to `chunk_size`, emitting a
/// sliding window so each chunk retains up to `overlap` trailing characters
/// of its predecessor.
fn merge_splits(
    splits: &[String],
    separator: &str,
    chunk_size: usize,
    overlap: usize,
    out: &mut Vec<String>,
) {
    let sep_len = char_len(separator);
    let mut window: std::collections::VecDeque<&String> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for piece in splits {
        let piece_len = char_len(piece);
        let extra = if window.is_empty() { 0 } else { sep_len };

        if total + piece_len + extra > chunk_size && !window.is_empty() {
            emit(&window, separator, out);

            // Slide the window: drop leading pieces until the retained tail
            // fits inside the overlap budget and leaves room for the next
            // piece.
            while total > overlap
                || (total + piece_len + if window.is_empty() { 0 } else { sep_len } > chunk_size
                    && total > 0)
            {
                let lead = window.front().expect("window non-empty while total > 0");
                total -= char_len(lead) + if window.len() > 1 { sep_len } else { 0 };
                window.pop_front();
            }
        }

        let extra = if window.is_empty() { 0 } else { sep_len };
        total += piece_len + extra;
        window.push_back(piece);
    }

    emit(&window, separator, out);
}

fn emit(window: &std::collections::VecDeque<&String>, separator: &str, out: &mut Vec<String>) {
    let doc = window
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(separator);
    let doc = doc.trim();
    if !doc.is_empty() {
        out.push(doc.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_text("", 150, 20).is_empty());
        assert!(split_text("   \n\n  ", 150, 20).is_empty());
    }

    #[test]
    fn test_short_input_single_chunk() {
        let chunks = split_text("  A quiet morning essay.  ", 150, 20);
        assert_eq!(chunks, vec!["A quiet morning essay.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size_bound() {
        let text = "Slow living is not about doing everything slowly. It is about doing \
                    the right things at the right pace, and letting go of the rest. \
                    The morning light settles over the kitchen table while the kettle hums."
            .repeat(3);
        let chunks = split_text(&text, 150, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(
                c.chars().count() <= 150,
                "chunk exceeds size bound: {} chars",
                c.chars().count()
            );
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "First paragraph here.\n\nSecond paragraph follows. With two sentences.\n\nThird one.";
        let a = split_text(text, 40, 10);
        let b = split_text(text, 40, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_paragraph_separator_preferred() {
        let text = "Alpha paragraph.\n\nBeta paragraph.\n\nGamma paragraph.";
        let chunks = split_text(text, 20, 5);
        // Each paragraph fits the target on its own, so boundaries fall on
        // the paragraph breaks.
        assert_eq!(
            chunks,
            vec![
                "Alpha paragraph.".to_string(),
                "Beta paragraph.".to_string(),
                "Gamma paragraph.".to_string(),
            ]
        );
    }

    #[test]
    fn test_oversized_token_emitted_whole() {
        let token = "x".repeat(200);
        let chunks = split_text(&token, 150, 20);
        // No separator exists inside the token below the "" cascade level,
        // where single characters merge back up to the size bound.
        assert!(!chunks.is_empty());
        let rejoined: String = chunks.join("");
        assert!(rejoined.contains(&"x".repeat(150)));
    }

    #[test]
    fn test_overlap_window_scenario() {
        // 17 words of 19 characters each, space-separated: 339 characters.
        // With size=150 and overlap=20 the window merges seven words
        // (139 chars), slides back one word (19 chars + separator), and
        // produces exactly three chunks.
        let words: Vec<String> = (1..=17).map(|i| format!("w{:02}{}", i, "x".repeat(16))).collect();
        let text = words.join(" ");
        assert_eq!(text.chars().count(), 339);

        let chunks = split_text(&text, 150, 20);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 150);
        }
        // Chunk 2 starts with the word chunk 1 ends with (the overlap).
        assert!(chunks[0].ends_with(&words[6]));
        assert!(chunks[1].starts_with(&words[6]));
        assert!(chunks[1].ends_with(&words[12]));
        assert!(chunks[2].starts_with(&words[12]));
    }

    #[test]
    fn test_coverage_no_gaps() {
        // Every word of the input must appear in some chunk.
        let words: Vec<String> = (0..40).map(|i| format!("term{:03}", i)).collect();
        let text = words.join(" ");
        let chunks = split_text(&text, 60, 15);
        for w in &words {
            assert!(
                chunks.iter().any(|c| c.contains(w.as_str())),
                "word {} missing from all chunks",
                w
            );
        }
    }

    #[test]
    fn test_overlap_bounded_by_configuration() {
        let words: Vec<String> = (0..30).map(|i| format!("item{:02}", i)).collect();
        let text = words.join(" ");
        let overlap = 10;
        let chunks = split_text(&text, 50, overlap);
        for pair in chunks.windows(2) {
            let prev: &str = &pair[0];
            let next: &str = &pair[1];
            // The shared suffix/prefix between consecutive chunks never
            // exceeds the configured overlap.
            let max_shared = (1..=prev.chars().count().min(next.chars().count()))
                .rev()
                .find(|&n| {
                    let suffix: String = prev.chars().skip(prev.chars().count() - n).collect();
                    next.starts_with(&suffix)
                })
                .unwrap_or(0);
            assert!(
                max_shared <= overlap,
                "overlap {} exceeds configured {}",
                max_shared,
                overlap
            );
        }
    }
}
