//! Sentence-window chunking.
//!
//! Text is whitespace-normalized, split into sentences on terminal
//! punctuation followed by whitespace, and windowed with overlap so adjacent
//! chunks share local context. Chunk text is normalized again before hashing
//! so ids and hashes stay stable across loaders and platforms.

/// Collapses every internal whitespace run to a single space and trims.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits normalized text into sentences, keeping terminal punctuation with
/// the sentence. Equivalent to splitting on `(?<=[.!?])\s+`.
pub fn sentence_tokenize(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek().is_some_and(|next| next.is_whitespace()) {
            // Consume the separating whitespace run.
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Forms overlapping windows of `size` sentences advancing by
/// `max(1, size - overlap)`; each window is joined with single spaces.
pub fn window_sentences(sentences: &[String], size: usize, overlap: usize) -> Vec<String> {
    if sentences.is_empty() {
        return Vec::new();
    }
    if size == 0 {
        return vec![sentences.join(" ")];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < sentences.len() {
        let end = start.saturating_add(size).min(sentences.len());
        let window = sentences
            .get(start..end)
            .unwrap_or_default()
            .join(" ");
        if !window.is_empty() {
            windows.push(window);
        }
        start = start.saturating_add(step);
    }
    windows
}

/// Derives a stable `doc_id` from a filename stem: lowercase, non-alphanumeric
/// runs collapsed to single underscores, trimmed; `"doc"` when nothing
/// survives.
pub fn stable_doc_id(stem: &str) -> String {
    let mut id = String::with_capacity(stem.len());
    let mut last_was_underscore = false;
    for ch in stem.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            id.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            id.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = id.trim_matches('_');
    if trimmed.is_empty() {
        "doc".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_runs() {
        assert_eq!(normalize_text("  a\tb\n\nc  "), "a b c");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn tokenizes_on_terminal_punctuation() {
        let sentences = sentence_tokenize("Unplug idle devices. Use LED bulbs! Lower it? yes");
        assert_eq!(
            sentences,
            vec![
                "Unplug idle devices.",
                "Use LED bulbs!",
                "Lower it?",
                "yes"
            ]
        );
    }

    #[test]
    fn punctuation_without_following_space_does_not_split() {
        let sentences = sentence_tokenize("Set it to 20.5 degrees. Done.");
        assert_eq!(sentences, vec!["Set it to 20.5 degrees.", "Done."]);
    }

    #[test]
    fn windows_have_expected_stride() {
        let sentences: Vec<String> = (0..12).map(|i| format!("s{i}.")).collect();
        let windows = window_sentences(&sentences, 10, 2);
        // stride = 8: windows start at 0 and 8.
        assert_eq!(windows.len(), 2);
        assert!(windows[0].starts_with("s0."));
        assert!(windows[1].starts_with("s8."));
    }

    #[test]
    fn overlap_larger_than_size_still_advances() {
        let sentences: Vec<String> = (0..3).map(|i| format!("s{i}.")).collect();
        let windows = window_sentences(&sentences, 1, 5);
        assert_eq!(windows.len(), 3);
    }

    #[test]
    fn doc_id_is_normalized() {
        assert_eq!(stable_doc_id("Energy Tips (2026)"), "energy_tips_2026");
        assert_eq!(stable_doc_id("tipsA"), "tipsa");
        assert_eq!(stable_doc_id("!!!"), "doc");
    }
}
