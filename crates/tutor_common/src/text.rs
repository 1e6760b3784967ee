//! Keyword extraction and loose word matching.

/// Words carrying no topic signal
pub const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could", "describe",
    "do", "does", "explain", "for", "from", "give", "happen", "happens", "help", "how", "i", "im",
    "in", "is", "it", "its", "know", "me", "my", "of", "on", "or", "please", "show", "so", "some",
    "tell", "that", "the", "their", "there", "this", "to", "understand", "want", "was", "what",
    "when", "where", "which", "who", "why", "with", "you", "your",
];

/// Lowercased alphanumeric words, stopwords removed, first-seen order, no
/// duplicates.
pub fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if STOPWORDS.contains(&word) || word.len() < 2 {
            continue;
        }
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Equal up to a trailing plural (`s`, `es`, `ies`/`y`).
pub fn words_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (long, short) = if a.len() > b.len() { (a, b) } else { (b, a) };
    match long.strip_prefix(short) {
        Some("s") | Some("es") => return true,
        _ => {}
    }
    match (long.strip_suffix("ies"), short.strip_suffix('y')) {
        (Some(l), Some(s)) => l == s,
        _ => false,
    }
}

/// True if any word of `text` matches `term`.
pub fn mentions(words: &[String], term: &str) -> bool {
    words.iter().any(|w| words_match(w, term))
}

/// Markers delimiting user-supplied text inside prompts
pub const OPEN_DELIM: &str = "<<<";
pub const CLOSE_DELIM: &str = ">>>";

/// Flatten user text for prompt interpolation: delimiter markers removed,
/// control characters and newlines collapsed to single spaces, truncated to
/// `max_chars` characters.
pub fn sanitize_for_prompt(text: &str, max_chars: usize) -> String {
    let stripped = text.replace(OPEN_DELIM, " ").replace(CLOSE_DELIM, " ");
    let joined = stripped
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.chars().count() <= max_chars {
        joined
    } else {
        let mut cut: String = joined.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}
