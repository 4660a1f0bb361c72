//! Deterministic post-processing of generated replies.
//!
//! Steps run in a fixed order on whitespace-normalized text:
//!
//! 1. Truncate a reply that stops mid-sentence back to its last complete sentence.
//! 2. Strip filler lead-ins, repeatedly and case-insensitively.
//! 3. Keep at most `max_sentences` sentences.
//! 4. Re-append terminal punctuation if it is missing.
//!
//! A sentence ends at `.`, `!` or `?` (optionally followed by closing quotes
//! or brackets) when followed by whitespace or the end of the text, so
//! decimals like `3.5` never split. Shaping is idempotent.

use skill_types::ResponseConfig;

const TERMINALS: &[char] = &['.', '!', '?'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

#[derive(Debug, Clone)]
pub struct ReplyShaper {
    max_sentences: usize,
    fillers: Vec<String>,
}

impl Default for ReplyShaper {
    fn default() -> Self {
        Self::new(&ResponseConfig::default())
    }
}

impl ReplyShaper {
    pub fn new(config: &ResponseConfig) -> Self {
        Self {
            max_sentences: config.max_sentences.max(1),
            fillers: config
                .filler_phrases
                .iter()
                .map(|f| f.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    pub fn shape(&self, raw: &str) -> String {
        let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let text = truncate_incomplete(&text);
        let text = self.strip_fillers(text);
        let text = self.cap_sentences(&text);
        ensure_terminal(text)
    }

    fn strip_fillers(&self, text: &str) -> String {
        let mut rest = text;
        let mut stripped = false;

        'outer: loop {
            for filler in &self.fillers {
                if let Some(after) = strip_prefix_ignore_case(rest, filler) {
                    rest = after.trim_start();
                    stripped = true;
                    continue 'outer;
                }
                // A bare filler missing its period would reappear once step 4 adds one
                if !rest.is_empty()
                    && !ends_complete(rest)
                    && filler.len() == rest.len() + 1
                    && filler.ends_with('.')
                    && filler
                        .get(..rest.len())
                        .is_some_and(|head| head.eq_ignore_ascii_case(rest))
                {
                    rest = "";
                    stripped = true;
                    break 'outer;
                }
            }
            break;
        }

        if stripped {
            capitalize_first(rest)
        } else {
            rest.to_string()
        }
    }

    fn cap_sentences(&self, text: &str) -> String {
        split_sentences(text)
            .into_iter()
            .take(self.max_sentences)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Byte offsets just past each sentence end.
fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !TERMINALS.contains(&c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !CLOSERS.contains(&next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        match chars.peek() {
            None => ends.push(end),
            Some(&(_, next)) if next.is_whitespace() => ends.push(end),
            _ => {}
        }
    }

    ends
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for end in sentence_ends(text) {
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            sentences.push(piece);
        }
        start = end;
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn ends_complete(text: &str) -> bool {
    sentence_ends(text).last() == Some(&text.len())
}

fn truncate_incomplete(text: &str) -> &str {
    if text.is_empty() || ends_complete(text) {
        return text;
    }
    match sentence_ends(text).last() {
        Some(&end) => text[..end].trim_end(),
        // No complete sentence at all: keep it and let punctuation be appended
        None => text,
    }
}

fn ensure_terminal(mut text: String) -> String {
    if !text.is_empty() && !ends_complete(&text) {
        text.push('.');
    }
    text
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &text[prefix.len()..];
    // "Sure" must not eat the start of "Surely"
    match (prefix.chars().last(), rest.chars().next()) {
        (Some(last), Some(next)) if last.is_alphanumeric() && next.is_alphanumeric() => None,
        _ => Some(rest),
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
