//! Clean-up shared by every endpoint's completion handling.

use crate::patterns::{PREAMBLE_RES, REFUSAL_RES};

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’'), ('`', '`')];

/// Remove one or more layers of matching quotes around the whole text.
pub fn strip_quotes(text: &str) -> &str {
    let mut out = text.trim();
    loop {
        let mut chars = out.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            return out;
        };
        match QUOTE_PAIRS.iter().find(|(open, close)| *open == first && *close == last) {
            Some((open, close)) => {
                out = out[open.len_utf8()..out.len() - close.len_utf8()].trim();
            }
            None => return out,
        }
    }
}

/// Strip leading preamble phrases ("Sure,", "Here's a summary:") until none match.
pub fn strip_preambles(text: &str) -> String {
    let mut out = text.trim().to_string();
    // bounded so a pathological pattern can never spin
    for _ in 0..8 {
        let Some(m) = PREAMBLE_RES.iter().find_map(|re| re.find(&out)) else {
            break;
        };
        if m.end() == 0 {
            break;
        }
        out = out[m.end()..].trim_start().to_string();
    }
    out
}

/// Quotes, preambles, then quotes again: the model often quotes the answer
/// that follows its lead-in.
pub fn clean_completion(raw: &str) -> String {
    let unquoted = strip_quotes(raw);
    let stripped = strip_preambles(unquoted);
    strip_quotes(&stripped).to_string()
}

pub fn is_refusal(text: &str) -> bool {
    let trimmed = text.trim();
    REFUSAL_RES.iter().any(|re| re.is_match(trimmed))
}

/// Keep at most `max` sentences. Sentence ends are `.`, `!` or `?` followed
/// by whitespace or the end of text.
pub fn limit_sentences(text: &str, max: usize) -> String {
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                count += 1;
                if count == max {
                    return text[..idx + c.len_utf8()].trim().to_string();
                }
            }
        }
    }
    text.trim().to_string()
}
