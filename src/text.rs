use std::collections::BTreeSet;

/// Splits identifier-like text on camelCase transitions, letter/digit
/// boundaries and the usual code separators, then rejoins with spaces.
pub fn split_identifier_like(query: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = query.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];

        if c == ':' && i + 1 < chars.len() && chars[i + 1] == ':' {
            out.push(' ');
            i += 2;
            continue;
        }

        if c == '-' && i + 1 < chars.len() && chars[i + 1] == '>' {
            out.push(' ');
            i += 2;
            continue;
        }

        if !c.is_alphanumeric() {
            out.push(' ');
            i += 1;
            continue;
        }

        if c.is_ascii_digit() && i > 0 {
            let prev = chars[i - 1];
            if prev.is_ascii_alphabetic() && prev != 'v' && prev != 'V' {
                out.push(' ');
            }
        } else if c.is_ascii_alphabetic() && i > 0 {
            let prev = chars[i - 1];
            if prev.is_ascii_digit() {
                out.push(' ');
            }
        }

        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            if prev.is_lowercase()
                || (i + 1 < chars.len() && chars[i + 1].is_lowercase() && prev.is_uppercase())
            {
                out.push(' ');
            }
        }

        out.push(c);
        i += 1;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased tokens of length >= 2, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    split_identifier_like(text)
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 1)
        .collect()
}

pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Lowercased text with all runs of whitespace collapsed to one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Truncates on a char boundary, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
