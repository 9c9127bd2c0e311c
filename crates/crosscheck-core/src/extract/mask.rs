//! Blank out comment and string-literal bodies before lexical scanning.
//!
//! Every masked character is replaced by a single space, newlines are kept,
//! so line numbers and character columns in the masked text match the
//! original exactly. String delimiters survive; comment markers do not.

use crate::models::Language;

/// Masked source plus a flag for input that ended inside a string or comment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Masked {
    pub text: String,
    pub unterminated: bool,
}

fn blank(out: &mut [char], index: usize) {
    if out[index] != '\n' {
        out[index] = ' ';
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Blank a quoted body starting at `start` (just past the opening delimiter)
/// until `close` is found. Returns the index just past the closing delimiter
/// and whether it was found.
fn blank_quoted(
    chars: &[char],
    out: &mut [char],
    start: usize,
    close: &[char],
    escapes: bool,
    multiline: bool,
) -> (usize, bool) {
    let mut i = start;
    while i < chars.len() {
        if escapes && chars[i] == '\\' {
            blank(out, i);
            if i + 1 < chars.len() && chars[i + 1] != '\n' {
                blank(out, i + 1);
            }
            i += 2;
            continue;
        }
        if chars[i..].starts_with(close) {
            return (i + close.len(), true);
        }
        if chars[i] == '\n' && !multiline {
            return (i, false);
        }
        blank(out, i);
        i += 1;
    }
    (chars.len(), false)
}

pub fn mask_source(source: &str, language: Language) -> Masked {
    let chars: Vec<char> = source.chars().collect();
    let mut out = chars.clone();
    let mut unterminated = false;
    let n = chars.len();

    let hash_comments = language == Language::Python;
    let triple_quotes = matches!(language, Language::Python | Language::Java);
    let backticks = matches!(
        language,
        Language::TypeScript | Language::JavaScript | Language::Go
    );
    let rust = language == Language::Rust;

    let mut i = 0;
    while i < n {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        // Line comments.
        if (hash_comments && c == '#') || (!hash_comments && c == '/' && next == Some('/')) {
            while i < n && chars[i] != '\n' {
                blank(&mut out, i);
                i += 1;
            }
            continue;
        }

        // Block comments.
        if !hash_comments && c == '/' && next == Some('*') {
            let mut closed = false;
            blank(&mut out, i);
            blank(&mut out, i + 1);
            i += 2;
            while i < n {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    blank(&mut out, i);
                    blank(&mut out, i + 1);
                    i += 2;
                    closed = true;
                    break;
                }
                blank(&mut out, i);
                i += 1;
            }
            unterminated |= !closed;
            continue;
        }

        // Rust raw strings: r"..." / r#"..."#
        if rust && c == 'r' && (i == 0 || !is_ident_char(chars[i - 1])) {
            let mut j = i + 1;
            while j < n && chars[j] == '#' {
                j += 1;
            }
            if j < n && chars[j] == '"' && (j > i + 1 || next == Some('"')) {
                let hashes = j - i - 1;
                let mut close = vec!['"'];
                close.extend(std::iter::repeat('#').take(hashes));
                let (end, closed) = blank_quoted(&chars, &mut out, j + 1, &close, false, true);
                unterminated |= !closed;
                i = end;
                continue;
            }
        }

        // Rust lifetimes and char literals share the apostrophe.
        if rust && c == '\'' {
            let is_char_literal = next == Some('\\') || chars.get(i + 2) == Some(&'\'');
            if !is_char_literal {
                i += 1;
                continue;
            }
            let (end, closed) = blank_quoted(&chars, &mut out, i + 1, &['\''], true, false);
            unterminated |= !closed;
            i = end;
            continue;
        }

        if c == '"' || c == '\'' {
            if triple_quotes && next == Some(c) && chars.get(i + 2) == Some(&c) {
                let close = [c, c, c];
                let (end, closed) = blank_quoted(&chars, &mut out, i + 3, &close, true, true);
                unterminated |= !closed;
                i = end;
                continue;
            }
            // Rust string literals may span lines; everywhere else a newline
            // ends an unterminated literal.
            let (end, closed) = blank_quoted(&chars, &mut out, i + 1, &[c], true, rust);
            unterminated |= !closed;
            i = end;
            continue;
        }

        if backticks && c == '`' {
            let escapes = language != Language::Go;
            let (end, closed) = blank_quoted(&chars, &mut out, i + 1, &['`'], escapes, true);
            unterminated |= !closed;
            i = end;
            continue;
        }

        i += 1;
    }

    Masked {
        text: out.into_iter().collect(),
        unterminated,
    }
}
