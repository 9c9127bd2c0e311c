//! Anchored, identifier-bounded text substitutions.

use crate::errors::{ConsistencyError, ConsistencyResult};

/// Replace `original` with `replacement` at a 1-based line and character
/// column of the current text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchoredEdit<'a> {
    pub line: u32,
    pub column: u32,
    pub original: &'a str,
    pub replacement: &'a str,
}

impl AnchoredEdit<'_> {
    /// Column change this edit causes for text after it on the same line.
    pub fn delta(&self) -> i64 {
        self.replacement.chars().count() as i64 - self.original.chars().count() as i64
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Byte offset of every line start.
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
    starts
}

/// Byte range the edit covers, after checking the anchor text and both
/// identifier boundaries.
fn anchor(text: &str, starts: &[usize], edit: &AnchoredEdit<'_>) -> ConsistencyResult<(usize, usize)> {
    let fail = |why: &str| {
        ConsistencyError::Fix(format!(
            "`{}` not found at {}:{} ({why})",
            edit.original, edit.line, edit.column
        ))
    };
    if edit.line == 0 || edit.column == 0 || edit.original.is_empty() {
        return Err(fail("invalid anchor"));
    }
    let line_idx = (edit.line - 1) as usize;
    let start = *starts.get(line_idx).ok_or_else(|| fail("line out of range"))?;
    let end = starts
        .get(line_idx + 1)
        .map(|next| next - 1)
        .unwrap_or(text.len());
    let line = &text[start..end];

    let byte = line
        .char_indices()
        .nth((edit.column - 1) as usize)
        .map(|(i, _)| i)
        .ok_or_else(|| fail("column out of range"))?;
    if !line[byte..].starts_with(edit.original) {
        return Err(fail("text differs"));
    }
    if line[..byte].chars().next_back().is_some_and(is_ident_char) {
        return Err(fail("not at an identifier start"));
    }
    let after = byte + edit.original.len();
    if line[after..].chars().next().is_some_and(is_ident_char) {
        return Err(fail("not at an identifier end"));
    }
    Ok((start + byte, start + after))
}

/// Apply every edit to a copy of `text`. All anchors are checked against
/// the unmodified text; any mismatch aborts the whole set.
pub fn apply_edits(text: &str, edits: &[AnchoredEdit<'_>]) -> ConsistencyResult<String> {
    let starts = line_starts(text);
    let mut ranges = Vec::with_capacity(edits.len());
    for edit in edits {
        let (from, to) = anchor(text, &starts, edit)?;
        ranges.push((from, to, edit.replacement));
    }
    ranges.sort_by(|a, b| b.0.cmp(&a.0));
    ranges.dedup_by_key(|r| r.0);
    for pair in ranges.windows(2) {
        if pair[1].1 > pair[0].0 {
            return Err(ConsistencyError::Fix("overlapping edits".to_string()));
        }
    }

    let mut staged = text.to_string();
    for (from, to, replacement) in ranges {
        staged.replace_range(from..to, replacement);
    }
    Ok(staged)
}
