//! Shared guardrails for extraction input bounds and fuzzy matching limits.

// Extraction guards
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 512 * 1024;
pub const DEFAULT_MAX_LINES: usize = 20_000;
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4_000;
pub const DEFAULT_MAX_ITEMS_PER_ARTIFACT: usize = 10_000;

pub const MIN_SOURCE_BYTES: usize = 1024;
pub const MAX_SOURCE_BYTES: usize = 16 * 1024 * 1024;
pub const MIN_LINES: usize = 10;
pub const MAX_LINES: usize = 500_000;
pub const MIN_LINE_LENGTH: usize = 80;
pub const MAX_LINE_LENGTH: usize = 100_000;
pub const MIN_ITEMS_PER_ARTIFACT: usize = 10;
pub const MAX_ITEMS_PER_ARTIFACT: usize = 200_000;

// Fuzzy matching guards
pub const DEFAULT_MIN_FUZZY_LEN: usize = 4;
pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;
pub const DEFAULT_EDIT_DISTANCE_RATIO: f64 = 0.25;
pub const MAX_EDIT_DISTANCE: usize = 4;

// Import cycle guards
pub const MAX_CYCLES_PER_COMPONENT: usize = 32;
pub const MAX_CYCLE_SEARCH_STEPS: usize = 20_000;

pub fn clamp_usize(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

pub fn clamp_ratio(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_EDIT_DISTANCE_RATIO;
    }
    value.clamp(0.0, 1.0)
}

/// Number of single-character edits tolerated between two normalized keys,
/// where `len` is the length of the shorter key.
pub fn allowed_edits(len: usize, max_edit_distance: usize, ratio: f64) -> usize {
    let scaled = (len as f64 * ratio).floor() as usize;
    scaled.min(max_edit_distance).max(1)
}

/// Truncate `text` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_to_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
