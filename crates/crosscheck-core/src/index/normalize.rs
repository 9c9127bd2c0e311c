//! Name normalization: token splitting and normalized keys.

/// Split an identifier into lowercase tokens on delimiters and case
/// boundaries. `createdAt`, `created_at` and `CreatedAt` all give
/// `["created", "at"]`; `HTTPServer` gives `["http", "server"]`.
pub fn tokens(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if boundary {
                out.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Lowercase concatenation of a name's tokens.
pub fn normalized_key(name: &str) -> String {
    tokens(name).concat()
}

/// Edit distance between two normalized keys.
pub fn key_distance(a: &str, b: &str) -> usize {
    edit_distance::edit_distance(a, b)
}
