//! Usage scanning: which names a masked line refers to, and how.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ReferenceKind;

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*").unwrap());

/// Keywords and literals of every scanned language. None of these is ever
/// a reference.
const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "return", "def", "class", "import", "from", "as",
    "with", "try", "except", "finally", "raise", "lambda", "pass", "break", "continue", "yield",
    "async", "await", "not", "and", "or", "in", "is", "global", "nonlocal", "del", "assert",
    "function", "const", "let", "var", "new", "this", "typeof", "instanceof", "void", "delete",
    "switch", "case", "default", "throw", "throws", "catch", "extends", "implements",
    "interface", "type", "enum", "export", "package", "public", "private", "protected",
    "static", "final", "abstract", "synchronized", "fn", "pub", "impl", "struct", "trait",
    "mut", "ref", "match", "loop", "use", "mod", "crate", "super", "where", "unsafe", "move",
    "dyn", "func", "go", "defer", "chan", "select", "range", "self", "cls", "True", "False",
    "None", "null", "undefined", "true", "false", "nil", "do", "of", "sizeof",
];

/// A reference-like token on a line. `start` is a byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Usage {
    pub name: String,
    pub kind: ReferenceKind,
    pub start: usize,
}

/// PascalCase: leading ASCII uppercase letter and at least one lowercase
/// letter, so `SCREAMING_CONSTANTS` and `ID` are not taken for types.
pub fn is_type_like(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().any(|c| c.is_ascii_lowercase())
}

/// Usages on one masked line. Tokens starting at an offset in `excluded`
/// (the names being defined on this line) are skipped.
pub fn usages(line: &str, excluded: &[usize]) -> Vec<Usage> {
    let mut out = Vec::new();
    for m in IDENT_RE.find_iter(line) {
        if excluded.contains(&m.start()) {
            continue;
        }
        let name = m.as_str();
        if KEYWORDS.contains(&name) {
            continue;
        }
        let before = &line[..m.start()];
        let prev = before.chars().next_back();
        if prev.is_some_and(|c| c.is_ascii_digit() || c == '@') {
            continue;
        }
        let after_paren = line[m.end()..].trim_start().starts_with('(');
        let after_dot = prev == Some('.') && !before.ends_with("..");

        // `models.Book` names a type through its module, in any language.
        let kind = if is_type_like(name) {
            ReferenceKind::Type
        } else if after_dot {
            ReferenceKind::Member
        } else if after_paren {
            ReferenceKind::Call
        } else {
            continue;
        };
        out.push(Usage {
            name: name.to_string(),
            kind,
            start: m.start(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<(String, ReferenceKind)> {
        usages(line, &[])
            .into_iter()
            .map(|u| (u.name, u.kind))
            .collect()
    }

    #[test]
    fn test_is_type_like() {
        assert!(is_type_like("Book"));
        assert!(is_type_like("HTTPServer"));
        assert!(!is_type_like("MAX_SIZE"));
        assert!(!is_type_like("book"));
    }

    #[test]
    fn test_python_usages() {
        let found = kinds("    author: Author = load_author(self.author_id)");
        assert_eq!(
            found,
            vec![
                ("Author".to_string(), ReferenceKind::Type),
                ("load_author".to_string(), ReferenceKind::Call),
                ("author_id".to_string(), ReferenceKind::Member),
            ]
        );
    }

    #[test]
    fn test_plain_variables_are_not_usages() {
        assert!(kinds("total = count + 1").is_empty());
    }

    #[test]
    fn test_excluded_definition_offsets() {
        let line = "class Book(Base):";
        let found = usages(line, &[6]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Base");
    }

    #[test]
    fn test_qualified_type_is_type() {
        let book = vec![("Book".to_string(), ReferenceKind::Type)];
        assert_eq!(kinds("var b models.Book"), book);
        assert_eq!(kinds("x = models.Book()"), book);
        assert_eq!(kinds("const z = new models.Book();"), book);
        assert_eq!(
            kinds("y = models.load_book()"),
            vec![("load_book".to_string(), ReferenceKind::Member)]
        );
    }

    #[test]
    fn test_rust_paths_and_decorators() {
        let found = kinds("let b = Book::new(store::load_one(id));");
        assert_eq!(
            found,
            vec![
                ("Book".to_string(), ReferenceKind::Type),
                ("load_one".to_string(), ReferenceKind::Call),
            ]
        );
        assert!(kinds("@dataclass").is_empty());
    }
}
