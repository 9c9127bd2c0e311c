//! Per-language definition patterns, applied to one masked line at a time.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Language, SymbolKind};

/// Where the current line sits relative to the innermost class-like body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineContext {
    /// Line is a direct member of a class/struct/interface body.
    pub member: bool,
    /// Line is anywhere inside a class body, including method bodies.
    pub in_class: bool,
}

/// A definition found on a line. `start` is a byte offset into the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    pub kind: SymbolKind,
    pub name: String,
    pub start: usize,
    /// The definition opens a body whose direct members are fields.
    pub opens_body: bool,
}

/// Words that look like a method name or a field type at line start but
/// are statements.
const STATEMENT_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "throw", "new", "else", "do", "try",
    "super", "this", "function", "constructor", "import", "package", "case", "default",
    "yield", "await", "delete", "typeof", "goto", "break", "continue",
];

// ---------------------------------------------------------------------------
// Compiled regex patterns
// ---------------------------------------------------------------------------

// -- Python --

static PY_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_]\w*)").unwrap());

static PY_DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)").unwrap());

static PY_SELF_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bself\.([A-Za-z_]\w*)\s*(?::[^=]+)?=(?:[^=]|$)").unwrap());

static PY_ANNOTATED_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*)\s*:\s*[A-Za-z_][\w\[\]., |]*\s*(?:=.*)?$").unwrap()
});

static PY_CLASS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*=(?:[^=]|$)").unwrap());

// -- TypeScript / JavaScript --

static TS_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:const\s+)?(?:class|interface|type|enum)\s+([A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

static TS_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)")
        .unwrap()
});

static TS_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>)",
    )
    .unwrap()
});

static TS_MEMBER_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|readonly|async|override|abstract|get|set)\s+)*\*?([A-Za-z_$][\w$]*)\??\s*(?:<[^>]*>)?\s*\(",
    )
    .unwrap()
});

static TS_MEMBER_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|readonly|declare|override)\s+)*([A-Za-z_$][\w$]*)[?!]?\s*(?::|=(?:[^=>]|$))",
    )
    .unwrap()
});

static TS_THIS_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bthis\.([A-Za-z_$][\w$]*)\s*=(?:[^=]|$)").unwrap());

// -- Java --

static JAVA_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|abstract|final|static|sealed|non-sealed)\s+)*(?:class|interface|enum|record|@interface)\s+([A-Za-z_]\w*)",
    )
    .unwrap()
});

static JAVA_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:@\w+\s+)*(?:(?:public|private|protected|static|final|abstract|synchronized|default|native)\s+)*(?:<[^>]+>\s+)?([\w.]+(?:<[^()]*>)?(?:\[\])*)\s+([A-Za-z_]\w*)\s*\(",
    )
    .unwrap()
});

static JAVA_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|private|protected|static|final|transient|volatile)\s+)*([\w.]+(?:<[^()]*>)?(?:\[\])*)\s+([A-Za-z_]\w*)\s*(?:=[^;]*)?;",
    )
    .unwrap()
});

// -- Go --

static GO_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*type\s+([A-Za-z_]\w*)\b").unwrap());

static GO_FUNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)").unwrap());

static GO_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*)(?:\s*,\s*[A-Za-z_]\w*)*\s+[\w*.\[\]{}]+").unwrap()
});

static GO_IFACE_METHOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*\(").unwrap());

// -- Rust --

static RUST_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(struct|enum|trait|type|union)\s+([A-Za-z_]\w*)")
        .unwrap()
});

static RUST_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#,
    )
    .unwrap()
});

static RUST_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?([A-Za-z_]\w*)\s*:(?:[^:]|$)").unwrap()
});

// -- Generic C-like fallback --

static GENERIC_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\w+\s+)*?(?:class|struct|interface|trait|enum)\s+([A-Za-z_]\w*)").unwrap()
});

static GENERIC_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\w+\s+)*?(?:def|function|fn|func|sub|proc)\s+([A-Za-z_]\w*)").unwrap()
});

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

fn capture(re: &Regex, line: &str, group: usize, kind: SymbolKind, opens_body: bool) -> Option<Definition> {
    let m = re.captures(line)?.get(group)?;
    Some(Definition {
        kind,
        name: m.as_str().to_string(),
        start: m.start(),
        opens_body,
    })
}

fn is_statement_word(word: &str) -> bool {
    STATEMENT_WORDS.contains(&word)
}

fn python_definitions(line: &str, ctx: &LineContext) -> Vec<Definition> {
    if let Some(def) = capture(&PY_CLASS_RE, line, 1, SymbolKind::Class, true) {
        return vec![def];
    }
    if let Some(def) = capture(&PY_DEF_RE, line, 1, SymbolKind::Function, false) {
        return vec![def];
    }
    let mut defs = Vec::new();
    if ctx.member {
        let field = capture(&PY_ANNOTATED_FIELD_RE, line, 1, SymbolKind::Field, false)
            .or_else(|| capture(&PY_CLASS_ATTR_RE, line, 1, SymbolKind::Field, false));
        defs.extend(field);
    }
    if ctx.in_class {
        for caps in PY_SELF_FIELD_RE.captures_iter(line) {
            if let Some(m) = caps.get(1) {
                defs.push(Definition {
                    kind: SymbolKind::Field,
                    name: m.as_str().to_string(),
                    start: m.start(),
                    opens_body: false,
                });
            }
        }
    }
    defs
}

fn script_definitions(line: &str, ctx: &LineContext) -> Vec<Definition> {
    if let Some(mut def) = capture(&TS_CLASS_RE, line, 1, SymbolKind::Class, true) {
        // `type X = string;` has no body.
        def.opens_body = line.contains('{');
        return vec![def];
    }
    if let Some(def) = capture(&TS_FUNCTION_RE, line, 1, SymbolKind::Function, false)
        .or_else(|| capture(&TS_ARROW_RE, line, 1, SymbolKind::Function, false))
    {
        return vec![def];
    }
    let mut defs = Vec::new();
    if ctx.member {
        if let Some(def) = capture(&TS_MEMBER_METHOD_RE, line, 1, SymbolKind::Function, false) {
            if !is_statement_word(&def.name) {
                defs.push(def);
            }
        } else if let Some(def) = capture(&TS_MEMBER_FIELD_RE, line, 1, SymbolKind::Field, false) {
            if !is_statement_word(&def.name) {
                defs.push(def);
            }
        }
    }
    if ctx.in_class {
        for caps in TS_THIS_FIELD_RE.captures_iter(line) {
            if let Some(m) = caps.get(1) {
                defs.push(Definition {
                    kind: SymbolKind::Field,
                    name: m.as_str().to_string(),
                    start: m.start(),
                    opens_body: false,
                });
            }
        }
    }
    defs
}

fn java_definitions(line: &str, ctx: &LineContext) -> Vec<Definition> {
    if let Some(def) = capture(&JAVA_CLASS_RE, line, 1, SymbolKind::Class, true) {
        return vec![def];
    }
    if !ctx.member {
        return Vec::new();
    }
    for (re, kind) in [
        (&*JAVA_METHOD_RE, SymbolKind::Function),
        (&*JAVA_FIELD_RE, SymbolKind::Field),
    ] {
        if let Some(caps) = re.captures(line) {
            let type_word = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if is_statement_word(type_word) {
                continue;
            }
            if let Some(m) = caps.get(2) {
                return vec![Definition {
                    kind,
                    name: m.as_str().to_string(),
                    start: m.start(),
                    opens_body: false,
                }];
            }
        }
    }
    Vec::new()
}

fn go_definitions(line: &str, ctx: &LineContext) -> Vec<Definition> {
    if let Some(mut def) = capture(&GO_TYPE_RE, line, 1, SymbolKind::Class, false) {
        def.opens_body = line.contains('{') && (line.contains("struct") || line.contains("interface"));
        return vec![def];
    }
    if let Some(def) = capture(&GO_FUNC_RE, line, 1, SymbolKind::Function, false) {
        return vec![def];
    }
    if ctx.member {
        if let Some(def) = capture(&GO_IFACE_METHOD_RE, line, 1, SymbolKind::Function, false) {
            return vec![def];
        }
        if let Some(def) = capture(&GO_FIELD_RE, line, 1, SymbolKind::Field, false) {
            if !is_statement_word(&def.name) {
                return vec![def];
            }
        }
    }
    Vec::new()
}

fn rust_definitions(line: &str, ctx: &LineContext) -> Vec<Definition> {
    if let Some(caps) = RUST_TYPE_RE.captures(line) {
        let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some(m) = caps.get(2) {
            return vec![Definition {
                kind: SymbolKind::Class,
                name: m.as_str().to_string(),
                start: m.start(),
                opens_body: keyword != "type" && line.contains('{'),
            }];
        }
    }
    if let Some(def) = capture(&RUST_FN_RE, line, 1, SymbolKind::Function, false) {
        return vec![def];
    }
    if ctx.member {
        if let Some(def) = capture(&RUST_FIELD_RE, line, 1, SymbolKind::Field, false) {
            return vec![def];
        }
    }
    Vec::new()
}

fn generic_definitions(line: &str) -> Vec<Definition> {
    capture(&GENERIC_CLASS_RE, line, 1, SymbolKind::Class, true)
        .or_else(|| capture(&GENERIC_FN_RE, line, 1, SymbolKind::Function, false))
        .into_iter()
        .collect()
}

/// Definitions on one masked line.
pub fn definitions(language: Language, line: &str, ctx: &LineContext) -> Vec<Definition> {
    match language {
        Language::Python => python_definitions(line, ctx),
        Language::TypeScript | Language::JavaScript => script_definitions(line, ctx),
        Language::Java => java_definitions(line, ctx),
        Language::Go => go_definitions(line, ctx),
        Language::Rust => rust_definitions(line, ctx),
        Language::Other => generic_definitions(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: LineContext = LineContext { member: false, in_class: false };
    const MEMBER: LineContext = LineContext { member: true, in_class: true };
    const METHOD_BODY: LineContext = LineContext { member: false, in_class: true };

    fn names(defs: &[Definition]) -> Vec<(&str, SymbolKind)> {
        defs.iter().map(|d| (d.name.as_str(), d.kind)).collect()
    }

    #[test]
    fn test_python_class_and_def() {
        let defs = definitions(Language::Python, "class Book(Base):", &TOP);
        assert_eq!(names(&defs), vec![("Book", SymbolKind::Class)]);
        assert_eq!(defs[0].start, 6);
        let defs = definitions(Language::Python, "    async def fetch_books(self):", &MEMBER);
        assert_eq!(names(&defs), vec![("fetch_books", SymbolKind::Function)]);
    }

    #[test]
    fn test_python_fields() {
        let defs = definitions(Language::Python, "    title: str", &MEMBER);
        assert_eq!(names(&defs), vec![("title", SymbolKind::Field)]);
        let defs = definitions(Language::Python, "    created_at = Column(DateTime)", &MEMBER);
        assert_eq!(names(&defs), vec![("created_at", SymbolKind::Field)]);
        let defs = definitions(Language::Python, "        self.author_id = author_id", &METHOD_BODY);
        assert_eq!(names(&defs), vec![("author_id", SymbolKind::Field)]);
        // Comparisons are not assignments.
        assert!(definitions(Language::Python, "        if self.x == 1:", &METHOD_BODY).is_empty());
        // Module-level assignments are not fields.
        assert!(definitions(Language::Python, "books = []", &TOP).is_empty());
    }

    #[test]
    fn test_typescript_definitions() {
        let defs = definitions(Language::TypeScript, "export interface Book {", &TOP);
        assert_eq!(names(&defs), vec![("Book", SymbolKind::Class)]);
        assert!(defs[0].opens_body);
        let defs = definitions(Language::TypeScript, "export type BookId = string;", &TOP);
        assert!(!defs[0].opens_body);
        let defs = definitions(Language::TypeScript, "export const fetchBooks = async (id: string) => {", &TOP);
        assert_eq!(names(&defs), vec![("fetchBooks", SymbolKind::Function)]);
        let defs = definitions(Language::TypeScript, "  createdAt?: Date;", &MEMBER);
        assert_eq!(names(&defs), vec![("createdAt", SymbolKind::Field)]);
        let defs = definitions(Language::TypeScript, "  async save(book: Book): Promise<void> {", &MEMBER);
        assert_eq!(names(&defs), vec![("save", SymbolKind::Function)]);
        assert!(definitions(Language::TypeScript, "    if (x) {", &MEMBER).is_empty());
    }

    #[test]
    fn test_java_definitions() {
        let defs = definitions(Language::Java, "public class BookService {", &TOP);
        assert_eq!(names(&defs), vec![("BookService", SymbolKind::Class)]);
        let defs = definitions(Language::Java, "    private final List<Book> books = new ArrayList<>();", &MEMBER);
        assert_eq!(names(&defs), vec![("books", SymbolKind::Field)]);
        let defs = definitions(Language::Java, "    public Book findBook(String id) {", &MEMBER);
        assert_eq!(names(&defs), vec![("findBook", SymbolKind::Function)]);
        assert!(definitions(Language::Java, "    return book;", &MEMBER).is_empty());
    }

    #[test]
    fn test_go_definitions() {
        let defs = definitions(Language::Go, "type Book struct {", &TOP);
        assert_eq!(names(&defs), vec![("Book", SymbolKind::Class)]);
        assert!(defs[0].opens_body);
        let defs = definitions(Language::Go, "func (s *Store) SaveBook(b Book) error {", &TOP);
        assert_eq!(names(&defs), vec![("SaveBook", SymbolKind::Function)]);
        let defs = definitions(Language::Go, "\tTitle string `json:\"title\"`", &MEMBER);
        assert_eq!(names(&defs), vec![("Title", SymbolKind::Field)]);
    }

    #[test]
    fn test_rust_definitions() {
        let defs = definitions(Language::Rust, "pub struct Book {", &TOP);
        assert_eq!(names(&defs), vec![("Book", SymbolKind::Class)]);
        assert!(defs[0].opens_body);
        let defs = definitions(Language::Rust, "    pub(crate) async fn load_books(&self) -> Vec<Book> {", &TOP);
        assert_eq!(names(&defs), vec![("load_books", SymbolKind::Function)]);
        let defs = definitions(Language::Rust, "    pub created_at: DateTime<Utc>,", &MEMBER);
        assert_eq!(names(&defs), vec![("created_at", SymbolKind::Field)]);
        assert!(definitions(Language::Rust, "    std::mem::drop(x);", &MEMBER).is_empty());
    }

    #[test]
    fn test_generic_fallback() {
        let defs = definitions(Language::Other, "public struct Ledger {", &TOP);
        assert_eq!(names(&defs), vec![("Ledger", SymbolKind::Class)]);
        let defs = definitions(Language::Other, "def post_entry(x)", &TOP);
        assert_eq!(names(&defs), vec![("post_entry", SymbolKind::Function)]);
    }
}
