//! Import statement recognition for every supported language.
//!
//! Statements are recognized on masked lines (so commented-out imports are
//! ignored) and module strings are read back from the raw lines.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Language, Location};

/// Longest import statement we follow across lines.
const MAX_STATEMENT_LINES: usize = 40;

/// One imported name; `alias` is the local binding when it differs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
    pub location: Location,
}

/// A parsed import statement. An empty `names` list means the statement
/// only brings in a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedImport {
    pub module: String,
    pub location: Location,
    pub names: Vec<ImportedName>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Tok {
    text: String,
    location: Location,
}

// ---------------------------------------------------------------------------
// Compiled regex patterns
// ---------------------------------------------------------------------------

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*|::|[{}(),*;]").unwrap());

static PY_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+(\.*[\w.]*)\s+import\b").unwrap());

static PY_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+[A-Za-z_]").unwrap());

static PY_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][\w.]*)(?:\s+as\s+[A-Za-z_]\w*)?").unwrap()
});

static TS_IMPORT_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:import(?:\s|\{|\*|'|$)|export\s*[{*])").unwrap());

static TS_REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:const|let|var)\s+(\{[^}]*\}|[A-Za-z_$][\w$]*)\s*=\s*require\s*\(").unwrap()
});

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"['"`]([^'"`]*)['"`]"#).unwrap());

static JAVA_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*import\s+(?:static\s+)?([A-Za-z_][\w.]*?)(\.\*)?\s*;").unwrap()
});

static GO_IMPORT_SINGLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

static GO_IMPORT_BLOCK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s*\(").unwrap());

static GO_IMPORT_BLOCK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#).unwrap());

static RUST_USE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+").unwrap());

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 1-based character column of a byte offset within `line`.
pub(crate) fn char_column(line: &str, byte_offset: usize) -> u32 {
    line[..byte_offset].chars().count() as u32 + 1
}

fn tokenize(lines: &[&str], first_line: usize, first_offset: usize) -> Vec<Tok> {
    let mut toks = Vec::new();
    for (offset, line) in lines.iter().enumerate() {
        let skip = if offset == 0 { first_offset.min(line.len()) } else { 0 };
        for m in TOKEN_RE.find_iter(&line[skip..]) {
            let start = skip + m.start();
            toks.push(Tok {
                text: m.as_str().to_string(),
                location: Location::new(
                    (first_line + offset + 1) as u32,
                    char_column(line, start),
                ),
            });
        }
    }
    toks
}

fn statement_location(line: &str, line_index: usize) -> Location {
    let indent = line.len() - line.trim_start().len();
    Location::new(line_index as u32 + 1, char_column(line, indent))
}

/// Parse `NAME [as ALIAS]` entries separated by commas. `*` entries are
/// dropped; the caller decides what a star import means.
fn parse_name_list(toks: &[Tok], skip_words: &[&str]) -> (Vec<ImportedName>, bool) {
    let mut names = Vec::new();
    let mut star = false;
    let mut i = 0;
    while i < toks.len() {
        let text = toks[i].text.as_str();
        if text == "*" {
            star = true;
            // `* as ns`
            if toks.get(i + 1).is_some_and(|t| t.text == "as") {
                i += 2;
            }
            i += 1;
            continue;
        }
        let is_ident = text.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$');
        if !is_ident || skip_words.contains(&text) {
            i += 1;
            continue;
        }
        if toks.get(i + 1).is_some_and(|t| t.text == "as") {
            names.push(ImportedName {
                name: text.to_string(),
                alias: toks.get(i + 2).map(|t| t.text.clone()),
                location: toks[i].location,
            });
            i += 3;
            continue;
        }
        names.push(ImportedName {
            name: text.to_string(),
            alias: None,
            location: toks[i].location,
        });
        i += 1;
    }
    (names, star)
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

fn python_import(masked: &[&str], start: usize) -> Option<(Vec<ParsedImport>, usize)> {
    let line = masked[start];
    let location = statement_location(line, start);

    if let Some(caps) = PY_FROM_RE.captures(line) {
        let module = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let body_start = caps.get(0).map(|m| m.end()).unwrap_or(line.len());

        let mut end = start;
        let opens_paren = line[body_start..].contains('(') && !line[body_start..].contains(')');
        if opens_paren {
            while end + 1 < masked.len() && end - start < MAX_STATEMENT_LINES && !masked[end].contains(')') {
                end += 1;
            }
        } else {
            while masked[end].trim_end().ends_with('\\') && end + 1 < masked.len() && end - start < MAX_STATEMENT_LINES {
                end += 1;
            }
        }
        let toks = tokenize(&masked[start..=end], start, body_start);
        let (names, star) = parse_name_list(&toks, &[]);

        // `from . import views` brings in sibling modules, not symbols.
        if !module.is_empty() && module.chars().all(|c| c == '.') {
            let imports = names
                .into_iter()
                .map(|n| ParsedImport {
                    module: format!("{module}{}", n.name),
                    location: n.location,
                    names: Vec::new(),
                })
                .collect();
            return Some((imports, end));
        }
        let names = if star { Vec::new() } else { names };
        return Some((vec![ParsedImport { module, location, names }], end));
    }

    if PY_IMPORT_RE.is_match(line) {
        let body_start = line.find("import").map(|p| p + "import".len()).unwrap_or(0);
        let imports = PY_MODULE_RE
            .captures_iter(&line[body_start..])
            .filter_map(|caps| caps.get(1))
            .map(|m| ParsedImport {
                module: m.as_str().to_string(),
                location: Location::new(
                    start as u32 + 1,
                    char_column(line, body_start + m.start()),
                ),
                names: Vec::new(),
            })
            .collect();
        return Some((imports, start));
    }
    None
}

// ---------------------------------------------------------------------------
// TypeScript / JavaScript
// ---------------------------------------------------------------------------

fn script_import(masked: &[&str], raw: &[&str], start: usize) -> Option<(Vec<ParsedImport>, usize)> {
    let line = masked[start];
    let location = statement_location(line, start);

    if let Some(caps) = TS_REQUIRE_RE.captures(line) {
        let module = QUOTED_RE
            .captures(raw[start])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())?;
        let binding = caps.get(1)?;
        if !binding.as_str().starts_with('{') {
            return Some((vec![ParsedImport { module, location, names: Vec::new() }], start));
        }
        // CommonJS destructuring renames with `source: local`.
        let inner_start = binding.start() + 1;
        let inner = &line[inner_start..binding.end() - 1];
        let mut names = Vec::new();
        let mut offset = 0;
        for entry in inner.split(',') {
            let trimmed = entry.trim();
            if !trimmed.is_empty() {
                let (name, alias) = match trimmed.split_once(':') {
                    Some((name, alias)) => (name.trim(), Some(alias.trim().to_string())),
                    None => (trimmed, None),
                };
                let lead = entry.len() - entry.trim_start().len();
                names.push(ImportedName {
                    name: name.to_string(),
                    alias,
                    location: Location::new(
                        start as u32 + 1,
                        char_column(line, inner_start + offset + lead),
                    ),
                });
            }
            offset += entry.len() + 1;
        }
        return Some((vec![ParsedImport { module, location, names }], start));
    }

    if !TS_IMPORT_START_RE.is_match(line) {
        return None;
    }

    // A statement ends at its module string; a `;` or `}` without one means
    // this was a local export list, not an import.
    let mut end = start;
    while !QUOTED_RE.is_match(masked[end])
        && !masked[end].contains(';')
        && !masked[end].contains('}')
        && end + 1 < masked.len()
        && end - start < MAX_STATEMENT_LINES
    {
        end += 1;
    }
    let module = QUOTED_RE
        .captures(raw[end])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())?;

    let keyword_end = {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        let word = if trimmed.starts_with("export") { "export" } else { "import" };
        indent + word.len()
    };
    let toks = tokenize(&masked[start..=end], start, keyword_end);
    let clause: Vec<Tok> = toks.into_iter().take_while(|t| t.text != "from").collect();
    let (names, _) = parse_name_list(&clause, &["type", "typeof"]);
    Some((vec![ParsedImport { module, location, names }], end))
}

// ---------------------------------------------------------------------------
// Java
// ---------------------------------------------------------------------------

fn java_import(masked: &[&str], start: usize) -> Option<(Vec<ParsedImport>, usize)> {
    let line = masked[start];
    let caps = JAVA_IMPORT_RE.captures(line)?;
    let path = caps.get(1)?;
    let location = statement_location(line, start);
    if caps.get(2).is_some() {
        return Some((
            vec![ParsedImport { module: path.as_str().to_string(), location, names: Vec::new() }],
            start,
        ));
    }
    let full = path.as_str();
    let (module, name) = match full.rsplit_once('.') {
        Some((module, name)) => (module.to_string(), name.to_string()),
        None => (String::new(), full.to_string()),
    };
    let name_offset = path.end() - name.len();
    Some((
        vec![ParsedImport {
            module,
            location,
            names: vec![ImportedName {
                name,
                alias: None,
                location: Location::new(start as u32 + 1, char_column(line, name_offset)),
            }],
        }],
        start,
    ))
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

fn go_import(masked: &[&str], raw: &[&str], start: usize) -> Option<(Vec<ParsedImport>, usize)> {
    let line = masked[start];
    if GO_IMPORT_BLOCK_START_RE.is_match(line) {
        let mut imports = Vec::new();
        let mut end = start;
        while end + 1 < masked.len() && end - start < MAX_STATEMENT_LINES {
            end += 1;
            if masked[end].trim_start().starts_with(')') {
                break;
            }
            if let Some(m) = GO_IMPORT_BLOCK_LINE_RE.captures(raw[end]).and_then(|c| c.get(1)) {
                imports.push(ParsedImport {
                    module: m.as_str().to_string(),
                    location: Location::new(end as u32 + 1, char_column(raw[end], m.start())),
                    names: Vec::new(),
                });
            }
        }
        return Some((imports, end));
    }
    if !line.trim_start().starts_with("import") {
        return None;
    }
    let m = GO_IMPORT_SINGLE_RE.captures(raw[start]).and_then(|c| c.get(1))?;
    Some((
        vec![ParsedImport {
            module: m.as_str().to_string(),
            location: Location::new(start as u32 + 1, char_column(raw[start], m.start())),
            names: Vec::new(),
        }],
        start,
    ))
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

fn rust_use(masked: &[&str], start: usize) -> Option<(Vec<ParsedImport>, usize)> {
    let line = masked[start];
    let head = RUST_USE_RE.find(line)?;
    let mut end = start;
    while !masked[end].contains(';') && end + 1 < masked.len() && end - start < MAX_STATEMENT_LINES {
        end += 1;
    }
    let toks: Vec<Tok> = tokenize(&masked[start..=end], start, head.end())
        .into_iter()
        .take_while(|t| t.text != ";")
        .collect();
    let mut imports = Vec::new();
    let mut pos = 0;
    parse_use_tree(&toks, &mut pos, Vec::new(), &mut imports);
    Some((imports, end))
}

/// Recursive descent over a `use` tree: `a::b::{C, d::E as F, self, *}`.
fn parse_use_tree(toks: &[Tok], pos: &mut usize, prefix: Vec<String>, out: &mut Vec<ParsedImport>) {
    let mut path = prefix;
    while *pos < toks.len() {
        let tok = &toks[*pos];
        match tok.text.as_str() {
            "::" => {
                *pos += 1;
            }
            "{" => {
                *pos += 1;
                loop {
                    parse_use_tree(toks, pos, path.clone(), out);
                    match toks.get(*pos).map(|t| t.text.as_str()) {
                        Some(",") => *pos += 1,
                        Some("}") => {
                            *pos += 1;
                            break;
                        }
                        _ => break,
                    }
                    if toks.get(*pos).is_some_and(|t| t.text == "}") {
                        *pos += 1;
                        break;
                    }
                }
                return;
            }
            "*" => {
                out.push(ParsedImport {
                    module: path.join("::"),
                    location: tok.location,
                    names: Vec::new(),
                });
                *pos += 1;
                return;
            }
            "," | "}" => return,
            text if text == "self" && !path.is_empty() => {
                out.push(ParsedImport {
                    module: path.join("::"),
                    location: tok.location,
                    names: Vec::new(),
                });
                *pos += 1;
                skip_alias(toks, pos);
                return;
            }
            text => {
                let next = toks.get(*pos + 1).map(|t| t.text.as_str());
                if next == Some("::") {
                    path.push(text.to_string());
                    *pos += 1;
                    continue;
                }
                let location = tok.location;
                let name = text.to_string();
                *pos += 1;
                let alias = skip_alias(toks, pos);
                if path.is_empty() {
                    // `use serde;` names a crate, not a symbol.
                    out.push(ParsedImport { module: name, location, names: Vec::new() });
                } else {
                    out.push(ParsedImport {
                        module: path.join("::"),
                        location,
                        names: vec![ImportedName { name, alias, location }],
                    });
                }
                return;
            }
        }
    }
}

fn skip_alias(toks: &[Tok], pos: &mut usize) -> Option<String> {
    if toks.get(*pos).is_some_and(|t| t.text == "as") {
        let alias = toks.get(*pos + 1).map(|t| t.text.clone());
        *pos += 2;
        return alias;
    }
    None
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Try to parse an import statement starting at `start`. Returns the parsed
/// imports and the index of the statement's last line.
pub fn parse_import(
    language: Language,
    masked: &[&str],
    raw: &[&str],
    start: usize,
) -> Option<(Vec<ParsedImport>, usize)> {
    match language {
        Language::Python => python_import(masked, start),
        Language::TypeScript | Language::JavaScript => script_import(masked, raw, start),
        Language::Java => java_import(masked, start),
        Language::Go => go_import(masked, raw, start),
        Language::Rust => rust_use(masked, start),
        Language::Other => java_import(masked, start).or_else(|| script_import(masked, raw, start)),
    }
}
