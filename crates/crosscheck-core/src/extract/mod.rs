//! Tolerant lexical extraction of definitions and references from one
//! artifact.
//!
//! Nothing here parses. Comment and string bodies are masked, then each line
//! is matched against per-language patterns. Malformed input never fails;
//! it yields partial results marked `Confidence::Low`.

pub mod definitions;
pub mod imports;
pub mod mask;
pub mod pipeline;
pub mod references;

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::guards::{self, truncate_to_boundary};
use crate::models::{
    Artifact, Language, Location, ModuleImport, Reference, ReferenceKind, Symbol, SymbolKind,
};

use self::definitions::LineContext;
use self::imports::char_column;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input bounds for a single extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_source_bytes: usize,
    pub max_lines: usize,
    pub max_line_length: usize,
    pub max_items: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: guards::DEFAULT_MAX_SOURCE_BYTES,
            max_lines: guards::DEFAULT_MAX_LINES,
            max_line_length: guards::DEFAULT_MAX_LINE_LENGTH,
            max_items: guards::DEFAULT_MAX_ITEMS_PER_ARTIFACT,
        }
    }
}

impl From<&EngineConfig> for ExtractLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_source_bytes: config.max_source_bytes,
            max_lines: config.max_lines,
            max_line_length: config.max_line_length,
            max_items: config.max_items_per_artifact,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionResult {
    pub artifact_id: String,
    pub language: Language,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub module_imports: Vec<ModuleImport>,
    pub confidence: Confidence,
    /// Why confidence is low, if it is.
    pub notes: Vec<String>,
}

impl ExtractionResult {
    pub fn empty(artifact_id: &str, language: Language) -> Self {
        Self {
            artifact_id: artifact_id.to_string(),
            language,
            symbols: Vec::new(),
            references: Vec::new(),
            module_imports: Vec::new(),
            confidence: Confidence::High,
            notes: Vec::new(),
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }

    /// Symbols that define something (everything except import bindings).
    pub fn definitions(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.kind != SymbolKind::Import)
    }

    /// References sitting exactly at `location`.
    pub fn references_at(&self, location: Location) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(move |r| r.location == location)
    }

    fn degrade(&mut self, note: impl Into<String>) {
        self.confidence = Confidence::Low;
        self.notes.push(note.into());
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

struct Scanner<'a> {
    result: ExtractionResult,
    max_items: usize,
    items: usize,
    capped: bool,
    artifact_id: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(artifact_id: &'a str, language: Language, max_items: usize) -> Self {
        Self {
            result: ExtractionResult::empty(artifact_id, language),
            max_items,
            items: 0,
            capped: false,
            artifact_id,
        }
    }

    fn room(&mut self) -> bool {
        if self.items >= self.max_items {
            self.capped = true;
            return false;
        }
        self.items += 1;
        true
    }

    fn symbol(&mut self, kind: SymbolKind, name: &str, location: Location) {
        if self.room() {
            self.result.symbols.push(Symbol {
                kind,
                name: name.to_string(),
                defining_artifact_id: self.artifact_id.to_string(),
                location,
            });
        }
    }

    fn reference(&mut self, kind: ReferenceKind, name: &str, location: Location, module: Option<&str>) {
        if self.room() {
            self.result.references.push(Reference {
                referenced_name: name.to_string(),
                kind,
                referencing_artifact_id: self.artifact_id.to_string(),
                location,
                module: module.map(str::to_string),
            });
        }
    }

    fn module_import(&mut self, module: &str, location: Location) {
        if self.room() {
            self.result.module_imports.push(ModuleImport {
                module: module.to_string(),
                referencing_artifact_id: self.artifact_id.to_string(),
                location,
            });
        }
    }
}

/// Cut `line` to at most `max_chars` characters.
fn clip(line: &str, max_chars: usize) -> (&str, bool) {
    match line.char_indices().nth(max_chars) {
        Some((byte, _)) => (&line[..byte], true),
        None => (line, false),
    }
}

fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Class-body tracking. Brace languages track the depth a body opened at;
/// Python tracks the class indent and the indent of its first body line.
#[derive(Default)]
struct Scopes {
    depth: i64,
    negative_depth: bool,
    class_depths: Vec<i64>,
    pending_body: bool,
    py_classes: Vec<(usize, Option<usize>)>,
}

impl Scopes {
    fn enter_line(&mut self, language: Language, line: &str) -> LineContext {
        if language == Language::Python {
            let indent = indent_width(line);
            while self.py_classes.last().is_some_and(|(class_indent, _)| indent <= *class_indent) {
                self.py_classes.pop();
            }
            if let Some(top) = self.py_classes.last_mut() {
                if top.1.is_none() {
                    top.1 = Some(indent);
                }
            }
            return LineContext {
                member: self.py_classes.last().is_some_and(|(_, body)| *body == Some(indent)),
                in_class: !self.py_classes.is_empty(),
            };
        }
        if self.pending_body {
            self.pending_body = false;
            if line.trim_start().starts_with('{') {
                self.class_depths.push(self.depth);
            }
        }
        LineContext {
            member: self.class_depths.last().is_some_and(|d| self.depth == d + 1),
            in_class: !self.class_depths.is_empty(),
        }
    }

    fn open_body(&mut self, language: Language, line: &str) {
        if language == Language::Python {
            self.py_classes.push((indent_width(line), None));
        } else if line.contains('{') {
            self.class_depths.push(self.depth);
        } else if !line.contains(';') && !line.contains('=') {
            self.pending_body = true;
        }
    }

    fn leave_line(&mut self, line: &str) {
        for c in line.chars() {
            match c {
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth < 0 {
                        self.negative_depth = true;
                        self.depth = 0;
                    }
                    while self.class_depths.last().is_some_and(|d| self.depth <= *d) {
                        self.class_depths.pop();
                    }
                }
                _ => {}
            }
        }
    }
}

fn scan(artifact: &Artifact, limits: &ExtractLimits) -> ExtractionResult {
    let language = artifact.lang();
    let artifact_id = artifact.task_id.as_str();
    let mut scanner = Scanner::new(artifact_id, language, limits.max_items);

    let mut source = artifact.source_text.as_str();
    if source.len() > limits.max_source_bytes {
        source = truncate_to_boundary(source, limits.max_source_bytes);
        scanner
            .result
            .degrade(format!("source truncated to {} bytes", source.len()));
    }

    let masked = mask::mask_source(source, language);
    if masked.unterminated {
        scanner.result.degrade("unterminated string or comment");
    }
    let masked_lines: Vec<&str> = masked.text.split('\n').collect();
    let raw_lines: Vec<&str> = source.split('\n').collect();

    let mut line_count = masked_lines.len().min(raw_lines.len());
    if line_count > limits.max_lines {
        line_count = limits.max_lines;
        scanner
            .result
            .degrade(format!("only the first {} lines were scanned", limits.max_lines));
    }
    let masked_lines = &masked_lines[..line_count];
    let raw_lines = &raw_lines[..line_count];

    let mut scopes = Scopes::default();
    let mut clipped_lines = 0usize;
    let mut index = 0;
    while index < line_count && !scanner.capped {
        let (line, clipped) = clip(masked_lines[index], limits.max_line_length);
        if clipped {
            clipped_lines += 1;
        }
        if line.trim().is_empty() {
            index += 1;
            continue;
        }
        let line_no = index as u32 + 1;
        let ctx = scopes.enter_line(language, line);

        if let Some((parsed, end)) = imports::parse_import(language, masked_lines, raw_lines, index) {
            for import in parsed {
                if import.names.is_empty() {
                    scanner.module_import(&import.module, import.location);
                    continue;
                }
                for name in &import.names {
                    let binding = name.alias.as_deref().unwrap_or(&name.name);
                    scanner.symbol(SymbolKind::Import, binding, name.location);
                    scanner.reference(
                        ReferenceKind::Import,
                        &name.name,
                        name.location,
                        Some(&import.module),
                    );
                }
            }
            for line in &masked_lines[index..=end] {
                scopes.leave_line(line);
            }
            index = end + 1;
            continue;
        }

        let defs = definitions::definitions(language, line, &ctx);
        let mut excluded = Vec::with_capacity(defs.len());
        for def in &defs {
            scanner.symbol(def.kind, &def.name, Location::new(line_no, char_column(line, def.start)));
            excluded.push(def.start);
            if def.opens_body {
                scopes.open_body(language, line);
            }
        }

        for usage in references::usages(line, &excluded) {
            scanner.reference(
                usage.kind,
                &usage.name,
                Location::new(line_no, char_column(line, usage.start)),
                None,
            );
        }

        scopes.leave_line(line);
        index += 1;
    }

    let mut result = scanner.result;
    if scanner.capped {
        result.degrade(format!("stopped after {} extracted items", limits.max_items));
    }
    if clipped_lines > 0 {
        result.degrade(format!(
            "{clipped_lines} lines longer than {} characters were clipped",
            limits.max_line_length
        ));
    }
    if scopes.negative_depth || scopes.depth != 0 {
        result.degrade("unbalanced braces");
    }
    result
}

/// Extract symbols and references from one artifact. Never panics and never
/// fails: a scanner fault yields an empty low-confidence result.
pub fn extract_artifact(artifact: &Artifact, limits: &ExtractLimits) -> ExtractionResult {
    match catch_unwind(AssertUnwindSafe(|| scan(artifact, limits))) {
        Ok(result) => {
            if result.is_low_confidence() {
                debug!(
                    "Low-confidence extraction for {}: {}",
                    artifact.task_id,
                    result.notes.join("; ")
                );
            }
            result
        }
        Err(_) => {
            warn!("Extractor panicked on artifact {}; using empty result", artifact.task_id);
            let mut result = ExtractionResult::empty(&artifact.task_id, artifact.lang());
            result.degrade("extractor fault");
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str, language: &str) -> ExtractionResult {
        extract_artifact(&Artifact::new("t1", language, source), &ExtractLimits::default())
    }

    fn defined(result: &ExtractionResult) -> Vec<(&str, SymbolKind)> {
        result.definitions().map(|s| (s.name.as_str(), s.kind)).collect()
    }

    #[test]
    fn test_python_model_artifact() {
        let source = "\
from dataclasses import dataclass
from typing import Optional

@dataclass
class Book:
    title: str
    author_id: int
    created_at: Optional[str] = None

    def display_name(self):
        return self.title.upper()
";
        let result = extract(source, "python");
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(
            defined(&result),
            vec![
                ("Book", SymbolKind::Class),
                ("title", SymbolKind::Field),
                ("author_id", SymbolKind::Field),
                ("created_at", SymbolKind::Field),
                ("display_name", SymbolKind::Function),
            ]
        );
        let book = &result.symbols.iter().find(|s| s.name == "Book").unwrap();
        assert_eq!(book.location, Location::new(5, 7));
        let imports: Vec<&str> = result
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Import)
            .map(|r| r.referenced_name.as_str())
            .collect();
        assert_eq!(imports, vec!["dataclass", "Optional"]);
    }

    #[test]
    fn test_python_reference_locations() {
        let source = "from models import Books\n\ndef shelf() -> Books:\n    return Books()\n";
        let result = extract(source, "python");
        let spots: Vec<(ReferenceKind, Location)> = result
            .references
            .iter()
            .filter(|r| r.referenced_name == "Books")
            .map(|r| (r.kind, r.location))
            .collect();
        assert_eq!(
            spots,
            vec![
                (ReferenceKind::Import, Location::new(1, 20)),
                (ReferenceKind::Type, Location::new(3, 16)),
                (ReferenceKind::Type, Location::new(4, 12)),
            ]
        );
        assert_eq!(result.references[0].module.as_deref(), Some("models"));
    }

    #[test]
    fn test_names_in_strings_and_comments_ignored() {
        let source = "# Books are great\nlabel = \"Books\"\n";
        let result = extract(source, "python");
        assert!(result.references.iter().all(|r| r.referenced_name != "Books"));
    }

    #[test]
    fn test_typescript_interface_fields() {
        let source = "\
import { Author } from './author';

export interface Book {
  id: string;
  createdAt: Date;
  author: Author;
}

export function makeBook(id: string): Book {
  return { id, createdAt: new Date(), author: loadAuthor(id) };
}
";
        let result = extract(source, "typescript");
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(
            defined(&result),
            vec![
                ("Book", SymbolKind::Class),
                ("id", SymbolKind::Field),
                ("createdAt", SymbolKind::Field),
                ("author", SymbolKind::Field),
                ("makeBook", SymbolKind::Function),
            ]
        );
        assert!(result
            .references
            .iter()
            .any(|r| r.referenced_name == "loadAuthor" && r.kind == ReferenceKind::Call));
        // The object literal inside the function is not a member body.
        assert!(!result.symbols.iter().any(|s| s.location.line == 10));
    }

    #[test]
    fn test_java_brace_on_next_line() {
        let source = "public class Shelf\n{\n    private int count;\n}\n";
        let result = extract(source, "java");
        assert_eq!(
            defined(&result),
            vec![("Shelf", SymbolKind::Class), ("count", SymbolKind::Field)]
        );
    }

    #[test]
    fn test_module_only_imports() {
        let result = extract("import os\nimport json\n", "python");
        let modules: Vec<&str> = result.module_imports.iter().map(|m| m.module.as_str()).collect();
        assert_eq!(modules, vec!["os", "json"]);
        assert!(result.references.is_empty());
    }

    #[test]
    fn test_unterminated_string_is_low_confidence() {
        let result = extract("class Book:\n    title = \"oops\n", "python");
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.definitions().any(|s| s.name == "Book"));
    }

    #[test]
    fn test_unbalanced_braces_is_low_confidence() {
        let result = extract("class Book {\n  title: string;\n", "typescript");
        assert!(result.is_low_confidence());
        assert!(result.notes.iter().any(|n| n.contains("unbalanced")));
        assert!(result.definitions().any(|s| s.name == "title"));
    }

    #[test]
    fn test_item_cap_truncates() {
        let source: String = (0..50).map(|i| format!("def f{i}():\n    pass\n")).collect();
        let limits = ExtractLimits { max_items: 10, ..ExtractLimits::default() };
        let result = extract_artifact(&Artifact::new("t1", "python", source), &limits);
        assert_eq!(result.symbols.len(), 10);
        assert!(result.is_low_confidence());
    }

    #[test]
    fn test_line_cap_truncates() {
        let source: String = (0..30).map(|i| format!("def f{i}():\n")).collect();
        let limits = ExtractLimits { max_lines: 10, ..ExtractLimits::default() };
        let result = extract_artifact(&Artifact::new("t1", "python", source), &limits);
        assert_eq!(result.symbols.len(), 10);
        assert!(result.notes.iter().any(|n| n.contains("first 10 lines")));
    }

    #[test]
    fn test_garbage_input_never_fails() {
        let source = "}}}{{{ \"\"\" ''' /* class ( def ::: \u{0}\u{feff} é 🦀";
        for language in ["python", "typescript", "java", "go", "rust", "cobol"] {
            let result = extract(source, language);
            assert_eq!(result.artifact_id, "t1");
        }
    }

    #[test]
    fn test_go_struct_fields() {
        let source = "package models\n\ntype Book struct {\n\tTitle string\n\tAuthorID int\n}\n";
        let result = extract(source, "go");
        assert_eq!(
            defined(&result),
            vec![
                ("Book", SymbolKind::Class),
                ("Title", SymbolKind::Field),
                ("AuthorID", SymbolKind::Field),
            ]
        );
    }

    #[test]
    fn test_rust_use_and_struct() {
        let source = "use crate::models::Author;\n\npub struct Book {\n    pub author: Author,\n}\n";
        let result = extract(source, "rust");
        assert_eq!(
            defined(&result),
            vec![("Book", SymbolKind::Class), ("author", SymbolKind::Field)]
        );
        let import = result
            .references
            .iter()
            .find(|r| r.kind == ReferenceKind::Import)
            .unwrap();
        assert_eq!(import.referenced_name, "Author");
        assert_eq!(import.module.as_deref(), Some("crate::models"));
    }
}
