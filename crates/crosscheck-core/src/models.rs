//! Shared typed models used across extraction, validation, fixing and storage.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ConsistencyError, ConsistencyResult};

/// Derive a short deterministic identifier (first 16 hex chars of SHA-256)
/// from a list of parts. Parts are separated by a NUL byte so that
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn short_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    ("py", Language::Python),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("java", Language::Java),
    ("go", Language::Go),
    ("rs", Language::Rust),
];

/// Source language of an artifact, as far as the lexical scanner cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
    Java,
    Go,
    Rust,
    /// Anything else; scanned with the generic C-like rules.
    Other,
}

impl Language {
    /// Parse a free-form language label (`"py"`, `"TypeScript"`, `"golang"`, ...).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "python" | "py" => Language::Python,
            "typescript" | "ts" | "tsx" => Language::TypeScript,
            "javascript" | "js" | "jsx" | "node" => Language::JavaScript,
            "java" => Language::Java,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            _ => Language::Other,
        }
    }

    /// Detect a language from a file extension. Returns `None` for files the
    /// scanner has no rules for.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_string_lossy().to_lowercase();
        LANGUAGE_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext.as_str())
            .map(|(_, lang)| *lang)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Other => "other",
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// One generated source unit, produced by a single generation task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub task_id: String,
    pub language: String,
    pub source_text: String,
    /// Optional file path the generator intended for this artifact. Used to
    /// map module-style imports back to artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Artifact {
    pub fn new(
        task_id: impl Into<String>,
        language: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            language: language.into(),
            source_text: source_text.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn lang(&self) -> Language {
        Language::from_name(&self.language)
    }
}

// ---------------------------------------------------------------------------
// Symbols and references
// ---------------------------------------------------------------------------

/// 1-based line and column. Columns count characters, not bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Function,
    Field,
    Import,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Field => "field",
            SymbolKind::Import => "import",
        }
    }
}

/// A named definition extracted from an artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub defining_artifact_id: String,
    pub location: Location,
}

/// How a name is used at a reference site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// A name brought in by an import/use statement.
    Import,
    /// A type position: annotation, `new X(`, `extends X`, constructor call.
    Type,
    /// A free function call `foo(`.
    Call,
    /// A member access `.foo`.
    Member,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Import => "import",
            ReferenceKind::Type => "type",
            ReferenceKind::Call => "call",
            ReferenceKind::Member => "member",
        }
    }

    /// Symbol kinds a near-miss of this reference may plausibly have meant.
    pub fn accepts(&self, kind: SymbolKind) -> bool {
        match self {
            ReferenceKind::Import => kind != SymbolKind::Import,
            ReferenceKind::Type => kind == SymbolKind::Class,
            ReferenceKind::Call => matches!(kind, SymbolKind::Function | SymbolKind::Class),
            ReferenceKind::Member => matches!(kind, SymbolKind::Field | SymbolKind::Function),
        }
    }
}

/// A usage of a name, possibly in a different artifact than its definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub referenced_name: String,
    pub kind: ReferenceKind,
    pub referencing_artifact_id: String,
    pub location: Location,
    /// Module path of the import statement, for `Import` references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// An import statement that names a module but no individual symbol
/// (`import os`, `import "fmt"`, `import * as api from './api'`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleImport {
    pub module: String,
    pub referencing_artifact_id: String,
    pub location: Location,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CRITICAL" => Some(Severity::Critical),
            "WARNING" => Some(Severity::Warning),
            "INFO" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Reference is a likely typo of a single canonical definition.
    NamingMismatch,
    /// Same token sequence, different delimiter or case style.
    CaseStyleDrift,
    /// Several equally-close candidates; needs a human decision.
    AmbiguousReference,
    /// Imported name defined nowhere in the batch nor allow-listed.
    MissingDefinition,
    ImportCycle,
    DuplicateDefinition,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::NamingMismatch => "naming_mismatch",
            IssueCategory::CaseStyleDrift => "case_style_drift",
            IssueCategory::AmbiguousReference => "ambiguous_reference",
            IssueCategory::MissingDefinition => "missing_definition",
            IssueCategory::ImportCycle => "import_cycle",
            IssueCategory::DuplicateDefinition => "duplicate_definition",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "naming_mismatch" => Some(IssueCategory::NamingMismatch),
            "case_style_drift" => Some(IssueCategory::CaseStyleDrift),
            "ambiguous_reference" => Some(IssueCategory::AmbiguousReference),
            "missing_definition" => Some(IssueCategory::MissingDefinition),
            "import_cycle" => Some(IssueCategory::ImportCycle),
            "duplicate_definition" => Some(IssueCategory::DuplicateDefinition),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Detected,
    AutoFixed,
    FixFailed,
    Dismissed,
    Resolved,
}

/// Who is driving a status transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Actor {
    /// The AutoFixer.
    Engine,
    /// A user or an external system.
    External,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Detected => "detected",
            IssueStatus::AutoFixed => "auto_fixed",
            IssueStatus::FixFailed => "fix_failed",
            IssueStatus::Dismissed => "dismissed",
            IssueStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "detected" => Some(IssueStatus::Detected),
            "auto_fixed" => Some(IssueStatus::AutoFixed),
            "fix_failed" => Some(IssueStatus::FixFailed),
            "dismissed" => Some(IssueStatus::Dismissed),
            "resolved" => Some(IssueStatus::Resolved),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IssueStatus::Dismissed | IssueStatus::Resolved)
    }

    /// Whether `actor` may move an issue from `self` to `to`.
    pub fn can_transition(&self, to: IssueStatus, actor: Actor) -> bool {
        use IssueStatus::*;
        match actor {
            Actor::Engine => matches!(
                (self, to),
                (Detected, AutoFixed) | (Detected, FixFailed) | (AutoFixed, FixFailed)
            ),
            Actor::External => !self.is_terminal() && matches!(to, Dismissed | Resolved),
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position inside a specific artifact.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueLocation {
    pub artifact_id: String,
    pub line: u32,
    pub column: u32,
}

impl IssueLocation {
    pub fn new(artifact_id: impl Into<String>, location: Location) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            line: location.line,
            column: location.column,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
}

/// A single, unambiguous rename of `original` to `replacement` at every
/// listed edit site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub description: String,
    pub original: String,
    pub replacement: String,
    pub edits: Vec<IssueLocation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub severity: Severity,
    pub category: IssueCategory,
    /// The name (or cycle members) the issue is about.
    pub subject: String,
    pub message: String,
    pub artifact_ids: Vec<String>,
    pub locations: Vec<IssueLocation>,
    pub auto_fixable: bool,
    pub fix_suggestion: Option<FixSuggestion>,
    pub fix_applied: bool,
    pub status: IssueStatus,
}

impl Issue {
    /// Create a `detected` issue. The id is derived from the category,
    /// subject and first location so it is stable across re-runs.
    pub fn new(
        category: IssueCategory,
        severity: Severity,
        subject: impl Into<String>,
        message: impl Into<String>,
        locations: Vec<IssueLocation>,
    ) -> Self {
        let subject = subject.into();
        let mut artifact_ids: Vec<String> = Vec::new();
        for loc in &locations {
            if !artifact_ids.contains(&loc.artifact_id) {
                artifact_ids.push(loc.artifact_id.clone());
            }
        }
        let anchor = locations
            .first()
            .map(|l| format!("{}:{}:{}", l.artifact_id, l.line, l.column))
            .unwrap_or_default();
        let id = short_digest(&[category.as_str(), &subject, &anchor]);
        Self {
            id,
            severity,
            category,
            subject,
            message: message.into(),
            artifact_ids,
            locations,
            auto_fixable: false,
            fix_suggestion: None,
            fix_applied: false,
            status: IssueStatus::Detected,
        }
    }

    /// Attach an auto-fix. Marks the issue auto-fixable.
    pub fn with_fix(mut self, fix: FixSuggestion) -> Self {
        self.auto_fixable = true;
        self.fix_suggestion = Some(fix);
        self
    }

    /// Override the artifacts involved, e.g. when an issue spans artifacts
    /// it has no location in.
    pub fn with_artifacts(mut self, artifact_ids: Vec<String>) -> Self {
        self.artifact_ids = artifact_ids;
        self
    }

    /// Move the issue through its state machine.
    pub fn transition(&mut self, to: IssueStatus, actor: Actor) -> ConsistencyResult<()> {
        if !self.status.can_transition(to, actor) {
            return Err(ConsistencyError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        if actor == Actor::Engine {
            self.fix_applied = to == IssueStatus::AutoFixed;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runs and reports
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub auto_fixed: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub project_id: String,
    pub batch_id: String,
    pub run_id: String,
    pub summary: Summary,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
    /// Run-level warnings: failed validators, persistence problems.
    pub warnings: Vec<String>,
    /// Artifacts whose extraction was partial.
    pub low_confidence_artifacts: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only historical record of one triggered validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub run_id: String,
    pub project_id: String,
    pub batch_id: String,
    pub artifact_ids: Vec<String>,
    pub issue_ids: Vec<String>,
    pub summary: Summary,
    pub created_at: DateTime<Utc>,
}

impl ValidationRun {
    pub fn from_report(report: &ValidationReport, artifact_ids: Vec<String>) -> Self {
        Self {
            run_id: report.run_id.clone(),
            project_id: report.project_id.clone(),
            batch_id: report.batch_id.clone(),
            artifact_ids,
            issue_ids: report.issues.iter().map(|i| i.id.clone()).collect(),
            summary: report.summary.clone(),
            created_at: report.created_at,
        }
    }
}

/// Event sent to subscribers when a run completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub project_id: String,
    pub batch_id: String,
    pub run_id: String,
    pub total_issues: usize,
    pub critical: usize,
    pub warnings: usize,
    pub auto_fixed: usize,
}

impl CompletionNotice {
    pub fn from_report(report: &ValidationReport) -> Self {
        Self {
            project_id: report.project_id.clone(),
            batch_id: report.batch_id.clone(),
            run_id: report.run_id.clone(),
            total_issues: report.summary.total,
            critical: report.summary.critical,
            warnings: report.summary.warning,
            auto_fixed: report.summary.auto_fixed,
        }
    }
}
