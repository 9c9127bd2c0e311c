//! Deterministic severity mapping shared by every validator.

use crate::models::{IssueCategory, Severity};

/// Whether a single canonical target exists for the finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolvability {
    Resolvable,
    Unresolvable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ambiguity {
    Unique,
    Ambiguous,
}

pub fn classify(category: IssueCategory, resolvability: Resolvability, ambiguity: Ambiguity) -> Severity {
    use IssueCategory::*;
    if ambiguity == Ambiguity::Ambiguous {
        return Severity::Critical;
    }
    match (category, resolvability) {
        (NamingMismatch | AmbiguousReference | MissingDefinition, _) => Severity::Critical,
        (CaseStyleDrift, Resolvability::Resolvable) => Severity::Warning,
        (CaseStyleDrift, Resolvability::Unresolvable) => Severity::Critical,
        (ImportCycle, _) => Severity::Warning,
        (DuplicateDefinition, _) => Severity::Info,
    }
}

/// Only unique, resolvable renames can be applied mechanically.
pub fn auto_fixable(category: IssueCategory, resolvability: Resolvability, ambiguity: Ambiguity) -> bool {
    matches!(category, IssueCategory::NamingMismatch | IssueCategory::CaseStyleDrift)
        && resolvability == Resolvability::Resolvable
        && ambiguity == Ambiguity::Unique
}
