//! Naming consistency: typos, case-style drift and ambiguous references.

use indexmap::IndexMap;

use crate::errors::ConsistencyResult;
use crate::index::{CrossArtifactIndex, Resolution};
use crate::models::{FixSuggestion, Issue, IssueCategory, IssueLocation, Reference, ReferenceKind};
use crate::validate::severity::{auto_fixable, classify, Ambiguity, Resolvability};
use crate::validate::Validator;

pub struct NamingValidator;

/// References grouped by `(artifact, name)` in first-seen order.
pub(crate) fn group_references<'a, F>(
    index: &'a CrossArtifactIndex,
    keep: F,
) -> IndexMap<(&'a str, &'a str), Vec<&'a Reference>>
where
    F: Fn(&Reference) -> bool,
{
    let mut groups: IndexMap<(&str, &str), Vec<&Reference>> = IndexMap::new();
    for reference in index.references().iter().filter(|r| keep(r)) {
        groups
            .entry((reference.referencing_artifact_id.as_str(), reference.referenced_name.as_str()))
            .or_default()
            .push(reference);
    }
    groups
}

/// The kind a group is resolved as: an import accepts any definition kind,
/// otherwise the first usage decides.
fn group_kind(references: &[&Reference]) -> ReferenceKind {
    if references.iter().any(|r| r.kind == ReferenceKind::Import) {
        ReferenceKind::Import
    } else {
        references.first().map(|r| r.kind).unwrap_or(ReferenceKind::Type)
    }
}

fn rename_issue(
    category: IssueCategory,
    name: &str,
    canonical: &str,
    defined_in: &str,
    locations: Vec<IssueLocation>,
) -> Issue {
    let severity = classify(category, Resolvability::Resolvable, Ambiguity::Unique);
    let message = match category {
        IssueCategory::CaseStyleDrift => format!(
            "`{name}` differs from `{canonical}` (defined in {defined_in}) only in case or delimiters"
        ),
        _ => format!("`{name}` is not defined; it looks like a typo of `{canonical}` (defined in {defined_in})"),
    };
    let fix = FixSuggestion {
        description: format!("Rename `{name}` to `{canonical}`"),
        original: name.to_string(),
        replacement: canonical.to_string(),
        edits: locations.clone(),
    };
    let issue = Issue::new(category, severity, name, message, locations);
    if auto_fixable(category, Resolvability::Resolvable, Ambiguity::Unique) {
        issue.with_fix(fix)
    } else {
        issue
    }
}

impl Validator for NamingValidator {
    fn name(&self) -> &'static str {
        "naming"
    }

    fn validate(&self, index: &CrossArtifactIndex) -> ConsistencyResult<Vec<Issue>> {
        let allow = index.allow_list();
        let groups = group_references(index, |r| {
            !allow.allows_name(&r.referenced_name)
                && !index.is_external_binding(&r.referencing_artifact_id, &r.referenced_name)
        });

        let mut issues = Vec::new();
        for ((artifact_id, name), references) in groups {
            let locations: Vec<IssueLocation> = references
                .iter()
                .map(|r| IssueLocation::new(artifact_id, r.location))
                .collect();
            match index.resolve(name, group_kind(&references)) {
                Resolution::Exact(_) | Resolution::Unresolved => {}
                Resolution::CaseDrift(canonical) => issues.push(rename_issue(
                    IssueCategory::CaseStyleDrift,
                    name,
                    &canonical.name,
                    &canonical.defining_artifact_id,
                    locations,
                )),
                Resolution::Fuzzy { canonical, .. } => issues.push(rename_issue(
                    IssueCategory::NamingMismatch,
                    name,
                    &canonical.name,
                    &canonical.defining_artifact_id,
                    locations,
                )),
                Resolution::Ambiguous { candidates, .. } => {
                    let severity = classify(
                        IssueCategory::AmbiguousReference,
                        Resolvability::Unresolvable,
                        Ambiguity::Ambiguous,
                    );
                    let listed = candidates
                        .iter()
                        .map(|c| format!("`{c}`"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    issues.push(Issue::new(
                        IssueCategory::AmbiguousReference,
                        severity,
                        name,
                        format!("`{name}` is not defined and is equally close to {listed}; choose one manually"),
                        locations,
                    ));
                }
            }
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::extract::{extract_artifact, ExtractLimits};
    use crate::models::{Artifact, Location, Severity};

    fn run(artifacts: &[Artifact]) -> Vec<Issue> {
        let results: Vec<_> = artifacts
            .iter()
            .map(|a| extract_artifact(a, &ExtractLimits::default()))
            .collect();
        let index = CrossArtifactIndex::build(artifacts, &results, &EngineConfig::default());
        NamingValidator.validate(&index).unwrap()
    }

    #[test]
    fn test_typo_is_one_critical_issue_with_all_locations() {
        let issues = run(&[
            Artifact::new("a", "python", "class Book:\n    title: str\n"),
            Artifact::new(
                "b",
                "python",
                "from models import Books\n\ndef shelf() -> Books:\n    return Books()\n",
            ),
        ]);
        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.category, IssueCategory::NamingMismatch);
        assert_eq!(issue.severity, Severity::Critical);
        assert!(issue.auto_fixable);
        assert_eq!(issue.artifact_ids, vec!["b".to_string()]);
        assert_eq!(issue.locations.len(), 3);
        assert_eq!(issue.locations[0].location(), Location::new(1, 20));
        let fix = issue.fix_suggestion.as_ref().unwrap();
        assert_eq!((fix.original.as_str(), fix.replacement.as_str()), ("Books", "Book"));
    }

    #[test]
    fn test_case_drift_is_warning() {
        let issues = run(&[
            Artifact::new("a", "python", "class Book:\n    created_at: str\n"),
            Artifact::new("b", "typescript", "const when = book.createdAt;\n"),
        ]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::CaseStyleDrift);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].auto_fixable);
    }

    #[test]
    fn test_case_drift_over_two_spellings_fixes_to_earliest() {
        let issues = run(&[
            Artifact::new("a", "python", "class Order:\n    created_at: str\n"),
            Artifact::new("b", "python", "class Invoice:\n    createdAt: str\n"),
            Artifact::new("c", "python", "when = row.created_At\n"),
        ]);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].category, IssueCategory::CaseStyleDrift);
        assert_eq!(issues[0].severity, Severity::Warning);
        let fix = issues[0].fix_suggestion.as_ref().unwrap();
        assert_eq!(fix.replacement, "created_at");
    }

    #[test]
    fn test_module_qualified_typo_is_reported() {
        let issues = run(&[
            Artifact::new("a", "python", "class Book:\n    pass\n"),
            Artifact::new(
                "b",
                "python",
                "import models\nx = models.Books()\ny: models.Books = None\n",
            ),
            Artifact::new(
                "c",
                "typescript",
                "import * as models from './models';\nconst z = new models.Books();\n",
            ),
        ]);
        assert_eq!(issues.len(), 2, "{issues:?}");
        for issue in &issues {
            assert_eq!(issue.category, IssueCategory::NamingMismatch);
            assert_eq!(issue.subject, "Books");
            assert!(issue.auto_fixable);
        }
        assert_eq!(issues[0].artifact_ids, vec!["b".to_string()]);
        assert_eq!(issues[0].locations.len(), 2);
        assert_eq!(issues[1].artifact_ids, vec!["c".to_string()]);
    }

    #[test]
    fn test_ambiguous_is_critical_without_fix() {
        let issues = run(&[
            Artifact::new("a", "python", "class Card:\n    pass\n"),
            Artifact::new("b", "python", "class Cart:\n    pass\n"),
            Artifact::new("c", "python", "x = Carx()\n"),
        ]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::AmbiguousReference);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(!issues[0].auto_fixable);
        assert!(issues[0].fix_suggestion.is_none());
    }

    #[test]
    fn test_allow_listed_and_external_names_skipped() {
        let issues = run(&[
            Artifact::new("a", "python", "class Columns:\n    pass\n"),
            Artifact::new(
                "b",
                "python",
                "from sqlalchemy import Column\nx = Column()\ny = Optional[int]\n",
            ),
        ]);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn test_exact_references_are_clean() {
        let issues = run(&[
            Artifact::new("a", "python", "class Book:\n    pass\n"),
            Artifact::new("b", "python", "from a import Book\nb = Book()\n"),
        ]);
        assert!(issues.is_empty());
    }
}
