//! Class-like names defined by more than one artifact.

use crate::errors::ConsistencyResult;
use crate::index::CrossArtifactIndex;
use crate::models::{Issue, IssueCategory, IssueLocation, SymbolKind};
use crate::validate::severity::{classify, Ambiguity, Resolvability};
use crate::validate::Validator;

pub struct DuplicateDefinitionValidator;

impl Validator for DuplicateDefinitionValidator {
    fn name(&self) -> &'static str {
        "duplicate_definitions"
    }

    fn validate(&self, index: &CrossArtifactIndex) -> ConsistencyResult<Vec<Issue>> {
        let mut issues = Vec::new();
        for (name, definitions) in index.defined_names() {
            let mut locations: Vec<IssueLocation> = Vec::new();
            for symbol in definitions.iter().filter(|s| s.kind == SymbolKind::Class) {
                // One location per artifact; re-declarations within a file
                // are not cross-artifact drift.
                if locations.iter().all(|l| l.artifact_id != symbol.defining_artifact_id) {
                    locations.push(IssueLocation::new(symbol.defining_artifact_id.as_str(), symbol.location));
                }
            }
            if locations.len() < 2 {
                continue;
            }
            let owners = locations
                .iter()
                .map(|l| l.artifact_id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            issues.push(Issue::new(
                IssueCategory::DuplicateDefinition,
                classify(IssueCategory::DuplicateDefinition, Resolvability::Resolvable, Ambiguity::Unique),
                name,
                format!("`{name}` is defined in several artifacts ({owners}); the first one is canonical"),
                locations,
            ));
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::extract::{extract_artifact, ExtractLimits};
    use crate::models::{Artifact, Severity};

    fn run(artifacts: &[Artifact]) -> Vec<Issue> {
        let results: Vec<_> = artifacts
            .iter()
            .map(|a| extract_artifact(a, &ExtractLimits::default()))
            .collect();
        let index = CrossArtifactIndex::build(artifacts, &results, &EngineConfig::default());
        DuplicateDefinitionValidator.validate(&index).unwrap()
    }

    #[test]
    fn test_class_defined_twice() {
        let issues = run(&[
            Artifact::new("a", "python", "class Book:\n    pass\n"),
            Artifact::new("b", "typescript", "export interface Book {\n  title: string;\n}\n"),
        ]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Info);
        assert!(!issues[0].auto_fixable);
        assert_eq!(issues[0].artifact_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_functions_and_fields_are_not_duplicates() {
        let issues = run(&[
            Artifact::new("a", "python", "def save():\n    pass\n"),
            Artifact::new("b", "python", "def save():\n    pass\n"),
        ]);
        assert!(issues.is_empty());
    }
}
