//! Aggregation of a run's issues into a `ValidationReport`.

use std::collections::HashMap;

use chrono::Utc;
use indexmap::IndexMap;

use crate::models::{Issue, IssueCategory, IssueStatus, Severity, Summary, ValidationReport};

/// How many subjects a recommendation lists before summarizing the rest.
const MAX_SUBJECTS_PER_RECOMMENDATION: usize = 5;

/// Identity of the run a report belongs to.
#[derive(Clone, Debug)]
pub struct RunIdentity {
    pub project_id: String,
    pub batch_id: String,
    pub run_id: String,
}

pub fn summarize(issues: &[Issue]) -> Summary {
    let mut summary = Summary {
        total: issues.len(),
        ..Summary::default()
    };
    for issue in issues {
        match issue.severity {
            Severity::Critical => summary.critical += 1,
            Severity::Warning => summary.warning += 1,
            Severity::Info => summary.info += 1,
        }
        if issue.status == IssueStatus::AutoFixed {
            summary.auto_fixed += 1;
        }
    }
    summary
}

/// Deterministic order: severity, category, artifact position in the batch,
/// line, column, then subject.
pub fn sort_issues(issues: &mut [Issue], batch_order: &[String]) {
    let position: HashMap<&str, usize> = batch_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    issues.sort_by(|a, b| {
        let key = |issue: &Issue| {
            let first = issue.locations.first();
            (
                issue.severity,
                issue.category,
                first
                    .and_then(|l| position.get(l.artifact_id.as_str()).copied())
                    .unwrap_or(usize::MAX),
                first.map(|l| (l.line, l.column)),
            )
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn advice(category: IssueCategory) -> &'static str {
    match category {
        IssueCategory::NamingMismatch => "Rename misspelled references to their canonical names",
        IssueCategory::AmbiguousReference => "Pick the intended definition for ambiguous references",
        IssueCategory::MissingDefinition => "Add the missing definitions or correct the imports",
        IssueCategory::CaseStyleDrift => "Align identifier casing with the defining artifact",
        IssueCategory::ImportCycle => "Break the import cycle by moving shared types into one artifact",
        IssueCategory::DuplicateDefinition => "Consolidate definitions that several artifacts repeat",
    }
}

/// Ranked recommendations, critical first, one per severity and category
/// with open issues. Issues already fixed, dismissed or resolved need no
/// action.
pub fn recommendations(issues: &[Issue], low_confidence: &[String]) -> Vec<String> {
    let mut groups: IndexMap<(Severity, IssueCategory), Vec<&str>> = IndexMap::new();
    for issue in issues {
        if matches!(
            issue.status,
            IssueStatus::AutoFixed | IssueStatus::Dismissed | IssueStatus::Resolved
        ) {
            continue;
        }
        let subjects = groups.entry((issue.severity, issue.category)).or_default();
        if !subjects.contains(&issue.subject.as_str()) {
            subjects.push(&issue.subject);
        }
    }
    groups.sort_keys();

    let mut out: Vec<String> = groups
        .into_iter()
        .map(|((severity, category), subjects)| {
            let mut listed = subjects
                .iter()
                .take(MAX_SUBJECTS_PER_RECOMMENDATION)
                .map(|s| format!("`{s}`"))
                .collect::<Vec<_>>()
                .join(", ");
            if subjects.len() > MAX_SUBJECTS_PER_RECOMMENDATION {
                listed.push_str(&format!(" and {} more", subjects.len() - MAX_SUBJECTS_PER_RECOMMENDATION));
            }
            format!("[{}] {}: {}", severity.as_str(), advice(category), listed)
        })
        .collect();
    if !low_confidence.is_empty() {
        out.push(format!(
            "[INFO] Review partially scanned artifacts by hand: {}",
            low_confidence.join(", ")
        ));
    }
    if out.is_empty() {
        out.push("No action needed: the batch is consistent".to_string());
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn generate(
        &self,
        identity: RunIdentity,
        batch_order: &[String],
        mut issues: Vec<Issue>,
        warnings: Vec<String>,
        low_confidence: Vec<String>,
    ) -> ValidationReport {
        sort_issues(&mut issues, batch_order);
        ValidationReport {
            project_id: identity.project_id,
            batch_id: identity.batch_id,
            run_id: identity.run_id,
            summary: summarize(&issues),
            recommendations: recommendations(&issues, &low_confidence),
            issues,
            warnings,
            low_confidence_artifacts: low_confidence,
            created_at: Utc::now(),
        }
    }
}
