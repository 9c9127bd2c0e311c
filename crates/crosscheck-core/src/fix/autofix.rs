//! Staged, verified application of rename fixes.
//!
//! Edits are anchored to the positions recorded at extraction time. Within
//! one artifact, earlier committed fixes shift later columns on the same
//! line, so every position is kept in original coordinates and adjusted on
//! use.

use std::panic::{catch_unwind, AssertUnwindSafe};

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::extract::{extract_artifact, ExtractLimits, ExtractionResult};
use crate::fix::edit::{apply_edits, AnchoredEdit};
use crate::fix::ArtifactWorkspace;
use crate::index::CrossArtifactIndex;
use crate::models::{Actor, Artifact, FixSuggestion, Issue, IssueStatus, Location};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixReport {
    pub applied: usize,
    pub failed: usize,
    /// One line per failed fix.
    pub notes: Vec<String>,
}

/// Column shifts from committed edits, as `(line, original column, delta)`.
#[derive(Clone, Debug, Default)]
struct Shifts(Vec<(u32, u32, i64)>);

impl Shifts {
    fn adjust(&self, line: u32, column: u32) -> u32 {
        let delta: i64 = self
            .0
            .iter()
            .filter(|(l, c, _)| *l == line && *c < column)
            .map(|(_, _, d)| d)
            .sum();
        (column as i64 + delta).max(1) as u32
    }
}

pub struct AutoFixer {
    limits: ExtractLimits,
}

impl AutoFixer {
    pub fn new(limits: ExtractLimits) -> Self {
        Self { limits }
    }

    /// Try every `detected`, auto-fixable issue. Issues move to `auto_fixed`
    /// when their rewrite verifies, otherwise to `fix_failed`. Artifacts are
    /// fixed in parallel; fixes within one artifact run in issue order.
    pub fn apply(
        &self,
        workspace: &ArtifactWorkspace,
        index: &CrossArtifactIndex,
        issues: &mut [Issue],
    ) -> FixReport {
        let mut outcomes: Vec<(usize, ConsistencyResult<()>)> = Vec::new();
        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (i, issue) in issues.iter().enumerate() {
            if issue.status != IssueStatus::Detected || !issue.auto_fixable {
                continue;
            }
            match fix_target(issue) {
                Ok(artifact_id) => groups.entry(artifact_id).or_default().push(i),
                Err(e) => outcomes.push((i, Err(e))),
            }
        }

        let shared: &[Issue] = issues;
        let per_artifact: Vec<Vec<(usize, ConsistencyResult<()>)>> = groups
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(artifact_id, members)| self.fix_artifact(workspace, index, &artifact_id, &members, shared))
            .collect();
        outcomes.extend(per_artifact.into_iter().flatten());
        outcomes.sort_by_key(|(i, _)| *i);

        let mut report = FixReport::default();
        for (i, outcome) in outcomes {
            let issue = &mut issues[i];
            let target = match &outcome {
                Ok(()) => IssueStatus::AutoFixed,
                Err(_) => IssueStatus::FixFailed,
            };
            if let Err(e) = issue.transition(target, Actor::Engine) {
                warn!("Failed to record fix outcome for issue {}: {}", issue.id, e);
                continue;
            }
            match outcome {
                Ok(()) => {
                    debug!("Applied fix for issue {} ({})", issue.id, issue.subject);
                    report.applied += 1;
                }
                Err(e) => {
                    debug!("Fix for issue {} failed: {}", issue.id, e);
                    report.failed += 1;
                    report.notes.push(format!("{}: {}", issue.id, e));
                }
            }
        }
        if report.applied + report.failed > 0 {
            info!("Auto-fix: {} applied, {} failed", report.applied, report.failed);
        }
        report
    }

    /// Fix the issues of one artifact under its lock.
    fn fix_artifact(
        &self,
        workspace: &ArtifactWorkspace,
        index: &CrossArtifactIndex,
        artifact_id: &str,
        members: &[usize],
        issues: &[Issue],
    ) -> Vec<(usize, ConsistencyResult<()>)> {
        let Some(slot) = workspace.slot(artifact_id) else {
            return members
                .iter()
                .map(|&i| (i, Err(ConsistencyError::UnknownArtifact(artifact_id.to_string()))))
                .collect();
        };
        let mut artifact = slot.lock();
        let mut shifts = Shifts::default();
        let mut results = Vec::with_capacity(members.len());
        for &i in members {
            let attempt = catch_unwind(AssertUnwindSafe(|| self.stage(&artifact, index, &issues[i], &shifts)));
            let result = match attempt {
                Ok(Ok((text, committed))) => {
                    // Commit: the only write to the artifact.
                    artifact.source_text = text;
                    shifts.0.extend(committed);
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    warn!("Auto-fix panicked on artifact {}; original kept", artifact_id);
                    Err(ConsistencyError::Fix("fix panicked".to_string()))
                }
            };
            results.push((i, result));
        }
        results
    }

    /// Build and verify the rewritten text for one issue without touching
    /// the artifact. Returns the staged text and the shifts it introduces.
    fn stage(
        &self,
        artifact: &Artifact,
        index: &CrossArtifactIndex,
        issue: &Issue,
        shifts: &Shifts,
    ) -> ConsistencyResult<(String, Vec<(u32, u32, i64)>)> {
        let fix = usable_fix(issue)?;
        let mut sites: Vec<Location> = fix.edits.iter().map(|e| e.location()).collect();
        sites.sort();
        sites.dedup();

        let edits: Vec<AnchoredEdit<'_>> = sites
            .iter()
            .map(|site| AnchoredEdit {
                line: site.line,
                column: shifts.adjust(site.line, site.column),
                original: &fix.original,
                replacement: &fix.replacement,
            })
            .collect();
        let staged = apply_edits(&artifact.source_text, &edits)?;

        let introduced: Vec<(u32, u32, i64)> = sites
            .iter()
            .zip(&edits)
            .map(|(site, edit)| (site.line, site.column, edit.delta()))
            .collect();
        let mut after = shifts.clone();
        after.0.extend(introduced.iter().copied());

        let rewritten = Artifact {
            source_text: staged,
            ..artifact.clone()
        };
        let result = extract_artifact(&rewritten, &self.limits);
        for site in &sites {
            let moved = Location::new(site.line, after.adjust(site.line, site.column));
            verify_site(&result, index, fix, moved)?;
        }
        Ok((rewritten.source_text, introduced))
    }

    /// Re-check `auto_fixed` issues against the current artifact text and
    /// regress the ones whose rename is no longer in place. Returns how many
    /// regressed.
    pub fn reverify(&self, workspace: &ArtifactWorkspace, index: &CrossArtifactIndex, issues: &mut [Issue]) -> usize {
        let mut extracted: IndexMap<String, Option<ExtractionResult>> = IndexMap::new();
        let mut regressed = 0;
        for issue in issues.iter_mut().filter(|i| i.status == IssueStatus::AutoFixed) {
            let holds = match (usable_fix(issue), fix_target(issue)) {
                (Ok(fix), Ok(artifact_id)) => {
                    let result = extracted.entry(artifact_id.clone()).or_insert_with(|| {
                        workspace
                            .get(&artifact_id)
                            .map(|a| extract_artifact(&a, &self.limits))
                    });
                    result
                        .as_ref()
                        .is_some_and(|r| fix.edits.iter().all(|e| line_holds(r, index, fix, e.line)))
                }
                _ => false,
            };
            if !holds {
                match issue.transition(IssueStatus::FixFailed, Actor::Engine) {
                    Ok(()) => {
                        debug!("Fix for issue {} no longer holds", issue.id);
                        regressed += 1;
                    }
                    Err(e) => warn!("Failed to regress issue {}: {}", issue.id, e),
                }
            }
        }
        regressed
    }
}

impl Default for AutoFixer {
    fn default() -> Self {
        Self::new(ExtractLimits::default())
    }
}

fn usable_fix(issue: &Issue) -> ConsistencyResult<&FixSuggestion> {
    let fix = issue
        .fix_suggestion
        .as_ref()
        .ok_or_else(|| ConsistencyError::Fix(format!("issue {} has no fix", issue.id)))?;
    if fix.edits.is_empty() || fix.original.is_empty() || fix.original == fix.replacement {
        return Err(ConsistencyError::Fix(format!("issue {} has an empty fix", issue.id)));
    }
    Ok(fix)
}

/// The single artifact a fix edits.
fn fix_target(issue: &Issue) -> ConsistencyResult<String> {
    let fix = usable_fix(issue)?;
    let first = &fix.edits[0].artifact_id;
    if fix.edits.iter().any(|e| &e.artifact_id != first) {
        return Err(ConsistencyError::Fix(format!("issue {} spans several artifacts", issue.id)));
    }
    Ok(first.clone())
}

/// The edited site must now reference the canonical name, resolving
/// exactly, and no longer reference the original.
fn verify_site(
    result: &ExtractionResult,
    index: &CrossArtifactIndex,
    fix: &FixSuggestion,
    site: Location,
) -> ConsistencyResult<()> {
    let mut found = false;
    for reference in result.references_at(site) {
        if reference.referenced_name == fix.original {
            return Err(ConsistencyError::Fix(format!("`{}` still referenced at {site}", fix.original)));
        }
        if reference.referenced_name == fix.replacement && index.resolve(&fix.replacement, reference.kind).is_exact() {
            found = true;
        }
    }
    if found {
        Ok(())
    } else {
        Err(ConsistencyError::Fix(format!(
            "no exact reference to `{}` at {site} after rewrite",
            fix.replacement
        )))
    }
}

fn line_holds(result: &ExtractionResult, index: &CrossArtifactIndex, fix: &FixSuggestion, line: u32) -> bool {
    let on_line = || result.references.iter().filter(move |r| r.location.line == line);
    on_line().any(|r| r.referenced_name == fix.replacement && index.resolve(&fix.replacement, r.kind).is_exact())
        && !on_line().any(|r| r.referenced_name == fix.original)
}
