//! End-to-end batches through the public engine API.

use crosscheck_core::{
    Artifact, BatchCollector, EngineConfig, IssueCategory, IssueStatus, IssueStore, Severity,
    ValidationEngine,
};

fn manual() -> ValidationEngine {
    ValidationEngine::new(EngineConfig {
        auto_fix: false,
        ..EngineConfig::default()
    })
}

fn bookstore() -> Vec<Artifact> {
    vec![
        Artifact::new(
            "models",
            "python",
            "class Book:\n    title: str\n    created_at: str\n\nclass Shelf:\n    pass\n",
        ),
        Artifact::new(
            "routes",
            "python",
            "from models import Books, Author\n\ndef list_books() -> list[Books]:\n    return [Books()]\n",
        ),
        Artifact::new(
            "client",
            "typescript",
            "export function stamp(book: any) {\n  return book.createdAt;\n}\n",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[test]
fn test_summary_counts_match_issue_list() {
    let outcome = manual().validate_batch("shop", "b1", bookstore());
    let report = &outcome.report;
    assert_eq!(report.summary.total, report.issues.len());
    assert_eq!(
        report.summary.critical + report.summary.warning + report.summary.info,
        report.summary.total
    );
}

#[test]
fn test_repeated_runs_report_identical_issues() {
    let engine = manual();
    let first = engine.validate_batch("shop", "b1", bookstore());
    let second = engine.validate_batch("shop", "b2", bookstore());
    let ids = |r: &crosscheck_core::ValidationReport| -> Vec<(String, String)> {
        r.issues.iter().map(|i| (i.id.clone(), i.message.clone())).collect()
    };
    assert_eq!(ids(&first.report), ids(&second.report));
    assert_ne!(first.report.run_id, second.report.run_id);
}

#[test]
fn test_bookstore_issue_mix() {
    let outcome = manual().validate_batch("shop", "b1", bookstore());
    let issues = &outcome.report.issues;

    let typo = issues
        .iter()
        .find(|i| i.category == IssueCategory::NamingMismatch)
        .expect("typo issue");
    assert_eq!(typo.severity, Severity::Critical);
    assert_eq!(typo.subject, "Books");
    assert!(typo.auto_fixable);

    let missing = issues
        .iter()
        .find(|i| i.category == IssueCategory::MissingDefinition)
        .expect("missing definition");
    assert_eq!(missing.severity, Severity::Critical);
    assert_eq!(missing.subject, "Author");
    assert!(!missing.auto_fixable);

    let drift = issues
        .iter()
        .find(|i| i.category == IssueCategory::CaseStyleDrift)
        .expect("case drift");
    assert_eq!(drift.severity, Severity::Warning);
    assert_eq!(drift.subject, "createdAt");

    assert_eq!(issues.len(), 3, "{issues:#?}");
    // Critical issues lead the report.
    assert_eq!(issues[0].severity, Severity::Critical);
    assert_eq!(issues[2].severity, Severity::Warning);
}

#[test]
fn test_ambiguous_reference_has_no_fix() {
    let outcome = ValidationEngine::default().validate_batch(
        "shop",
        "b1",
        vec![
            Artifact::new("a", "python", "class Card:\n    pass\n"),
            Artifact::new("b", "python", "class Cart:\n    pass\n"),
            Artifact::new("c", "python", "x = Carx()\n"),
        ],
    );
    let issues = &outcome.report.issues;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].category, IssueCategory::AmbiguousReference);
    assert_eq!(issues[0].severity, Severity::Critical);
    assert!(issues[0].fix_suggestion.is_none());
    assert_eq!(issues[0].status, IssueStatus::Detected);
    assert_eq!(outcome.artifacts[2].source_text, "x = Carx()\n");
}

#[test]
fn test_import_cycle_reported_once() {
    let outcome = manual().validate_batch(
        "shop",
        "b1",
        vec![
            Artifact::new("a", "python", "from b import Beta\n\nclass Alpha:\n    pass\n"),
            Artifact::new("b", "python", "from c import Gamma\n\nclass Beta:\n    pass\n"),
            Artifact::new("c", "python", "from a import Alpha\n\nclass Gamma:\n    pass\n"),
        ],
    );
    let cycles: Vec<_> = outcome
        .report
        .issues
        .iter()
        .filter(|i| i.category == IssueCategory::ImportCycle)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].severity, Severity::Warning);
    assert_eq!(cycles[0].artifact_ids, vec!["a", "b", "c"]);
}

#[test]
fn test_empty_batch_is_clean() {
    let outcome = ValidationEngine::default().validate_batch("shop", "empty", Vec::new());
    assert_eq!(outcome.report.summary.total, 0);
    assert!(outcome.report.recommendations[0].starts_with("No action needed"));
}

// ---------------------------------------------------------------------------
// Fixing
// ---------------------------------------------------------------------------

#[test]
fn test_fixed_batch_revalidates_without_naming_issues() {
    let engine = ValidationEngine::default();
    let outcome = engine.validate_batch("shop", "b1", bookstore());
    let typo = outcome
        .report
        .issues
        .iter()
        .find(|i| i.subject == "Books")
        .unwrap();
    assert_eq!(typo.status, IssueStatus::AutoFixed);
    assert!(typo.fix_applied);
    assert!(outcome.artifacts[1].source_text.contains("list[Book]"));
    assert!(!outcome.artifacts[1].source_text.contains("Books"));

    let again = engine.validate_batch("shop", "b1-recheck", outcome.artifacts.clone());
    assert!(again.report.issues.iter().all(|i| !matches!(
        i.category,
        IssueCategory::NamingMismatch | IssueCategory::CaseStyleDrift
    )));
    // Unfixable problems survive the fix.
    assert!(again
        .report
        .issues
        .iter()
        .any(|i| i.category == IssueCategory::MissingDefinition));
}

// ---------------------------------------------------------------------------
// Persistence and collection
// ---------------------------------------------------------------------------

#[test]
fn test_store_round_trip_keeps_dismissal() {
    let dir = tempfile::tempdir().unwrap();
    let store = IssueStore::new(dir.path().join("issues.db")).unwrap();
    store.init_schema().unwrap();

    let engine = ValidationEngine::new(EngineConfig {
        auto_fix: false,
        ..EngineConfig::default()
    })
    .with_store(store.clone());
    let outcome = engine.validate_batch("shop", "b1", bookstore());
    let stored = store.load_issues("shop", Some("b1")).unwrap();
    assert_eq!(stored.len(), outcome.report.issues.len());

    let drift_id = outcome
        .report
        .issues
        .iter()
        .find(|i| i.category == IssueCategory::CaseStyleDrift)
        .map(|i| i.id.clone())
        .unwrap();
    engine
        .set_issue_status("shop", &drift_id, IssueStatus::Dismissed)
        .unwrap();

    let rerun = engine.validate_batch("shop", "b1", bookstore());
    let drift = rerun.report.issues.iter().find(|i| i.id == drift_id).unwrap();
    assert_eq!(drift.status, IssueStatus::Dismissed);

    let runs = store.runs_for_batch("shop", "b1").unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(store.latest_run("shop", "b1").unwrap().unwrap().run_id, rerun.report.run_id);
}

#[test]
fn test_collected_batch_validates_in_task_order() {
    let mut collector = BatchCollector::new("shop", "b1", ["models", "routes", "client"]);
    let mut artifacts = bookstore();
    artifacts.reverse();
    for artifact in artifacts {
        collector.accept(artifact).unwrap();
    }
    let batch = collector.into_batch().unwrap();
    let engine = manual();
    let outcome = engine.validate_collected(batch);
    let ids: Vec<&str> = outcome.artifacts.iter().map(|a| a.task_id.as_str()).collect();
    assert_eq!(ids, vec!["models", "routes", "client"]);
    assert_eq!(outcome.report.summary.total, 3);
}
