//! Batch validation orchestration: extract, index, validate, fix, report,
//! persist, notify.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::collector::CollectedBatch;
use crate::config::EngineConfig;
use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::extract::pipeline::{default_workers, parallel_extract};
use crate::extract::ExtractLimits;
use crate::fix::{ArtifactWorkspace, AutoFixer};
use crate::index::CrossArtifactIndex;
use crate::models::{
    short_digest, Actor, Artifact, CompletionNotice, Issue, IssueStatus, ValidationReport, ValidationRun,
};
use crate::notify::{NoticeSink, NotificationBus};
use crate::report::{ReportGenerator, RunIdentity};
use crate::store::IssueStore;
use crate::validate::ValidatorSet;

type BatchKey = (String, String);

/// Result of one validation pass: the report plus the artifacts as they
/// stand after any committed fixes.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub report: ValidationReport,
    pub artifacts: Vec<Artifact>,
}

/// A pass other callers for the same batch can wait on.
#[derive(Default)]
struct InFlight {
    result: Mutex<Option<Arc<BatchOutcome>>>,
    ready: Condvar,
}

impl InFlight {
    fn wait(&self) -> Arc<BatchOutcome> {
        let mut slot = self.result.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Arc::clone(outcome);
            }
            self.ready.wait(&mut slot);
        }
    }

    fn finish(&self, outcome: Arc<BatchOutcome>) {
        *self.result.lock() = Some(outcome);
        self.ready.notify_all();
    }
}

pub struct ValidationEngine {
    config: EngineConfig,
    limits: ExtractLimits,
    workers: usize,
    validators: ValidatorSet,
    fixer: AutoFixer,
    reports: ReportGenerator,
    store: Option<IssueStore>,
    bus: Arc<NotificationBus>,
    in_flight: Mutex<HashMap<BatchKey, Arc<InFlight>>>,
    latest: Mutex<IndexMap<BatchKey, Arc<BatchOutcome>>>,
    runs: AtomicU64,
}

impl ValidationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.clamped();
        let limits = ExtractLimits::from(&config);
        Self {
            limits,
            workers: default_workers(),
            validators: ValidatorSet::standard(),
            fixer: AutoFixer::new(limits),
            reports: ReportGenerator,
            store: None,
            bus: Arc::new(NotificationBus::default()),
            in_flight: Mutex::new(HashMap::new()),
            latest: Mutex::new(IndexMap::new()),
            runs: AtomicU64::new(0),
            config,
        }
    }

    pub fn with_store(mut self, store: IssueStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&IssueStore> {
        self.store.as_ref()
    }

    pub fn notifications(&self) -> Arc<NotificationBus> {
        Arc::clone(&self.bus)
    }

    /// Validate a batch. Never fails: problems along the way end up as
    /// report warnings. A second call for a batch that is already being
    /// validated waits for that pass and returns its outcome.
    pub fn validate_batch(&self, project_id: &str, batch_id: &str, artifacts: Vec<Artifact>) -> Arc<BatchOutcome> {
        let key: BatchKey = (project_id.to_string(), batch_id.to_string());
        let (flight, owner) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let flight = Arc::new(InFlight::default());
                    in_flight.insert(key.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };
        if !owner {
            info!("Batch {}/{} already validating; waiting for it", project_id, batch_id);
            return flight.wait();
        }

        let outcome = match catch_unwind(AssertUnwindSafe(|| self.run_pass(project_id, batch_id, artifacts.clone()))) {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Validation pass for {}/{} panicked", project_id, batch_id);
                self.failed_outcome(project_id, batch_id, artifacts)
            }
        };
        let outcome = Arc::new(outcome);
        self.latest.lock().insert(key.clone(), Arc::clone(&outcome));
        flight.finish(Arc::clone(&outcome));
        self.in_flight.lock().remove(&key);
        outcome
    }

    pub fn validate_collected(&self, batch: CollectedBatch) -> Arc<BatchOutcome> {
        self.validate_batch(&batch.project_id, &batch.batch_id, batch.artifacts)
    }

    /// Latest outcome of a batch validated by this engine.
    pub fn latest_outcome(&self, project_id: &str, batch_id: &str) -> Option<Arc<BatchOutcome>> {
        self.latest
            .lock()
            .get(&(project_id.to_string(), batch_id.to_string()))
            .cloned()
    }

    /// Latest reports of every batch of a project, in first-validated order.
    pub fn project_reports(&self, project_id: &str) -> Vec<ValidationReport> {
        self.latest
            .lock()
            .iter()
            .filter(|((project, _), _)| project == project_id)
            .map(|(_, outcome)| outcome.report.clone())
            .collect()
    }

    /// External dismiss or resolve of a persisted issue.
    pub fn set_issue_status(&self, project_id: &str, issue_id: &str, status: IssueStatus) -> ConsistencyResult<Issue> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ConsistencyError::Config("no issue store configured".to_string()))?;
        store.set_status(project_id, issue_id, status)
    }

    /// Re-check the persisted `auto_fixed` issues of a batch against the
    /// given artifact text. Regressed issues are stored as `fix_failed`.
    pub fn reverify(&self, project_id: &str, batch_id: &str, artifacts: Vec<Artifact>) -> ConsistencyResult<usize> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ConsistencyError::Config("no issue store configured".to_string()))?;
        let mut fixed: Vec<Issue> = store
            .load_issues(project_id, Some(batch_id))?
            .into_iter()
            .filter(|i| i.status == IssueStatus::AutoFixed)
            .collect();
        if fixed.is_empty() {
            return Ok(0);
        }
        let workspace = ArtifactWorkspace::new(artifacts);
        let batch = workspace.snapshot();
        let results = parallel_extract(&batch, &self.limits, self.workers);
        let index = CrossArtifactIndex::build(&batch, &results, &self.config);
        let regressed = self.fixer.reverify(&workspace, &index, &mut fixed);
        if regressed > 0 {
            let changed: Vec<Issue> = fixed
                .into_iter()
                .filter(|i| i.status == IssueStatus::FixFailed)
                .collect();
            store.upsert_issues(project_id, batch_id, &changed)?;
            info!("{} auto-fixed issues in {}/{} regressed", regressed, project_id, batch_id);
        }
        Ok(regressed)
    }

    fn next_run_id(&self, project_id: &str, batch_id: &str) -> String {
        let n = self.runs.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        short_digest(&[project_id, batch_id, &stamp.to_string(), &n.to_string()])
    }

    fn run_pass(&self, project_id: &str, batch_id: &str, artifacts: Vec<Artifact>) -> BatchOutcome {
        let started = Instant::now();
        let workspace = ArtifactWorkspace::new(artifacts);
        let batch = workspace.snapshot();
        let batch_order: Vec<String> = batch.iter().map(|a| a.task_id.clone()).collect();

        let results = parallel_extract(&batch, &self.limits, self.workers);
        let index = CrossArtifactIndex::build(&batch, &results, &self.config);

        let outcome = self.validators.run(&index);
        let mut warnings = outcome.warnings;
        let mut issues = outcome.issues;

        if let Some(store) = &self.store {
            if let Err(e) = carry_over_statuses(store, project_id, batch_id, &mut issues) {
                warn!("Failed to load stored issue statuses: {}", e);
                warnings.push(format!("issue store unavailable: {e}"));
            }
        }

        if self.config.auto_fix {
            self.fixer.apply(&workspace, &index, &mut issues);
        }

        let identity = RunIdentity {
            project_id: project_id.to_string(),
            batch_id: batch_id.to_string(),
            run_id: self.next_run_id(project_id, batch_id),
        };
        let mut report = self.reports.generate(
            identity,
            &batch_order,
            issues,
            warnings,
            index.low_confidence().to_vec(),
        );

        if let Some(store) = &self.store {
            let run = ValidationRun::from_report(&report, batch_order.clone());
            let persisted = store
                .upsert_issues(project_id, batch_id, &report.issues)
                .and_then(|_| store.record_run(&run));
            if let Err(e) = persisted {
                warn!("Failed to persist run {}: {}", report.run_id, e);
                report.warnings.push(format!("persistence failed: {e}"));
            }
        }

        self.bus.publish(CompletionNotice::from_report(&report));
        info!(
            "Validated {}/{}: {} issues ({} critical, {} warning, {} info, {} auto-fixed) in {}ms",
            project_id,
            batch_id,
            report.summary.total,
            report.summary.critical,
            report.summary.warning,
            report.summary.info,
            report.summary.auto_fixed,
            started.elapsed().as_millis()
        );

        BatchOutcome {
            report,
            artifacts: workspace.snapshot(),
        }
    }

    fn failed_outcome(&self, project_id: &str, batch_id: &str, artifacts: Vec<Artifact>) -> BatchOutcome {
        let identity = RunIdentity {
            project_id: project_id.to_string(),
            batch_id: batch_id.to_string(),
            run_id: self.next_run_id(project_id, batch_id),
        };
        let order: Vec<String> = artifacts.iter().map(|a| a.task_id.clone()).collect();
        let report = self.reports.generate(
            identity,
            &order,
            Vec::new(),
            vec!["validation pass failed; no issues collected".to_string()],
            Vec::new(),
        );
        self.bus.publish(CompletionNotice::from_report(&report));
        BatchOutcome { report, artifacts }
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Issues a user already dismissed or resolved keep that status, which
/// also keeps them away from the auto-fixer.
fn carry_over_statuses(
    store: &IssueStore,
    project_id: &str,
    batch_id: &str,
    issues: &mut [Issue],
) -> ConsistencyResult<()> {
    let stored: HashMap<String, IssueStatus> = store
        .load_issues(project_id, Some(batch_id))?
        .into_iter()
        .filter(|i| i.status.is_terminal())
        .map(|i| (i.id, i.status))
        .collect();
    for issue in issues.iter_mut() {
        if let Some(&status) = stored.get(&issue.id) {
            issue.transition(status, Actor::External)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use crate::validate::Validator;

    fn typo_batch() -> Vec<Artifact> {
        vec![
            Artifact::new("a", "python", "class Book:\n    title: str\n"),
            Artifact::new("b", "python", "from a import Books\n\nx = Books()\n"),
        ]
    }

    #[test]
    fn test_pass_fixes_and_reports() {
        let engine = ValidationEngine::default();
        let mut notices = engine.notifications().subscribe();
        let outcome = engine.validate_batch("p", "b1", typo_batch());
        assert_eq!(outcome.report.summary.total, 1);
        assert_eq!(outcome.report.summary.auto_fixed, 1);
        assert_eq!(outcome.artifacts[1].source_text, "from a import Book\n\nx = Book()\n");
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.run_id, outcome.report.run_id);
        assert_eq!(notice.auto_fixed, 1);
        assert!(engine.latest_outcome("p", "b1").is_some());
        assert_eq!(engine.project_reports("p").len(), 1);
    }

    #[test]
    fn test_auto_fix_can_be_disabled() {
        let config = EngineConfig {
            auto_fix: false,
            ..EngineConfig::default()
        };
        let engine = ValidationEngine::new(config);
        let outcome = engine.validate_batch("p", "b1", typo_batch());
        assert_eq!(outcome.report.summary.auto_fixed, 0);
        assert_eq!(outcome.report.issues[0].status, IssueStatus::Detected);
        assert_eq!(outcome.artifacts, typo_batch());
    }

    /// Counts passes and holds each one open long enough for other
    /// triggers to arrive while it runs.
    struct SlowCounter(Arc<AtomicUsize>);

    impl Validator for SlowCounter {
        fn name(&self) -> &'static str {
            "slow_counter"
        }

        fn validate(&self, _index: &CrossArtifactIndex) -> ConsistencyResult<Vec<Issue>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_concurrent_triggers_share_one_pass() {
        let passes = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(
            ValidationEngine::default()
                .with_validators(ValidatorSet::standard().with(SlowCounter(Arc::clone(&passes)))),
        );
        let start = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    engine.validate_batch("p", "b1", typo_batch())
                })
            })
            .collect();
        let outcomes: Vec<Arc<BatchOutcome>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(passes.load(Ordering::SeqCst), 1);
        let run_ids: HashSet<&str> = outcomes.iter().map(|o| o.report.run_id.as_str()).collect();
        assert_eq!(run_ids.len(), 1);
        for outcome in &outcomes {
            assert_eq!(outcome.report.summary.total, 1);
        }
        assert!(engine.in_flight.lock().is_empty());

        // Once the pass is over, a new trigger runs again.
        engine.validate_batch("p", "b1", typo_batch());
        assert_eq!(passes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dismissed_issue_not_fixed_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = IssueStore::new(dir.path().join("issues.db")).unwrap();
        store.init_schema().unwrap();
        let config = EngineConfig {
            auto_fix: false,
            ..EngineConfig::default()
        };
        let engine = ValidationEngine::new(config).with_store(store.clone());
        let first = engine.validate_batch("p", "b1", typo_batch());
        let issue_id = first.report.issues[0].id.clone();
        engine.set_issue_status("p", &issue_id, IssueStatus::Dismissed).unwrap();

        let engine = ValidationEngine::new(EngineConfig::default()).with_store(store.clone());
        let second = engine.validate_batch("p", "b1", typo_batch());
        assert_eq!(second.report.issues[0].status, IssueStatus::Dismissed);
        assert_eq!(second.artifacts, typo_batch());
        assert_eq!(store.runs_for_batch("p", "b1").unwrap().len(), 2);
    }

    #[test]
    fn test_reverify_regresses_persisted_fix() {
        let dir = tempfile::tempdir().unwrap();
        let store = IssueStore::new(dir.path().join("issues.db")).unwrap();
        store.init_schema().unwrap();
        let engine = ValidationEngine::default().with_store(store.clone());
        let outcome = engine.validate_batch("p", "b1", typo_batch());
        assert_eq!(outcome.report.summary.auto_fixed, 1);

        assert_eq!(engine.reverify("p", "b1", outcome.artifacts.clone()).unwrap(), 0);
        assert_eq!(engine.reverify("p", "b1", typo_batch()).unwrap(), 1);
        let stored = store.load_issues("p", Some("b1")).unwrap();
        assert_eq!(stored[0].status, IssueStatus::FixFailed);
    }

    #[test]
    fn test_persistence_failure_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        // Never initialised: every query fails.
        let store = IssueStore::new(dir.path().join("issues.db")).unwrap();
        let engine = ValidationEngine::default().with_store(store);
        let outcome = engine.validate_batch("p", "b1", typo_batch());
        assert_eq!(outcome.report.summary.total, 1);
        assert!(outcome.report.warnings.iter().any(|w| w.starts_with("persistence failed")));
    }
}
