//! SQLite issue store.
//!
//! Every public method opens its own connection so callers never manage
//! connection lifetime.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::models::{
    Actor, FixSuggestion, Issue, IssueCategory, IssueLocation, IssueStatus, Severity, Summary,
    ValidationRun,
};
use crate::store::schema;

// ---------------------------------------------------------------------------
// Helper: tilde expansion
// ---------------------------------------------------------------------------

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const ISSUE_COLUMNS: &str = "id, category, severity, status, subject, message, artifact_ids_json, \
                             locations_json, auto_fixable, fix_json, fix_applied";

/// Raw `issues` row; JSON and enum columns are decoded afterwards so decode
/// failures surface as `ConsistencyError` rather than rusqlite errors.
struct IssueRow {
    id: String,
    category: String,
    severity: String,
    status: String,
    subject: String,
    message: String,
    artifact_ids_json: String,
    locations_json: String,
    auto_fixable: bool,
    fix_json: Option<String>,
    fix_applied: bool,
}

impl IssueRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category: row.get(1)?,
            severity: row.get(2)?,
            status: row.get(3)?,
            subject: row.get(4)?,
            message: row.get(5)?,
            artifact_ids_json: row.get(6)?,
            locations_json: row.get(7)?,
            auto_fixable: row.get(8)?,
            fix_json: row.get(9)?,
            fix_applied: row.get(10)?,
        })
    }

    fn into_issue(self) -> ConsistencyResult<Issue> {
        let bad = |what: &str, value: &str| {
            ConsistencyError::Storage(format!("issue {} has unknown {what} '{value}'", self.id))
        };
        let category = IssueCategory::parse(&self.category).ok_or_else(|| bad("category", &self.category))?;
        let severity = Severity::parse(&self.severity).ok_or_else(|| bad("severity", &self.severity))?;
        let status = IssueStatus::parse(&self.status).ok_or_else(|| bad("status", &self.status))?;
        let artifact_ids: Vec<String> = serde_json::from_str(&self.artifact_ids_json)?;
        let locations: Vec<IssueLocation> = serde_json::from_str(&self.locations_json)?;
        let fix_suggestion: Option<FixSuggestion> = match &self.fix_json {
            Some(json) => Some(serde_json::from_str(json)?),
            None => None,
        };
        Ok(Issue {
            id: self.id,
            severity,
            category,
            subject: self.subject,
            message: self.message,
            artifact_ids,
            locations,
            auto_fixable: self.auto_fixable,
            fix_suggestion,
            fix_applied: self.fix_applied,
            status,
        })
    }
}

struct RunRow {
    run_id: String,
    project_id: String,
    batch_id: String,
    artifact_ids_json: String,
    issue_ids_json: String,
    summary_json: String,
    created_at: String,
}

const RUN_COLUMNS: &str = "run_id, project_id, batch_id, artifact_ids_json, issue_ids_json, summary_json, created_at";

impl RunRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            project_id: row.get(1)?,
            batch_id: row.get(2)?,
            artifact_ids_json: row.get(3)?,
            issue_ids_json: row.get(4)?,
            summary_json: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_run(self) -> ConsistencyResult<ValidationRun> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| ConsistencyError::Storage(format!("run {} has bad timestamp: {e}", self.run_id)))?
            .with_timezone(&Utc);
        let summary: Summary = serde_json::from_str(&self.summary_json)?;
        Ok(ValidationRun {
            run_id: self.run_id,
            project_id: self.project_id,
            batch_id: self.batch_id,
            artifact_ids: serde_json::from_str(&self.artifact_ids_json)?,
            issue_ids: serde_json::from_str(&self.issue_ids_json)?,
            summary,
            created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// IssueStore
// ---------------------------------------------------------------------------

/// Durable issue records and the append-only run history.
#[derive(Clone, Debug)]
pub struct IssueStore {
    db_path: PathBuf,
}

impl IssueStore {
    /// The path is tilde-expanded and made absolute; parent directories are
    /// created if missing.
    pub fn new(db_path: impl AsRef<Path>) -> ConsistencyResult<Self> {
        let expanded = expand_tilde(&db_path.as_ref().to_string_lossy());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { db_path: resolved })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> ConsistencyResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Create the baseline tables, then run pending migrations.
    pub fn init_schema(&self) -> ConsistencyResult<()> {
        let mut conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&mut conn)?;
        Ok(())
    }

    pub fn schema_version(&self) -> ConsistencyResult<i32> {
        let conn = self.connect()?;
        schema::get_schema_version(&conn)
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    /// Insert or refresh issue records. A stored `dismissed` or `resolved`
    /// status wins over the incoming one.
    pub fn upsert_issues(&self, project_id: &str, batch_id: &str, issues: &[Issue]) -> ConsistencyResult<usize> {
        if issues.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO issues (project_id, id, batch_id, category, severity, status, subject, \
                     message, artifact_ids_json, locations_json, auto_fixable, fix_json, fix_applied) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                 ON CONFLICT(project_id, id) DO UPDATE SET \
                     batch_id = excluded.batch_id, \
                     severity = excluded.severity, \
                     subject = excluded.subject, \
                     message = excluded.message, \
                     artifact_ids_json = excluded.artifact_ids_json, \
                     locations_json = excluded.locations_json, \
                     auto_fixable = excluded.auto_fixable, \
                     fix_json = excluded.fix_json, \
                     status = CASE WHEN issues.status IN ('dismissed', 'resolved') \
                                   THEN issues.status ELSE excluded.status END, \
                     fix_applied = CASE WHEN issues.status IN ('dismissed', 'resolved') \
                                   THEN issues.fix_applied ELSE excluded.fix_applied END, \
                     updated_at = CURRENT_TIMESTAMP;",
            )?;
            for issue in issues {
                let fix_json = issue
                    .fix_suggestion
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    project_id,
                    issue.id,
                    batch_id,
                    issue.category.as_str(),
                    issue.severity.as_str(),
                    issue.status.as_str(),
                    issue.subject,
                    issue.message,
                    serde_json::to_string(&issue.artifact_ids)?,
                    serde_json::to_string(&issue.locations)?,
                    issue.auto_fixable,
                    fix_json,
                    issue.fix_applied,
                ])?;
            }
        }
        tx.commit()?;
        Ok(issues.len())
    }

    /// Issues of a project, optionally limited to one batch, in id order.
    pub fn load_issues(&self, project_id: &str, batch_id: Option<&str>) -> ConsistencyResult<Vec<Issue>> {
        let conn = self.connect()?;
        let rows: Vec<IssueRow> = match batch_id {
            Some(batch_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ISSUE_COLUMNS} FROM issues WHERE project_id = ?1 AND batch_id = ?2 ORDER BY id;"
                ))?;
                let mapped = stmt.query_map(params![project_id, batch_id], IssueRow::read)?;
                mapped.collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ISSUE_COLUMNS} FROM issues WHERE project_id = ?1 ORDER BY id;"
                ))?;
                let mapped = stmt.query_map(params![project_id], IssueRow::read)?;
                mapped.collect::<rusqlite::Result<_>>()?
            }
        };
        rows.into_iter().map(IssueRow::into_issue).collect()
    }

    pub fn load_issue(&self, project_id: &str, issue_id: &str) -> ConsistencyResult<Option<Issue>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE project_id = ?1 AND id = ?2;"),
                params![project_id, issue_id],
                IssueRow::read,
            )
            .optional()?;
        row.map(IssueRow::into_issue).transpose()
    }

    /// External status change (dismiss or resolve). Fails on an unknown
    /// issue or a transition the state machine forbids.
    pub fn set_status(&self, project_id: &str, issue_id: &str, status: IssueStatus) -> ConsistencyResult<Issue> {
        let mut issue = self
            .load_issue(project_id, issue_id)?
            .ok_or_else(|| ConsistencyError::Storage(format!("unknown issue {issue_id} in project {project_id}")))?;
        issue.transition(status, Actor::External)?;
        let conn = self.connect()?;
        conn.execute(
            "UPDATE issues SET status = ?1, updated_at = CURRENT_TIMESTAMP \
             WHERE project_id = ?2 AND id = ?3;",
            params![issue.status.as_str(), project_id, issue_id],
        )?;
        Ok(issue)
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Append a run. Run records are never updated.
    pub fn record_run(&self, run: &ValidationRun) -> ConsistencyResult<()> {
        let conn = self.connect()?;
        conn.execute(
            &format!("INSERT INTO validation_runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);"),
            params![
                run.run_id,
                run.project_id,
                run.batch_id,
                serde_json::to_string(&run.artifact_ids)?,
                serde_json::to_string(&run.issue_ids)?,
                serde_json::to_string(&run.summary)?,
                run.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    /// Runs of a batch, oldest first.
    pub fn runs_for_batch(&self, project_id: &str, batch_id: &str) -> ConsistencyResult<Vec<ValidationRun>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM validation_runs \
             WHERE project_id = ?1 AND batch_id = ?2 ORDER BY created_at, rowid;"
        ))?;
        let rows: Vec<RunRow> = stmt
            .query_map(params![project_id, batch_id], RunRow::read)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(RunRow::into_run).collect()
    }

    pub fn latest_run(&self, project_id: &str, batch_id: &str) -> ConsistencyResult<Option<ValidationRun>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM validation_runs \
                     WHERE project_id = ?1 AND batch_id = ?2 ORDER BY created_at DESC, rowid DESC LIMIT 1;"
                ),
                params![project_id, batch_id],
                RunRow::read,
            )
            .optional()?;
        row.map(RunRow::into_run).transpose()
    }

    /// Explicit bulk delete of a project's issues and runs. Returns the
    /// number of issues removed.
    pub fn clear_project(&self, project_id: &str) -> ConsistencyResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM issues WHERE project_id = ?1;", params![project_id])?;
        tx.execute("DELETE FROM validation_runs WHERE project_id = ?1;", params![project_id])?;
        tx.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, IssueStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IssueStore::new(dir.path().join("nested").join("issues.db")).unwrap();
        store.init_schema().unwrap();
        (dir, store)
    }

    fn typo_issue() -> Issue {
        Issue::new(
            IssueCategory::NamingMismatch,
            Severity::Critical,
            "Books",
            "typo",
            vec![IssueLocation::new("b", Location::new(1, 20))],
        )
        .with_fix(FixSuggestion {
            description: "Rename `Books` to `Book`".into(),
            original: "Books".into(),
            replacement: "Book".into(),
            edits: vec![IssueLocation::new("b", Location::new(1, 20))],
        })
    }

    fn run(run_id: &str, offset_secs: i64) -> ValidationRun {
        ValidationRun {
            run_id: run_id.into(),
            project_id: "p".into(),
            batch_id: "b1".into(),
            artifact_ids: vec!["a".into(), "b".into()],
            issue_ids: vec!["x".into()],
            summary: Summary {
                total: 1,
                critical: 1,
                ..Summary::default()
            },
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_init_schema_creates_parent_and_migrates() {
        let (_dir, store) = store();
        assert!(store.db_path().exists());
        assert_eq!(store.schema_version().unwrap(), schema::SCHEMA_VERSION);
        store.init_schema().unwrap();
    }

    #[test]
    fn test_issue_round_trip() {
        let (_dir, store) = store();
        let issue = typo_issue();
        assert_eq!(store.upsert_issues("p", "b1", &[issue.clone()]).unwrap(), 1);
        assert_eq!(store.load_issue("p", &issue.id).unwrap(), Some(issue.clone()));
        assert_eq!(store.load_issues("p", Some("b1")).unwrap(), vec![issue.clone()]);
        assert!(store.load_issues("p", Some("other")).unwrap().is_empty());
        assert!(store.load_issue("q", &issue.id).unwrap().is_none());
    }

    #[test]
    fn test_dismissed_survives_redetection() {
        let (_dir, store) = store();
        let issue = typo_issue();
        store.upsert_issues("p", "b1", &[issue.clone()]).unwrap();
        let dismissed = store.set_status("p", &issue.id, IssueStatus::Dismissed).unwrap();
        assert_eq!(dismissed.status, IssueStatus::Dismissed);

        store.upsert_issues("p", "b1", &[issue.clone()]).unwrap();
        let loaded = store.load_issue("p", &issue.id).unwrap().unwrap();
        assert_eq!(loaded.status, IssueStatus::Dismissed);
    }

    #[test]
    fn test_set_status_rejects_bad_transitions() {
        let (_dir, store) = store();
        let issue = typo_issue();
        store.upsert_issues("p", "b1", &[issue.clone()]).unwrap();
        store.set_status("p", &issue.id, IssueStatus::Resolved).unwrap();
        assert!(matches!(
            store.set_status("p", &issue.id, IssueStatus::Dismissed),
            Err(ConsistencyError::InvalidTransition { .. })
        ));
        assert!(store.set_status("p", &issue.id, IssueStatus::AutoFixed).is_err());
        assert!(store.set_status("p", "missing", IssueStatus::Dismissed).is_err());
    }

    #[test]
    fn test_runs_are_append_only() {
        let (_dir, store) = store();
        store.record_run(&run("r1", 0)).unwrap();
        store.record_run(&run("r2", 1)).unwrap();
        assert!(store.record_run(&run("r1", 2)).is_err());

        let runs = store.runs_for_batch("p", "b1").unwrap();
        assert_eq!(runs.iter().map(|r| r.run_id.as_str()).collect::<Vec<_>>(), vec!["r1", "r2"]);
        assert_eq!(store.latest_run("p", "b1").unwrap().unwrap().run_id, "r2");
        assert!(store.latest_run("p", "none").unwrap().is_none());
    }

    #[test]
    fn test_clear_project() {
        let (_dir, store) = store();
        store.upsert_issues("p", "b1", &[typo_issue()]).unwrap();
        store.upsert_issues("other", "b1", &[typo_issue()]).unwrap();
        store.record_run(&run("r1", 0)).unwrap();
        assert_eq!(store.clear_project("p").unwrap(), 1);
        assert!(store.load_issues("p", None).unwrap().is_empty());
        assert!(store.runs_for_batch("p", "b1").unwrap().is_empty());
        assert_eq!(store.load_issues("other", None).unwrap().len(), 1);
    }
}
