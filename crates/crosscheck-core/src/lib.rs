//! Crosscheck core library: cross-artifact consistency validation for
//! batches of independently generated source files.
//!
//! A batch flows through lexical extraction, a batch-wide symbol index with
//! name canonicalization, a static set of validators, verified auto-fixes
//! and report generation. Issues and runs can be persisted in SQLite and
//! completion notices fan out over an in-process bus.

pub mod collector;
pub mod config;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod fix;
pub mod guards;
pub mod index;
pub mod loader;
pub mod models;
pub mod notify;
pub mod report;
pub mod store;
pub mod validate;

pub use crate::collector::{BatchCollector, CollectedBatch};
pub use crate::config::EngineConfig;
pub use crate::engine::{BatchOutcome, ValidationEngine};
pub use crate::errors::{ConsistencyError, ConsistencyResult};
pub use crate::extract::{extract_artifact, ExtractLimits, ExtractionResult};
pub use crate::fix::{ArtifactWorkspace, AutoFixer};
pub use crate::index::{CrossArtifactIndex, Resolution};
pub use crate::models::{
    Artifact, CompletionNotice, Issue, IssueCategory, IssueStatus, Severity, Summary, ValidationReport,
    ValidationRun,
};
pub use crate::notify::NotificationBus;
pub use crate::report::ReportGenerator;
pub use crate::store::IssueStore;
pub use crate::validate::{Validator, ValidatorSet};
