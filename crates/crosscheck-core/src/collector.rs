//! Gathering a batch's artifacts as their generation tasks complete.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::models::Artifact;

/// Tracks the expected tasks of one `(project_id, batch_id)` and releases
/// the batch, in expected order, once every task has delivered.
#[derive(Debug)]
pub struct BatchCollector {
    project_id: String,
    batch_id: String,
    expected: Vec<String>,
    received: HashMap<String, Artifact>,
}

/// A complete batch, ready for validation.
#[derive(Clone, Debug)]
pub struct CollectedBatch {
    pub project_id: String,
    pub batch_id: String,
    pub artifacts: Vec<Artifact>,
}

impl BatchCollector {
    pub fn new<I, S>(project_id: impl Into<String>, batch_id: impl Into<String>, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = Vec::new();
        for id in expected {
            let id = id.into();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self {
            project_id: project_id.into(),
            batch_id: batch_id.into(),
            expected: ids,
            received: HashMap::new(),
        }
    }

    /// Record a finished task's artifact. A task that delivers twice
    /// replaces its earlier artifact. Returns whether the batch is now
    /// complete.
    pub fn accept(&mut self, artifact: Artifact) -> ConsistencyResult<bool> {
        if !self.expected.contains(&artifact.task_id) {
            return Err(ConsistencyError::UnknownArtifact(format!(
                "{} is not part of batch {}",
                artifact.task_id, self.batch_id
            )));
        }
        debug!("Batch {} received artifact {}", self.batch_id, artifact.task_id);
        self.received.insert(artifact.task_id.clone(), artifact);
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.expected.iter().all(|id| self.received.contains_key(id))
    }

    /// Task ids still outstanding, in expected order.
    pub fn missing(&self) -> Vec<&str> {
        self.expected
            .iter()
            .filter(|id| !self.received.contains_key(*id))
            .map(String::as_str)
            .collect()
    }

    /// Release the batch. Fails while tasks are outstanding, handing the
    /// collector back so it can keep waiting.
    pub fn into_batch(mut self) -> Result<CollectedBatch, Self> {
        if !self.is_complete() {
            return Err(self);
        }
        let artifacts = self
            .expected
            .iter()
            .filter_map(|id| self.received.remove(id))
            .collect();
        Ok(CollectedBatch {
            project_id: self.project_id,
            batch_id: self.batch_id,
            artifacts,
        })
    }
}
