//! Verified auto-fixes and the locked artifact workspace they write to.

pub mod autofix;
pub mod edit;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::models::Artifact;

pub use self::autofix::{AutoFixer, FixReport};

/// The artifacts of one batch, each behind its own lock so a fix to one
/// artifact never blocks readers of another.
#[derive(Debug, Default)]
pub struct ArtifactWorkspace {
    slots: IndexMap<String, Mutex<Artifact>>,
}

impl ArtifactWorkspace {
    /// A resubmitted task id replaces the earlier artifact but keeps its
    /// position in the batch.
    pub fn new(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        let mut slots = IndexMap::new();
        for artifact in artifacts {
            slots.insert(artifact.task_id.clone(), Mutex::new(artifact));
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn get(&self, artifact_id: &str) -> Option<Artifact> {
        self.slots.get(artifact_id).map(|slot| slot.lock().clone())
    }

    /// Current artifacts in batch order.
    pub fn snapshot(&self) -> Vec<Artifact> {
        self.slots.values().map(|slot| slot.lock().clone()).collect()
    }

    pub(crate) fn slot(&self, artifact_id: &str) -> Option<&Mutex<Artifact>> {
        self.slots.get(artifact_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resubmission_keeps_position() {
        let workspace = ArtifactWorkspace::new(vec![
            Artifact::new("a", "python", "x = 1\n"),
            Artifact::new("b", "python", "y = 2\n"),
            Artifact::new("a", "python", "x = 3\n"),
        ]);
        assert_eq!(workspace.len(), 2);
        assert_eq!(workspace.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(workspace.get("a").unwrap().source_text, "x = 3\n");
        assert!(workspace.get("zzz").is_none());
    }
}
