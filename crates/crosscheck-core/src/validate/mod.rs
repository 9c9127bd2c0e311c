//! Validators over the cross-artifact index, and the registry that runs them.

pub mod duplicates;
pub mod imports;
pub mod naming;
pub mod severity;

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::index::CrossArtifactIndex;
use crate::models::Issue;

pub use self::duplicates::DuplicateDefinitionValidator;
pub use self::imports::ImportValidator;
pub use self::naming::NamingValidator;

/// A read-only check over the batch index.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, index: &CrossArtifactIndex) -> ConsistencyResult<Vec<Issue>>;
}

/// Issues from every validator that completed, plus one warning per
/// validator that failed.
#[derive(Debug, Default)]
pub struct ValidatorOutcome {
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
}

/// Static registry of validators, run in parallel against one index.
pub struct ValidatorSet {
    validators: Vec<Box<dyn Validator>>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl ValidatorSet {
    pub fn empty() -> Self {
        Self { validators: Vec::new() }
    }

    pub fn standard() -> Self {
        Self::empty()
            .with(NamingValidator)
            .with(ImportValidator)
            .with(DuplicateDefinitionValidator)
    }

    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator. A validator that errors or panics is isolated
    /// and reported as a warning; the others still contribute.
    pub fn run(&self, index: &CrossArtifactIndex) -> ValidatorOutcome {
        let results: Vec<(&'static str, ConsistencyResult<Vec<Issue>>)> = self
            .validators
            .par_iter()
            .map(|validator| {
                let name = validator.name();
                let result = catch_unwind(AssertUnwindSafe(|| validator.validate(index)))
                    .unwrap_or_else(|_| Err(ConsistencyError::validator(name, "panicked")));
                (name, result)
            })
            .collect();

        let mut outcome = ValidatorOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();
        for (name, result) in results {
            match result {
                Ok(issues) => {
                    debug!("Validator {} reported {} issues", name, issues.len());
                    for issue in issues {
                        if seen.insert(issue.id.clone()) {
                            outcome.issues.push(issue);
                        }
                    }
                }
                Err(e) => {
                    warn!("Validator {} failed: {}", name, e);
                    outcome.warnings.push(format!("validator {name} failed: {e}"));
                }
            }
        }
        outcome
    }
}
