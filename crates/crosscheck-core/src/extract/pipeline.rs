//! Batch extraction with Rayon-based parallelism.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::extract::{extract_artifact, ExtractLimits, ExtractionResult};
use crate::models::Artifact;

/// Default worker count: one per available core, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Extract every artifact in parallel. Results keep batch order.
pub fn parallel_extract(
    artifacts: &[Artifact],
    limits: &ExtractLimits,
    workers: usize,
) -> Vec<ExtractionResult> {
    if artifacts.is_empty() {
        return vec![];
    }
    let started = Instant::now();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    let results: Vec<ExtractionResult> = match pool {
        Ok(pool) => pool.install(|| {
            artifacts
                .par_iter()
                .map(|artifact| extract_artifact(artifact, limits))
                .collect()
        }),
        Err(e) => {
            debug!("Thread pool unavailable ({e}); extracting sequentially");
            artifacts
                .iter()
                .map(|artifact| extract_artifact(artifact, limits))
                .collect()
        }
    };

    let symbols: usize = results.iter().map(|r| r.symbols.len()).sum();
    let references: usize = results.iter().map(|r| r.references.len()).sum();
    let low = results.iter().filter(|r| r.is_low_confidence()).count();
    info!(
        "Extracted {} symbols and {} references from {} artifacts ({} low confidence) in {}ms",
        symbols,
        references,
        results.len(),
        low,
        started.elapsed().as_millis()
    );
    results
}
