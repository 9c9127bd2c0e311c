//! Batch-wide symbol index with name canonicalization.
//!
//! Resolution order for a referenced name:
//! 1. an exact definition (earliest artifact in batch order is canonical);
//! 2. a definition with the same normalized token sequence (case drift);
//! 3. a definition within the allowed edit distance (fuzzy).
//!
//! Spellings that share a normalized key count as one candidate. Several
//! distinct, equally-close candidates are never resolved; the caller gets
//! `Resolution::Ambiguous`.

pub mod modules;
pub mod normalize;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::config::{AllowList, EngineConfig};
use crate::extract::ExtractionResult;
use crate::models::{Artifact, ModuleImport, Reference, ReferenceKind, Symbol, SymbolKind};

use self::modules::ModuleMap;
use self::normalize::{key_distance, normalized_key};

/// Outcome of resolving one referenced name against the batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Exact(Symbol),
    /// Same token sequence, different spelling.
    CaseDrift(Symbol),
    /// Likely typo of a single canonical name.
    Fuzzy { canonical: Symbol, distance: usize },
    /// Several distinct names are equally close.
    Ambiguous { candidates: Vec<String>, distance: usize },
    Unresolved,
}

impl Resolution {
    pub fn canonical(&self) -> Option<&Symbol> {
        match self {
            Resolution::Exact(s) | Resolution::CaseDrift(s) => Some(s),
            Resolution::Fuzzy { canonical, .. } => Some(canonical),
            _ => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Resolution::Exact(_))
    }
}

#[derive(Clone, Debug)]
struct NameEntry {
    key: String,
    /// Definitions in batch order; the first one is canonical.
    definitions: Vec<Symbol>,
}

/// Merged view of every artifact's extraction result.
#[derive(Clone, Debug)]
pub struct CrossArtifactIndex {
    batch_order: IndexMap<String, usize>,
    names: IndexMap<String, NameEntry>,
    by_key: HashMap<String, Vec<String>>,
    references: Vec<Reference>,
    module_imports: Vec<ModuleImport>,
    external_bindings: HashSet<(String, String)>,
    low_confidence: Vec<String>,
    modules: ModuleMap,
    allow: AllowList,
    min_fuzzy_len: usize,
    max_edit_distance: usize,
    edit_distance_ratio: f64,
}

impl CrossArtifactIndex {
    /// Build the index. `results` must be in the same order as `artifacts`.
    pub fn build(artifacts: &[Artifact], results: &[ExtractionResult], config: &EngineConfig) -> Self {
        let allow = config.allow_list();
        let mut index = Self {
            batch_order: artifacts
                .iter()
                .enumerate()
                .map(|(i, a)| (a.task_id.clone(), i))
                .collect(),
            names: IndexMap::new(),
            by_key: HashMap::new(),
            references: Vec::new(),
            module_imports: Vec::new(),
            external_bindings: HashSet::new(),
            low_confidence: Vec::new(),
            modules: ModuleMap::build(artifacts),
            allow,
            min_fuzzy_len: config.min_fuzzy_len,
            max_edit_distance: config.max_edit_distance,
            edit_distance_ratio: config.edit_distance_ratio,
        };

        for result in results {
            if result.is_low_confidence() {
                index.low_confidence.push(result.artifact_id.clone());
            }
            for symbol in result.definitions() {
                let entry = index.names.entry(symbol.name.clone()).or_insert_with(|| NameEntry {
                    key: normalized_key(&symbol.name),
                    definitions: Vec::new(),
                });
                entry.definitions.push(symbol.clone());
            }
            for reference in &result.references {
                if reference.kind == ReferenceKind::Import {
                    let external = reference
                        .module
                        .as_deref()
                        .is_some_and(|m| index.allow.allows_module(m));
                    if external {
                        index
                            .external_bindings
                            .insert((result.artifact_id.clone(), reference.referenced_name.clone()));
                    }
                }
            }
            // Aliased imports bind a local name that is not a definition.
            for symbol in result.symbols.iter().filter(|s| s.kind == SymbolKind::Import) {
                let aliased = !result
                    .references
                    .iter()
                    .any(|r| r.kind == ReferenceKind::Import && r.location == symbol.location && r.referenced_name == symbol.name);
                if aliased {
                    index
                        .external_bindings
                        .insert((result.artifact_id.clone(), symbol.name.clone()));
                }
            }
            index.references.extend(result.references.iter().cloned());
            index.module_imports.extend(result.module_imports.iter().cloned());
        }

        for (name, entry) in &index.names {
            index.by_key.entry(entry.key.clone()).or_default().push(name.clone());
        }
        index
    }

    pub fn artifact_ids(&self) -> impl Iterator<Item = &str> {
        self.batch_order.keys().map(String::as_str)
    }

    /// Position of an artifact in the batch.
    pub fn batch_index(&self, artifact_id: &str) -> Option<usize> {
        self.batch_order.get(artifact_id).copied()
    }

    pub fn definitions_of(&self, name: &str) -> &[Symbol] {
        self.names
            .get(name)
            .map(|e| e.definitions.as_slice())
            .unwrap_or(&[])
    }

    /// Every defined name with its definitions, in first-definition order.
    pub fn defined_names(&self) -> impl Iterator<Item = (&str, &[Symbol])> {
        self.names
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.definitions.as_slice()))
    }

    /// All references in batch order, then source order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn module_imports(&self) -> &[ModuleImport] {
        &self.module_imports
    }

    pub fn low_confidence(&self) -> &[String] {
        &self.low_confidence
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Artifact a module path maps to, never `from_artifact` itself.
    pub fn module_target(&self, module: &str, from_artifact: &str) -> Option<&str> {
        self.modules.resolve(module, from_artifact)
    }

    /// `name` in `artifact_id` is bound by an import from an external module
    /// or by an import alias, so it is not a batch-level name.
    pub fn is_external_binding(&self, artifact_id: &str, name: &str) -> bool {
        self.external_bindings
            .contains(&(artifact_id.to_string(), name.to_string()))
    }

    fn accepts(&self, name: &str, kind: ReferenceKind) -> bool {
        self.definitions_of(name).iter().any(|s| kind.accepts(s.kind))
    }

    fn canonical_of(&self, name: &str) -> Option<Symbol> {
        self.definitions_of(name).first().cloned()
    }

    fn allowed_edits(&self, len: usize) -> usize {
        crate::guards::allowed_edits(len, self.max_edit_distance, self.edit_distance_ratio)
    }

    /// Resolve a referenced name used as `kind`.
    pub fn resolve(&self, name: &str, kind: ReferenceKind) -> Resolution {
        if let Some(symbol) = self.canonical_of(name) {
            return Resolution::Exact(symbol);
        }

        let key = normalized_key(name);
        if key.is_empty() {
            return Resolution::Unresolved;
        }

        // Every spelling under the same key is one candidate; the earliest
        // definition in batch order is canonical.
        let drift = self
            .by_key
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|n| self.accepts(n, kind))
            .filter_map(|n| self.canonical_of(n))
            .min_by_key(|s| self.batch_index(&s.defining_artifact_id).unwrap_or(usize::MAX));
        if let Some(symbol) = drift {
            return Resolution::CaseDrift(symbol);
        }

        let key_len = key.chars().count();
        if key_len < self.min_fuzzy_len {
            return Resolution::Unresolved;
        }

        let mut best: Option<usize> = None;
        let mut candidates: Vec<&String> = Vec::new();
        for (candidate, entry) in &self.names {
            let cand_len = entry.key.chars().count();
            if cand_len < self.min_fuzzy_len || entry.key == key {
                continue;
            }
            let allowed = self.allowed_edits(key_len.min(cand_len));
            if key_len.abs_diff(cand_len) > allowed || !self.accepts(candidate, kind) {
                continue;
            }
            let distance = key_distance(&key, &entry.key);
            if distance == 0 || distance > allowed {
                continue;
            }
            match best {
                Some(b) if distance > b => {}
                Some(b) if distance == b => candidates.push(candidate),
                _ => {
                    best = Some(distance);
                    candidates = vec![candidate];
                }
            }
        }

        let Some(distance) = best else {
            return Resolution::Unresolved;
        };
        // Spellings that share a normalized key are one candidate.
        let mut seen_keys: Vec<&str> = Vec::new();
        let mut distinct: Vec<&String> = Vec::new();
        for candidate in candidates {
            let candidate_key = self.names[candidate.as_str()].key.as_str();
            if !seen_keys.contains(&candidate_key) {
                seen_keys.push(candidate_key);
                distinct.push(candidate);
            }
        }
        if distinct.len() == 1 {
            if let Some(canonical) = self.canonical_of(distinct[0]) {
                return Resolution::Fuzzy { canonical, distance };
            }
        }
        Resolution::Ambiguous {
            candidates: distinct.into_iter().cloned().collect(),
            distance,
        }
    }
}
