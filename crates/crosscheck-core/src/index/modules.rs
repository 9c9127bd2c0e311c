//! Mapping module-style import paths back to artifacts of the batch.

use std::collections::HashMap;
use std::path::Path;

use crate::models::Artifact;

/// Convert a file path to a dotted module name.
///
/// Strips the file extension and joins path components with dots,
/// skipping any leading `/` or `.` segments.
pub fn to_module_name(path: &str) -> String {
    let p = Path::new(path);
    let without_ext = p.with_extension("");
    let parts: Vec<&str> = without_ext
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    parts.join(".")
}

/// Reduce an import's module string to dotted form: relative prefixes,
/// quotes, crate-local roots and file extensions are dropped.
pub fn normalize_module(module: &str) -> String {
    let mut m = module
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .replace('\\', "/");
    loop {
        let before = m.len();
        for prefix in ["./", "../", "@/", "~/"] {
            if let Some(rest) = m.strip_prefix(prefix) {
                m = rest.to_string();
            }
        }
        if m.len() == before {
            break;
        }
    }
    let m = m.trim_start_matches('.').replace("::", ".").replace('/', ".");
    let mut parts: Vec<&str> = m.split('.').filter(|s| !s.is_empty()).collect();
    while parts
        .first()
        .is_some_and(|p| matches!(*p, "crate" | "super" | "self"))
    {
        parts.remove(0);
    }
    if let Some(last) = parts.last() {
        if matches!(*last, "py" | "ts" | "tsx" | "js" | "jsx" | "mjs" | "java" | "go" | "rs") && parts.len() > 1 {
            parts.pop();
        }
    }
    parts.join(".")
}

/// Module-name lookup table for the artifacts of one batch.
#[derive(Clone, Debug, Default)]
pub struct ModuleMap {
    full: HashMap<String, String>,
    tail: HashMap<String, Vec<String>>,
}

impl ModuleMap {
    pub fn build(artifacts: &[Artifact]) -> Self {
        let mut map = Self::default();
        for artifact in artifacts {
            let mut names = vec![normalize_module(&artifact.task_id)];
            if let Some(path) = &artifact.path {
                let module = to_module_name(path);
                // `pkg/index.ts` and `pkg/__init__.py` stand for `pkg`.
                if let Some(parent) = module
                    .strip_suffix(".index")
                    .or_else(|| module.strip_suffix(".__init__"))
                    .or_else(|| module.strip_suffix(".mod"))
                {
                    names.push(parent.to_string());
                }
                names.push(module);
            }
            for name in names.into_iter().filter(|n| !n.is_empty()) {
                map.insert(&name, &artifact.task_id);
            }
        }
        map
    }

    fn insert(&mut self, module: &str, artifact_id: &str) {
        self.full
            .entry(module.to_string())
            .or_insert_with(|| artifact_id.to_string());
        let mut parts: Vec<&str> = module.split('.').collect();
        // Register every suffix so `app.models` also answers `models`.
        while !parts.is_empty() {
            let suffix = parts.join(".");
            let owners = self.tail.entry(suffix).or_default();
            if !owners.iter().any(|o| o == artifact_id) {
                owners.push(artifact_id.to_string());
            }
            parts.remove(0);
        }
    }

    /// Artifact a module string refers to, if exactly one matches. An
    /// artifact never maps its own imports to itself.
    pub fn resolve(&self, module: &str, from_artifact: &str) -> Option<&str> {
        let normalized = normalize_module(module);
        if normalized.is_empty() {
            return None;
        }
        if let Some(owner) = self.full.get(&normalized) {
            return (owner != from_artifact).then_some(owner.as_str());
        }
        let mut parts: Vec<&str> = normalized.split('.').collect();
        while !parts.is_empty() {
            if let Some(owners) = self.tail.get(&parts.join(".")) {
                let others: Vec<&String> = owners.iter().filter(|o| *o != from_artifact).collect();
                if others.len() == 1 {
                    return Some(others[0].as_str());
                }
                if !others.is_empty() {
                    return None;
                }
            }
            parts.remove(0);
        }
        None
    }
}
