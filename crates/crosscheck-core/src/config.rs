//! Engine configuration: defaults, optional JSON file, `CROSSCHECK_*` env vars.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::guards::{self, clamp_ratio, clamp_usize};

/// Module roots that are always treated as external.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    // python
    "os", "sys", "re", "json", "typing", "dataclasses", "datetime", "enum", "collections",
    "functools", "itertools", "pathlib", "logging", "uuid", "abc", "asyncio", "decimal",
    "flask", "fastapi", "django", "sqlalchemy", "pydantic", "pytest", "requests",
    // javascript / typescript
    "react", "react-dom", "express", "node", "fs", "path", "http", "axios", "lodash", "vue",
    "@angular", "@nestjs", "mongoose", "typeorm", "jest", "zod",
    // java
    "java", "javax", "jakarta", "org.springframework", "lombok", "org.junit",
    // go
    "fmt", "net", "strings", "errors", "time", "context", "encoding", "database", "io",
    "github.com",
    // rust
    "std", "core", "alloc", "serde", "serde_json", "tokio", "anyhow", "thiserror", "chrono",
];

/// Names that are builtins or framework vocabulary in at least one of the
/// scanned languages.
pub const DEFAULT_ALLOWED_NAMES: &[&str] = &[
    // builtin types
    "str", "int", "float", "bool", "bytes", "list", "dict", "set", "tuple", "object", "type",
    "string", "number", "boolean", "any", "void", "never", "unknown", "String", "Integer",
    "Long", "Double", "Boolean", "Object", "List", "Map", "Set", "Array", "Record", "Partial",
    "Promise", "Date", "Error", "Exception", "ValueError", "TypeError", "KeyError",
    "RuntimeError", "Optional", "Dict", "Any", "Union", "Tuple", "Callable", "ArrayList",
    "HashMap", "HashSet", "Vec", "Option", "Result", "Box", "Rc", "Arc", "Self",
    // builtin functions and values
    "print", "len", "range", "isinstance", "super", "self", "cls", "this", "console", "JSON",
    "Math", "Some", "None", "Ok", "Err", "println", "format", "vec", "make", "new",
    "__init__", "constructor", "require",
    // common members
    "get", "set", "push", "pop", "append", "extend", "items", "keys", "values", "map",
    "filter", "reduce", "forEach", "then", "catch", "length", "toString", "join", "split",
    "strip", "update", "add", "remove", "insert", "contains", "iter", "clone", "unwrap",
    "collect", "into", "from", "log", "error", "query", "commit", "close", "open", "read",
    "write", "send", "json", "status", "id", "name", "data", "value",
];

/// Runtime configuration for a validation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_fuzzy_len: usize,
    pub max_edit_distance: usize,
    pub edit_distance_ratio: f64,
    /// Extra names to treat as external, on top of the built-in list.
    pub allowed_names: Vec<String>,
    /// Extra module roots to treat as external, on top of the built-in list.
    pub allowed_modules: Vec<String>,
    pub max_source_bytes: usize,
    pub max_lines: usize,
    pub max_line_length: usize,
    pub max_items_per_artifact: usize,
    pub auto_fix: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_fuzzy_len: guards::DEFAULT_MIN_FUZZY_LEN,
            max_edit_distance: guards::DEFAULT_MAX_EDIT_DISTANCE,
            edit_distance_ratio: guards::DEFAULT_EDIT_DISTANCE_RATIO,
            allowed_names: Vec::new(),
            allowed_modules: Vec::new(),
            max_source_bytes: guards::DEFAULT_MAX_SOURCE_BYTES,
            max_lines: guards::DEFAULT_MAX_LINES,
            max_line_length: guards::DEFAULT_MAX_LINE_LENGTH,
            max_items_per_artifact: guards::DEFAULT_MAX_ITEMS_PER_ARTIFACT,
            auto_fix: true,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_json_path(path: &Path) -> ConsistencyResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConsistencyError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        Ok(config.clamped())
    }

    /// Defaults, then the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> ConsistencyResult<Self> {
        let base = match path {
            Some(path) => Self::from_json_path(path)?,
            None => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `CROSSCHECK_*` overrides read through `lookup`. Unparseable
    /// values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());

        if let Some(v) = number("CROSSCHECK_MIN_FUZZY_LEN") {
            self.min_fuzzy_len = v;
        }
        if let Some(v) = number("CROSSCHECK_MAX_EDIT_DISTANCE") {
            self.max_edit_distance = v;
        }
        if let Some(v) = lookup("CROSSCHECK_EDIT_DISTANCE_RATIO")
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            self.edit_distance_ratio = v;
        }
        if let Some(v) = number("CROSSCHECK_MAX_SOURCE_BYTES") {
            self.max_source_bytes = v;
        }
        if let Some(v) = number("CROSSCHECK_MAX_LINES") {
            self.max_lines = v;
        }
        if let Some(v) = number("CROSSCHECK_MAX_LINE_LENGTH") {
            self.max_line_length = v;
        }
        if let Some(v) = number("CROSSCHECK_MAX_ITEMS") {
            self.max_items_per_artifact = v;
        }
        if let Some(val) = lookup("CROSSCHECK_AUTO_FIX") {
            let v = val.trim().to_lowercase();
            self.auto_fix = !matches!(v.as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(val) = lookup("CROSSCHECK_ALLOWED_NAMES") {
            self.allowed_names.extend(split_list(&val));
        }
        if let Some(val) = lookup("CROSSCHECK_ALLOWED_MODULES") {
            self.allowed_modules.extend(split_list(&val));
        }
        self.clamped()
    }

    /// Pull every guard back into its safe range.
    pub fn clamped(mut self) -> Self {
        self.min_fuzzy_len = clamp_usize(self.min_fuzzy_len, 1, 64);
        self.max_edit_distance = clamp_usize(self.max_edit_distance, 1, guards::MAX_EDIT_DISTANCE);
        self.edit_distance_ratio = clamp_ratio(self.edit_distance_ratio);
        self.max_source_bytes = clamp_usize(
            self.max_source_bytes,
            guards::MIN_SOURCE_BYTES,
            guards::MAX_SOURCE_BYTES,
        );
        self.max_lines = clamp_usize(self.max_lines, guards::MIN_LINES, guards::MAX_LINES);
        self.max_line_length = clamp_usize(
            self.max_line_length,
            guards::MIN_LINE_LENGTH,
            guards::MAX_LINE_LENGTH,
        );
        self.max_items_per_artifact = clamp_usize(
            self.max_items_per_artifact,
            guards::MIN_ITEMS_PER_ARTIFACT,
            guards::MAX_ITEMS_PER_ARTIFACT,
        );
        self
    }

    /// Allowed edit count for two keys whose shorter length is `len`.
    pub fn allowed_edits(&self, len: usize) -> usize {
        guards::allowed_edits(len, self.max_edit_distance, self.edit_distance_ratio)
    }

    pub fn allow_list(&self) -> AllowList {
        let mut names: HashSet<String> =
            DEFAULT_ALLOWED_NAMES.iter().map(|s| s.to_string()).collect();
        names.extend(self.allowed_names.iter().cloned());
        let mut modules: Vec<String> =
            DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect();
        modules.extend(self.allowed_modules.iter().cloned());
        AllowList { names, modules }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// External names and module roots that validators never flag.
#[derive(Clone, Debug, Default)]
pub struct AllowList {
    names: HashSet<String>,
    modules: Vec<String>,
}

impl AllowList {
    pub fn allows_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// A module is allowed when it equals an allowed root or continues it
    /// with a path separator (`.`, `/`, `::`). Relative modules never are.
    pub fn allows_module(&self, module: &str) -> bool {
        let module = module.trim_matches(|c| c == '"' || c == '\'' || c == '`');
        if module.is_empty() || module.starts_with('.') || module.starts_with("crate") {
            return false;
        }
        self.modules.iter().any(|root| {
            module == root
                || module
                    .strip_prefix(root.as_str())
                    .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('/') || rest.starts_with("::"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_fuzzy_len, 4);
        assert_eq!(config.max_edit_distance, 2);
        assert!(config.auto_fix);
        assert_eq!(config.allowed_edits(4), 1);
    }

    #[test]
    fn test_env_overrides_and_toggles() {
        let config = EngineConfig::default().with_overrides(lookup_from(&[
            ("CROSSCHECK_AUTO_FIX", "off"),
            ("CROSSCHECK_MIN_FUZZY_LEN", "6"),
            ("CROSSCHECK_ALLOWED_NAMES", "Widget, Gadget ,"),
            ("CROSSCHECK_MAX_LINES", "not-a-number"),
        ]));
        assert!(!config.auto_fix);
        assert_eq!(config.min_fuzzy_len, 6);
        assert_eq!(config.allowed_names, vec!["Widget", "Gadget"]);
        assert_eq!(config.max_lines, guards::DEFAULT_MAX_LINES);
    }

    #[test]
    fn test_clamping() {
        let config = EngineConfig {
            max_edit_distance: 99,
            max_lines: 1,
            edit_distance_ratio: -2.0,
            ..EngineConfig::default()
        }
        .clamped();
        assert_eq!(config.max_edit_distance, guards::MAX_EDIT_DISTANCE);
        assert_eq!(config.max_lines, guards::MIN_LINES);
        assert_eq!(config.edit_distance_ratio, 0.0);
    }

    #[test]
    fn test_from_json_path_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crosscheck.json");
        std::fs::write(&path, r#"{"auto_fix": false, "allowed_modules": ["acme"]}"#).unwrap();
        let config = EngineConfig::from_json_path(&path).unwrap();
        assert!(!config.auto_fix);
        assert_eq!(config.min_fuzzy_len, 4);
        assert!(config.allow_list().allows_module("acme.billing"));
    }

    #[test]
    fn test_from_json_path_missing_file() {
        let err = EngineConfig::from_json_path(Path::new("/nonexistent/crosscheck.json"));
        assert!(matches!(err, Err(ConsistencyError::Config(_))));
    }

    #[test]
    fn test_allow_list_module_roots() {
        let allow = EngineConfig::default().allow_list();
        assert!(allow.allows_module("typing"));
        assert!(allow.allows_module("org.springframework.web.bind"));
        assert!(allow.allows_module("std::collections"));
        assert!(allow.allows_module("@angular/core"));
        assert!(allow.allows_module("'react'"));
        assert!(!allow.allows_module("osmosis"));
        assert!(!allow.allows_module("./models"));
        assert!(allow.allows_name("Optional"));
        assert!(!allow.allows_name("Book"));
    }
}
