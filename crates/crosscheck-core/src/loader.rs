//! Loading a directory of generated sources as a batch, and writing fixed
//! artifacts back.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::{debug, warn};

use crate::errors::{ConsistencyError, ConsistencyResult};
use crate::models::{Artifact, Language};

const DEFAULT_SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*secret*",
    "*credential*",
];

const IMPLICIT_IGNORED_DIRS: &[&str] = &[
    ".git",
    ".crosscheck",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
];

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn exclude_sensitive() -> bool {
    match std::env::var("CROSSCHECK_EXCLUDE_SENSITIVE") {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

/// Caller excludes plus the sensitive-file patterns, as one gitignore-style
/// matcher rooted at `root`. `!pattern` re-includes and a leading `/`
/// anchors to the root, as in `.gitignore`.
fn exclude_matcher(root: &Path, extra_excludes: &[String]) -> ConsistencyResult<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    let sensitive: &[&str] = if exclude_sensitive() {
        DEFAULT_SENSITIVE_EXCLUDE_PATTERNS
    } else {
        &[]
    };
    let patterns = sensitive.iter().copied().chain(extra_excludes.iter().map(String::as_str));
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|e| ConsistencyError::Config(format!("invalid exclude pattern `{pattern}`: {e}")))?;
    }
    builder
        .build()
        .map_err(|e| ConsistencyError::Config(format!("invalid exclude patterns: {e}")))
}

/// Source files under `root` the scanner has rules for, in path order.
/// `.gitignore`, `.crosscheckignore` and `extra_excludes` patterns apply.
pub fn collect_source_files(root: &Path, extra_excludes: &[String]) -> ConsistencyResult<Vec<PathBuf>> {
    let excludes = exclude_matcher(root, extra_excludes)?;
    let base = root.to_path_buf();
    let keep = move |entry: &DirEntry| {
        if entry.depth() == 0 {
            return true;
        }
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        let name = entry.file_name().to_string_lossy();
        if is_dir && IMPLICIT_IGNORED_DIRS.contains(&name.as_ref()) {
            return false;
        }
        let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
        !excludes.matched(rel, is_dir).is_ignore()
    };

    let walker = WalkBuilder::new(root)
        .standard_filters(true)
        .hidden(false)
        .parents(false)
        .require_git(false)
        .add_custom_ignore_filename(".crosscheckignore")
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(keep)
        .build();

    let files = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter(|entry| Language::from_path(&entry.path().to_string_lossy()).is_some())
        .map(DirEntry::into_path)
        .collect();
    Ok(files)
}

/// Every recognised source file under `root` as an artifact. The task id
/// and path are the root-relative path.
pub fn load_artifacts(root: &Path, extra_excludes: &[String]) -> ConsistencyResult<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    for path in collect_source_files(root, extra_excludes)? {
        let rel = relative(root, &path);
        let Some(language) = Language::from_path(&rel) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => artifacts.push(Artifact::new(rel.clone(), language.as_str(), text).with_path(rel)),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(artifacts)
}

/// Write artifacts whose text differs from `before` back under `root`.
/// Returns how many files were written.
pub fn write_back(root: &Path, before: &[Artifact], after: &[Artifact]) -> ConsistencyResult<usize> {
    let mut written = 0;
    for artifact in after {
        let unchanged = before
            .iter()
            .any(|b| b.task_id == artifact.task_id && b.source_text == artifact.source_text);
        if unchanged {
            continue;
        }
        let rel = artifact.path.as_deref().unwrap_or(&artifact.task_id);
        std::fs::write(root.join(rel), &artifact.source_text)?;
        debug!("Wrote fixed artifact {}", rel);
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("app/models.py"), "class Book:\n    pass\n").unwrap();
        fs::write(root.join("app/routes.ts"), "import { Book } from './models';\n").unwrap();
        fs::write(root.join("app/notes.md"), "# Book\n").unwrap();
        fs::write(root.join("node_modules/lib/index.js"), "module.exports = {};\n").unwrap();
        fs::write(root.join("generated/skip.py"), "x = 1\n").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();
        dir
    }

    #[test]
    fn test_collects_recognised_sources_only() {
        let dir = tree();
        let files: Vec<String> = collect_source_files(dir.path(), &[])
            .unwrap()
            .iter()
            .map(|p| relative(dir.path(), p))
            .collect();
        assert_eq!(files, vec!["app/models.py", "app/routes.ts"]);
    }

    #[test]
    fn test_extra_excludes() {
        let dir = tree();
        let files = collect_source_files(dir.path(), &["*.ts".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_load_and_write_back() {
        let dir = tree();
        let before = load_artifacts(dir.path(), &[]).unwrap();
        assert_eq!(before[0].task_id, "app/models.py");
        assert_eq!(before[0].language, "python");
        assert_eq!(before[1].path.as_deref(), Some("app/routes.ts"));

        let mut after = before.clone();
        after[1].source_text = "import { Book } from './models';\nexport {};\n".to_string();
        assert_eq!(write_back(dir.path(), &before, &after).unwrap(), 1);
        let text = fs::read_to_string(dir.path().join("app/routes.ts")).unwrap();
        assert!(text.ends_with("export {};\n"));
    }

    #[test]
    fn test_negated_and_anchored_excludes() {
        let dir = tree();
        let root = dir.path();
        fs::write(root.join("models.py"), "class Shelf:\n    pass\n").unwrap();
        fs::write(root.join("app/keep_secret.py"), "x = 1\n").unwrap();
        let excludes = vec!["*.py".to_string(), "!app/models.py".to_string(), "/app/*.ts".to_string()];
        let files: Vec<String> = collect_source_files(root, &excludes)
            .unwrap()
            .iter()
            .map(|p| relative(root, p))
            .collect();
        assert_eq!(files, vec!["app/models.py"]);
    }

    #[test]
    fn test_crosscheckignore_and_sensitive_patterns() {
        let dir = tree();
        let root = dir.path();
        fs::write(root.join(".crosscheckignore"), "routes.ts\n").unwrap();
        fs::write(root.join("app/aws_credentials.py"), "KEY = 1\n").unwrap();
        let files: Vec<String> = collect_source_files(root, &[])
            .unwrap()
            .iter()
            .map(|p| relative(root, p))
            .collect();
        assert_eq!(files, vec!["app/models.py"]);
    }

    #[test]
    fn test_invalid_exclude_is_config_error() {
        let dir = tree();
        let err = collect_source_files(dir.path(), &["[".to_string()]).unwrap_err();
        assert!(matches!(err, ConsistencyError::Config(_)));
    }
}
