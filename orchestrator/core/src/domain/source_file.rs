// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Source Files
//!
//! Files fetched from an application's repository, their import graph and the
//! order in which they are fed to outline generation: dependencies before the
//! files that import them.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::source_repo::SourceRepoId;

/// Extensions treated as source code when resolving imports.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Upper bound on ordering passes before the remainder is appended as-is.
pub const MAX_ORDERING_LEVELS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFileId(pub Uuid);

impl SourceFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceFileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A repository file with its resolved in-repository imports. Unique per
/// `(repository_id, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: SourceFileId,
    pub repository_id: SourceRepoId,
    pub path: String,
    pub content: String,
    /// Repository paths of imported files.
    pub imports: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl SourceFile {
    pub fn new(repository_id: SourceRepoId, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: SourceFileId::new(),
            repository_id,
            path: path.into(),
            content: content.into(),
            imports: Vec::new(),
            fetched_at: Utc::now(),
        }
    }
}

/// A path fetched from the repository together with its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: String,
    pub content: String,
}

/// Rewrites an import alias such as `@/` to a repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAlias {
    pub prefix: String,
    pub replacement: String,
}

impl Default for ImportAlias {
    fn default() -> Self {
        Self {
            prefix: "@/".to_string(),
            replacement: "src/".to_string(),
        }
    }
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^\s*import\s+(?:[^'";]*?\s+from\s+)?['"]([^'"]+)['"]"#)
            .expect("import pattern is a valid regex")
    })
}

/// Raw module specifiers of every `import ... from "<path>"` statement.
pub fn parse_import_specifiers(content: &str) -> Vec<String> {
    import_pattern()
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Collapse `.` and `..` segments.
fn normalize_segments(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Map a module specifier to a repository-relative path stem, or `None` for
/// package imports.
pub fn normalize_specifier(specifier: &str, importer: &str, alias: &ImportAlias) -> Option<String> {
    if let Some(rest) = specifier.strip_prefix(alias.prefix.as_str()) {
        return Some(normalize_segments(&format!("{}{}", alias.replacement, rest)));
    }
    if specifier.starts_with("./") || specifier.starts_with("../") {
        return Some(normalize_segments(&format!("{}/{}", parent_dir(importer), specifier)));
    }
    None
}

pub fn has_source_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Find the repository file a path stem refers to: the stem itself, the stem
/// plus a source extension, or an `index` file inside it.
pub fn resolve_against(stem: &str, known_paths: &HashSet<&str>) -> Option<String> {
    if known_paths.contains(stem) && has_source_extension(stem) {
        return Some(stem.to_string());
    }
    SOURCE_EXTENSIONS
        .iter()
        .map(|ext| format!("{}.{}", stem, ext))
        .chain(SOURCE_EXTENSIONS.iter().map(|ext| format!("{}/index.{}", stem, ext)))
        .find(|candidate| known_paths.contains(candidate.as_str()))
}

/// In-repository files imported by `file`.
pub fn resolve_imports(
    path: &str,
    content: &str,
    known_paths: &HashSet<&str>,
    alias: &ImportAlias,
) -> Vec<String> {
    let mut resolved = Vec::new();
    for specifier in parse_import_specifiers(content) {
        if let Some(target) = normalize_specifier(&specifier, path, alias)
            .and_then(|stem| resolve_against(&stem, known_paths))
        {
            if target != path && !resolved.contains(&target) {
                resolved.push(target);
            }
        }
    }
    resolved
}

/// Order files so each comes after everything it imports.
///
/// Works in levels: every pass places the files whose imports are all placed
/// already. Files that never become ready (cycles, imports outside the set)
/// are appended in their original order once no progress is made or after
/// [`MAX_ORDERING_LEVELS`] passes.
pub fn processing_order(files: &[SourceFile]) -> Vec<SourceFile> {
    let mut placed: HashSet<&str> = HashSet::with_capacity(files.len());
    let mut ordered: Vec<SourceFile> = Vec::with_capacity(files.len());
    let mut remaining: Vec<&SourceFile> = files.iter().collect();

    for _ in 0..MAX_ORDERING_LEVELS {
        if remaining.is_empty() {
            break;
        }
        let (ready, blocked): (Vec<&SourceFile>, Vec<&SourceFile>) = remaining
            .into_iter()
            .partition(|f| f.imports.iter().all(|i| placed.contains(i.as_str())));

        if ready.is_empty() {
            remaining = blocked;
            break;
        }
        for &file in &ready {
            placed.insert(file.path.as_str());
        }
        ordered.extend(ready.into_iter().cloned());
        remaining = blocked;
    }

    ordered.extend(remaining.into_iter().cloned());
    ordered
}
