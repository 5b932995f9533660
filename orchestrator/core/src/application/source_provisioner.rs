// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Source Repository Provisioner
//!
//! Creates and deletes application repositories from the configured template
//! and fetches repository contents for outline generation: path listing,
//! batched content fetch, import-closure crawl and dependency ordering.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Coordinates the [`SourceControlProvider`] for the pipeline

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::domain::source_file::{
    has_source_extension, processing_order, resolve_imports, FetchedFile, ImportAlias, SourceFile,
};
use crate::domain::source_repo::{
    EntryKind, GitHubCredentials, RepositoryHandle, SourceControlError, SourceControlProvider,
    SourceRepoId, TemplateRequest,
};

pub struct SourceRepositoryProvisioner {
    provider: Arc<dyn SourceControlProvider>,
    batch_size: usize,
    batch_delay: Duration,
    alias: ImportAlias,
}

impl SourceRepositoryProvisioner {
    pub fn new(provider: Arc<dyn SourceControlProvider>) -> Self {
        Self {
            provider,
            batch_size: 5,
            batch_delay: Duration::from_millis(1000),
            alias: ImportAlias::default(),
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    pub fn with_alias(mut self, alias: ImportAlias) -> Self {
        self.alias = alias;
        self
    }

    pub fn alias(&self) -> &ImportAlias {
        &self.alias
    }

    /// Generate a private repository `owner/name` from a template.
    pub async fn create_from_template(
        &self,
        template_owner: &str,
        template_name: &str,
        owner: &str,
        name: &str,
        credentials: &GitHubCredentials,
    ) -> Result<RepositoryHandle, SourceControlError> {
        let request = TemplateRequest {
            template_owner: template_owner.to_string(),
            template_name: template_name.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            private: true,
        };
        info!("Creating repository {}/{} from {}/{}", owner, name, template_owner, template_name);
        self.provider.generate_from_template(&request, credentials).await
    }

    /// Delete a repository. An already-absent repository counts as deleted.
    pub async fn delete(
        &self,
        owner: &str,
        name: &str,
        credentials: &GitHubCredentials,
    ) -> Result<(), SourceControlError> {
        match self.provider.delete_repository(owner, name, credentials).await {
            Ok(()) => {
                info!("Deleted repository {}/{}", owner, name);
                Ok(())
            }
            Err(SourceControlError::NotFound(_)) => {
                info!("Repository {}/{} already absent", owner, name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Every file path in the repository. Directories are walked depth-first;
    /// a sub-directory that cannot be listed is skipped with a warning, but a
    /// failure to list the root is returned.
    pub async fn list_file_paths(
        &self,
        owner: &str,
        name: &str,
        credentials: &GitHubCredentials,
    ) -> Result<Vec<String>, SourceControlError> {
        let mut paths = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(dir) = pending.pop() {
            let entries = match self.provider.list_directory(owner, name, &dir, credentials).await {
                Ok(entries) => entries,
                Err(e) if dir.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Skipping {}/{}:{} - {}", owner, name, dir, e);
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                match entry.kind {
                    EntryKind::File => paths.push(entry.path),
                    EntryKind::Dir => subdirs.push(entry.path),
                    EntryKind::Other => {}
                }
            }
            // Reversed so the first sub-directory is walked next
            pending.extend(subdirs.into_iter().rev());
        }

        debug!("Listed {} files in {}/{}", paths.len(), owner, name);
        Ok(paths)
    }

    /// Fetch the content of every path containing `pattern`.
    pub async fn fetch_matching_files(
        &self,
        owner: &str,
        name: &str,
        paths: &[String],
        pattern: &str,
        credentials: &GitHubCredentials,
    ) -> Vec<FetchedFile> {
        let matching: Vec<String> = paths.iter().filter(|p| p.contains(pattern)).cloned().collect();
        self.fetch_batched(owner, name, &matching, credentials).await
    }

    /// Fetch in batches of `batch_size` concurrent requests, pausing between
    /// batches. Files that fail to fetch are dropped.
    async fn fetch_batched(
        &self,
        owner: &str,
        name: &str,
        paths: &[String],
        credentials: &GitHubCredentials,
    ) -> Vec<FetchedFile> {
        let mut fetched = Vec::with_capacity(paths.len());
        let batch_count = paths.len().div_ceil(self.batch_size);

        for (index, batch) in paths.chunks(self.batch_size).enumerate() {
            let results = join_all(batch.iter().map(|path| async move {
                let result = self.provider.get_file_content(owner, name, path, credentials).await;
                (path, result)
            }))
            .await;

            for (path, result) in results {
                match result {
                    Ok(content) => fetched.push(FetchedFile {
                        path: path.clone(),
                        content,
                    }),
                    Err(e) => warn!("Failed to fetch {}: {}", path, e),
                }
            }

            if index + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        fetched
    }

    /// Follow in-repository imports from `seed` up to `max_depth` levels,
    /// fetching each newly discovered file that contains `dependency_pattern`
    /// and has a source extension. Returns the seed files followed by
    /// everything fetched. Each path is fetched at most once.
    #[allow(clippy::too_many_arguments)]
    pub async fn collect_dependency_closure(
        &self,
        owner: &str,
        name: &str,
        seed: Vec<FetchedFile>,
        known_paths: &[String],
        dependency_pattern: &str,
        max_depth: usize,
        credentials: &GitHubCredentials,
    ) -> Vec<FetchedFile> {
        let known: HashSet<&str> = known_paths.iter().map(String::as_str).collect();
        let mut visited: HashSet<String> = seed.iter().map(|f| f.path.clone()).collect();
        let mut collected = seed;
        let mut frontier_start = 0;

        for depth in 0..max_depth {
            let mut discovered = Vec::new();
            for file in &collected[frontier_start..] {
                for import in resolve_imports(&file.path, &file.content, &known, &self.alias) {
                    if import.contains(dependency_pattern)
                        && has_source_extension(&import)
                        && visited.insert(import.clone())
                    {
                        discovered.push(import);
                    }
                }
            }

            if discovered.is_empty() {
                debug!("Dependency crawl settled after {} levels", depth);
                break;
            }

            frontier_start = collected.len();
            let fetched = self.fetch_batched(owner, name, &discovered, credentials).await;
            collected.extend(fetched);
        }

        collected
    }

    /// Turn fetched files into [`SourceFile`]s with resolved imports, ordered
    /// so that every file follows the files it imports.
    pub fn processing_order(
        &self,
        repository_id: SourceRepoId,
        files: Vec<FetchedFile>,
        known_paths: &[String],
    ) -> Vec<SourceFile> {
        let known: HashSet<&str> = known_paths.iter().map(String::as_str).collect();
        let source_files: Vec<SourceFile> = files
            .into_iter()
            .map(|f| {
                let mut source = SourceFile::new(repository_id, f.path, f.content);
                source.imports = resolve_imports(&source.path, &source.content, &known, &self.alias);
                source
            })
            .collect();
        processing_order(&source_files)
    }
}
