//! Vault document loader.
//!
//! Walks the vault root recursively, keeps files matching the include globs
//! (notes only by default), and reads them concurrently with bounded
//! parallelism. Unreadable files are skipped and reported rather than
//! failing the whole load: one corrupt note should not block the rest.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::error::{VaultError, VaultResult};
use crate::models::Document;

/// Directories that never contain notes worth indexing.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/.obsidian/**",
    "**/.trash/**",
    "**/node_modules/**",
];

/// A file that matched the filters but could not be read.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub source_path: String,
    pub reason: String,
}

/// Outcome of [`load_documents`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Loaded documents, sorted by `source_path`.
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

/// Load every matching note under `root`.
///
/// An empty `documents` list is not an error here; callers decide what an
/// empty vault means.
pub async fn load_documents(root: &Path, config: &LoaderConfig) -> VaultResult<LoadReport> {
    if !root.is_dir() {
        return Err(VaultError::InvalidRoot(root.to_path_buf()));
    }

    let include_set = build_globset(config.include_globs.iter().map(String::as_str))
        .map_err(|e| VaultError::Config(format!("loader.include_globs: {}", e)))?;
    let exclude_set = build_globset(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(config.exclude_globs.iter().map(String::as_str)),
    )
    .map_err(|e| VaultError::Config(format!("loader.exclude_globs: {}", e)))?;

    let paths = discover(root, config.follow_symlinks, &include_set, &exclude_set);
    tracing::debug!(root = %root.display(), files = paths.len(), "discovered notes");

    // `buffered` keeps input order, so the sorted discovery order survives.
    let results: Vec<(String, std::io::Result<String>)> = stream::iter(paths)
        .map(|(abs, rel)| async move {
            let read = tokio::fs::read_to_string(&abs).await;
            (rel, read)
        })
        .buffered(config.workers.max(1))
        .collect()
        .await;

    let mut report = LoadReport::default();
    for (source_path, read) in results {
        match read {
            Ok(text) => report.documents.push(Document { text, source_path }),
            Err(e) => {
                tracing::warn!(file = %source_path, error = %e, "skipping unreadable note");
                report.skipped.push(SkippedFile {
                    source_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Collect `(absolute, relative)` paths for matching files, sorted by relative path.
fn discover(
    root: &Path,
    follow_symlinks: bool,
    include_set: &GlobSet,
    exclude_set: &GlobSet,
) -> Vec<(PathBuf, String)> {
    let mut paths = Vec::new();

    let walker = WalkDir::new(root).follow_links(follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push((path.to_path_buf(), rel_str));
    }

    // Sort for deterministic ordering
    paths.sort_by(|a, b| a.1.cmp(&b.1));
    paths
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
