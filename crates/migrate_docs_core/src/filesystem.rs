use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{MigrateError, Result};
use crate::runtime::ResolvedPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Markdown,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Found under the source version folder; written under the target folder.
    Version,
    /// Found under a cross-reference folder; rewritten in place.
    CrossRef,
}

#[derive(Debug, Clone)]
pub struct FileTask {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub relative_path: String,
    pub kind: FileKind,
    pub origin: TaskOrigin,
}

impl FileTask {
    pub fn is_in_place(&self) -> bool {
        self.origin == TaskOrigin::CrossRef
    }
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub markdown_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WalkOutput {
    pub tasks: Vec<FileTask>,
    pub warnings: Vec<String>,
}

/// Enumerate every file to migrate: the source tree first, then each cross-reference tree.
/// Each tree is sorted by relative path so runs are reproducible.
pub fn walk_tasks(paths: &ResolvedPaths, options: &WalkOptions) -> Result<WalkOutput> {
    let mut output = WalkOutput::default();

    let mut version_tasks = Vec::new();
    walk_tree(
        &paths.source_dir,
        TaskOrigin::Version,
        Some(&paths.target_dir),
        &[],
        options,
        &mut version_tasks,
        &mut output.warnings,
    )?;
    sort_tasks(&mut version_tasks);
    output.tasks.extend(version_tasks);

    // A version folder may live inside a cross-reference folder; it is never rewritten in place.
    let excluded = [paths.source_dir.as_path(), paths.target_dir.as_path()];
    for dir in &paths.cross_ref_dirs {
        let mut cross_ref_tasks = Vec::new();
        walk_tree(
            dir,
            TaskOrigin::CrossRef,
            None,
            &excluded,
            options,
            &mut cross_ref_tasks,
            &mut output.warnings,
        )?;
        sort_tasks(&mut cross_ref_tasks);
        output.tasks.extend(cross_ref_tasks);
    }

    Ok(output)
}

fn walk_tree(
    root: &Path,
    origin: TaskOrigin,
    target_root: Option<&Path>,
    excluded: &[&Path],
    options: &WalkOptions,
    out: &mut Vec<FileTask>,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|dir| entry.path().starts_with(dir)));
    for entry in walker {
        let entry = entry.map_err(|source| MigrateError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source,
        })?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let path = entry.path();
        let relative = relative_from_root(root, path)?;

        let kind = if file_type.is_symlink() {
            // Links are copied as their resolved bytes; directory links are not followed.
            match fs::metadata(path) {
                Ok(meta) if meta.is_dir() => {
                    warnings.push(format!("skipped symlinked directory {}", display_path(path)));
                    continue;
                }
                Ok(_) => FileKind::Raw,
                Err(_) => {
                    warnings.push(format!("skipped dangling symlink {}", display_path(path)));
                    continue;
                }
            }
        } else if is_markdown(path, &options.markdown_extensions) {
            FileKind::Markdown
        } else {
            FileKind::Raw
        };

        if origin == TaskOrigin::CrossRef && kind != FileKind::Markdown {
            continue;
        }

        let target_path = match target_root {
            Some(target_root) => join_relative(target_root, &relative),
            None => path.to_path_buf(),
        };
        debug!(path = %relative, ?kind, ?origin, "discovered file");
        out.push(FileTask {
            source_path: path.to_path_buf(),
            target_path,
            relative_path: relative,
            kind,
            origin,
        });
    }
    Ok(())
}

fn sort_tasks(tasks: &mut [FileTask]) {
    tasks.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
}

fn is_markdown(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| extensions.iter().any(|candidate| *candidate == ext))
}

fn relative_from_root(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        MigrateError::validation(format!(
            "failed to derive relative path from root {} for {}",
            display_path(root),
            display_path(path)
        ))
    })?;
    Ok(display_path(rel))
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let mut out = base.to_path_buf();
    for segment in relative.split('/') {
        if !segment.is_empty() {
            out.push(segment);
        }
    }
    out
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn display_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}
