use std::env;
use std::path::{Component, Path, PathBuf};

use crate::config::{CONFIG_FILENAME, ENV_DOCS_ROOT, MigrateConfig};
use crate::error::{MigrateError, Result};
use crate::request::{DocVersion, MigrationRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub docs_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().map_err(|source| MigrateError::io(".", source))?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub docs_root: PathBuf,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub cross_ref_dirs: Vec<PathBuf>,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        let cross_refs = if self.cross_ref_dirs.is_empty() {
            "<none>".to_string()
        } else {
            self.cross_ref_dirs
                .iter()
                .map(|dir| normalize_for_display(dir))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "docs_root={} ({})\nsource_dir={}\ntarget_dir={}\ncross_ref_dirs={}\nconfig_path={} ({})",
            normalize_for_display(&self.docs_root),
            self.root_source.as_str(),
            normalize_for_display(&self.source_dir),
            normalize_for_display(&self.target_dir),
            cross_refs,
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

/// Config file location: `--config` flag, else `<cwd>/.migrate-docs.toml`.
pub fn resolve_config_path(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> (PathBuf, ValueSource) {
    match overrides.config.as_deref() {
        Some(path) => (absolutize(path, &context.cwd), ValueSource::Flag),
        None => (context.cwd.join(CONFIG_FILENAME), ValueSource::Default),
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    config: &MigrateConfig,
    request: &MigrationRequest,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, config, request, |key| {
        env::var(key).ok()
    })
}

pub fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    config: &MigrateConfig,
    request: &MigrationRequest,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (config_path, config_source) = resolve_config_path(context, overrides);
    let (docs_root, root_source) =
        resolve_docs_root(context, overrides, config, &config_path, &request.source, &lookup_env);

    let source_dir = version_dir(&docs_root, &request.source);
    let target_dir = version_dir(&docs_root, &request.target);

    if !source_dir.is_dir() {
        return Err(MigrateError::NotFound { path: source_dir });
    }

    let normalized_source = normalize_pathbuf(&source_dir);
    let normalized_target = normalize_pathbuf(&target_dir);
    if normalized_target.starts_with(&normalized_source)
        || normalized_source.starts_with(&normalized_target)
    {
        return Err(MigrateError::validation(format!(
            "source and target folders must not be nested: {} / {}",
            normalize_for_display(&source_dir),
            normalize_for_display(&target_dir)
        )));
    }

    let cross_ref_dirs = if request.skip_cross_refs {
        Vec::new()
    } else {
        config
            .cross_ref_dirs()
            .iter()
            .map(|dir| join_segments(&docs_root, dir))
            .filter(|dir| dir.is_dir())
            .filter(|dir| {
                let normalized = normalize_pathbuf(dir);
                !normalized.starts_with(&normalized_source)
                    && !normalized.starts_with(&normalized_target)
            })
            .collect()
    };

    Ok(ResolvedPaths {
        docs_root,
        source_dir,
        target_dir,
        cross_ref_dirs,
        config_path,
        root_source,
        config_source,
    })
}

fn resolve_docs_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    config: &MigrateConfig,
    config_path: &Path,
    source: &DocVersion,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.docs_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    let from_env = lookup_env(ENV_DOCS_ROOT)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(value) = from_env {
        return (absolutize(Path::new(&value), &context.cwd), ValueSource::Env);
    }

    if let Some(root) = config.docs_root(config_path) {
        return (absolutize(&root, &context.cwd), ValueSource::Config);
    }

    for candidate in [context.cwd.clone(), context.cwd.join("docs")] {
        if version_dir(&candidate, source).is_dir() {
            return (candidate, ValueSource::Heuristic);
        }
    }
    (context.cwd.clone(), ValueSource::Default)
}

fn version_dir(docs_root: &Path, version: &DocVersion) -> PathBuf {
    join_segments(docs_root, &version.path)
}

fn join_segments(base: &Path, relative: &str) -> PathBuf {
    let mut out = base.to_path_buf();
    for segment in relative.split('/') {
        if !segment.is_empty() {
            out.push(segment);
        }
    }
    out
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub(crate) fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
