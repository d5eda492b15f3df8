use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

pub const CONFIG_FILENAME: &str = ".migrate-docs.toml";
pub const DEFAULT_LINK_PREFIX: &str = "/docs";
pub const DEFAULT_CROSS_REF_DIRS: &[&str] = &["drafts", "proposals"];
pub const DEFAULT_MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

pub const ENV_DOCS_ROOT: &str = "MIGRATE_DOCS_ROOT";
pub const ENV_LINK_PREFIX: &str = "MIGRATE_DOCS_LINK_PREFIX";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateConfig {
    #[serde(default)]
    pub docs: DocsSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DocsSection {
    pub root: Option<PathBuf>,
    pub cross_ref_dirs: Option<Vec<String>>,
    pub link_prefix: Option<String>,
    pub markdown_extensions: Option<Vec<String>>,
}

impl MigrateConfig {
    /// Docs root from the config file. A relative value is taken relative to the
    /// config file's directory.
    pub fn docs_root(&self, config_path: &Path) -> Option<PathBuf> {
        let root = self.docs.root.as_ref()?;
        if root.is_absolute() {
            return Some(root.clone());
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(root))
    }

    /// Resolve link prefix: env > config > `/docs`. Always starts with `/`, never ends with one.
    pub fn link_prefix(&self) -> String {
        self.link_prefix_with(|key| env::var(key).ok())
    }

    pub fn link_prefix_with(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        let raw = non_empty(lookup(ENV_LINK_PREFIX))
            .or_else(|| non_empty(self.docs.link_prefix.clone()))
            .unwrap_or_else(|| DEFAULT_LINK_PREFIX.to_string());
        let trimmed = raw.trim_matches('/');
        format!("/{trimmed}")
    }

    pub fn cross_ref_dirs(&self) -> Vec<String> {
        match &self.docs.cross_ref_dirs {
            Some(dirs) => dirs
                .iter()
                .map(|dir| dir.trim().trim_matches('/').to_string())
                .filter(|dir| !dir.is_empty())
                .collect(),
            None => DEFAULT_CROSS_REF_DIRS
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
        }
    }

    pub fn markdown_extensions(&self) -> Vec<String> {
        match &self.docs.markdown_extensions {
            Some(extensions) => extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            None => DEFAULT_MARKDOWN_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    pub fn validate(&self, config_path: &Path) -> Result<()> {
        for dir in self.cross_ref_dirs() {
            if dir.split('/').any(|segment| segment == "..") || Path::new(&dir).is_absolute() {
                return Err(MigrateError::Config {
                    path: config_path.to_path_buf(),
                    message: format!("cross_ref_dirs entry escapes the docs root: {dir}"),
                });
            }
        }
        if self.markdown_extensions().is_empty() {
            return Err(MigrateError::Config {
                path: config_path.to_path_buf(),
                message: "markdown_extensions must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Load and parse a MigrateConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MigrateConfig> {
    if !config_path.exists() {
        return Ok(MigrateConfig::default());
    }
    let content =
        fs::read_to_string(config_path).map_err(|source| MigrateError::io(config_path, source))?;
    let parsed: MigrateConfig = toml::from_str(&content).map_err(|error| MigrateError::Config {
        path: config_path.to_path_buf(),
        message: format!("failed to parse: {}", error.message()),
    })?;
    parsed.validate(config_path)?;
    Ok(parsed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
