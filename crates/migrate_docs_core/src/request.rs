use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    #[default]
    SourceWins,
    TargetWins,
    Abort,
}

impl ConflictStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceWins => "source-wins",
            Self::TargetWins => "target-wins",
            Self::Abort => "abort",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "source-wins" => Some(Self::SourceWins),
            "target-wins" => Some(Self::TargetWins),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value).ok_or_else(|| {
            MigrateError::validation(format!(
                "unknown conflict strategy `{value}` (expected source-wins, target-wins or abort)"
            ))
        })
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version folder reference such as `v0.1.0` or `archived/v1.0.0`.
///
/// `path` is the folder relative to the docs root, `name` its last segment and
/// `number` the bare dotted version used by frontmatter and badges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocVersion {
    pub path: String,
    pub name: String,
    pub number: String,
}

impl DocVersion {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(MigrateError::validation("version folder must not be empty"));
        }
        if trimmed.contains('\\') {
            return Err(MigrateError::validation(format!(
                "version folder must use forward slashes: {value}"
            )));
        }
        if trimmed.starts_with('/') {
            return Err(MigrateError::validation(format!(
                "version folder must be relative to the docs root: {value}"
            )));
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(MigrateError::validation(format!(
                "version folder contains an invalid path segment: {value}"
            )));
        }

        let name = segments.last().copied().unwrap_or(trimmed).to_string();
        let number = match name.strip_prefix('v').or_else(|| name.strip_prefix('V')) {
            Some(rest) if is_dotted_numeric(rest) => rest.to_string(),
            _ => name.clone(),
        };

        Ok(Self {
            path: trimmed.to_string(),
            name,
            number,
        })
    }

    /// The form of this version that matches the style of `old_form` in `old`.
    pub fn counterpart<'a>(&'a self, old: &DocVersion, old_form: &str) -> Option<&'a str> {
        if old_form == old.name {
            Some(&self.name)
        } else if old_form == old.number {
            Some(&self.number)
        } else {
            None
        }
    }
}

impl fmt::Display for DocVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn is_dotted_numeric(value: &str) -> bool {
    !value.is_empty()
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()))
}

/// Validated inputs of a single invocation.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRequest {
    pub source: DocVersion,
    pub target: DocVersion,
    pub dry_run: bool,
    pub conflict_strategy: ConflictStrategy,
    pub delete_source: bool,
    pub strip_evolution: bool,
    pub skip_cross_refs: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub dry_run: bool,
    pub conflict_strategy: ConflictStrategy,
    pub delete_source: bool,
    pub strip_evolution: bool,
    pub skip_cross_refs: bool,
    pub verbose: bool,
}

impl MigrationRequest {
    pub fn new(source: &str, target: &str, options: RequestOptions) -> Result<Self> {
        let source = DocVersion::parse(source)?;
        let target = DocVersion::parse(target)?;
        if source.path == target.path {
            return Err(MigrateError::validation(format!(
                "source and target must differ (both are `{}`)",
                source.path
            )));
        }
        Ok(Self {
            source,
            target,
            dry_run: options.dry_run,
            conflict_strategy: options.conflict_strategy,
            delete_source: options.delete_source,
            strip_evolution: options.strip_evolution,
            skip_cross_refs: options.skip_cross_refs,
            verbose: options.verbose,
        })
    }
}
