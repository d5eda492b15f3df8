use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Dry run: the mutation was planned but the filesystem was not touched.
    Planned,
}

/// Every filesystem mutation of a run goes through this type. In dry-run mode
/// none of its operations reach the filesystem.
#[derive(Debug, Clone, Copy)]
pub struct Writer {
    dry_run: bool,
}

impl Writer {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn write_text(&self, path: &Path, content: &str) -> Result<WriteOutcome> {
        self.mutate(|| {
            ensure_parent_dir(path)?;
            fs::write(path, content).map_err(|source| MigrateError::io(path, source))
        })
    }

    /// Byte copy. Symlinks are read through, so the target gets a regular file.
    pub fn copy_raw(&self, source: &Path, target: &Path) -> Result<WriteOutcome> {
        self.mutate(|| {
            let bytes = fs::read(source).map_err(|error| MigrateError::io(source, error))?;
            ensure_parent_dir(target)?;
            fs::write(target, bytes).map_err(|error| MigrateError::io(target, error))
        })
    }

    pub fn remove_tree(&self, dir: &Path) -> Result<WriteOutcome> {
        self.mutate(|| {
            debug!(path = %dir.display(), "removing source tree");
            fs::remove_dir_all(dir).map_err(|source| MigrateError::io(dir, source))
        })
    }

    fn mutate(&self, operation: impl FnOnce() -> Result<()>) -> Result<WriteOutcome> {
        if self.dry_run {
            return Ok(WriteOutcome::Planned);
        }
        operation()?;
        Ok(WriteOutcome::Written)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|source| MigrateError::io(parent, source))
}
