use std::path::PathBuf;

use serde::Serialize;

use crate::filesystem::FileTask;
use crate::request::ConflictStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDecision {
    Overwrite,
    Skip,
    Abort,
}

/// What the run loop does after a file has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    AbortRun(PathBuf),
}

/// Decide the fate of a file whose target may already exist.
/// Without an existing target there is nothing to resolve and the file is written.
/// In-place rewrites of cross-reference files never conflict with themselves.
pub fn resolve_conflict(
    task: &FileTask,
    target_exists: bool,
    strategy: ConflictStrategy,
) -> ConflictDecision {
    if !target_exists || task.is_in_place() {
        return ConflictDecision::Overwrite;
    }
    match strategy {
        ConflictStrategy::SourceWins => ConflictDecision::Overwrite,
        ConflictStrategy::TargetWins => ConflictDecision::Skip,
        ConflictStrategy::Abort => ConflictDecision::Abort,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{ConflictDecision, resolve_conflict};
    use crate::filesystem::{FileKind, FileTask, TaskOrigin};
    use crate::request::ConflictStrategy;

    fn task(origin: TaskOrigin) -> FileTask {
        FileTask {
            source_path: PathBuf::from("docs/v0.1.0/guide.md"),
            target_path: PathBuf::from("docs/v1.0.0/guide.md"),
            relative_path: "guide.md".to_string(),
            kind: FileKind::Markdown,
            origin,
        }
    }

    #[test]
    fn missing_target_always_overwrites() {
        for strategy in [
            ConflictStrategy::SourceWins,
            ConflictStrategy::TargetWins,
            ConflictStrategy::Abort,
        ] {
            assert_eq!(
                resolve_conflict(&task(TaskOrigin::Version), false, strategy),
                ConflictDecision::Overwrite
            );
        }
    }

    #[test]
    fn existing_target_follows_strategy() {
        assert_eq!(
            resolve_conflict(&task(TaskOrigin::Version), true, ConflictStrategy::SourceWins),
            ConflictDecision::Overwrite
        );
        assert_eq!(
            resolve_conflict(&task(TaskOrigin::Version), true, ConflictStrategy::TargetWins),
            ConflictDecision::Skip
        );
        assert_eq!(
            resolve_conflict(&task(TaskOrigin::Version), true, ConflictStrategy::Abort),
            ConflictDecision::Abort
        );
    }

    #[test]
    fn in_place_rewrites_never_conflict() {
        assert_eq!(
            resolve_conflict(&task(TaskOrigin::CrossRef), true, ConflictStrategy::Abort),
            ConflictDecision::Overwrite
        );
    }
}
