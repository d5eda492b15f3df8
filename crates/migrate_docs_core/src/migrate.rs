use std::fs;
use std::io;

use serde::Serialize;
use sha2::{Digest, Sha256};
use similar::TextDiff;
use tracing::{debug, info};

use crate::config::MigrateConfig;
use crate::conflict::{ConflictDecision, Flow, resolve_conflict};
use crate::error::{MigrateError, Result};
use crate::filesystem::{FileKind, FileTask, TaskOrigin, WalkOptions, walk_tasks};
use crate::request::MigrationRequest;
use crate::runtime::{ResolvedPaths, normalize_for_display};
use crate::transform::{TransformOptions, Transformer};
use crate::writer::{WriteOutcome, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    Create,
    Overwrite,
    Skip,
    RewriteInPlace,
}

impl PlannedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::RewriteInPlace => "rewrite",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub relative_path: String,
    pub target_path: String,
    pub origin: TaskOrigin,
    pub kind: FileKind,
    pub action: PlannedAction,
    pub changed: bool,
    pub rules_applied: Vec<&'static str>,
    /// Hash of the content that is (or would be) written.
    pub content_hash: Option<String>,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub source: String,
    pub target: String,
    pub dry_run: bool,
    pub scanned: usize,
    pub changed: usize,
    pub written: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub unchanged: usize,
    pub copied: usize,
    pub changes: Vec<PlannedChange>,
    pub warnings: Vec<String>,
    pub source_deleted: bool,
    pub source_delete_planned: bool,
}

impl MigrationReport {
    fn new(request: &MigrationRequest) -> Self {
        Self {
            source: request.source.path.clone(),
            target: request.target.path.clone(),
            dry_run: request.dry_run,
            scanned: 0,
            changed: 0,
            written: 0,
            skipped: 0,
            conflicts: 0,
            unchanged: 0,
            copied: 0,
            changes: Vec::new(),
            warnings: Vec::new(),
            source_deleted: false,
            source_delete_planned: false,
        }
    }
}

/// Promote the source version folder to the target folder.
///
/// Files are handled one at a time in walk order. A conflict under the `abort`
/// strategy stops the run with [`MigrateError::ConflictAbort`]; files written
/// before that point stay in place. The source tree is only removed after every
/// file was handled successfully.
pub fn run_migration(
    request: &MigrationRequest,
    paths: &ResolvedPaths,
    config: &MigrateConfig,
) -> Result<MigrationReport> {
    let transformer = Transformer::new(TransformOptions {
        old: request.source.clone(),
        new: request.target.clone(),
        strip_evolution: request.strip_evolution,
        link_prefix: config.link_prefix(),
    })?;
    let walk = walk_tasks(
        paths,
        &WalkOptions {
            markdown_extensions: config.markdown_extensions(),
        },
    )?;

    let writer = Writer::new(request.dry_run);
    let mut report = MigrationReport::new(request);
    report.scanned = walk.tasks.len();
    report.warnings.extend(walk.warnings);

    for task in &walk.tasks {
        match migrate_file(task, request, &transformer, &writer, &mut report)? {
            Flow::Continue => {}
            Flow::AbortRun(path) => return Err(MigrateError::ConflictAbort { path }),
        }
    }

    if request.delete_source {
        match writer.remove_tree(&paths.source_dir)? {
            WriteOutcome::Written => {
                info!(path = %normalize_for_display(&paths.source_dir), "deleted source tree");
                report.source_deleted = true;
            }
            WriteOutcome::Planned => report.source_delete_planned = true,
        }
    }

    Ok(report)
}

fn migrate_file(
    task: &FileTask,
    request: &MigrationRequest,
    transformer: &Transformer,
    writer: &Writer,
    report: &mut MigrationReport,
) -> Result<Flow> {
    let payload = load_payload(task, transformer, report)?;

    let target_exists = fs::symlink_metadata(&task.target_path).is_ok();
    if target_exists && !task.is_in_place() {
        report.conflicts += 1;
    }

    let decision = resolve_conflict(task, target_exists, request.conflict_strategy);
    if decision == ConflictDecision::Abort {
        info!(path = %task.relative_path, "target exists; aborting");
        return Ok(Flow::AbortRun(task.target_path.clone()));
    }

    if payload.changed {
        report.changed += 1;
    } else if payload.text.is_some() {
        report.unchanged += 1;
    }

    let action = match decision {
        ConflictDecision::Skip => PlannedAction::Skip,
        _ if task.is_in_place() => PlannedAction::RewriteInPlace,
        _ if target_exists => PlannedAction::Overwrite,
        _ => PlannedAction::Create,
    };

    if action == PlannedAction::RewriteInPlace && !payload.changed {
        debug!(path = %task.relative_path, "cross-reference file unchanged");
        return Ok(Flow::Continue);
    }

    if action == PlannedAction::Skip {
        report.skipped += 1;
    } else {
        let outcome = match &payload.text {
            Some(text) => writer.write_text(&task.target_path, &text.transformed)?,
            None => {
                report.copied += 1;
                writer.copy_raw(&task.source_path, &task.target_path)?
            }
        };
        if outcome == WriteOutcome::Written {
            report.written += 1;
        }
    }

    info!(path = %task.relative_path, action = action.as_str(), "processed file");
    report.changes.push(PlannedChange {
        relative_path: task.relative_path.clone(),
        target_path: normalize_for_display(&task.target_path),
        origin: task.origin,
        kind: payload.kind,
        action,
        changed: payload.changed,
        rules_applied: payload.rules_applied,
        content_hash: payload.text.as_ref().map(|text| compute_hash(&text.transformed)),
        diff: payload
            .text
            .as_ref()
            .filter(|_| payload.changed && action != PlannedAction::Skip)
            .map(|text| unified_diff(&task.relative_path, &text.original, &text.transformed)),
    });

    Ok(Flow::Continue)
}

struct TextPayload {
    original: String,
    transformed: String,
}

struct Payload {
    kind: FileKind,
    /// `None` for raw files, which are copied byte for byte.
    text: Option<TextPayload>,
    changed: bool,
    rules_applied: Vec<&'static str>,
}

fn load_payload(
    task: &FileTask,
    transformer: &Transformer,
    report: &mut MigrationReport,
) -> Result<Payload> {
    let raw = Payload {
        kind: FileKind::Raw,
        text: None,
        changed: false,
        rules_applied: Vec::new(),
    };
    if task.kind == FileKind::Raw {
        return Ok(raw);
    }

    let content = match fs::read_to_string(&task.source_path) {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::InvalidData => {
            report.warnings.push(format!(
                "{}: not valid UTF-8; copied without rewriting",
                task.relative_path
            ));
            return Ok(raw);
        }
        Err(error) => return Err(MigrateError::io(&task.source_path, error)),
    };

    let result = transformer.transform(&content);
    for warning in &result.warnings {
        report
            .warnings
            .push(format!("{}: {warning}", task.relative_path));
    }
    Ok(Payload {
        kind: FileKind::Markdown,
        changed: result.changed,
        rules_applied: result.rules_applied,
        text: Some(TextPayload {
            original: result.original_content,
            transformed: result.transformed_content,
        }),
    })
}

fn unified_diff(relative_path: &str, original: &str, transformed: &str) -> String {
    TextDiff::from_lines(original, transformed)
        .unified_diff()
        .context_radius(2)
        .header(&format!("a/{relative_path}"), &format!("b/{relative_path}"))
        .to_string()
}

fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::{TempDir, tempdir};

    use super::{PlannedAction, run_migration};
    use crate::config::MigrateConfig;
    use crate::error::MigrateError;
    use crate::filesystem::TaskOrigin;
    use crate::request::{ConflictStrategy, MigrationRequest, RequestOptions};
    use crate::runtime::{
        PathOverrides, ResolutionContext, ResolvedPaths, resolve_paths_with_lookup,
    };

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    fn fixture() -> TempDir {
        let temp = tempdir().expect("tempdir");
        let docs = temp.path().join("docs");
        write(
            &docs.join("v0.1.0/index.md"),
            "---\nversion: 0.1.0\ntags: [core, v0.1.0]\n---\n# Dispatcher v0.1.0\n\nSee [guide](/docs/v0.1.0/guide.md).\n",
        );
        write(&docs.join("v0.1.0/guide.md"), "Plain guide.\n");
        write(&docs.join("v0.1.0/img/logo.png"), "\u{1}PNG");
        write(
            &docs.join("drafts/idea.md"),
            "Builds on [index](../v0.1.0/index.md).\n",
        );
        write(&docs.join("drafts/unrelated.md"), "Nothing here.\n");
        temp
    }

    fn request(source: &str, target: &str, options: RequestOptions) -> MigrationRequest {
        MigrationRequest::new(source, target, options).expect("valid request")
    }

    fn paths(temp: &TempDir, request: &MigrationRequest) -> ResolvedPaths {
        let context = ResolutionContext {
            cwd: temp.path().to_path_buf(),
        };
        resolve_paths_with_lookup(
            &context,
            &PathOverrides::default(),
            &MigrateConfig::default(),
            request,
            |_| None,
        )
        .expect("resolve paths")
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut entries: Vec<(PathBuf, Vec<u8>)> = walkdir::WalkDir::new(root)
            .into_iter()
            .map(|entry| entry.expect("walk entry"))
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                (
                    entry.path().to_path_buf(),
                    fs::read(entry.path()).expect("read"),
                )
            })
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn migrates_tree_and_rewrites_references() {
        let temp = fixture();
        let request = request("v0.1.0", "v1.0.0", RequestOptions::default());
        let paths = paths(&temp, &request);

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        let docs = temp.path().join("docs");
        let index = fs::read_to_string(docs.join("v1.0.0/index.md")).expect("read index");
        assert_eq!(
            index,
            "---\nversion: 1.0.0\ntags: [core, v1.0.0]\n---\n# Dispatcher v1.0.0\n\nSee [guide](/docs/v1.0.0/guide.md).\n"
        );
        assert_eq!(
            fs::read(docs.join("v1.0.0/img/logo.png")).expect("read logo"),
            "\u{1}PNG".as_bytes()
        );
        assert_eq!(
            fs::read_to_string(docs.join("drafts/idea.md")).expect("read draft"),
            "Builds on [index](../v1.0.0/index.md).\n"
        );
        assert!(docs.join("v0.1.0/index.md").exists());

        assert_eq!(report.scanned, 5);
        assert_eq!(report.copied, 1);
        assert_eq!(report.changed, 2);
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.written, 4);
        assert_eq!(report.conflicts, 0);
        assert!(!report.source_deleted);
        assert!(
            report
                .changes
                .iter()
                .any(|change| change.origin == TaskOrigin::CrossRef
                    && change.action == PlannedAction::RewriteInPlace)
        );
        assert!(
            !report
                .changes
                .iter()
                .any(|change| change.relative_path == "unrelated.md")
        );
    }

    #[test]
    fn dry_run_leaves_tree_untouched_and_reports_changes() {
        let temp = fixture();
        let request = request(
            "v0.1.0",
            "v1.0.0",
            RequestOptions {
                dry_run: true,
                delete_source: true,
                ..RequestOptions::default()
            },
        );
        let paths = paths(&temp, &request);
        let before = snapshot(temp.path());

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        assert_eq!(snapshot(temp.path()), before);
        assert_eq!(report.written, 0);
        assert!(report.source_delete_planned);
        assert!(!report.source_deleted);
        let index = report
            .changes
            .iter()
            .find(|change| change.relative_path == "index.md")
            .expect("index change");
        assert!(index.changed);
        let diff = index.diff.as_deref().expect("diff");
        assert!(diff.contains("-version: 0.1.0"));
        assert!(diff.contains("+version: 1.0.0"));
    }

    #[test]
    fn conflict_strategies_decide_existing_targets() {
        for (strategy, expected) in [
            (ConflictStrategy::SourceWins, "Plain guide.\n"),
            (ConflictStrategy::TargetWins, "existing\n"),
        ] {
            let temp = fixture();
            write(&temp.path().join("docs/v1.0.0/guide.md"), "existing\n");
            let request = request(
                "v0.1.0",
                "v1.0.0",
                RequestOptions {
                    conflict_strategy: strategy,
                    ..RequestOptions::default()
                },
            );
            let paths = paths(&temp, &request);

            let report =
                run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

            assert_eq!(report.conflicts, 1);
            assert_eq!(
                fs::read_to_string(temp.path().join("docs/v1.0.0/guide.md")).expect("read"),
                expected
            );
            assert_eq!(
                report.skipped,
                usize::from(strategy == ConflictStrategy::TargetWins)
            );
        }
    }

    #[test]
    fn abort_stops_run_and_keeps_prior_writes() {
        let temp = fixture();
        write(&temp.path().join("docs/v1.0.0/img/logo.png"), "existing");
        let request = request(
            "v0.1.0",
            "v1.0.0",
            RequestOptions {
                conflict_strategy: ConflictStrategy::Abort,
                delete_source: true,
                ..RequestOptions::default()
            },
        );
        let paths = paths(&temp, &request);

        let error = run_migration(&request, &paths, &MigrateConfig::default())
            .expect_err("conflict aborts");

        assert!(matches!(error, MigrateError::ConflictAbort { .. }));
        assert_eq!(error.exit_code(), 2);
        let docs = temp.path().join("docs");
        // walk order: guide.md, img/logo.png, index.md, then drafts/
        assert!(docs.join("v1.0.0/guide.md").exists());
        assert_eq!(
            fs::read(docs.join("v1.0.0/img/logo.png")).expect("read"),
            b"existing"
        );
        assert!(!docs.join("v1.0.0/index.md").exists());
        assert_eq!(
            fs::read_to_string(docs.join("drafts/idea.md")).expect("read draft"),
            "Builds on [index](../v0.1.0/index.md).\n"
        );
        assert!(docs.join("v0.1.0").exists());
    }

    #[test]
    fn version_folder_inside_cross_ref_folder_is_left_alone() {
        let temp = tempdir().expect("tempdir");
        write(&temp.path().join("drafts/v0.1.0/a.md"), "As of v0.1.0\n");
        write(&temp.path().join("drafts/idea.md"), "See ../v0.1.0/a.md\n");
        let request = request("drafts/v0.1.0", "v1.0.0", RequestOptions::default());
        let paths = paths(&temp, &request);

        run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        assert_eq!(
            fs::read_to_string(temp.path().join("drafts/v0.1.0/a.md")).expect("read source"),
            "As of v0.1.0\n"
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("v1.0.0/a.md")).expect("read target"),
            "As of v1.0.0\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_does_not_fail_the_run() {
        let temp = fixture();
        let docs = temp.path().join("docs");
        std::os::unix::fs::symlink(docs.join("gone.md"), docs.join("v0.1.0/link.md"))
            .expect("dangling symlink");
        let request = request("v0.1.0", "v1.0.0", RequestOptions::default());
        let paths = paths(&temp, &request);

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        assert!(docs.join("v1.0.0/index.md").exists());
        assert!(fs::symlink_metadata(docs.join("v1.0.0/link.md")).is_err());
        assert!(
            report
                .warnings
                .iter()
                .any(|warning| warning.starts_with("skipped dangling symlink"))
        );
    }

    #[test]
    fn delete_source_runs_after_success_only() {
        let temp = fixture();
        let request = request(
            "v0.1.0",
            "archived/v1.0.0",
            RequestOptions {
                delete_source: true,
                ..RequestOptions::default()
            },
        );
        let paths = paths(&temp, &request);

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        let docs = temp.path().join("docs");
        assert!(report.source_deleted);
        assert!(!docs.join("v0.1.0").exists());
        assert!(docs.join("archived/v1.0.0/index.md").exists());
        assert!(docs.join("drafts/idea.md").exists());
    }

    #[test]
    fn write_failure_keeps_source_tree() {
        let temp = fixture();
        // a file where the target's img/ directory needs to go
        write(&temp.path().join("docs/v1.0.0/img"), "blocker");
        let request = request(
            "v0.1.0",
            "v1.0.0",
            RequestOptions {
                delete_source: true,
                ..RequestOptions::default()
            },
        );
        let paths = paths(&temp, &request);

        let error = run_migration(&request, &paths, &MigrateConfig::default())
            .expect_err("write fails");

        assert_eq!(error.exit_code(), 3);
        assert!(temp.path().join("docs/v0.1.0/index.md").exists());
    }

    #[test]
    fn strip_evolution_removes_markers_and_evolves_to() {
        let temp = tempdir().expect("tempdir");
        write(
            &temp.path().join("v0.1.0/a.md"),
            "---\nversion: v0.1.0\nevolves-to: v0.2.0/a.md\n---\nBody.\n\n:::planned\nComing in v0.2.0\n:::\n",
        );
        let request = request(
            "v0.1.0",
            "v1.0.0",
            RequestOptions {
                strip_evolution: true,
                ..RequestOptions::default()
            },
        );
        let paths = paths(&temp, &request);

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        assert_eq!(
            fs::read_to_string(temp.path().join("v1.0.0/a.md")).expect("read"),
            "---\nversion: v1.0.0\n---\nBody.\n\n"
        );
        let change = &report.changes[0];
        assert!(change.rules_applied.contains(&"frontmatter-evolves-to"));
        assert!(change.rules_applied.contains(&"evolution"));
    }

    #[test]
    fn report_serializes_with_snake_case_actions() {
        let temp = fixture();
        let request = request(
            "v0.1.0",
            "v1.0.0",
            RequestOptions {
                dry_run: true,
                ..RequestOptions::default()
            },
        );
        let paths = paths(&temp, &request);

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");
        let value = serde_json::to_value(&report).expect("serialize report");

        assert_eq!(value["dry_run"], true);
        let actions: Vec<&str> = value["changes"]
            .as_array()
            .expect("changes")
            .iter()
            .filter_map(|change| change["action"].as_str())
            .collect();
        assert!(actions.contains(&"create"));
        assert!(actions.contains(&"rewrite_in_place"));
        assert_eq!(value["changes"][0]["origin"], "version");
    }

    #[test]
    fn malformed_frontmatter_is_reported_as_warning() {
        let temp = tempdir().expect("tempdir");
        write(
            &temp.path().join("v0.1.0/broken.md"),
            "---\nversion: 0.1.0\nno closing delimiter v0.1.0\n",
        );
        let request = request("v0.1.0", "v1.0.0", RequestOptions::default());
        let paths = paths(&temp, &request);

        let report =
            run_migration(&request, &paths, &MigrateConfig::default()).expect("migration");

        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("broken.md: "));
        assert_eq!(
            fs::read_to_string(temp.path().join("v1.0.0/broken.md")).expect("read"),
            "---\nversion: 0.1.0\nno closing delimiter v1.0.0\n"
        );
    }
}
