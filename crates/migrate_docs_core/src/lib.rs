pub mod config;
pub mod conflict;
pub mod error;
pub mod evolution;
pub mod filesystem;
pub mod frontmatter;
pub mod migrate;
pub mod request;
pub mod runtime;
pub mod transform;
pub mod writer;

pub use error::{MigrateError, Result};
pub use migrate::{MigrationReport, PlannedAction, PlannedChange, run_migration};
pub use request::{ConflictStrategy, DocVersion, MigrationRequest, RequestOptions};
