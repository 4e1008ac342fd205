//! The migration engine: candidate search, state tracking, and commit.

mod coordinator;
pub mod executor;
pub mod matcher;
pub mod session;
pub mod types;

pub use executor::MigrationExecutor;
pub use matcher::MatchEngine;
pub use session::{ItemStatus, MigrationSession};
pub use types::{
    ItemKey, MatchOutcome, MatchResult, MigrationReport, MigrationState, MigrationSummary,
    SessionState, SubsystemOutcome,
};
