//! Data types for the migration engine.

use crate::library::{Chapter, Manga, MangaKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable handle to one item in a migration session.
///
/// Keys are minted when an item enters the session and never change, so a
/// client can keep referring to an item across search runs and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(Uuid);

impl ItemKey {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ItemKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Search status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationState {
    /// Not searched yet.
    Idle,
    /// A search task is in flight.
    Running,
    /// A replacement was found and recorded.
    Done,
    /// No candidate source produced a result.
    Failed,
}

impl MigrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Idle => "idle",
            MigrationState::Running => "running",
            MigrationState::Done => "done",
            MigrationState::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase the session as a whole is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Running,
    Done,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Done => "done",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A found replacement: the destination manga plus its chapter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub manga: Manga,
    pub chapters: Vec<Chapter>,
}

/// Outcome of searching all candidate sources for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Found(MatchResult),
    NotFound,
}

/// Outcome of one store subsystem for one migrated item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "detail")]
pub enum SubsystemOutcome {
    /// The subsystem's data was carried over.
    Migrated,
    /// There was nothing to carry over.
    Skipped,
    /// The subsystem's unit of work failed and was rolled back.
    Failed(String),
}

impl SubsystemOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SubsystemOutcome::Failed(_))
    }
}

/// Per-item result of the commit phase.
///
/// The three subsystems commit independently; one failing leaves the other
/// two in place, and the report records exactly which parts went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from: MangaKey,
    pub to: MangaKey,
    pub catalog: SubsystemOutcome,
    pub history: SubsystemOutcome,
    pub trackers: SubsystemOutcome,
}

impl MigrationReport {
    /// True when no subsystem failed.
    pub fn fully_migrated(&self) -> bool {
        !self.catalog.is_failed() && !self.history.is_failed() && !self.trackers.is_failed()
    }
}

/// Result of committing a whole session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub reports: Vec<MigrationReport>,
    /// Items that had no recorded match and were left untouched.
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_keys_are_unique() {
        assert_ne!(ItemKey::new(), ItemKey::new());
    }

    #[test]
    fn test_item_key_round_trips_through_display() {
        let key = ItemKey::new();
        let parsed: ItemKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MigrationState::Idle.is_terminal());
        assert!(!MigrationState::Running.is_terminal());
        assert!(MigrationState::Done.is_terminal());
        assert!(MigrationState::Failed.is_terminal());
    }

    #[test]
    fn test_subsystem_outcome_serde_shape() {
        let json = serde_json::to_value(SubsystemOutcome::Failed("db locked".into())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["detail"], "db locked");

        let json = serde_json::to_value(SubsystemOutcome::Migrated).unwrap();
        assert_eq!(json["status"], "migrated");
    }

    #[test]
    fn test_fully_migrated() {
        let report = MigrationReport {
            from: MangaKey::new("a", "1"),
            to: MangaKey::new("b", "2"),
            catalog: SubsystemOutcome::Migrated,
            history: SubsystemOutcome::Migrated,
            trackers: SubsystemOutcome::Skipped,
        };
        assert!(report.fully_migrated());

        let report = MigrationReport {
            trackers: SubsystemOutcome::Failed("boom".into()),
            ..report
        };
        assert!(!report.fully_migrated());
    }
}
