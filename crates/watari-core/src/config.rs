//! Centralized configuration for the Watari engine.
//!
//! This module provides configuration constants for source network calls, the
//! library store, and event delivery, plus the per-session migration options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network-related configuration for source calls.
pub struct SearchConfig;

impl SearchConfig {
    /// Deadline applied to every individual source call (search, details,
    /// chapter list) during the match phase.
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = concat!("watari/", env!("CARGO_PKG_VERSION"));
    /// Maximum search results requested per source per query.
    pub const PAGE_LIMIT: u32 = 20;
}

/// Library store configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const DB_FILENAME: &'static str = "library.db";
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Event delivery configuration.
pub struct EventConfig;

impl EventConfig {
    /// Broadcast channel capacity; slow subscribers past this lag drop events.
    pub const CHANNEL_CAPACITY: usize = 256;
}

/// How a replacement is chosen among a source's search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStrategy {
    /// Take the first result of the first source that returns any, in the
    /// user's source order.
    #[default]
    FirstAlternative,
}

/// Per-session migration options.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub strategy: MigrationStrategy,
    /// Deadline for each individual source call during the match phase.
    pub call_timeout: Duration,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            strategy: MigrationStrategy::default(),
            call_timeout: SearchConfig::CALL_TIMEOUT,
        }
    }
}

impl MigrationOptions {
    pub fn with_strategy(mut self, strategy: MigrationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}
