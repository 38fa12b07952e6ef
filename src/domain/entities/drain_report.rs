use super::conflict::ConflictAdvisory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one drain pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrainReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
    /// Connectivity dropped before every operation was attempted.
    pub interrupted: bool,
    pub purged: u64,
    pub advisories: Vec<ConflictAdvisory>,
    pub last_error: Option<String>,
}
