//! Append-only history of optimization and scaling outcomes
//!
//! Entries are never updated or deleted. Two stores are provided:
//! an in-memory store for tests and ephemeral deployments, and a
//! JSON-lines file store that survives restarts.

mod jsonl;
mod memory;

pub use jsonl::JsonlHistoryStore;
pub use memory::InMemoryHistoryStore;

use crate::models::{ActionStatus, OptimizationAction, ScalingAction};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one optimization action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: OptimizationAction,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rollback_attempted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A single history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Optimization(ActionRecord),
    Scaling(ScalingAction),
}

impl HistoryEntry {
    /// When the entry reached its terminal state
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HistoryEntry::Optimization(record) => record.finished_at,
            HistoryEntry::Scaling(action) => action
                .execution_details
                .finished_at
                .unwrap_or(action.created_at),
        }
    }

    pub fn as_optimization(&self) -> Option<&ActionRecord> {
        match self {
            HistoryEntry::Optimization(record) => Some(record),
            HistoryEntry::Scaling(_) => None,
        }
    }

    pub fn as_scaling(&self) -> Option<&ScalingAction> {
        match self {
            HistoryEntry::Scaling(action) => Some(action),
            HistoryEntry::Optimization(_) => None,
        }
    }
}

/// Durable, append-only record of terminal outcomes
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one entry
    async fn append(&self, entry: HistoryEntry) -> Result<()>;

    /// Entries whose timestamp falls in `[from, to]`, oldest first
    async fn query_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>>;

    /// The most recent `limit` entries, oldest first
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Number of stored entries
    async fn len(&self) -> Result<usize>;
}
