//! Collaborator traits and dispatch records.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::parser::TargetSet;

/// Session identifier.
pub type SessionId = Uuid;

/// Read-only view of workspace membership.
///
/// Must reflect membership at call time; callers take no snapshot.
pub trait PaneDirectory: Send + Sync {
    /// All panes of the workspace containing `pane`, in workspace order,
    /// `pane` included. `None` when `pane` belongs to no workspace.
    fn workspace_members(&self, pane: SessionId) -> Option<Vec<SessionId>>;

    /// Managed targets of `pane`, in the order they were chosen.
    fn managed_targets(&self, pane: SessionId) -> Vec<SessionId>;

    /// Display title of `pane`.
    fn title_of(&self, pane: SessionId) -> Option<String>;

    /// Panes sharing a workspace with `pane`, excluding `pane`.
    fn siblings(&self, pane: SessionId) -> Option<Vec<SessionId>> {
        self.workspace_members(pane)
            .map(|members| members.into_iter().filter(|id| *id != pane).collect())
    }
}

/// Writer error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session closed: {0}")]
    Closed(SessionId),
    #[error("Write timed out")]
    TimedOut,
    #[error("I/O error: {0}")]
    Io(String),
}

/// Capability to write text into a live session.
#[async_trait]
pub trait SessionWriter: Send + Sync {
    /// Write `data` to `target` as if it had been typed.
    async fn write(&self, target: SessionId, data: &str) -> Result<(), WriteError>;
}

/// Aggregate status of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Every target accepted the command.
    Success,
    /// Some targets failed.
    Partial,
    /// No target accepted the command.
    Failed,
}

impl DispatchStatus {
    /// Classify a settled dispatch.
    #[must_use]
    pub const fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }

    /// Upper-case label used in log summaries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

/// Success/failure partition of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success_pane_ids: Vec<SessionId>,
    pub failed_pane_ids: Vec<SessionId>,
}

impl DispatchOutcome {
    #[must_use]
    pub fn status(&self) -> DispatchStatus {
        DispatchStatus::from_counts(self.success_pane_ids.len(), self.failed_pane_ids.len())
    }

    /// Status line shown in the source pane once the dispatch settles.
    #[must_use]
    pub fn status_line(&self, command: &str) -> String {
        format!(
            "sent={} failed={} cmd=\"{command}\"",
            self.success_pane_ids.len(),
            self.failed_pane_ids.len()
        )
    }
}

/// Audit record of one dispatch. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchLog {
    pub id: Uuid,
    pub parent_pane_id: SessionId,
    pub target_pane_ids: Vec<SessionId>,
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub status: DispatchStatus,
    pub failed_pane_ids: Vec<SessionId>,
}

impl DispatchLog {
    /// Build the record for a settled dispatch.
    #[must_use]
    pub fn new(
        parent: SessionId,
        targets: &TargetSet,
        command: impl Into<String>,
        outcome: &DispatchOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_pane_id: parent,
            target_pane_ids: targets.to_vec(),
            command: command.into(),
            created_at: Utc::now(),
            status: outcome.status(),
            failed_pane_ids: outcome.failed_pane_ids.clone(),
        }
    }

    /// Ids that received the command.
    #[must_use]
    pub fn success_pane_ids(&self) -> Vec<SessionId> {
        self.target_pane_ids
            .iter()
            .filter(|id| !self.failed_pane_ids.contains(id))
            .copied()
            .collect()
    }

    /// One-line rendering: `[HH:MM:SS] STATUS (n): command`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} ({}): {}",
            self.created_at.with_timezone(&Local).format("%H:%M:%S"),
            self.status.label(),
            self.target_pane_ids.len(),
            self.command
        )
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Parent pane not found: {0}")]
    NotFound(SessionId),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Append-only store of dispatch records, grouped by parent pane.
#[async_trait]
pub trait DispatchLogStore: Send + Sync {
    /// Append one record under its parent.
    async fn append(&self, entry: DispatchLog) -> Result<(), StorageError>;

    /// Records for `parent`, most recent first, optionally truncated.
    async fn logs_for(
        &self,
        parent: SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<DispatchLog>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_counts() {
        assert_eq!(DispatchStatus::from_counts(3, 0), DispatchStatus::Success);
        assert_eq!(DispatchStatus::from_counts(2, 1), DispatchStatus::Partial);
        assert_eq!(DispatchStatus::from_counts(0, 2), DispatchStatus::Failed);
    }

    #[test]
    fn test_status_line() {
        let outcome = DispatchOutcome {
            success_pane_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            failed_pane_ids: vec![Uuid::new_v4()],
        };
        assert_eq!(outcome.status_line("ls -la"), "sent=2 failed=1 cmd=\"ls -la\"");
    }

    #[test]
    fn test_log_partition() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let targets = TargetSet::new([a, b, c]).unwrap();
        let outcome = DispatchOutcome {
            success_pane_ids: vec![a, c],
            failed_pane_ids: vec![b],
        };
        let log = DispatchLog::new(Uuid::new_v4(), &targets, "ls", &outcome);

        assert_eq!(log.status, DispatchStatus::Partial);
        assert_eq!(log.success_pane_ids(), vec![a, c]);
        assert!(log.summary().ends_with("PARTIAL (3): ls"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&DispatchStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
    }

    struct Fixed(Vec<SessionId>);

    impl PaneDirectory for Fixed {
        fn workspace_members(&self, pane: SessionId) -> Option<Vec<SessionId>> {
            self.0.contains(&pane).then(|| self.0.clone())
        }

        fn managed_targets(&self, _pane: SessionId) -> Vec<SessionId> {
            Vec::new()
        }

        fn title_of(&self, _pane: SessionId) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_siblings_exclude_self() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let dir = Fixed(vec![a, b]);
        assert_eq!(dir.siblings(a), Some(vec![b]));
        assert_eq!(dir.siblings(Uuid::new_v4()), None);
    }
}
