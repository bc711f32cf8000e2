//! Confirmation for manual sends.

use async_trait::async_trait;
use pane_relay_core::{SessionId, TargetSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Answer to a confirmation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Confirmation {
    /// Go ahead with the send.
    Approved,
    /// Drop the send.
    Declined { reason: Option<String> },
}

/// Confirmation error.
#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("Confirmation service unavailable")]
    Unavailable,
    #[error("Confirmation request failed: {0}")]
    RequestFailed(String),
}

/// Asks the user before a manual send reaches several panes.
///
/// The relay crates provide the flow; the host provides the prompt.
#[async_trait]
pub trait DispatchConfirmer: Send + Sync {
    /// Confirm sending `command` from `parent` to `targets`.
    async fn confirm(
        &self,
        parent: SessionId,
        targets: &TargetSet,
        command: &str,
    ) -> Result<Confirmation, ConfirmError>;
}

/// Confirmer that approves everything.
#[derive(Debug, Default, Clone)]
pub struct AutoConfirm;

#[async_trait]
impl DispatchConfirmer for AutoConfirm {
    async fn confirm(
        &self,
        _parent: SessionId,
        _targets: &TargetSet,
        _command: &str,
    ) -> Result<Confirmation, ConfirmError> {
        Ok(Confirmation::Approved)
    }
}
