//! Fan-out of one relay command to its targets.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use pane_relay_core::{
    DispatchLog, DispatchLogStore, DispatchOutcome, OutputHistory, PaneDirectory,
    ParsedRelayCommand, RelayConfig, SessionId, SessionWriter, TargetSet, traits::WriteError,
};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::confirm::ConfirmError;

/// Status line shown when a dispatch could not run at all.
pub const DISPATCH_FAILED: &str = "dispatch failed";

/// Dispatch error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Parent pane is not in any workspace: {0}")]
    UnknownParent(SessionId),
    #[error("Command is empty")]
    EmptyCommand,
    #[error("No target panes")]
    NoTargets,
    #[error("Send declined{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Declined(Option<String>),
    #[error("Confirmation error: {0}")]
    Confirm(#[from] ConfirmError),
}

/// Delivers relay commands and records one audit entry per dispatch.
///
/// Delivery is best effort: every target is written independently and a
/// failing target never stops the others.
#[derive(Clone)]
pub struct DispatchOrchestrator {
    writer: Arc<dyn SessionWriter>,
    logs: Arc<dyn DispatchLogStore>,
    directory: Arc<dyn PaneDirectory>,
    line_ending: Arc<str>,
    write_timeout: Option<Duration>,
}

impl DispatchOrchestrator {
    /// Create an orchestrator terminating commands with `\r`.
    #[must_use]
    pub fn new(
        writer: Arc<dyn SessionWriter>,
        logs: Arc<dyn DispatchLogStore>,
        directory: Arc<dyn PaneDirectory>,
    ) -> Self {
        Self {
            writer,
            logs,
            directory,
            line_ending: Arc::from("\r"),
            write_timeout: None,
        }
    }

    /// Apply line ending and write timeout from `config`.
    #[must_use]
    pub fn with_config(self, config: &RelayConfig) -> Self {
        self.with_line_ending(config.dispatch_line_ending.as_str())
            .with_write_timeout(config.write_timeout())
    }

    #[must_use]
    pub fn with_line_ending(mut self, line_ending: &str) -> Self {
        self.line_ending = Arc::from(line_ending);
        self
    }

    /// Treat a write that takes longer than `timeout` as failed.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn PaneDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn logs(&self) -> &Arc<dyn DispatchLogStore> {
        &self.logs
    }

    /// Write `command` to every target and record the result.
    ///
    /// Target order is kept in both result lists.
    ///
    /// # Errors
    /// Returns error if `parent` is in no workspace or `command` is blank.
    /// Per-target failures are part of the outcome, not errors.
    pub async fn dispatch(
        &self,
        parent: SessionId,
        targets: &TargetSet,
        command: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        if self.directory.workspace_members(parent).is_none() {
            return Err(DispatchError::UnknownParent(parent));
        }
        if command.trim().is_empty() {
            return Err(DispatchError::EmptyCommand);
        }

        let payload = format!("{command}{}", self.line_ending);
        let writes = targets.iter().map(|&target| {
            let payload = payload.as_str();
            async move { (target, self.write_one(target, payload).await) }
        });

        let mut outcome = DispatchOutcome::default();
        for (target, result) in join_all(writes).await {
            match result {
                Ok(()) => outcome.success_pane_ids.push(target),
                Err(e) => {
                    tracing::warn!(%parent, %target, "Relay write failed: {e}");
                    outcome.failed_pane_ids.push(target);
                }
            }
        }

        let status = outcome.status();
        let entry = DispatchLog::new(parent, targets, command, &outcome);
        if let Err(e) = self.logs.append(entry).await {
            tracing::error!(%parent, "Failed to record dispatch: {e}");
        }

        tracing::info!(
            %parent,
            status = status.label(),
            sent = outcome.success_pane_ids.len(),
            failed = outcome.failed_pane_ids.len(),
            command,
            "Dispatch settled"
        );
        Ok(outcome)
    }

    /// Dispatch a parsed command on its own task.
    ///
    /// Once settled, a status line (or `dispatch failed`) is shown on
    /// `feedback`, the display of the pane the command came from.
    pub fn spawn(
        &self,
        parent: SessionId,
        command: ParsedRelayCommand,
        feedback: Arc<OutputHistory>,
    ) -> JoinHandle<Result<DispatchOutcome, DispatchError>> {
        let this = self.clone();
        tokio::spawn(async move {
            let (targets, command) = command.into_parts();
            let result = this.dispatch(parent, &targets, &command).await;
            match &result {
                Ok(outcome) => feedback.push_status(outcome.status_line(&command)),
                Err(e) => {
                    tracing::warn!(%parent, "Dispatch failed: {e}");
                    feedback.push_status(DISPATCH_FAILED);
                }
            }
            result
        })
    }

    async fn write_one(&self, target: SessionId, payload: &str) -> Result<(), WriteError> {
        let write = self.writer.write(target, payload);
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or(Err(WriteError::TimedOut)),
            None => write.await,
        }
    }
}
