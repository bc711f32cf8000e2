//! Sends started from the relay panel rather than typed as `@` lines.

use std::sync::Arc;

use pane_relay_core::{DispatchOutcome, RelayConfig, SessionId, TargetSet};

use crate::{
    confirm::{AutoConfirm, Confirmation, DispatchConfirmer},
    orchestrator::{DispatchError, DispatchOrchestrator},
};

/// Validates, confirms and dispatches manual sends.
#[derive(Clone)]
pub struct ManualSender {
    orchestrator: DispatchOrchestrator,
    confirmer: Arc<dyn DispatchConfirmer>,
    confirm_multi_target: bool,
}

impl ManualSender {
    /// Create a sender that asks `confirmer` before multi-target sends.
    #[must_use]
    pub fn new(orchestrator: DispatchOrchestrator, confirmer: Arc<dyn DispatchConfirmer>) -> Self {
        Self {
            orchestrator,
            confirmer,
            confirm_multi_target: true,
        }
    }

    /// Sender that never asks.
    #[must_use]
    pub fn unconfirmed(orchestrator: DispatchOrchestrator) -> Self {
        Self::new(orchestrator, Arc::new(AutoConfirm)).with_confirm_multi_target(false)
    }

    #[must_use]
    pub const fn with_confirm_multi_target(mut self, enabled: bool) -> Self {
        self.confirm_multi_target = enabled;
        self
    }

    #[must_use]
    pub fn with_config(self, config: &RelayConfig) -> Self {
        self.with_confirm_multi_target(config.confirm_multi_target)
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &DispatchOrchestrator {
        &self.orchestrator
    }

    /// Send `command` from `parent` to the chosen `targets`.
    ///
    /// The command is trimmed first. Unlike typed relay lines, a manual
    /// send may address the parent itself.
    ///
    /// # Errors
    /// Returns error if the command is blank, no target is given, the
    /// confirmer declines or fails, or `parent` is in no workspace.
    pub async fn send_command(
        &self,
        parent: SessionId,
        targets: &[SessionId],
        command: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(DispatchError::EmptyCommand);
        }
        let targets = TargetSet::new(targets.iter().copied()).ok_or(DispatchError::NoTargets)?;

        if self.confirm_multi_target && targets.len() > 1 {
            match self.confirmer.confirm(parent, &targets, command).await? {
                Confirmation::Approved => {}
                Confirmation::Declined { reason } => {
                    tracing::info!(%parent, targets = targets.len(), "Manual send declined");
                    return Err(DispatchError::Declined(reason));
                }
            }
        }

        self.orchestrator.dispatch(parent, &targets, command).await
    }

    /// Send `command` to every sibling of `parent`, or to `parent` itself
    /// when it is alone in its workspace.
    ///
    /// # Errors
    /// Same as [`Self::send_command`].
    pub async fn send_to_all(
        &self,
        parent: SessionId,
        command: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let targets = self.auto_targets(parent)?;
        self.send_command(parent, &targets, command).await
    }

    /// Targets used by [`Self::send_to_all`].
    ///
    /// # Errors
    /// Returns error if `parent` is in no workspace.
    pub fn auto_targets(&self, parent: SessionId) -> Result<Vec<SessionId>, DispatchError> {
        let siblings = self
            .orchestrator
            .directory()
            .siblings(parent)
            .ok_or(DispatchError::UnknownParent(parent))?;
        if siblings.is_empty() {
            Ok(vec![parent])
        } else {
            Ok(siblings)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pane_relay_core::WorkspaceDirectory;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    use super::*;
    use crate::{
        confirm::ConfirmError,
        orchestrator::test_support::{FakeWriter, VecLog},
    };

    /// Confirmer that answers with a fixed reply and counts requests.
    struct Scripted {
        reply: Confirmation,
        asked: Mutex<usize>,
    }

    impl Scripted {
        fn new(reply: Confirmation) -> Arc<Self> {
            Arc::new(Self {
                reply,
                asked: Mutex::new(0),
            })
        }

        fn asked(&self) -> usize {
            *self.asked.lock().unwrap()
        }
    }

    #[async_trait]
    impl DispatchConfirmer for Scripted {
        async fn confirm(
            &self,
            _parent: SessionId,
            _targets: &TargetSet,
            _command: &str,
        ) -> Result<Confirmation, ConfirmError> {
            *self.asked.lock().unwrap() += 1;
            Ok(self.reply.clone())
        }
    }

    struct Fixture {
        ids: Vec<SessionId>,
        writer: Arc<FakeWriter>,
        directory: Arc<WorkspaceDirectory>,
        orchestrator: DispatchOrchestrator,
    }

    fn fixture(panes: usize) -> Fixture {
        let directory = Arc::new(WorkspaceDirectory::new());
        let ws = directory.create_workspace("main");
        let ids: Vec<SessionId> = (1..=panes).map(|_| Uuid::new_v4()).collect();
        for (n, id) in ids.iter().enumerate() {
            directory.add_pane(ws, *id, format!("Pane {}", n + 1)).unwrap();
        }
        let writer = Arc::new(FakeWriter::default());
        let orchestrator = DispatchOrchestrator::new(
            writer.clone(),
            Arc::new(VecLog::default()),
            directory.clone(),
        );
        Fixture {
            ids,
            writer,
            directory,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_blank_command_is_rejected() {
        let fx = fixture(2);
        let sender = ManualSender::unconfirmed(fx.orchestrator);
        let err = assert_err!(sender.send_command(fx.ids[0], &[fx.ids[1]], "   ").await);
        assert!(matches!(err, DispatchError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_no_targets_is_rejected() {
        let fx = fixture(2);
        let sender = ManualSender::unconfirmed(fx.orchestrator);
        let err = assert_err!(sender.send_command(fx.ids[0], &[], "ls").await);
        assert!(matches!(err, DispatchError::NoTargets));
    }

    #[tokio::test]
    async fn test_command_is_trimmed() {
        let fx = fixture(2);
        let sender = ManualSender::unconfirmed(fx.orchestrator);
        assert_ok!(sender.send_command(fx.ids[0], &[fx.ids[1]], "  ls -la \n").await);
        assert_eq!(fx.writer.written(), vec![(fx.ids[1], "ls -la\r".to_string())]);
    }

    #[tokio::test]
    async fn test_multi_target_asks_first() {
        let fx = fixture(3);
        let confirmer = Scripted::new(Confirmation::Declined {
            reason: Some("not now".into()),
        });
        let sender = ManualSender::new(fx.orchestrator, confirmer.clone());

        let err = assert_err!(sender.send_to_all(fx.ids[0], "make").await);
        assert!(matches!(err, DispatchError::Declined(Some(ref r)) if r == "not now"));
        assert_eq!(confirmer.asked(), 1);
        assert!(fx.writer.written().is_empty());
    }

    #[tokio::test]
    async fn test_single_target_skips_confirmation() {
        let fx = fixture(3);
        let confirmer = Scripted::new(Confirmation::Declined { reason: None });
        let sender = ManualSender::new(fx.orchestrator, confirmer.clone());

        assert_ok!(sender.send_command(fx.ids[0], &[fx.ids[2]], "pwd").await);
        assert_eq!(confirmer.asked(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_can_be_disabled() {
        let fx = fixture(3);
        let confirmer = Scripted::new(Confirmation::Declined { reason: None });
        let config = RelayConfig {
            confirm_multi_target: false,
            ..RelayConfig::default()
        };
        let sender = ManualSender::new(fx.orchestrator, confirmer.clone()).with_config(&config);

        let outcome = assert_ok!(sender.send_to_all(fx.ids[0], "pwd").await);
        assert_eq!(outcome.success_pane_ids, vec![fx.ids[1], fx.ids[2]]);
        assert_eq!(confirmer.asked(), 0);
    }

    #[tokio::test]
    async fn test_single_pane_sends_to_itself() {
        let fx = fixture(1);
        let sender = ManualSender::unconfirmed(fx.orchestrator);

        assert_eq!(assert_ok!(sender.auto_targets(fx.ids[0])), vec![fx.ids[0]]);
        let outcome = assert_ok!(sender.send_to_all(fx.ids[0], "clear").await);
        assert_eq!(outcome.success_pane_ids, vec![fx.ids[0]]);
    }

    #[tokio::test]
    async fn test_detached_parent() {
        let fx = fixture(2);
        fx.directory.remove_pane(fx.ids[0]).unwrap();
        let sender = ManualSender::unconfirmed(fx.orchestrator);

        let err = assert_err!(sender.send_to_all(fx.ids[0], "ls").await);
        assert!(matches!(err, DispatchError::UnknownParent(_)));
    }
}
