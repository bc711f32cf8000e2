//! Relay manager: routes each pane's input and output through the relay.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError},
};

use pane_relay_core::{
    DispatchLog, DispatchOutcome, InputAction, InputInterceptor, InputMode, OutputHistory,
    OutputScanner, PaneDirectory, ParsedRelayCommand, RelayConfig, SessionId, SessionWriter,
    traits::{DispatchLogStore, StorageError, WriteError},
};
use pane_relay_dispatch::{DispatchConfirmer, DispatchError, DispatchOrchestrator, ManualSender};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};

use crate::storage::MemoryDispatchLog;

/// Relay manager error.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Pane not attached: {0}")]
    PaneNotAttached(SessionId),
    #[error("Write error: {0}")]
    Write(#[from] WriteError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Handle to a dispatch running in the background.
pub type DispatchHandle = JoinHandle<Result<DispatchOutcome, DispatchError>>;

/// Relay state of one attached pane.
struct PaneState {
    input: Mutex<InputInterceptor>,
    scanner: std::sync::Mutex<OutputScanner>,
    output: Arc<OutputHistory>,
}

/// Owns the per-pane relay state and the shared dispatch machinery.
///
/// Feed every keystroke chunk of a pane to [`RelayManager::handle_input`]
/// and every output chunk to [`RelayManager::handle_output`], in the order
/// they occur.
pub struct RelayManager {
    panes: RwLock<HashMap<SessionId, Arc<PaneState>>>,
    writer: Arc<dyn SessionWriter>,
    directory: Arc<dyn PaneDirectory>,
    sender: ManualSender,
    config: RelayConfig,
}

impl RelayManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        writer: Arc<dyn SessionWriter>,
        directory: Arc<dyn PaneDirectory>,
        logs: Arc<dyn DispatchLogStore>,
        confirmer: Arc<dyn DispatchConfirmer>,
        config: RelayConfig,
    ) -> Self {
        let orchestrator =
            DispatchOrchestrator::new(Arc::clone(&writer), logs, Arc::clone(&directory))
                .with_config(&config);
        let sender = ManualSender::new(orchestrator, confirmer).with_config(&config);
        Self {
            panes: RwLock::new(HashMap::new()),
            writer,
            directory,
            sender,
            config,
        }
    }

    /// Create a manager with an in-memory dispatch log.
    #[must_use]
    pub fn in_memory(
        writer: Arc<dyn SessionWriter>,
        directory: Arc<dyn PaneDirectory>,
        confirmer: Arc<dyn DispatchConfirmer>,
        config: RelayConfig,
    ) -> Self {
        let logs = Arc::new(MemoryDispatchLog::new().with_retention(config.log_retention));
        Self::new(writer, directory, logs, confirmer, config)
    }

    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn PaneDirectory> {
        &self.directory
    }

    fn orchestrator(&self) -> &DispatchOrchestrator {
        self.sender.orchestrator()
    }

    /// Start relaying for `pane`. Returns its display sink; attaching an
    /// attached pane returns the existing one.
    pub async fn attach_pane(&self, pane: SessionId) -> Arc<OutputHistory> {
        let mut panes = self.panes.write().await;
        let state = panes.entry(pane).or_insert_with(|| {
            tracing::debug!(%pane, "Attaching pane");
            Arc::new(PaneState {
                input: Mutex::new(InputInterceptor::new(self.config.input_line_ending.as_str())),
                scanner: std::sync::Mutex::new(OutputScanner::new(self.config.max_pending_line)),
                output: Arc::new(OutputHistory::new(self.config.history_limit)),
            })
        });
        Arc::clone(&state.output)
    }

    /// Stop relaying for `pane` and tell its listeners the session ended.
    ///
    /// Dispatch logs recorded for the pane are kept.
    pub async fn detach_pane(&self, pane: SessionId) -> bool {
        let Some(state) = self.panes.write().await.remove(&pane) else {
            return false;
        };
        state.output.push_exited();
        tracing::debug!(%pane, "Detached pane");
        true
    }

    /// Display sink of an attached pane.
    pub async fn output(&self, pane: SessionId) -> Option<Arc<OutputHistory>> {
        self.panes
            .read()
            .await
            .get(&pane)
            .map(|state| Arc::clone(&state.output))
    }

    async fn pane(&self, pane: SessionId) -> Result<Arc<PaneState>, RelayError> {
        self.panes
            .read()
            .await
            .get(&pane)
            .cloned()
            .ok_or(RelayError::PaneNotAttached(pane))
    }

    /// Route keystrokes typed into `pane`.
    ///
    /// Plain input is written to the pane's own session in order; relay
    /// lines are dispatched in the background and never written.
    ///
    /// A failed forward does not stop relay lines later in the chunk: they
    /// are still dispatched, and the rest of the plain input is dropped.
    ///
    /// # Errors
    /// Returns error if the pane is not attached or its session rejects
    /// the forwarded input. Dispatches started by the chunk keep running
    /// in the background.
    pub async fn handle_input(
        &self,
        pane: SessionId,
        chunk: &str,
    ) -> Result<Vec<DispatchHandle>, RelayError> {
        let state = self.pane(pane).await?;
        // Held across the writes so chunks of one pane reach it in order.
        let mut input = state.input.lock().await;
        let actions = input.feed(chunk, pane, self.directory.as_ref());

        let mut handles = Vec::new();
        let mut forward_error = None;
        for action in actions {
            match action {
                InputAction::Forward(text) => {
                    if forward_error.is_some() {
                        continue;
                    }
                    if let Err(e) = self.writer.write(pane, &text).await {
                        tracing::warn!(%pane, "Forwarding input failed: {e}");
                        forward_error = Some(e);
                    }
                }
                InputAction::Relay(command) => {
                    handles.push(self.spawn_dispatch(pane, command, &state.output));
                }
            }
        }

        match forward_error {
            Some(e) => Err(e.into()),
            None => Ok(handles),
        }
    }

    /// Record output produced by `pane` and dispatch relay lines printed
    /// in it. The output itself is always shown unchanged.
    ///
    /// # Errors
    /// Returns error if the pane is not attached.
    pub async fn handle_output(
        &self,
        pane: SessionId,
        chunk: &str,
    ) -> Result<Vec<DispatchHandle>, RelayError> {
        let state = self.pane(pane).await?;
        state.output.push_output(chunk);

        let found = state
            .scanner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feed(chunk, pane, self.directory.as_ref());

        Ok(found
            .into_iter()
            .map(|command| self.spawn_dispatch(pane, command, &state.output))
            .collect())
    }

    fn spawn_dispatch(
        &self,
        pane: SessionId,
        command: ParsedRelayCommand,
        output: &Arc<OutputHistory>,
    ) -> DispatchHandle {
        tracing::info!(
            %pane,
            targets = command.targets().len(),
            command = command.command(),
            "Relaying command"
        );
        self.orchestrator().spawn(pane, command, Arc::clone(output))
    }

    /// Text being composed in `pane`, if it is in compose mode.
    pub async fn compose_preview(&self, pane: SessionId) -> Option<String> {
        let state = self.pane(pane).await.ok()?;
        let input = state.input.lock().await;
        (input.mode() == InputMode::Compose).then(|| input.compose_buffer().to_string())
    }

    /// Send a command from the relay panel to chosen targets.
    ///
    /// # Errors
    /// See [`ManualSender::send_command`].
    pub async fn send_command(
        &self,
        parent: SessionId,
        targets: &[SessionId],
        command: &str,
    ) -> Result<DispatchOutcome, RelayError> {
        let outcome = self.sender.send_command(parent, targets, command).await?;
        self.report(parent, &outcome, command.trim()).await;
        Ok(outcome)
    }

    /// Send a command from the relay panel to every sibling of `parent`
    /// (or `parent` itself when alone).
    ///
    /// # Errors
    /// See [`ManualSender::send_to_all`].
    pub async fn send_to_all(
        &self,
        parent: SessionId,
        command: &str,
    ) -> Result<DispatchOutcome, RelayError> {
        let outcome = self.sender.send_to_all(parent, command).await?;
        self.report(parent, &outcome, command.trim()).await;
        Ok(outcome)
    }

    async fn report(&self, parent: SessionId, outcome: &DispatchOutcome, command: &str) {
        if let Some(output) = self.output(parent).await {
            output.push_status(outcome.status_line(command));
        }
    }

    /// Dispatch records of `parent`, most recent first.
    ///
    /// # Errors
    /// Returns error if the log store fails.
    pub async fn logs_for(
        &self,
        parent: SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<DispatchLog>, RelayError> {
        Ok(self.orchestrator().logs().logs_for(parent, limit).await?)
    }

    /// The few most recent dispatch records of `parent`.
    ///
    /// # Errors
    /// Returns error if the log store fails.
    pub async fn recent_logs(&self, parent: SessionId) -> Result<Vec<DispatchLog>, RelayError> {
        self.logs_for(parent, Some(self.config.recent_log_display)).await
    }
}
