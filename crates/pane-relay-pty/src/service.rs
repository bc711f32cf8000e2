//! PTY sessions backing relay panes.

use std::{
    collections::HashMap,
    io::{Read, Write},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use async_trait::async_trait;
use pane_relay_core::{SessionId, SessionWriter, traits::WriteError};
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{decode::Utf8Decoder, shell::interactive_shell};

const READ_BUFFER: usize = 4096;

/// PTY error.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    Open(String),
    #[error("Failed to spawn shell: {0}")]
    Spawn(String),
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Resize failed: {0}")]
    Resize(String),
}

impl From<tokio::task::JoinError> for PtyError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(e))
    }
}

/// One shell. Each part has its own lock so a write stuck on a full
/// terminal never holds up a resize or a kill.
struct PtySession {
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

impl PtySession {
    /// Kill the shell if it is still running and collect its exit status.
    /// Blocks until the process is gone.
    fn reap(&self, id: SessionId) {
        let mut child = lock(&self.child);
        if let Err(e) = child.kill() {
            tracing::debug!(session = %id, "Kill after exit: {e}");
        }
        match child.wait() {
            Ok(status) => {
                tracing::debug!(session = %id, code = status.exit_code(), "Shell reaped");
            }
            Err(e) => tracing::warn!(session = %id, "Waiting for shell failed: {e}"),
        }
    }
}

type SessionMap = HashMap<SessionId, Arc<PtySession>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadEnd {
    /// The terminal closed; the shell is gone or going.
    Closed,
    /// Nobody listens to the output any more.
    ReceiverDropped,
}

/// Spawns and drives one login shell per pane.
///
/// A shell that exits on its own is reaped and forgotten by its reader
/// thread; [`PtyService::close_session`] does the same on demand.
#[derive(Clone, Default)]
pub struct PtyService {
    sessions: Arc<Mutex<SessionMap>>,
}

impl PtyService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, id: SessionId) -> Result<Arc<PtySession>, PtyError> {
        lock(&self.sessions)
            .get(&id)
            .cloned()
            .ok_or(PtyError::SessionNotFound(id))
    }

    /// Whether `id` names a live session.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        lock(&self.sessions).contains_key(&id)
    }

    /// Start a shell in `working_dir`.
    ///
    /// Returns the new session id and a receiver of decoded output. The
    /// receiver closes when the shell exits.
    ///
    /// # Errors
    /// Returns error if the PTY cannot be opened or the shell cannot start.
    pub async fn create_session(
        &self,
        working_dir: PathBuf,
        cols: u16,
        rows: u16,
    ) -> Result<(SessionId, mpsc::UnboundedReceiver<String>), PtyError> {
        let shell = interactive_shell().await;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&shell.program);
        cmd.args(&shell.args);
        cmd.cwd(&working_dir);
        cmd.env("TERM", "xterm-256color");
        cmd.env("LANG", "en_US.UTF-8");
        cmd.env("LC_ALL", "en_US.UTF-8");
        // zsh session restore exits early inside an embedded PTY.
        cmd.env("SHELL_SESSIONS_DISABLE", "1");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let id = Uuid::new_v4();
        lock(&self.sessions).insert(
            id,
            Arc::new(PtySession {
                writer: Mutex::new(writer),
                master: Mutex::new(pair.master),
                child: Mutex::new(child),
            }),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let sessions = Arc::clone(&self.sessions);
        let spawned = thread::Builder::new()
            .name(format!("pty-reader-{id}"))
            .spawn(move || {
                if read_loop(id, reader, &tx) == ReadEnd::Closed {
                    reap_exited(&sessions, id);
                }
            });
        if let Err(e) = spawned {
            let _ = self.close_session(id).await;
            return Err(e.into());
        }

        tracing::info!(session = %id, shell = %shell.program.display(), "PTY session started");
        Ok((id, rx))
    }

    /// Write raw input to a session.
    ///
    /// The write runs on the blocking pool, so a shell that stops reading
    /// stalls only this call. Dropping the future does not cancel a write
    /// already handed to the terminal.
    ///
    /// # Errors
    /// Returns error if the session is unknown or the write fails.
    pub async fn write(&self, id: SessionId, data: &[u8]) -> Result<(), PtyError> {
        let session = self.session(id)?;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut writer = lock(&session.writer);
            writer.write_all(&data)?;
            writer.flush()
        })
        .await??;
        Ok(())
    }

    /// Resize a session's terminal.
    ///
    /// # Errors
    /// Returns error if the session is unknown or the resize fails.
    pub fn resize(&self, id: SessionId, cols: u16, rows: u16) -> Result<(), PtyError> {
        let session = self.session(id)?;
        let master = lock(&session.master);
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    /// Kill a session's shell, wait for it to exit and forget it.
    ///
    /// # Errors
    /// Returns error if the session is unknown.
    pub async fn close_session(&self, id: SessionId) -> Result<(), PtyError> {
        let session = lock(&self.sessions)
            .remove(&id)
            .ok_or(PtyError::SessionNotFound(id))?;
        tokio::task::spawn_blocking(move || session.reap(id)).await?;
        tracing::info!(session = %id, "PTY session closed");
        Ok(())
    }
}

/// Forget a session whose terminal closed and reap its shell, unless
/// `close_session` got there first.
fn reap_exited(sessions: &Mutex<SessionMap>, id: SessionId) {
    let removed = lock(sessions).remove(&id);
    if let Some(session) = removed {
        session.reap(id);
        tracing::info!(session = %id, "PTY session ended");
    }
}

fn read_loop(
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
    tx: &mpsc::UnboundedSender<String>,
) -> ReadEnd {
    let mut decoder = Utf8Decoder::new();
    let mut buf = [0u8; READ_BUFFER];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && tx.send(text).is_err() {
                    tracing::debug!(session = %id, "Output receiver dropped");
                    return ReadEnd::ReceiverDropped;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::debug!(session = %id, "PTY read ended: {e}");
                break;
            }
        }
    }

    if let Some(rest) = decoder.finish() {
        let _ = tx.send(rest);
    }
    tracing::debug!(session = %id, "PTY reader finished");
    ReadEnd::Closed
}

#[async_trait]
impl SessionWriter for PtyService {
    async fn write(&self, target: SessionId, data: &str) -> Result<(), WriteError> {
        Self::write(self, target, data.as_bytes())
            .await
            .map_err(|e| match e {
                PtyError::SessionNotFound(id) => WriteError::NotFound(id),
                PtyError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    WriteError::Closed(target)
                }
                other => WriteError::Io(other.to_string()),
            })
    }
}
