//! Display broadcast + capped output history for one pane.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::{StreamExt, future, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{ansi, display::DisplayMsg};

/// Default history size limit, in chars.
pub const DEFAULT_HISTORY_CHARS: usize = 240_000;

const NO_OUTPUT: &str = "(no output yet)";

#[derive(Default)]
struct Inner {
    raw: String,
    search: String,
    exited: bool,
}

/// Render/history sink of one pane.
///
/// Every output chunk reaches live listeners and the history exactly
/// once. Status lines reach live listeners only.
pub struct OutputHistory {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<DisplayMsg>,
    limit: usize,
}

impl Default for OutputHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CHARS)
    }
}

impl OutputHistory {
    /// Create a sink keeping at most `limit` chars of each history.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let (sender, _) = broadcast::channel(10000);
        Self {
            inner: RwLock::new(Inner::default()),
            sender,
            limit,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an output chunk and show it to live listeners.
    pub fn push_output(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.write();
        inner.raw.push_str(chunk);
        keep_tail(&mut inner.raw, self.limit);
        inner.search.push_str(&ansi::normalize_for_search(chunk));
        keep_tail(&mut inner.search, self.limit);
        let _ = self.sender.send(DisplayMsg::Output(chunk.to_string()));
    }

    /// Show a status line to live listeners without recording it.
    pub fn push_status(&self, line: impl Into<String>) {
        let _ = self.sender.send(DisplayMsg::Status(line.into()));
    }

    /// Mark the session as ended.
    pub fn push_exited(&self) {
        let mut inner = self.write();
        inner.exited = true;
        let _ = self.sender.send(DisplayMsg::Exited);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DisplayMsg> {
        self.sender.subscribe()
    }

    /// Raw output as received, escapes included.
    #[must_use]
    pub fn raw_history(&self) -> String {
        self.read().raw.clone()
    }

    /// Output normalized for searching.
    #[must_use]
    pub fn search_history(&self) -> String {
        self.read().search.clone()
    }

    /// Last non-blank line of the search history, trimmed.
    #[must_use]
    pub fn latest_visible_line(&self) -> String {
        self.read()
            .search
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(NO_OUTPUT)
            .to_string()
    }

    /// Drop both histories.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.raw.clear();
        inner.search.clear();
    }

    /// Stream that yields recorded output first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> BoxStream<'static, DisplayMsg> {
        // Snapshot and subscribe under one lock so no chunk is lost or doubled.
        let (history, exited, rx) = {
            let inner = self.read();
            (inner.raw.clone(), inner.exited, self.sender.subscribe())
        };

        let mut replay = Vec::with_capacity(2);
        if !history.is_empty() {
            replay.push(DisplayMsg::Output(history));
        }
        if exited {
            replay.push(DisplayMsg::Exited);
        }

        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            res.map_err(|e| tracing::debug!("display listener lagged: {e}"))
                .ok()
        });

        futures::stream::iter(replay).chain(live).boxed()
    }

    /// Stream of output chunks (until the session exits).
    #[must_use]
    pub fn output_stream(&self) -> BoxStream<'static, String> {
        self.history_plus_stream()
            .take_while(|msg| future::ready(*msg != DisplayMsg::Exited))
            .filter_map(|msg| async move {
                match msg {
                    DisplayMsg::Output(s) => Some(s),
                    _ => None,
                }
            })
            .boxed()
    }
}

/// Keep at most `limit` chars, dropping from the front.
fn keep_tail(s: &mut String, limit: usize) {
    if s.len() <= limit {
        return;
    }
    let excess = s.chars().count().saturating_sub(limit);
    if excess == 0 {
        return;
    }
    let cut = s.char_indices().nth(excess).map_or(s.len(), |(i, _)| i);
    s.drain(..cut);
}
