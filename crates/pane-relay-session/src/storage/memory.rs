//! In-memory dispatch log.

use std::{
    collections::{HashMap, VecDeque},
    sync::RwLock,
};

use async_trait::async_trait;
use pane_relay_core::{
    DispatchLog,
    traits::{DispatchLogStore, SessionId, StorageError},
};

/// In-memory dispatch log, newest entry first per parent.
///
/// Data is lost on restart.
pub struct MemoryDispatchLog {
    logs: RwLock<HashMap<SessionId, VecDeque<DispatchLog>>>,
    retention: Option<usize>,
}

impl MemoryDispatchLog {
    /// Create an unbounded log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            retention: None,
        }
    }

    /// Keep at most `retention` entries per parent, dropping the oldest.
    #[must_use]
    pub const fn with_retention(mut self, retention: Option<usize>) -> Self {
        self.retention = retention;
        self
    }
}

impl Default for MemoryDispatchLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchLogStore for MemoryDispatchLog {
    async fn append(&self, entry: DispatchLog) -> Result<(), StorageError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let entries = logs.entry(entry.parent_pane_id).or_default();
        entries.push_front(entry);
        if let Some(retention) = self.retention {
            entries.truncate(retention);
        }

        Ok(())
    }

    async fn logs_for(
        &self,
        parent: SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<DispatchLog>, StorageError> {
        let logs = self
            .logs
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        Ok(logs
            .get(&parent)
            .map(|entries| {
                entries
                    .iter()
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
