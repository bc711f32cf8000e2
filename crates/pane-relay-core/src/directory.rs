//! In-memory workspace directory.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::traits::{PaneDirectory, SessionId};

/// Workspace identifier.
pub type WorkspaceId = Uuid;

/// A pane as the directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneEntry {
    pub id: SessionId,
    pub title: String,
}

/// A workspace and its panes, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub panes: Vec<PaneEntry>,
}

/// Directory error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),
    #[error("Pane not found: {0}")]
    PaneNotFound(SessionId),
    #[error("Pane already registered: {0}")]
    DuplicatePane(SessionId),
}

#[derive(Default)]
struct Inner {
    workspaces: Vec<Workspace>,
    managed: HashMap<SessionId, Vec<SessionId>>,
}

impl Inner {
    fn workspace_index_of(&self, pane: SessionId) -> Option<usize> {
        self.workspaces
            .iter()
            .position(|ws| ws.panes.iter().any(|p| p.id == pane))
    }

    fn siblings(&self, pane: SessionId) -> Option<Vec<SessionId>> {
        let index = self.workspace_index_of(pane)?;
        Some(
            self.workspaces[index]
                .panes
                .iter()
                .map(|p| p.id)
                .filter(|id| *id != pane)
                .collect(),
        )
    }

    fn pane_mut(&mut self, pane: SessionId) -> Option<&mut PaneEntry> {
        self.workspaces
            .iter_mut()
            .flat_map(|ws| ws.panes.iter_mut())
            .find(|p| p.id == pane)
    }
}

/// Workspace membership, titles and managed-target lists.
///
/// Sessions are created elsewhere; the directory only records where
/// they live and what they are called.
#[derive(Default)]
pub struct WorkspaceDirectory {
    inner: RwLock<Inner>,
}

impl WorkspaceDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty workspace.
    pub fn create_workspace(&self, name: impl Into<String>) -> WorkspaceId {
        let id = Uuid::new_v4();
        self.write().workspaces.push(Workspace {
            id,
            name: name.into(),
            panes: Vec::new(),
        });
        id
    }

    /// Register a session as the last pane of `workspace`.
    ///
    /// # Errors
    /// Returns error if the workspace is unknown or the pane is already registered.
    pub fn add_pane(
        &self,
        workspace: WorkspaceId,
        pane: SessionId,
        title: impl Into<String>,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.write();
        if inner.workspace_index_of(pane).is_some() {
            return Err(DirectoryError::DuplicatePane(pane));
        }
        let ws = inner
            .workspaces
            .iter_mut()
            .find(|ws| ws.id == workspace)
            .ok_or(DirectoryError::WorkspaceNotFound(workspace))?;
        ws.panes.push(PaneEntry {
            id: pane,
            title: title.into(),
        });
        Ok(())
    }

    /// Forget a pane and its own managed-target list.
    ///
    /// Other panes may still list it as a managed target; resolution
    /// ignores ids that are no longer siblings.
    ///
    /// # Errors
    /// Returns error if the pane is unknown.
    pub fn remove_pane(&self, pane: SessionId) -> Result<(), DirectoryError> {
        let mut inner = self.write();
        let index = inner
            .workspace_index_of(pane)
            .ok_or(DirectoryError::PaneNotFound(pane))?;
        inner.workspaces[index].panes.retain(|p| p.id != pane);
        inner.managed.remove(&pane);
        Ok(())
    }

    /// Change a pane's display title.
    ///
    /// # Errors
    /// Returns error if the pane is unknown.
    pub fn rename_pane(&self, pane: SessionId, title: impl Into<String>) -> Result<(), DirectoryError> {
        let mut inner = self.write();
        let entry = inner.pane_mut(pane).ok_or(DirectoryError::PaneNotFound(pane))?;
        entry.title = title.into();
        Ok(())
    }

    /// Replace the managed-target list of `parent`.
    ///
    /// Ids that are not current siblings are dropped, as are duplicates.
    /// Returns the list actually stored.
    ///
    /// # Errors
    /// Returns error if `parent` is unknown.
    pub fn set_managed_targets(
        &self,
        parent: SessionId,
        targets: &[SessionId],
    ) -> Result<Vec<SessionId>, DirectoryError> {
        let mut inner = self.write();
        let siblings = inner
            .siblings(parent)
            .ok_or(DirectoryError::PaneNotFound(parent))?;

        let mut kept: Vec<SessionId> = Vec::with_capacity(targets.len());
        for id in targets {
            if siblings.contains(id) && !kept.contains(id) {
                kept.push(*id);
            }
        }
        inner.managed.insert(parent, kept.clone());
        Ok(kept)
    }

    /// Add `target` to or remove it from the managed list of `parent`.
    ///
    /// Returns whether `target` is selected afterwards.
    ///
    /// # Errors
    /// Returns error if `parent` is unknown.
    pub fn toggle_managed_target(
        &self,
        parent: SessionId,
        target: SessionId,
    ) -> Result<bool, DirectoryError> {
        let current = self.selected_managed_targets(parent)?;
        let selected = !current.contains(&target);
        let next: Vec<SessionId> = if selected {
            current.into_iter().chain(std::iter::once(target)).collect()
        } else {
            current.into_iter().filter(|id| *id != target).collect()
        };
        let stored = self.set_managed_targets(parent, &next)?;
        Ok(stored.contains(&target))
    }

    /// Managed targets of `parent` that are still siblings.
    ///
    /// # Errors
    /// Returns error if `parent` is unknown.
    pub fn selected_managed_targets(&self, parent: SessionId) -> Result<Vec<SessionId>, DirectoryError> {
        let inner = self.read();
        let siblings = inner
            .siblings(parent)
            .ok_or(DirectoryError::PaneNotFound(parent))?;
        Ok(inner
            .managed
            .get(&parent)
            .map(|ids| ids.iter().copied().filter(|id| siblings.contains(id)).collect())
            .unwrap_or_default())
    }

    /// Workspace containing `pane`.
    #[must_use]
    pub fn workspace_of(&self, pane: SessionId) -> Option<WorkspaceId> {
        let inner = self.read();
        inner
            .workspace_index_of(pane)
            .map(|index| inner.workspaces[index].id)
    }

    /// Snapshot of a workspace.
    #[must_use]
    pub fn workspace(&self, id: WorkspaceId) -> Option<Workspace> {
        self.read().workspaces.iter().find(|ws| ws.id == id).cloned()
    }
}

impl PaneDirectory for WorkspaceDirectory {
    fn workspace_members(&self, pane: SessionId) -> Option<Vec<SessionId>> {
        let inner = self.read();
        let index = inner.workspace_index_of(pane)?;
        Some(inner.workspaces[index].panes.iter().map(|p| p.id).collect())
    }

    fn managed_targets(&self, pane: SessionId) -> Vec<SessionId> {
        self.read().managed.get(&pane).cloned().unwrap_or_default()
    }

    fn title_of(&self, pane: SessionId) -> Option<String> {
        self.read()
            .workspaces
            .iter()
            .flat_map(|ws| ws.panes.iter())
            .find(|p| p.id == pane)
            .map(|p| p.title.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_panes() -> (WorkspaceDirectory, WorkspaceId, [SessionId; 3]) {
        let dir = WorkspaceDirectory::new();
        let ws = dir.create_workspace("main");
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        for (n, id) in ids.iter().enumerate() {
            dir.add_pane(ws, *id, format!("Pane {}", n + 1)).unwrap();
        }
        (dir, ws, ids)
    }

    #[test]
    fn test_membership_and_siblings() {
        let (dir, ws, [a, b, c]) = three_panes();
        assert_eq!(dir.workspace_members(b), Some(vec![a, b, c]));
        assert_eq!(dir.siblings(b), Some(vec![a, c]));
        assert_eq!(dir.workspace_of(c), Some(ws));
        assert_eq!(dir.title_of(a).as_deref(), Some("Pane 1"));
    }

    #[test]
    fn test_workspaces_are_isolated() {
        let (dir, _, [a, b, c]) = three_panes();
        let other = dir.create_workspace("other");
        let d = Uuid::new_v4();
        dir.add_pane(other, d, "Pane 1").unwrap();

        assert_eq!(dir.siblings(d), Some(vec![]));
        assert_eq!(dir.siblings(a), Some(vec![b, c]));
    }

    #[test]
    fn test_add_pane_errors() {
        let (dir, ws, [a, ..]) = three_panes();
        assert_eq!(dir.add_pane(ws, a, "again"), Err(DirectoryError::DuplicatePane(a)));

        let missing = Uuid::new_v4();
        assert_eq!(
            dir.add_pane(missing, Uuid::new_v4(), "x"),
            Err(DirectoryError::WorkspaceNotFound(missing))
        );
    }

    #[test]
    fn test_rename_and_remove() {
        let (dir, _, [a, b, c]) = three_panes();
        dir.rename_pane(b, "logs").unwrap();
        assert_eq!(dir.title_of(b).as_deref(), Some("logs"));

        dir.remove_pane(b).unwrap();
        assert_eq!(dir.workspace_members(a), Some(vec![a, c]));
        assert_eq!(dir.workspace_members(b), None);
        assert_eq!(dir.remove_pane(b), Err(DirectoryError::PaneNotFound(b)));
    }

    #[test]
    fn test_managed_targets_filtered_to_siblings() {
        let (dir, _, [a, b, c]) = three_panes();
        let stored = dir.set_managed_targets(a, &[c, a, c, Uuid::new_v4(), b]).unwrap();
        assert_eq!(stored, vec![c, b]);
        assert_eq!(dir.managed_targets(a), vec![c, b]);
    }

    #[test]
    fn test_toggle_managed_target() {
        let (dir, _, [a, b, c]) = three_panes();
        assert!(dir.toggle_managed_target(a, b).unwrap());
        assert!(dir.toggle_managed_target(a, c).unwrap());
        assert_eq!(dir.selected_managed_targets(a).unwrap(), vec![b, c]);

        assert!(!dir.toggle_managed_target(a, b).unwrap());
        assert_eq!(dir.selected_managed_targets(a).unwrap(), vec![c]);
    }

    #[test]
    fn test_stale_managed_ids_hidden_from_selection() {
        let (dir, _, [a, b, c]) = three_panes();
        dir.set_managed_targets(a, &[b, c]).unwrap();
        dir.remove_pane(c).unwrap();

        assert_eq!(dir.managed_targets(a), vec![b, c]);
        assert_eq!(dir.selected_managed_targets(a).unwrap(), vec![b]);
    }
}
