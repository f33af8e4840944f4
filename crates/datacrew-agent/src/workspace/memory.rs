use datacrew_core::{IgnoreLock as _, SessionId};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{Content, StoreResult, WorkspaceStore, check_kind, validate_name};

/// Workspace kept in memory, for tests and runs with persistence disabled.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    entries: Mutex<BTreeMap<(SessionId, String), Content>>,
}

impl MemoryWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkspaceStore for MemoryWorkspace {
    fn write(&self, session: SessionId, name: &str, content: &Content) -> StoreResult<()> {
        validate_name(name)?;
        check_kind(name, content)?;
        self.entries
            .lock_ignore_poison()
            .insert((session, name.to_owned()), content.clone());
        Ok(())
    }

    fn read(&self, session: SessionId, name: &str) -> StoreResult<Option<Content>> {
        validate_name(name)?;
        Ok(self
            .entries
            .lock_ignore_poison()
            .get(&(session, name.to_owned()))
            .cloned())
    }

    fn list(&self, session: SessionId) -> StoreResult<Vec<String>> {
        Ok(self
            .entries
            .lock_ignore_poison()
            .keys()
            .filter(|(owner, _)| *owner == session)
            .map(|(_, name)| name.clone())
            .collect())
    }
}
