use datacrew_core::SessionId;
use serde_json::{from_str, to_string_pretty};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Content, StoreResult, WorkspaceStore, check_kind, is_structured_name, validate_name};

/// Workspace rooted at a directory, one sub-directory per session.
#[derive(Debug, Clone)]
pub struct FileWorkspace {
    root: PathBuf,
}

impl FileWorkspace {
    /// Creates a workspace under `root`; directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a session's entries.
    pub fn session_dir(&self, session: SessionId) -> PathBuf {
        self.root.join(session.to_string())
    }
}

impl WorkspaceStore for FileWorkspace {
    fn write(&self, session: SessionId, name: &str, content: &Content) -> StoreResult<()> {
        validate_name(name)?;
        check_kind(name, content)?;

        let dir = self.session_dir(session);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let body = match content {
            Content::Structured(value) => to_string_pretty(value)?,
            Content::Text(text) => text.clone(),
        };
        fs::write(dir.join(name), body)?;
        Ok(())
    }

    fn read(&self, session: SessionId, name: &str) -> StoreResult<Option<Content>> {
        validate_name(name)?;
        let body = match fs::read_to_string(self.session_dir(session).join(name)) {
            Ok(body) => body,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        if is_structured_name(name) {
            Ok(Some(Content::Structured(from_str(&body)?)))
        } else {
            Ok(Some(Content::Text(body)))
        }
    }

    fn list(&self, session: SessionId) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(self.session_dir(session)) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::StoreError;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_list() {
        let dir = TempDir::new().unwrap();
        let store = FileWorkspace::new(dir.path());
        let session = SessionId::default();

        store
            .write(session, "report.json", &Content::Structured(json!({"ok": true})))
            .unwrap();
        store
            .write(session, "report.md", &Content::Text("# Report\n".to_owned()))
            .unwrap();

        assert!(store.session_dir(session).join("report.json").is_file());
        assert_eq!(store.list(session).unwrap(), vec!["report.json", "report.md"]);
        assert_eq!(
            store.read(session, "report.json").unwrap(),
            Some(Content::Structured(json!({"ok": true})))
        );
        assert_eq!(
            store.read(session, "report.md").unwrap(),
            Some(Content::Text("# Report\n".to_owned()))
        );
    }

    #[test]
    fn test_missing_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileWorkspace::new(dir.path());
        let session = SessionId::default();
        assert_eq!(store.read(session, "state.json").unwrap(), None);
        assert!(store.list(session).unwrap().is_empty());
    }

    #[test]
    fn test_escaping_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileWorkspace::new(dir.path().join("sessions"));
        let result = store.write(
            SessionId::default(),
            "../escape.txt",
            &Content::Text("x".to_owned()),
        );
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileWorkspace::new(dir.path());
        let session = SessionId::default();
        fs::create_dir_all(store.session_dir(session)).unwrap();
        fs::write(store.session_dir(session).join("state.json"), "{not json").unwrap();
        assert!(matches!(
            store.read(session, "state.json"),
            Err(StoreError::Json(_))
        ));
    }
}
