//! Per-session persistence of state snapshots, reports and artifacts.
//!
//! Names ending in `.json` hold structured content; everything else is text.
//! Names are flat: path separators and `..` are rejected.

use datacrew_core::{SessionId, SharedState};
use serde_json::Value;
use std::io::Error as IoError;
use thiserror::Error;

/// Directory-per-session store.
pub mod file;
/// In-memory store.
pub mod memory;

pub use file::FileWorkspace;
pub use memory::MemoryWorkspace;

/// Name of the state snapshot written after every cycle.
pub const STATE_FILE: &str = "state.json";
/// Name of the structured final report.
pub const REPORT_FILE: &str = "report.json";
/// Name of the rendered final report.
pub const REPORT_MARKDOWN_FILE: &str = "report.md";

/// Workspace storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The name would escape the session directory
    #[error("Invalid workspace name: {0}")]
    InvalidName(String),

    /// Structured content was requested under a text name or vice versa
    #[error("{name} holds {expected} content")]
    WrongKind {
        /// Entry name
        name: String,
        /// Kind the name implies
        expected: &'static str,
    },

    /// Reading or writing failed
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Stored JSON could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for workspace operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A workspace entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// JSON document
    Structured(Value),
    /// Free text
    Text(String),
}

impl Content {
    fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Text(_) => "text",
        }
    }
}

/// Whether `name` holds structured content.
pub fn is_structured_name(name: &str) -> bool {
    name.ends_with(".json")
}

/// Rejects names that are empty, contain a separator or refer upwards.
///
/// # Errors
/// Returns [`StoreError::InvalidName`] for such names.
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name.contains("..") {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Checks that `content` matches the kind its name implies.
///
/// # Errors
/// Returns [`StoreError::WrongKind`] on a mismatch.
pub(crate) fn check_kind(name: &str, content: &Content) -> StoreResult<()> {
    let expected = if is_structured_name(name) {
        "structured"
    } else {
        "text"
    };
    if content.kind() == expected {
        Ok(())
    } else {
        Err(StoreError::WrongKind {
            name: name.to_owned(),
            expected,
        })
    }
}

/// Session-scoped key/value storage.
pub trait WorkspaceStore: Send + Sync {
    /// Writes an entry, replacing any previous content.
    ///
    /// # Errors
    /// Returns an error for invalid names, mismatched content or IO failures.
    fn write(&self, session: SessionId, name: &str, content: &Content) -> StoreResult<()>;

    /// Reads an entry; `None` when it does not exist.
    ///
    /// # Errors
    /// Returns an error for invalid names, unreadable or malformed entries.
    fn read(&self, session: SessionId, name: &str) -> StoreResult<Option<Content>>;

    /// Entry names of a session, sorted.
    ///
    /// # Errors
    /// Returns an error when the session cannot be listed.
    fn list(&self, session: SessionId) -> StoreResult<Vec<String>>;
}

/// Writes a state snapshot.
///
/// # Errors
/// Returns an error when the state cannot be serialized or written.
pub fn save_state(store: &dyn WorkspaceStore, state: &SharedState) -> StoreResult<()> {
    let value = serde_json::to_value(state)?;
    store.write(state.session_id(), STATE_FILE, &Content::Structured(value))
}

/// Loads the last snapshot of a session, if any.
///
/// # Errors
/// Returns an error when the snapshot exists but cannot be decoded.
pub fn load_state(store: &dyn WorkspaceStore, session: SessionId) -> StoreResult<Option<SharedState>> {
    match store.read(session, STATE_FILE)? {
        Some(Content::Structured(value)) => Ok(Some(serde_json::from_value(value)?)),
        Some(Content::Text(_)) => Err(StoreError::WrongKind {
            name: STATE_FILE.to_owned(),
            expected: "structured",
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacrew_core::DatasetRef;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("report.md").is_ok());
        assert!(validate_name("churn_model.pkl").is_ok());
        for bad in ["", ".", "../secrets", "a/b.json", "a\\b", "x..y"] {
            assert!(
                matches!(validate_name(bad), Err(StoreError::InvalidName(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_kind_follows_extension() {
        assert!(check_kind("state.json", &Content::Structured(Value::Null)).is_ok());
        assert!(matches!(
            check_kind("state.json", &Content::Text("{}".to_owned())),
            Err(StoreError::WrongKind { .. })
        ));
        assert!(check_kind("notes.txt", &Content::Text(String::new())).is_ok());
    }

    #[test]
    fn test_state_round_trip() {
        let store = MemoryWorkspace::new();
        let mut state = SharedState::new("segment customers", DatasetRef::new("customers.csv"));
        state.record_error("first error");
        save_state(&store, &state).unwrap();

        let loaded = load_state(&store, state.session_id()).unwrap();
        assert_eq!(loaded, Some(state));
    }

    #[test]
    fn test_missing_state_is_none() {
        let store = MemoryWorkspace::new();
        assert_eq!(load_state(&store, SessionId::default()).unwrap(), None);
    }
}
