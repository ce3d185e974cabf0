//! CLI command implementations.

pub mod documents;
pub mod outbox;
pub mod status;

use satchel_model::StateNamespace;
use satchel_store::{FileStatePersistence, PersistedState, StatePersistence};
use std::path::Path;

/// Opens a namespace's persisted state for inspection.
///
/// Takes the namespace lock for the duration of the load; an engine
/// holding the namespace open makes this fail rather than race it.
pub fn open_state(
    root: &Path,
    app: &str,
    user: &str,
) -> Result<PersistedState, Box<dyn std::error::Error>> {
    let namespace = StateNamespace::new(app, user);
    let persistence = FileStatePersistence::open(root, &namespace)?;
    let state = persistence
        .load()?
        .ok_or_else(|| format!("no persisted state under namespace '{namespace}'"))?;
    tracing::debug!(
        namespace = %namespace,
        documents = state.documents.records.len(),
        outbox = state.outbox.entries.len(),
        "state loaded"
    );
    Ok(state)
}

/// Formats a millisecond age as a human-readable duration.
pub fn format_age(age_ms: u64) -> String {
    let seconds = age_ms / 1000;
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_formatting() {
        assert_eq!(format_age(5_000), "5s");
        assert_eq!(format_age(90_000), "1m30s");
        assert_eq!(format_age(7_260_000), "2h1m");
    }

    #[test]
    fn open_state_reports_missing_namespace() {
        let root = tempfile::tempdir().unwrap();
        let result = open_state(root.path(), "notes", "alice");
        assert!(result.is_err());
    }
}
