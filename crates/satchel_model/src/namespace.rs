//! Per-app, per-user state namespacing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies one application instance's state for one end user.
///
/// All persisted state lives under a namespace so that concurrent users
/// or applications on the same device never share documents or outbox
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateNamespace {
    app_id: String,
    user_id: String,
}

impl StateNamespace {
    /// Creates a namespace for the given application and user.
    ///
    /// Both components are sanitized to a filesystem-safe form.
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_id: sanitize(&app_id.into()),
            user_id: sanitize(&user_id.into()),
        }
    }

    /// Returns the application component.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns the user component.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the namespace directory relative to a state root.
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.app_id).join(&self.user_id)
    }
}

impl fmt::Display for StateNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.user_id)
    }
}

/// Maps a namespace component to a filesystem-safe token.
fn sanitize(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if mapped.is_empty() || mapped.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_dir_layout() {
        let ns = StateNamespace::new("notes", "alice");
        assert_eq!(ns.relative_dir(), PathBuf::from("notes").join("alice"));
        assert_eq!(ns.to_string(), "notes/alice");
    }

    #[test]
    fn sanitizes_path_separators() {
        let ns = StateNamespace::new("a/b", "user@example.com");
        assert_eq!(ns.app_id(), "a_b");
        assert_eq!(ns.user_id(), "user_example.com");
    }

    #[test]
    fn empty_components_fall_back() {
        let ns = StateNamespace::new("", "..");
        assert_eq!(ns.app_id(), "default");
        assert_eq!(ns.user_id(), "default");
    }
}
