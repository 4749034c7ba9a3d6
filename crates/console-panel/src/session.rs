//! Session options and session start/shutdown helpers.
//!
//! The panel never acquires a session itself. Callers start one through a
//! [`SessionManager`] and hand the resulting handle to the panel; when they
//! are done they shut it down with [`shutdown_and_dispose`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ConstructionError, SessionError};
use crate::traits::{SessionHandle, SessionManager};

/// Options for starting a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Path the session is associated with. Required.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
}

impl SessionOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            kernel_name: None,
        }
    }

    /// Options with a fresh UUID v4 path.
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_kernel(mut self, kernel_name: impl Into<String>) -> Self {
        self.kernel_name = Some(kernel_name.into());
        self
    }

    /// Parse options from a JSON object, validating that `path` is present
    /// and non-empty.
    pub fn from_value(value: Value) -> Result<Self, ConstructionError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ConstructionError::InvalidOption {
                field: "session".into(),
                message: "options must be a JSON object".into(),
            })?;

        let path = obj
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConstructionError::MissingOption {
                field: "session.path".into(),
            })?;

        let text = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Ok(Self {
            path: path.to_string(),
            name: text("name"),
            kernel_name: text("kernel_name"),
        })
    }
}

/// Start a session through `manager`.
pub async fn start_new(
    manager: &dyn SessionManager,
    options: SessionOptions,
) -> Result<Arc<dyn SessionHandle>, SessionError> {
    log::debug!("starting session for {}", options.path);
    manager.start_new(options).await
}

/// Shut `session` down and dispose the local handle.
///
/// The handle is disposed even when the backend rejects the shutdown, so no
/// half-disposed state is left behind; the shutdown error is returned after
/// local disposal completes.
pub async fn shutdown_and_dispose(session: &dyn SessionHandle) -> Result<(), SessionError> {
    if session.is_disposed() {
        return Ok(());
    }
    let result = session.shutdown().await;
    if let Err(e) = &result {
        log::warn!("session {} shutdown failed: {e}", session.id());
    }
    session.dispose();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSession, FakeSessionManager};

    #[test]
    fn from_value_requires_path() {
        let err = SessionOptions::from_value(serde_json::json!({"name": "x"})).unwrap_err();
        assert!(err.to_string().contains("session.path"));

        let err = SessionOptions::from_value(serde_json::json!({"path": ""})).unwrap_err();
        assert!(err.to_string().contains("session.path"));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        let err = SessionOptions::from_value(serde_json::json!("nope")).unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidOption { .. }));
    }

    #[test]
    fn from_value_reads_optional_fields() {
        let options = SessionOptions::from_value(serde_json::json!({
            "path": "work/analysis.py",
            "kernel_name": "python3"
        }))
        .unwrap();
        assert_eq!(options.path, "work/analysis.py");
        assert_eq!(options.kernel_name.as_deref(), Some("python3"));
        assert_eq!(options.name, None);
    }

    #[test]
    fn random_paths_are_uuids() {
        let a = SessionOptions::random();
        let b = SessionOptions::random();
        assert_ne!(a.path, b.path);
        assert!(uuid::Uuid::parse_str(&a.path).is_ok());
    }

    #[tokio::test]
    async fn start_new_uses_manager() {
        let manager = FakeSessionManager::new();
        let session = start_new(&manager, SessionOptions::new("a.py")).await.unwrap();
        assert_eq!(session.path(), "a.py");
        assert_eq!(manager.started_paths(), vec!["a.py".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_and_dispose_disposes() {
        let session = FakeSession::new("a.py");
        shutdown_and_dispose(&session).await.unwrap();
        assert!(session.is_disposed());
        assert_eq!(session.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn failed_shutdown_still_disposes_locally() {
        let session = FakeSession::new("a.py");
        session.fail_shutdown("backend unreachable");
        let err = shutdown_and_dispose(&session).await.unwrap_err();
        assert!(err.to_string().contains("backend unreachable"));
        assert!(session.is_disposed());
    }

    #[tokio::test]
    async fn shutdown_of_disposed_session_is_noop() {
        let session = FakeSession::new("a.py");
        session.dispose();
        shutdown_and_dispose(&session).await.unwrap();
        assert_eq!(session.shutdown_calls(), 0);
    }
}
