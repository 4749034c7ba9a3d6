//! Error types for the console panel.
//!
//! This module defines the full error taxonomy:
//!
//! - [`ConsoleError`]: top-level enum wrapping all component errors
//! - [`ConstructionError`]: missing or invalid construction options
//! - [`SessionError`]: failures reported by the execution session
//! - [`RenderError`]: failures converting a mime bundle into content
//!
//! Lifecycle transitions (activate, close, dispose) never produce errors;
//! a response that arrives for a replaced editor or a disposed handler is
//! dropped silently and reported as [`RequestOutcome::Stale`](crate::models::RequestOutcome),
//! not as an error.
//!
//! All types derive `Serialize` so errors can cross a JSON boundary.

use serde::Serialize;

// -- ConstructionError --

/// Errors raised synchronously while building a panel or console.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ConstructionError {
    /// A mandatory option was not supplied.
    #[error("missing required option: {field}")]
    MissingOption { field: String },

    /// An option was supplied but cannot be used.
    #[error("invalid option {field}: {message}")]
    InvalidOption { field: String, message: String },
}

// -- SessionError --

/// Failures surfaced by a [`SessionHandle`](crate::traits::SessionHandle).
#[derive(Debug, thiserror::Error, Serialize)]
pub enum SessionError {
    /// The session could not be started or reached.
    #[error("session connection failed: {message}")]
    ConnectionFailed { message: String },

    /// An execute, complete or inspect request failed.
    #[error("session request failed: {message}")]
    RequestFailed { message: String },

    /// The session refused to shut down cleanly.
    #[error("session shutdown failed: {message}")]
    ShutdownFailed { message: String },

    /// The session handle was already disposed.
    #[error("session is disposed")]
    Disposed,

    /// Catch-all for other session errors.
    #[error("{message}")]
    Other { message: String },
}

// -- RenderError --

/// Failures converting a mime bundle into visual content.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum RenderError {
    /// No renderer is registered for any mime type in the bundle.
    #[error("no renderer for mime types: {mime_types:?}")]
    NoRenderer { mime_types: Vec<String> },

    /// The renderer rejected the payload.
    #[error("render failed for {mime_type}: {message}")]
    Failed { mime_type: String, message: String },
}

// -- ConsoleError --

/// Top-level error enum wrapping all component errors.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ConsoleError {
    /// A construction error.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// A session error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A rendering error.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The target widget was disposed before the operation could run.
    #[error("{target} is disposed")]
    Disposed { target: String },

    /// An execution is already in flight for this console.
    #[error("console is busy executing")]
    Busy,

    /// Configuration could not be loaded or parsed.
    #[error("config error: {message}")]
    Config { message: String },
}

impl ConsoleError {
    /// Shorthand for [`ConsoleError::Disposed`].
    pub fn disposed(target: &str) -> Self {
        Self::Disposed {
            target: target.to_string(),
        }
    }

    /// Whether this error is a construction failure.
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Construction(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_option_names_the_field() {
        let err = ConstructionError::MissingOption {
            field: "content_factory".into(),
        };
        assert_eq!(err.to_string(), "missing required option: content_factory");
    }

    #[test]
    fn console_error_wraps_construction_error() {
        let outer: ConsoleError = ConstructionError::MissingOption {
            field: "session".into(),
        }
        .into();
        assert!(outer.is_construction());
        assert!(outer.to_string().contains("session"));
    }

    #[test]
    fn session_error_is_transparent() {
        let outer = ConsoleError::from(SessionError::ShutdownFailed {
            message: "kernel gone".into(),
        });
        assert_eq!(outer.to_string(), "session shutdown failed: kernel gone");
        assert!(!outer.is_construction());
    }

    #[test]
    fn disposed_display() {
        assert_eq!(
            ConsoleError::disposed("console").to_string(),
            "console is disposed"
        );
    }

    #[test]
    fn errors_are_serializable() {
        let err = RenderError::Failed {
            mime_type: "text/html".into(),
            message: "bad markup".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("text/html"));
    }
}
