//! Capability contracts the panel depends on but does not implement.
//!
//! The execution session, the rendering service, mime-type resolution and the
//! text editor are external collaborators. The panel stores them as
//! `Arc<dyn Trait>` and dispatches dynamically.
//!
//! # Design Decisions
//!
//! - **Explicit `Pin<Box<dyn Future>>`** for async methods instead of
//!   `#[async_trait]`.
//! - **`Send + Sync` on trait definition** so errors appear at the impl site.
//! - **Unregister closures** for editor subscriptions, matching
//!   [`HookRegistry::register`](crate::hooks::HookRegistry::register).
//!
//! Concrete fakes for every trait live in [`crate::testing`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{RenderError, SessionError};
use crate::models::{
    CompletionReply, CompletionRequest, EditorChange, ExecuteReply, ExecuteRequest,
    InspectionReply, InspectionRequest, LanguageInfo, MimeBundle, RenderedOutput, SessionStatus,
};
use crate::session::SessionOptions;

/// Boxed future returned by session methods.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Callback invoked with every editor change.
pub type EditorListener = Arc<dyn Fn(&EditorChange) + Send + Sync>;

/// Closure that removes a previously registered listener.
pub type Unsubscribe = Box<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// A live connection to a remote code-execution backend.
///
/// Shared read-only by the console and both handlers; none of them may alter
/// session identity, only issue requests against it. The session's lifetime
/// may exceed the panel's.
pub trait SessionHandle: Send + Sync {
    /// Opaque session identifier.
    fn id(&self) -> &str;

    /// Path the session was started for.
    fn path(&self) -> &str;

    /// Current connection status.
    fn status(&self) -> SessionStatus;

    /// Language metadata of the attached kernel, once known.
    fn language_info(&self) -> Option<LanguageInfo>;

    /// Execute code and collect its display outputs.
    fn execute(&self, request: ExecuteRequest) -> SessionFuture<'_, ExecuteReply>;

    /// Request completions for the given text and cursor.
    fn complete(&self, request: CompletionRequest) -> SessionFuture<'_, CompletionReply>;

    /// Request introspection for the object under the cursor.
    fn inspect(&self, request: InspectionRequest) -> SessionFuture<'_, InspectionReply>;

    /// Ask the backend to shut the session down.
    fn shutdown(&self) -> SessionFuture<'_, ()>;

    /// Release local resources held by the handle. Idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Starts new sessions. Callers obtain a session here and hand it to the
/// panel explicitly; the panel never looks one up.
pub trait SessionManager: Send + Sync {
    fn start_new(&self, options: SessionOptions) -> SessionFuture<'_, Arc<dyn SessionHandle>>;
}

// ---------------------------------------------------------------------------
// Rendering and mime types
// ---------------------------------------------------------------------------

/// Converts execution and inspection payloads into visual content.
pub trait RenderMime: Send + Sync {
    /// The richest mime type in `bundle` this service can render.
    fn preferred_mime_type(&self, bundle: &MimeBundle) -> Option<String>;

    /// Render `bundle` using its preferred mime type.
    fn render(&self, bundle: &MimeBundle, trusted: bool) -> Result<RenderedOutput, RenderError>;
}

/// Maps content descriptions to editor mime types.
pub trait MimeTypeService: Send + Sync {
    fn mime_type_for_language(&self, info: &LanguageInfo) -> String;

    fn mime_type_for_path(&self, path: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// The text editor behind a prompt. Handlers hold references, never
/// ownership; the console disposes an editor when its prompt is replaced.
pub trait CodeEditor: Send + Sync {
    fn id(&self) -> &str;

    fn text(&self) -> String;

    /// Replace the full text. Notifies change listeners.
    fn set_text(&self, text: &str);

    /// Cursor position as a character offset.
    fn cursor(&self) -> usize;

    fn set_cursor(&self, offset: usize);

    fn mime_type(&self) -> String;

    fn set_mime_type(&self, mime_type: &str);

    fn set_read_only(&self, read_only: bool);

    fn is_read_only(&self) -> bool;

    fn focus(&self);

    fn has_focus(&self) -> bool;

    /// Register a change listener; call the returned closure to remove it.
    fn on_change(&self, listener: EditorListener) -> Unsubscribe;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Options for a new prompt editor.
#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    pub mime_type: String,
    pub initial_text: String,
    pub read_only: bool,
}

/// Creates editors for prompts and cells.
pub trait EditorFactory: Send + Sync {
    fn new_inline_editor(&self, options: EditorOptions) -> Arc<dyn CodeEditor>;
}

// ---------------------------------------------------------------------------
// LifecycleObserver
// ---------------------------------------------------------------------------

/// Receives lifecycle events emitted through a
/// [`HookRegistry`](crate::hooks::HookRegistry).
///
/// Observers run synchronously on the emitting turn and must not call back
/// into the widget that emitted the event.
pub trait LifecycleObserver: Send + Sync {
    fn notify(&self, event: &str, data: &Value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_object_safe() {
        fn _assert_session(_: Arc<dyn SessionHandle>) {}
        fn _assert_manager(_: Arc<dyn SessionManager>) {}
        fn _assert_rendermime(_: Arc<dyn RenderMime>) {}
        fn _assert_mime_service(_: Arc<dyn MimeTypeService>) {}
        fn _assert_editor(_: Arc<dyn CodeEditor>) {}
        fn _assert_editor_factory(_: Arc<dyn EditorFactory>) {}
        fn _assert_observer(_: Arc<dyn LifecycleObserver>) {}
    }
}
