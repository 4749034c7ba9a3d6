//! Test fakes for the panel's external capabilities.
//!
//! Concrete, predictable implementations of every trait in [`crate::traits`].
//! Every fake records its calls so tests can assert both behaviour and
//! interaction patterns.
//!
//! # Design Decisions
//!
//! - **Concrete fakes, not mock frameworks**: readable and editable in place.
//! - **Interior mutability**: fakes are shared as `Arc<dyn Trait>` and must
//!   be `Send + Sync`.
//! - **Reply gate**: [`FakeSession::hold_replies`] parks every reply until
//!   [`FakeSession::release_replies`], so tests can change the editor or
//!   dispose a handler while a request is in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;

use crate::errors::{RenderError, SessionError};
use crate::models::{
    CompletionReply, CompletionRequest, EditorChange, ExecuteReply, ExecuteRequest, ExecuteStatus,
    InspectionReply, InspectionRequest, LanguageInfo, MimeBundle, RenderedOutput, SessionStatus,
};
use crate::session::SessionOptions;
use crate::traits::{
    CodeEditor, EditorFactory, EditorListener, EditorOptions, LifecycleObserver, MimeTypeService,
    RenderMime, SessionFuture, SessionHandle, SessionManager, Unsubscribe,
};

// ---------------------------------------------------------------------------
// FakeSession
// ---------------------------------------------------------------------------

/// Words the fake kernel knows about, used for completion and inspection.
const DEFAULT_VOCABULARY: &[&str] = &["print", "property", "range", "repr", "len", "list"];

/// A fake execution session.
///
/// - `execute` echoes the code as a `text/plain` output unless a reply was
///   queued with [`push_execute_reply`](Self::push_execute_reply) or
///   [`fail_next_execute`](Self::fail_next_execute).
/// - `complete` matches the identifier before the cursor against a
///   vocabulary.
/// - `inspect` reports `found` for vocabulary words under the cursor.
///
/// # Usage
///
/// ```rust
/// use console_panel::testing::FakeSession;
/// use console_panel::traits::SessionHandle;
///
/// let session = FakeSession::new("scratch.py");
/// assert_eq!(session.path(), "scratch.py");
/// ```
pub struct FakeSession {
    id: String,
    path: String,
    status: Mutex<SessionStatus>,
    language_info: Mutex<Option<LanguageInfo>>,
    vocabulary: Vec<String>,
    execute_replies: Mutex<VecDeque<Result<ExecuteReply, String>>>,
    execution_count: AtomicU64,
    executed: Mutex<Vec<ExecuteRequest>>,
    completions: Mutex<Vec<CompletionRequest>>,
    inspections: Mutex<Vec<InspectionRequest>>,
    shutdown_error: Mutex<Option<String>>,
    shutdown_calls: AtomicUsize,
    disposed: AtomicBool,
    gate: watch::Sender<bool>,
}

impl FakeSession {
    pub fn new(path: &str) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            status: Mutex::new(SessionStatus::Idle),
            language_info: Mutex::new(Some(LanguageInfo {
                name: "python".into(),
                version: Some("3.12".into()),
                mimetype: None,
                file_extension: Some(".py".into()),
            })),
            vocabulary: DEFAULT_VOCABULARY.iter().map(|w| w.to_string()).collect(),
            execute_replies: Mutex::new(VecDeque::new()),
            execution_count: AtomicU64::new(0),
            executed: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            inspections: Mutex::new(Vec::new()),
            shutdown_error: Mutex::new(None),
            shutdown_calls: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            gate,
        }
    }

    /// Replace the completion/inspection vocabulary.
    pub fn with_vocabulary(mut self, words: &[&str]) -> Self {
        self.vocabulary = words.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn set_language_info(&self, info: Option<LanguageInfo>) {
        *self.language_info.lock().unwrap() = info;
    }

    pub fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Queue a reply for the next `execute` call.
    pub fn push_execute_reply(&self, reply: ExecuteReply) {
        self.execute_replies.lock().unwrap().push_back(Ok(reply));
    }

    /// Make the next `execute` call fail.
    pub fn fail_next_execute(&self, message: &str) {
        self.execute_replies
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    /// Make every `shutdown` call fail.
    pub fn fail_shutdown(&self, message: &str) {
        *self.shutdown_error.lock().unwrap() = Some(message.to_string());
    }

    /// Park replies until [`release_replies`](Self::release_replies).
    pub fn hold_replies(&self) {
        self.gate.send_replace(true);
    }

    pub fn release_replies(&self) {
        self.gate.send_replace(false);
    }

    pub fn executed_code(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.code.clone())
            .collect()
    }

    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.completions.lock().unwrap().clone()
    }

    pub fn inspection_requests(&self) -> Vec<InspectionRequest> {
        self.inspections.lock().unwrap().clone()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    fn next_execute_reply(&self, request: &ExecuteRequest) -> Result<ExecuteReply, SessionError> {
        let queued = self.execute_replies.lock().unwrap().pop_front();
        match queued {
            Some(Err(message)) => Err(SessionError::RequestFailed { message }),
            Some(Ok(reply)) => Ok(reply),
            None => {
                let count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
                let mut outputs = Vec::new();
                if !request.code.trim().is_empty() {
                    let mut bundle = MimeBundle::new();
                    bundle.insert("text/plain".into(), Value::String(request.code.clone()));
                    outputs.push(bundle);
                }
                Ok(ExecuteReply {
                    status: ExecuteStatus::Ok,
                    execution_count: Some(count),
                    outputs,
                })
            }
        }
    }

    fn check_live(&self) -> Result<(), SessionError> {
        if self.is_disposed() {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }
}

/// Character range of the identifier ending at `cursor`.
fn token_before(code: &str, cursor: usize) -> (usize, String) {
    let chars: Vec<char> = code.chars().collect();
    let end = cursor.min(chars.len());
    let mut start = end;
    while start > 0 && (chars[start - 1].is_alphanumeric() || chars[start - 1] == '_') {
        start -= 1;
    }
    (start, chars[start..end].iter().collect())
}

/// Wait until the reply gate is open.
async fn wait_gate(mut rx: watch::Receiver<bool>) {
    loop {
        let held = *rx.borrow_and_update();
        if !held {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

impl SessionHandle for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn status(&self) -> SessionStatus {
        if self.is_disposed() {
            return SessionStatus::Dead;
        }
        *self.status.lock().unwrap()
    }

    fn language_info(&self) -> Option<LanguageInfo> {
        self.language_info.lock().unwrap().clone()
    }

    fn execute(&self, request: ExecuteRequest) -> SessionFuture<'_, ExecuteReply> {
        let result = self
            .check_live()
            .and_then(|_| self.next_execute_reply(&request));
        self.executed.lock().unwrap().push(request);
        let gate = self.gate.subscribe();
        Box::pin(async move {
            wait_gate(gate).await;
            result
        })
    }

    fn complete(&self, request: CompletionRequest) -> SessionFuture<'_, CompletionReply> {
        let (start, prefix) = token_before(&request.code, request.cursor_pos);
        let matches = self
            .vocabulary
            .iter()
            .filter(|w| !prefix.is_empty() && w.starts_with(&prefix))
            .cloned()
            .collect();
        let reply = CompletionReply {
            matches,
            cursor_start: start,
            cursor_end: request.cursor_pos,
            metadata: serde_json::Map::new(),
        };
        let result = self.check_live().map(|_| reply);
        self.completions.lock().unwrap().push(request);
        let gate = self.gate.subscribe();
        Box::pin(async move {
            wait_gate(gate).await;
            result
        })
    }

    fn inspect(&self, request: InspectionRequest) -> SessionFuture<'_, InspectionReply> {
        let (_, word) = token_before(&request.code, request.cursor_pos);
        let reply = if self.vocabulary.contains(&word) {
            let mut data = MimeBundle::new();
            let detail = if request.detail_level > 0 { " (source)" } else { "" };
            data.insert(
                "text/plain".into(),
                Value::String(format!("{word}: builtin{detail}")),
            );
            InspectionReply { found: true, data }
        } else {
            InspectionReply::default()
        };
        let result = self.check_live().map(|_| reply);
        self.inspections.lock().unwrap().push(request);
        let gate = self.gate.subscribe();
        Box::pin(async move {
            wait_gate(gate).await;
            result
        })
    }

    fn shutdown(&self) -> SessionFuture<'_, ()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        let error = self.shutdown_error.lock().unwrap().clone();
        if error.is_none() {
            self.set_status(SessionStatus::Dead);
        }
        Box::pin(async move {
            match error {
                Some(message) => Err(SessionError::ShutdownFailed { message }),
                None => Ok(()),
            }
        })
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// FakeSessionManager
// ---------------------------------------------------------------------------

/// A fake session manager that hands out [`FakeSession`]s.
pub struct FakeSessionManager {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail_next: Mutex<Option<String>>,
}

impl FakeSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn fail_next_start(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    /// Every session started so far, with concrete type.
    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn started_paths(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.path().to_string())
            .collect()
    }
}

impl Default for FakeSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager for FakeSessionManager {
    fn start_new(&self, options: SessionOptions) -> SessionFuture<'_, Arc<dyn SessionHandle>> {
        let failure = self.fail_next.lock().unwrap().take();
        let result = match failure {
            Some(message) => Err(SessionError::ConnectionFailed { message }),
            None => {
                let session = Arc::new(FakeSession::new(&options.path));
                self.sessions.lock().unwrap().push(session.clone());
                Ok(session as Arc<dyn SessionHandle>)
            }
        };
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// FakeEditor
// ---------------------------------------------------------------------------

/// An in-memory editor that notifies listeners on every text or cursor
/// change.
pub struct FakeEditor {
    id: String,
    text: Mutex<String>,
    cursor: AtomicUsize,
    mime_type: Mutex<String>,
    read_only: AtomicBool,
    focused: AtomicBool,
    disposed: AtomicBool,
    listeners: Arc<Mutex<Vec<(u64, EditorListener)>>>,
    next_listener: AtomicU64,
    on_subscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FakeEditor {
    pub fn new(options: EditorOptions) -> Self {
        let cursor = options.initial_text.chars().count();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: Mutex::new(options.initial_text),
            cursor: AtomicUsize::new(cursor),
            mime_type: Mutex::new(options.mime_type),
            read_only: AtomicBool::new(options.read_only),
            focused: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            on_subscribe: Mutex::new(None),
        }
    }

    /// Run `hook` once, right after the next listener is registered.
    pub fn on_next_subscribe(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_subscribe.lock().unwrap() = Some(Box::new(hook));
    }

    /// Insert `text` at the cursor, as if typed, and notify once.
    pub fn type_text(&self, text: &str) {
        let cursor = self.cursor();
        {
            let mut current = self.text.lock().unwrap();
            let mut chars: Vec<char> = current.chars().collect();
            let at = cursor.min(chars.len());
            chars.splice(at..at, text.chars());
            *current = chars.into_iter().collect();
        }
        self.cursor
            .store(cursor + text.chars().count(), Ordering::SeqCst);
        self.notify();
    }

    /// Remove focus from this editor.
    pub fn blur(&self) {
        self.focused.store(false, Ordering::SeqCst);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    fn notify(&self) {
        let change = EditorChange {
            editor_id: self.id.clone(),
            text: self.text(),
            cursor: self.cursor(),
        };
        // Snapshot so listeners may unsubscribe while being notified.
        let listeners: Vec<EditorListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }
}

impl CodeEditor for FakeEditor {
    fn id(&self) -> &str {
        &self.id
    }

    fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
        self.cursor.store(text.chars().count(), Ordering::SeqCst);
        self.notify();
    }

    fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    fn set_cursor(&self, offset: usize) {
        let len = self.text.lock().unwrap().chars().count();
        self.cursor.store(offset.min(len), Ordering::SeqCst);
        self.notify();
    }

    fn mime_type(&self) -> String {
        self.mime_type.lock().unwrap().clone()
    }

    fn set_mime_type(&self, mime_type: &str) {
        *self.mime_type.lock().unwrap() = mime_type.to_string();
    }

    fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    fn focus(&self) {
        if !self.is_disposed() {
            self.focused.store(true, Ordering::SeqCst);
        }
    }

    fn has_focus(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    fn on_change(&self, listener: EditorListener) -> Unsubscribe {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        let hook = self.on_subscribe.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let listeners = self.listeners.clone();
        Box::new(move || {
            listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
        })
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.focused.store(false, Ordering::SeqCst);
        self.listeners.lock().unwrap().clear();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// FakeEditorFactory
// ---------------------------------------------------------------------------

/// Creates [`FakeEditor`]s and keeps a typed handle to each one.
pub struct FakeEditorFactory {
    editors: Mutex<Vec<Arc<FakeEditor>>>,
}

impl FakeEditorFactory {
    pub fn new() -> Self {
        Self {
            editors: Mutex::new(Vec::new()),
        }
    }

    /// Every editor created so far, oldest first.
    pub fn editors(&self) -> Vec<Arc<FakeEditor>> {
        self.editors.lock().unwrap().clone()
    }

    /// The most recently created editor.
    pub fn last_editor(&self) -> Option<Arc<FakeEditor>> {
        self.editors.lock().unwrap().last().cloned()
    }
}

impl Default for FakeEditorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorFactory for FakeEditorFactory {
    fn new_inline_editor(&self, options: EditorOptions) -> Arc<dyn CodeEditor> {
        let editor = Arc::new(FakeEditor::new(options));
        self.editors.lock().unwrap().push(editor.clone());
        editor
    }
}

// ---------------------------------------------------------------------------
// FakeRenderMime
// ---------------------------------------------------------------------------

/// Renders `text/html`, `text/markdown` and `text/plain` (in that order of
/// preference) by passing the payload through as a string.
pub struct FakeRenderMime {
    order: Vec<String>,
    render_calls: AtomicUsize,
}

impl FakeRenderMime {
    pub fn new() -> Self {
        Self {
            order: ["text/html", "text/markdown", "text/plain"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            render_calls: AtomicUsize::new(0),
        }
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeRenderMime {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderMime for FakeRenderMime {
    fn preferred_mime_type(&self, bundle: &MimeBundle) -> Option<String> {
        self.order.iter().find(|m| bundle.contains_key(*m)).cloned()
    }

    fn render(&self, bundle: &MimeBundle, _trusted: bool) -> Result<RenderedOutput, RenderError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let mime_type = self
            .preferred_mime_type(bundle)
            .ok_or_else(|| RenderError::NoRenderer {
                mime_types: bundle.keys().cloned().collect(),
            })?;
        let content = match &bundle[&mime_type] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(RenderedOutput { mime_type, content })
    }
}

// ---------------------------------------------------------------------------
// FakeMimeTypeService
// ---------------------------------------------------------------------------

/// Maps languages to `text/x-<name>` and a few file extensions to mime types.
pub struct FakeMimeTypeService;

impl MimeTypeService for FakeMimeTypeService {
    fn mime_type_for_language(&self, info: &LanguageInfo) -> String {
        info.mimetype
            .clone()
            .unwrap_or_else(|| format!("text/x-{}", info.name.to_lowercase()))
    }

    fn mime_type_for_path(&self, path: &str) -> Option<String> {
        let ext = path.rsplit_once('.')?.1;
        match ext {
            "py" => Some("text/x-python".into()),
            "r" | "R" => Some("text/x-rsrc".into()),
            "md" => Some("text/x-markdown".into()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// A lifecycle observer that records every event it receives.
pub struct RecordingObserver {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// All recorded `(event, data)` pairs.
    pub fn recorded_events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    /// Just the event names, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn saw(&self, event: &str) -> bool {
        self.events.lock().unwrap().iter().any(|(name, _)| name == event)
    }
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn notify(&self, event: &str, data: &Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), data.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_session_completes_vocabulary_prefix() {
        let session = FakeSession::new("a.py");
        let reply = session
            .complete(CompletionRequest {
                code: "x = pr".into(),
                cursor_pos: 6,
            })
            .await
            .unwrap();
        assert_eq!(reply.matches, vec!["print", "property"]);
        assert_eq!((reply.cursor_start, reply.cursor_end), (4, 6));
    }

    #[tokio::test]
    async fn fake_session_echoes_execution() {
        let session = FakeSession::new("a.py");
        let reply = session.execute(ExecuteRequest::new("1 + 1")).await.unwrap();
        assert_eq!(reply.execution_count, Some(1));
        assert_eq!(reply.outputs[0]["text/plain"], "1 + 1");
        assert_eq!(session.executed_code(), vec!["1 + 1"]);
    }

    #[tokio::test]
    async fn disposed_session_rejects_requests() {
        let session = FakeSession::new("a.py");
        session.dispose();
        let err = session
            .inspect(InspectionRequest {
                code: "len".into(),
                cursor_pos: 3,
                detail_level: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Disposed));
        assert_eq!(session.status(), SessionStatus::Dead);
    }

    #[test]
    fn fake_editor_unsubscribe_removes_listener() {
        let editor = FakeEditor::new(EditorOptions::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let unsubscribe = editor.on_change(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        editor.type_text("ab");
        unsubscribe();
        editor.type_text("c");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(editor.text(), "abc");
        assert_eq!(editor.cursor(), 3);
        assert_eq!(editor.listener_count(), 0);
    }

    #[test]
    fn fake_render_mime_prefers_html() {
        let rendermime = FakeRenderMime::new();
        let mut bundle = MimeBundle::new();
        bundle.insert("text/plain".into(), Value::String("plain".into()));
        bundle.insert("text/html".into(), Value::String("<b>rich</b>".into()));
        let out = rendermime.render(&bundle, true).unwrap();
        assert_eq!(out.mime_type, "text/html");
        assert_eq!(out.content, "<b>rich</b>");
    }
}
