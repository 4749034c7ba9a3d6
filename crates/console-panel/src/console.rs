//! The code console: an append-only log of executed cells plus one live
//! prompt editor.
//!
//! The console owns a [`CompletionHandler`] and an [`InspectionHandler`] for
//! the lifetime of the console. After every execution it swaps in a fresh
//! prompt and rebinds both handlers to it before disposing the old editor,
//! so neither handler ever observes a replaced prompt and at most one prompt
//! editor is live.
//!
//! Widgets are built through a [`ConsoleContentFactory`], which callers can
//! replace to customise prompts or cells without touching the console.

use std::sync::{Arc, Mutex, Weak};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::completer::CompletionHandler;
use crate::errors::ConsoleError;
use crate::events::{
    CONSOLE_CLEARED, CONSOLE_DISPOSE, CONSOLE_EXECUTED, CONSOLE_PROMPT_CREATED,
    CONSOLE_SESSION_CHANGED,
};
use crate::hooks::HookRegistry;
use crate::inspector::InspectionHandler;
use crate::models::{ExecuteReply, ExecuteRequest, ExecuteStatus, RenderedOutput};
use crate::scheduler::Scheduler;
use crate::traits::{
    CodeEditor, EditorFactory, EditorOptions, MimeTypeService, RenderMime, SessionHandle,
};
use crate::widget::{WidgetNode, CODE_CONSOLE_CLASS, PROMPT_CLASS};

// ---------------------------------------------------------------------------
// Content factory
// ---------------------------------------------------------------------------

/// Options for a new prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    pub mime_type: String,
}

/// Options for a new executed cell.
#[derive(Debug, Clone, Default)]
pub struct CellOptions {
    pub source: String,
    pub execution_count: Option<u64>,
    pub status: ExecuteStatus,
    pub outputs: Vec<RenderedOutput>,
}

/// Builds the console's prompts and cells.
pub trait ConsoleContentFactory: Send + Sync {
    /// Factory for prompt editors.
    fn editor_factory(&self) -> &Arc<dyn EditorFactory>;

    /// Prompt mime type when neither the session's language nor its path
    /// resolve one.
    fn default_mime_type(&self) -> String {
        "text/plain".into()
    }

    fn create_prompt(&self, options: PromptOptions) -> Prompt {
        let editor = self.editor_factory().new_inline_editor(EditorOptions {
            mime_type: options.mime_type,
            ..EditorOptions::default()
        });
        Prompt::new(editor)
    }

    fn create_cell(&self, options: CellOptions) -> CodeCell {
        CodeCell {
            source: options.source,
            execution_count: options.execution_count,
            status: options.status,
            outputs: options.outputs,
        }
    }
}

/// The stock [`ConsoleContentFactory`].
pub struct DefaultConsoleContentFactory {
    editor_factory: Arc<dyn EditorFactory>,
    default_mime_type: String,
}

impl DefaultConsoleContentFactory {
    pub fn new(editor_factory: Arc<dyn EditorFactory>) -> Self {
        Self {
            editor_factory,
            default_mime_type: "text/plain".into(),
        }
    }

    pub fn with_default_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.default_mime_type = mime_type.into();
        self
    }
}

impl ConsoleContentFactory for DefaultConsoleContentFactory {
    fn editor_factory(&self) -> &Arc<dyn EditorFactory> {
        &self.editor_factory
    }

    fn default_mime_type(&self) -> String {
        self.default_mime_type.clone()
    }
}

// ---------------------------------------------------------------------------
// Prompt and cells
// ---------------------------------------------------------------------------

/// The console's editable input area.
pub struct Prompt {
    node: WidgetNode,
    editor: Arc<dyn CodeEditor>,
}

impl Prompt {
    pub fn new(editor: Arc<dyn CodeEditor>) -> Self {
        Self {
            node: WidgetNode::new(PROMPT_CLASS),
            editor,
        }
    }

    pub fn node(&self) -> &WidgetNode {
        &self.node
    }

    pub fn editor(&self) -> &Arc<dyn CodeEditor> {
        &self.editor
    }
}

/// One executed entry in the console log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeCell {
    pub source: String,
    pub execution_count: Option<u64>,
    pub status: ExecuteStatus,
    pub outputs: Vec<RenderedOutput>,
}

// ---------------------------------------------------------------------------
// CodeConsole
// ---------------------------------------------------------------------------

/// Everything a console needs to run.
pub struct ConsoleOptions {
    pub content_factory: Arc<dyn ConsoleContentFactory>,
    pub rendermime: Arc<dyn RenderMime>,
    pub mime_type_service: Arc<dyn MimeTypeService>,
    pub session: Arc<dyn SessionHandle>,
    pub scheduler: Scheduler,
    /// Registry lifecycle events are emitted on.
    pub hooks: Arc<HookRegistry>,
}

struct ConsoleState {
    session: Arc<dyn SessionHandle>,
    prompt: Arc<Prompt>,
    cells: Vec<CodeCell>,
    executing: bool,
    disposed: bool,
}

struct ConsoleInner {
    node: WidgetNode,
    content_factory: Arc<dyn ConsoleContentFactory>,
    rendermime: Arc<dyn RenderMime>,
    mime_type_service: Arc<dyn MimeTypeService>,
    scheduler: Scheduler,
    hooks: Arc<HookRegistry>,
    completion: CompletionHandler,
    inspection: InspectionHandler,
    state: Mutex<ConsoleState>,
}

/// Releases an execution that did not complete: clears the executing flag
/// and makes the prompt editable again. Covers error returns and futures
/// dropped mid-await.
struct ExecutionGuard<'a> {
    inner: &'a ConsoleInner,
    editor: Arc<dyn CodeEditor>,
    armed: bool,
}

impl ExecutionGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.inner.state.lock().unwrap().executing = false;
        self.editor.set_read_only(false);
    }
}

/// An interactive console bound to one session at a time.
pub struct CodeConsole {
    inner: Arc<ConsoleInner>,
}

impl CodeConsole {
    /// Create the first prompt and bind both handlers to it and to
    /// `options.session`.
    pub fn new(
        options: ConsoleOptions,
        completion: CompletionHandler,
        inspection: InspectionHandler,
    ) -> Self {
        let mime_type = resolve_mime_type(
            options.mime_type_service.as_ref(),
            options.session.as_ref(),
            options.content_factory.as_ref(),
        );
        let prompt = Arc::new(options.content_factory.create_prompt(PromptOptions { mime_type }));

        completion.set_hooks(Some(options.hooks.clone()));
        inspection.set_hooks(Some(options.hooks.clone()));
        completion.set_session(Some(options.session.clone()));
        inspection.set_session(Some(options.session.clone()));
        completion.set_editor(Some(prompt.editor().clone()));
        inspection.set_editor(Some(prompt.editor().clone()));

        let editor_id = prompt.editor().id().to_string();
        let console = Self {
            inner: Arc::new(ConsoleInner {
                node: WidgetNode::new(CODE_CONSOLE_CLASS),
                content_factory: options.content_factory,
                rendermime: options.rendermime,
                mime_type_service: options.mime_type_service,
                scheduler: options.scheduler,
                hooks: options.hooks,
                completion,
                inspection,
                state: Mutex::new(ConsoleState {
                    session: options.session,
                    prompt,
                    cells: Vec::new(),
                    executing: false,
                    disposed: false,
                }),
            }),
        };
        console
            .inner
            .hooks
            .emit(CONSOLE_PROMPT_CREATED, json!({ "editor_id": editor_id }));
        console
    }

    pub fn node(&self) -> &WidgetNode {
        &self.inner.node
    }

    /// The live prompt.
    pub fn prompt(&self) -> Arc<Prompt> {
        self.inner.state.lock().unwrap().prompt.clone()
    }

    /// Executed cells, oldest first.
    pub fn cells(&self) -> Vec<CodeCell> {
        self.inner.state.lock().unwrap().cells.clone()
    }

    pub fn completion_handler(&self) -> &CompletionHandler {
        &self.inner.completion
    }

    pub fn inspection_handler(&self) -> &InspectionHandler {
        &self.inner.inspection
    }

    pub fn session(&self) -> Arc<dyn SessionHandle> {
        self.inner.state.lock().unwrap().session.clone()
    }

    pub fn content_factory(&self) -> &Arc<dyn ConsoleContentFactory> {
        &self.inner.content_factory
    }

    pub fn rendermime(&self) -> &Arc<dyn RenderMime> {
        &self.inner.rendermime
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.inner.hooks
    }

    pub fn is_executing(&self) -> bool {
        self.inner.state.lock().unwrap().executing
    }

    /// Execute the prompt's text against the session.
    ///
    /// On success the executed cell is appended and returned, and a fresh
    /// prompt replaces the old one. On session failure the prompt is made
    /// editable again and the error is returned.
    pub async fn execute(&self) -> Result<CodeCell, ConsoleError> {
        let (prompt, session) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.disposed {
                return Err(ConsoleError::disposed("console"));
            }
            if state.executing {
                return Err(ConsoleError::Busy);
            }
            state.executing = true;
            (state.prompt.clone(), state.session.clone())
        };

        let editor = prompt.editor().clone();
        let code = editor.text();
        editor.set_read_only(true);
        let guard = ExecutionGuard {
            inner: &self.inner,
            editor: editor.clone(),
            armed: true,
        };
        debug!("executing {} chars in session {}", code.len(), session.id());

        let result = session.execute(ExecuteRequest::new(code.clone())).await;

        if self.is_disposed() {
            debug!("dropping execute reply for disposed console");
            return Err(ConsoleError::disposed("console"));
        }
        let reply = result?;

        let cell = self.inner.content_factory.create_cell(CellOptions {
            source: code,
            execution_count: reply.execution_count,
            status: reply.status,
            outputs: self.render_outputs(&reply),
        });
        let next = self.new_prompt();

        let index = {
            let mut state = self.inner.state.lock().unwrap();
            if state.disposed {
                None
            } else {
                state.cells.push(cell.clone());
                state.prompt = next.clone();
                state.executing = false;
                Some(state.cells.len() - 1)
            }
        };
        let Some(index) = index else {
            debug!("console disposed before the reply was applied");
            next.editor().dispose();
            return Err(ConsoleError::disposed("console"));
        };
        guard.disarm();

        self.inner.completion.set_editor(Some(next.editor().clone()));
        self.inner.inspection.set_editor(Some(next.editor().clone()));
        editor.dispose();

        let hooks = &self.inner.hooks;
        hooks.emit(
            CONSOLE_EXECUTED,
            json!({
                "index": index,
                "execution_count": cell.execution_count,
                "status": serde_json::to_value(cell.status).unwrap_or_default(),
            }),
        );
        hooks.emit(
            CONSOLE_PROMPT_CREATED,
            json!({ "editor_id": next.editor().id() }),
        );
        Ok(cell)
    }

    /// Put `code` into the prompt and execute it.
    pub async fn inject(&self, code: &str) -> Result<CodeCell, ConsoleError> {
        if self.is_disposed() {
            return Err(ConsoleError::disposed("console"));
        }
        self.prompt().editor().set_text(code);
        self.execute().await
    }

    /// Remove every executed cell. The prompt is kept.
    pub fn clear(&self) {
        let removed = {
            let mut state = self.inner.state.lock().unwrap();
            if state.disposed {
                return;
            }
            std::mem::take(&mut state.cells).len()
        };
        self.inner
            .hooks
            .emit(CONSOLE_CLEARED, json!({ "removed": removed }));
    }

    /// Rebind the console and both handlers to `session`. The handler
    /// instances are kept.
    pub fn set_session(&self, session: Arc<dyn SessionHandle>) {
        let prompt = {
            let mut state = self.inner.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.session = session.clone();
            state.prompt.clone()
        };
        self.inner.completion.set_session(Some(session.clone()));
        self.inner.inspection.set_session(Some(session.clone()));

        let mime_type = resolve_mime_type(
            self.inner.mime_type_service.as_ref(),
            session.as_ref(),
            self.inner.content_factory.as_ref(),
        );
        prompt.editor().set_mime_type(&mime_type);

        self.inner.hooks.emit(
            CONSOLE_SESSION_CHANGED,
            json!({ "session_id": session.id(), "path": session.path() }),
        );
    }

    /// Focus the live prompt editor on the next scheduler tick.
    pub fn activate(&self) {
        if self.is_disposed() {
            return;
        }
        let weak: Weak<ConsoleInner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.defer_sync("console-focus", move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let prompt = {
                let state = inner.state.lock().unwrap();
                if state.disposed {
                    return;
                }
                state.prompt.clone()
            };
            prompt.editor().focus();
        });
    }

    /// Idempotent; disposes both handlers (and with them the popup and the
    /// pane) and the prompt editor.
    pub fn dispose(&self) {
        let prompt = {
            let mut state = self.inner.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.cells.clear();
            state.prompt.clone()
        };
        self.inner.completion.dispose();
        self.inner.inspection.dispose();
        prompt.editor().dispose();
        debug!("console {} disposed", self.inner.node.id());
        self.inner
            .hooks
            .emit(CONSOLE_DISPOSE, json!({ "console_id": self.inner.node.id() }));
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().unwrap().disposed
    }

    fn new_prompt(&self) -> Arc<Prompt> {
        let session = self.session();
        let mime_type = resolve_mime_type(
            self.inner.mime_type_service.as_ref(),
            session.as_ref(),
            self.inner.content_factory.as_ref(),
        );
        Arc::new(
            self.inner
                .content_factory
                .create_prompt(PromptOptions { mime_type }),
        )
    }

    fn render_outputs(&self, reply: &ExecuteReply) -> Vec<RenderedOutput> {
        reply
            .outputs
            .iter()
            .filter_map(|bundle| match self.inner.rendermime.render(bundle, false) {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!("skipping unrenderable output: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Mime type for a prompt editor: the session's language, else its path,
/// else the factory default.
fn resolve_mime_type(
    service: &dyn MimeTypeService,
    session: &dyn SessionHandle,
    factory: &dyn ConsoleContentFactory,
) -> String {
    if let Some(info) = session.language_info() {
        return service.mime_type_for_language(&info);
    }
    service
        .mime_type_for_path(session.path())
        .unwrap_or_else(|| factory.default_mime_type())
}
