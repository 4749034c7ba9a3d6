//! Live object inspection.
//!
//! [`InspectionHandler`] watches one editor and, after every edit, asks the
//! session to introspect the identifier under the cursor. Found replies are
//! rendered into the handler's [`InspectorPane`]; misses clear it. Like
//! completion, an edit or rebinding cancels the request in flight.

use std::sync::{Arc, Mutex, Weak};

use log::debug;

use crate::cancellation::CancellationToken;
use crate::errors::ConsoleError;
use crate::events::INSPECTOR_UPDATE;
use crate::hooks::HookRegistry;
use crate::models::{EditorChange, InspectionRequest, RenderedOutput, RequestOutcome};
use crate::scheduler::Scheduler;
use crate::traits::{CodeEditor, RenderMime, SessionHandle, Unsubscribe};
use crate::widget::{WidgetNode, INSPECTOR_CLASS};

/// The pane that shows the latest inspection result.
#[derive(Debug)]
pub struct InspectorPane {
    node: WidgetNode,
    state: Mutex<PaneState>,
}

#[derive(Debug, Default)]
struct PaneState {
    content: Option<RenderedOutput>,
    updates: u64,
    disposed: bool,
}

impl InspectorPane {
    pub fn new() -> Self {
        Self {
            node: WidgetNode::new(INSPECTOR_CLASS),
            state: Mutex::new(PaneState::default()),
        }
    }

    pub fn node(&self) -> &WidgetNode {
        &self.node
    }

    pub fn content(&self) -> Option<RenderedOutput> {
        self.state.lock().unwrap().content.clone()
    }

    /// Times the content was replaced or cleared.
    pub fn update_count(&self) -> u64 {
        self.state.lock().unwrap().updates
    }

    pub fn set_content(&self, content: RenderedOutput) {
        let mut state = self.state.lock().unwrap();
        if state.disposed {
            return;
        }
        state.content = Some(content);
        state.updates += 1;
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        if state.disposed || state.content.is_none() {
            return;
        }
        state.content = None;
        state.updates += 1;
    }

    pub fn dispose(&self) {
        let mut state = self.state.lock().unwrap();
        state.disposed = true;
        state.content = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().unwrap().disposed
    }
}

impl Default for InspectorPane {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for a new inspection handler.
pub struct InspectionHandlerOptions {
    /// Renders inspection payloads for the pane. Required.
    pub rendermime: Arc<dyn RenderMime>,
    pub scheduler: Scheduler,
    /// 0 for a summary, 1 for full detail; `None` uses 0.
    pub detail_level: Option<u8>,
}

impl InspectionHandlerOptions {
    pub fn new(rendermime: Arc<dyn RenderMime>) -> Self {
        Self {
            rendermime,
            scheduler: Scheduler::new(),
            detail_level: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_detail_level(mut self, detail_level: u8) -> Self {
        self.detail_level = Some(detail_level);
        self
    }
}

struct InspectionState {
    editor: Option<Arc<dyn CodeEditor>>,
    session: Option<Arc<dyn SessionHandle>>,
    unsubscribe: Option<Unsubscribe>,
    token: CancellationToken,
    hooks: Option<Arc<HookRegistry>>,
    disposed: bool,
}

struct InspectionShared {
    pane: InspectorPane,
    rendermime: Arc<dyn RenderMime>,
    scheduler: Scheduler,
    detail_level: u8,
    state: Mutex<InspectionState>,
}

/// Mediates between an editor, a session and an [`InspectorPane`].
///
/// Cloning yields another handle to the same handler.
#[derive(Clone)]
pub struct InspectionHandler {
    shared: Arc<InspectionShared>,
}

impl InspectionHandler {
    pub fn new(options: InspectionHandlerOptions) -> Self {
        Self {
            shared: Arc::new(InspectionShared {
                pane: InspectorPane::new(),
                rendermime: options.rendermime,
                scheduler: options.scheduler,
                detail_level: options.detail_level.unwrap_or(0),
                state: Mutex::new(InspectionState {
                    editor: None,
                    session: None,
                    unsubscribe: None,
                    token: CancellationToken::new(),
                    hooks: None,
                    disposed: false,
                }),
            }),
        }
    }

    pub fn pane(&self) -> &InspectorPane {
        &self.shared.pane
    }

    pub fn rendermime(&self) -> &Arc<dyn RenderMime> {
        &self.shared.rendermime
    }

    pub fn detail_level(&self) -> u8 {
        self.shared.detail_level
    }

    pub fn editor(&self) -> Option<Arc<dyn CodeEditor>> {
        self.shared.state.lock().unwrap().editor.clone()
    }

    pub fn session(&self) -> Option<Arc<dyn SessionHandle>> {
        self.shared.state.lock().unwrap().session.clone()
    }

    /// Bind to `editor`, replacing any previous binding. The pane keeps its
    /// content until the next reply.
    pub fn set_editor(&self, editor: Option<Arc<dyn CodeEditor>>) {
        let previous = {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.token.renew();
            state.editor = editor.clone();
            state.unsubscribe.take()
        };
        if let Some(unsubscribe) = previous {
            unsubscribe();
        }

        if let Some(editor) = editor {
            let weak: Weak<InspectionShared> = Arc::downgrade(&self.shared);
            let unsubscribe = editor.on_change(Arc::new(move |_: &EditorChange| {
                if let Some(shared) = weak.upgrade() {
                    InspectionHandler { shared }.on_editor_change();
                }
            }));
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                drop(state);
                unsubscribe();
            } else {
                state.unsubscribe = Some(unsubscribe);
            }
        }
    }

    pub fn set_session(&self, session: Option<Arc<dyn SessionHandle>>) {
        let mut state = self.shared.state.lock().unwrap();
        if state.disposed {
            return;
        }
        state.token.renew();
        state.session = session;
    }

    /// Announce pane updates on `hooks` as `inspector:update`.
    pub fn set_hooks(&self, hooks: Option<Arc<HookRegistry>>) {
        self.shared.state.lock().unwrap().hooks = hooks;
    }

    /// Queue an inspection request for the next scheduler tick.
    ///
    /// The request is dropped unsent if an edit or rebinding supersedes it
    /// before the tick runs.
    pub fn invoke(&self) {
        let queued = {
            let state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.token.clone()
        };
        let weak = Arc::downgrade(&self.shared);
        self.shared.scheduler.defer(
            "inspection-request",
            Box::new(move || {
                Box::pin(async move {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    if queued.is_cancelled() {
                        debug!("skipping superseded inspection request");
                        return;
                    }
                    if let Err(e) = (InspectionHandler { shared }).fetch().await {
                        log::warn!("inspection request failed: {e}");
                    }
                })
            }),
        );
    }

    /// Inspect the identifier under the cursor now and update the pane if
    /// the reply is still current when it arrives.
    pub async fn fetch(&self) -> Result<RequestOutcome, ConsoleError> {
        let (editor, session, token, hooks) = {
            let state = self.shared.state.lock().unwrap();
            if state.disposed {
                return Ok(RequestOutcome::Skipped);
            }
            match (&state.editor, &state.session) {
                (Some(editor), Some(session)) => (
                    editor.clone(),
                    session.clone(),
                    state.token.clone(),
                    state.hooks.clone(),
                ),
                _ => return Ok(RequestOutcome::Skipped),
            }
        };

        let request = InspectionRequest {
            code: editor.text(),
            cursor_pos: editor.cursor(),
            detail_level: self.shared.detail_level,
        };
        let reply = session.inspect(request).await?;

        if token.is_cancelled() || self.is_disposed() {
            debug!("discarding stale inspection reply for editor {}", editor.id());
            return Ok(RequestOutcome::Stale);
        }

        let pane = &self.shared.pane;
        if reply.found {
            let rendered = self.shared.rendermime.render(&reply.data, true)?;
            pane.set_content(rendered);
        } else {
            pane.clear();
        }

        if let Some(hooks) = hooks {
            hooks.emit(
                INSPECTOR_UPDATE,
                serde_json::json!({
                    "editor_id": editor.id(),
                    "found": reply.found,
                }),
            );
        }
        Ok(RequestOutcome::Applied)
    }

    fn on_editor_change(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.token.renew();
        }
        self.invoke();
    }

    /// Idempotent; cancels the request in flight, unbinds, and disposes the
    /// pane.
    pub fn dispose(&self) {
        let unsubscribe = {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.token.cancel();
            state.editor = None;
            state.session = None;
            state.hooks = None;
            state.unsubscribe.take()
        };
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
        self.shared.pane.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().unwrap().disposed
    }

    /// Whether two handles refer to the same handler.
    pub fn ptr_eq(&self, other: &InspectionHandler) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
