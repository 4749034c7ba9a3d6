//! ConsolePanel -- the composition root.
//!
//! A panel builds its [`CodeConsole`] through a pluggable [`ContentFactory`]
//! and then only forwards lifecycle requests into it:
//!
//! - `activate()` posts an activate-request. One scheduler tick later the
//!   panel emits `panel:activate-request` and asks the console to activate,
//!   and the console focuses its prompt on the tick after that.
//! - `close()` posts a close-request. One tick later the panel emits
//!   `panel:close-request` and disposes itself.
//! - `dispose()` cascades into the console, its handlers, the popup, the
//!   pane and the prompt editor.
//!
//! Lifecycle calls never fail. Requests that do not apply in the current
//! state are logged at debug level and dropped, and queued work whose panel
//! was dropped or disposed does nothing.
//!
//! The session is borrowed, not owned: disposing a panel never shuts down or
//! disposes the session it was built with.

use std::sync::{Arc, Mutex, Weak};

use log::debug;
use serde_json::json;

use crate::completer::{
    CompleterHandlerOptions, CompleterOptions, CompleterWidget, CompletionHandler,
};
use crate::config::ConsoleConfig;
use crate::console::{
    CodeConsole, ConsoleContentFactory, ConsoleOptions, DefaultConsoleContentFactory,
};
use crate::errors::{ConsoleError, ConstructionError};
use crate::events::{PANEL_ACTIVATE_REQUEST, PANEL_ATTACH, PANEL_CLOSE_REQUEST, PANEL_DISPOSE};
use crate::hooks::HookRegistry;
use crate::inspector::{InspectionHandler, InspectionHandlerOptions};
use crate::models::PanelState;
use crate::scheduler::Scheduler;
use crate::traits::{EditorFactory, MimeTypeService, RenderMime, SessionHandle};
use crate::widget::{WidgetNode, CONSOLE_PANEL_CLASS};

// ---------------------------------------------------------------------------
// ContentFactory
// ---------------------------------------------------------------------------

/// Builds the widgets a panel is composed of.
///
/// Each method is a plain constructor. Implementations may swap any one of
/// them (a custom popup, say) and keep the stock wiring in
/// [`create_console`](Self::create_console).
pub trait ContentFactory: Send + Sync {
    /// The nested factory the console uses for prompts and cells.
    fn console_content_factory(&self) -> &Arc<dyn ConsoleContentFactory>;

    /// A new completion popup.
    fn create_completer(&self, options: CompleterOptions) -> Arc<CompleterWidget>;

    /// A new completion handler driving `options.completer`, not yet bound
    /// to an editor or a session.
    fn create_completer_handler(&self, options: CompleterHandlerOptions) -> CompletionHandler;

    /// A new inspection handler with its own pane, not yet bound to an
    /// editor.
    fn create_inspection_handler(&self, options: InspectionHandlerOptions) -> InspectionHandler;

    /// Extra class for panel nodes.
    fn panel_class(&self) -> Option<String> {
        None
    }

    /// A new console bound to `options.session`, with a fresh popup,
    /// completion handler and inspection handler.
    fn create_console(&self, options: ConsoleOptions) -> CodeConsole {
        let completer = self.create_completer(CompleterOptions::default());
        let completion = self.create_completer_handler(
            CompleterHandlerOptions::new(completer).with_scheduler(options.scheduler.clone()),
        );
        let inspection = self.create_inspection_handler(
            InspectionHandlerOptions::new(options.rendermime.clone())
                .with_scheduler(options.scheduler.clone()),
        );
        CodeConsole::new(options, completion, inspection)
    }
}

/// The stock [`ContentFactory`].
pub struct PanelContentFactory {
    editor_factory: Arc<dyn EditorFactory>,
    console_content_factory: Arc<dyn ConsoleContentFactory>,
    config: ConsoleConfig,
}

impl PanelContentFactory {
    pub fn new(editor_factory: Arc<dyn EditorFactory>) -> Self {
        Self::with_config(editor_factory, ConsoleConfig::default())
    }

    /// A factory whose widgets take their defaults from `config`.
    pub fn with_config(editor_factory: Arc<dyn EditorFactory>, config: ConsoleConfig) -> Self {
        let console_content_factory = Arc::new(
            DefaultConsoleContentFactory::new(editor_factory.clone())
                .with_default_mime_type(config.prompt.default_mime_type.clone()),
        );
        Self {
            editor_factory,
            console_content_factory,
            config,
        }
    }

    pub fn editor_factory(&self) -> &Arc<dyn EditorFactory> {
        &self.editor_factory
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }
}

impl ContentFactory for PanelContentFactory {
    fn console_content_factory(&self) -> &Arc<dyn ConsoleContentFactory> {
        &self.console_content_factory
    }

    fn create_completer(&self, options: CompleterOptions) -> Arc<CompleterWidget> {
        let max_items = options.max_items.or(Some(self.config.completer.max_items));
        Arc::new(CompleterWidget::new(CompleterOptions { max_items }))
    }

    fn create_completer_handler(&self, options: CompleterHandlerOptions) -> CompletionHandler {
        CompletionHandler::new(options)
    }

    fn create_inspection_handler(&self, mut options: InspectionHandlerOptions) -> InspectionHandler {
        options.detail_level = options
            .detail_level
            .or(Some(self.config.inspector.detail_level));
        InspectionHandler::new(options)
    }

    fn panel_class(&self) -> Option<String> {
        self.config.panel_class.clone()
    }
}

// ---------------------------------------------------------------------------
// PanelOptions
// ---------------------------------------------------------------------------

/// Construction options for a [`ConsolePanel`].
///
/// `content_factory`, `rendermime`, `session` and `mime_type_service` are
/// required; [`ConsolePanel::new`] names the first one missing.
#[derive(Default)]
pub struct PanelOptions {
    pub content_factory: Option<Arc<dyn ContentFactory>>,
    pub rendermime: Option<Arc<dyn RenderMime>>,
    pub session: Option<Arc<dyn SessionHandle>>,
    pub mime_type_service: Option<Arc<dyn MimeTypeService>>,
    /// Extra class for the panel node.
    pub class_name: Option<String>,
    /// Queue for deferred lifecycle work; a private one is created if unset.
    pub scheduler: Option<Scheduler>,
}

impl PanelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_factory(mut self, factory: Arc<dyn ContentFactory>) -> Self {
        self.content_factory = Some(factory);
        self
    }

    pub fn rendermime(mut self, rendermime: Arc<dyn RenderMime>) -> Self {
        self.rendermime = Some(rendermime);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionHandle>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn mime_type_service(mut self, service: Arc<dyn MimeTypeService>) -> Self {
        self.mime_type_service = Some(service);
        self
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ConstructionError> {
    value.ok_or_else(|| ConstructionError::MissingOption {
        field: field.to_string(),
    })
}

// ---------------------------------------------------------------------------
// ConsolePanel
// ---------------------------------------------------------------------------

struct Lifecycle {
    state: PanelState,
    console: Option<Arc<CodeConsole>>,
}

struct PanelInner {
    node: WidgetNode,
    session: Arc<dyn SessionHandle>,
    content_factory: Arc<dyn ContentFactory>,
    scheduler: Scheduler,
    hooks: Arc<HookRegistry>,
    state: Mutex<Lifecycle>,
}

impl PanelInner {
    fn console(&self) -> Option<Arc<CodeConsole>> {
        self.state.lock().unwrap().console.clone()
    }

    fn activate_now(&self) {
        let console = {
            let mut guard = self.state.lock().unwrap();
            if guard.state == PanelState::Disposed || guard.state == PanelState::Closing {
                return;
            }
            guard.state = PanelState::Activated;
            guard.console.clone()
        };
        self.hooks.emit(PANEL_ACTIVATE_REQUEST, json!({}));
        if let Some(console) = console {
            console.activate();
        }
    }

    fn close_now(&self) {
        {
            let mut guard = self.state.lock().unwrap();
            if guard.state == PanelState::Disposed {
                return;
            }
            guard.state = PanelState::Closing;
        }
        self.hooks.emit(PANEL_CLOSE_REQUEST, json!({}));
        self.dispose();
    }

    fn dispose(&self) {
        let console = {
            let mut guard = self.state.lock().unwrap();
            if guard.state == PanelState::Disposed {
                return;
            }
            guard.state = PanelState::Disposed;
            guard.console.take()
        };
        if let Some(console) = console {
            console.dispose();
        }
        debug!("panel {} disposed", self.node.id());
        self.hooks.emit(PANEL_DISPOSE, json!({}));
        self.hooks.clear();
    }
}

/// A panel hosting one code console bound to a session.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use console_panel::panel::{ConsolePanel, PanelContentFactory, PanelOptions};
/// use console_panel::testing::{FakeEditorFactory, FakeMimeTypeService, FakeRenderMime, FakeSession};
///
/// let panel = ConsolePanel::new(
///     PanelOptions::new()
///         .content_factory(Arc::new(PanelContentFactory::new(Arc::new(FakeEditorFactory::new()))))
///         .rendermime(Arc::new(FakeRenderMime::new()))
///         .session(Arc::new(FakeSession::new("scratch.py")))
///         .mime_type_service(Arc::new(FakeMimeTypeService)),
/// )
/// .unwrap();
/// panel.dispose();
/// assert!(panel.is_disposed());
/// ```
pub struct ConsolePanel {
    inner: Arc<PanelInner>,
}

impl ConsolePanel {
    pub fn new(options: PanelOptions) -> Result<Self, ConsoleError> {
        let content_factory = required(options.content_factory, "content_factory")?;
        let rendermime = required(options.rendermime, "rendermime")?;
        let session = required(options.session, "session")?;
        let mime_type_service = required(options.mime_type_service, "mime_type_service")?;
        let scheduler = options.scheduler.unwrap_or_default();

        let node = WidgetNode::new(CONSOLE_PANEL_CLASS);
        if let Some(class) = content_factory.panel_class() {
            node.add_class(&class);
        }
        if let Some(class) = &options.class_name {
            node.add_class(class);
        }

        let hooks = Arc::new(HookRegistry::new());
        hooks.set_default_fields(json!({ "panel_id": node.id() }));

        let console = content_factory.create_console(ConsoleOptions {
            content_factory: content_factory.console_content_factory().clone(),
            rendermime,
            mime_type_service,
            session: session.clone(),
            scheduler: scheduler.clone(),
            hooks: hooks.clone(),
        });
        debug!("panel {} created for {}", node.id(), session.path());

        Ok(Self {
            inner: Arc::new(PanelInner {
                node,
                session,
                content_factory,
                scheduler,
                hooks,
                state: Mutex::new(Lifecycle {
                    state: PanelState::Constructed,
                    console: Some(Arc::new(console)),
                }),
            }),
        })
    }

    /// The hosted console; `None` once disposed.
    pub fn console(&self) -> Option<Arc<CodeConsole>> {
        self.inner.console()
    }

    /// The console's current inspection handler; `None` once disposed.
    pub fn inspection_handler(&self) -> Option<InspectionHandler> {
        self.inner
            .console()
            .map(|console| console.inspection_handler().clone())
    }

    pub fn content_factory(&self) -> &Arc<dyn ContentFactory> {
        &self.inner.content_factory
    }

    pub fn session(&self) -> &Arc<dyn SessionHandle> {
        &self.inner.session
    }

    pub fn node(&self) -> &WidgetNode {
        &self.inner.node
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.inner.hooks
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn state(&self) -> PanelState {
        self.inner.state.lock().unwrap().state
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == PanelState::Disposed
    }

    /// Title for the panel: the last segment of the session path.
    pub fn label(&self) -> String {
        let path = self.inner.session.path();
        path.rsplit('/').next().unwrap_or(path).to_string()
    }

    /// Record that the panel was attached to a visual tree.
    pub fn attach(&self) {
        {
            let mut guard = self.inner.state.lock().unwrap();
            if guard.state != PanelState::Constructed {
                debug!("ignoring attach in state {}", guard.state.as_str());
                return;
            }
            guard.state = PanelState::Attached;
        }
        self.inner.hooks.emit(PANEL_ATTACH, json!({}));
    }

    /// Post an activate-request. The prompt editor holds focus after two
    /// scheduler ticks.
    pub fn activate(&self) {
        let state = self.state();
        if !state.is_attached() {
            debug!("ignoring activate in state {}", state.as_str());
            return;
        }
        let weak: Weak<PanelInner> = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .defer_sync("panel-activate-request", move || {
                if let Some(inner) = weak.upgrade() {
                    inner.activate_now();
                }
            });
    }

    /// Post a close-request. The panel is disposed after one scheduler
    /// tick. Allowed before attach.
    pub fn close(&self) {
        let state = self.state();
        if matches!(state, PanelState::Disposed | PanelState::Closing) {
            debug!("ignoring close in state {}", state.as_str());
            return;
        }
        let weak: Weak<PanelInner> = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .defer_sync("panel-close-request", move || {
                if let Some(inner) = weak.upgrade() {
                    inner.close_now();
                }
            });
    }

    /// Dispose the console and everything it owns. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for ConsolePanel {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}
