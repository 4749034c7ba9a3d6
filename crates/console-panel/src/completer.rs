//! Code-completion popup and the handler that drives it.
//!
//! [`CompleterWidget`] is the popup model: the matches returned by the
//! session, the query typed since the request, and which match is active.
//! [`CompletionHandler`] mediates between one editor, one session and one
//! popup:
//!
//! - `invoke()` queues a completion request keyed by the editor's text and
//!   cursor;
//! - edits while the popup is open refilter it, and moving the cursor out of
//!   the completed range dismisses it;
//! - any edit, editor swap, session swap or disposal cancels the request in
//!   flight, so its reply is dropped instead of applied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::debug;

use crate::cancellation::CancellationToken;
use crate::errors::ConsoleError;
use crate::events::COMPLETER_UPDATE;
use crate::hooks::HookRegistry;
use crate::models::{CompletionReply, CompletionRequest, EditorChange, RequestOutcome};
use crate::scheduler::Scheduler;
use crate::traits::{CodeEditor, SessionHandle, Unsubscribe};
use crate::widget::{WidgetNode, COMPLETER_CLASS};

// ---------------------------------------------------------------------------
// CompleterWidget
// ---------------------------------------------------------------------------

/// Options for a new completion popup. Every field has a default.
#[derive(Debug, Clone, Default)]
pub struct CompleterOptions {
    /// Most matches shown at once; `None` uses 10.
    pub max_items: Option<usize>,
}

#[derive(Debug, Default)]
struct CompleterState {
    /// Every match from the last reply.
    matches: Vec<String>,
    /// Matches that survive the current query, in reply order.
    filtered: Vec<String>,
    query: String,
    cursor_start: usize,
    cursor_end: usize,
    active: usize,
    visible: bool,
}

/// The completion popup.
#[derive(Debug)]
pub struct CompleterWidget {
    node: WidgetNode,
    max_items: usize,
    state: Mutex<CompleterState>,
    disposed: AtomicBool,
}

impl CompleterWidget {
    pub fn new(options: CompleterOptions) -> Self {
        Self {
            node: WidgetNode::new(COMPLETER_CLASS),
            max_items: options.max_items.unwrap_or(10).max(1),
            state: Mutex::new(CompleterState::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn node(&self) -> &WidgetNode {
        &self.node
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Load a session reply. `query` is the text already typed inside the
    /// reply's cursor range. An empty result leaves the popup hidden.
    pub fn set_reply(&self, reply: &CompletionReply, query: &str) {
        if self.is_disposed() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.matches = reply.matches.clone();
        state.cursor_start = reply.cursor_start;
        state.cursor_end = reply.cursor_end;
        refilter(&mut state, query);
    }

    /// Narrow the visible matches to those starting with `query`. Hides the
    /// popup and returns `false` when nothing matches.
    pub fn update_query(&self, query: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.matches.is_empty() {
            return false;
        }
        refilter(&mut state, query);
        state.visible
    }

    /// Visible matches, capped at `max_items`.
    pub fn items(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        if !state.visible {
            return Vec::new();
        }
        state.filtered.iter().take(self.max_items).cloned().collect()
    }

    pub fn query(&self) -> String {
        self.state.lock().unwrap().query.clone()
    }

    /// Character range `(start, end)` the reply applies to.
    pub fn cursor_range(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.cursor_start, state.cursor_end)
    }

    pub fn active_index(&self) -> usize {
        self.state.lock().unwrap().active
    }

    pub fn active_item(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        if !state.visible {
            return None;
        }
        state.filtered.get(state.active).cloned()
    }

    /// Move the selection down, wrapping within the visible items.
    pub fn select_next(&self) {
        let mut state = self.state.lock().unwrap();
        let shown = state.filtered.len().min(self.max_items);
        if state.visible && shown > 0 {
            state.active = (state.active + 1) % shown;
        }
    }

    /// Move the selection up, wrapping within the visible items.
    pub fn select_previous(&self) {
        let mut state = self.state.lock().unwrap();
        let shown = state.filtered.len().min(self.max_items);
        if state.visible && shown > 0 {
            state.active = (state.active + shown - 1) % shown;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().unwrap().visible
    }

    /// Clear the model and hide the popup.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = CompleterState::default();
    }

    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reset();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

fn refilter(state: &mut CompleterState, query: &str) {
    state.query = query.to_string();
    state.filtered = state
        .matches
        .iter()
        .filter(|m| m.starts_with(query))
        .cloned()
        .collect();
    state.active = 0;
    state.visible = !state.filtered.is_empty();
}

// ---------------------------------------------------------------------------
// CompletionHandler
// ---------------------------------------------------------------------------

/// Options for a new completion handler.
pub struct CompleterHandlerOptions {
    /// The popup the handler drives. Required.
    pub completer: Arc<CompleterWidget>,
    /// Queue for deferred requests.
    pub scheduler: Scheduler,
}

impl CompleterHandlerOptions {
    pub fn new(completer: Arc<CompleterWidget>) -> Self {
        Self {
            completer,
            scheduler: Scheduler::new(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }
}

struct CompletionState {
    editor: Option<Arc<dyn CodeEditor>>,
    session: Option<Arc<dyn SessionHandle>>,
    unsubscribe: Option<Unsubscribe>,
    token: CancellationToken,
    hooks: Option<Arc<HookRegistry>>,
    disposed: bool,
}

struct CompletionShared {
    completer: Arc<CompleterWidget>,
    scheduler: Scheduler,
    state: Mutex<CompletionState>,
}

/// Mediates between an editor, a session and a [`CompleterWidget`].
///
/// Cloning yields another handle to the same handler.
#[derive(Clone)]
pub struct CompletionHandler {
    shared: Arc<CompletionShared>,
}

impl CompletionHandler {
    /// A handler wired to `options.completer`, not yet bound to an editor or
    /// a session.
    pub fn new(options: CompleterHandlerOptions) -> Self {
        Self {
            shared: Arc::new(CompletionShared {
                completer: options.completer,
                scheduler: options.scheduler,
                state: Mutex::new(CompletionState {
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

    /// The popup this handler drives.
    pub fn completer(&self) -> &Arc<CompleterWidget> {
        &self.shared.completer
    }

    pub fn editor(&self) -> Option<Arc<dyn CodeEditor>> {
        self.shared.state.lock().unwrap().editor.clone()
    }

    pub fn session(&self) -> Option<Arc<dyn SessionHandle>> {
        self.shared.state.lock().unwrap().session.clone()
    }

    /// Bind to `editor`, replacing any previous binding.
    ///
    /// Cancels the request in flight, removes the listener from the old
    /// editor, and dismisses the popup before subscribing to the new one.
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
        self.shared.completer.reset();

        if let Some(editor) = editor {
            let weak: Weak<CompletionShared> = Arc::downgrade(&self.shared);
            let unsubscribe = editor.on_change(Arc::new(move |change: &EditorChange| {
                if let Some(shared) = weak.upgrade() {
                    CompletionHandler { shared }.on_editor_change(change);
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

    /// Bind to `session`, cancelling the request in flight.
    pub fn set_session(&self, session: Option<Arc<dyn SessionHandle>>) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.token.renew();
            state.session = session;
        }
        self.shared.completer.reset();
    }

    /// Announce popup updates on `hooks` as `completer:update`.
    pub fn set_hooks(&self, hooks: Option<Arc<HookRegistry>>) {
        self.shared.state.lock().unwrap().hooks = hooks;
    }

    /// Queue a completion request for the next scheduler tick.
    pub fn invoke(&self) {
        if self.is_disposed() {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        self.shared.scheduler.defer(
            "completion-request",
            Box::new(move || {
                Box::pin(async move {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = (CompletionHandler { shared }).fetch().await {
                        log::warn!("completion request failed: {e}");
                    }
                })
            }),
        );
    }

    /// Issue a completion request now and apply the reply to the popup if
    /// it is still current when it arrives.
    pub async fn fetch(&self) -> Result<RequestOutcome, ConsoleError> {
        let (editor, session, token) = {
            let state = self.shared.state.lock().unwrap();
            if state.disposed {
                return Ok(RequestOutcome::Skipped);
            }
            match (&state.editor, &state.session) {
                (Some(editor), Some(session)) => {
                    (editor.clone(), session.clone(), state.token.clone())
                }
                _ => return Ok(RequestOutcome::Skipped),
            }
        };

        let request = CompletionRequest {
            code: editor.text(),
            cursor_pos: editor.cursor(),
        };
        let reply = session.complete(request.clone()).await?;

        if token.is_cancelled() || self.is_disposed() {
            debug!("discarding stale completion reply for editor {}", editor.id());
            return Ok(RequestOutcome::Stale);
        }

        let query = slice_chars(&request.code, reply.cursor_start, request.cursor_pos);
        self.shared.completer.set_reply(&reply, &query);

        let hooks = self.shared.state.lock().unwrap().hooks.clone();
        if let Some(hooks) = hooks {
            hooks.emit(
                COMPLETER_UPDATE,
                serde_json::json!({
                    "editor_id": editor.id(),
                    "matches": reply.matches.len(),
                    "visible": self.shared.completer.is_visible(),
                }),
            );
        }
        Ok(RequestOutcome::Applied)
    }

    /// Insert the active match into the editor and dismiss the popup.
    /// Returns the inserted text.
    pub fn accept(&self) -> Option<String> {
        let editor = self.editor()?;
        let completer = &self.shared.completer;
        let item = completer.active_item()?;
        let (start, _) = completer.cursor_range();
        completer.reset();

        let text = editor.text();
        let cursor = editor.cursor();
        let chars: Vec<char> = text.chars().collect();
        let start = start.min(chars.len());
        let end = cursor.clamp(start, chars.len());
        let mut updated: String = chars[..start].iter().collect();
        updated.push_str(&item);
        updated.extend(&chars[end..]);

        editor.set_text(&updated);
        editor.set_cursor(start + item.chars().count());
        Some(item)
    }

    fn on_editor_change(&self, change: &EditorChange) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.token.renew();
        }

        let completer = &self.shared.completer;
        if !completer.is_visible() {
            return;
        }
        let (start, _) = completer.cursor_range();
        if change.cursor < start {
            completer.reset();
            return;
        }
        let query = slice_chars(&change.text, start, change.cursor);
        if !completer.update_query(&query) {
            completer.reset();
        }
    }

    /// Idempotent; cancels the request in flight, unbinds, and disposes the
    /// popup.
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
        self.shared.completer.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().unwrap().disposed
    }

    /// Whether two handles refer to the same handler.
    pub fn ptr_eq(&self, other: &CompletionHandler) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Characters `start..end` of `text`, clamped to its length.
pub(crate) fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEditor, FakeSession};
    use crate::traits::EditorOptions;

    fn reply(matches: &[&str], start: usize, end: usize) -> CompletionReply {
        CompletionReply {
            matches: matches.iter().map(|m| m.to_string()).collect(),
            cursor_start: start,
            cursor_end: end,
            metadata: serde_json::Map::new(),
        }
    }

    fn bound_handler() -> (CompletionHandler, Arc<FakeEditor>, Arc<FakeSession>) {
        let handler = CompletionHandler::new(CompleterHandlerOptions::new(Arc::new(
            CompleterWidget::new(CompleterOptions::default()),
        )));
        let editor = Arc::new(FakeEditor::new(EditorOptions::default()));
        let session = Arc::new(FakeSession::new("a.py"));
        handler.set_editor(Some(editor.clone()));
        handler.set_session(Some(session.clone()));
        (handler, editor, session)
    }

    // ---------------------------------------------------------------
    // CompleterWidget
    // ---------------------------------------------------------------

    #[test]
    fn widget_starts_hidden_and_empty() {
        let widget = CompleterWidget::new(CompleterOptions::default());
        assert!(!widget.is_visible());
        assert!(widget.items().is_empty());
        assert_eq!(widget.max_items(), 10);
        assert!(widget.node().has_class(COMPLETER_CLASS));
    }

    #[test]
    fn set_reply_filters_by_query_and_caps_items() {
        let widget = CompleterWidget::new(CompleterOptions { max_items: Some(2) });
        widget.set_reply(&reply(&["print", "property", "pass"], 0, 1), "pr");
        assert!(widget.is_visible());
        assert_eq!(widget.items(), vec!["print", "property"]);

        widget.set_reply(&reply(&["a", "ab", "abc"], 0, 0), "");
        assert_eq!(widget.items(), vec!["a", "ab"]);
    }

    #[test]
    fn empty_reply_stays_hidden() {
        let widget = CompleterWidget::new(CompleterOptions::default());
        widget.set_reply(&reply(&[], 0, 0), "");
        assert!(!widget.is_visible());
        assert_eq!(widget.active_item(), None);
    }

    #[test]
    fn selection_wraps() {
        let widget = CompleterWidget::new(CompleterOptions::default());
        widget.set_reply(&reply(&["a", "b", "c"], 0, 0), "");
        widget.select_previous();
        assert_eq!(widget.active_item().as_deref(), Some("c"));
        widget.select_next();
        assert_eq!(widget.active_index(), 0);
    }

    #[test]
    fn update_query_hides_on_no_match() {
        let widget = CompleterWidget::new(CompleterOptions::default());
        widget.set_reply(&reply(&["print", "range"], 0, 0), "");
        assert!(widget.update_query("ra"));
        assert_eq!(widget.items(), vec!["range"]);
        assert!(!widget.update_query("zz"));
        assert!(!widget.is_visible());
    }

    #[test]
    fn disposed_widget_ignores_replies() {
        let widget = CompleterWidget::new(CompleterOptions::default());
        widget.dispose();
        widget.dispose();
        widget.set_reply(&reply(&["x"], 0, 0), "");
        assert!(widget.is_disposed());
        assert!(!widget.is_visible());
    }

    // ---------------------------------------------------------------
    // CompletionHandler binding
    // ---------------------------------------------------------------

    #[test]
    fn new_handler_wraps_the_given_popup_and_is_unbound() {
        let completer = Arc::new(CompleterWidget::new(CompleterOptions::default()));
        let handler = CompletionHandler::new(CompleterHandlerOptions::new(completer.clone()));
        assert!(Arc::ptr_eq(handler.completer(), &completer));
        assert!(handler.editor().is_none());
        assert!(handler.session().is_none());
    }

    #[test]
    fn rebinding_moves_the_single_listener() {
        let (handler, first, _) = bound_handler();
        assert_eq!(first.listener_count(), 1);

        let second = Arc::new(FakeEditor::new(EditorOptions::default()));
        handler.set_editor(Some(second.clone()));
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);
        assert_eq!(handler.editor().unwrap().id(), second.id());

        handler.set_editor(None);
        assert_eq!(second.listener_count(), 0);
    }

    #[tokio::test]
    async fn fetch_without_binding_is_skipped() {
        let handler = CompletionHandler::new(CompleterHandlerOptions::new(Arc::new(
            CompleterWidget::new(CompleterOptions::default()),
        )));
        assert_eq!(handler.fetch().await.unwrap(), RequestOutcome::Skipped);
    }

    // ---------------------------------------------------------------
    // Requests
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn fetch_applies_reply_to_popup() {
        let (handler, editor, session) = bound_handler();
        editor.type_text("x = pr");

        assert_eq!(handler.fetch().await.unwrap(), RequestOutcome::Applied);
        let completer = handler.completer();
        assert_eq!(completer.items(), vec!["print", "property"]);
        assert_eq!(completer.query(), "pr");
        assert_eq!(session.completion_requests()[0].cursor_pos, 6);
    }

    #[tokio::test]
    async fn invoke_defers_to_the_scheduler() {
        let scheduler = Scheduler::new();
        let handler = CompletionHandler::new(
            CompleterHandlerOptions::new(Arc::new(CompleterWidget::new(
                CompleterOptions::default(),
            )))
            .with_scheduler(scheduler.clone()),
        );
        let editor = Arc::new(FakeEditor::new(EditorOptions::default()));
        let session = Arc::new(FakeSession::new("a.py"));
        handler.set_editor(Some(editor.clone()));
        handler.set_session(Some(session.clone()));
        editor.type_text("ra");

        handler.invoke();
        assert!(session.completion_requests().is_empty());
        scheduler.run_pending_work().await;
        assert_eq!(handler.completer().items(), vec!["range"]);
    }

    #[tokio::test]
    async fn reply_after_editor_change_is_stale() {
        let (handler, editor, session) = bound_handler();
        editor.type_text("pr");
        session.hold_replies();

        let (outcome, _) = tokio::join!(handler.fetch(), async {
            tokio::task::yield_now().await;
            editor.type_text("i");
            session.release_replies();
        });
        assert_eq!(outcome.unwrap(), RequestOutcome::Stale);
        assert!(!handler.completer().is_visible());
    }

    #[tokio::test]
    async fn reply_after_rebinding_is_stale() {
        let (handler, editor, session) = bound_handler();
        editor.type_text("pr");
        session.hold_replies();

        let replacement = Arc::new(FakeEditor::new(EditorOptions::default()));
        let (outcome, _) = tokio::join!(handler.fetch(), async {
            tokio::task::yield_now().await;
            handler.set_editor(Some(replacement.clone()));
            session.release_replies();
        });
        assert_eq!(outcome.unwrap(), RequestOutcome::Stale);
    }

    #[tokio::test]
    async fn reply_after_dispose_is_dropped() {
        let (handler, editor, session) = bound_handler();
        editor.type_text("pr");
        session.hold_replies();

        let (outcome, _) = tokio::join!(handler.fetch(), async {
            tokio::task::yield_now().await;
            handler.dispose();
            session.release_replies();
        });
        assert_eq!(outcome.unwrap(), RequestOutcome::Stale);
        assert!(handler.completer().is_disposed());
        assert!(!handler.completer().is_visible());
    }

    #[tokio::test]
    async fn applied_reply_is_announced() {
        let (handler, editor, _) = bound_handler();
        let hooks = Arc::new(HookRegistry::new());
        let observer = Arc::new(crate::testing::RecordingObserver::new());
        hooks.register(COMPLETER_UPDATE, observer.clone(), 0, None);
        handler.set_hooks(Some(hooks));

        editor.type_text("pr");
        handler.fetch().await.unwrap();
        let events = observer.recorded_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1["matches"], 2);
        assert_eq!(events[0].1["visible"], true);
    }

    #[tokio::test]
    async fn session_failure_propagates() {
        let (handler, editor, session) = bound_handler();
        editor.type_text("pr");
        session.dispose();
        let err = handler.fetch().await.unwrap_err();
        assert!(matches!(err, ConsoleError::Session(_)));
    }

    // ---------------------------------------------------------------
    // Typing with the popup open
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn typing_refilters_and_moving_left_dismisses() {
        let (handler, editor, _) = bound_handler();
        editor.type_text("x = pr");
        handler.fetch().await.unwrap();
        assert_eq!(handler.completer().items().len(), 2);

        editor.type_text("o");
        assert_eq!(handler.completer().items(), vec!["property"]);

        editor.set_cursor(2);
        assert!(!handler.completer().is_visible());
    }

    #[tokio::test]
    async fn typing_past_every_match_dismisses() {
        let (handler, editor, _) = bound_handler();
        editor.type_text("le");
        handler.fetch().await.unwrap();
        editor.type_text("x");
        assert!(!handler.completer().is_visible());
    }

    #[tokio::test]
    async fn accept_inserts_active_match() {
        let (handler, editor, _) = bound_handler();
        editor.type_text("x = ra");
        handler.fetch().await.unwrap();

        assert_eq!(handler.accept().as_deref(), Some("range"));
        assert_eq!(editor.text(), "x = range");
        assert_eq!(editor.cursor(), 9);
        assert!(!handler.completer().is_visible());
    }

    #[test]
    fn dispose_is_idempotent_and_unbinds() {
        let (handler, editor, _) = bound_handler();
        handler.dispose();
        handler.dispose();
        assert!(handler.is_disposed());
        assert!(handler.editor().is_none());
        assert_eq!(editor.listener_count(), 0);

        // Rebinding a disposed handler is a no-op.
        handler.set_editor(Some(editor.clone()));
        assert_eq!(editor.listener_count(), 0);
    }

    #[test]
    fn dispose_during_subscription_removes_the_listener() {
        let handler = CompletionHandler::new(CompleterHandlerOptions::new(Arc::new(
            CompleterWidget::new(CompleterOptions::default()),
        )));
        let editor = Arc::new(FakeEditor::new(EditorOptions::default()));
        let disposer = handler.clone();
        editor.on_next_subscribe(move || disposer.dispose());

        handler.set_editor(Some(editor.clone()));
        assert!(handler.is_disposed());
        assert_eq!(editor.listener_count(), 0);
    }

    #[test]
    fn slice_chars_clamps() {
        assert_eq!(slice_chars("héllo", 1, 3), "él");
        assert_eq!(slice_chars("ab", 1, 10), "b");
        assert_eq!(slice_chars("ab", 3, 1), "");
    }
}
