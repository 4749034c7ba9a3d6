//! console-panel: composition and lifecycle core for an interactive code
//! console panel.
//!
//! A [`ConsolePanel`](panel::ConsolePanel) hosts a
//! [`CodeConsole`](console::CodeConsole) bound to an execution session, plus
//! a completion popup and an inspector pane that follow the console's live
//! prompt. The session, the editor widget and the rendering pipeline are
//! external capabilities supplied through the traits in [`traits`].
//!
//! # Crate Organization
//!
//! - `events`: Canonical lifecycle event name constants
//! - `errors`: All error types (ConsoleError, ConstructionError, etc.)
//! - `models`: Data models (ExecuteReply, CompletionReply, PanelState, etc.)
//! - `traits`: Capability contracts (SessionHandle, CodeEditor, RenderMime, etc.)
//! - `cancellation`: CancellationToken state machine
//! - `scheduler`: Deferred-work queue driven one tick at a time
//! - `hooks`: HookRegistry lifecycle observers
//! - `widget`: Widget identity and style classes
//! - `config`: ConsoleConfig loaded from TOML
//! - `session`: Session options and start/shutdown helpers
//! - `completer`: Completion popup and CompletionHandler
//! - `inspector`: Inspector pane and InspectionHandler
//! - `console`: CodeConsole, prompts, cells, ConsoleContentFactory
//! - `panel`: ConsolePanel and its ContentFactory
//! - `testing`: Concrete fakes of every capability

pub mod cancellation;
pub mod completer;
pub mod config;
pub mod console;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod inspector;
pub mod models;
pub mod panel;
pub mod scheduler;
pub mod session;
pub mod testing;
pub mod traits;
pub mod widget;

pub use console::CodeConsole;
pub use errors::ConsoleError;
pub use panel::{ConsolePanel, ContentFactory, PanelContentFactory, PanelOptions};
pub use scheduler::Scheduler;
