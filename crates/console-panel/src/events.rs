//! Canonical event name constants for panel lifecycle hooks.
//!
//! Observers registered on a [`HookRegistry`](crate::hooks::HookRegistry)
//! reference events by these constants. Names follow a `namespace:action`
//! pattern.
//!
//! | Category  | Prefix        | Description                               |
//! |-----------|---------------|-------------------------------------------|
//! | Panel     | `panel:`      | Attach, activate/close requests, disposal |
//! | Console   | `console:`    | Prompt creation, execution, clearing      |
//! | Completer | `completer:`  | Popup model updates                       |
//! | Inspector | `inspector:`  | Pane content updates                      |

// --- Panel lifecycle ---

/// The panel was attached to a visual tree.
pub const PANEL_ATTACH: &str = "panel:attach";
/// An activate-request message was delivered to the panel.
pub const PANEL_ACTIVATE_REQUEST: &str = "panel:activate-request";
/// A close-request message was delivered to the panel.
pub const PANEL_CLOSE_REQUEST: &str = "panel:close-request";
/// The panel released its resources.
pub const PANEL_DISPOSE: &str = "panel:dispose";

// --- Console ---

/// A fresh prompt editor became the live prompt.
pub const CONSOLE_PROMPT_CREATED: &str = "console:prompt-created";
/// A cell finished executing and was appended to the log.
pub const CONSOLE_EXECUTED: &str = "console:executed";
/// Executed cells were removed from the log.
pub const CONSOLE_CLEARED: &str = "console:cleared";
/// The console was rebound to a different session.
pub const CONSOLE_SESSION_CHANGED: &str = "console:session-changed";
/// The console released its resources.
pub const CONSOLE_DISPOSE: &str = "console:dispose";

// --- Assistive widgets ---

/// The completer popup received a new model.
pub const COMPLETER_UPDATE: &str = "completer:update";
/// The inspector pane received new content.
pub const INSPECTOR_UPDATE: &str = "inspector:update";

/// Observers registered under this name receive every event.
pub const WILDCARD: &str = "*";

/// All lifecycle event names, in declaration order.
pub const ALL_EVENTS: &[&str] = &[
    PANEL_ATTACH,
    PANEL_ACTIVATE_REQUEST,
    PANEL_CLOSE_REQUEST,
    PANEL_DISPOSE,
    CONSOLE_PROMPT_CREATED,
    CONSOLE_EXECUTED,
    CONSOLE_CLEARED,
    CONSOLE_SESSION_CHANGED,
    CONSOLE_DISPOSE,
    COMPLETER_UPDATE,
    INSPECTOR_UPDATE,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn event_names_are_unique_and_namespaced() {
        let unique: HashSet<_> = ALL_EVENTS.iter().collect();
        assert_eq!(unique.len(), ALL_EVENTS.len());
        for name in ALL_EVENTS {
            assert!(name.contains(':'), "{name} is not namespaced");
        }
    }
}
