//! Core data models shared by the console, its handlers, and the session.
//!
//! All structs use `serde` so requests and replies can be logged or carried
//! across a JSON boundary unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A set of alternative representations of one payload, keyed by mime type.
pub type MimeBundle = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Connection status reported by a session handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Unknown,
    Starting,
    Idle,
    Busy,
    Restarting,
    Dead,
}

/// Outcome status of an execute request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteStatus {
    #[default]
    Ok,
    Error,
    Aborted,
}

/// What happened to a completion or inspection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The reply was applied to the popup or pane.
    Applied,
    /// The reply arrived after its editor was replaced or its handler was
    /// disposed and was discarded.
    Stale,
    /// No request was issued (no editor, no session, or disposed).
    Skipped,
}

/// Lifecycle state of a [`ConsolePanel`](crate::panel::ConsolePanel).
///
/// ```text
/// Constructed ─→ Attached ─→ Activated ─→ Closing ─→ Disposed
///      │            │                                  ↑
///      └────────────┴──────── dispose() ───────────────┘
/// ```
///
/// `Disposed` is absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelState {
    #[default]
    Constructed,
    Attached,
    Activated,
    Closing,
    Disposed,
}

impl PanelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Attached => "attached",
            Self::Activated => "activated",
            Self::Closing => "closing",
            Self::Disposed => "disposed",
        }
    }

    /// Whether the panel is in the visual tree and not yet closing.
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Attached | Self::Activated)
    }
}

// ---------------------------------------------------------------------------
// Session metadata
// ---------------------------------------------------------------------------

/// Language metadata advertised by the session's kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Explicit mime type, when the kernel advertises one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

// ---------------------------------------------------------------------------
// Requests and replies
// ---------------------------------------------------------------------------

/// Execute the given code in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub store_history: bool,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Reply to an [`ExecuteRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub status: ExecuteStatus,
    #[serde(default)]
    pub execution_count: Option<u64>,
    /// Display payloads produced while executing, in emission order.
    #[serde(default)]
    pub outputs: Vec<MimeBundle>,
}

/// Ask the session for completions at a cursor position.
///
/// `cursor_pos` is a character offset into `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub code: String,
    pub cursor_pos: usize,
}

/// Reply to a [`CompletionRequest`].
///
/// `cursor_start..cursor_end` is the character range the matches replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionReply {
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Ask the session to introspect the object under the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRequest {
    pub code: String,
    pub cursor_pos: usize,
    /// 0 for a summary, 1 for full detail (source where available).
    #[serde(default)]
    pub detail_level: u8,
}

/// Reply to an [`InspectionRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectionReply {
    pub found: bool,
    #[serde(default)]
    pub data: MimeBundle,
}

// ---------------------------------------------------------------------------
// Rendered content and editor events
// ---------------------------------------------------------------------------

/// Visual content produced by a [`RenderMime`](crate::traits::RenderMime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedOutput {
    pub mime_type: String,
    pub content: String,
}

/// Text/cursor snapshot delivered to editor change listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorChange {
    pub editor_id: String,
    pub text: String,
    /// Character offset of the cursor.
    pub cursor: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
    }

    #[test]
    fn execute_request_defaults_store_history() {
        let req: ExecuteRequest = serde_json::from_str(r#"{"code": "1 + 1"}"#).unwrap();
        assert!(req.store_history);
        assert!(!req.silent);
        assert_eq!(req, ExecuteRequest::new("1 + 1"));
    }

    #[test]
    fn execute_reply_deserializes_outputs() {
        let reply: ExecuteReply = serde_json::from_value(serde_json::json!({
            "status": "error",
            "execution_count": 3,
            "outputs": [{"text/plain": "NameError"}]
        }))
        .unwrap();
        assert_eq!(reply.status, ExecuteStatus::Error);
        assert_eq!(reply.execution_count, Some(3));
        assert_eq!(reply.outputs[0]["text/plain"], "NameError");
    }

    #[test]
    fn panel_state_attachment() {
        assert!(!PanelState::Constructed.is_attached());
        assert!(PanelState::Attached.is_attached());
        assert!(PanelState::Activated.is_attached());
        assert!(!PanelState::Closing.is_attached());
        assert_eq!(PanelState::Disposed.as_str(), "disposed");
    }
}
