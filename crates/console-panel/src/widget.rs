//! Identity and style classification for composed widgets.

use std::sync::Mutex;

/// Class applied to every console panel root node.
pub const CONSOLE_PANEL_CLASS: &str = "jp-ConsolePanel";
/// Class applied to the code console.
pub const CODE_CONSOLE_CLASS: &str = "jp-CodeConsole";
/// Class applied to the completion popup.
pub const COMPLETER_CLASS: &str = "jp-Completer";
/// Class applied to the inspector pane.
pub const INSPECTOR_CLASS: &str = "jp-Inspector";
/// Class applied to prompt editors.
pub const PROMPT_CLASS: &str = "jp-ConsolePrompt";

/// The root visual node of a widget: a stable id plus an ordered class list.
#[derive(Debug)]
pub struct WidgetNode {
    id: String,
    classes: Mutex<Vec<String>>,
}

impl WidgetNode {
    /// Create a node with a generated id and the given initial class.
    pub fn new(class: &str) -> Self {
        let node = Self {
            id: format!("id-{}", uuid::Uuid::new_v4()),
            classes: Mutex::new(Vec::new()),
        };
        node.add_class(class);
        node
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a class. Duplicates and empty names are ignored.
    pub fn add_class(&self, class: &str) {
        let class = class.trim();
        if class.is_empty() {
            return;
        }
        let mut classes = self.classes.lock().unwrap();
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }

    pub fn remove_class(&self, class: &str) {
        self.classes.lock().unwrap().retain(|c| c != class);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.lock().unwrap().iter().any(|c| c == class)
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_carries_initial_class_and_unique_id() {
        let a = WidgetNode::new(CONSOLE_PANEL_CLASS);
        let b = WidgetNode::new(CONSOLE_PANEL_CLASS);
        assert!(a.has_class(CONSOLE_PANEL_CLASS));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn add_class_ignores_duplicates_and_blanks() {
        let node = WidgetNode::new("a");
        node.add_class("a");
        node.add_class("  ");
        node.add_class("b");
        assert_eq!(node.classes(), vec!["a", "b"]);
        node.remove_class("a");
        assert!(!node.has_class("a"));
    }
}
