//! Panel configuration loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```toml
//! panel_class = "my-console"
//!
//! [completer]
//! max_items = 20
//!
//! [inspector]
//! detail_level = 1
//!
//! [prompt]
//! default_mime_type = "text/x-python"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConsoleError;

/// Completion popup settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompleterConfig {
    /// Most matches shown at once.
    pub max_items: usize,
}

impl Default for CompleterConfig {
    fn default() -> Self {
        Self { max_items: 10 }
    }
}

/// Inspector settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// 0 for a summary, 1 for full detail.
    pub detail_level: u8,
}

/// Prompt editor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Mime type used when the session has no language info yet.
    pub default_mime_type: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            default_mime_type: "text/plain".into(),
        }
    }
}

/// Top-level console configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Extra class added to every panel node.
    pub panel_class: Option<String>,
    pub completer: CompleterConfig,
    pub inspector: InspectorConfig,
    pub prompt: PromptConfig,
}

impl ConsoleConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConsoleError> {
        let config: Self = toml::from_str(text).map_err(|e| ConsoleError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConsoleError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConsoleError> {
        if self.completer.max_items == 0 {
            return Err(ConsoleError::Config {
                message: "completer.max_items must be at least 1".into(),
            });
        }
        if self.inspector.detail_level > 1 {
            return Err(ConsoleError::Config {
                message: "inspector.detail_level must be 0 or 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ConsoleConfig::from_toml_str("").unwrap();
        assert_eq!(config, ConsoleConfig::default());
        assert_eq!(config.completer.max_items, 10);
        assert_eq!(config.prompt.default_mime_type, "text/plain");
    }

    #[test]
    fn parses_all_sections() {
        let config = ConsoleConfig::from_toml_str(
            r#"
            panel_class = "my-console"

            [completer]
            max_items = 3

            [inspector]
            detail_level = 1

            [prompt]
            default_mime_type = "text/x-python"
            "#,
        )
        .unwrap();
        assert_eq!(config.panel_class.as_deref(), Some("my-console"));
        assert_eq!(config.completer.max_items, 3);
        assert_eq!(config.inspector.detail_level, 1);
        assert_eq!(config.prompt.default_mime_type, "text/x-python");
    }

    #[test]
    fn rejects_zero_max_items() {
        let err = ConsoleConfig::from_toml_str("[completer]\nmax_items = 0").unwrap_err();
        assert!(err.to_string().contains("max_items"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ConsoleConfig::from_toml_str("panel_class = [").unwrap_err();
        assert!(matches!(err, ConsoleError::Config { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[inspector]\ndetail_level = 1").unwrap();
        let config = ConsoleConfig::load(file.path()).unwrap();
        assert_eq!(config.inspector.detail_level, 1);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConsoleConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
