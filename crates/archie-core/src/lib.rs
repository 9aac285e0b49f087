pub mod diagram;
pub mod error;
pub mod merge;
pub mod parse;
pub mod rules;
pub mod store;
pub mod tasks;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use diagram::{project, MermaidMarkdown, Renderer};
pub use error::{RenderError, StoreError};
pub use merge::merge;
pub use parse::{parse_response, ParsedResponse};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore, StoredSession};
pub use tasks::TaskDescriptor;

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    #[serde(alias = "gpt")]
    Assistant,
}

/// One message of the design conversation. Never edited after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub author: Author,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            author: Author::Assistant,
            text: text.into(),
        }
    }
}

/// A node of the architecture graph. Identity is `id`; everything else may change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
pub struct Component {
    /// Stable identifier, referenced by data flows (e.g. "api_gateway")
    #[serde(default)]
    pub id: String,
    /// Human-readable name shown on the diagram
    #[serde(default)]
    pub name: String,
    /// Implementation technology, e.g. "PostgreSQL"
    #[serde(default, alias = "technology", skip_serializing_if = "Option::is_none")]
    pub tech: Option<String>,
    /// What this component is responsible for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A directed edge between two components.
///
/// Endpoints are not checked against the component list here; flows pointing at
/// components that do not exist (yet) stay in the model and are only skipped
/// when the diagram is projected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
pub struct DataFlow {
    /// Id of the initiating component
    #[serde(default, alias = "source")]
    pub from: String,
    /// Id of the receiving component
    #[serde(default, alias = "target")]
    pub to: String,
    /// What travels along this flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Protocol or interaction style, e.g. "REST", "gRPC", "events"
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub flow_type: Option<String>,
}

/// The full architecture accumulated over a design session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
pub struct Architecture {
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, alias = "dataFlows")]
    pub data_flows: Vec<DataFlow>,
}

impl Architecture {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.data_flows.is_empty()
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }
}

// --- Storage ---

/// Resolve the global data directory (~/.archie/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".archie")
}

/// Directory holding the persisted session slots.
pub fn session_dir() -> PathBuf {
    data_dir().join("session")
}

/// Default location of the rendered diagram.
pub fn default_diagram_path() -> PathBuf {
    data_dir().join("architecture.md")
}

/// Write a file via temp file + rename so readers never observe a torn write.
pub fn write_atomic(path: &Path, data: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", file_name));
    fs::write(&tmp, data).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

// --- AI Settings ---

/// Seconds to wait for the completion service before giving up on a cycle.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl AiSettings {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn read_settings() -> AiSettings {
    read_settings_from(&settings_path())
}

/// Missing or unreadable settings fall back to defaults.
pub fn read_settings_from(path: &Path) -> AiSettings {
    if !path.exists() {
        return AiSettings::default();
    }
    match fs::read_to_string(path)
        .ok()
        .map(|s| serde_json::from_str::<AiSettings>(&s))
    {
        Some(Ok(settings)) => settings,
        Some(Err(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings");
            AiSettings::default()
        }
        None => AiSettings::default(),
    }
}

pub fn write_settings(settings: &AiSettings) -> Result<(), StoreError> {
    write_settings_to(&settings_path(), settings)
}

pub fn write_settings_to(path: &Path, settings: &AiSettings) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(settings).map_err(|e| StoreError::Encode {
        key: "settings".to_string(),
        source: e,
    })?;
    write_atomic(path, &json)
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_aliases_decode() {
        let raw = r#"{
            "components": [{"id": "db", "name": "Database", "technology": "PostgreSQL"}],
            "dataFlows": [{"source": "api", "target": "db", "type": "SQL"}]
        }"#;
        let arch: Architecture = serde_json::from_str(raw).unwrap();
        assert_eq!(arch.components[0].tech.as_deref(), Some("PostgreSQL"));
        assert_eq!(arch.data_flows[0].from, "api");
        assert_eq!(arch.data_flows[0].flow_type.as_deref(), Some("SQL"));
    }

    #[test]
    fn legacy_author_tag_is_assistant() {
        let turn: Turn = serde_json::from_str(r#"{"author":"gpt","text":"hi"}"#).unwrap();
        assert_eq!(turn, Turn::assistant("hi"));
        assert_eq!(
            serde_json::to_string(&turn).unwrap(),
            r#"{"author":"assistant","text":"hi"}"#
        );
    }

    #[test]
    fn settings_round_trip_and_lenient_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(read_settings_from(&path), AiSettings::default());

        let settings = AiSettings {
            provider: "ollama".into(),
            model: "llama3".into(),
            base_url: Some("http://localhost:11434".into()),
            ..Default::default()
        };
        write_settings_to(&path, &settings).unwrap();
        assert_eq!(read_settings_from(&path), settings);
        assert!(ai_configured(&settings));
        assert_eq!(settings.timeout_secs(), DEFAULT_TIMEOUT_SECS);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(read_settings_from(&path), AiSettings::default());
    }

    #[test]
    fn hosted_providers_need_a_key() {
        let settings = AiSettings {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        };
        assert!(!ai_configured(&settings));
    }
}
