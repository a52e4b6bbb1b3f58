//! Application settings
//!
//! Stored as a single JSON document in the `key_values` table. The API key
//! never leaves the core unmasked: `masked()` is what presentation layers
//! display, and saving a masked key keeps the stored one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{ai, app};
use crate::storage::{Database, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default, rename = "openAiApiKey")]
    pub openai_api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub python: PythonSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSettings {
    /// Ask the user before every shell command
    #[serde(default)]
    pub require_approval: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettings {
    #[serde(default)]
    pub google_custom_search: GoogleCustomSearchSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCustomSearchSettings {
    #[serde(default, rename = "customSearchEngineId")]
    pub custom_search_engine_id: String,
    #[serde(default)]
    pub google_cloud_api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonSettings {
    #[serde(default = "default_interpreter")]
    pub interpreter_path: String,
}

impl Default for PythonSettings {
    fn default() -> Self {
        Self {
            interpreter_path: default_interpreter(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            model: default_model(),
            terminal: TerminalSettings::default(),
            search: SearchSettings::default(),
            python: PythonSettings::default(),
        }
    }
}

fn default_model() -> String {
    ai::DEFAULT_MODEL.to_string()
}

fn default_interpreter() -> String {
    app::DEFAULT_PYTHON_INTERPRETER.to_string()
}

impl AppSettings {
    /// Load settings, falling back to defaults when none were saved
    pub fn load(db: &Database) -> Result<Self> {
        match KeyValueStore::new(db).get(app::SETTINGS_KEY)? {
            Some(json) => serde_json::from_str(&json).context("Failed to parse stored settings"),
            None => Ok(Self::default()),
        }
    }

    /// Persist settings. A masked API key keeps the previously stored key.
    pub fn save(mut self, db: &Database) -> Result<Self> {
        if self.openai_api_key == app::MASKED_API_KEY {
            self.openai_api_key = Self::load(db)?.openai_api_key;
        }
        let json = serde_json::to_string(&self)?;
        KeyValueStore::new(db).put(app::SETTINGS_KEY, &json)?;
        Ok(self)
    }

    /// Settings a run actually uses: `CUTTLEFISH_MODEL` overrides the stored model
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("CUTTLEFISH_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        self
    }

    /// Copy suitable for display: a non-empty API key is replaced by `*****`
    pub fn masked(&self) -> Self {
        let mut settings = self.clone();
        if !settings.openai_api_key.is_empty() {
            settings.openai_api_key = app::MASKED_API_KEY.to_string();
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::AppSettings;
    use crate::storage::Database;

    fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_defaults_when_nothing_saved() {
        let (db, _temp) = create_test_db();
        let settings = AppSettings::load(&db).unwrap();
        assert_eq!(settings.model, "gpt-3.5-turbo");
        assert_eq!(settings.python.interpreter_path, "python3");
        assert!(!settings.terminal.require_approval);
    }

    #[test]
    fn test_masked_key_preserves_stored_key() {
        let (db, _temp) = create_test_db();
        let settings = AppSettings {
            openai_api_key: "sk-secret".to_string(),
            ..Default::default()
        };
        settings.save(&db).unwrap();

        let shown = AppSettings::load(&db).unwrap().masked();
        assert_eq!(shown.openai_api_key, "*****");

        let mut edited = shown;
        edited.model = "gpt-4".to_string();
        edited.save(&db).unwrap();

        let stored = AppSettings::load(&db).unwrap();
        assert_eq!(stored.openai_api_key, "sk-secret");
        assert_eq!(stored.model, "gpt-4");
    }

    #[test]
    fn test_parses_camel_case_document() {
        let json = r#"{
            "openAiApiKey": "k",
            "model": "m",
            "terminal": {"requireApproval": true},
            "search": {"googleCustomSearch": {"customSearchEngineId": "cx", "googleCloudApiKey": "g"}},
            "python": {"interpreterPath": "/usr/bin/python3"}
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert!(settings.terminal.require_approval);
        assert_eq!(settings.search.google_custom_search.custom_search_engine_id, "cx");
        assert_eq!(settings.python.interpreter_path, "/usr/bin/python3");
    }
}
