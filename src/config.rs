//! Configuration for the chat companion.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::companion_dirs;
use crate::error::{CompanionError, Result};
use crate::llm::GenerationOptions;
use crate::llm::prompt::CONTINUATION_CUE;
use crate::message::ConversationId;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Local model settings.
    pub model: ModelConfig,
    /// Conversation sequencing settings.
    pub chat: ChatConfig,
    /// Persistence settings.
    pub storage: StorageConfig,
}

/// Local language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the GGUF weights file.
    pub path: PathBuf,
    /// Context window in tokens.
    pub context_size_tokens: usize,
    /// CPU worker threads for inference (applied at process start).
    pub threads: usize,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens generated per reply.
    pub max_tokens: usize,
    /// Nucleus sampling threshold.
    pub top_p: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: companion_dirs::default_model_path(),
            context_size_tokens: 2048,
            threads: 4,
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.95,
        }
    }
}

impl ModelConfig {
    /// Sampling options derived from this config.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::default()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_top_p(self.top_p)
    }

    /// File name of the configured model.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
    }
}

/// Conversation sequencing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Conversation shown by the chat screen.
    pub conversation_id: ConversationId,
    /// Characters of a document kept by `analyze_document`.
    pub document_char_budget: usize,
    /// Characters of transcript kept when summarizing a conversation.
    pub summary_char_budget: usize,
    /// User turn sent when continuing the previous answer.
    pub continuation_cue: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            conversation_id: 1,
            document_char_budget: 5000,
            summary_char_budget: 6000,
            continuation_cue: CONTINUATION_CUE.to_owned(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Where "export chat" writes its JSON document.
    pub export_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: companion_dirs::database_file(),
            export_path: companion_dirs::export_file(),
        }
    }
}

impl CompanionConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CompanionError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CompanionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        companion_dirs::config_file()
    }
}
