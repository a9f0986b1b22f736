use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use devgate::approval::ApprovalMode;
use devgate::checkpoint::default_threads_dir;
use devgate::policy::SafetyPolicy;
use devgate::providers::configs::{
    OpenAiProviderConfig, TavilyConfig, WhisperConfig, DEFAULT_MODEL, DEFAULT_MODEL_HOST,
    DEFAULT_SEARCH_HOST, DEFAULT_TRANSCRIPTION_MODEL,
};
use serde::Deserialize;

use crate::error::{to_env_var, ConfigError};

/// Well-known variable for the model and transcription backends
pub const MODEL_KEY_VAR: &str = "GROQ_API_KEY";
/// Well-known variable for the web search backend
pub const SEARCH_KEY_VAR: &str = "TAVILY_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> Result<OpenAiProviderConfig, ConfigError> {
        let api_key = self.api_key.ok_or_else(|| ConfigError::MissingCredential {
            env_var: format!("{} or {}", MODEL_KEY_VAR, to_env_var("provider.api_key")),
        })?;
        Ok(OpenAiProviderConfig {
            host: self.host,
            api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl SearchSettings {
    /// None when no key is configured; web search is then not offered to the model
    pub fn into_config(self) -> Option<TavilyConfig> {
        self.api_key.map(|api_key| TavilyConfig {
            host: self.host,
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
}

impl TranscriptionSettings {
    /// None when no key is configured; voice input is then unavailable
    pub fn into_config(self) -> Option<WhisperConfig> {
        self.api_key.map(|api_key| WhisperConfig {
            host: self.host,
            api_key,
            model: self.model,
        })
    }
}

/// Overrides for the safety limits; anything left out keeps its default
#[derive(Debug, Default, Deserialize)]
pub struct SafetySettings {
    #[serde(default)]
    pub denied_path_markers: Option<Vec<String>>,
    #[serde(default)]
    pub blocked_commands: Option<Vec<String>>,
    #[serde(default)]
    pub read_chunk_lines: Option<usize>,
    #[serde(default)]
    pub max_query_chars: Option<usize>,
    #[serde(default)]
    pub max_search_results: Option<usize>,
    #[serde(default)]
    pub max_list_depth: Option<usize>,
}

impl SafetySettings {
    pub fn into_policy(self) -> SafetyPolicy {
        let defaults = SafetyPolicy::default();
        SafetyPolicy {
            denied_path_markers: self
                .denied_path_markers
                .unwrap_or(defaults.denied_path_markers),
            blocked_commands: self.blocked_commands.unwrap_or(defaults.blocked_commands),
            // A zero ceiling would refuse every read
            read_chunk_lines: self
                .read_chunk_lines
                .filter(|lines| *lines > 0)
                .unwrap_or(defaults.read_chunk_lines),
            max_query_chars: self.max_query_chars.unwrap_or(defaults.max_query_chars),
            max_search_results: self
                .max_search_results
                .unwrap_or(defaults.max_search_results),
            max_list_depth: self.max_list_depth.unwrap_or(defaults.max_list_depth),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub threads_dir: Option<PathBuf>,
}

impl StorageSettings {
    pub fn threads_dir(&self) -> Option<PathBuf> {
        self.threads_dir.clone().or_else(default_threads_dir)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalSettings {
    #[serde(default)]
    pub mode: ApprovalMode,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub search: SearchSettings,
    pub transcription: TranscriptionSettings,
    #[serde(default)]
    pub safety: SafetySettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub approval: ApprovalSettings,
}

impl Settings {
    /// Load `.env`, `~/.config/devgate/config.toml` and `DEVGATE_*` variables
    pub fn new() -> Result<Self, ConfigError> {
        // A missing .env is normal
        let _ = dotenv::dotenv();
        Self::load_from(config_file().as_deref())
    }

    pub fn load_from(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("provider.host", DEFAULT_MODEL_HOST)?
            .set_default("provider.model", DEFAULT_MODEL)?
            .set_default("provider.temperature", 0.0)?
            .set_default("search.host", DEFAULT_SEARCH_HOST)?
            .set_default("transcription.host", DEFAULT_MODEL_HOST)?
            .set_default("transcription.model", DEFAULT_TRANSCRIPTION_MODEL)?;

        // The well-known variables sit below the config file and DEVGATE_* variables
        if let Ok(key) = env::var(MODEL_KEY_VAR) {
            builder = builder
                .set_default("provider.api_key", key.clone())?
                .set_default("transcription.api_key", key)?;
        }
        if let Ok(key) = env::var(SEARCH_KEY_VAR) {
            builder = builder.set_default("search.api_key", key)?;
        }

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("DEVGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            match &err {
                config::ConfigError::NotFound(field) => ConfigError::MissingCredential {
                    env_var: to_env_var(field),
                },
                _ => ConfigError::Other(err),
            }
        })
    }
}

fn config_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("devgate").join("config.toml"))
}
