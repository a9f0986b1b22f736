//! Connection settings for the external backends.
//!
//! These are plain values; loading them from files and the environment is the binary's job.

pub const DEFAULT_MODEL_HOST: &str = "https://api.groq.com/openai";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3";
pub const DEFAULT_SEARCH_HOST: &str = "https://api.tavily.com";

/// Any OpenAI compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: DEFAULT_MODEL_HOST.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TavilyConfig {
    pub host: String,
    pub api_key: String,
}

impl TavilyConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: DEFAULT_SEARCH_HOST.to_string(),
            api_key: api_key.into(),
        }
    }
}

/// An OpenAI compatible `/v1/audio/transcriptions` endpoint
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
}

impl WhisperConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: DEFAULT_MODEL_HOST.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        }
    }
}
