use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Chat completions against any OpenAI compatible host (Groq by default)
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

/// Token counts as reported in the `usage` block of a completion
#[derive(Debug, Default, Deserialize)]
struct TokenCounts {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
    total_tokens: Option<i32>,
}

impl From<TokenCounts> for Usage {
    fn from(counts: TokenCounts) -> Self {
        let total = counts.total_tokens.or(match (counts.prompt_tokens, counts.completion_tokens) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        });
        Usage::new(counts.prompt_tokens, counts.completion_tokens, total)
    }
}

fn usage_of(response: &Value) -> Usage {
    response
        .get("usage")
        .and_then(|usage| TokenCounts::deserialize(usage).ok())
        .unwrap_or_default()
        .into()
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.host.trim_end_matches('/'))
    }

    fn request_body(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let mut conversation = vec![json!({"role": "system", "content": system})];
        conversation.extend(messages_to_openai_spec(messages));

        let mut body = json!({
            "model": self.config.model,
            "messages": conversation,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools_to_openai_spec(tools)?);
        }
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        Ok(body)
    }

    async fn send(&self, body: &Value) -> Result<Value> {
        let url = self.completions_url();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response.json().await?);
        }
        // Rate limits and outages are worth a retry by the user; anything else is our request
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(anyhow!("Server error: {}", status));
        }
        let detail = response.text().await.unwrap_or_default();
        Err(anyhow!("Request failed: {}\n{}", status, detail))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let body = self.request_body(system, messages, tools)?;
        let response = self.send(&body).await?;

        if let Some(error) = response.get("error") {
            return Err(match check_openai_context_length_error(error) {
                Some(context_error) => context_error.into(),
                None => anyhow!("Model host returned an error: {}", error),
            });
        }

        let usage = usage_of(&response);
        let message = openai_response_to_message(response)?;
        tracing::debug!(
            model = %self.config.model,
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            tool_calls = message.tool_calls.len(),
            "completion received"
        );
        Ok((message, usage))
    }
}
