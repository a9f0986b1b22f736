use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::configs::TavilyConfig;

/// One web search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

pub struct TavilySearch {
    client: Client,
    config: TavilyConfig,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

impl TavilySearch {
    pub fn new(config: TavilyConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SearchBackend for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/search", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "api_key": self.config.api_key,
                "query": query,
                "max_results": max_results,
            }))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Search request failed: {}\n{}", status, body));
        }

        let body: TavilyResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .take(max_results)
            .map(|result| SearchHit {
                text: result.content,
                source: result.url,
            })
            .collect())
    }
}
