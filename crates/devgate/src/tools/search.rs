use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ToolError;
use crate::policy::SafetyPolicy;
use crate::providers::search::SearchBackend;
use crate::registry::{ToolDefinition, ToolHandler};
use crate::schema::{ArgKind, ArgumentSchema, ArgumentSpec, Arguments};

const RESULT_SEPARATOR: &str = "\n\n---\n\n";

/// Web search for documentation and error messages
pub struct WebSearch {
    definition: ToolDefinition,
    backend: Arc<dyn SearchBackend>,
    policy: Arc<SafetyPolicy>,
}

impl WebSearch {
    pub fn new(backend: Arc<dyn SearchBackend>, policy: Arc<SafetyPolicy>) -> Self {
        let definition = ToolDefinition::new(
            "tavily_search",
            "Search the web for library documentation and error messages.",
            ArgumentSchema::new(vec![ArgumentSpec::required(
                "query",
                ArgKind::String,
                "What to search for.",
            )]),
            false,
        );
        Self {
            definition,
            backend,
            policy,
        }
    }
}

#[async_trait]
impl ToolHandler for WebSearch {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, args: Arguments) -> Result<String, ToolError> {
        let query = self.policy.bound_query(args.str("query").unwrap_or_default());
        let hits = self
            .backend
            .search(&query, self.policy.max_search_results)
            .await
            .map_err(|e| ToolError::Execution(format!("Search failed: {}", e)))?;

        if hits.is_empty() {
            return Ok(format!("No results found for '{}'", query));
        }
        Ok(hits
            .iter()
            .map(|hit| format!("{}\nSource: {}", hit.text, hit.source))
            .collect::<Vec<_>>()
            .join(RESULT_SEPARATOR))
    }
}
