//! The built-in tools the agent can request.
//!
//! Every handler applies the [`SafetyPolicy`] itself before touching the filesystem, a shell
//! or the network.

pub mod files;
pub mod search;
pub mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::ToolError;
use crate::policy::SafetyPolicy;
use crate::providers::search::SearchBackend;
use crate::registry::ToolRegistry;

pub use files::{ListFiles, ReadFile, WriteFile};
pub use search::WebSearch;
pub use terminal::Terminal;

/// Register the standard tool set rooted at `root`.
///
/// Web search is only offered when a search backend is configured.
pub fn default_registry(
    root: PathBuf,
    policy: Arc<SafetyPolicy>,
    search: Option<Arc<dyn SearchBackend>>,
) -> Result<ToolRegistry, ToolError> {
    let mut builder = ToolRegistry::builder()
        .register(ListFiles::new(root.clone(), policy.clone()))?
        .register(ReadFile::new(root.clone(), policy.clone()))?
        .register(WriteFile::new(root.clone(), policy.clone()))?;
    if let Some(backend) = search {
        builder = builder.register(WebSearch::new(backend, policy.clone()))?;
    }
    builder = builder.register(Terminal::new(root, policy))?;
    Ok(builder.build())
}
