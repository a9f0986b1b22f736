//! The human checkpoint between a requested tool call and its execution.
//!
//! The gate only prepares what the human sees and asks the [`Approver`]; it never executes
//! anything. Reading the current content of a file for a diff preview is its only I/O.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::diff::{unified_diff, FileDiff};
use crate::models::tool::ToolCall;
use crate::policy::SafetyPolicy;
use crate::registry::ToolRegistry;

/// Lines of a new file shown before asking
pub const NEW_FILE_PREVIEW_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Every tool call needs a human decision
    #[default]
    Always,
    /// Read-only tools run without asking
    SideEffectsOnly,
}

/// What the human is shown for a pending call
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    /// Pretty-printed arguments
    Arguments(String),
    /// A write to an existing file
    Diff { path: String, diff: FileDiff },
    /// A write that creates a file
    NewFile {
        path: String,
        head: String,
        remaining: usize,
    },
    /// The file cannot be shown; the write will fail or the content is unreadable
    Withheld { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub call: ToolCall,
    pub side_effecting: bool,
    pub preview: Preview,
}

/// The blocking human decision
#[async_trait]
pub trait Approver: Send {
    async fn decide(&mut self, request: &ApprovalRequest) -> anyhow::Result<Decision>;
}

pub struct ApprovalGate {
    registry: Arc<ToolRegistry>,
    policy: Arc<SafetyPolicy>,
    root: PathBuf,
    mode: ApprovalMode,
}

impl ApprovalGate {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<SafetyPolicy>,
        root: PathBuf,
        mode: ApprovalMode,
    ) -> Self {
        Self {
            registry,
            policy,
            root,
            mode,
        }
    }

    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    pub async fn prepare(&self, call: &ToolCall) -> ApprovalRequest {
        // Unknown tools are treated as risky; the registry rejects them after approval anyway
        let side_effecting = self
            .registry
            .definition(&call.name)
            .map_or(true, |definition| definition.side_effecting);

        let preview = match call.name.as_str() {
            "write_file" => self.write_preview(call).await,
            _ => None,
        }
        .unwrap_or_else(|| Preview::Arguments(pretty_arguments(call)));

        ApprovalRequest {
            call: call.clone(),
            side_effecting,
            preview,
        }
    }

    /// Ask for a decision on a pending call
    pub async fn review(
        &self,
        call: &ToolCall,
        approver: &mut dyn Approver,
    ) -> anyhow::Result<Decision> {
        let request = self.prepare(call).await;
        if self.mode == ApprovalMode::SideEffectsOnly && !request.side_effecting {
            tracing::info!(tool = %call.name, call_id = %call.id, "auto-approved read-only tool");
            return Ok(Decision::Allow);
        }
        let decision = approver.decide(&request).await?;
        tracing::info!(tool = %call.name, call_id = %call.id, ?decision, "tool call reviewed");
        Ok(decision)
    }

    async fn write_preview(&self, call: &ToolCall) -> Option<Preview> {
        let path = call.arguments.get("filePath")?.as_str()?.to_string();
        let content = call.arguments.get("content")?.as_str()?;

        let resolved = match self.policy.resolve_path(&self.root, &path) {
            Ok(resolved) => resolved,
            Err(violation) => {
                return Some(Preview::Withheld {
                    path,
                    reason: violation.to_string(),
                })
            }
        };

        let preview = match tokio::fs::read_to_string(&resolved).await {
            Ok(current) => Preview::Diff {
                diff: unified_diff(&path, &current, content),
                path,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let lines: Vec<&str> = content.lines().collect();
                Preview::NewFile {
                    path,
                    head: lines
                        .iter()
                        .take(NEW_FILE_PREVIEW_LINES)
                        .copied()
                        .collect::<Vec<_>>()
                        .join("\n"),
                    remaining: lines.len().saturating_sub(NEW_FILE_PREVIEW_LINES),
                }
            }
            Err(e) => Preview::Withheld {
                path,
                reason: format!("the current content cannot be read: {}", e),
            },
        };
        Some(preview)
    }
}

fn pretty_arguments(call: &ToolCall) -> String {
    serde_json::to_string_pretty(&call.arguments).unwrap_or_else(|_| call.arguments.to_string())
}
