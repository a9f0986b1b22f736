use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indoc::formatdoc;
use serde_json::json;

use crate::errors::ToolError;
use crate::policy::SafetyPolicy;
use crate::registry::{ToolDefinition, ToolHandler};
use crate::schema::{ArgKind, ArgumentSchema, ArgumentSpec, Arguments};

/// Directory entries never shown in listings
pub const SKIPPED_ENTRIES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    ".next",
    ".DS_Store",
    "coverage",
    "target",
];

const DEFAULT_LIST_DEPTH: i64 = 2;

pub struct ListFiles {
    definition: ToolDefinition,
    root: PathBuf,
    policy: Arc<SafetyPolicy>,
}

impl ListFiles {
    pub fn new(root: PathBuf, policy: Arc<SafetyPolicy>) -> Self {
        let definition = ToolDefinition::new(
            "list_files",
            "See the project structure as a tree. Build output and dependency folders are skipped.",
            ArgumentSchema::new(vec![
                ArgumentSpec::optional(
                    "dirPath",
                    ArgKind::String,
                    "Directory to list, relative to the project root. Defaults to the root.",
                )
                .with_default(json!(".")),
                ArgumentSpec::optional(
                    "depth",
                    ArgKind::Integer,
                    "How many levels of subdirectories to descend into.",
                )
                .with_default(json!(DEFAULT_LIST_DEPTH)),
            ]),
            false,
        );
        Self {
            definition,
            root,
            policy,
        }
    }
}

#[async_trait]
impl ToolHandler for ListFiles {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, args: Arguments) -> Result<String, ToolError> {
        let raw = args.str("dirPath").unwrap_or(".").to_string();
        let depth = args.int("depth").unwrap_or(DEFAULT_LIST_DEPTH);
        if depth < 0 {
            return Err(ToolError::Execution("depth must not be negative".into()));
        }
        let max_depth = self.policy.clamp_depth(depth as usize);
        let dir = self.policy.resolve_path(&self.root, &raw)?;

        let listing = tokio::task::spawn_blocking(move || {
            let mut out = String::new();
            render_tree(&dir, 0, max_depth, &mut out).map(|_| out)
        })
        .await
        .map_err(|e| ToolError::Execution(e.to_string()))?
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::Execution(format!("Directory not found: {}", raw)),
            _ => ToolError::Execution(format!("Failed to list {}: {}", raw, e)),
        })?;

        if listing.is_empty() {
            Ok(format!("{} is empty", raw))
        } else {
            Ok(listing.trim_end().to_string())
        }
    }
}

fn render_tree(dir: &Path, depth: usize, max_depth: usize, out: &mut String) -> std::io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if SKIPPED_ENTRIES.contains(&name.as_str()) {
            continue;
        }
        out.push_str(&"  ".repeat(depth));
        out.push_str("|-- ");
        out.push_str(&name);
        out.push('\n');

        // file_type does not follow symlinks, so linked directories are not descended into
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir && depth < max_depth {
            if let Err(error) = render_tree(&entry.path(), depth + 1, max_depth, out) {
                tracing::debug!(path = %entry.path().display(), %error, "skipping unreadable directory");
            }
        }
    }
    Ok(())
}

pub struct ReadFile {
    definition: ToolDefinition,
    root: PathBuf,
    policy: Arc<SafetyPolicy>,
}

impl ReadFile {
    pub fn new(root: PathBuf, policy: Arc<SafetyPolicy>) -> Self {
        let definition = ToolDefinition::new(
            "read_file",
            formatdoc! {"
                Read a text file with line numbers. Lines are 1-based and endLine is inclusive.
                At most {max} lines are returned per call; read larger files in chunks.",
                max = policy.read_chunk_lines
            },
            ArgumentSchema::new(vec![
                ArgumentSpec::required(
                    "filePath",
                    ArgKind::String,
                    "File to read, relative to the project root.",
                ),
                ArgumentSpec::optional("startLine", ArgKind::Integer, "First line to read (1-based)."),
                ArgumentSpec::optional("endLine", ArgKind::Integer, "Last line to read (inclusive)."),
            ]),
            false,
        );
        Self {
            definition,
            root,
            policy,
        }
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, args: Arguments) -> Result<String, ToolError> {
        let raw = args.str("filePath").unwrap_or_default();
        let path = self.policy.resolve_path(&self.root, raw)?;

        let start = match args.int("startLine") {
            Some(line) if line < 1 => {
                return Err(ToolError::Execution("startLine must be 1 or greater".into()))
            }
            Some(line) => line as usize,
            None => 1,
        };
        let end = match args.int("endLine") {
            Some(line) if line < start as i64 => {
                return Err(ToolError::Execution(
                    "endLine must not be before startLine".into(),
                ))
            }
            Some(line) => Some(line as usize),
            None => None,
        };
        if let Some(end) = end {
            self.policy.check_read_span(start, end)?;
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ToolError::Execution(format!("File not found: {}", raw)),
                ErrorKind::InvalidData => {
                    ToolError::Execution(format!("{} is not a UTF-8 text file", raw))
                }
                _ => ToolError::Execution(format!("Failed to read {}: {}", raw, e)),
            })?;

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        if total == 0 {
            return Ok(format!("{} is empty", raw));
        }
        if start > total {
            return Err(ToolError::Execution(format!(
                "startLine {} is past the end of {} ({} lines)",
                start, raw, total
            )));
        }
        let end = match end {
            Some(end) => end.min(total),
            None => {
                self.policy.check_read_span(start, total)?;
                total
            }
        };

        Ok(lines[start - 1..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}: {}", start + i, line))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

pub struct WriteFile {
    definition: ToolDefinition,
    root: PathBuf,
    policy: Arc<SafetyPolicy>,
}

impl WriteFile {
    pub fn new(root: PathBuf, policy: Arc<SafetyPolicy>) -> Self {
        let definition = ToolDefinition::new(
            "write_file",
            "Create or overwrite a file with the given content. Parent directories are created.",
            ArgumentSchema::new(vec![
                ArgumentSpec::required(
                    "filePath",
                    ArgKind::String,
                    "File to write, relative to the project root.",
                ),
                ArgumentSpec::required("content", ArgKind::String, "The full new file content."),
            ]),
            true,
        );
        Self {
            definition,
            root,
            policy,
        }
    }
}

#[async_trait]
impl ToolHandler for WriteFile {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, args: Arguments) -> Result<String, ToolError> {
        let raw = args.str("filePath").unwrap_or_default();
        let content = args.str("content").unwrap_or_default();
        let path = self.policy.resolve_path(&self.root, raw)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::Execution(format!("Failed to create directories for {}: {}", raw, e))
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::Execution(format!("Failed to write {}: {}", raw, e)))?;

        Ok(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            raw
        ))
    }
}
