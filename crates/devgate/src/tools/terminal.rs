use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::ToolError;
use crate::policy::SafetyPolicy;
use crate::registry::{ToolDefinition, ToolHandler};
use crate::schema::{ArgKind, ArgumentSchema, ArgumentSpec, Arguments};

/// Runs shell commands in the project root
pub struct Terminal {
    definition: ToolDefinition,
    root: PathBuf,
    policy: Arc<SafetyPolicy>,
}

impl Terminal {
    pub fn new(root: PathBuf, policy: Arc<SafetyPolicy>) -> Self {
        let definition = ToolDefinition::new(
            "terminal",
            "Run a shell command with bash in the project root and return its output.",
            ArgumentSchema::new(vec![ArgumentSpec::required(
                "command",
                ArgKind::String,
                "The bash command to run.",
            )]),
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
impl ToolHandler for Terminal {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, args: Arguments) -> Result<String, ToolError> {
        let command = args.str("command").unwrap_or_default();
        self.policy.check_command(command)?;

        tracing::debug!(%command, root = %self.root.display(), "running shell command");
        let mut shell = Command::new("bash");
        shell
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null());
        // Own process group, so a Ctrl+C at the terminal does not reach a running command
        #[cfg(unix)]
        shell.process_group(0);
        let output = shell
            .output()
            .await
            .map_err(|e| ToolError::Execution(format!("Failed to start bash: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(ToolError::Execution(format!(
                "Command failed ({})\nSTDOUT:\n{}\nSTDERR:\n{}",
                output.status,
                stdout.trim_end(),
                stderr.trim_end()
            )));
        }

        if !stdout.trim().is_empty() {
            Ok(stdout.into_owned())
        } else if !stderr.trim().is_empty() {
            Ok(stderr.into_owned())
        } else {
            Ok("Executed.".to_string())
        }
    }
}
