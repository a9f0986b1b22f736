use std::path::PathBuf;

use thiserror::Error;

use crate::policy::PolicyViolation;

/// Prefix of every tool output that reports a failure back to the model
pub const ERROR_MARKER: &str = "Error:";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("A tool named '{0}' is already registered")]
    DuplicateToolName(String),

    #[error("Invalid arguments for '{tool}': {}", violations.join("; "))]
    InvalidArguments {
        tool: String,
        violations: Vec<String>,
    },

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}

impl ToolError {
    /// Render the error as tool output the model can react to
    pub fn to_tool_output(&self) -> String {
        format!("{} {}", ERROR_MARKER, self)
    }
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Invalid thread id '{0}': use 1-128 characters from [A-Za-z0-9._-], not starting with '.'")]
    InvalidThreadId(String),

    #[error("Checkpoint store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint for thread '{thread_id}' is corrupt: {reason}")]
    Corrupt { thread_id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Model backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Tool call '{call_id}' is awaiting approval; approve or deny it first")]
    ToolCallPending { call_id: String },

    #[error("There is no tool call awaiting approval")]
    NoPendingToolCall,

    #[error("Failed to render the system preamble: {0}")]
    Preamble(String),
}

impl AgentError {
    /// Errors that threaten state integrity; the driver must not continue the thread
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Checkpoint(_) | AgentError::Preamble(_))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
