use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::ToolCall;

/// The node the state machine runs next. This is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingNode {
    /// The model owes a response
    Agent,
    /// A tool call waits behind the approval gate
    Tools,
    /// Nothing to do until the human says something
    None,
}

/// Where a thread is, as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Agent,
    AwaitingApproval,
    /// Only observed while an approved call executes
    Tools,
    Idle,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Agent => "agent",
            Phase::AwaitingApproval => "awaiting_approval",
            Phase::Tools => "tools",
            Phase::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Everything needed to resume a conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: String,
    history: Vec<Message>,
    pending: PendingNode,
}

impl ThreadState {
    pub fn new<S: Into<String>>(thread_id: S) -> Self {
        Self {
            thread_id: thread_id.into(),
            history: Vec::new(),
            pending: PendingNode::None,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn pending(&self) -> PendingNode {
        self.pending
    }

    pub fn phase(&self) -> Phase {
        match self.pending {
            PendingNode::Agent => Phase::Agent,
            PendingNode::Tools => Phase::AwaitingApproval,
            PendingNode::None => Phase::Idle,
        }
    }

    /// The call awaiting approval, if the thread is paused at the gate
    pub fn pending_tool_call(&self) -> Option<&ToolCall> {
        if self.pending != PendingNode::Tools {
            return None;
        }
        self.history.last().and_then(Message::first_tool_call)
    }

    /// The tool call at the end of history that has no response yet
    pub(crate) fn unanswered_tool_call(&self) -> Option<&ToolCall> {
        let last = self.history.last()?;
        if last.role != Role::Assistant {
            return None;
        }
        last.first_tool_call()
    }

    /// Check that `pending` agrees with what history says
    pub fn check_consistency(&self) -> Result<(), String> {
        let awaiting = self.unanswered_tool_call().is_some();
        match (self.pending, awaiting) {
            (PendingNode::Tools, false) => {
                Err("pending tool call but history holds no unanswered tool call".to_string())
            }
            (PendingNode::Agent | PendingNode::None, true) => Err(format!(
                "history ends in an unanswered tool call but the pending node is {:?}",
                self.pending
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    pub(crate) fn set_pending(&mut self, pending: PendingNode) {
        self.pending = pending;
    }
}
