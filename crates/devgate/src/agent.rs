use std::sync::Arc;

use futures::stream::BoxStream;

use crate::approval::Decision;
use crate::checkpoint::CheckpointStore;
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::ToolCall;
use crate::prompt_template::Preamble;
use crate::providers::base::Provider;
use crate::registry::ToolRegistry;
use crate::state::{PendingNode, Phase, ThreadState};

/// Recorded in place of a tool result when the human denies a call
pub const DENIAL_NOTE: &str = "Tool call denied by the user.";

/// What a single transition appended to the thread
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    /// The model's response, possibly requesting a tool call
    Agent(Message),
    /// The result of an approved tool call
    Tools(Message),
    /// The note recorded for a denied tool call
    Denied(Message),
}

impl StepOutput {
    pub fn message(&self) -> &Message {
        match self {
            StepOutput::Agent(message)
            | StepOutput::Tools(message)
            | StepOutput::Denied(message) => message,
        }
    }

    /// The phase that produced this output
    pub fn phase(&self) -> Phase {
        match self {
            StepOutput::Agent(_) => Phase::Agent,
            StepOutput::Tools(_) => Phase::Tools,
            StepOutput::Denied(_) => Phase::AwaitingApproval,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    /// Another transition can run right away
    Continue,
    /// Halted in front of the approval gate
    NeedsApproval(ToolCall),
    /// Waiting for the human to say something
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub output: Option<StepOutput>,
    pub status: StepStatus,
}

/// Agent drives a conversation thread between the model, the human and the tools
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn CheckpointStore>,
    preamble: Preamble,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn CheckpointStore>,
        preamble: Preamble,
    ) -> Self {
        Self {
            provider,
            registry,
            store,
            preamble,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Resume a thread from its checkpoint, or start it empty
    pub async fn load_thread(&self, thread_id: &str) -> AgentResult<ThreadState> {
        let state = match self.store.load(thread_id).await? {
            Some(state) => state,
            None => ThreadState::new(thread_id),
        };
        tracing::info!(
            thread_id = %state.thread_id,
            phase = %state.phase(),
            messages = state.history().len(),
            "loaded thread"
        );
        Ok(state)
    }

    /// Add a human message and hand the turn to the model
    pub async fn submit(&self, state: &mut ThreadState, text: &str) -> AgentResult<()> {
        if let Some(call) = state.pending_tool_call() {
            return Err(AgentError::ToolCallPending {
                call_id: call.id.clone(),
            });
        }
        state.push(Message::user().with_text(text));
        state.set_pending(PendingNode::Agent);
        self.persist(state).await
    }

    /// Run exactly one transition of the thread.
    ///
    /// A decision may only be given while a tool call awaits approval.
    pub async fn step(
        &self,
        state: &mut ThreadState,
        decision: Option<Decision>,
    ) -> AgentResult<Step> {
        match (state.phase(), decision) {
            (Phase::Agent, None) => self.agent_step(state).await,
            (Phase::AwaitingApproval | Phase::Tools, None) => {
                let call = state
                    .pending_tool_call()
                    .cloned()
                    .ok_or(AgentError::NoPendingToolCall)?;
                Ok(Step {
                    output: None,
                    status: StepStatus::NeedsApproval(call),
                })
            }
            (Phase::AwaitingApproval | Phase::Tools, Some(Decision::Allow)) => {
                self.tools_step(state).await
            }
            (Phase::AwaitingApproval | Phase::Tools, Some(Decision::Deny)) => {
                self.deny_step(state).await
            }
            (Phase::Idle, None) => Ok(Step {
                output: None,
                status: StepStatus::Complete,
            }),
            (Phase::Agent | Phase::Idle, Some(_)) => Err(AgentError::NoPendingToolCall),
        }
    }

    /// Run transitions until the thread needs the human again, yielding each output as soon
    /// as its step is committed. The decision applies to the first step only.
    pub fn stream<'a>(
        &'a self,
        state: &'a mut ThreadState,
        decision: Option<Decision>,
    ) -> BoxStream<'a, AgentResult<StepOutput>> {
        Box::pin(async_stream::try_stream! {
            let mut decision = decision;
            loop {
                let step = self.step(state, decision.take()).await?;
                if let Some(output) = step.output {
                    yield output;
                }
                if step.status != StepStatus::Continue {
                    break;
                }
            }
        })
    }

    async fn agent_step(&self, state: &mut ThreadState) -> AgentResult<Step> {
        let tools = self.registry.capabilities();
        let system = self
            .preamble
            .render(&tools)
            .map_err(|e| AgentError::Preamble(e.to_string()))?;

        let (response, usage) = self
            .provider
            .complete(&system, state.history(), &tools)
            .await
            .map_err(|e| {
                tracing::warn!(thread_id = %state.thread_id, error = %e, "model backend failed");
                AgentError::BackendUnavailable(format!("{:#}", e))
            })?;
        tracing::debug!(
            thread_id = %state.thread_id,
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "model responded"
        );

        let status = match response.first_tool_call() {
            Some(call) => {
                if response.tool_calls.len() > 1 {
                    tracing::warn!(
                        thread_id = %state.thread_id,
                        requested = response.tool_calls.len(),
                        "model requested several tool calls; only the first is considered"
                    );
                }
                StepStatus::NeedsApproval(call.clone())
            }
            None => StepStatus::Complete,
        };

        state.push(response.clone());
        state.set_pending(match status {
            StepStatus::NeedsApproval(_) => PendingNode::Tools,
            _ => PendingNode::None,
        });
        self.persist(state).await?;

        Ok(Step {
            output: Some(StepOutput::Agent(response)),
            status,
        })
    }

    async fn tools_step(&self, state: &mut ThreadState) -> AgentResult<Step> {
        let call = state
            .pending_tool_call()
            .cloned()
            .ok_or(AgentError::NoPendingToolCall)?;
        tracing::info!(
            thread_id = %state.thread_id,
            phase = %Phase::Tools,
            tool = %call.name,
            call_id = %call.id,
            "running approved tool call"
        );

        let output = match self.registry.invoke(&call).await {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, %error, "tool call rejected");
                error.to_tool_output()
            }
        };

        let message = Message::tool_result(&call.id, output);
        state.push(message.clone());
        state.set_pending(PendingNode::Agent);
        self.persist(state).await?;

        Ok(Step {
            output: Some(StepOutput::Tools(message)),
            status: StepStatus::Continue,
        })
    }

    async fn deny_step(&self, state: &mut ThreadState) -> AgentResult<Step> {
        let call = state
            .pending_tool_call()
            .cloned()
            .ok_or(AgentError::NoPendingToolCall)?;

        let message = Message::tool_denied(&call.id, DENIAL_NOTE);
        state.push(message.clone());
        state.set_pending(PendingNode::None);
        self.persist(state).await?;

        Ok(Step {
            output: Some(StepOutput::Denied(message)),
            status: StepStatus::Complete,
        })
    }

    async fn persist(&self, state: &ThreadState) -> AgentResult<()> {
        let revision = self.store.save(state).await?;
        tracing::info!(
            thread_id = %state.thread_id,
            phase = %state.phase(),
            revision,
            "thread transitioned"
        );
        Ok(())
    }
}
