use anyhow::Result;
use devgate::agent::{Agent, StepStatus};
use devgate::approval::ApprovalGate;
use devgate::errors::AgentError;
use devgate::reporter::{drain, Reporter};
use devgate::state::{Phase, ThreadState};
use futures::future::{BoxFuture, FutureExt};

use crate::prompt::{InputType, Prompt};
use crate::voice::VoiceInput;

/// Resolves when the human asks to stop the current turn
pub type Interrupt = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Session<P: Prompt> {
    agent: Agent,
    gate: ApprovalGate,
    prompt: P,
    voice: Option<VoiceInput>,
    thread_id: String,
    interrupt: Interrupt,
}

impl<P: Prompt> Session<P> {
    pub fn new(
        agent: Agent,
        gate: ApprovalGate,
        prompt: P,
        voice: Option<VoiceInput>,
        thread_id: String,
    ) -> Self {
        Session {
            agent,
            gate,
            prompt,
            voice,
            thread_id,
            interrupt: Box::new(|| {
                async {
                    let _ = tokio::signal::ctrl_c().await;
                }
                .boxed()
            }),
        }
    }

    #[cfg(test)]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub async fn start(&mut self, initial_message: Option<String>) -> Result<()> {
        let mut state = self.agent.load_thread(&self.thread_id).await?;
        self.setup_session(&state);

        if state.phase() != Phase::Idle {
            self.prompt.render_info(&format!(
                "Resuming thread '{}' where it stopped ({}).",
                state.thread_id,
                state.phase()
            ));
            let result = self.drive(&mut state).await;
            self.settle(result)?;
        }

        if let Some(message) = initial_message {
            self.run_turn(&mut state, &message).await?;
        }

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = &input.content {
                        self.run_turn(&mut state, content).await?;
                    }
                }
                InputType::Voice => {
                    if let Some(text) = self.voice_message().await? {
                        self.run_turn(&mut state, &text).await?;
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }
        self.close_session(&state);
        Ok(())
    }

    async fn run_turn(&mut self, state: &mut ThreadState, text: &str) -> Result<()> {
        let result = match self.agent.submit(state, text).await {
            Ok(()) => self.drive(state).await,
            Err(e) => Err(e.into()),
        };
        self.settle(result)
    }

    /// Run the thread until it needs the human for something other than an approval.
    ///
    /// An interrupt only cancels model requests. Once a decision is given its step runs to
    /// completion, so an approved tool is executed exactly once and its result recorded.
    async fn drive(&mut self, state: &mut ThreadState) -> Result<()> {
        let mut decision = None;
        loop {
            if let Some(decision) = decision.take() {
                self.prompt.show_busy();
                let step = self.agent.step(state, Some(decision)).await;
                self.prompt.hide_busy();
                let step = step?;
                if let Some(output) = &step.output {
                    self.prompt.report(output);
                }
                if step.status != StepStatus::Continue {
                    return Ok(());
                }
            }

            self.prompt.show_busy();
            let interrupted = (self.interrupt)();
            let outcome = tokio::select! {
                result = drain(self.agent.stream(state, None), &mut self.prompt) => Some(result),
                _ = interrupted => None,
            };
            self.prompt.hide_busy();

            match outcome {
                Some(result) => {
                    result?;
                }
                None => {
                    // Whatever was mid-flight is discarded; the checkpoint is the truth
                    let thread_id = state.thread_id.clone();
                    *state = self.agent.load_thread(&thread_id).await?;
                    self.prompt.render_info(&format!(
                        "Interrupted. Thread '{}' stays at its last checkpoint ({}).",
                        thread_id,
                        state.phase()
                    ));
                    return Ok(());
                }
            }

            let Some(call) = state.pending_tool_call().cloned() else {
                return Ok(());
            };
            decision = Some(self.gate.review(&call, &mut self.prompt).await?);
        }
    }

    /// Show recoverable agent errors and keep the session alive; anything else ends it
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        let Err(err) = result else {
            return Ok(());
        };
        match err.downcast_ref::<AgentError>() {
            Some(agent_error) if !agent_error.is_fatal() => {
                tracing::warn!(error = %agent_error, "turn aborted");
                self.prompt.render_error(&format!("{}", agent_error));
                Ok(())
            }
            _ => Err(err),
        }
    }

    async fn voice_message(&mut self) -> Result<Option<String>> {
        let Some(voice) = &self.voice else {
            self.prompt
                .render_error("Voice input needs a transcription key (GROQ_API_KEY).");
            return Ok(None);
        };

        let audio = match voice.record().await {
            Ok(audio) => audio,
            Err(e) => {
                self.prompt
                    .render_error(&format!("Voice input failed: {:#}", e));
                return Ok(None);
            }
        };

        self.prompt.show_busy();
        let transcript = voice.transcribe(audio).await;
        self.prompt.hide_busy();
        match transcript {
            Ok(text) if text.trim().is_empty() => {
                self.prompt.render_info("Nothing was heard.");
                Ok(None)
            }
            Ok(text) => self.prompt.edit_transcript(&text),
            Err(e) => {
                self.prompt
                    .render_error(&format!("Transcription failed: {:#}", e));
                Ok(None)
            }
        }
    }

    fn setup_session(&mut self, state: &ThreadState) {
        let tools: Vec<String> = self
            .agent
            .registry()
            .definitions()
            .map(|definition| definition.name.clone())
            .collect();
        self.prompt
            .render_info(&format!("Tools: {}", tools.join(", ")));
        if self.voice.is_none() {
            self.prompt
                .render_info("Voice input is off: no transcription key configured.");
        }
        self.prompt.ready(state);
    }

    fn close_session(&mut self, state: &ThreadState) {
        self.prompt.render_info(&format!(
            "Closing session. Thread '{}' is saved; resume it with --thread {}",
            state.thread_id, state.thread_id
        ));
        self.prompt.close();
    }
}
