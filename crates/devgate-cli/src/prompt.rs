use anyhow::Result;
use devgate::approval::Approver;
use devgate::reporter::Reporter;
use devgate::state::ThreadState;

pub mod cliclack;

/// Everything the session needs from the terminal: reading input, showing progress,
/// rendering each step as it lands and asking for approval.
pub trait Prompt: Reporter + Approver {
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn render_info(&mut self, text: &str);
    fn render_error(&mut self, text: &str);
    /// Offer a voice transcript for editing; None discards it
    fn edit_transcript(&mut self, transcript: &str) -> Result<Option<String>>;
    fn close(&self);
    fn ready(&self, state: &ThreadState) {
        println!("\n");
        println!(
            "Thread '{}' is ready ({} messages). Enter your instructions, \"v\" to speak or \"exit\" to quit.",
            state.thread_id,
            state.history().len()
        );
        println!("\n");
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Voice,    // User wants to record a message
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
