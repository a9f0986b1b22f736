use std::io::{self, Write};

use anyhow::Result;
use async_trait::async_trait;
use bat::WrappingMode;
use cliclack::{confirm, input, spinner};
use console::style;
use devgate::agent::StepOutput;
use devgate::approval::{ApprovalRequest, Approver, Decision, Preview};
use devgate::models::message::Message;
use devgate::reporter::Reporter;

use super::{Input, InputType, Prompt, Theme};

pub struct CliclackPrompt {
    spinner: Option<cliclack::ProgressBar>,
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: None,
            input_mode: InputMode::Singleline,
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }

    fn render_message(&self, message: &Message) {
        let theme = self.theme_name();
        if let Some(text) = message.text() {
            print(text, theme);
        }
        for call in &message.tool_calls {
            let arguments = serde_json::to_string_pretty(&call.arguments)
                .unwrap_or_else(|_| call.arguments.to_string());
            print_framed(
                &arguments,
                theme,
                Some("JSON"),
                &format!("Tool Request: {}", call.name),
            );
        }
    }

    fn render_preview(&self, request: &ApprovalRequest) {
        let theme = self.theme_name();
        match &request.preview {
            Preview::Arguments(arguments) => print_framed(
                arguments,
                theme,
                Some("JSON"),
                &format!("Approve {}?", request.call.name),
            ),
            Preview::Diff { path, diff } => {
                if diff.has_changes() {
                    print_framed(&diff.unified, theme, Some("Diff"), path);
                    println!(
                        "{} {}",
                        style(format!("+{}", diff.added)).green(),
                        style(format!("-{}", diff.removed)).red()
                    );
                } else {
                    println!("{}", style(format!("No changes to {}", path)).dim());
                }
            }
            Preview::NewFile {
                path,
                head,
                remaining,
            } => {
                // No language: bat picks one from the file name
                print_framed(head, theme, None, &format!("New file: {}", path));
                if *remaining > 0 {
                    println!("{}", style(format!("... {} more lines", remaining)).dim());
                }
            }
            Preview::Withheld { path, reason } => {
                println!(
                    "{}",
                    style(format!("Cannot preview {}: {}", path, reason)).yellow()
                );
            }
        }
        if !request.side_effecting {
            println!("{}", style("This tool only reads.").dim());
        }
    }
}

impl Default for CliclackPrompt {
    fn default() -> Self {
        Self::new()
    }
}

fn print_framed(content: &str, theme: &str, language: Option<&str>, title: &str) {
    let mut printer = bat::PrettyPrinter::new();
    printer
        .input(bat::Input::from_bytes(content.as_bytes()).name(title))
        .theme(theme)
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character);
    if let Some(language) = language {
        printer.language(language);
    }
    if printer.print().is_err() {
        println!("{}\n{}", title, content);
    }
}

fn print(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_newline() {
    println!();
}

impl Reporter for CliclackPrompt {
    fn report(&mut self, output: &StepOutput) {
        self.hide_busy();
        match output {
            StepOutput::Agent(message) => self.render_message(message),
            StepOutput::Tools(message) => {
                let text = message.text().unwrap_or("(no output)");
                let language = if text.starts_with('{') {
                    "JSON"
                } else {
                    "Markdown"
                };
                print_framed(text, self.theme_name(), Some(language), "Tool Response:");
                // The model is asked again right away
                self.show_busy();
            }
            StepOutput::Denied(message) => {
                println!(
                    "{}",
                    style(message.text().unwrap_or("Denied.")).yellow()
                );
                self.show_busy();
            }
        }
        print_newline();
        let _ = io::stdout().flush();
    }
}

#[async_trait]
impl Approver for CliclackPrompt {
    async fn decide(&mut self, request: &ApprovalRequest) -> Result<Decision> {
        self.hide_busy();
        self.render_preview(request);
        let allowed = confirm(format!("Run {}?", request.call.name))
            .initial_value(true)
            .interact()?;
        Ok(if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        })
    }
}

impl Prompt for CliclackPrompt {
    fn show_busy(&mut self) {
        if self.spinner.is_none() {
            let busy = spinner();
            busy.start("awaiting reply");
            self.spinner = Some(busy);
        }
    }

    fn hide_busy(&mut self) {
        if let Some(busy) = self.spinner.take() {
            busy.stop("");
        }
    }

    fn render_info(&mut self, text: &str) {
        self.hide_busy();
        println!("{}", style(text).dim());
    }

    fn render_error(&mut self, text: &str) {
        self.hide_busy();
        println!("{}", style(text).red());
    }

    fn edit_transcript(&mut self, transcript: &str) -> Result<Option<String>> {
        let edited: String = input("Transcript (edit, or clear to discard):")
            .default_input(transcript)
            .required(false)
            .interact()?;
        let edited = edited.trim();
        Ok((!edited.is_empty()).then(|| edited.to_string()))
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("devgate:               [Help: /?]").placeholder("");
        match self.input_mode {
            InputMode::Multiline => input = input.multiline(),
            InputMode::Singleline => (),
        }
        let message_text: String = input.interact()?;
        let message_text = message_text.trim();

        if message_text.eq_ignore_ascii_case("exit")
            || message_text.eq_ignore_ascii_case("/exit")
            || message_text.eq_ignore_ascii_case("/quit")
        {
            Ok(Input {
                input_type: InputType::Exit,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("v") {
            Ok(Input {
                input_type: InputType::Voice,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/m") {
            self.input_mode = InputMode::Multiline;
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/s") {
            self.input_mode = InputMode::Singleline;
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/?") {
            println!("Commands:");
            println!("exit - Exit the session");
            println!("v - Record a voice message (press Enter to stop)");
            println!("/m - Switch to multiline input mode");
            println!("/s - Switch to singleline input mode");
            println!("/t - Toggle Light/Dark theme");
            println!("/? - Display this help message");
            println!("Ctrl+C - Interrupt the current turn (the thread keeps its last checkpoint)");
            Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            })
        } else if message_text.is_empty() {
            Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            })
        } else {
            Ok(Input {
                input_type: InputType::Message,
                content: Some(message_text.to_string()),
            })
        }
    }

    fn close(&self) {
        // No cleanup required
    }
}
