//! One turn of the session: parse a line, then run the matching flow.
//!
//! The dispatcher is the error boundary. Every failure inside a turn is
//! rendered and the turn ends; `handle` itself never fails.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::attachment::load_attachment;
use crate::classifier::{classify, Intent};
use crate::directive::{Directive, ModelTarget, ParseOptions};
use crate::history::Conversation;
use crate::interrupt::or_interrupt;
use crate::model::{BackendProvider, ModelClient};
use crate::platform::ShellPlatform;
use crate::renderer::Renderer;
use crate::runner::{CommandOutput, CommandRunner, RunError};
use crate::save::save_last_response;
use crate::session::SessionState;

/// Line input and yes/no confirmation.
pub trait Console {
    /// `Ok(None)` on end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Ask a yes/no question. Anything but an answer counts as no.
    fn confirm(&mut self, question: &str) -> bool {
        match self.read_line(question) {
            Ok(Some(answer)) => parse_answer(&answer),
            _ => false,
        }
    }
}

/// Empty, `y` and `yes` (any case) accept.
pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub command: Duration,
    pub listing: Duration,
}

/// Collaborators that outlive any single turn.
pub struct Services {
    pub runner: Box<dyn CommandRunner>,
    pub provider: Box<dyn BackendProvider>,
    pub platform: Arc<dyn ShellPlatform>,
    pub timeouts: Timeouts,
    /// The configured default hosted model.
    pub default_model: String,
}

pub struct Dispatcher<C: Console, W: Write> {
    session: SessionState,
    conversation: Conversation,
    services: Services,
    console: C,
    renderer: Renderer<W>,
    /// Set when Ctrl-C cut a turn short; the session ends after that turn.
    interrupted: bool,
}

impl<C: Console, W: Write> Dispatcher<C, W> {
    pub fn new(session: SessionState, services: Services, console: C, renderer: Renderer<W>) -> Self {
        let conversation = Conversation::new(services.platform.identity_prompt());
        Self {
            session,
            conversation,
            services,
            console,
            renderer,
            interrupted: false,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<W> {
        &mut self.renderer
    }

    /// The prompt shown for the next line.
    pub fn prompt(&self) -> String {
        format!(
            "{}{} ",
            self.session.working_directory().display(),
            self.services.platform.prompt_marker()
        )
    }

    pub fn render_status(&mut self) {
        let main = self.session.active().model().to_string();
        let intent = self.session.classifier().model().to_string();
        self.renderer.status(&main, &intent);
    }

    /// Run one turn.
    pub async fn handle(&mut self, line: &str) -> Flow {
        let options = ParseOptions {
            hosted_model: &self.services.default_model,
            drive_change: self.services.platform.supports_drive_change(),
        };
        let directive = Directive::parse(line, &options);
        tracing::debug!(?directive, "dispatch");

        match directive {
            Directive::Blank => {}
            Directive::Exit => {
                self.renderer.farewell();
                return Flow::Exit;
            }
            Directive::InvalidPipe => self.renderer.error(
                "Invalid format. Both a command and a question are required. \
                 Use: <command> |? <question>",
            ),
            Directive::Pipe { command, question } => self.pipe(&command, &question).await,
            Directive::SwitchModel(target) => self.switch_model(target),
            Directive::Reset => self.reset(),
            Directive::Drive(letter) => {
                if let Err(e) = self.session.change_drive(letter) {
                    self.renderer.error(&format!("{letter}: {e}"));
                }
            }
            Directive::ChangeDir(arg) => {
                if let Err(e) = self.session.change_directory(&arg) {
                    self.renderer.error(&format!("cd: {e}"));
                }
            }
            Directive::Listing(line) => {
                let timeout = self.services.timeouts.listing;
                self.execute(&line, timeout).await;
            }
            Directive::Attach(paths) => self.attach(&paths),
            Directive::Save(name) => self.save(name.as_deref()),
            Directive::Classify(line) => self.classify_and_route(&line).await,
        }

        if self.interrupted {
            self.renderer.farewell();
            return Flow::Exit;
        }
        Flow::Continue
    }

    fn interrupt(&mut self) {
        self.renderer.error("Interrupted.");
        self.interrupted = true;
    }

    /// Run, show and record a command.
    async fn execute(&mut self, command: &str, timeout: Duration) -> Option<CommandOutput> {
        let output = self.capture(command, timeout).await?;
        self.renderer.command_output(&output);
        self.conversation.record_output(&output);
        Some(output)
    }

    /// Run a command without showing or recording it. Runner failures are
    /// rendered and yield `None`; an interrupted run still shows and records
    /// what it printed.
    async fn capture(&mut self, command: &str, timeout: Duration) -> Option<CommandOutput> {
        let cwd = self.session.working_directory().to_path_buf();
        match self.services.runner.run(command, &cwd, timeout).await {
            Ok(output) => Some(output),
            Err(RunError::Interrupted(output)) => {
                self.renderer.command_output(&output);
                self.conversation.record_output(&output);
                self.interrupted = true;
                None
            }
            Err(e) => {
                self.renderer.error(&format!("Error: {e}"));
                None
            }
        }
    }

    async fn ask(&mut self, prompt: &str) {
        self.renderer.stream_start();
        let renderer = &mut self.renderer;
        let result = or_interrupt(self.session.active().ask(
            &mut self.conversation,
            prompt,
            |chunk| renderer.text(chunk),
        ))
        .await;
        self.renderer.stream_end();
        match result {
            Some(Ok(_)) => {}
            Some(Err(e)) => self.renderer.error(&format!("Model error: {e}")),
            None => self.interrupt(),
        }
    }

    async fn generate_command(&mut self, request: &str) -> Option<String> {
        let generated = or_interrupt(
            self.session
                .active()
                .generate_command(&mut self.conversation, request),
        )
        .await;
        match generated {
            Some(Ok(command)) => Some(command.trim().to_string()),
            Some(Err(e)) => {
                self.renderer.error(&format!("Model error: {e}"));
                None
            }
            None => {
                self.interrupt();
                None
            }
        }
    }

    async fn pipe(&mut self, command: &str, question: &str) {
        let timeout = self.services.timeouts.command;
        self.renderer
            .note(&format!("Running '{command}' and piping its output to the model..."));

        let mut command = command.to_string();
        let Some(mut output) = self.capture(&command, timeout).await else {
            return;
        };

        if !output.success() {
            self.conversation.record_output(&output);
            let detail = output.failure_detail().trim_end().to_string();
            self.renderer.error(&format!("Error executing command:\n{detail}"));

            self.renderer.note("Asking the model for a corrected command...");
            let Some(suggestion) = self
                .generate_command(&fix_prompt(&command, &detail, question))
                .await
            else {
                return;
            };

            if suggestion.is_empty() {
                self.renderer.note("The model could not suggest a fix.");
            } else {
                self.renderer
                    .say("It looks like that command failed. I think this might work instead:");
                self.renderer.proposed_command(&suggestion);
                if self
                    .console
                    .confirm("Shall I run this corrected command instead? (Y/n) ")
                {
                    self.renderer
                        .note(&format!("Running corrected command: '{suggestion}'..."));
                    let Some(rerun) = self.capture(&suggestion, timeout).await else {
                        return;
                    };
                    if !rerun.success() {
                        self.conversation.record_output(&rerun);
                        self.renderer.error(&format!(
                            "The corrected command also failed:\n{}",
                            rerun.failure_detail().trim_end()
                        ));
                    }
                    command = suggestion;
                    output = rerun;
                }
            }
        }

        self.ask(&pipe_prompt(&command, &output.stdout, question)).await;
    }

    async fn classify_and_route(&mut self, line: &str) {
        let intent = match or_interrupt(classify(self.session.classifier(), line)).await {
            Some(Ok(intent)) => intent,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "classification failed");
                self.renderer.error(&format!(
                    "Error classifying input: {e}. Defaulting to shell execution."
                ));
                Intent::Shell
            }
            None => {
                self.interrupt();
                return;
            }
        };

        let timeout = self.services.timeouts.command;
        match intent {
            Intent::Query => self.ask(line.trim()).await,
            Intent::Command => self.run_generated(line.trim()).await,
            Intent::Shell => {
                self.execute(line, timeout).await;
            }
            Intent::Unknown => {
                self.renderer
                    .note("Unrecognized classification. Running it as a shell command.");
                self.execute(line, timeout).await;
            }
        }
    }

    async fn run_generated(&mut self, request: &str) {
        let Some(command) = self.generate_command(request).await else {
            return;
        };
        if command.is_empty() {
            self.renderer.note("The model did not return a command.");
            return;
        }

        self.renderer.say("I would like to run this command:");
        self.renderer.proposed_command(&command);
        if !self.console.confirm("May I? (Y/n) ") {
            return;
        }
        self.renderer.say(&format!("Running {command}"));
        let timeout = self.services.timeouts.command;
        self.execute(&command, timeout).await;
    }

    fn switch_model(&mut self, target: ModelTarget) {
        let client: Option<ModelClient> = match target {
            ModelTarget::Local => self.services.provider.local(),
            ModelTarget::Hosted(model) => Some(self.services.provider.hosted(&model)),
        };
        match client {
            Some(client) => {
                self.session.set_active(client);
                self.renderer
                    .note(&format!("Model set to {}.", self.session.active().model()));
            }
            None => self.renderer.warning(&format!(
                "Local model not online. Model remains {}.",
                self.session.active().model()
            )),
        }
    }

    fn reset(&mut self) {
        self.conversation.reset();
        self.renderer.clear_screen();
        self.renderer.banner();
        self.renderer.say("OK. Let's start fresh.");
    }

    fn attach(&mut self, names: &[String]) {
        if names.is_empty() {
            self.renderer.error("Usage: @<file> [@<file> ...]");
            return;
        }
        for name in names {
            let path = self.session.resolve(name);
            match load_attachment(&path, name) {
                Ok(attachment) => {
                    self.conversation.push_user(attachment.message());
                    self.renderer.note(&format!("Added '{name}' to context."));
                }
                Err(e) => self.renderer.error(&format!("Error: {e}")),
            }
        }
    }

    fn save(&mut self, name: Option<&str>) {
        let Some(name) = name else {
            self.renderer.error("Usage: save <filename>");
            return;
        };
        let path = self.session.resolve(name);
        match save_last_response(&self.conversation, &path) {
            Ok(_) => self.renderer.note(&format!("Saved to '{}'.", path.display())),
            Err(e) => self.renderer.error(&format!("Error: {e}")),
        }
    }
}

fn fix_prompt(command: &str, error: &str, question: &str) -> String {
    format!(
        "The user's command `{command}` failed with the error:\n{error}\n\
         The user's original intent was to answer the question: \"{question}\"\n\
         Based on the error, provide a corrected command that will likely work."
    )
}

fn pipe_prompt(command: &str, stdout: &str, question: &str) -> String {
    format!(
        "The user ran the command: `{command}`\n\
         The output of that command is:\n---\n{stdout}\n---\n\
         Based on that output, the user is now asking: \"{question}\""
    )
}
