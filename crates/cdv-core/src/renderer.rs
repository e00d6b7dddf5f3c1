//! All user-visible output of the session.
//!
//! `Renderer<W: Write>` writes to any sink so the dispatcher can be driven
//! against a `Vec<u8>` in tests. Write errors on the terminal are ignored;
//! there is nowhere better to report them.

use std::io::Write;

use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};

use crate::runner::CommandOutput;
use crate::style::{Style, Tone};

const NAME: &str = "Codriver";

const HELP_LINES: &[&str] = &[
    "Codriver decides your intent automatically.",
    "Type a shell command directly, ask a question, or ask for a command to be run for you.",
    "Pipe a command's output to a question with '|?', e.g. 'ls |? how many files are in here?'",
    "Add files to the conversation with @, e.g. '@main.rs @notes.txt'",
    "Save the last reply with save, e.g. 'save answer.py'",
    "llm -- local model, model <name> -- hosted model",
    "reset -- start a fresh conversation",
    "exit -- quit",
];

pub struct Renderer<W: Write> {
    pub writer: W,
    style: Style,
}

impl<W: Write> Renderer<W> {
    pub fn new(writer: W, style: Style) -> Self {
        Self { writer, style }
    }

    pub fn banner(&mut self) {
        let _ = writeln!(
            self.writer,
            "\n{} is now online.",
            self.style.paint(Tone::Brand, NAME)
        );
        for line in HELP_LINES {
            let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Muted, line));
        }
        let _ = self.writer.flush();
    }

    /// Shown before every prompt.
    pub fn status(&mut self, main_model: &str, intent_model: &str) {
        let line = format!("main: {main_model} | intent: {intent_model}");
        let _ = writeln!(self.writer, "\n{}", self.style.paint(Tone::Muted, &line));
        let _ = self.writer.flush();
    }

    /// A line spoken by the assistant.
    pub fn say(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "\n{}: {msg}", self.style.paint(Tone::Brand, NAME));
        let _ = self.writer.flush();
    }

    pub fn note(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Muted, msg));
        let _ = self.writer.flush();
    }

    pub fn error(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Error, msg));
        let _ = self.writer.flush();
    }

    pub fn warning(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Warning, msg));
        let _ = self.writer.flush();
    }

    /// Prefix written before a streamed answer.
    pub fn stream_start(&mut self) {
        let _ = write!(self.writer, "\n{}: ", self.style.paint(Tone::Brand, NAME));
        let _ = self.writer.flush();
    }

    pub fn text(&mut self, chunk: &str) {
        let _ = write!(self.writer, "{chunk}");
        let _ = self.writer.flush();
    }

    pub fn stream_end(&mut self) {
        let _ = writeln!(self.writer, "\n");
        let _ = self.writer.flush();
    }

    pub fn command_output(&mut self, output: &CommandOutput) {
        if !output.stdout.is_empty() {
            let _ = write!(self.writer, "{}", output.stdout);
            if !output.stdout.ends_with('\n') {
                let _ = writeln!(self.writer);
            }
        }
        if !output.stderr.trim().is_empty() {
            let _ = writeln!(
                self.writer,
                "{}",
                self.style.paint(Tone::Error, output.stderr.trim_end())
            );
        }
        if output.exit_code != 0 && !output.timed_out {
            let line = format!("exit code {}", output.exit_code);
            let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Muted, &line));
        }
        let _ = self.writer.flush();
    }

    /// A command awaiting confirmation.
    pub fn proposed_command(&mut self, command: &str) {
        let _ = writeln!(
            self.writer,
            "  {}",
            self.style.paint(Tone::Command, command)
        );
        let _ = self.writer.flush();
    }

    pub fn clear_screen(&mut self) {
        let _ = crossterm::execute!(self.writer, Clear(ClearType::All), MoveTo(0, 0));
    }

    pub fn farewell(&mut self) {
        self.say("See you next time.");
    }
}
