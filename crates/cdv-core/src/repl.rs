//! Interactive loop: rustyline input with filename completion, one
//! dispatcher turn per line.

use std::io;
use std::path::Path;

use cdv_backend::BackendError;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use thiserror::Error;

use crate::classifier;
use crate::config::Config;
use crate::dispatch::{Console, Dispatcher, Flow, Services, Timeouts};
use crate::model::{BackendProvider, EndpointProvider};
use crate::platform;
use crate::renderer::Renderer;
use crate::runner::ShellRunner;
use crate::session::SessionState;
use crate::style::Style;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create line editor: {0}")]
    Editor(#[from] ReadlineError),
    #[error("failed to set up model backend: {0}")]
    Backend(#[from] BackendError),
    #[error("cannot determine working directory: {0}")]
    WorkingDirectory(#[source] io::Error),
}

/// Completes file names relative to the process working directory.
struct PathHelper {
    completer: FilenameCompleter,
}

impl Helper for PathHelper {}

impl Completer for PathHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for PathHelper {
    type Hint = String;
}

impl Highlighter for PathHelper {}

impl Validator for PathHelper {}

/// Terminal console backed by rustyline. Interrupt and EOF read as end of
/// input.
pub struct ReadlineConsole {
    editor: Editor<PathHelper, DefaultHistory>,
}

impl ReadlineConsole {
    pub fn new() -> Result<Self, ReadlineError> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(PathHelper {
            completer: FilenameCompleter::new(),
        }));
        Ok(Self { editor })
    }

    /// Add a line to the in-memory history.
    pub fn remember(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            tracing::debug!(error = %e, "history entry rejected");
        }
    }
}

impl Console for ReadlineConsole {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

/// Run the session until `exit`, Ctrl-C or Ctrl-D at the prompt.
pub async fn run_repl(config: &Config) -> Result<(), StartupError> {
    let platform = platform::detect(&config.shell);
    let provider = EndpointProvider::from_config(config)?;
    let active = provider.hosted(&config.backend.model);
    let classifier = classifier::resolve_target(config, &provider);
    let cwd = std::env::current_dir().map_err(StartupError::WorkingDirectory)?;

    let services = Services {
        runner: Box::new(ShellRunner::new(platform.clone())),
        provider: Box::new(provider),
        platform,
        timeouts: Timeouts {
            command: config.shell.timeout(),
            listing: config.shell.listing_timeout(),
        },
        default_model: config.backend.model.clone(),
    };
    let mut dispatcher = Dispatcher::new(
        SessionState::new(cwd, active, classifier),
        services,
        ReadlineConsole::new()?,
        Renderer::new(io::stdout(), Style::new()),
    );

    dispatcher.renderer_mut().clear_screen();
    dispatcher.renderer_mut().banner();

    loop {
        dispatcher.render_status();
        let prompt = dispatcher.prompt();
        let line = match dispatcher.console_mut().read_line(&prompt) {
            Ok(Some(line)) => line,
            Ok(None) => {
                dispatcher.renderer_mut().farewell();
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "line editor failed");
                dispatcher.renderer_mut().farewell();
                break;
            }
        };
        if !line.trim().is_empty() {
            dispatcher.console_mut().remember(&line);
        }

        if dispatcher.handle(&line).await == Flow::Exit {
            break;
        }
        sync_process_directory(dispatcher.session().working_directory());
    }
    Ok(())
}

/// Keep the process directory on the session's, so completion and relative
/// paths typed at the prompt agree with where commands run.
fn sync_process_directory(dir: &Path) {
    if let Err(e) = std::env::set_current_dir(dir) {
        tracing::debug!(dir = %dir.display(), error = %e, "could not enter working directory");
    }
}
