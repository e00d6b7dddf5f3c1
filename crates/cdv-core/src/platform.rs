//! Host shell capability.
//!
//! Everything that differs between a PowerShell host and a POSIX host lives
//! behind `ShellPlatform`, chosen once at startup by [`detect`].

use std::sync::Arc;

use tokio::process::Command;

use crate::config::ShellConfig;

pub const DEFAULT_POSIX_SHELL: &str = "/bin/sh";

const POSIX_IDENTITY: &str = "Your name is Codriver. You are a virtual assistant embedded \
within the Linux terminal, specialized in aiding users with Bash commands and Linux system \
administration. Your role is to provide accurate and efficient command suggestions, \
troubleshooting tips, and explanations. You also have the ability to run commands yourself, \
but only when specifically told to reply with a command. Your tone is professional yet \
approachable. You understand common Bash scripts, Linux system commands, and administrative \
tasks. Keep your responses short if the user only wants to know how to do something. \
Example: 'how do I list a folder's contents?' simply reply with 'ls'.";

const POWERSHELL_IDENTITY: &str = "Your name is Codriver. You are a virtual assistant embedded \
within the Windows Terminal running PowerShell, specialized in aiding users with PowerShell \
and Windows commands that work within PowerShell. Your role is to provide accurate and \
efficient command suggestions, troubleshooting tips, and explanations. You also have the \
ability to run commands yourself, but only when specifically told to reply with a command. \
Your tone is professional yet approachable. You understand common PowerShell scripts, Windows \
system commands, and administrative tasks. Keep your responses short if the user only wants \
to know how to do something. Example: 'how do I list a folder's contents?' simply reply with \
'dir'.";

pub trait ShellPlatform: Send + Sync {
    /// Interpreter name, used in launch errors.
    fn shell_name(&self) -> &str;

    /// A process command that runs `line` through the host shell.
    fn command(&self, line: &str) -> Command;

    /// Whether bare `X:` tokens switch drives.
    fn supports_drive_change(&self) -> bool;

    fn prompt_marker(&self) -> char;

    /// The system message that seeds every conversation.
    fn identity_prompt(&self) -> &'static str;
}

/// `<shell> -c <line>`; the shell interprets pipes and globs.
#[derive(Debug, Clone)]
pub struct Posix {
    program: String,
}

impl Posix {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Posix {
    fn default() -> Self {
        Self::new(DEFAULT_POSIX_SHELL)
    }
}

impl ShellPlatform for Posix {
    fn shell_name(&self) -> &str {
        &self.program
    }

    fn command(&self, line: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("-c").arg(line);
        command
    }

    fn supports_drive_change(&self) -> bool {
        false
    }

    fn prompt_marker(&self) -> char {
        '$'
    }

    fn identity_prompt(&self) -> &'static str {
        POSIX_IDENTITY
    }
}

/// `powershell -ExecutionPolicy Bypass -Command <line>`. The line is one
/// argument, so no second shell layer re-interprets it.
#[derive(Debug, Clone, Default)]
pub struct PowerShell;

impl ShellPlatform for PowerShell {
    fn shell_name(&self) -> &str {
        "powershell"
    }

    fn command(&self, line: &str) -> Command {
        let mut command = Command::new("powershell");
        command
            .arg("-ExecutionPolicy")
            .arg("Bypass")
            .arg("-Command")
            .arg(line);
        command
    }

    fn supports_drive_change(&self) -> bool {
        true
    }

    fn prompt_marker(&self) -> char {
        '>'
    }

    fn identity_prompt(&self) -> &'static str {
        POWERSHELL_IDENTITY
    }
}

/// PowerShell on Windows, a POSIX shell everywhere else.
pub fn detect(config: &ShellConfig) -> Arc<dyn ShellPlatform> {
    if cfg!(windows) {
        Arc::new(PowerShell)
    } else {
        let program = config
            .command
            .clone()
            .unwrap_or_else(|| DEFAULT_POSIX_SHELL.to_string());
        tracing::debug!(shell = %program, "using POSIX shell");
        Arc::new(Posix::new(program))
    }
}
