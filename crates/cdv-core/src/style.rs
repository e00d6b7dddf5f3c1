//! Terminal colors with NO_COLOR support.

/// Color output is on unless `NO_COLOR` is set.
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// The assistant's name.
    Brand,
    /// Progress notes and status.
    Muted,
    Error,
    /// Commands proposed for execution.
    Command,
    Warning,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Brand => "\x1b[94m",
            Tone::Muted => "\x1b[90m",
            Tone::Error => "\x1b[91m",
            Tone::Command => "\x1b[36m",
            Tone::Warning => "\x1b[33m",
        }
    }
}

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub struct Style {
    enabled: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

impl Style {
    pub fn new() -> Self {
        Self {
            enabled: color_enabled(),
        }
    }

    /// Colors on regardless of the environment (for tests).
    pub fn force_enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn paint(&self, tone: Tone, text: &str) -> String {
        if self.enabled {
            format!("{}{text}{RESET}", tone.code())
        } else {
            text.to_string()
        }
    }
}
