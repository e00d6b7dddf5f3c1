//! The conversation sent with every model call.
//!
//! Index 0 is always the identity message. Nothing is ever windowed or
//! summarized: the whole sequence is resent on each request, so long
//! sessions grow the payload without bound.

use cdv_protocol::{ChatMessage, Role};

use crate::runner::CommandOutput;

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(identity)],
        }
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.append(Role::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.append(Role::Assistant, content);
    }

    /// Append command output as assistant context. Whitespace-only streams
    /// are skipped.
    pub fn record_output(&mut self, output: &CommandOutput) {
        if !output.stdout.trim().is_empty() {
            self.push_assistant(format!("Command output:\n{}", output.stdout));
        }
        if !output.stderr.trim().is_empty() {
            self.push_assistant(format!("Command error:\n{}", output.stderr));
        }
    }

    /// Drop everything but the identity message.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    pub fn identity(&self) -> &ChatMessage {
        &self.messages[0]
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: 0,
            timed_out: false,
        }
    }

    #[test]
    fn starts_with_identity_only() {
        let conv = Conversation::new("you are codriver");
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.identity().role, Role::System);
        assert_eq!(conv.identity().content, "you are codriver");
    }

    #[test]
    fn reset_keeps_identity_regardless_of_length() {
        let mut conv = Conversation::new("identity");
        for i in 0..25 {
            conv.push_user(format!("q{i}"));
            conv.push_assistant(format!("a{i}"));
        }
        conv.reset();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0], ChatMessage::system("identity"));

        conv.reset();
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn last_assistant_skips_later_user_messages() {
        let mut conv = Conversation::new("identity");
        assert_eq!(conv.last_assistant(), None);
        conv.push_assistant("first");
        conv.push_assistant("second");
        conv.push_user("question");
        assert_eq!(conv.last_assistant(), Some("second"));
    }

    #[test]
    fn record_output_tags_each_stream() {
        let mut conv = Conversation::new("identity");
        conv.record_output(&output("a.txt\n", "warning\n"));
        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Command output:\na.txt\n");
        assert_eq!(messages[2].content, "Command error:\nwarning\n");
    }

    #[test]
    fn record_output_skips_blank_streams() {
        let mut conv = Conversation::new("identity");
        conv.record_output(&output("  \n", ""));
        assert_eq!(conv.len(), 1);
    }
}
