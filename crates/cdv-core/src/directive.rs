//! Built-in directives recognized before any classification.
//!
//! [`Directive::parse`] is pure. Rules are tried in a fixed order and the
//! first match wins, so e.g. `ls |? why` is a pipe and never a listing, and
//! an `@` line never reaches the classifier.

/// First tokens that run directly as a directory listing.
const LISTING_COMMANDS: &[&str] = &["ls", "dir"];

/// Tokens that switch to the local endpoint.
const LOCAL_SWITCH_TOKENS: &[&str] = &["llm", "local"];

pub const PIPE_SEPARATOR: &str = "|?";

/// Session facts the parser needs.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    /// The configured default hosted model; typing its name switches to it.
    pub hosted_model: &'a str,
    /// Whether `X:` drive tokens are recognized.
    pub drive_change: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTarget {
    Local,
    Hosted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Blank,
    Exit,
    /// `<command> |? <question>`
    Pipe { command: String, question: String },
    /// A `|?` line with an empty side.
    InvalidPipe,
    SwitchModel(ModelTarget),
    Reset,
    /// `X:`, letter uppercased.
    Drive(char),
    /// Argument of `cd`; empty for a bare `cd`.
    ChangeDir(String),
    Listing(String),
    /// Paths named by `@` tokens, without the marker.
    Attach(Vec<String>),
    Save(Option<String>),
    /// Anything else, passed on untouched.
    Classify(String),
}

impl Directive {
    pub fn parse(line: &str, options: &ParseOptions<'_>) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Directive::Blank;
        }

        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            return Directive::Exit;
        }

        if let Some((command, question)) = trimmed.split_once(PIPE_SEPARATOR) {
            let (command, question) = (command.trim(), question.trim());
            if command.is_empty() || question.is_empty() {
                return Directive::InvalidPipe;
            }
            return Directive::Pipe {
                command: command.to_string(),
                question: question.to_string(),
            };
        }

        if let Some(target) = parse_model_switch(trimmed, options.hosted_model) {
            return Directive::SwitchModel(target);
        }

        if trimmed == "reset" {
            return Directive::Reset;
        }

        if options.drive_change {
            if let Some(letter) = parse_drive(trimmed) {
                return Directive::Drive(letter);
            }
        }

        if let Some(arg) = parse_change_dir(trimmed) {
            return Directive::ChangeDir(arg);
        }

        let mut tokens = trimmed.split_whitespace();
        let first = tokens.next().unwrap_or_default();

        if LISTING_COMMANDS
            .iter()
            .any(|name| first.eq_ignore_ascii_case(name))
        {
            return Directive::Listing(line.to_string());
        }

        if trimmed.starts_with('@') {
            let paths = trimmed
                .split_whitespace()
                .filter_map(|token| token.strip_prefix('@'))
                .map(|path| path.trim_start_matches('@'))
                .filter(|path| !path.is_empty())
                .map(str::to_string)
                .collect();
            return Directive::Attach(paths);
        }

        if first == "save" {
            let name = trimmed["save".len()..].trim();
            return Directive::Save((!name.is_empty()).then(|| name.to_string()));
        }

        Directive::Classify(line.to_string())
    }
}

fn parse_model_switch(line: &str, hosted_model: &str) -> Option<ModelTarget> {
    if LOCAL_SWITCH_TOKENS.contains(&line) {
        return Some(ModelTarget::Local);
    }
    if !hosted_model.is_empty() && line == hosted_model {
        return Some(ModelTarget::Hosted(hosted_model.to_string()));
    }
    let mut tokens = line.split_whitespace();
    if tokens.next() == Some("model") {
        let name: Vec<&str> = tokens.collect();
        if name.len() == 1 {
            return Some(ModelTarget::Hosted(name[0].to_string()));
        }
    }
    None
}

fn parse_drive(line: &str) -> Option<char> {
    let mut chars = line.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => {
            Some(letter.to_ascii_uppercase())
        }
        _ => None,
    }
}

/// `cd`, `cd..` and `cd <path>`. Multi-word paths are rejoined with single
/// spaces. Words that merely start with "cd" do not match.
fn parse_change_dir(line: &str) -> Option<String> {
    if line == "cd.." {
        return Some("..".to_string());
    }
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("cd") {
        return None;
    }
    Some(tokens.collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: ParseOptions<'static> = ParseOptions {
        hosted_model: "gpt-4.1",
        drive_change: false,
    };

    const WINDOWS: ParseOptions<'static> = ParseOptions {
        hosted_model: "gpt-4.1",
        drive_change: true,
    };

    fn parse(line: &str) -> Directive {
        Directive::parse(line, &OPTIONS)
    }

    #[test]
    fn blank_and_exit() {
        assert_eq!(parse(""), Directive::Blank);
        assert_eq!(parse("   \t"), Directive::Blank);
        assert_eq!(parse("exit"), Directive::Exit);
        assert_eq!(parse("QUIT"), Directive::Exit);
        assert_eq!(parse("  Exit  "), Directive::Exit);
    }

    #[test]
    fn pipe_splits_on_first_separator() {
        assert_eq!(
            parse("dir |? how many files"),
            Directive::Pipe {
                command: "dir".to_string(),
                question: "how many files".to_string(),
            }
        );
        assert_eq!(
            parse("cat a |? b |? c"),
            Directive::Pipe {
                command: "cat a".to_string(),
                question: "b |? c".to_string(),
            }
        );
    }

    #[test]
    fn pipe_with_empty_side_is_invalid() {
        assert_eq!(parse("ls |?"), Directive::InvalidPipe);
        assert_eq!(parse("ls |?   "), Directive::InvalidPipe);
        assert_eq!(parse("|? what"), Directive::InvalidPipe);
    }

    #[test]
    fn pipe_beats_every_later_rule() {
        assert!(matches!(parse("cd /tmp |? where"), Directive::Pipe { .. }));
        assert!(matches!(parse("@notes |? summarize"), Directive::Pipe { .. }));
    }

    #[test]
    fn model_switch_tokens() {
        assert_eq!(parse("llm"), Directive::SwitchModel(ModelTarget::Local));
        assert_eq!(parse("local"), Directive::SwitchModel(ModelTarget::Local));
        assert_eq!(
            parse("gpt-4.1"),
            Directive::SwitchModel(ModelTarget::Hosted("gpt-4.1".to_string()))
        );
        assert_eq!(
            parse("model gpt-5-mini"),
            Directive::SwitchModel(ModelTarget::Hosted("gpt-5-mini".to_string()))
        );
        assert!(matches!(parse("model"), Directive::Classify(_)));
        assert!(matches!(parse("model a b"), Directive::Classify(_)));
    }

    #[test]
    fn reset() {
        assert_eq!(parse("reset"), Directive::Reset);
        assert!(matches!(parse("reset the router"), Directive::Classify(_)));
    }

    #[test]
    fn drive_tokens_only_when_supported() {
        assert_eq!(Directive::parse("d:", &WINDOWS), Directive::Drive('D'));
        assert_eq!(Directive::parse("C:", &WINDOWS), Directive::Drive('C'));
        assert!(matches!(Directive::parse("1:", &WINDOWS), Directive::Classify(_)));
        assert!(matches!(parse("d:"), Directive::Classify(_)));
    }

    #[test]
    fn change_directory_forms() {
        assert_eq!(parse("cd"), Directive::ChangeDir(String::new()));
        assert_eq!(parse("cd.."), Directive::ChangeDir("..".to_string()));
        assert_eq!(parse("cd .."), Directive::ChangeDir("..".to_string()));
        assert_eq!(parse("cd ~/src"), Directive::ChangeDir("~/src".to_string()));
        assert_eq!(
            parse("cd My   Documents"),
            Directive::ChangeDir("My Documents".to_string())
        );
    }

    #[test]
    fn words_starting_with_cd_are_not_change_directory() {
        assert!(matches!(parse("cdk deploy"), Directive::Classify(_)));
        assert!(matches!(parse("cdrecord --help"), Directive::Classify(_)));
    }

    #[test]
    fn listing_keeps_line_intact() {
        assert_eq!(parse("ls -la"), Directive::Listing("ls -la".to_string()));
        assert_eq!(parse("dir"), Directive::Listing("dir".to_string()));
        assert_eq!(parse("DIR"), Directive::Listing("DIR".to_string()));
        assert_eq!(parse("Ls -la"), Directive::Listing("Ls -la".to_string()));
        assert!(matches!(parse("lsblk"), Directive::Classify(_)));
    }

    #[test]
    fn attach_collects_marked_tokens() {
        assert_eq!(
            parse("@main.rs and @notes.txt please"),
            Directive::Attach(vec!["main.rs".to_string(), "notes.txt".to_string()])
        );
        assert_eq!(parse("@"), Directive::Attach(Vec::new()));
    }

    #[test]
    fn save_with_and_without_name() {
        assert_eq!(parse("save out.py"), Directive::Save(Some("out.py".to_string())));
        assert_eq!(
            parse("save my notes.md"),
            Directive::Save(Some("my notes.md".to_string()))
        );
        assert_eq!(parse("save"), Directive::Save(None));
        assert!(matches!(parse("saved games"), Directive::Classify(_)));
    }

    #[test]
    fn everything_else_is_classified_verbatim() {
        assert_eq!(
            parse("  delete all log files "),
            Directive::Classify("  delete all log files ".to_string())
        );
    }
}
