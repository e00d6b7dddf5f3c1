//! Writing the last assistant reply to a file.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::history::Conversation;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("no assistant response to save")]
    NoAssistantResponse,
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Write the most recent assistant message verbatim to `path`. Returns the
/// number of bytes written. Nothing is touched when there is no reply yet.
pub fn save_last_response(conversation: &Conversation, path: &Path) -> Result<usize, SaveError> {
    let content = conversation
        .last_assistant()
        .ok_or(SaveError::NoAssistantResponse)?;
    std::fs::write(path, content).map_err(|source| SaveError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_latest_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.py");
        let mut conv = Conversation::new("identity");
        conv.push_assistant("print('old')");
        conv.push_user("again");
        conv.push_assistant("print('new')\n");

        let written = save_last_response(&conv, &path).unwrap();
        assert_eq!(written, 13);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print('new')\n");
    }

    #[test]
    fn no_reply_leaves_filesystem_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.py");
        let mut conv = Conversation::new("identity");
        conv.push_user("question only");

        let err = save_last_response(&conv, &path).unwrap_err();
        assert!(matches!(err, SaveError::NoAssistantResponse));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unwritable_target_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("answer.py");
        let mut conv = Conversation::new("identity");
        conv.push_assistant("x");

        let err = save_last_response(&conv, &path).unwrap_err();
        assert!(matches!(err, SaveError::Write { .. }));
    }
}
