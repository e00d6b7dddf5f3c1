//! Attachment loading: file validation, size cap, lenient text decoding.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Maximum attachment size in bytes (1 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("file too large: {} is {size} bytes (limit 1 MiB)", path.display())]
    TooLarge { path: PathBuf, size: u64 },
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A text file ready to be added to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// The name as the user typed it.
    pub name: String,
    pub content: String,
}

impl Attachment {
    /// The user message that carries the file.
    pub fn message(&self) -> String {
        format!(
            "Here is the content of the file '{}':\n\n---\n{}\n---",
            self.name, self.content
        )
    }
}

/// Load and validate the file at `path`, labelled `name`.
pub fn load_attachment(path: &Path, name: &str) -> Result<Attachment, AttachError> {
    let metadata = std::fs::metadata(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => AttachError::NotFound(path.to_path_buf()),
        _ => AttachError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;
    if !metadata.is_file() {
        return Err(AttachError::NotFound(path.to_path_buf()));
    }
    if metadata.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
        });
    }

    let bytes = std::fs::read(path).map_err(|source| AttachError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Attachment {
        name: name.to_string(),
        content: decode_dropping_invalid(&bytes),
    })
}

/// UTF-8 decode that skips invalid sequences instead of replacing them.
fn decode_dropping_invalid(mut bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                text.push_str(valid);
                return text;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    text.push_str(valid);
                }
                match e.error_len() {
                    Some(skip) => bytes = &rest[skip..],
                    // truncated sequence at the end
                    None => return text,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wraps_content_with_name() {
        let att = Attachment {
            name: "notes.txt".to_string(),
            content: "line one".to_string(),
        };
        assert_eq!(
            att.message(),
            "Here is the content of the file 'notes.txt':\n\n---\nline one\n---"
        );
    }

    #[test]
    fn load_valid_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "fn main() {}\n").unwrap();

        let att = load_attachment(&path, "main.rs").unwrap();
        assert_eq!(att.name, "main.rs");
        assert_eq!(att.content, "fn main() {}\n");
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = load_attachment(&path, "missing.txt").unwrap_err();
        assert!(matches!(err, AttachError::NotFound(ref p) if *p == path));
    }

    #[test]
    fn load_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_attachment(dir.path(), "dir").unwrap_err();
        assert!(matches!(err, AttachError::NotFound(_)));
    }

    #[test]
    fn exactly_one_mebibyte_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limit.txt");
        std::fs::write(&path, vec![b'a'; MAX_ATTACHMENT_BYTES as usize]).unwrap();
        let att = load_attachment(&path, "limit.txt").unwrap();
        assert_eq!(att.content.len(), MAX_ATTACHMENT_BYTES as usize);
    }

    #[test]
    fn over_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; MAX_ATTACHMENT_BYTES as usize + 1]).unwrap();
        let err = load_attachment(&path, "big.txt").unwrap_err();
        match err {
            AttachError::TooLarge { size, .. } => assert_eq!(size, MAX_ATTACHMENT_BYTES + 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_bytes_are_dropped() {
        assert_eq!(decode_dropping_invalid(b"caf\xC3\xA9"), "café");
        assert_eq!(decode_dropping_invalid(b"a\xFFb\xFEc"), "abc");
        assert_eq!(decode_dropping_invalid(b"end\xE2\x82"), "end");
        assert_eq!(decode_dropping_invalid(b""), "");
    }
}
