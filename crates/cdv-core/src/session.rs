//! Per-session state: working directory and the two model targets.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::home_dir;
use crate::model::ModelClient;

#[derive(Debug, Error)]
#[error("no such directory: {}", .0.display())]
pub struct DirectoryNotFound(pub PathBuf);

#[derive(Debug, Clone)]
pub struct SessionState {
    working_directory: PathBuf,
    active: ModelClient,
    classifier: ModelClient,
}

impl SessionState {
    pub fn new(working_directory: PathBuf, active: ModelClient, classifier: ModelClient) -> Self {
        Self {
            working_directory,
            active,
            classifier,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn active(&self) -> &ModelClient {
        &self.active
    }

    pub fn set_active(&mut self, client: ModelClient) {
        self.active = client;
    }

    pub fn classifier(&self) -> &ModelClient {
        &self.classifier
    }

    /// Resolve a user-typed path against the working directory. `~` expands
    /// to the home directory; `.` and `..` are folded lexically.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            normalize(&expanded)
        } else {
            normalize(&self.working_directory.join(expanded))
        }
    }

    /// Apply a `cd` argument. Empty means home. On failure the working
    /// directory is unchanged.
    pub fn change_directory(&mut self, arg: &str) -> Result<&Path, DirectoryNotFound> {
        let arg = strip_quotes(arg.trim());
        let target = if arg.is_empty() {
            home_dir().ok_or_else(|| DirectoryNotFound(PathBuf::from("~")))?
        } else {
            self.resolve(arg)
        };
        self.enter(target)
    }

    /// Switch to the root of drive `letter`.
    pub fn change_drive(&mut self, letter: char) -> Result<&Path, DirectoryNotFound> {
        self.enter(PathBuf::from(format!("{letter}:\\")))
    }

    fn enter(&mut self, target: PathBuf) -> Result<&Path, DirectoryNotFound> {
        if !target.is_dir() {
            return Err(DirectoryNotFound(target));
        }
        tracing::debug!(cwd = %target.display(), "working directory changed");
        self.working_directory = target;
        Ok(&self.working_directory)
    }
}

fn strip_quotes(arg: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = arg
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    arg
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
