use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use cdv_backend::openai::HOSTED_BASE_URL;

/// Classifier model value that selects the local endpoint.
pub const LOCAL_CLASSIFIER: &str = "local";

/// Hosted model used for classification when nothing else is available.
pub const FALLBACK_CLASSIFIER_MODEL: &str = "gpt-4.1-nano";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "CODRIVER_BASE_URL";
pub const ENV_MODEL: &str = "CODRIVER_MODEL";
pub const ENV_LOCAL_IP: &str = "CODRIVER_LOCAL_IP";
pub const ENV_LOCAL_PORT: &str = "CODRIVER_LOCAL_PORT";
pub const ENV_LOCAL_MODEL: &str = "CODRIVER_LOCAL_MODEL";
pub const ENV_CLASSIFIER_MODEL: &str = "CODRIVER_CLASSIFIER_MODEL";
pub const ENV_SHELL: &str = "CODRIVER_SHELL";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub local: LocalConfig,
    pub classifier: ClassifierConfig,
    pub shell: ShellConfig,
}

/// The hosted chat completion API.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Default conversational model.
    pub model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: HOSTED_BASE_URL.to_string(),
            model: "gpt-4.1".to_string(),
        }
    }
}

/// A local OpenAI-compatible server. Usable only when all three are set.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalConfig {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub model: Option<String>,
}

impl LocalConfig {
    /// `(host, port, model)` when the endpoint is fully configured.
    pub fn endpoint(&self) -> Option<(&str, u16, &str)> {
        match (&self.ip, self.port, &self.model) {
            (Some(ip), Some(port), Some(model)) => Some((ip.as_str(), port, model.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Model used for intent classification, or `local`.
    pub model: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: FALLBACK_CLASSIFIER_MODEL.to_string(),
        }
    }
}

impl ClassifierConfig {
    pub fn uses_local(&self) -> bool {
        self.model.trim().eq_ignore_ascii_case(LOCAL_CLASSIFIER)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    /// POSIX interpreter. Defaults to `/bin/sh`; ignored on Windows.
    pub command: Option<String>,
    /// Timeout for captured command execution.
    pub timeout_secs: u64,
    /// Timeout for the `ls`/`dir` shortcut.
    pub listing_timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 30,
            listing_timeout_secs: 20,
        }
    }
}

impl ShellConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }
}

impl Config {
    /// File config overlaid with the process environment. Read once at startup.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    pub fn load_file_or_default() -> Self {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    /// Overlay values from `lookup` (normally the environment). Blank values
    /// are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get(ENV_API_KEY) {
            self.backend.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.backend.base_url = url;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.backend.model = model;
        }
        if let Some(ip) = get(ENV_LOCAL_IP) {
            self.local.ip = Some(ip);
        }
        if let Some(port) = get(ENV_LOCAL_PORT) {
            match port.parse::<u16>() {
                Ok(port) => self.local.port = Some(port),
                Err(e) => tracing::warn!(value = %port, error = %e, "ignoring invalid {ENV_LOCAL_PORT}"),
            }
        }
        if let Some(model) = get(ENV_LOCAL_MODEL) {
            self.local.model = Some(model);
        }
        if let Some(model) = get(ENV_CLASSIFIER_MODEL) {
            self.classifier.model = model;
        }
        if let Some(shell) = get(ENV_SHELL) {
            self.shell.command = Some(shell);
        }
    }
}

/// The user's home directory, from `HOME` (or `USERPROFILE` on Windows).
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    base.join("codriver").join("config.toml")
}
