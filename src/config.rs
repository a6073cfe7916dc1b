use crate::completion::SamplingParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "chrome-extension://ajkalpnppegpgejkkmgfmnobjfadlnne";

/// Non-secret runtime configuration, read from an optional TOML file.
///
/// Secrets (API keys, connection strings) never live here; see [`crate::secrets`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub completion: CompletionConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionConfig {
    /// Request timeout for the completion call. Unset means no timeout.
    pub timeout_secs: Option<u64>,
    pub sampling: SamplingParams,
}

impl CompletionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config file: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("failed parsing config file: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("server.bind is not a socket address: {}", self.server.bind))?;
        if self.server.allowed_origin.trim().is_empty() {
            anyhow::bail!("server.allowed_origin must not be empty");
        }
        if self.completion.timeout_secs == Some(0) {
            anyhow::bail!("completion.timeout_secs must be positive when set");
        }
        let s = &self.completion.sampling;
        if s.max_tokens == 0 {
            anyhow::bail!("completion.sampling.max_tokens must be positive");
        }
        if !(0.0..=2.0).contains(&s.temperature) {
            anyhow::bail!("completion.sampling.temperature must be within 0..=2");
        }
        if !(0.0..=1.0).contains(&s.top_p) {
            anyhow::bail!("completion.sampling.top_p must be within 0..=1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(contents.as_bytes()).expect("write");
        f
    }

    #[test]
    fn defaults_without_file() {
        let cfg = Config::load_or_default(None).unwrap();
        assert_eq!(cfg.server.bind, DEFAULT_BIND);
        assert_eq!(cfg.server.allowed_origin, DEFAULT_ALLOWED_ORIGIN);
        assert_eq!(cfg.completion.timeout(), None);
        assert_eq!(cfg.completion.sampling, SamplingParams::default());
        assert!(cfg.notification.enabled);
    }

    #[test]
    fn example_config_is_valid() {
        let cfg: Config = toml::from_str(include_str!("../config.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.completion.sampling.max_tokens, 800);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let f = write_config(
            r#"
[server]
bind = "127.0.0.1:8080"

[completion]
timeout_secs = 20

[completion.sampling]
temperature = 0.0
"#,
        );
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.server.allowed_origin, DEFAULT_ALLOWED_ORIGIN);
        assert_eq!(cfg.completion.timeout(), Some(Duration::from_secs(20)));
        assert_eq!(cfg.completion.sampling.temperature, 0.0);
        assert_eq!(cfg.completion.sampling.max_tokens, 800);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let f = write_config("[server]\nport = 3000\n");
        assert!(Config::load(f.path()).is_err());

        let f = write_config("[server]\nbind = \"not-an-address\"\n");
        assert!(Config::load(f.path()).is_err());

        let f = write_config("[completion]\ntimeout_secs = 0\n");
        assert!(Config::load(f.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Path::new("/nonexistent/bantai-relay.toml")).is_err());
    }
}
