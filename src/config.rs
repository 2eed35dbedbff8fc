// Configuration for the uploader. Two layers live here:
// - `ClientSettings`: the timing knobs of `api::ApiClient`
// - `FileConfig`: optional defaults read from
//   `$XDG_CONFIG_HOME/openwebui-uploader/config.toml`
//
// Command line flags and environment variables take precedence over the
// config file; the file takes precedence over the built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of attempts when linking a file to a collection.
pub const DEFAULT_RETRIES: u32 = 3;
/// Default pause between linking attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Pause between a successful upload and the link call. The server processes
/// new files asynchronously and rejects links that arrive too early.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timing knobs of the API client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub retries: u32,
    pub retry_delay: Duration,
    pub settle_delay: Duration,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Base URL of the Open WebUI instance
    #[serde(default)]
    pub endpoint: Option<String>,

    /// API key (the environment variable wins over this)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    /// Seconds between linking attempts
    #[serde(default)]
    pub retry_delay_secs: Option<f64>,

    /// Milliseconds between upload and link
    #[serde(default)]
    pub settle_delay_ms: Option<u64>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Default location of the config file, if a config directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("openwebui-uploader").join("config.toml"))
    }

    /// Load the config file at `path`, or the default location when `None`.
    ///
    /// A missing file at the default location is not an error; a missing
    /// file that was named explicitly is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.retries == Some(0) {
            anyhow::bail!("retries must be at least 1");
        }
        Ok(config)
    }

    /// Apply the file's timing values on top of `settings`.
    pub fn apply_to(&self, settings: &mut ClientSettings) {
        if let Some(retries) = self.retries {
            settings.retries = retries;
        }
        if let Some(secs) = self.retry_delay_secs {
            settings.retry_delay = Duration::from_secs_f64(secs.max(0.0));
        }
        if let Some(ms) = self.settle_delay_ms {
            settings.settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
    }
}
