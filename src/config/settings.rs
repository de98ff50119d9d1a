use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::agent::{AgentOptions, DEFAULT_INJECTION_MARKER, DEFAULT_USER_AGENT};
use crate::util::paths::{config_path, default_download_dir};

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub fetch: FetchConfig,
    pub agent: AgentConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Fetches in flight at once within a category
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Scripts containing this string are treated as injected tooling
    pub injection_marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Where archives are saved
    pub output_dir: PathBuf,
    /// Replace an existing archive instead of numbering the new one
    pub overwrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig {
                timeout_secs: 15,
                user_agent: DEFAULT_USER_AGENT.to_string(),
                concurrency: 1,
            },
            agent: AgentConfig {
                injection_marker: DEFAULT_INJECTION_MARKER.to_string(),
            },
            download: DownloadConfig {
                output_dir: default_download_dir(),
                overwrite: false,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlFetchConfig {
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlAgentConfig {
    pub injection_marker: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlDownloadConfig {
    pub output_dir: Option<PathBuf>,
    pub overwrite: Option<bool>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub fetch: Option<TomlFetchConfig>,
    pub agent: Option<TomlAgentConfig>,
    pub download: Option<TomlDownloadConfig>,
}

impl Config {
    /// Load configuration from file, merging with defaults
    pub fn load() -> Self {
        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        Self::load_from(&config_file)
    }

    /// Merge the file at `path` over the defaults. A missing or unreadable
    /// file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No config file loaded");
                return Config::default();
            }
        };

        match Self::from_toml_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Config::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config = toml::from_str::<TomlConfig>(contents)?;
        let mut config = Config::default();

        if let Some(fetch) = toml_config.fetch {
            if let Some(timeout_secs) = fetch.timeout_secs {
                config.fetch.timeout_secs = timeout_secs.max(1);
            }
            if let Some(user_agent) = fetch.user_agent {
                config.fetch.user_agent = user_agent;
            }
            if let Some(concurrency) = fetch.concurrency {
                config.fetch.concurrency = concurrency.max(1);
            }
        }

        if let Some(agent) = toml_config.agent {
            if let Some(marker) = agent.injection_marker {
                config.agent.injection_marker = marker;
            }
        }

        if let Some(download) = toml_config.download {
            if let Some(output_dir) = download.output_dir {
                config.download.output_dir = expand_home(output_dir);
            }
            if let Some(overwrite) = download.overwrite {
                config.download.overwrite = overwrite;
            }
        }

        Ok(config)
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions::default()
            .with_injection_marker(self.agent.injection_marker.clone())
            .with_fetch_concurrency(self.fetch.concurrency)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch.timeout_secs = secs.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch.concurrency = concurrency.max(1);
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.download.output_dir = dir;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.download.overwrite = overwrite;
        self
    }
}

/// `~/x` becomes `$HOME/x`.
fn expand_home(path: PathBuf) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path,
        },
        Err(_) => path,
    }
}
