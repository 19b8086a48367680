//! TOML configuration for the booker binary.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tika: TikaConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TikaConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_tika_port")]
    pub port: u16,
}

impl Default for TikaConfig {
    fn default() -> Self {
        Self {
            enable: false,
            host: String::new(),
            port: default_tika_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_google_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_google_interval")]
    pub milliseconds_per_request: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: default_google_url(),
            api_key: String::new(),
            milliseconds_per_request: default_google_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default = "default_max_characters")]
    pub max_characters_to_search_for_isbn: usize,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            max_characters_to_search_for_isbn: default_max_characters(),
        }
    }
}

fn default_tika_port() -> u16 {
    9998
}

fn default_google_url() -> String {
    "www.googleapis.com/books/v1/volumes".to_string()
}

fn default_google_interval() -> u64 {
    1000
}

fn default_max_characters() -> usize {
    10_000
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&data).context("invalid TOML in configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit zero values fall back to the defaults; an enabled Tika
    /// extractor must name its host.
    pub fn validate(&mut self) -> Result<()> {
        if self.tika.enable {
            if self.tika.host.is_empty() {
                bail!("tika.host must be configured if tika is enabled");
            }
            if self.tika.port == 0 {
                self.tika.port = default_tika_port();
            }
        }

        if self.google.enable {
            if self.google.url.is_empty() {
                self.google.url = default_google_url();
            }
            if self.google.milliseconds_per_request == 0 {
                self.google.milliseconds_per_request = default_google_interval();
            }
        }

        if self.advanced.max_characters_to_search_for_isbn == 0 {
            self.advanced.max_characters_to_search_for_isbn = default_max_characters();
        }

        Ok(())
    }
}
