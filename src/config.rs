//! Exporter configuration.
//!
//! Settings are layered, later sources winning:
//! - JSON file at `<config dir>/tk-export/config.json`
//! - `.env` file and process environment (`TK_USER_ID`, `TK_COOKIE`,
//!   `TK_done_campaigns`, `TK_HOST`, `TK_EXPORT_DIR`, `TK_SLEEP_DELAY_MS`)
//! - command-line flags
//! - interactive prompts for whatever is still missing

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_NAME: &str = "tk-export";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_HOST: &str = "https://www.tavern-keeper.com";
pub const DEFAULT_EXPORT_DIR: &str = "exported-data";
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Name of the session cookie the API authenticates with.
pub const SESSION_COOKIE: &str = "tavern-keeper";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("user id not provided (set TK_USER_ID or pass --user-id)")]
    MissingUserId,

    #[error("session cookie not provided (set TK_COOKIE or pass --cookie)")]
    MissingCookie,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Partially specified configuration from a single source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_id: Option<String>,
    pub cookie: Option<String>,
    pub done_campaigns: Option<Vec<String>>,
    pub host: Option<String>,
    pub export_dir: Option<PathBuf>,
    pub delay_ms: Option<u64>,
    pub campaign_characters: Option<bool>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub user_id: String,
    pub cookie: String,
    /// Campaign ids already exported; compared by exact string match.
    pub done_campaigns: Vec<String>,
    pub host: String,
    pub export_dir: PathBuf,
    /// Politeness delay applied before every request.
    pub delay: Duration,
    /// Also export the characters attached to each campaign.
    pub campaign_characters: bool,
}

impl Config {
    /// Configuration for tests and embedding: explicit credentials, no delay.
    pub fn new(
        host: impl Into<String>,
        user_id: impl Into<String>,
        cookie: impl Into<String>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            cookie: cookie.into(),
            done_campaigns: Vec::new(),
            host: host.into(),
            export_dir: export_dir.into(),
            delay: Duration::ZERO,
            campaign_characters: false,
        }
    }

    pub fn is_done(&self, campaign_id: &str) -> bool {
        self.done_campaigns.iter().any(|done| done == campaign_id)
    }
}

impl Settings {
    /// Load the settings file from the user's config directory.
    /// A missing or unreadable file yields empty settings.
    pub fn from_file() -> Self {
        match Self::try_load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load config file, ignoring it: {:#}", e);
                Self::default()
            }
        }
    }

    fn try_load() -> anyhow::Result<Self> {
        let Some(path) = config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let settings = serde_json::from_str(&content).context("Failed to parse config file")?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(settings)
    }

    /// Read settings from `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let delay_ms = match get("TK_SLEEP_DELAY_MS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "TK_SLEEP_DELAY_MS",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self {
            user_id: get("TK_USER_ID").map(|v| v.trim().to_string()),
            cookie: get("TK_COOKIE").map(|v| v.trim().to_string()),
            done_campaigns: get("TK_done_campaigns").map(|v| split_ids(&v)),
            host: get("TK_HOST"),
            export_dir: get("TK_EXPORT_DIR").map(PathBuf::from),
            delay_ms,
            campaign_characters: None,
        })
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn layer(self, other: Settings) -> Settings {
        Settings {
            user_id: other.user_id.or(self.user_id),
            cookie: other.cookie.or(self.cookie),
            done_campaigns: other.done_campaigns.or(self.done_campaigns),
            host: other.host.or(self.host),
            export_dir: other.export_dir.or(self.export_dir),
            delay_ms: other.delay_ms.or(self.delay_ms),
            campaign_characters: other.campaign_characters.or(self.campaign_characters),
        }
    }

    /// Ask for the credentials that are still missing.
    ///
    /// Input is read line by line; the cookie is not masked.
    pub fn prompt_missing<R: BufRead, W: Write>(
        mut self,
        input: &mut R,
        output: &mut W,
    ) -> io::Result<Self> {
        if self.user_id.is_some() && self.cookie.is_some() && self.done_campaigns.is_some() {
            return Ok(self);
        }
        writeln!(output, "Please enter your Tavern Keeper credentials:")?;
        if self.user_id.is_none() {
            self.user_id = prompt(input, output, "User ID: ")?;
        }
        if self.cookie.is_none() {
            self.cookie = prompt(input, output, "Cookie: ")?;
        }
        if self.done_campaigns.is_none() {
            self.done_campaigns = prompt(
                input,
                output,
                "Completed campaign IDs (comma-separated, optional): ",
            )?
            .map(|v| split_ids(&v));
        }
        Ok(self)
    }

    /// Apply defaults and validate the credentials.
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let user_id = self.user_id.ok_or(ConfigError::MissingUserId)?;
        let cookie = self.cookie.ok_or(ConfigError::MissingCookie)?;
        Ok(Config {
            user_id,
            cookie,
            done_campaigns: self.done_campaigns.unwrap_or_default(),
            host: self
                .host
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            export_dir: self
                .export_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
            delay: Duration::from_millis(self.delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
            campaign_characters: self.campaign_characters.unwrap_or(false),
        })
    }
}

/// Split a comma-separated id list, dropping blanks.
pub fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> io::Result<Option<String>> {
    write!(output, "{}", label)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let value = line.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn config_path() -> Option<PathBuf> {
    let mut path = config_dir()?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Some(path)
}
