use crate::models::Quality;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Napster application key (a uuid4 stored as base64).
    pub api_key: String,
    /// Napster customer secret, same shape as the api key.
    pub customer_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// Override for the API base URL; tests point this at mockito.
    #[serde(default)]
    pub api_base: Option<String>,

    #[serde(default = "default_quality")]
    pub quality: Quality,
    #[serde(default)]
    pub proprietary_codecs: bool,
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    // where the session JSON lives
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_quality() -> Quality { Quality::High }
fn default_search_limit() -> u32 { 10 }

fn default_session_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("napster-provider/session.json")
}

fn default_log_dir() -> PathBuf { "/var/log/napster-provider".into() }

impl Settings {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Settings = toml::from_str(&s)?;
        Ok(cfg)
    }
}
