use std::{
    fmt,
    path::{Path, PathBuf},
};

use alloy_chains::NamedChain;
use serde::Deserialize;

use crate::{
    constants::{
        DEFAULT_DATA_API_URL, DEFAULT_LOG_DIR, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL_MS,
        DEFAULT_RELAYER_URL, DEFAULT_RPC_URL, ENV_FILE_NAME, POLYGON_CHAIN_ID, SETTINGS_FILE_NAME,
    },
    transaction::with_hex_prefix,
};

const PRIVATE_KEY_VARS: &[&str] = &["PRIVATE_KEY"];
const API_KEY_VARS: &[&str] = &["BUILDER_API_KEY", "BUILDER_KEY"];
const SECRET_VARS: &[&str] = &["BUILDER_SECRET"];
const PASSPHRASE_VARS: &[&str] = &["BUILDER_PASSPHRASE", "BUILDER_PASS_PHRASE"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Set in .env: PRIVATE_KEY, BUILDER_API_KEY, BUILDER_SECRET, BUILDER_PASSPHRASE (missing: {})", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
    #[error("CHAIN_ID must be an integer, got {0:?}")]
    InvalidChainId(String),
    #[error("chain {0} has no PROXY relaying contracts")]
    UnsupportedChain(u64),
    #[error("failed to read {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    SettingsFormat {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to load {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("cannot locate the executable's parent directory")]
    NoBaseDir,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    /// All claims in one relayer call.
    #[default]
    Batch,
    /// One relayer call per claim, stopping at the first rate limit.
    Sequential,
}

/// Tuning knobs read from `claimer.toml`. Every key is optional.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Settings {
    pub mode: SubmissionMode,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub data_api_url: String,
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: SubmissionMode::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: DEFAULT_MAX_POLLS,
            data_api_url: DEFAULT_DATA_API_URL.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Settings {
    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::SettingsFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `claimer.toml` from `base_dir`, falling back to defaults when absent.
    pub async fn read(base_dir: &Path) -> Result<Self, ConfigError> {
        let path = base_dir.join(SETTINGS_FILE_NAME);

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&path, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::SettingsIo { path, source }),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub private_key: String,
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("private_key", &"<redacted>")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let private_key = first_non_blank(&lookup, PRIVATE_KEY_VARS);
        let api_key = first_non_blank(&lookup, API_KEY_VARS);
        let secret = first_non_blank(&lookup, SECRET_VARS);
        let passphrase = first_non_blank(&lookup, PASSPHRASE_VARS);

        match (private_key, api_key, secret, passphrase) {
            (Some(private_key), Some(api_key), Some(secret), Some(passphrase)) => Ok(Self {
                private_key: with_hex_prefix(&private_key),
                api_key,
                secret,
                passphrase,
            }),
            (private_key, api_key, secret, passphrase) => {
                let missing = [
                    (private_key.is_none(), PRIVATE_KEY_VARS[0]),
                    (api_key.is_none(), API_KEY_VARS[0]),
                    (secret.is_none(), SECRET_VARS[0]),
                    (passphrase.is_none(), PASSPHRASE_VARS[0]),
                ]
                .into_iter()
                .filter_map(|(is_missing, name)| is_missing.then_some(name))
                .collect();

                Err(ConfigError::MissingCredentials(missing))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub relayer_url: String,
    pub chain: NamedChain,
    pub rpc_url: String,
    pub settings: Settings,
}

impl Config {
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        let credentials = Credentials::from_lookup(&lookup)?;

        let relayer_url = first_non_blank(&lookup, &["RELAYER_URL"])
            .unwrap_or_else(|| DEFAULT_RELAYER_URL.to_string());
        let rpc_url =
            first_non_blank(&lookup, &["RPC_URL"]).unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        let chain_id = match first_non_blank(&lookup, &["CHAIN_ID"]) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidChainId(raw))?,
            None => POLYGON_CHAIN_ID,
        };
        let chain = match NamedChain::try_from(chain_id) {
            Ok(chain @ NamedChain::Polygon) => chain,
            _ => return Err(ConfigError::UnsupportedChain(chain_id)),
        };

        Ok(Self {
            credentials,
            relayer_url: relayer_url.trim_end_matches('/').to_string(),
            chain,
            rpc_url,
            settings,
        })
    }
}

/// Directory holding `.env` and `claimer.toml`: the parent of the executable's directory.
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent()?.parent().map(Path::to_path_buf))
        .ok_or(ConfigError::NoBaseDir)
}

/// Loads `.env` into the process environment. Variables already set win.
pub fn load_env_file(base_dir: &Path) -> Result<bool, ConfigError> {
    let path = base_dir.join(ENV_FILE_NAME);

    match dotenvy::from_path(&path) {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ConfigError::EnvFile { path, source }),
    }
}

fn first_non_blank(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
