use parlor_types::{
    casino::{DEFAULT_DAILY_AMOUNT, SESSION_EXPIRY_SECS},
    execution::AccountId,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;

pub mod dispatcher;
pub mod identity;
pub mod messenger;

/// Node configuration, as read from YAML.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Storage directory balances are persisted under. Balances live in memory only
    /// when absent.
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default = "default_daily_amount")]
    pub daily_amount: i64,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default)]
    pub shoe_seed: Option<u64>,

    /// Accounts allowed to `!mint`.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Display name to account id.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Refund games still in play when the input closes.
    #[serde(default)]
    pub refund_on_shutdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            worker_threads: default_worker_threads(),
            data_dir: None,
            daily_amount: default_daily_amount(),
            session_ttl_seconds: default_session_ttl_seconds(),
            shoe_seed: None,
            admins: Vec::new(),
            aliases: BTreeMap::new(),
            refund_on_shutdown: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be positive (got {value})")]
    InvalidAmount { field: &'static str, value: i64 },
    #[error("{field} has an invalid account id: {value:?}")]
    InvalidAccount { field: &'static str, value: String },
    #[error("alias {alias} is not a valid name")]
    InvalidAlias { alias: String },
}

#[derive(Clone)]
pub struct ValidatedConfig {
    pub log_level: Level,
    pub json_logs: bool,
    pub worker_threads: usize,
    pub data_dir: Option<PathBuf>,
    pub daily_amount: i64,
    pub session_ttl: Duration,
    pub shoe_seed: Option<u64>,
    pub admins: Vec<AccountId>,
    pub aliases: BTreeMap<String, AccountId>,
    pub refund_on_shutdown: bool,
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("json_logs", &self.json_logs)
            .field("worker_threads", &self.worker_threads)
            .field("data_dir", &self.data_dir)
            .field("daily_amount", &self.daily_amount)
            .field("session_ttl", &self.session_ttl)
            .field("shoe_seed", &self.shoe_seed)
            .field("admins", &self.admins.len())
            .field("aliases", &self.aliases.len())
            .field("refund_on_shutdown", &self.refund_on_shutdown)
            .finish()
    }
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn parse_account(field: &'static str, value: &str) -> Result<AccountId, ConfigError> {
    AccountId::try_new(value.trim()).ok_or_else(|| ConfigError::InvalidAccount {
        field,
        value: value.to_string(),
    })
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        ensure_nonzero("worker_threads", self.worker_threads as u64)?;
        ensure_nonzero("session_ttl_seconds", self.session_ttl_seconds)?;
        if self.daily_amount <= 0 {
            return Err(ConfigError::InvalidAmount {
                field: "daily_amount",
                value: self.daily_amount,
            });
        }

        let admins = self
            .admins
            .iter()
            .map(|admin| parse_account("admins", admin))
            .collect::<Result<Vec<_>, _>>()?;
        let mut aliases = BTreeMap::new();
        for (alias, id) in &self.aliases {
            let name = alias.trim().trim_start_matches('@').to_lowercase();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidAlias {
                    alias: alias.clone(),
                });
            }
            aliases.insert(name, parse_account("aliases", id)?);
        }

        Ok(ValidatedConfig {
            log_level,
            json_logs: self.json_logs,
            worker_threads: self.worker_threads,
            data_dir: self.data_dir.map(PathBuf::from),
            daily_amount: self.daily_amount,
            session_ttl: Duration::from_secs(self.session_ttl_seconds),
            shoe_seed: self.shoe_seed,
            admins,
            aliases,
            refund_on_shutdown: self.refund_on_shutdown,
        })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_threads() -> usize {
    2
}

fn default_daily_amount() -> i64 {
    DEFAULT_DAILY_AMOUNT
}

fn default_session_ttl_seconds() -> u64 {
    SESSION_EXPIRY_SECS
}
