use crate::cli::Cli;
use crate::error::{RankError, RankResult};
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

const TRACE_LEVELS: [&'static str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
const LOCAL_SETTINGS_YAML_FILE: &str = "ranker.yaml";
const ENV_PREFIX: &str = "RANKER_";
// Bounds keeping every expiry and retention cutoff representable
const MAX_TTL_SEC: u64 = 365 * 24 * 3600;
const MAX_RETENTION_DAYS: i64 = 10 * 365;

// Settings of the binary, generated once at runtime. All settings may be
// configured via environment variables prefixed with RANKER_. Example:
// RANKER_CACHE_TIMEOUT_MS=250 would set cache_timeout_ms to 250.
pub static SETTINGS: Lazy<RankResult<Settings>> = Lazy::new(|| Settings::load(Cli::parse()));

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_trace_level")]
    trace_level: String,
    // Applied when a leaderboard is created without a capacity
    #[serde(default = "default_max_entries")]
    pub default_max_entries: i64,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default = "default_cache_ttl_sec")]
    pub ranking_cache_ttl_sec: u64,
    #[serde(default = "default_cache_ttl_sec")]
    pub config_cache_ttl_sec: u64,
    // Backstop against a rebuild holder that crashed mid-way
    #[serde(default = "default_rebuild_lock_ttl_sec")]
    pub rebuild_lock_ttl_sec: u64,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_score_retention_days")]
    pub score_retention_days: i64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_maintenance_schedule")]
    pub maintenance_schedule: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            trace_level: default_trace_level(),
            default_max_entries: default_max_entries(),
            default_timezone: default_timezone(),
            ranking_cache_ttl_sec: default_cache_ttl_sec(),
            config_cache_ttl_sec: default_cache_ttl_sec(),
            rebuild_lock_ttl_sec: default_rebuild_lock_ttl_sec(),
            store_timeout_ms: default_store_timeout_ms(),
            cache_timeout_ms: default_cache_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            score_retention_days: default_score_retention_days(),
            max_batch_size: default_max_batch_size(),
            max_page_size: default_max_page_size(),
            maintenance_schedule: default_maintenance_schedule(),
        }
    }
}

impl Settings {
    /// Defaults, then the YAML file, then RANKER_* environment variables, then CLI flags.
    pub fn load(cli: Cli) -> RankResult<Self> {
        let yaml_file = cli
            .config
            .clone()
            .or_else(|| std::env::var(format!("{ENV_PREFIX}CONFIG")).ok())
            .unwrap_or_else(|| LOCAL_SETTINGS_YAML_FILE.to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if Path::new(&yaml_file).exists() {
            eprintln!(
                "\n######################################\n\
                   ##   Found '{yaml_file}' file,\n\
                   ##   loading local configuration.   ##\n\
                   ######################################\n\
                "
            );
            figment = figment.merge(Yaml::file(&yaml_file));
        }

        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
            .merge(Serialized::defaults(cli))
            .extract()
            .map_err(|e| RankError::Validation(format!("Invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> RankResult<()> {
        for (name, ttl) in [
            ("ranking_cache_ttl_sec", self.ranking_cache_ttl_sec),
            ("config_cache_ttl_sec", self.config_cache_ttl_sec),
            ("rebuild_lock_ttl_sec", self.rebuild_lock_ttl_sec),
        ] {
            if ttl == 0 || ttl > MAX_TTL_SEC {
                return Err(RankError::Validation(format!(
                    "{name} must be between 1 and {MAX_TTL_SEC}, got {ttl}"
                )));
            }
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.score_retention_days) {
            return Err(RankError::Validation(format!(
                "score_retention_days must be between 1 and {MAX_RETENTION_DAYS}, got {}",
                self.score_retention_days
            )));
        }
        if self.max_batch_size == 0 {
            return Err(RankError::Validation(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(RankError::Validation(
                "max_page_size must be greater than 0".to_string(),
            ));
        }
        if self.default_max_entries <= 0 {
            return Err(RankError::Validation(
                "default_max_entries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_trace_level(&self) -> Level {
        get_trace_level(&self.trace_level)
    }

    pub fn ranking_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ranking_cache_ttl_sec)
    }

    pub fn config_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl_sec)
    }

    pub fn rebuild_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.rebuild_lock_ttl_sec)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn score_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.score_retention_days)
    }
}

fn get_trace_level(level_str: &str) -> Level {
    match level_str.to_uppercase().as_str() {
        level if level == TRACE_LEVELS[0] => Level::TRACE,
        level if level == TRACE_LEVELS[1] => Level::DEBUG,
        level if level == TRACE_LEVELS[2] => Level::INFO,
        level if level == TRACE_LEVELS[3] => Level::WARN,
        level if level == TRACE_LEVELS[4] => Level::ERROR,
        // Default trace level
        _ => Level::INFO,
    }
}

fn default_trace_level() -> String {
    "INFO".to_string()
}

fn default_max_entries() -> i64 {
    10_000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_cache_ttl_sec() -> u64 {
    24 * 3600
}

fn default_rebuild_lock_ttl_sec() -> u64 {
    5 * 60
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_cache_timeout_ms() -> u64 {
    500
}

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_score_retention_days() -> i64 {
    30
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_page_size() -> usize {
    1000
}

fn default_maintenance_schedule() -> String {
    "0 */5 * * * *".to_string()
}
