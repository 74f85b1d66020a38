//! Engine configuration: loaded from TOML on disk, with every field
//! individually overridable by an environment variable, centralizing every
//! tunable in one validated struct.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_host() -> String {
    hostname_or_localhost()
}

fn hostname_or_localhost() -> String {
    env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

const fn default_health_check_period() -> u64 {
    30
}

const fn default_num_workers() -> usize {
    4
}

const fn default_queue_warning_threshold() -> usize {
    100
}

const fn default_reboot_error_threshold() -> usize {
    5
}

/// Every recognized configuration option and its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// This node's identity string, used in log lines and thread-status
    /// introspection. Defaults to `$HOSTNAME` or `"localhost"`.
    pub host: String,

    /// Seconds between external health-check pings. Reserved for the
    /// transport/health-check collaborator; this crate only carries it.
    pub health_check_period: u64,

    /// Worker-thread count for the dispatch pool.
    pub num_workers: usize,

    /// Transport connection string, consumed by the external listener.
    pub amqp_url: Option<String>,

    /// Filesystem path the debug store may scan for out-of-band debug
    /// directives. Reserved for the debug-store collaborator.
    pub ignored_router_directory: Option<PathBuf>,

    /// Log a warning when a tenant's tracked router count exceeds this.
    pub queue_warning_threshold: usize,

    /// Forwarded to each tenant manager's state-machine factory.
    pub reboot_error_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            health_check_period: default_health_check_period(),
            num_workers: default_num_workers(),
            amqp_url: None,
            ignored_router_directory: None,
            queue_warning_threshold: default_queue_warning_threshold(),
            reboot_error_threshold: default_reboot_error_threshold(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, then overlays any recognized
    /// `ROUTERD_*` environment variable, then validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from defaults plus environment overrides only,
    /// for deployments with no config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("ROUTERD_HOST") {
            self.host = v;
        }
        if let Ok(v) = env::var("ROUTERD_HEALTH_CHECK_PERIOD") {
            if let Ok(v) = v.parse() {
                self.health_check_period = v;
            }
        }
        if let Ok(v) = env::var("ROUTERD_NUM_WORKERS") {
            if let Ok(v) = v.parse() {
                self.num_workers = v;
            }
        }
        if let Ok(v) = env::var("ROUTERD_AMQP_URL") {
            self.amqp_url = Some(v);
        }
        if let Ok(v) = env::var("ROUTERD_IGNORED_ROUTER_DIRECTORY") {
            self.ignored_router_directory = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("ROUTERD_QUEUE_WARNING_THRESHOLD") {
            if let Ok(v) = v.parse() {
                self.queue_warning_threshold = v;
            }
        }
        if let Ok(v) = env::var("ROUTERD_REBOOT_ERROR_THRESHOLD") {
            if let Ok(v) = v.parse() {
                self.reboot_error_threshold = v;
            }
        }
    }

    /// Rejects configurations that can't possibly run correctly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "host".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.num_workers == 0 {
            return Err(ConfigError::Validation {
                field: "num_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue_warning_threshold == 0 {
            return Err(ConfigError::Validation {
                field: "queue_warning_threshold".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
