//! botfleet.toml configuration parser.
//!
//! ```toml
//! [controller]
//! max_workers = 40
//! cycle_period = "15m"
//!
//! [[hosts]]
//! url = "http://10.0.0.5:1242/Api"
//! password = "secret"
//!
//! [policy]
//! kind = "sinusoidal"
//! phase_shift = -6.0
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use botfleet_controller::ControllerConfig;
use botfleet_core::parse_duration;
use botfleet_demand::RestDemandConfig;
use botfleet_gateway::HostEndpoint;
use botfleet_policy::{Policy, PolicyError};

pub const ENV_HOSTS: &str = "BOTFLEET_HOSTS";
pub const ENV_HOST_PASSWORDS: &str = "BOTFLEET_HOST_PASSWORDS";
pub const ENV_DEMAND_API_KEY: &str = "BOTFLEET_DEMAND_API_KEY";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no hosts configured")]
    NoHosts,

    #[error("{hosts} hosts but {passwords} passwords")]
    HostPasswordMismatch { hosts: usize, passwords: usize },

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("cycle_period must be greater than zero")]
    ZeroCyclePeriod,

    #[error("max_batch must be greater than zero")]
    ZeroMaxBatch,

    #[error("demand page_size must be greater than zero")]
    ZeroPageSize,

    #[error("policy {0} needs a [demand] section")]
    MissingDemandSection(&'static str),

    #[error("utc_offset_hours out of range: {0}")]
    InvalidUtcOffset(i32),

    #[error("invalid listen address {0:?}")]
    InvalidListen(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub controller: ControllerSection,
    #[serde(default)]
    pub hosts: Vec<HostEndpoint>,
    #[serde(default)]
    pub policy: Policy,
    pub demand: Option<RestDemandConfig>,
    #[serde(default)]
    pub api: ApiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSection {
    pub max_workers: u32,
    #[serde(default = "default_cycle_period")]
    pub cycle_period: String,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default)]
    pub utc_offset_hours: i32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_cycle_period() -> String {
    "15m".to_string()
}

fn default_max_batch() -> usize {
    5
}

fn default_request_timeout() -> String {
    "10s".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

impl FleetConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    ///
    /// `BOTFLEET_HOSTS` replaces the host list; `BOTFLEET_HOST_PASSWORDS`
    /// is matched to hosts by position.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let urls = lookup(ENV_HOSTS).map(|raw| split_list(&raw));
        let passwords = lookup(ENV_HOST_PASSWORDS).map(|raw| split_list(&raw));

        match (urls, passwords) {
            (Some(urls), passwords) => {
                let passwords = passwords.unwrap_or_else(|| vec![String::new(); urls.len()]);
                if passwords.len() != urls.len() {
                    return Err(ConfigError::HostPasswordMismatch {
                        hosts: urls.len(),
                        passwords: passwords.len(),
                    });
                }
                self.hosts = urls
                    .into_iter()
                    .zip(passwords)
                    .map(|(url, password)| HostEndpoint { url, password })
                    .collect();
            }
            (None, Some(passwords)) => {
                if passwords.len() != self.hosts.len() {
                    return Err(ConfigError::HostPasswordMismatch {
                        hosts: self.hosts.len(),
                        passwords: passwords.len(),
                    });
                }
                for (host, password) in self.hosts.iter_mut().zip(passwords) {
                    host.password = password;
                }
            }
            (None, None) => {}
        }

        if let (Some(key), Some(demand)) = (lookup(ENV_DEMAND_API_KEY), self.demand.as_mut()) {
            demand.api_key = key;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        self.controller_config()?;
        self.request_timeout()?;
        self.listen_addr()?;
        self.policy.validate()?;

        if self.policy.needs_demand() && self.demand.is_none() {
            return Err(ConfigError::MissingDemandSection(self.policy.name()));
        }
        if let Some(demand) = &self.demand {
            if demand.page_size == 0 {
                return Err(ConfigError::ZeroPageSize);
            }
            duration("demand.timeout", &demand.timeout)?;
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ConfigResult<ControllerConfig> {
        let c = &self.controller;
        let cycle_period = duration("controller.cycle_period", &c.cycle_period)?;
        if cycle_period.is_zero() {
            return Err(ConfigError::ZeroCyclePeriod);
        }
        if c.max_batch == 0 {
            return Err(ConfigError::ZeroMaxBatch);
        }
        let utc_offset = c
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidUtcOffset(c.utc_offset_hours))?;

        Ok(ControllerConfig {
            max_workers: c.max_workers,
            cycle_period,
            max_batch: c.max_batch,
            utc_offset,
        })
    }

    pub fn request_timeout(&self) -> ConfigResult<Duration> {
        duration("controller.request_timeout", &self.controller.request_timeout)
    }

    pub fn listen_addr(&self) -> ConfigResult<SocketAddr> {
        self.api
            .listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(self.api.listen.clone()))
    }
}
