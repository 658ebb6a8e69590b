//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Load balancer settings
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    /// Health tracking and probing
    #[serde(default)]
    pub health: HealthConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Selection behaviour of one load balancer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadBalancerConfig {
    /// Name used in logs, metrics and error messages
    #[serde(default = "default_description")]
    pub description: String,

    /// Host selection algorithm
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Select unhealthy hosts when no healthy host is left
    #[serde(default)]
    pub fail_open: bool,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            description: default_description(),
            algorithm: Algorithm::default(),
            fail_open: false,
        }
    }
}

/// Host selection algorithm.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    #[serde(rename = "p2c")]
    PowerOfTwoChoices,
}

/// Health thresholds and probe scheduling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Consecutive failures before marking unhealthy
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,

    /// Consecutive successes before marking healthy again
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    /// Base delay between probes of an unhealthy host
    #[serde(default = "default_probe_interval", with = "humantime_serde")]
    pub probe_interval: Duration,

    /// Random extra delay added to each probe, at most this much
    #[serde(default = "default_probe_jitter", with = "humantime_serde")]
    pub probe_jitter: Duration,

    /// Timeout for a single probe
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: default_unhealthy_threshold(),
            healthy_threshold: default_healthy_threshold(),
            probe_interval: default_probe_interval(),
            probe_jitter: default_probe_jitter(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_description() -> String {
    "hostlb".to_string()
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_healthy_threshold() -> u32 {
    1
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_jitter() -> Duration {
    Duration::from_secs(3)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
