// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ExporterError;
use statsfs::registry::DEFAULT_STATSFS_PATH;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PROMETHEUS_HOST: &str = "0.0.0.0";
pub const DEFAULT_PROMETHEUS_PORT: u16 = 2112;
pub const DEFAULT_PUSH_INTERVAL_SECS: u64 = 10;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Backend the collected metrics are handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExporterKind {
    /// Prometheus text exposition served over HTTP
    #[default]
    Prometheus,
    /// JSON document written to stdout on every interval
    Stdout,
}

impl FromStr for ExporterKind {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prometheus" => Ok(Self::Prometheus),
            "stdout" => Ok(Self::Stdout),
            other => Err(ExporterError::InvalidConfig(format!(
                "Unknown exporter '{other}'. Must be one of: prometheus, stdout"
            ))),
        }
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prometheus => f.write_str("prometheus"),
            Self::Stdout => f.write_str("stdout"),
        }
    }
}

/// Configuration for the statsfs exporter
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    /// Root of the stats filesystem
    pub statsfs_path: PathBuf,
    pub exporter: ExporterKind,
    /// Bind host of the Prometheus endpoint
    pub prometheus_host: String,
    /// Bind port of the Prometheus endpoint
    pub prometheus_port: u16,
    /// Period of the stdout exporter
    pub push_interval: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            statsfs_path: PathBuf::from(DEFAULT_STATSFS_PATH),
            exporter: ExporterKind::default(),
            prometheus_host: DEFAULT_PROMETHEUS_HOST.to_string(),
            prometheus_port: DEFAULT_PROMETHEUS_PORT,
            push_interval: Duration::from_secs(DEFAULT_PUSH_INTERVAL_SECS),
            log_level: "info".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ExporterError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExporterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let statsfs_path = lookup("STATSFS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.statsfs_path);
        let exporter = match lookup("STATSFS_EXPORTER") {
            Some(val) => val.parse()?,
            None => defaults.exporter,
        };
        let prometheus_host = lookup("STATSFS_PROMETHEUS_HOST").unwrap_or(defaults.prometheus_host);
        let prometheus_port = match lookup("STATSFS_PROMETHEUS_PORT") {
            Some(val) => val.trim().parse::<u16>().map_err(|e| {
                ExporterError::InvalidConfig(format!(
                    "Invalid STATSFS_PROMETHEUS_PORT '{val}': {e}"
                ))
            })?,
            None => defaults.prometheus_port,
        };
        let push_interval = match lookup("STATSFS_PUSH_INTERVAL_SECS") {
            Some(val) => val.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                ExporterError::InvalidConfig(format!(
                    "Invalid STATSFS_PUSH_INTERVAL_SECS '{val}': {e}"
                ))
            })?,
            None => defaults.push_interval,
        };
        let log_level = lookup("STATSFS_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            statsfs_path,
            exporter,
            prometheus_host,
            prometheus_port,
            push_interval,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ExporterError> {
        if self.statsfs_path.as_os_str().is_empty() {
            return Err(ExporterError::InvalidConfig(
                "STATSFS_PATH cannot be empty".to_string(),
            ));
        }

        if self.prometheus_port == 0 {
            return Err(ExporterError::InvalidConfig(
                "Prometheus port must be greater than 0".to_string(),
            ));
        }

        if self.prometheus_host.trim().is_empty() {
            return Err(ExporterError::InvalidConfig(
                "STATSFS_PROMETHEUS_HOST cannot be empty".to_string(),
            ));
        }

        if self.push_interval.is_zero() {
            return Err(ExporterError::InvalidConfig(
                "Push interval must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ExporterError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Address the Prometheus endpoint binds to
    pub fn prometheus_addr(&self) -> String {
        format!("{}:{}", self.prometheus_host, self.prometheus_port)
    }
}
