//! Configuration management for the Sync Reconciler

use std::env;

use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use thiserror::Error;

use crate::merge::{FieldNames, Reconciler, DEFAULT_TIMESTAMP_FORMAT};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub pull_url: String,
    pub push_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub fields: FieldNames,
    pub timestamp_format: String,
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            fields: FieldNames::default(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn new(pull_url: impl Into<String>, push_url: impl Into<String>) -> Self {
        UpstreamConfig {
            pull_url: pull_url.into(),
            push_url: push_url.into(),
            timeout_secs: 30,
        }
    }
}

impl MergeConfig {
    /// A reconciler stamping audit fields with the current time
    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::stamped(
            &self.fields,
            Utc::now().format(&self.timestamp_format).to_string(),
        )
    }
}

impl Config {
    /// Build a configuration around the given upstream endpoints
    pub fn new(upstream: UpstreamConfig) -> Self {
        Config {
            server: ServerConfig::default(),
            upstream,
            merge: MergeConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build from a variable lookup; empty values count as unset
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));
        let or_default = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let port = parse(var("SERVER_PORT"), "SERVER_PORT", 8080)?;
        let timeout_secs = parse(var("UPSTREAM_TIMEOUT_SECS"), "UPSTREAM_TIMEOUT_SECS", 30)?;

        let timestamp_format = or_default("AUDIT_TIMESTAMP_FORMAT", DEFAULT_TIMESTAMP_FORMAT);
        if StrftimeItems::new(&timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid {
                var: "AUDIT_TIMESTAMP_FORMAT",
                value: timestamp_format,
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: or_default("SERVER_HOST", "0.0.0.0"),
                port,
            },
            upstream: UpstreamConfig {
                pull_url: required("PULL_URL")?,
                push_url: required("PUSH_URL")?,
                timeout_secs,
            },
            merge: MergeConfig {
                fields: FieldNames {
                    unique_key: or_default("UNIQUE_KEY", "unique"),
                    primary_key: or_default("PRIMARY_KEY", "id"),
                    is_new_key: or_default("IS_NEW_KEY", "is_new"),
                    updated_key: or_default("UPDATED_KEY", "updated"),
                    deleted_key: or_default("DELETED_KEY", "deleted"),
                    sorting_key: var("SORTING_KEY"),
                    created_at_key: var("CREATED_AT_KEY"),
                    updated_at_key: var("UPDATED_AT_KEY"),
                    deleted_at_key: var("DELETED_AT_KEY"),
                },
                timestamp_format,
            },
        })
    }
}

fn parse<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
